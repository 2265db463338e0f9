//! Geometry primitives: points, item areas, rigid transforms, shape
//! outlines and grid snapping.
//!
//! Everything here is a pure function over value types — no scene state.
//! Rotations are in degrees, matching the persisted document format.

use serde::{Deserialize, Serialize};

// ─── Point ───────────────────────────────────────────────────────────────

/// A 2D point in whatever space the caller is working in.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub x: f32,
    pub y: f32,
}

impl Point {
    pub const ZERO: Point = Point { x: 0.0, y: 0.0 };

    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    pub fn distance_to(&self, other: Point) -> f32 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        (dx * dx + dy * dy).sqrt()
    }

    /// Rotate around the origin by `degrees`.
    pub fn rotated(&self, degrees: f32) -> Point {
        let rad = degrees.to_radians();
        let (sin, cos) = rad.sin_cos();
        Point {
            x: self.x * cos - self.y * sin,
            y: self.x * sin + self.y * cos,
        }
    }
}

// ─── Area ────────────────────────────────────────────────────────────────

/// Which space an item's area lives in. Most items are `relative` (world
/// space, transformed by ancestors and the screen transform); `viewport`
/// items are screen-space overlays.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AreaKind {
    #[default]
    Relative,
    Viewport,
}

/// An item's local bounding geometry: position, size, rotation in degrees
/// and pivot fractions (rotation happens around `(px * w, py * h)`).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Area {
    #[serde(default)]
    pub x: f32,
    #[serde(default)]
    pub y: f32,
    #[serde(default)]
    pub w: f32,
    #[serde(default)]
    pub h: f32,
    #[serde(default)]
    pub r: f32,
    #[serde(default = "default_pivot")]
    pub px: f32,
    #[serde(default = "default_pivot")]
    pub py: f32,
    #[serde(rename = "type", default, skip_serializing_if = "is_relative")]
    pub kind: AreaKind,
}

fn default_pivot() -> f32 {
    0.5
}

fn is_relative(kind: &AreaKind) -> bool {
    *kind == AreaKind::Relative
}

impl Default for Area {
    fn default() -> Self {
        Self {
            x: 0.0,
            y: 0.0,
            w: 0.0,
            h: 0.0,
            r: 0.0,
            px: 0.5,
            py: 0.5,
            kind: AreaKind::Relative,
        }
    }
}

impl Area {
    pub fn new(x: f32, y: f32, w: f32, h: f32) -> Self {
        Self {
            x,
            y,
            w,
            h,
            ..Default::default()
        }
    }

    /// The pivot point in the item's local coordinates.
    pub fn pivot(&self) -> Point {
        Point::new(self.px * self.w, self.py * self.h)
    }

    /// Axis-aligned containment of a point in this area's own space,
    /// ignoring rotation. Used for viewport boxes and select boxes.
    pub fn contains(&self, x: f32, y: f32) -> bool {
        x >= self.x && x <= self.x + self.w && y >= self.y && y <= self.y + self.h
    }

    /// Containment of a point already expressed in the item's local space.
    pub fn contains_local_point(&self, p: Point) -> bool {
        p.x >= 0.0 && p.x <= self.w && p.y >= 0.0 && p.y <= self.h
    }

    /// Build a normalized (non-negative size) box from two corner points.
    pub fn from_corners(a: Point, b: Point) -> Area {
        Area::new(a.x.min(b.x), a.y.min(b.y), (b.x - a.x).abs(), (b.y - a.y).abs())
    }
}

// ─── Rigid transform ─────────────────────────────────────────────────────

/// A rigid motion: rotate by `r` degrees about the origin, then translate
/// by `(x, y)`. Item world transforms are compositions of these — there is
/// no scale in the transform chain, so the inverse is exact.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Transform {
    pub x: f32,
    pub y: f32,
    pub r: f32,
}

impl Default for Transform {
    fn default() -> Self {
        Self::IDENTITY
    }
}

impl Transform {
    pub const IDENTITY: Transform = Transform { x: 0.0, y: 0.0, r: 0.0 };

    /// Map a point from this transform's source space into its target space.
    pub fn apply(&self, p: Point) -> Point {
        let rotated = p.rotated(self.r);
        Point::new(rotated.x + self.x, rotated.y + self.y)
    }

    /// Exact inverse of [`apply`](Self::apply).
    pub fn apply_inverse(&self, p: Point) -> Point {
        Point::new(p.x - self.x, p.y - self.y).rotated(-self.r)
    }

    /// `self ∘ other`: apply `other` first, then `self`.
    pub fn compose(&self, other: &Transform) -> Transform {
        let t = self.apply(Point::new(other.x, other.y));
        Transform {
            x: t.x,
            y: t.y,
            r: self.r + other.r,
        }
    }

    pub fn inverse(&self) -> Transform {
        let t = Point::new(-self.x, -self.y).rotated(-self.r);
        Transform {
            x: t.x,
            y: t.y,
            r: -self.r,
        }
    }

    /// The local→parent mapping of an item with the given area: rotation
    /// about the pivot point, then translation by the area origin.
    pub fn for_area(area: &Area) -> Transform {
        let pivot = area.pivot();
        let rotated_pivot = pivot.rotated(area.r);
        Transform {
            x: pivot.x + area.x - rotated_pivot.x,
            y: pivot.y + area.y - rotated_pivot.y,
            r: area.r,
        }
    }

    /// Solve for the area origin that makes an item with the given size,
    /// pivot and rotation realize this local→parent transform. Inverse of
    /// [`for_area`](Self::for_area) with respect to `(area.x, area.y)`.
    pub fn area_origin(&self, area: &Area) -> Point {
        let pivot = area.pivot();
        let rotated_pivot = pivot.rotated(self.r);
        Point::new(self.x - pivot.x + rotated_pivot.x, self.y - pivot.y + rotated_pivot.y)
    }
}

// ─── Screen transform ────────────────────────────────────────────────────

/// Pan offset and zoom of the canvas viewport.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScreenTransform {
    pub x: f32,
    pub y: f32,
    pub scale: f32,
}

impl Default for ScreenTransform {
    fn default() -> Self {
        Self {
            x: 0.0,
            y: 0.0,
            scale: 1.0,
        }
    }
}

impl ScreenTransform {
    /// World → screen.
    pub fn to_screen(&self, p: Point) -> Point {
        Point::new(p.x * self.scale + self.x, p.y * self.scale + self.y)
    }

    /// Screen → world.
    pub fn to_world(&self, p: Point) -> Point {
        Point::new((p.x - self.x) / self.scale, (p.y - self.y) / self.scale)
    }
}

// ─── Outline ─────────────────────────────────────────────────────────────

/// A point found on an outline: its coordinates, its *relative* position
/// along the path (0..1 of total length) and its distance to the query.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OutlinePoint {
    pub point: Point,
    pub position: f32,
    pub distance: f32,
}

/// A polyline approximation of a shape's outline. Connector snapping and
/// attachment tracking both work on outlines, never on raw shapes.
#[derive(Debug, Clone, PartialEq)]
pub struct Outline {
    pub points: Vec<Point>,
    pub closed: bool,
}

impl Outline {
    pub fn new(points: Vec<Point>, closed: bool) -> Self {
        Self { points, closed }
    }

    fn segments(&self) -> impl Iterator<Item = (Point, Point)> + '_ {
        let n = self.points.len();
        let wrap = if self.closed && n > 2 { n } else { n.saturating_sub(1) };
        (0..wrap).map(move |i| (self.points[i], self.points[(i + 1) % n]))
    }

    pub fn total_length(&self) -> f32 {
        self.segments().map(|(a, b)| a.distance_to(b)).sum()
    }

    /// The point at a relative path position in [0, 1]. Positions outside
    /// the range are clamped. Returns `None` for degenerate outlines.
    pub fn point_at_position(&self, position: f32) -> Option<Point> {
        if self.points.is_empty() {
            return None;
        }
        if self.points.len() == 1 {
            return Some(self.points[0]);
        }
        let total = self.total_length();
        if total <= f32::EPSILON {
            return Some(self.points[0]);
        }
        let mut remaining = position.clamp(0.0, 1.0) * total;
        let mut last = self.points[0];
        for (a, b) in self.segments() {
            let len = a.distance_to(b);
            if remaining <= len {
                if len <= f32::EPSILON {
                    return Some(a);
                }
                let t = remaining / len;
                return Some(Point::new(a.x + (b.x - a.x) * t, a.y + (b.y - a.y) * t));
            }
            remaining -= len;
            last = b;
        }
        Some(last)
    }

    /// The closest outline point to `p`, with its relative path position.
    pub fn closest_point(&self, p: Point) -> Option<OutlinePoint> {
        if self.points.is_empty() {
            return None;
        }
        if self.points.len() == 1 {
            return Some(OutlinePoint {
                point: self.points[0],
                position: 0.0,
                distance: p.distance_to(self.points[0]),
            });
        }

        let total = self.total_length();
        let mut walked = 0.0f32;
        let mut best: Option<OutlinePoint> = None;
        for (a, b) in self.segments() {
            let len = a.distance_to(b);
            let (candidate, t) = closest_point_on_segment(a, b, p);
            let distance = p.distance_to(candidate);
            if best.map(|c| distance < c.distance).unwrap_or(true) {
                let position = if total <= f32::EPSILON {
                    0.0
                } else {
                    (walked + t * len) / total
                };
                best = Some(OutlinePoint {
                    point: candidate,
                    position,
                    distance,
                });
            }
            walked += len;
        }
        best
    }
}

/// The closest point to `p` on segment `a..b`, plus the segment parameter
/// in [0, 1].
pub fn closest_point_on_segment(a: Point, b: Point, p: Point) -> (Point, f32) {
    let abx = b.x - a.x;
    let aby = b.y - a.y;
    let len_sq = abx * abx + aby * aby;
    if len_sq <= f32::EPSILON {
        return (a, 0.0);
    }
    let t = (((p.x - a.x) * abx + (p.y - a.y) * aby) / len_sq).clamp(0.0, 1.0);
    (Point::new(a.x + abx * t, a.y + aby * t), t)
}

/// Sample a cubic bezier segment. `p1`/`p2` are the control points.
pub fn sample_cubic(p0: Point, p1: Point, p2: Point, p3: Point, t: f32) -> Point {
    let u = 1.0 - t;
    let x = u * u * u * p0.x + 3.0 * u * u * t * p1.x + 3.0 * u * t * t * p2.x + t * t * t * p3.x;
    let y = u * u * u * p0.y + 3.0 * u * u * t * p1.y + 3.0 * u * t * t * p2.y + t * t * t * p3.y;
    Point::new(x, y)
}

// ─── Grid snapping ───────────────────────────────────────────────────────

/// Rounds world coordinates to the active grid. Disabled snapping is the
/// identity, so callers can apply it unconditionally.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Snapper {
    pub enabled: bool,
    pub size: f32,
}

impl Default for Snapper {
    fn default() -> Self {
        Self {
            enabled: false,
            size: 10.0,
        }
    }
}

impl Snapper {
    pub fn snap(&self, v: f32) -> f32 {
        if self.enabled && self.size > 0.0 {
            (v / self.size).round() * self.size
        } else {
            v
        }
    }

    pub fn snap_point(&self, p: Point) -> Point {
        Point::new(self.snap(p.x), self.snap(p.y))
    }
}
