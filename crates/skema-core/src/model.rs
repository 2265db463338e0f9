//! Persisted data model for schemes.
//!
//! The document shape is stable and round-trips losslessly through JSON:
//! items carry `id, name, shape, shapeProps, area, opacity, visible,
//! blendMode, textSlots, behavior, childItems`; connectors carry
//! `id, sourceItem, destinationItem, reroutes, style`. Everything derived
//! (world transforms, selection, render paths) lives in `meta` fields that
//! are never serialized.

use crate::geometry::{Area, Point, Transform};
use crate::id::ItemId;
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;
use std::collections::BTreeMap;

// ─── Shapes ──────────────────────────────────────────────────────────────

/// Shape identifier plus its shape-specific property bag. Serialized
/// adjacently so the document keeps the `shape` / `shapeProps` split.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "shape", content = "shapeProps", rename_all = "lowercase")]
pub enum Shape {
    Rect(RectProps),
    Ellipse(EllipseProps),
    Curve(CurveProps),
    Text(TextProps),
    Component(ComponentProps),
    Overlay(OverlayProps),
}

impl Default for Shape {
    fn default() -> Self {
        Shape::Rect(RectProps::default())
    }
}

impl Shape {
    pub fn name(&self) -> &'static str {
        match self {
            Shape::Rect(_) => "rect",
            Shape::Ellipse(_) => "ellipse",
            Shape::Curve(_) => "curve",
            Shape::Text(_) => "text",
            Shape::Component(_) => "component",
            Shape::Overlay(_) => "overlay",
        }
    }

    /// Components and overlays are the two shapes that participate in the
    /// connect-items interaction.
    pub fn is_connectable(&self) -> bool {
        matches!(self, Shape::Component(_) | Shape::Overlay(_))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RectProps {
    #[serde(default)]
    pub corner_radius: f32,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EllipseProps {}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TextProps {}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComponentProps {
    /// Scheme this component embeds, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scheme_id: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OverlayProps {}

// ─── Curves ──────────────────────────────────────────────────────────────

/// A point of a curve path. Bezier points keep two control offsets
/// relative to the point itself.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "t")]
pub enum CurvePoint {
    #[serde(rename = "L")]
    Linear { x: f32, y: f32 },
    #[serde(rename = "B")]
    Bezier {
        x: f32,
        y: f32,
        x1: f32,
        y1: f32,
        x2: f32,
        y2: f32,
    },
}

impl CurvePoint {
    pub fn linear(x: f32, y: f32) -> Self {
        CurvePoint::Linear { x, y }
    }

    pub fn pos(&self) -> Point {
        match *self {
            CurvePoint::Linear { x, y } | CurvePoint::Bezier { x, y, .. } => Point::new(x, y),
        }
    }

    pub fn set_pos(&mut self, p: Point) {
        match self {
            CurvePoint::Linear { x, y } | CurvePoint::Bezier { x, y, .. } => {
                *x = p.x;
                *y = p.y;
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CurveProps {
    #[serde(default)]
    pub points: Vec<CurvePoint>,
    #[serde(default)]
    pub closed: bool,
    /// Connectors probe nearby item outlines with their edge points and
    /// track the attached items; regular curves never attach.
    #[serde(default)]
    pub connector: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_item: Option<String>,
    #[serde(default)]
    pub source_item_position: f32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub destination_item: Option<String>,
    #[serde(default)]
    pub destination_item_position: f32,
    #[serde(default = "default_stroke_size")]
    pub stroke_size: f32,
}

fn default_stroke_size() -> f32 {
    2.0
}

impl Default for CurveProps {
    fn default() -> Self {
        Self {
            points: Vec::new(),
            closed: false,
            connector: false,
            source_item: None,
            source_item_position: 0.0,
            destination_item: None,
            destination_item_position: 0.0,
            stroke_size: default_stroke_size(),
        }
    }
}

/// Number of samples per bezier segment when flattening a curve.
const BEZIER_SAMPLES: usize = 16;

impl CurveProps {
    /// Effective control points of the segment from `points[i]` to `next`.
    /// A bezier point's second handle shapes the outgoing segment, the
    /// first handle the incoming one; linear points collapse the handle
    /// onto the point itself.
    fn segment_controls(a: &CurvePoint, b: &CurvePoint) -> (Point, Point) {
        let c1 = match *a {
            CurvePoint::Bezier { x, y, x2, y2, .. } => Point::new(x + x2, y + y2),
            CurvePoint::Linear { x, y } => Point::new(x, y),
        };
        let c2 = match *b {
            CurvePoint::Bezier { x, y, x1, y1, .. } => Point::new(x + x1, y + y1),
            CurvePoint::Linear { x, y } => Point::new(x, y),
        };
        (c1, c2)
    }

    /// Flatten the curve into local-space samples, each tagged with the
    /// index of the path segment it came from. Bezier segments are sampled,
    /// linear segments contribute their endpoints only.
    pub fn local_polyline(&self) -> Vec<(Point, usize)> {
        let n = self.points.len();
        if n == 0 {
            return Vec::new();
        }
        let mut samples = vec![(self.points[0].pos(), 0)];
        let seg_count = if self.closed && n > 2 { n } else { n - 1 };
        for i in 0..seg_count {
            let a = &self.points[i];
            let b = &self.points[(i + 1) % n];
            let p0 = a.pos();
            let p3 = b.pos();
            let linear = matches!(a, CurvePoint::Linear { .. }) && matches!(b, CurvePoint::Linear { .. });
            if linear {
                samples.push((p3, i));
            } else {
                let (c1, c2) = Self::segment_controls(a, b);
                for step in 1..=BEZIER_SAMPLES {
                    let t = step as f32 / BEZIER_SAMPLES as f32;
                    samples.push((crate::geometry::sample_cubic(p0, c1, c2, p3, t), i));
                }
            }
        }
        samples
    }

    /// The curve's outline as plain local points.
    pub fn outline_points(&self) -> Vec<Point> {
        self.local_polyline().into_iter().map(|(p, _)| p).collect()
    }
}

// ─── Item ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BlendMode {
    #[default]
    Normal,
    Multiply,
    Screen,
    Overlay,
    Darken,
    Lighten,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TextSlot {
    #[serde(default)]
    pub text: String,
    #[serde(default = "default_font_size")]
    pub font_size: f32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
}

fn default_font_size() -> f32 {
    14.0
}

/// A declarative `{element, method, args}` action record attached to an
/// item event.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BehaviorAction {
    #[serde(default)]
    pub element: String,
    #[serde(default)]
    pub method: String,
    #[serde(default)]
    pub args: serde_json::Map<String, serde_json::Value>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BehaviorEvent {
    #[serde(default)]
    pub event: String,
    #[serde(default)]
    pub actions: Vec<BehaviorAction>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Behavior {
    #[serde(default)]
    pub events: Vec<BehaviorEvent>,
}

impl Behavior {
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}

/// Template-instance bookkeeping. Items generated by expanding a template
/// carry the id the template assigned them, which is how native (user
/// added) children survive re-evaluation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemArgs {
    #[serde(default)]
    pub templated: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub templated_id: Option<String>,
}

/// Derived per-item state. Recomputed by the scheme container, never
/// persisted, never authoritative.
#[derive(Debug, Clone, Default)]
pub struct Meta {
    /// World transform: composition of all ancestor area transforms plus
    /// this item's own. Stale transforms are a correctness bug — the
    /// container reindexes after every geometry edit.
    pub transform: Transform,
    pub selected: bool,
    /// Ids of all ancestors, nearest first.
    pub ancestor_ids: Vec<ItemId>,
    /// Area captured at drag start; drag deltas are applied against this.
    pub original_area: Option<Area>,
}

/// A node of the scene tree.
///
/// `child_items` is the *document* form of nesting. Inside the scheme
/// container the hierarchy lives in the item graph and every stored item
/// keeps `child_items` empty.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Item {
    pub id: ItemId,
    #[serde(default)]
    pub name: String,
    #[serde(flatten)]
    pub shape: Shape,
    #[serde(default)]
    pub area: Area,
    #[serde(default = "default_opacity")]
    pub opacity: f32,
    #[serde(default = "default_true")]
    pub visible: bool,
    #[serde(default, skip_serializing_if = "is_default_blend")]
    pub blend_mode: BlendMode,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub text_slots: BTreeMap<String, TextSlot>,
    #[serde(default, skip_serializing_if = "Behavior::is_empty")]
    pub behavior: Behavior,
    #[serde(default, skip_serializing_if = "SmallVec::is_empty")]
    pub groups: SmallVec<[String; 2]>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub locked: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub args: Option<ItemArgs>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub child_items: Vec<Item>,
    #[serde(skip)]
    pub meta: Meta,
}

fn default_opacity() -> f32 {
    1.0
}

fn default_true() -> bool {
    true
}

fn is_default_blend(b: &BlendMode) -> bool {
    *b == BlendMode::Normal
}

impl Item {
    pub fn new(id: ItemId, name: &str, shape: Shape) -> Self {
        Self {
            id,
            name: name.to_string(),
            shape,
            area: Area::default(),
            opacity: 1.0,
            visible: true,
            blend_mode: BlendMode::Normal,
            text_slots: BTreeMap::new(),
            behavior: Behavior::default(),
            groups: SmallVec::new(),
            locked: false,
            args: None,
            child_items: Vec::new(),
            meta: Meta::default(),
        }
    }

    pub fn templated_id(&self) -> Option<&str> {
        self.args.as_ref().and_then(|a| a.templated_id.as_deref())
    }

    pub fn is_templated(&self) -> bool {
        self.args.as_ref().map(|a| a.templated).unwrap_or(false)
    }
}

// ─── Connector ───────────────────────────────────────────────────────────

/// A connector endpoint: the attached item and the *relative* position on
/// its outline (0..1 of outline length), so attachments survive resizes.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ConnectorEnd {
    pub item: ItemId,
    #[serde(default)]
    pub position: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LinePattern {
    #[default]
    Solid,
    Dashed,
    Dotted,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectorStyle {
    #[serde(default = "default_connector_color")]
    pub color: String,
    #[serde(default = "default_connector_width")]
    pub width: f32,
    #[serde(default)]
    pub pattern: LinePattern,
}

fn default_connector_color() -> String {
    "#333333".to_string()
}

fn default_connector_width() -> f32 {
    1.0
}

impl Default for ConnectorStyle {
    fn default() -> Self {
        Self {
            color: default_connector_color(),
            width: default_connector_width(),
            pattern: LinePattern::Solid,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct ConnectorMeta {
    pub selected: bool,
}

/// A polyline linking two item outlines, with user-inserted reroute
/// points. `path` is the resolved render path — derived, rebuilt whenever
/// either endpoint item's geometry changes.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Connector {
    pub id: ItemId,
    pub source_item: ConnectorEnd,
    pub destination_item: ConnectorEnd,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub reroutes: Vec<Point>,
    #[serde(default)]
    pub style: ConnectorStyle,
    #[serde(skip)]
    pub path: Vec<Point>,
    #[serde(skip)]
    pub meta: ConnectorMeta,
}

impl Connector {
    pub fn new(id: ItemId, source: ConnectorEnd, destination: ConnectorEnd) -> Self {
        Self {
            id,
            source_item: source,
            destination_item: destination,
            reroutes: Vec::new(),
            style: ConnectorStyle::default(),
            path: Vec::new(),
            meta: ConnectorMeta::default(),
        }
    }

    pub fn touches(&self, item: ItemId) -> bool {
        self.source_item.item == item || self.destination_item.item == item
    }
}

// ─── Scheme ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SchemeStyle {
    #[serde(default = "default_background_color")]
    pub background_color: String,
    #[serde(default = "default_grid_color")]
    pub grid_color: String,
    #[serde(default = "default_boundary_box_color")]
    pub boundary_box_color: String,
}

fn default_background_color() -> String {
    "rgba(240, 240, 240, 1.0)".to_string()
}

fn default_grid_color() -> String {
    "rgba(128, 128, 128, 0.2)".to_string()
}

fn default_boundary_box_color() -> String {
    "rgba(36, 182, 255, 0.8)".to_string()
}

impl Default for SchemeStyle {
    fn default() -> Self {
        Self {
            background_color: default_background_color(),
            grid_color: default_grid_color(),
            boundary_box_color: default_boundary_box_color(),
        }
    }
}

/// The root document: top-level items, scheme-level connectors, style
/// defaults and metadata.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Scheme {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub modified_time: Option<String>,
    #[serde(default = "SchemeStyle::default")]
    pub style: SchemeStyle,
    #[serde(default)]
    pub items: Vec<Item>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub connectors: Vec<Connector>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn item_serializes_with_shape_props_split() {
        let mut item = Item::new(ItemId::intern("a1"), "Box", Shape::Rect(RectProps::default()));
        item.area = Area::new(10.0, 20.0, 100.0, 50.0);
        let value = serde_json::to_value(&item).unwrap();
        assert_eq!(value["shape"], "rect");
        assert!(value["shapeProps"].is_object());
        assert_eq!(value["area"]["w"], 100.0);
        assert!(value.get("meta").is_none(), "meta must never be persisted");
    }

    #[test]
    fn item_json_roundtrip() {
        let raw = serde_json::json!({
            "id": "it_1",
            "name": "Label",
            "shape": "curve",
            "shapeProps": {
                "points": [
                    {"t": "L", "x": 0.0, "y": 0.0},
                    {"t": "B", "x": 10.0, "y": 5.0, "x1": -2.0, "y1": 0.0, "x2": 2.0, "y2": 0.0}
                ],
                "connector": true,
                "sourceItem": "#other"
            },
            "area": {"x": 1.0, "y": 2.0, "w": 3.0, "h": 4.0, "r": 0.0, "px": 0.5, "py": 0.5},
            "childItems": [
                {"id": "it_2", "shape": "rect", "shapeProps": {}}
            ]
        });
        let item: Item = serde_json::from_value(raw).unwrap();
        match &item.shape {
            Shape::Curve(props) => {
                assert_eq!(props.points.len(), 2);
                assert!(props.connector);
                assert_eq!(props.source_item.as_deref(), Some("#other"));
            }
            other => panic!("expected curve, got {}", other.name()),
        }
        assert_eq!(item.child_items.len(), 1);

        let back = serde_json::to_value(&item).unwrap();
        let again: Item = serde_json::from_value(back.clone()).unwrap();
        assert_eq!(back, serde_json::to_value(&again).unwrap());
    }

    #[test]
    fn curve_point_tags() {
        let p = CurvePoint::Bezier {
            x: 1.0,
            y: 2.0,
            x1: -3.0,
            y1: 0.0,
            x2: 3.0,
            y2: 0.0,
        };
        let value = serde_json::to_value(p).unwrap();
        assert_eq!(value["t"], "B");
    }

    #[test]
    fn scheme_defaults_fill_missing_fields() {
        let scheme: Scheme = serde_json::from_str(r#"{"name": "empty"}"#).unwrap();
        assert_eq!(scheme.style.background_color, "rgba(240, 240, 240, 1.0)");
        assert!(scheme.items.is_empty());
    }
}
