//! Curve drawing and editing.
//!
//! One state covers both phases of a curve's life:
//!
//! - **Creating**: the first click plants two coincident points, every
//!   further click appends one. Dragging before release turns the fresh
//!   point into a bezier point with mirrored handles. Moving close to the
//!   first point (5 screen px, zoom-scaled) offers to close the curve.
//! - **Editing**: points and control handles are dragged individually,
//!   double-click inserts a point on the stroke, a box selects points, a
//!   right-click offers per-point context actions.
//!
//! Edge points of a *connector* curve probe nearby item outlines within a
//! zoom-scaled threshold and stick to the closest outline point, recording
//! the attached item and its path position so the curve tracks that item
//! from then on.

use crate::editor::{Ctx, State, Transition};
use crate::events::{ContextMenuOption, EditorEvent};
use crate::input::{HitObject, Key, MouseButton, PointerEvent};
use skema_core::container::Element;
use skema_core::geometry::{Area, AreaKind, Point, Transform, closest_point_on_segment};
use skema_core::id::ItemId;
use skema_core::model::{CurvePoint, CurveProps, Item, Shape};
use std::collections::BTreeSet;

/// Distance in screen pixels below which a new point closes the curve.
const CLOSE_CURVE_THRESHOLD: f32 = 5.0;

/// Outline attachment threshold in screen pixels at zoom 1.0.
const ATTACH_THRESHOLD: f32 = 20.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DraggedObject {
    Point(usize),
    ControlPoint { index: usize, control: u8 },
}

pub struct EditCurveState {
    item_id: Option<ItemId>,
    pending: Option<Item>,
    added_to_scheme: bool,
    creating_new_points: bool,
    original_click_point: Point,
    original_click_screen: Point,
    candidate_point_submitted: bool,
    should_join_closed_points: bool,
    multi_select_box: Option<Area>,
    should_drag_screen: bool,
    started_dragging_screen: bool,
    original_screen_offset: Point,
    dragged_object: Option<DraggedObject>,
    dragged_original_point: Option<CurvePoint>,
    selected_points: BTreeSet<usize>,
    dragged_something: bool,
}

impl Default for EditCurveState {
    fn default() -> Self {
        Self {
            item_id: None,
            pending: None,
            added_to_scheme: false,
            creating_new_points: true,
            original_click_point: Point::ZERO,
            original_click_screen: Point::ZERO,
            candidate_point_submitted: false,
            should_join_closed_points: false,
            multi_select_box: None,
            should_drag_screen: false,
            started_dragging_screen: false,
            original_screen_offset: Point::ZERO,
            dragged_object: None,
            dragged_original_point: None,
            selected_points: BTreeSet::new(),
            dragged_something: false,
        }
    }
}

impl EditCurveState {
    /// Draw a brand-new curve item; it enters the scheme on first click.
    pub fn for_new_curve(item: Item) -> Self {
        Self {
            pending: Some(item),
            ..Self::default()
        }
    }

    /// Edit the points of a curve that is already part of the scheme.
    pub fn for_existing(id: ItemId) -> Self {
        Self {
            item_id: Some(id),
            added_to_scheme: true,
            creating_new_points: false,
            ..Self::default()
        }
    }

    /// Start a connector curve whose first point sticks to `source`.
    /// Returns `false` (leaving the editor state untouched) when the
    /// source item does not exist.
    pub(crate) fn init_connecting_from_source_item(
        &mut self,
        ctx: &mut Ctx,
        source: ItemId,
        local_point: Option<Point>,
    ) -> bool {
        let (source_name, source_kind, world_point, attach) = {
            let Some(source_item) = ctx.scheme.find_item_by_id(source) else {
                return false;
            };
            let local = local_point
                .unwrap_or_else(|| Point::new(source_item.area.w / 2.0, source_item.area.h / 2.0));
            let world = ctx.scheme.world_point_on_item(local.x, local.y, source_item);
            let attach = ctx
                .scheme
                .item_outline(source_item)
                .and_then(|outline| outline.closest_point(world));
            (source_item.name.clone(), source_item.area.kind, world, attach)
        };

        let mut curve = Item::new(
            ItemId::unique("item"),
            &format!("{source_name} :: "),
            Shape::Curve(CurveProps {
                connector: true,
                ..CurveProps::default()
            }),
        );
        curve.area = Area {
            kind: source_kind,
            ..Area::new(0.0, 0.0, 200.0, 200.0)
        };
        let start = attach.map(|a| a.point).unwrap_or(world_point);
        if let Shape::Curve(props) = &mut curve.shape {
            props.source_item = Some(format!("#{source}"));
            props.source_item_position = attach.map(|a| a.position).unwrap_or(0.0);
            props.points = vec![
                CurvePoint::linear(start.x, start.y),
                CurvePoint::linear(world_point.x, world_point.y),
            ];
        }
        let id = ctx.scheme.add_item(curve);
        self.item_id = Some(id);
        self.added_to_scheme = true;
        self.creating_new_points = true;
        true
    }

    // ─── Small accessors ─────────────────────────────────────────────────

    fn transform(&self, ctx: &Ctx) -> Transform {
        self.item_id
            .and_then(|id| ctx.scheme.find_item_by_id(id))
            .map(|item| item.meta.transform)
            .unwrap_or(Transform::IDENTITY)
    }

    fn props(&self, ctx: &Ctx) -> Option<CurveProps> {
        let item = ctx.scheme.find_item_by_id(self.item_id?)?;
        match &item.shape {
            Shape::Curve(props) => Some(props.clone()),
            _ => None,
        }
    }

    fn with_props<R>(&self, ctx: &mut Ctx, f: impl FnOnce(&mut CurveProps) -> R) -> Option<R> {
        let item = ctx.scheme.find_item_by_id_mut(self.item_id?)?;
        match &mut item.shape {
            Shape::Curve(props) => Some(f(props)),
            _ => None,
        }
    }

    /// Curve coordinates for the event: viewport-type curves work in raw
    /// screen coordinates, everything else in world coordinates.
    fn event_point(&self, ctx: &Ctx, ev: &PointerEvent) -> Point {
        let kind = self
            .item_id
            .and_then(|id| ctx.scheme.find_item_by_id(id))
            .map(|item| item.area.kind)
            .or_else(|| self.pending.as_ref().map(|item| item.area.kind))
            .unwrap_or(AreaKind::Relative);
        match kind {
            AreaKind::Viewport => Point::new(ev.mx, ev.my),
            AreaKind::Relative => Point::new(ev.x, ev.y),
        }
    }

    fn snap_curve_point(&self, ctx: &Ctx, tf: Transform, local: Point) -> Point {
        let world = tf.apply(local);
        let snapped = Point::new(ctx.snap_x(world.x), ctx.snap_y(world.y));
        tf.apply_inverse(snapped)
    }

    fn soft_reset(&mut self) {
        self.should_drag_screen = false;
        self.started_dragging_screen = false;
        self.candidate_point_submitted = false;
        self.should_join_closed_points = false;
        self.multi_select_box = None;
        self.dragged_object = None;
        self.dragged_original_point = None;
    }

    // ─── Attachment probing ──────────────────────────────────────────────

    /// Snap a dragged edge point onto a nearby item outline, recording the
    /// attachment — or clear it when nothing is in range. Non-connector
    /// curves never attach.
    fn handle_edge_curve_point_drag(&mut self, ctx: &mut Ctx, point_index: usize, is_source: bool) {
        let Some(item_id) = self.item_id else {
            return;
        };
        let Some(props) = self.props(ctx) else {
            return;
        };
        if !props.connector || point_index >= props.points.len() {
            return;
        }
        let tf = self.transform(ctx);
        let world = tf.apply(props.points[point_index].pos());

        let scale = ctx.scheme.screen_transform.scale;
        let threshold = if scale > 0.0 { ATTACH_THRESHOLD / scale } else { 0.0 };
        let closest =
            ctx.scheme
                .find_closest_point_to_items(world.x, world.y, threshold, Some(item_id), true);

        match closest {
            Some(found) => {
                let local = tf.apply_inverse(found.point);
                self.with_props(ctx, |props| {
                    props.points[point_index].set_pos(local);
                    if is_source {
                        props.source_item = Some(format!("#{}", found.item_id));
                        props.source_item_position = found.position;
                    } else {
                        props.destination_item = Some(format!("#{}", found.item_id));
                        props.destination_item_position = found.position;
                    }
                });
                ctx.events.emit_items_highlighted(vec![found.item_id]);
            }
            None => {
                ctx.events.emit_items_highlighted(Vec::new());
                self.with_props(ctx, |props| {
                    if is_source {
                        props.source_item = None;
                        props.source_item_position = 0.0;
                    } else {
                        props.destination_item = None;
                        props.destination_item_position = 0.0;
                    }
                });
            }
        }
    }

    // ─── Creation ────────────────────────────────────────────────────────

    fn init_first_click(&mut self, ctx: &mut Ctx, point: Point) {
        let Some(mut item) = self.pending.take() else {
            return;
        };
        if let Shape::Curve(props) = &mut item.shape {
            props.points = vec![
                CurvePoint::linear(point.x, point.y),
                CurvePoint::linear(point.x, point.y),
            ];
        }
        let id = ctx.scheme.add_item(item);
        self.item_id = Some(id);
        self.added_to_scheme = true;

        // Snapping needs the item in the scheme (its transform is derived),
        // so the freshly planted points are re-adjusted afterwards.
        let tf = self.transform(ctx);
        let snapped = self.snap_curve_point(ctx, tf, point);
        self.with_props(ctx, |props| {
            props.points[0].set_pos(snapped);
            props.points[1].set_pos(snapped);
        });
        // The user may have started on top of another item.
        self.handle_edge_curve_point_drag(ctx, 0, true);
    }

    fn create_name_from_attached_items(&self, ctx: &Ctx) -> String {
        let Some(props) = self.props(ctx) else {
            return "Curve".to_string();
        };
        let resolve = |selector: &Option<String>| -> Option<String> {
            let element = ctx
                .scheme
                .find_first_element_by_selector(selector.as_deref()?, None)?;
            match element {
                Element::Item(id) => ctx.scheme.find_item_by_id(id).map(|item| item.name.clone()),
                Element::Connector(_) => None,
            }
        };
        match (resolve(&props.source_item), resolve(&props.destination_item)) {
            (Some(source), Some(destination)) => format!("{source} -> {destination}"),
            _ => "Curve".to_string(),
        }
    }

    fn submit_item(&mut self, ctx: &mut Ctx) -> Transition {
        let Some(id) = self.item_id else {
            return Transition::ToIdle;
        };
        let points = self.props(ctx).map(|p| p.points.len()).unwrap_or(0);
        if points < 2 {
            ctx.scheme.delete_item(id);
            return Transition::ToIdle;
        }
        ctx.scheme.readjust_item(id);
        ctx.rebuild_dependants(id);
        ctx.events.emit(EditorEvent::SwitchModeToEdit);
        ctx.events.emit_item_changed(id);
        ctx.commit();
        ctx.scheme.select_item(id, false);
        Transition::ToIdle
    }

    // ─── Editing ─────────────────────────────────────────────────────────

    fn toggle_point_selection(&mut self, index: usize, inclusive: bool) {
        if inclusive {
            if !self.selected_points.remove(&index) {
                self.selected_points.insert(index);
            }
        } else if !self.selected_points.contains(&index) {
            self.selected_points.clear();
            self.selected_points.insert(index);
        }
    }

    fn handle_curve_point_drag(&mut self, ctx: &mut Ctx, point: Point, index: usize) {
        let Some(original) = self.dragged_original_point else {
            return;
        };
        let tf = self.transform(ctx);
        let local_original = tf.apply_inverse(self.original_click_point);
        let local_point = tf.apply_inverse(point);
        let dragged = Point::new(
            original.pos().x + local_point.x - local_original.x,
            original.pos().y + local_point.y - local_original.y,
        );
        let snapped = self.snap_curve_point(ctx, tf, dragged);
        let last_index = self
            .props(ctx)
            .map(|p| p.points.len().saturating_sub(1))
            .unwrap_or(0);
        self.with_props(ctx, |props| {
            if index < props.points.len() {
                props.points[index].set_pos(snapped);
            }
        });
        if index == 0 || index == last_index {
            self.handle_edge_curve_point_drag(ctx, index, index == 0);
        }
        if let Some(id) = self.item_id {
            ctx.rebuild_dependants(id);
            ctx.events.emit_item_changed(id);
        }
        self.dragged_something = true;
    }

    fn handle_control_point_drag(&mut self, ctx: &mut Ctx, point: Point, symmetric: bool) {
        let Some(DraggedObject::ControlPoint { index, control }) = self.dragged_object else {
            return;
        };
        let Some(CurvePoint::Bezier { x, y, x1, y1, x2, y2 }) = self.dragged_original_point else {
            return;
        };
        let tf = self.transform(ctx);
        let local_original = tf.apply_inverse(self.original_click_point);
        let local_point = tf.apply_inverse(point);
        let (ox, oy) = if control == 1 { (x1, y1) } else { (x2, y2) };

        // Control points are stored relative to their base point; snapping
        // happens on the absolute world position.
        let absolute = Point::new(
            x + ox + local_point.x - local_original.x,
            y + oy + local_point.y - local_original.y,
        );
        let world = tf.apply(absolute);
        let snapped_world = Point::new(ctx.snap_x(world.x), ctx.snap_y(world.y));
        let snapped_local = tf.apply_inverse(snapped_world);
        let offset = Point::new(snapped_local.x - x, snapped_local.y - y);

        self.with_props(ctx, |props| {
            if let Some(CurvePoint::Bezier { x1, y1, x2, y2, .. }) = props.points.get_mut(index) {
                if control == 1 {
                    *x1 = offset.x;
                    *y1 = offset.y;
                    if symmetric {
                        *x2 = -offset.x;
                        *y2 = -offset.y;
                    }
                } else {
                    *x2 = offset.x;
                    *y2 = offset.y;
                    if symmetric {
                        *x1 = -offset.x;
                        *y1 = -offset.y;
                    }
                }
            }
        });
        if let Some(id) = self.item_id {
            ctx.events.emit_item_changed(id);
        }
        self.dragged_something = true;
    }

    fn handle_right_click(&mut self, ctx: &mut Ctx, ev: &PointerEvent, object: &HitObject) {
        let HitObject::CurvePoint { index } = object else {
            return;
        };
        let Some(props) = self.props(ctx) else {
            return;
        };
        if *index >= props.points.len() {
            return;
        }
        let mut options = vec![ContextMenuOption::DeletePoint(*index)];
        match props.points[*index] {
            CurvePoint::Linear { .. } => options.push(ContextMenuOption::ConvertToBezier(*index)),
            CurvePoint::Bezier { .. } => options.push(ContextMenuOption::ConvertToSimple(*index)),
        }
        if *index == 0 && props.source_item.is_some() {
            options.push(ContextMenuOption::DetachSource);
        }
        if *index == props.points.len() - 1 && props.destination_item.is_some() {
            options.push(ContextMenuOption::DetachDestination);
        }
        ctx.events.emit(EditorEvent::ContextMenuRequested {
            mx: ev.mx,
            my: ev.my,
            options,
        });
    }

    fn insert_point_at_coords(&mut self, ctx: &mut Ctx, point: Point) {
        let Some(id) = self.item_id else {
            return;
        };
        let Some(props) = self.props(ctx) else {
            return;
        };
        let tf = self.transform(ctx);
        let local = tf.apply_inverse(point);
        let samples = props.local_polyline();
        if samples.len() < 2 {
            return;
        }

        let mut best: Option<(Point, usize, f32)> = None;
        for pair in samples.windows(2) {
            let (candidate, _) = closest_point_on_segment(pair[0].0, pair[1].0, local);
            let distance = candidate.distance_to(local);
            if best.map(|(_, _, d)| distance < d).unwrap_or(true) {
                // Samples are tagged with the path segment they end on, so
                // the window's segment is the second sample's tag.
                best = Some((candidate, pair[1].1, distance));
            }
        }
        let Some((candidate, segment, distance)) = best else {
            return;
        };
        // Only clicks on (or next to) the stroke insert a point.
        if distance > props.stroke_size + 1.0 {
            return;
        }
        let insert_at = (segment + 1).min(props.points.len());
        let was_bezier = matches!(props.points.get(segment), Some(CurvePoint::Bezier { .. }));
        self.with_props(ctx, |props| {
            props
                .points
                .insert(insert_at, CurvePoint::linear(candidate.x, candidate.y));
        });
        if was_bezier {
            self.convert_point_to_bezier_silent(ctx, insert_at);
        }
        ctx.events.emit_item_changed(id);
        ctx.rebuild_dependants(id);
        ctx.commit();
    }

    // ─── Context actions ─────────────────────────────────────────────────

    pub(crate) fn delete_point(&mut self, ctx: &mut Ctx, index: usize) {
        let Some(id) = self.item_id else {
            return;
        };
        let removed = self
            .with_props(ctx, |props| {
                if index < props.points.len() {
                    props.points.remove(index);
                    true
                } else {
                    false
                }
            })
            .unwrap_or(false);
        if removed {
            self.selected_points.clear();
            ctx.events.emit_item_changed(id);
            ctx.rebuild_dependants(id);
            ctx.commit();
        }
    }

    pub(crate) fn delete_selected_points(&mut self, ctx: &mut Ctx) {
        let Some(id) = self.item_id else {
            return;
        };
        if self.selected_points.is_empty() {
            return;
        }
        let indexes: Vec<usize> = self.selected_points.iter().rev().copied().collect();
        self.with_props(ctx, |props| {
            for index in indexes {
                if index < props.points.len() {
                    props.points.remove(index);
                }
            }
        });
        self.selected_points.clear();
        ctx.events.emit_item_changed(id);
        ctx.rebuild_dependants(id);
        ctx.commit();
    }

    fn convert_point_to_bezier_silent(&mut self, ctx: &mut Ctx, index: usize) {
        self.with_props(ctx, |props| {
            let Some(point) = props.points.get(index).copied() else {
                return;
            };
            let pos = point.pos();
            let (mut dx, mut dy) = (10.0, 0.0);
            if props.points.len() > 2 {
                // Derive the handle direction from the neighbors.
                let prev = if index == 0 { props.points.len() - 1 } else { index - 1 };
                let mut next = index + 1;
                if next >= props.points.len() - 1 {
                    next -= props.points.len() - 1;
                }
                dx = (props.points[next].pos().x - props.points[prev].pos().x) / 4.0;
                dy = (props.points[next].pos().y - props.points[prev].pos().y) / 4.0;
            }
            props.points[index] = CurvePoint::Bezier {
                x: pos.x,
                y: pos.y,
                x1: -dx,
                y1: -dy,
                x2: dx,
                y2: dy,
            };
        });
    }

    pub(crate) fn convert_point_to_bezier(&mut self, ctx: &mut Ctx, index: usize) {
        let Some(id) = self.item_id else {
            return;
        };
        self.convert_point_to_bezier_silent(ctx, index);
        ctx.events.emit_item_changed(id);
        ctx.rebuild_dependants(id);
        ctx.commit();
    }

    pub(crate) fn convert_point_to_simple(&mut self, ctx: &mut Ctx, index: usize) {
        let Some(id) = self.item_id else {
            return;
        };
        let converted = self
            .with_props(ctx, |props| match props.points.get(index) {
                Some(point) => {
                    let pos = point.pos();
                    props.points[index] = CurvePoint::linear(pos.x, pos.y);
                    true
                }
                None => false,
            })
            .unwrap_or(false);
        if converted {
            ctx.events.emit_item_changed(id);
            ctx.rebuild_dependants(id);
            ctx.commit();
        }
    }

    pub(crate) fn detach_source(&mut self, ctx: &mut Ctx) {
        let Some(id) = self.item_id else {
            return;
        };
        self.with_props(ctx, |props| {
            props.source_item = None;
            props.source_item_position = 0.0;
        });
        ctx.events.emit_item_changed(id);
        ctx.commit();
    }

    pub(crate) fn detach_destination(&mut self, ctx: &mut Ctx) {
        let Some(id) = self.item_id else {
            return;
        };
        self.with_props(ctx, |props| {
            props.destination_item = None;
            props.destination_item_position = 0.0;
        });
        ctx.events.emit_item_changed(id);
        ctx.commit();
    }

    fn select_points_by_box(&mut self, ctx: &mut Ctx, ev: &PointerEvent, world_box: Area) {
        let inclusive = ev.modifiers.multi_select();
        if !inclusive {
            self.selected_points.clear();
        }
        let screen_box = Area::from_corners(self.original_click_screen, Point::new(ev.mx, ev.my));
        let viewport_kind = self
            .item_id
            .and_then(|id| ctx.scheme.find_item_by_id(id))
            .map(|item| item.area.kind == AreaKind::Viewport)
            .unwrap_or(false);
        let tf = self.transform(ctx);
        let Some(props) = self.props(ctx) else {
            return;
        };
        for (index, point) in props.points.iter().enumerate() {
            let world = tf.apply(point.pos());
            let inside = if viewport_kind {
                screen_box.contains(world.x, world.y)
            } else {
                world_box.contains(world.x, world.y)
            };
            if inside {
                self.selected_points.insert(index);
            }
        }
    }
}

impl State for EditCurveState {
    fn name(&self) -> &'static str {
        "edit-curve"
    }

    fn mouse_down(&mut self, ctx: &mut Ctx, ev: &PointerEvent, object: &HitObject) -> Transition {
        let point = self.event_point(ctx, ev);
        self.original_click_point = point;
        self.original_click_screen = Point::new(ev.mx, ev.my);

        if self.should_drag_screen {
            self.started_dragging_screen = true;
            self.original_screen_offset =
                Point::new(ctx.scheme.screen_transform.x, ctx.scheme.screen_transform.y);
            return Transition::Stay;
        }

        if !self.added_to_scheme {
            self.init_first_click(ctx, point);
            return Transition::Stay;
        }

        if self.creating_new_points {
            // A click that lands with a live destination attachment closes
            // the connector.
            let attached = self
                .props(ctx)
                .map(|p| p.destination_item.is_some())
                .unwrap_or(false);
            if attached {
                let name = self.create_name_from_attached_items(ctx);
                if let Some(id) = self.item_id
                    && let Some(item) = ctx.scheme.find_item_by_id_mut(id)
                {
                    item.name = name;
                }
                return self.submit_item(ctx);
            }

            let tf = self.transform(ctx);
            let snapped = self.snap_curve_point(ctx, tf, point);
            let should_close = self
                .props(ctx)
                .map(|p| p.points.len() > 2 && self.should_join_closed_points)
                .unwrap_or(false);
            self.with_props(ctx, |props| {
                if let Some(last) = props.points.last_mut() {
                    last.set_pos(snapped);
                }
            });
            if should_close {
                self.with_props(ctx, |props| {
                    props.closed = true;
                    props.points.pop();
                });
                return self.submit_item(ctx);
            }
            self.candidate_point_submitted = true;
            return Transition::Stay;
        }

        // Editing an existing curve.
        if ev.button == MouseButton::Right {
            self.handle_right_click(ctx, ev, object);
            return Transition::Stay;
        }
        match object {
            HitObject::CurvePoint { index } => {
                self.dragged_original_point = self
                    .props(ctx)
                    .and_then(|props| props.points.get(*index).copied());
                self.dragged_object = Some(DraggedObject::Point(*index));
                self.toggle_point_selection(*index, ev.modifiers.multi_select());
            }
            HitObject::CurveControlPoint { index, control } => {
                self.dragged_original_point = self
                    .props(ctx)
                    .and_then(|props| props.points.get(*index).copied());
                self.dragged_object = Some(DraggedObject::ControlPoint {
                    index: *index,
                    control: *control,
                });
            }
            _ => {
                self.multi_select_box = Some(Area::new(point.x, point.y, 0.0, 0.0));
            }
        }
        Transition::Stay
    }

    fn mouse_move(&mut self, ctx: &mut Ctx, ev: &PointerEvent, _object: &HitObject) -> Transition {
        let point = self.event_point(ctx, ev);

        if self.should_drag_screen && self.started_dragging_screen {
            ctx.scheme.screen_transform.x =
                (self.original_screen_offset.x + ev.mx - self.original_click_screen.x).floor();
            ctx.scheme.screen_transform.y =
                (self.original_screen_offset.y + ev.my - self.original_click_screen.y).floor();
            ctx.events.emit(EditorEvent::Redraw);
            return Transition::Stay;
        }

        if self.added_to_scheme && self.creating_new_points {
            let Some(props) = self.props(ctx) else {
                return Transition::Stay;
            };
            if props.points.is_empty() {
                return Transition::Stay;
            }
            let point_index = props.points.len() - 1;

            if self.candidate_point_submitted && !props.connector {
                // Dragging the just-placed point grows mirrored bezier
                // handles; connectors keep plain points.
                self.with_props(ctx, |props| {
                    let base = props.points[point_index].pos();
                    props.points[point_index] = CurvePoint::Bezier {
                        x: base.x,
                        y: base.y,
                        x1: -(point.x - base.x),
                        y1: -(point.y - base.y),
                        x2: point.x - base.x,
                        y2: point.y - base.y,
                    };
                });
            } else {
                let tf = self.transform(ctx);
                let snapped = self.snap_curve_point(ctx, tf, point);
                self.with_props(ctx, |props| {
                    if let Some(last) = props.points.last_mut() {
                        last.set_pos(snapped);
                    }
                });
                self.should_join_closed_points = false;

                if props.points.len() > 2 {
                    // Near the first point (in screen distance) the curve
                    // offers to close.
                    let first = props.points[0].pos();
                    let current = self.props(ctx).map(|p| p.points[point_index].pos()).unwrap_or(first);
                    let scale = ctx.scheme.screen_transform.scale;
                    if current.distance_to(first) * scale <= CLOSE_CURVE_THRESHOLD {
                        self.with_props(ctx, |props| {
                            props.points[point_index].set_pos(first);
                        });
                        if props.source_item.is_none() {
                            self.should_join_closed_points = true;
                        }
                    }
                }
            }
            if !self.should_join_closed_points {
                self.handle_edge_curve_point_drag(ctx, point_index, false);
            }
            if let Some(id) = self.item_id {
                ctx.events.emit_item_changed(id);
            }
            return Transition::Stay;
        }

        match self.dragged_object {
            Some(DraggedObject::Point(index)) => {
                self.handle_curve_point_drag(ctx, point, index);
            }
            Some(DraggedObject::ControlPoint { .. }) => {
                let symmetric = !ev.modifiers.multi_select();
                self.handle_control_point_drag(ctx, point, symmetric);
            }
            None => {
                if self.multi_select_box.is_some() {
                    let updated = Area::from_corners(self.original_click_point, point);
                    self.multi_select_box = Some(updated);
                    ctx.events.emit(EditorEvent::MultiSelectBoxAppeared(updated));
                }
            }
        }
        Transition::Stay
    }

    fn mouse_up(&mut self, ctx: &mut Ctx, ev: &PointerEvent, _object: &HitObject) -> Transition {
        let point = self.event_point(ctx, ev);
        ctx.events.emit_items_highlighted(Vec::new());

        if let Some(world_box) = self.multi_select_box.take() {
            self.select_points_by_box(ctx, ev, world_box);
            ctx.events.emit(EditorEvent::MultiSelectBoxDisappeared);
        } else if self.added_to_scheme && self.creating_new_points && self.candidate_point_submitted {
            self.candidate_point_submitted = false;
            let tf = self.transform(ctx);
            let snapped = self.snap_curve_point(ctx, tf, point);
            self.with_props(ctx, |props| {
                props.points.push(CurvePoint::linear(snapped.x, snapped.y));
            });
            if let Some(id) = self.item_id {
                ctx.events.emit_item_changed(id);
            }
        }

        if self.dragged_object.is_some() && self.dragged_something {
            ctx.commit();
        }
        self.dragged_something = false;
        self.soft_reset();
        Transition::Stay
    }

    fn mouse_double_click(
        &mut self,
        ctx: &mut Ctx,
        ev: &PointerEvent,
        object: &HitObject,
    ) -> Transition {
        if self.creating_new_points {
            return Transition::Stay;
        }
        if matches!(
            object,
            HitObject::CurvePoint { .. } | HitObject::CurveControlPoint { .. }
        ) {
            return Transition::Stay;
        }
        let point = self.event_point(ctx, ev);
        self.insert_point_at_coords(ctx, point);
        Transition::Stay
    }

    fn key_pressed(&mut self, ctx: &mut Ctx, key: Key) -> Transition {
        match key {
            Key::Space => {
                if !self.started_dragging_screen {
                    self.should_drag_screen = true;
                }
            }
            Key::Delete => self.delete_selected_points(ctx),
            Key::Escape => {}
        }
        Transition::Stay
    }

    fn key_up(&mut self, _ctx: &mut Ctx, key: Key) -> Transition {
        if key == Key::Space {
            self.should_drag_screen = false;
            self.started_dragging_screen = false;
        }
        Transition::Stay
    }

    fn cancel(&mut self, ctx: &mut Ctx) -> Transition {
        ctx.events.emit_items_highlighted(Vec::new());
        if self.creating_new_points {
            if !self.added_to_scheme {
                return Transition::ToIdle;
            }
            // Drop the unconfirmed trailing point; keep the rest if it
            // still forms a curve.
            self.with_props(ctx, |props| {
                props.points.pop();
            });
            return self.submit_item(ctx);
        }
        if let Some(id) = self.item_id {
            ctx.scheme.readjust_item(id);
            ctx.rebuild_dependants(id);
        }
        Transition::ToIdle
    }
}
