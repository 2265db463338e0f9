//! Whole-item dragging, dragger resizing, reroute dragging and the
//! multi-select box. This is the state a pointer-down from idle lands in.

use crate::editor::{Ctx, State, Transition};
use crate::events::EditorEvent;
use crate::input::{HitObject, PointerEvent};
use skema_core::container::{DragEdge, Dragger};
use skema_core::geometry::{Area, Point};
use skema_core::id::ItemId;

enum DragMode {
    /// Pressed without anything to drag (e.g. a reroute was just removed).
    Inert,
    /// Moving every selected item by the pointer delta.
    Items,
    Dragger { item: ItemId, dragger: Dragger },
    Reroute { connector: ItemId, index: usize },
    SelectBox { world_box: Area },
}

pub struct DragItemState {
    mode: DragMode,
    original_point: Point,
    original_screen_point: Point,
    started_dragging: bool,
    /// Whether any geometry actually changed; decides the commit on
    /// mouse-up.
    dirty: bool,
}

impl DragItemState {
    /// Runs the pointer-down logic (selection updates, reroute add/remove,
    /// drag bookkeeping) and returns the initialized state.
    pub(crate) fn begin(ctx: &mut Ctx, ev: &PointerEvent, object: &HitObject) -> DragItemState {
        let mut state = DragItemState {
            mode: DragMode::Inert,
            original_point: Point::new(ev.x, ev.y),
            original_screen_point: Point::new(ev.mx, ev.my),
            started_dragging: false,
            dirty: false,
        };

        match object {
            HitObject::ItemDragger { item, dragger } => {
                state.capture_original_areas(ctx, &[*item]);
                state.mode = DragMode::Dragger {
                    item: *item,
                    dragger: dragger.clone(),
                };
                state.started_dragging = true;
            }
            HitObject::ConnectorSegment { connector, reroute } => {
                if ev.modifiers.command() {
                    match reroute {
                        Some(index) => {
                            // Ctrl-click on a reroute removes it.
                            if let Some(c) = ctx.scheme.find_connector_by_id_mut(*connector) {
                                if *index < c.reroutes.len() {
                                    c.reroutes.remove(*index);
                                }
                            }
                            ctx.scheme.build_connector(*connector);
                            ctx.events.emit(EditorEvent::RedrawConnector(*connector));
                            state.dirty = true;
                        }
                        None => {
                            // Ctrl-click on the body inserts one and drags it.
                            if let Some(index) = ctx.scheme.add_reroute(ev.x, ev.y, *connector) {
                                ctx.events.emit(EditorEvent::RedrawConnector(*connector));
                                state.mode = DragMode::Reroute {
                                    connector: *connector,
                                    index,
                                };
                                state.started_dragging = true;
                            }
                        }
                    }
                } else {
                    ctx.scheme.select_connector(*connector);
                    ctx.scheme.deselect_all_items();
                    ctx.events.emit(EditorEvent::AllItemsDeselected);
                    ctx.events.emit(EditorEvent::ConnectorSelected(*connector));
                    if let Some(index) = reroute {
                        state.mode = DragMode::Reroute {
                            connector: *connector,
                            index: *index,
                        };
                        state.started_dragging = true;
                    }
                }
            }
            HitObject::Item(id) => {
                let already_selected = ctx
                    .scheme
                    .find_item_by_id(*id)
                    .map(|item| item.meta.selected)
                    .unwrap_or(false);
                if !already_selected {
                    ctx.scheme.select_item(*id, ev.modifiers.multi_select());
                    ctx.scheme.deselect_all_connectors();
                    ctx.events.emit(EditorEvent::ItemSelected(*id));
                    ctx.events.emit(EditorEvent::AllConnectorsDeselected);
                }
                let selected = ctx.scheme.selected_items.clone();
                state.capture_original_areas(ctx, &selected);
                state.mode = DragMode::Items;
                state.started_dragging = true;
            }
            HitObject::None => {
                state.mode = DragMode::SelectBox {
                    world_box: Area::new(ev.x, ev.y, 0.0, 0.0),
                };
            }
            HitObject::CurvePoint { .. } | HitObject::CurveControlPoint { .. } => {
                // Curve handles belong to the curve editing state.
            }
        }
        state
    }

    fn capture_original_areas(&self, ctx: &mut Ctx, ids: &[ItemId]) {
        for &id in ids {
            if let Some(item) = ctx.scheme.find_item_by_id_mut(id) {
                item.meta.original_area = Some(item.area);
            }
        }
    }

    fn drag_items(&mut self, ctx: &mut Ctx, dx: f32, dy: f32) {
        if dx.abs() <= 0.0 && dy.abs() <= 0.0 {
            return;
        }
        let selected = ctx.scheme.selected_items.clone();
        for id in selected {
            let Some(item) = ctx.scheme.find_item_by_id_mut(id) else {
                continue;
            };
            if item.locked {
                continue;
            }
            let Some(original) = item.meta.original_area else {
                continue;
            };
            item.area.x = ctx.snapper.snap(original.x + dx);
            item.area.y = ctx.snapper.snap(original.y + dy);
            ctx.scheme.reindex_item_transforms(id);
            ctx.rebuild_dependants(id);
            ctx.events.emit_item_changed(id);
            self.dirty = true;
        }
        ctx.events.emit(EditorEvent::Redraw);
    }

    fn drag_by_dragger(&mut self, ctx: &mut Ctx, item_id: ItemId, dragger: &Dragger, ev: &PointerEvent) {
        let locked = ctx
            .scheme
            .find_item_by_id(item_id)
            .map(|item| item.locked)
            .unwrap_or(true);
        if locked {
            return;
        }
        let Some(item) = ctx.scheme.find_item_by_id_mut(item_id) else {
            return;
        };
        let Some(original) = item.meta.original_area else {
            return;
        };

        let mut nx = item.area.x;
        let mut ny = item.area.y;
        let mut nw = item.area.w;
        let mut nh = item.area.h;
        let mut change = 0.0f32;
        for edge in &dragger.edges {
            match edge {
                DragEdge::Top => {
                    let dy = ev.y - dragger.y;
                    change += dy.abs();
                    ny = original.y + dy;
                    nh = original.h - dy;
                }
                DragEdge::Bottom => {
                    let dy = ev.y - dragger.y;
                    change += dy.abs();
                    nh = original.h + dy;
                }
                DragEdge::Left => {
                    let dx = ev.x - dragger.x;
                    change += dx.abs();
                    nx = original.x + dx;
                    nw = original.w - dx;
                }
                DragEdge::Right => {
                    let dx = ev.x - dragger.x;
                    change += dx.abs();
                    nw = original.w + dx;
                }
            }
        }
        // A resize that would collapse or invert the item is refused.
        if nw > 0.0 && nh > 0.0 {
            item.area.x = nx;
            item.area.y = ny;
            item.area.w = nw;
            item.area.h = nh;
        }
        if change > 0.0 {
            ctx.scheme.reindex_item_transforms(item_id);
            ctx.rebuild_dependants(item_id);
            ctx.events.emit_item_changed(item_id);
            self.dirty = true;
        }
    }

    fn drag_reroute(&mut self, ctx: &mut Ctx, connector_id: ItemId, index: usize, ev: &PointerEvent) {
        let changed = {
            let Some(connector) = ctx.scheme.find_connector_by_id_mut(connector_id) else {
                return;
            };
            match connector.reroutes.get_mut(index) {
                Some(reroute) => {
                    reroute.x = ev.x;
                    reroute.y = ev.y;
                    true
                }
                None => false,
            }
        };
        if changed {
            ctx.scheme.build_connector(connector_id);
            ctx.events.emit(EditorEvent::RedrawConnector(connector_id));
            self.dirty = true;
        }
    }

    fn update_select_box(world_box: &mut Area, origin: Point, ev: &PointerEvent) {
        *world_box = Area::from_corners(origin, Point::new(ev.x, ev.y));
    }
}

impl State for DragItemState {
    fn name(&self) -> &'static str {
        "drag-item"
    }

    fn mouse_move(&mut self, ctx: &mut Ctx, ev: &PointerEvent, _object: &HitObject) -> Transition {
        if !ev.buttons_down {
            // The press ended outside the window; treat the gesture as
            // abandoned.
            return Transition::ToIdle;
        }
        match &mut self.mode {
            DragMode::Items => {
                let dx = ev.x - self.original_point.x;
                let dy = ev.y - self.original_point.y;
                self.drag_items(ctx, dx, dy);
            }
            DragMode::Dragger { item, dragger } => {
                let item = *item;
                let dragger = dragger.clone();
                self.drag_by_dragger(ctx, item, &dragger, ev);
            }
            DragMode::Reroute { connector, index } => {
                let connector = *connector;
                let index = *index;
                self.drag_reroute(ctx, connector, index, ev);
            }
            DragMode::SelectBox { world_box } => {
                Self::update_select_box(world_box, self.original_point, ev);
                let snapshot = *world_box;
                ctx.events.emit(EditorEvent::MultiSelectBoxAppeared(snapshot));
            }
            DragMode::Inert => {}
        }
        Transition::Stay
    }

    fn mouse_up(&mut self, ctx: &mut Ctx, ev: &PointerEvent, _object: &HitObject) -> Transition {
        if let DragMode::SelectBox { world_box } = &self.mode {
            let screen_box = Area::from_corners(self.original_screen_point, Point::new(ev.mx, ev.my));
            ctx.scheme
                .select_by_boundary_box(*world_box, screen_box, ev.modifiers.multi_select());
            ctx.events.emit(EditorEvent::MultiSelectBoxDisappeared);
        }
        if self.dirty {
            ctx.commit();
        }
        Transition::ToIdle
    }

    fn mouse_double_click(
        &mut self,
        ctx: &mut Ctx,
        ev: &PointerEvent,
        object: &HitObject,
    ) -> Transition {
        if let HitObject::ConnectorSegment { connector, reroute } = object {
            match reroute {
                Some(index) => {
                    if let Some(c) = ctx.scheme.find_connector_by_id_mut(*connector)
                        && *index < c.reroutes.len()
                    {
                        c.reroutes.remove(*index);
                    }
                }
                None => {
                    ctx.scheme.add_reroute(ev.x, ev.y, *connector);
                }
            }
            ctx.scheme.build_connector(*connector);
            ctx.events.emit(EditorEvent::RedrawConnector(*connector));
            ctx.commit();
        }
        Transition::Stay
    }

    fn cancel(&mut self, ctx: &mut Ctx) -> Transition {
        // Abandoning mid-drag restores the captured areas.
        let selected = ctx.scheme.selected_items.clone();
        for id in selected {
            let restored = {
                let Some(item) = ctx.scheme.find_item_by_id_mut(id) else {
                    continue;
                };
                match item.meta.original_area.take() {
                    Some(original) => {
                        item.area = original;
                        true
                    }
                    None => false,
                }
            };
            if restored {
                ctx.scheme.reindex_item_transforms(id);
                ctx.rebuild_dependants(id);
                ctx.events.emit_item_changed(id);
            }
        }
        ctx.events.emit(EditorEvent::MultiSelectBoxDisappeared);
        Transition::ToIdle
    }
}
