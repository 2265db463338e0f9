//! Item and component creation gestures, and item-to-item connecting.

use crate::editor::{Ctx, State, Transition};
use crate::events::EditorEvent;
use crate::input::{HitObject, PointerEvent};
use skema_core::geometry::{Area, Point};
use skema_core::id::ItemId;
use skema_core::model::Item;

/// Normalize a press-drag rectangle into the item's area.
fn update_area_from_drag(area: &mut Area, origin: Point, x: f32, y: f32) {
    if x > origin.x {
        area.w = x - origin.x;
        area.x = origin.x;
    } else {
        area.w = origin.x - x;
        area.x = x;
    }
    if y > origin.y {
        area.h = y - origin.y;
        area.y = origin.y;
    } else {
        area.h = origin.y - y;
        area.y = y;
    }
}

// ─── CreateItem ──────────────────────────────────────────────────────────

/// Press plants the armed item, drag sizes it, release submits it — and
/// possibly nests it under the tightest selected container.
pub struct CreateItemState {
    pending: Option<Item>,
    item_id: Option<ItemId>,
    original_point: Point,
    added_to_scheme: bool,
}

impl CreateItemState {
    pub fn new(item: Item) -> Self {
        Self {
            pending: Some(item),
            item_id: None,
            original_point: Point::ZERO,
            added_to_scheme: false,
        }
    }

    fn update_item_area(&self, ctx: &mut Ctx, x: f32, y: f32) {
        let Some(id) = self.item_id else {
            return;
        };
        if let Some(item) = ctx.scheme.find_item_by_id_mut(id) {
            update_area_from_drag(&mut item.area, self.original_point, x, y);
            let snapshot = item.area;
            ctx.scheme.set_active_boundary_box(Some(snapshot));
            ctx.scheme.reindex_item_transforms(id);
            ctx.events.emit_item_changed(id);
        }
    }

    fn submit(&mut self, ctx: &mut Ctx) -> Transition {
        let Some(id) = self.item_id.take() else {
            return Transition::ToIdle;
        };
        ctx.scheme.set_active_boundary_box(None);

        let area = match ctx.scheme.find_item_by_id(id) {
            Some(item) => item.area,
            None => return Transition::ToIdle,
        };
        let candidates = ctx.scheme.selected_items.clone();
        let parent = ctx.scheme.find_item_suitable_for_parent(&candidates, &area, id);
        ctx.scheme.deselect_all_items();
        if let Some(parent_id) = parent {
            ctx.scheme.remount_item_inside_other_item(id, parent_id);
        }
        ctx.scheme.select_item(id, false);
        ctx.events.emit(EditorEvent::SwitchModeToEdit);
        ctx.events.emit_item_changed(id);
        ctx.commit();
        Transition::ToIdle
    }
}

impl State for CreateItemState {
    fn name(&self) -> &'static str {
        "create-item"
    }

    fn mouse_down(&mut self, ctx: &mut Ctx, ev: &PointerEvent, _object: &HitObject) -> Transition {
        let Some(mut item) = self.pending.take() else {
            return Transition::ToIdle;
        };
        self.original_point = Point::new(ctx.snap_x(ev.x), ctx.snap_y(ev.y));
        item.name = ctx.scheme.generate_unique_name(&item.name);
        item.area.x = self.original_point.x;
        item.area.y = self.original_point.y;
        item.area.w = 0.0;
        item.area.h = 0.0;
        let id = ctx.scheme.add_item(item);
        let area = ctx.scheme.find_item_by_id(id).map(|i| i.area);
        ctx.scheme.set_active_boundary_box(area);
        self.item_id = Some(id);
        self.added_to_scheme = true;
        Transition::Stay
    }

    fn mouse_move(&mut self, ctx: &mut Ctx, ev: &PointerEvent, _object: &HitObject) -> Transition {
        if !self.added_to_scheme {
            return Transition::Stay;
        }
        if !ev.buttons_down {
            // The release happened outside the window; finish with what we
            // have instead of leaking an in-progress item.
            return self.submit(ctx);
        }
        self.update_item_area(ctx, ctx.snap_x(ev.x), ctx.snap_y(ev.y));
        Transition::Stay
    }

    fn mouse_up(&mut self, ctx: &mut Ctx, ev: &PointerEvent, _object: &HitObject) -> Transition {
        if self.added_to_scheme {
            self.update_item_area(ctx, ctx.snap_x(ev.x), ctx.snap_y(ev.y));
            self.submit(ctx)
        } else {
            Transition::ToIdle
        }
    }

    fn cancel(&mut self, ctx: &mut Ctx) -> Transition {
        if let Some(id) = self.item_id.take() {
            // The unfinished item was never committed; remove it entirely.
            ctx.scheme.delete_item(id);
        }
        ctx.scheme.set_active_boundary_box(None);
        Transition::ToIdle
    }
}

// ─── CreateComponent ─────────────────────────────────────────────────────

/// Like item creation, but components never get nested on submit.
pub struct CreateComponentState {
    pending: Option<Item>,
    item_id: Option<ItemId>,
    original_point: Point,
    added_to_scheme: bool,
}

impl CreateComponentState {
    pub fn new(item: Item) -> Self {
        Self {
            pending: Some(item),
            item_id: None,
            original_point: Point::ZERO,
            added_to_scheme: false,
        }
    }
}

impl State for CreateComponentState {
    fn name(&self) -> &'static str {
        "create-component"
    }

    fn mouse_down(&mut self, ctx: &mut Ctx, ev: &PointerEvent, _object: &HitObject) -> Transition {
        let Some(mut item) = self.pending.take() else {
            return Transition::ToIdle;
        };
        self.original_point = Point::new(ctx.snap_x(ev.x), ctx.snap_y(ev.y));
        item.area.x = self.original_point.x;
        item.area.y = self.original_point.y;
        item.area.w = 0.0;
        item.area.h = 0.0;
        let id = ctx.scheme.add_item(item);
        let area = ctx.scheme.find_item_by_id(id).map(|i| i.area);
        ctx.scheme.set_active_boundary_box(area);
        self.item_id = Some(id);
        self.added_to_scheme = true;
        Transition::Stay
    }

    fn mouse_move(&mut self, ctx: &mut Ctx, ev: &PointerEvent, _object: &HitObject) -> Transition {
        if let Some(id) = self.item_id
            && self.added_to_scheme
        {
            let snap_x = ctx.snap_x(ev.x);
            let snap_y = ctx.snap_y(ev.y);
            if let Some(item) = ctx.scheme.find_item_by_id_mut(id) {
                update_area_from_drag(
                    &mut item.area,
                    self.original_point,
                    snap_x,
                    snap_y,
                );
                let snapshot = item.area;
                ctx.scheme.set_active_boundary_box(Some(snapshot));
                ctx.scheme.reindex_item_transforms(id);
                ctx.events.emit_item_changed(id);
            }
        }
        Transition::Stay
    }

    fn mouse_up(&mut self, ctx: &mut Ctx, _ev: &PointerEvent, _object: &HitObject) -> Transition {
        let Some(id) = self.item_id.take() else {
            return Transition::ToIdle;
        };
        ctx.scheme.set_active_boundary_box(None);
        ctx.scheme.select_item(id, false);
        ctx.events.emit(EditorEvent::ItemSelected(id));
        ctx.events.emit(EditorEvent::SwitchModeToEdit);
        ctx.commit();
        Transition::ToIdle
    }

    fn cancel(&mut self, ctx: &mut Ctx) -> Transition {
        if let Some(id) = self.item_id.take() {
            ctx.scheme.delete_item(id);
        }
        ctx.scheme.set_active_boundary_box(None);
        Transition::ToIdle
    }
}

// ─── Connecting ──────────────────────────────────────────────────────────

/// Click a source item, then a destination item; a connector is created
/// between their outlines. Only components and overlays participate.
pub struct ConnectingState {
    source_item: Option<ItemId>,
    pub hovered_item: Option<ItemId>,
}

impl ConnectingState {
    pub fn new(source_item: Option<ItemId>) -> Self {
        Self {
            source_item,
            hovered_item: None,
        }
    }

    fn connectable(ctx: &Ctx, id: ItemId) -> bool {
        ctx.scheme
            .find_item_by_id(id)
            .map(|item| item.shape.is_connectable())
            .unwrap_or(false)
    }
}

impl State for ConnectingState {
    fn name(&self) -> &'static str {
        "connecting"
    }

    fn mouse_move(&mut self, ctx: &mut Ctx, _ev: &PointerEvent, object: &HitObject) -> Transition {
        self.hovered_item = match object {
            HitObject::Item(id) if Self::connectable(ctx, *id) => Some(*id),
            _ => None,
        };
        Transition::Stay
    }

    fn mouse_down(&mut self, ctx: &mut Ctx, _ev: &PointerEvent, object: &HitObject) -> Transition {
        let HitObject::Item(id) = object else {
            return Transition::Stay;
        };
        if !Self::connectable(ctx, *id) {
            return Transition::Stay;
        }
        match self.source_item {
            Some(source) if source != *id => {
                if let Some(connector_id) = ctx.scheme.connect_items(source, *id) {
                    ctx.events.emit(EditorEvent::RedrawConnector(connector_id));
                    ctx.events.emit(EditorEvent::SwitchModeToEdit);
                    ctx.commit();
                }
                Transition::ToIdle
            }
            _ => {
                self.source_item = Some(*id);
                Transition::Stay
            }
        }
    }
}
