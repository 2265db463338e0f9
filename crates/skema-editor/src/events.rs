//! Editor event bus: discrete change notifications for the render layer.
//!
//! The core never assumes a synchronous re-render — events are queued here
//! and the host drains them once per frame, translating them into visual
//! updates. Each event names the affected entity ids.

use skema_core::geometry::Area;
use skema_core::id::ItemId;
use std::collections::VecDeque;

/// Context-menu entries offered for a curve point under the pointer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContextMenuOption {
    DeletePoint(usize),
    ConvertToBezier(usize),
    ConvertToSimple(usize),
    DetachSource,
    DetachDestination,
}

#[derive(Debug, Clone, PartialEq)]
pub enum EditorEvent {
    ItemChanged(ItemId),
    ItemsHighlighted(Vec<ItemId>),
    /// One undoable unit of work was completed.
    SchemeChangeCommitted,
    RedrawConnector(ItemId),
    Redraw,
    ItemSelected(ItemId),
    AllItemsDeselected,
    ConnectorSelected(ItemId),
    AllConnectorsDeselected,
    MultiSelectBoxAppeared(Area),
    MultiSelectBoxDisappeared,
    SwitchModeToEdit,
    StateCancelled,
    ContextMenuRequested {
        mx: f32,
        my: f32,
        options: Vec<ContextMenuOption>,
    },
}

/// FIFO queue of pending notifications.
#[derive(Debug, Default)]
pub struct EditorEventBus {
    queue: VecDeque<EditorEvent>,
}

impl EditorEventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn emit(&mut self, event: EditorEvent) {
        self.queue.push_back(event);
    }

    pub fn emit_item_changed(&mut self, id: ItemId) {
        self.emit(EditorEvent::ItemChanged(id));
    }

    pub fn emit_items_highlighted(&mut self, ids: Vec<ItemId>) {
        self.emit(EditorEvent::ItemsHighlighted(ids));
    }

    /// Take all pending events, oldest first.
    pub fn drain(&mut self) -> Vec<EditorEvent> {
        self.queue.drain(..).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    /// Events currently queued, without consuming them. Test helper.
    pub fn peek(&self) -> impl Iterator<Item = &EditorEvent> {
        self.queue.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn events_drain_in_emit_order() {
        let mut bus = EditorEventBus::new();
        let id = ItemId::intern("ev_item");
        bus.emit_item_changed(id);
        bus.emit(EditorEvent::SchemeChangeCommitted);
        let drained = bus.drain();
        assert_eq!(
            drained,
            vec![EditorEvent::ItemChanged(id), EditorEvent::SchemeChangeCommitted]
        );
        assert!(bus.is_empty());
    }
}
