//! Input abstraction layer.
//!
//! Normalizes host pointer and keyboard events into the value types the
//! interaction states consume. Pointer events carry both world coordinates
//! (after the screen transform) and raw screen coordinates — viewport-type
//! items and the pan/zoom state work on the latter.

use skema_core::container::Dragger;
use skema_core::id::ItemId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Modifiers {
    pub shift: bool,
    pub ctrl: bool,
    pub alt: bool,
    pub meta: bool,
}

impl Modifiers {
    pub const NONE: Modifiers = Modifiers {
        shift: false,
        ctrl: false,
        alt: false,
        meta: false,
    };

    /// Any of the keys that switch clicks and boxes into inclusive
    /// selection mode.
    pub fn multi_select(&self) -> bool {
        self.shift || self.ctrl || self.meta
    }

    /// Ctrl (or ⌘ on mac) — reroute editing on connectors.
    pub fn command(&self) -> bool {
        self.ctrl || self.meta
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MouseButton {
    #[default]
    Left,
    Right,
    Middle,
}

/// A normalized pointer event. `x`/`y` are world coordinates, `mx`/`my`
/// the untransformed screen coordinates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PointerEvent {
    pub x: f32,
    pub y: f32,
    pub mx: f32,
    pub my: f32,
    pub button: MouseButton,
    /// Whether any button is still held. A move event with no buttons held
    /// means the gesture ended outside the window.
    pub buttons_down: bool,
    pub modifiers: Modifiers,
}

impl PointerEvent {
    /// World and screen coordinates coincide at zoom 1 with no pan; handy
    /// for tests and simple hosts.
    pub fn at(x: f32, y: f32) -> Self {
        Self {
            x,
            y,
            mx: x,
            my: y,
            button: MouseButton::Left,
            buttons_down: true,
            modifiers: Modifiers::NONE,
        }
    }

    pub fn with_modifiers(mut self, modifiers: Modifiers) -> Self {
        self.modifiers = modifiers;
        self
    }

    pub fn with_button(mut self, button: MouseButton) -> Self {
        self.button = button;
        self
    }

    pub fn released(mut self) -> Self {
        self.buttons_down = false;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Key {
    Escape,
    Space,
    Delete,
}

/// What the pointer landed on, as resolved by the render layer's hit
/// testing (or [`crate::editor::Editor::hit_test`] for simple hosts).
#[derive(Debug, Clone, PartialEq, Default)]
pub enum HitObject {
    #[default]
    None,
    Item(ItemId),
    /// A resize handle of the selection box.
    ItemDragger { item: ItemId, dragger: Dragger },
    /// A connector body segment, or one of its reroute handles.
    ConnectorSegment {
        connector: ItemId,
        reroute: Option<usize>,
    },
    /// A point of the curve being edited.
    CurvePoint { index: usize },
    /// A bezier control handle; `control` is 1 or 2.
    CurveControlPoint { index: usize, control: u8 },
}
