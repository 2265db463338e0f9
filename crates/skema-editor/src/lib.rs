pub mod animation;
pub mod create;
pub mod curve;
pub mod drag;
pub mod editor;
pub mod events;
pub mod input;
pub mod shortcuts;
pub mod userevents;

pub use animation::{Animation, AnimationRegistry, BlinkAnimation, Easing, MoveToItemAnimation};
pub use editor::{Editor, EditorState};
pub use events::{ContextMenuOption, EditorEvent, EditorEventBus};
pub use input::{HitObject, Key, Modifiers, MouseButton, PointerEvent};
pub use shortcuts::{ShortcutAction, ShortcutMap};
pub use userevents::{CompiledAction, UserEventBus, compile_actions, init_user_events};
