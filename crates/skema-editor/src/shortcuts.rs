//! Keyboard shortcut mapping.
//!
//! Maps key + modifier combos to semantic editor actions, so hosts on
//! every platform share one binding table. `ctrl` and `meta` are treated
//! as the same command key.

use crate::input::Modifiers;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShortcutAction {
    Undo,
    Redo,
    Delete,
    Deselect,
    ZoomIn,
    ZoomOut,
    ZoomToFit,
    PanStart,
}

pub struct ShortcutMap;

impl ShortcutMap {
    /// Resolve a `KeyboardEvent.key`-style value to an action. Returns
    /// `None` for unbound combos.
    pub fn resolve(key: &str, modifiers: Modifiers) -> Option<ShortcutAction> {
        let cmd = modifiers.command();

        if cmd && modifiers.shift {
            return match key {
                "z" | "Z" => Some(ShortcutAction::Redo),
                _ => None,
            };
        }

        if cmd {
            return match key {
                "z" | "Z" => Some(ShortcutAction::Undo),
                "y" | "Y" => Some(ShortcutAction::Redo),
                "=" | "+" => Some(ShortcutAction::ZoomIn),
                "-" => Some(ShortcutAction::ZoomOut),
                "0" => Some(ShortcutAction::ZoomToFit),
                _ => None,
            };
        }

        match key {
            "Delete" | "Backspace" => Some(ShortcutAction::Delete),
            "Escape" => Some(ShortcutAction::Deselect),
            " " => Some(ShortcutAction::PanStart),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mods(ctrl: bool, shift: bool, meta: bool) -> Modifiers {
        Modifiers {
            ctrl,
            shift,
            meta,
            ..Modifiers::NONE
        }
    }

    #[test]
    fn resolve_undo_redo() {
        assert_eq!(
            ShortcutMap::resolve("z", mods(true, false, false)),
            Some(ShortcutAction::Undo)
        );
        assert_eq!(
            ShortcutMap::resolve("z", mods(false, false, true)),
            Some(ShortcutAction::Undo)
        );
        assert_eq!(
            ShortcutMap::resolve("z", mods(true, true, false)),
            Some(ShortcutAction::Redo)
        );
        assert_eq!(
            ShortcutMap::resolve("y", mods(true, false, false)),
            Some(ShortcutAction::Redo)
        );
    }

    #[test]
    fn resolve_single_keys() {
        assert_eq!(
            ShortcutMap::resolve("Delete", Modifiers::NONE),
            Some(ShortcutAction::Delete)
        );
        assert_eq!(
            ShortcutMap::resolve("Escape", Modifiers::NONE),
            Some(ShortcutAction::Deselect)
        );
        assert_eq!(
            ShortcutMap::resolve(" ", Modifiers::NONE),
            Some(ShortcutAction::PanStart)
        );
        assert_eq!(ShortcutMap::resolve("q", Modifiers::NONE), None);
    }

    #[test]
    fn plain_z_is_unbound() {
        assert_eq!(ShortcutMap::resolve("z", Modifiers::NONE), None);
    }
}
