//! Tick-driven animation registry.
//!
//! The host advances the registry once per display frame; each active
//! animation reports whether it should keep running. There is no thread
//! and no timer here — the whole editor is single-threaded and
//! cooperative, so ordering within a frame is simply registration order.
//!
//! Playing an animation for an item replaces whatever was already running
//! on that item. Animations started from behavior actions carry the user
//! event bus revision that was current at start; once the revision moves
//! on (scene reloaded, interactive session restarted) stale animations are
//! destroyed instead of stepped.

use crate::events::{EditorEvent, EditorEventBus};
use skema_core::container::SchemeContainer;
use skema_core::geometry::Point;
use skema_core::id::ItemId;

// ─── Easing ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Easing {
    Linear,
    Smooth,
    EaseIn,
    EaseOut,
    #[default]
    EaseInOut,
    Bounce,
}

impl Easing {
    pub fn from_name(name: &str) -> Easing {
        match name {
            "linear" => Easing::Linear,
            "smooth" => Easing::Smooth,
            "ease-in" => Easing::EaseIn,
            "ease-out" => Easing::EaseOut,
            "bounce" => Easing::Bounce,
            _ => Easing::EaseInOut,
        }
    }
}

/// Map linear progress `t` in [0, 1] to eased progress.
pub fn convert_time(t: f32, easing: Easing) -> f32 {
    let t = t.clamp(0.0, 1.0);
    match easing {
        Easing::Linear => t,
        Easing::Smooth => (1.0 - (t * std::f32::consts::PI).cos()) / 2.0,
        Easing::EaseIn => t * t,
        Easing::EaseOut => t * (2.0 - t),
        Easing::EaseInOut => {
            if t < 0.5 {
                2.0 * t * t
            } else {
                -1.0 + (4.0 - 2.0 * t) * t
            }
        }
        Easing::Bounce => {
            let n1 = 7.5625;
            let d1 = 2.75;
            if t < 1.0 / d1 {
                n1 * t * t
            } else if t < 2.0 / d1 {
                let t = t - 1.5 / d1;
                n1 * t * t + 0.75
            } else if t < 2.5 / d1 {
                let t = t - 2.25 / d1;
                n1 * t * t + 0.9375
            } else {
                let t = t - 2.625 / d1;
                n1 * t * t + 0.984375
            }
        }
    }
}

// ─── Registry ────────────────────────────────────────────────────────────

pub trait Animation {
    /// Invoked once before the first frame. Returning `false` drops the
    /// animation without playing it.
    fn init(&mut self, scheme: &mut SchemeContainer) -> bool {
        let _ = scheme;
        true
    }

    /// One frame step; `dt` is the frame delta in seconds. Returning
    /// `false` finishes the animation.
    fn play(&mut self, scheme: &mut SchemeContainer, events: &mut EditorEventBus, dt: f32) -> bool;

    /// Invoked when the animation finishes or is stopped.
    fn destroy(&mut self, scheme: &mut SchemeContainer, events: &mut EditorEventBus) {
        let _ = (scheme, events);
    }
}

struct AnimationEntry {
    item_id: Option<ItemId>,
    revision: Option<u64>,
    animation: Box<dyn Animation>,
}

#[derive(Default)]
pub struct AnimationRegistry {
    entries: Vec<AnimationEntry>,
}

impl AnimationRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an animation. An animation already running for the same
    /// item is stopped first.
    pub fn play(
        &mut self,
        scheme: &mut SchemeContainer,
        events: &mut EditorEventBus,
        mut animation: Box<dyn Animation>,
        item_id: Option<ItemId>,
        revision: Option<u64>,
    ) {
        if let Some(id) = item_id {
            self.stop_animations_for_item(scheme, events, id);
        }
        if animation.init(scheme) {
            self.entries.push(AnimationEntry {
                item_id,
                revision,
                animation,
            });
        }
    }

    /// Step every active animation, in registration order. Entries whose
    /// revision no longer matches `current_revision` are destroyed without
    /// stepping — their interactive session is gone.
    pub fn tick(
        &mut self,
        scheme: &mut SchemeContainer,
        events: &mut EditorEventBus,
        dt: f32,
        current_revision: u64,
    ) {
        let mut i = 0;
        while i < self.entries.len() {
            let stale = self.entries[i]
                .revision
                .map(|r| r != current_revision)
                .unwrap_or(false);
            let proceed = !stale && self.entries[i].animation.play(scheme, events, dt);
            if proceed {
                i += 1;
            } else {
                let mut entry = self.entries.remove(i);
                entry.animation.destroy(scheme, events);
            }
        }
    }

    pub fn stop_animations_for_item(
        &mut self,
        scheme: &mut SchemeContainer,
        events: &mut EditorEventBus,
        item_id: ItemId,
    ) {
        let mut i = 0;
        while i < self.entries.len() {
            if self.entries[i].item_id == Some(item_id) {
                let mut entry = self.entries.remove(i);
                entry.animation.destroy(scheme, events);
            } else {
                i += 1;
            }
        }
    }

    pub fn stop_all(&mut self, scheme: &mut SchemeContainer, events: &mut EditorEventBus) {
        for mut entry in self.entries.drain(..) {
            entry.animation.destroy(scheme, events);
        }
    }

    pub fn active_count(&self) -> usize {
        self.entries.len()
    }
}

// ─── Built-in animations ─────────────────────────────────────────────────

/// Moves an item (and optionally aligns its rotation) towards a target
/// position over time, reindexing transforms and rebuilding dependent
/// connectors every frame.
pub struct MoveToItemAnimation {
    item_id: ItemId,
    destination: Point,
    destination_angle: f32,
    rotate: bool,
    duration: f32,
    movement: Easing,
    elapsed: f32,
    original: Point,
    original_angle: f32,
}

impl MoveToItemAnimation {
    pub fn new(
        item_id: ItemId,
        destination: Point,
        destination_angle: f32,
        rotate: bool,
        duration: f32,
        movement: Easing,
    ) -> Self {
        Self {
            item_id,
            destination,
            destination_angle,
            rotate,
            duration,
            movement,
            elapsed: 0.0,
            original: Point::ZERO,
            original_angle: 0.0,
        }
    }

    fn apply_position(
        &self,
        scheme: &mut SchemeContainer,
        events: &mut EditorEventBus,
        pos: Point,
        angle: f32,
    ) {
        let Some(item) = scheme.find_item_by_id_mut(self.item_id) else {
            return;
        };
        item.area.x = pos.x;
        item.area.y = pos.y;
        if self.rotate {
            item.area.r = angle;
        }
        scheme.reindex_item_transforms(self.item_id);
        for rebuilt in scheme.rebuild_dependants(self.item_id) {
            events.emit(EditorEvent::RedrawConnector(rebuilt));
        }
        events.emit_item_changed(self.item_id);
    }
}

impl Animation for MoveToItemAnimation {
    fn init(&mut self, scheme: &mut SchemeContainer) -> bool {
        match scheme.find_item_by_id(self.item_id) {
            Some(item) => {
                self.original = Point::new(item.area.x, item.area.y);
                self.original_angle = item.area.r;
                true
            }
            None => false,
        }
    }

    fn play(&mut self, scheme: &mut SchemeContainer, events: &mut EditorEventBus, dt: f32) -> bool {
        if self.duration <= f32::EPSILON {
            self.apply_position(scheme, events, self.destination, self.destination_angle);
            return false;
        }
        self.elapsed += dt;
        let t = (self.elapsed / self.duration).min(1.0);
        let converted = if t >= 1.0 { 1.0 } else { convert_time(t, self.movement) };
        let pos = Point::new(
            self.original.x * (1.0 - converted) + self.destination.x * converted,
            self.original.y * (1.0 - converted) + self.destination.y * converted,
        );
        let angle = self.original_angle * (1.0 - converted) + self.destination_angle * converted;
        self.apply_position(scheme, events, pos, angle);
        t < 1.0
    }
}

/// Pulses an item's opacity between two bounds for a fixed duration, then
/// restores the original opacity.
pub struct BlinkAnimation {
    item_id: ItemId,
    duration: f32,
    speed: f32,
    min_opacity: f32,
    max_opacity: f32,
    elapsed: f32,
    original_opacity: f32,
}

impl BlinkAnimation {
    pub fn new(item_id: ItemId, duration: f32, speed: f32, min_opacity: f32, max_opacity: f32) -> Self {
        Self {
            item_id,
            duration,
            speed,
            min_opacity,
            max_opacity,
            elapsed: 0.0,
            original_opacity: 1.0,
        }
    }
}

impl Animation for BlinkAnimation {
    fn init(&mut self, scheme: &mut SchemeContainer) -> bool {
        match scheme.find_item_by_id(self.item_id) {
            Some(item) => {
                self.original_opacity = item.opacity;
                true
            }
            None => false,
        }
    }

    fn play(&mut self, scheme: &mut SchemeContainer, events: &mut EditorEventBus, dt: f32) -> bool {
        self.elapsed += dt;
        let wave = (self.elapsed * self.speed / 10.0).sin() / 2.0 + 0.5;
        let opacity = (wave * (self.max_opacity - self.min_opacity) + self.min_opacity) / 100.0;
        if let Some(item) = scheme.find_item_by_id_mut(self.item_id) {
            item.opacity = opacity;
        }
        events.emit_item_changed(self.item_id);
        self.elapsed < self.duration
    }

    fn destroy(&mut self, scheme: &mut SchemeContainer, events: &mut EditorEventBus) {
        if let Some(item) = scheme.find_item_by_id_mut(self.item_id) {
            item.opacity = self.original_opacity;
        }
        events.emit_item_changed(self.item_id);
    }
}
