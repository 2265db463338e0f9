//! Behavior compiler and user event bus.
//!
//! Items carry declarative behavior rules: "on this event, run these
//! `{element, method, args}` actions". The compiler resolves every element
//! selector against the current scene and looks the method up in a
//! registry scoped by element kind; unresolvable selectors and unknown
//! methods are skipped, never raised. The result is one callable unit that
//! applies every resolved step in declaration order.
//!
//! The bus keeps per-item, per-event subscriber lists for interactive
//! mode. Emitting an event runs all matching subscribers in subscription
//! order; `sendEvent` steps enqueue follow-up events instead of recursing,
//! so dispatch stays non-reentrant. A monotonically bumped revision token
//! invalidates animations queued by a superseded interactive session.

use crate::animation::{AnimationRegistry, BlinkAnimation, Easing, MoveToItemAnimation};
use crate::events::EditorEventBus;
use log::{debug, warn};
use serde_json::Value;
use skema_core::container::{Element, SchemeContainer};
use skema_core::id::ItemId;
use skema_core::model::{LinePattern, Shape};
use std::collections::{HashMap, VecDeque};

// ─── Compiled actions ────────────────────────────────────────────────────

#[derive(Debug, Clone)]
enum ActionOp {
    SetItemField { path: String, value: Value },
    Show,
    Hide,
    SendEvent { event: String },
    MoveToItem {
        destination: String,
        animate: bool,
        duration: f32,
        movement: Easing,
        rotate: bool,
    },
    Blink {
        duration: f32,
        speed: f32,
        min_opacity: f32,
        max_opacity: f32,
    },
    SetConnectorField { path: String, value: Value },
}

#[derive(Debug, Clone)]
struct ActionStep {
    element: Element,
    op: ActionOp,
}

/// A fully resolved action chain. Executing it has no return value —
/// effects are observed through subsequent scene state.
#[derive(Debug, Clone, Default)]
pub struct CompiledAction {
    steps: Vec<ActionStep>,
}

impl CompiledAction {
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Apply every step in declaration order. `sendEvent` steps are
    /// returned as follow-up `(item, event)` pairs for the bus to enqueue.
    pub fn execute(
        &self,
        scheme: &mut SchemeContainer,
        animations: &mut AnimationRegistry,
        events: &mut EditorEventBus,
        revision: u64,
    ) -> Vec<(ItemId, String)> {
        let mut followups = Vec::new();
        for step in &self.steps {
            match (&step.element, &step.op) {
                (Element::Item(id), ActionOp::SetItemField { path, value }) => {
                    set_item_field(scheme, events, *id, path, value);
                }
                (Element::Item(id), ActionOp::Show) => {
                    if let Some(item) = scheme.find_item_by_id_mut(*id) {
                        item.visible = true;
                        events.emit_item_changed(*id);
                    }
                }
                (Element::Item(id), ActionOp::Hide) => {
                    if let Some(item) = scheme.find_item_by_id_mut(*id) {
                        item.visible = false;
                        events.emit_item_changed(*id);
                    }
                }
                (Element::Item(id), ActionOp::SendEvent { event }) => {
                    followups.push((*id, event.clone()));
                }
                (
                    Element::Item(id),
                    ActionOp::MoveToItem {
                        destination,
                        animate,
                        duration,
                        movement,
                        rotate,
                    },
                ) => {
                    move_to_item(
                        scheme, animations, events, *id, destination, *animate, *duration,
                        *movement, *rotate, revision,
                    );
                }
                (
                    Element::Item(id),
                    ActionOp::Blink {
                        duration,
                        speed,
                        min_opacity,
                        max_opacity,
                    },
                ) => {
                    animations.play(
                        scheme,
                        events,
                        Box::new(BlinkAnimation::new(
                            *id,
                            *duration,
                            *speed,
                            *min_opacity,
                            *max_opacity,
                        )),
                        Some(*id),
                        Some(revision),
                    );
                }
                (Element::Connector(id), ActionOp::SetConnectorField { path, value }) => {
                    set_connector_field(scheme, *id, path, value);
                }
                (element, op) => {
                    debug!("skipping incompatible action {op:?} on {element:?}");
                }
            }
        }
        followups
    }
}

/// Resolve a declarative action list into a single executable action.
/// Selector resolution happens now, against the current scene graph.
pub fn compile_actions(
    scheme: &SchemeContainer,
    self_item: Option<ItemId>,
    actions: &[skema_core::model::BehaviorAction],
) -> CompiledAction {
    let mut steps = Vec::new();
    for action in actions {
        let elements = scheme.find_elements_by_selector(&action.element, self_item);
        if elements.is_empty() {
            debug!("selector {:?} resolved to nothing, skipping action", action.element);
            continue;
        }
        for element in elements {
            let op = match element {
                Element::Item(_) => compile_item_method(&action.method, &action.args),
                Element::Connector(_) => compile_connector_method(&action.method, &action.args),
            };
            match op {
                Some(op) => steps.push(ActionStep { element, op }),
                None => warn!(
                    "unknown method {:?} for element {:?}, skipping",
                    action.method, action.element
                ),
            }
        }
    }
    CompiledAction { steps }
}

fn arg_str(args: &serde_json::Map<String, Value>, key: &str) -> Option<String> {
    args.get(key).and_then(|v| v.as_str()).map(str::to_string)
}

fn arg_f32(args: &serde_json::Map<String, Value>, key: &str, default: f32) -> f32 {
    args.get(key).and_then(|v| v.as_f64()).map(|f| f as f32).unwrap_or(default)
}

fn arg_bool(args: &serde_json::Map<String, Value>, key: &str) -> bool {
    args.get(key).and_then(|v| v.as_bool()).unwrap_or(false)
}

fn compile_item_method(method: &str, args: &serde_json::Map<String, Value>) -> Option<ActionOp> {
    match method {
        "set" => Some(ActionOp::SetItemField {
            path: arg_str(args, "field")?,
            value: args.get("value").cloned().unwrap_or(Value::Null),
        }),
        "show" => Some(ActionOp::Show),
        "hide" => Some(ActionOp::Hide),
        "sendEvent" => Some(ActionOp::SendEvent {
            event: arg_str(args, "event")?,
        }),
        "moveToItem" => Some(ActionOp::MoveToItem {
            destination: arg_str(args, "destinationItem")?,
            animate: arg_bool(args, "animate"),
            duration: arg_f32(args, "duration", 2.0),
            movement: Easing::from_name(&arg_str(args, "movement").unwrap_or_default()),
            rotate: arg_bool(args, "rotate"),
        }),
        "blink" => Some(ActionOp::Blink {
            duration: arg_f32(args, "duration", 5.0),
            speed: arg_f32(args, "speed", 50.0),
            min_opacity: arg_f32(args, "minOpacity", 5.0),
            max_opacity: arg_f32(args, "maxOpacity", 80.0),
        }),
        _ => None,
    }
}

fn compile_connector_method(method: &str, args: &serde_json::Map<String, Value>) -> Option<ActionOp> {
    match method {
        "set" => Some(ActionOp::SetConnectorField {
            path: arg_str(args, "field")?,
            value: args.get("value").cloned().unwrap_or(Value::Null),
        }),
        _ => None,
    }
}

// ─── Field-path assignment ───────────────────────────────────────────────

fn set_item_field(
    scheme: &mut SchemeContainer,
    events: &mut EditorEventBus,
    id: ItemId,
    path: &str,
    value: &Value,
) {
    let segments: Vec<&str> = path.split('.').collect();
    let mut geometry_changed = false;
    {
        let Some(item) = scheme.find_item_by_id_mut(id) else {
            return;
        };
        match segments.as_slice() {
            ["opacity"] => {
                if let Some(f) = value.as_f64() {
                    item.opacity = f as f32;
                }
            }
            ["visible"] => {
                if let Some(b) = value.as_bool() {
                    item.visible = b;
                }
            }
            ["locked"] => {
                if let Some(b) = value.as_bool() {
                    item.locked = b;
                }
            }
            ["name"] => {
                if let Some(s) = value.as_str() {
                    item.name = s.to_string();
                }
            }
            ["area", field @ ("x" | "y" | "w" | "h" | "r")] => {
                if let Some(f) = value.as_f64() {
                    let f = f as f32;
                    match *field {
                        "x" => item.area.x = f,
                        "y" => item.area.y = f,
                        "w" => item.area.w = f,
                        "h" => item.area.h = f,
                        _ => item.area.r = f,
                    }
                    geometry_changed = true;
                }
            }
            ["textSlots", slot, "text"] => {
                if let Some(s) = value.as_str() {
                    item.text_slots.entry(slot.to_string()).or_default().text = s.to_string();
                }
            }
            ["shapeProps", "strokeSize"] => {
                if let (Shape::Curve(props), Some(f)) = (&mut item.shape, value.as_f64()) {
                    props.stroke_size = f as f32;
                }
            }
            _ => {
                warn!("unknown item field path {path:?}, skipping set");
                return;
            }
        }
    }
    if geometry_changed {
        scheme.reindex_item_transforms(id);
        for rebuilt in scheme.rebuild_dependants(id) {
            events.emit(crate::events::EditorEvent::RedrawConnector(rebuilt));
        }
    }
    events.emit_item_changed(id);
}

fn set_connector_field(scheme: &mut SchemeContainer, id: ItemId, path: &str, value: &Value) {
    let Some(connector) = scheme.find_connector_by_id_mut(id) else {
        return;
    };
    let segments: Vec<&str> = path.split('.').collect();
    match segments.as_slice() {
        ["style", "color"] => {
            if let Some(s) = value.as_str() {
                connector.style.color = s.to_string();
            }
        }
        ["style", "width"] => {
            if let Some(f) = value.as_f64() {
                connector.style.width = f as f32;
            }
        }
        ["style", "pattern"] => {
            connector.style.pattern = match value.as_str() {
                Some("dashed") => LinePattern::Dashed,
                Some("dotted") => LinePattern::Dotted,
                _ => LinePattern::Solid,
            };
        }
        _ => warn!("unknown connector field path {path:?}, skipping set"),
    }
}

#[allow(clippy::too_many_arguments)]
fn move_to_item(
    scheme: &mut SchemeContainer,
    animations: &mut AnimationRegistry,
    events: &mut EditorEventBus,
    id: ItemId,
    destination_selector: &str,
    animate: bool,
    duration: f32,
    movement: Easing,
    rotate: bool,
    revision: u64,
) {
    let Some(Element::Item(destination_id)) =
        scheme.find_first_element_by_selector(destination_selector, Some(id))
    else {
        debug!("moveToItem destination {destination_selector:?} not found");
        return;
    };
    if destination_id == id {
        return;
    }
    let Some(destination) = scheme.find_item_by_id(destination_id) else {
        return;
    };
    let target_world = scheme.world_point_on_item(0.0, 0.0, destination);
    // World angle the item needs, expressed in its own parent space: its
    // meta transform already includes area.r, so the parent contribution is
    // the difference.
    let destination_angle = destination.meta.transform.r
        - scheme
            .find_item_by_id(id)
            .map(|item| item.meta.transform.r - item.area.r)
            .unwrap_or(0.0);
    let Some(position) = scheme.relative_point_for_item(target_world.x, target_world.y, id) else {
        return;
    };

    if animate && duration > f32::EPSILON {
        animations.play(
            scheme,
            events,
            Box::new(MoveToItemAnimation::new(
                id,
                position,
                destination_angle,
                rotate,
                duration,
                movement,
            )),
            Some(id),
            Some(revision),
        );
    } else if let Some(item) = scheme.find_item_by_id_mut(id) {
        item.area.x = position.x;
        item.area.y = position.y;
        if rotate {
            item.area.r = destination_angle;
        }
        scheme.reindex_item_transforms(id);
        for rebuilt in scheme.rebuild_dependants(id) {
            events.emit(crate::events::EditorEvent::RedrawConnector(rebuilt));
        }
        events.emit_item_changed(id);
    }
}

// ─── User event bus ──────────────────────────────────────────────────────

struct Subscriber {
    item_name: String,
    action: CompiledAction,
}

/// Hook invoked for every emitted item event so a hosting parent context
/// (cross-frame embedding) can mirror it. Failures are caught and logged.
pub type ParentForwarder = Box<dyn Fn(&str, &str) -> Result<(), String>>;

#[derive(Default)]
pub struct UserEventBus {
    subscribers: HashMap<ItemId, HashMap<String, Vec<Subscriber>>>,
    revision: u64,
    parent_forwarder: Option<ParentForwarder>,
}

impl UserEventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn revision(&self) -> u64 {
        self.revision
    }

    /// Late effects from asynchronous chains check this before applying.
    pub fn is_action_allowed(&self, revision: u64) -> bool {
        self.revision == revision
    }

    pub fn set_parent_forwarder(&mut self, forwarder: ParentForwarder) {
        self.parent_forwarder = Some(forwarder);
    }

    pub fn subscribe_item_event(
        &mut self,
        item_id: ItemId,
        item_name: &str,
        event_name: &str,
        action: CompiledAction,
    ) {
        self.subscribers
            .entry(item_id)
            .or_default()
            .entry(event_name.to_string())
            .or_default()
            .push(Subscriber {
                item_name: item_name.to_string(),
                action,
            });
    }

    /// Drop every subscription and invalidate in-flight asynchronous
    /// effects by moving the revision forward.
    pub fn clear(&mut self) {
        self.subscribers.clear();
        self.revision += 1;
    }

    pub fn clear_events_for_item(&mut self, item_id: ItemId) {
        self.subscribers.remove(&item_id);
    }

    /// Dispatch an item event: all matching subscribers run in
    /// subscription order, and `sendEvent` follow-ups are processed from a
    /// queue so dispatch never re-enters itself.
    pub fn emit_item_event(
        &mut self,
        scheme: &mut SchemeContainer,
        animations: &mut AnimationRegistry,
        events: &mut EditorEventBus,
        item_id: ItemId,
        event_name: &str,
    ) {
        let mut queue = VecDeque::new();
        queue.push_back((item_id, event_name.to_string()));
        // A runaway sendEvent loop must not hang the editor.
        let mut budget = 1000;
        while let Some((id, event)) = queue.pop_front() {
            if budget == 0 {
                warn!("event cascade exceeded budget, dropping remaining events");
                return;
            }
            budget -= 1;
            let matching: Vec<(String, CompiledAction)> = self
                .subscribers
                .get(&id)
                .and_then(|by_event| by_event.get(&event))
                .map(|subs| {
                    subs.iter()
                        .map(|s| (s.item_name.clone(), s.action.clone()))
                        .collect()
                })
                .unwrap_or_default();
            for (item_name, action) in matching {
                if let Some(forwarder) = &self.parent_forwarder
                    && let Err(err) = forwarder(&item_name, &event)
                {
                    warn!("failed to forward event {event:?} to parent context: {err}");
                }
                let followups = action.execute(scheme, animations, events, self.revision);
                queue.extend(followups);
            }
        }
    }
}

/// Compile and subscribe every behavior rule in the scheme. Called when
/// interactive mode starts; bumps the revision first so effects from the
/// previous session cannot land in this one.
pub fn init_user_events(scheme: &SchemeContainer, bus: &mut UserEventBus) {
    bus.clear();
    for id in scheme.all_item_ids() {
        let Some(item) = scheme.find_item_by_id(id) else {
            continue;
        };
        for event in &item.behavior.events {
            let action = compile_actions(scheme, Some(id), &event.actions);
            if !action.is_empty() {
                bus.subscribe_item_event(id, &item.name, &event.event, action);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use skema_core::geometry::Area;
    use skema_core::model::{BehaviorAction, Item, Scheme};

    fn action(element: &str, method: &str, args: Value) -> BehaviorAction {
        BehaviorAction {
            element: element.to_string(),
            method: method.to_string(),
            args: match args {
                Value::Object(map) => map,
                _ => serde_json::Map::new(),
            },
        }
    }

    fn rect(id: &str, x: f32) -> Item {
        let mut item = Item::new(ItemId::intern(id), id, Default::default());
        item.area = Area::new(x, 0.0, 100.0, 100.0);
        item
    }

    #[test]
    fn compiles_set_actions_for_self_and_ids() {
        let scheme_doc = Scheme {
            items: vec![rect("ue_self", 0.0), rect("ue_abc", 200.0)],
            ..Scheme::default()
        };
        let mut scheme = SchemeContainer::from_scheme(scheme_doc);
        let mut animations = AnimationRegistry::new();
        let mut events = EditorEventBus::new();

        let self_id = ItemId::intern("ue_self");
        let compiled = compile_actions(
            &scheme,
            Some(self_id),
            &[
                action("self", "set", json!({"field": "opacity", "value": 0.5})),
                action("#ue_abc", "set", json!({"field": "name", "value": "renamed"})),
                action("#ue_abc", "set", json!({"field": "textSlots.body.text", "value": "Blah"})),
            ],
        );
        compiled.execute(&mut scheme, &mut animations, &mut events, 0);

        assert!((scheme.find_item_by_id(self_id).unwrap().opacity - 0.5).abs() < 1e-6);
        let abc = scheme.find_item_by_id(ItemId::intern("ue_abc")).unwrap();
        assert_eq!(abc.name, "renamed");
        assert_eq!(abc.text_slots["body"].text, "Blah");
    }

    #[test]
    fn compiles_group_actions_in_order() {
        let mut a = rect("ue_g1", 0.0);
        a.groups.push("panel".to_string());
        let mut b = rect("ue_g2", 200.0);
        b.groups.push("panel".to_string());
        let mut scheme = SchemeContainer::from_scheme(Scheme {
            items: vec![a, b],
            ..Scheme::default()
        });
        let mut animations = AnimationRegistry::new();
        let mut events = EditorEventBus::new();

        let compiled = compile_actions(
            &scheme,
            None,
            &[action("group: panel", "set", json!({"field": "opacity", "value": 0.25}))],
        );
        compiled.execute(&mut scheme, &mut animations, &mut events, 0);

        for id in ["ue_g1", "ue_g2"] {
            let item = scheme.find_item_by_id(ItemId::intern(id)).unwrap();
            assert!((item.opacity - 0.25).abs() < 1e-6, "{id} opacity");
        }
    }

    #[test]
    fn unresolvable_selectors_and_unknown_methods_are_skipped() {
        let mut scheme = SchemeContainer::from_scheme(Scheme {
            items: vec![rect("ue_known", 0.0)],
            ..Scheme::default()
        });
        let mut animations = AnimationRegistry::new();
        let mut events = EditorEventBus::new();

        let compiled = compile_actions(
            &scheme,
            None,
            &[
                action("#ghost", "set", json!({"field": "opacity", "value": 0.1})),
                action("#ue_known", "explode", json!({})),
                action("#ue_known", "hide", json!({})),
            ],
        );
        // The two bad actions are dropped; the valid one still runs.
        compiled.execute(&mut scheme, &mut animations, &mut events, 0);
        assert!(!scheme.find_item_by_id(ItemId::intern("ue_known")).unwrap().visible);
    }

    #[test]
    fn connector_set_targets_style_fields() {
        let mut scheme = SchemeContainer::from_scheme(Scheme {
            items: vec![rect("ue_c1", 0.0), rect("ue_c2", 300.0)],
            ..Scheme::default()
        });
        let cid = scheme
            .connect_items(ItemId::intern("ue_c1"), ItemId::intern("ue_c2"))
            .unwrap();
        let mut animations = AnimationRegistry::new();
        let mut events = EditorEventBus::new();

        let selector = format!("#{cid}");
        let compiled = compile_actions(
            &scheme,
            None,
            &[action(&selector, "set", json!({"field": "style.color", "value": "#abc"}))],
        );
        compiled.execute(&mut scheme, &mut animations, &mut events, 0);
        assert_eq!(scheme.find_connector_by_id(cid).unwrap().style.color, "#abc");
    }

    #[test]
    fn send_event_chains_through_the_bus() {
        let mut first = rect("ue_chain_a", 0.0);
        first.behavior.events.push(skema_core::model::BehaviorEvent {
            event: "clicked".to_string(),
            actions: vec![action("#ue_chain_b", "sendEvent", json!({"event": "poked"}))],
        });
        let mut second = rect("ue_chain_b", 200.0);
        second.behavior.events.push(skema_core::model::BehaviorEvent {
            event: "poked".to_string(),
            actions: vec![action("self", "hide", json!({}))],
        });
        let mut scheme = SchemeContainer::from_scheme(Scheme {
            items: vec![first, second],
            ..Scheme::default()
        });
        let mut animations = AnimationRegistry::new();
        let mut events = EditorEventBus::new();
        let mut bus = UserEventBus::new();
        init_user_events(&scheme, &mut bus);

        bus.emit_item_event(
            &mut scheme,
            &mut animations,
            &mut events,
            ItemId::intern("ue_chain_a"),
            "clicked",
        );
        assert!(!scheme.find_item_by_id(ItemId::intern("ue_chain_b")).unwrap().visible);
    }

    #[test]
    fn parent_forwarding_failure_is_swallowed() {
        let mut item = rect("ue_fwd", 0.0);
        item.behavior.events.push(skema_core::model::BehaviorEvent {
            event: "init".to_string(),
            actions: vec![action("self", "show", json!({}))],
        });
        let mut scheme = SchemeContainer::from_scheme(Scheme {
            items: vec![item],
            ..Scheme::default()
        });
        let mut animations = AnimationRegistry::new();
        let mut events = EditorEventBus::new();
        let mut bus = UserEventBus::new();
        init_user_events(&scheme, &mut bus);
        bus.set_parent_forwarder(Box::new(|_, _| Err("no parent window".to_string())));

        // Must not panic or abort dispatch.
        bus.emit_item_event(
            &mut scheme,
            &mut animations,
            &mut events,
            ItemId::intern("ue_fwd"),
            "init",
        );
        assert!(scheme.find_item_by_id(ItemId::intern("ue_fwd")).unwrap().visible);
    }

    #[test]
    fn clear_bumps_revision() {
        let mut bus = UserEventBus::new();
        let before = bus.revision();
        assert!(bus.is_action_allowed(before));
        bus.clear();
        assert!(!bus.is_action_allowed(before));
        assert!(bus.is_action_allowed(bus.revision()));
    }
}
