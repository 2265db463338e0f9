//! The editor session: one open document, its services, and the
//! interaction state machine driving all pointer/keyboard input.
//!
//! States are a closed tagged union with a single current-state value;
//! transitions swap it. Every service a state needs (scheme container,
//! event bus, history, snapper) is owned here and passed by reference —
//! multiple editors in one process never share hidden state.
//!
//! A gesture is a sub-session: it starts from `Idle` on pointer-down and
//! returns to `Idle` on pointer-up or Escape. Entering a state constructs
//! it fresh, so no drag/click bookkeeping ever leaks between gestures.

use crate::animation::AnimationRegistry;
use crate::create::{ConnectingState, CreateComponentState, CreateItemState};
use crate::curve::EditCurveState;
use crate::drag::DragItemState;
use crate::events::{EditorEvent, EditorEventBus};
use crate::input::{HitObject, Key, PointerEvent};
use crate::userevents::{self, UserEventBus};
use skema_core::container::SchemeContainer;
use skema_core::geometry::{Point, Snapper};
use skema_core::history::History;
use skema_core::id::ItemId;
use skema_core::model::{Item, Scheme, Shape};

/// How many scheme checkpoints the undo history keeps.
const HISTORY_SIZE: usize = 30;

/// Pan distance below which a mouse-up still counts as a plain click.
const CLICK_SLOP: f32 = 3.0;

const MIN_ZOOM: f32 = 0.05;
const MAX_ZOOM: f32 = 10.0;

// ─── State plumbing ──────────────────────────────────────────────────────

/// Shared mutable services handed to the active state for one event.
pub(crate) struct Ctx<'a> {
    pub scheme: &'a mut SchemeContainer,
    pub events: &'a mut EditorEventBus,
    pub history: &'a mut History<Scheme>,
    pub snapper: Snapper,
}

impl Ctx<'_> {
    pub fn snap_x(&self, v: f32) -> f32 {
        self.snapper.snap(v)
    }

    pub fn snap_y(&self, v: f32) -> f32 {
        self.snapper.snap(v)
    }

    /// Close one undoable unit: snapshot the scheme into history and emit
    /// the single committed notification for the gesture.
    pub fn commit(&mut self) {
        let snapshot = self.scheme.to_scheme();
        self.history.commit(snapshot);
        self.events.emit(EditorEvent::SchemeChangeCommitted);
    }

    /// Rebuild connectors and attached curves that track `id`, emitting a
    /// redraw notification for each rebuilt element.
    pub fn rebuild_dependants(&mut self, id: ItemId) {
        for rebuilt in self.scheme.rebuild_dependants(id) {
            self.events.emit(EditorEvent::RedrawConnector(rebuilt));
        }
    }
}

pub(crate) enum Transition {
    Stay,
    To(EditorState),
    ToIdle,
}

pub(crate) trait State {
    fn name(&self) -> &'static str;

    fn mouse_down(&mut self, ctx: &mut Ctx, ev: &PointerEvent, object: &HitObject) -> Transition {
        let _ = (ctx, ev, object);
        Transition::Stay
    }

    fn mouse_move(&mut self, ctx: &mut Ctx, ev: &PointerEvent, object: &HitObject) -> Transition {
        let _ = (ctx, ev, object);
        Transition::Stay
    }

    fn mouse_up(&mut self, ctx: &mut Ctx, ev: &PointerEvent, object: &HitObject) -> Transition {
        let _ = (ctx, ev, object);
        Transition::Stay
    }

    fn mouse_double_click(
        &mut self,
        ctx: &mut Ctx,
        ev: &PointerEvent,
        object: &HitObject,
    ) -> Transition {
        let _ = (ctx, ev, object);
        Transition::Stay
    }

    fn key_pressed(&mut self, ctx: &mut Ctx, key: Key) -> Transition {
        let _ = (ctx, key);
        Transition::Stay
    }

    fn key_up(&mut self, ctx: &mut Ctx, key: Key) -> Transition {
        let _ = (ctx, key);
        Transition::Stay
    }

    /// User abandoned the state (Escape). Must drop in-progress-only
    /// visual state without touching committed history.
    fn cancel(&mut self, ctx: &mut Ctx) -> Transition {
        let _ = ctx;
        Transition::ToIdle
    }
}

pub enum EditorState {
    Idle(IdleState),
    CreateItem(CreateItemState),
    CreateComponent(CreateComponentState),
    DragItem(DragItemState),
    Connecting(ConnectingState),
    EditCurve(EditCurveState),
    DragScreen(DragScreenState),
}

impl Default for EditorState {
    fn default() -> Self {
        EditorState::Idle(IdleState)
    }
}

impl EditorState {
    fn as_state_mut(&mut self) -> &mut dyn State {
        match self {
            EditorState::Idle(s) => s,
            EditorState::CreateItem(s) => s,
            EditorState::CreateComponent(s) => s,
            EditorState::DragItem(s) => s,
            EditorState::Connecting(s) => s,
            EditorState::EditCurve(s) => s,
            EditorState::DragScreen(s) => s,
        }
    }
}

// ─── Idle ────────────────────────────────────────────────────────────────

/// The resting state between gestures. Pointer-down hands off to the drag
/// state; double-click on a curve opens the curve editor.
pub struct IdleState;

impl State for IdleState {
    fn name(&self) -> &'static str {
        "idle"
    }

    fn mouse_down(&mut self, ctx: &mut Ctx, ev: &PointerEvent, object: &HitObject) -> Transition {
        Transition::To(EditorState::DragItem(DragItemState::begin(ctx, ev, object)))
    }

    fn mouse_double_click(
        &mut self,
        ctx: &mut Ctx,
        _ev: &PointerEvent,
        object: &HitObject,
    ) -> Transition {
        if let HitObject::Item(id) = object
            && let Some(item) = ctx.scheme.find_item_by_id(*id)
            && matches!(item.shape, Shape::Curve(_))
        {
            return Transition::To(EditorState::EditCurve(EditCurveState::for_existing(*id)));
        }
        Transition::Stay
    }

    fn key_pressed(&mut self, ctx: &mut Ctx, key: Key) -> Transition {
        match key {
            Key::Space => Transition::To(EditorState::DragScreen(DragScreenState::new(true))),
            Key::Delete => {
                if !ctx.scheme.selected_items.is_empty() {
                    ctx.scheme.delete_selected_items();
                    ctx.events.emit(EditorEvent::AllItemsDeselected);
                    ctx.commit();
                }
                Transition::Stay
            }
            Key::Escape => Transition::Stay,
        }
    }

    fn cancel(&mut self, ctx: &mut Ctx) -> Transition {
        if !ctx.scheme.selected_items.is_empty() {
            ctx.scheme.deselect_all_items();
            ctx.events.emit(EditorEvent::AllItemsDeselected);
        }
        Transition::ToIdle
    }
}

// ─── DragScreen ──────────────────────────────────────────────────────────

/// Pans the canvas. A sub-slop click deselects everything; releasing the
/// spacebar returns to idle when the state was entered by holding it.
pub struct DragScreenState {
    space_held: bool,
    initial_click: Option<Point>,
    original_offset: Point,
}

impl DragScreenState {
    pub fn new(space_held: bool) -> Self {
        Self {
            space_held,
            initial_click: None,
            original_offset: Point::ZERO,
        }
    }
}

impl State for DragScreenState {
    fn name(&self) -> &'static str {
        "drag-screen"
    }

    fn mouse_down(&mut self, ctx: &mut Ctx, ev: &PointerEvent, _object: &HitObject) -> Transition {
        self.initial_click = Some(Point::new(ev.mx, ev.my));
        self.original_offset = Point::new(ctx.scheme.screen_transform.x, ctx.scheme.screen_transform.y);
        Transition::Stay
    }

    fn mouse_move(&mut self, ctx: &mut Ctx, ev: &PointerEvent, _object: &HitObject) -> Transition {
        if let Some(initial) = self.initial_click {
            ctx.scheme.screen_transform.x = (self.original_offset.x + ev.mx - initial.x).floor();
            ctx.scheme.screen_transform.y = (self.original_offset.y + ev.my - initial.y).floor();
            ctx.events.emit(EditorEvent::Redraw);
        }
        Transition::Stay
    }

    fn mouse_up(&mut self, ctx: &mut Ctx, ev: &PointerEvent, _object: &HitObject) -> Transition {
        if let Some(initial) = self.initial_click.take() {
            if (ev.mx - initial.x).abs() + (ev.my - initial.y).abs() < CLICK_SLOP {
                ctx.scheme.deselect_all_items();
                ctx.events.emit(EditorEvent::AllItemsDeselected);
            }
            ctx.events.emit(EditorEvent::Redraw);
        }
        if self.space_held {
            Transition::Stay
        } else {
            Transition::ToIdle
        }
    }

    fn key_up(&mut self, _ctx: &mut Ctx, key: Key) -> Transition {
        if key == Key::Space && self.space_held {
            Transition::ToIdle
        } else {
            Transition::Stay
        }
    }
}

// ─── Editor ──────────────────────────────────────────────────────────────

pub struct Editor {
    pub scheme: SchemeContainer,
    pub events: EditorEventBus,
    pub history: History<Scheme>,
    pub animations: AnimationRegistry,
    pub user_events: UserEventBus,
    pub snapper: Snapper,
    state: EditorState,
}

impl Editor {
    pub fn new(scheme: Scheme) -> Self {
        let scheme = SchemeContainer::from_scheme(scheme);
        let mut history = History::new(HISTORY_SIZE);
        history.commit(scheme.to_scheme());
        Self {
            scheme,
            events: EditorEventBus::new(),
            history,
            animations: AnimationRegistry::new(),
            user_events: UserEventBus::new(),
            snapper: Snapper::default(),
            state: EditorState::default(),
        }
    }

    pub fn state_name(&mut self) -> &'static str {
        self.state.as_state_mut().name()
    }

    fn dispatch<F>(&mut self, f: F)
    where
        F: FnOnce(&mut dyn State, &mut Ctx) -> Transition,
    {
        let mut state = std::mem::take(&mut self.state);
        let transition = {
            let mut ctx = Ctx {
                scheme: &mut self.scheme,
                events: &mut self.events,
                history: &mut self.history,
                snapper: self.snapper,
            };
            f(state.as_state_mut(), &mut ctx)
        };
        self.state = match transition {
            Transition::Stay => state,
            Transition::To(next) => next,
            Transition::ToIdle => EditorState::default(),
        };
    }

    // ─── Input entry points ──────────────────────────────────────────────

    pub fn mouse_down(&mut self, ev: &PointerEvent, object: &HitObject) {
        self.dispatch(|state, ctx| state.mouse_down(ctx, ev, object));
    }

    pub fn mouse_move(&mut self, ev: &PointerEvent, object: &HitObject) {
        self.dispatch(|state, ctx| state.mouse_move(ctx, ev, object));
    }

    pub fn mouse_up(&mut self, ev: &PointerEvent, object: &HitObject) {
        self.dispatch(|state, ctx| state.mouse_up(ctx, ev, object));
    }

    pub fn mouse_double_click(&mut self, ev: &PointerEvent, object: &HitObject) {
        self.dispatch(|state, ctx| state.mouse_double_click(ctx, ev, object));
    }

    pub fn key_pressed(&mut self, key: Key) {
        if key == Key::Escape {
            self.cancel_current_state();
            return;
        }
        self.dispatch(|state, ctx| state.key_pressed(ctx, key));
    }

    pub fn key_up(&mut self, key: Key) {
        self.dispatch(|state, ctx| state.key_up(ctx, key));
    }

    /// Abort whatever the current state was doing and return to idle.
    pub fn cancel_current_state(&mut self) {
        self.dispatch(|state, ctx| {
            let transition = state.cancel(ctx);
            ctx.events.emit(EditorEvent::StateCancelled);
            transition
        });
    }

    /// Resolve what the pointer is over, for hosts without their own hit
    /// testing.
    pub fn hit_test(&self, x: f32, y: f32) -> HitObject {
        match self.scheme.find_hovered_item(x, y) {
            Some(id) => HitObject::Item(id),
            None => HitObject::None,
        }
    }

    // ─── State entry points ──────────────────────────────────────────────

    /// Arm item creation: the next press-drag-release places `item`.
    pub fn start_creating_item(&mut self, item: Item) {
        self.state = EditorState::CreateItem(CreateItemState::new(item));
    }

    pub fn start_creating_component(&mut self, item: Item) {
        self.state = EditorState::CreateComponent(CreateComponentState::new(item));
    }

    pub fn start_connecting(&mut self) {
        self.state = EditorState::Connecting(ConnectingState::new(None));
    }

    /// Begin drawing a fresh curve (or connector curve) item.
    pub fn start_drawing_curve(&mut self, item: Item) {
        self.state = EditorState::EditCurve(EditCurveState::for_new_curve(item));
    }

    /// Open an existing curve item for point editing.
    pub fn edit_curve(&mut self, id: ItemId) {
        self.state = EditorState::EditCurve(EditCurveState::for_existing(id));
    }

    /// Start a connector curve from a point on an item's outline.
    pub fn connect_from_item(&mut self, source: ItemId, local_point: Option<Point>) {
        let mut state = EditCurveState::default();
        let mut ctx = Ctx {
            scheme: &mut self.scheme,
            events: &mut self.events,
            history: &mut self.history,
            snapper: self.snapper,
        };
        if state.init_connecting_from_source_item(&mut ctx, source, local_point) {
            self.state = EditorState::EditCurve(state);
        }
    }

    // ─── Curve context actions ───────────────────────────────────────────

    fn with_edit_curve<F>(&mut self, f: F)
    where
        F: FnOnce(&mut EditCurveState, &mut Ctx),
    {
        if let EditorState::EditCurve(state) = &mut self.state {
            let mut ctx = Ctx {
                scheme: &mut self.scheme,
                events: &mut self.events,
                history: &mut self.history,
                snapper: self.snapper,
            };
            f(state, &mut ctx);
        }
    }

    pub fn delete_curve_point(&mut self, index: usize) {
        self.with_edit_curve(|state, ctx| state.delete_point(ctx, index));
    }

    pub fn convert_curve_point_to_bezier(&mut self, index: usize) {
        self.with_edit_curve(|state, ctx| state.convert_point_to_bezier(ctx, index));
    }

    pub fn convert_curve_point_to_simple(&mut self, index: usize) {
        self.with_edit_curve(|state, ctx| state.convert_point_to_simple(ctx, index));
    }

    /// Detach the curve's first point from the item it sticks to.
    pub fn detach_curve_source(&mut self) {
        self.with_edit_curve(|state, ctx| state.detach_source(ctx));
    }

    pub fn detach_curve_destination(&mut self) {
        self.with_edit_curve(|state, ctx| state.detach_destination(ctx));
    }

    // ─── History ─────────────────────────────────────────────────────────

    pub fn undo(&mut self) {
        if let Some(snapshot) = self.history.undo().cloned() {
            self.scheme.set_scheme(snapshot);
            self.events.emit(EditorEvent::Redraw);
        }
    }

    pub fn redo(&mut self) {
        if let Some(snapshot) = self.history.redo().cloned() {
            self.scheme.set_scheme(snapshot);
            self.events.emit(EditorEvent::Redraw);
        }
    }

    // ─── View ────────────────────────────────────────────────────────────

    /// Zoom while keeping the world point under `(mx, my)` fixed.
    pub fn zoom_at(&mut self, mx: f32, my: f32, factor: f32) {
        let st = &mut self.scheme.screen_transform;
        let new_scale = (st.scale * factor).clamp(MIN_ZOOM, MAX_ZOOM);
        let wx = (mx - st.x) / st.scale;
        let wy = (my - st.y) / st.scale;
        st.scale = new_scale;
        st.x = mx - wx * new_scale;
        st.y = my - wy * new_scale;
        self.events.emit(EditorEvent::Redraw);
    }

    // ─── Interactive mode ────────────────────────────────────────────────

    /// Compile and register all behavior rules; bumps the user event bus
    /// revision so effects from the previous session are invalidated.
    pub fn init_user_events(&mut self) {
        userevents::init_user_events(&self.scheme, &mut self.user_events);
    }

    pub fn emit_item_event(&mut self, item_id: ItemId, event_name: &str) {
        self.user_events.emit_item_event(
            &mut self.scheme,
            &mut self.animations,
            &mut self.events,
            item_id,
            event_name,
        );
    }

    /// One display frame: steps all active animations in registration
    /// order.
    pub fn tick(&mut self, dt: f32) {
        let revision = self.user_events.revision();
        self.animations
            .tick(&mut self.scheme, &mut self.events, dt, revision);
    }

    pub fn drain_events(&mut self) -> Vec<EditorEvent> {
        self.events.drain()
    }
}
