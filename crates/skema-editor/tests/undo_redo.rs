//! Integration tests: interaction gestures and undo/redo (skema-editor).
//!
//! Drives the editor through full pointer gestures and verifies the
//! resulting scene mutations, commit notifications and history behavior
//! across crate boundaries.

use skema_core::container::{DragEdge, Dragger};
use skema_core::geometry::Area;
use skema_core::id::ItemId;
use skema_core::model::{Item, Scheme, Shape};
use skema_editor::editor::Editor;
use skema_editor::events::EditorEvent;
use skema_editor::input::{HitObject, Key, Modifiers, PointerEvent};
use smallvec::smallvec;

fn rect(id: &str, x: f32, y: f32, w: f32, h: f32) -> Item {
    let mut item = Item::new(ItemId::intern(id), id, Shape::default());
    item.area = Area::new(x, y, w, h);
    item
}

fn editor_with_two_rects() -> Editor {
    Editor::new(Scheme {
        items: vec![
            rect("box_a", 0.0, 0.0, 100.0, 100.0),
            rect("box_b", 300.0, 0.0, 100.0, 100.0),
        ],
        ..Scheme::default()
    })
}

fn item_x(editor: &Editor, id: &str) -> f32 {
    editor
        .scheme
        .find_item_by_id(ItemId::intern(id))
        .unwrap()
        .area
        .x
}

// ─── Item creation ──────────────────────────────────────────────────────

#[test]
fn create_item_gesture_places_sizes_and_commits() {
    let mut editor = editor_with_two_rects();
    editor.start_creating_item(Item::new(ItemId::intern("fresh"), "Rect", Shape::default()));
    assert_eq!(editor.state_name(), "create-item");

    editor.mouse_down(&PointerEvent::at(400.0, 300.0), &HitObject::None);
    editor.mouse_move(&PointerEvent::at(480.0, 360.0), &HitObject::None);
    editor.mouse_up(&PointerEvent::at(480.0, 360.0).released(), &HitObject::None);

    assert_eq!(editor.state_name(), "idle");
    let fresh = editor.scheme.find_item_by_id(ItemId::intern("fresh")).unwrap();
    assert_eq!(fresh.area.x, 400.0);
    assert_eq!(fresh.area.y, 300.0);
    assert_eq!(fresh.area.w, 80.0);
    assert_eq!(fresh.area.h, 60.0);
    assert!(fresh.meta.selected, "created item ends up selected");

    let events = editor.drain_events();
    let commits = events
        .iter()
        .filter(|e| matches!(e, EditorEvent::SchemeChangeCommitted))
        .count();
    assert_eq!(commits, 1, "one gesture, one commit");
}

#[test]
fn create_item_drawn_backwards_normalizes_area() {
    let mut editor = editor_with_two_rects();
    editor.start_creating_item(Item::new(ItemId::intern("back"), "Rect", Shape::default()));
    editor.mouse_down(&PointerEvent::at(500.0, 500.0), &HitObject::None);
    editor.mouse_up(&PointerEvent::at(440.0, 470.0).released(), &HitObject::None);

    let item = editor.scheme.find_item_by_id(ItemId::intern("back")).unwrap();
    assert_eq!(item.area.x, 440.0);
    assert_eq!(item.area.y, 470.0);
    assert_eq!(item.area.w, 60.0);
    assert_eq!(item.area.h, 30.0);
}

#[test]
fn create_item_nests_under_smallest_selected_container() {
    let mut editor = Editor::new(Scheme {
        items: vec![
            rect("huge", 0.0, 0.0, 800.0, 800.0),
            rect("tight", 100.0, 100.0, 300.0, 300.0),
        ],
        ..Scheme::default()
    });
    editor.scheme.select_item(ItemId::intern("huge"), false);
    editor.scheme.select_item(ItemId::intern("tight"), true);

    editor.start_creating_item(Item::new(ItemId::intern("nested"), "Rect", Shape::default()));
    editor.mouse_down(&PointerEvent::at(150.0, 150.0), &HitObject::None);
    editor.mouse_up(&PointerEvent::at(250.0, 250.0).released(), &HitObject::None);

    assert_eq!(
        editor.scheme.parent_of(ItemId::intern("nested")),
        Some(ItemId::intern("tight")),
        "minimum-area container wins"
    );
    // World position is unchanged by the remount.
    let nested = editor.scheme.find_item_by_id(ItemId::intern("nested")).unwrap();
    let world = editor.scheme.world_point_on_item(0.0, 0.0, nested);
    assert!((world.x - 150.0).abs() < 1e-2);
    assert!((world.y - 150.0).abs() < 1e-2);
}

#[test]
fn escape_cancels_creation_without_leftovers() {
    let mut editor = editor_with_two_rects();
    editor.start_creating_item(Item::new(ItemId::intern("ghost"), "Rect", Shape::default()));
    editor.mouse_down(&PointerEvent::at(10.0, 10.0), &HitObject::None);
    editor.key_pressed(Key::Escape);

    assert_eq!(editor.state_name(), "idle");
    assert!(editor.scheme.find_item_by_id(ItemId::intern("ghost")).is_none());
    assert!(!editor.history.can_undo() || item_x(&editor, "box_a") == 0.0);
}

// ─── Dragging ───────────────────────────────────────────────────────────

#[test]
fn drag_item_moves_selection_and_commits_once() {
    let mut editor = editor_with_two_rects();
    let a = ItemId::intern("box_a");

    editor.mouse_down(&PointerEvent::at(50.0, 50.0), &HitObject::Item(a));
    assert_eq!(editor.state_name(), "drag-item");
    editor.mouse_move(&PointerEvent::at(80.0, 70.0), &HitObject::Item(a));
    editor.mouse_move(&PointerEvent::at(90.0, 75.0), &HitObject::Item(a));
    editor.mouse_up(&PointerEvent::at(90.0, 75.0).released(), &HitObject::Item(a));

    assert_eq!(editor.state_name(), "idle");
    assert_eq!(item_x(&editor, "box_a"), 40.0);
    let commits = editor
        .drain_events()
        .iter()
        .filter(|e| matches!(e, EditorEvent::SchemeChangeCommitted))
        .count();
    assert_eq!(commits, 1, "intermediate drag frames are not committed");
}

#[test]
fn dragger_resize_refuses_non_positive_sizes() {
    let mut editor = editor_with_two_rects();
    let a = ItemId::intern("box_a");
    let dragger = Dragger {
        x: 100.0,
        y: 50.0,
        s: 5.0,
        edges: smallvec![DragEdge::Right],
    };

    editor.mouse_down(
        &PointerEvent::at(100.0, 50.0),
        &HitObject::ItemDragger {
            item: a,
            dragger: dragger.clone(),
        },
    );
    // Collapse attempt: would make width -50.
    editor.mouse_move(&PointerEvent::at(-50.0, 50.0), &HitObject::None);
    assert_eq!(editor.scheme.find_item_by_id(a).unwrap().area.w, 100.0);

    // A sane resize is applied.
    editor.mouse_move(&PointerEvent::at(150.0, 50.0), &HitObject::None);
    assert_eq!(editor.scheme.find_item_by_id(a).unwrap().area.w, 150.0);
    editor.mouse_up(&PointerEvent::at(150.0, 50.0).released(), &HitObject::None);
}

#[test]
fn move_without_buttons_resets_to_idle() {
    let mut editor = editor_with_two_rects();
    let a = ItemId::intern("box_a");
    editor.mouse_down(&PointerEvent::at(50.0, 50.0), &HitObject::Item(a));
    // The release happened off-window: no buttons are held anymore.
    editor.mouse_move(&PointerEvent::at(300.0, 300.0).released(), &HitObject::None);
    assert_eq!(editor.state_name(), "idle");
    assert_eq!(item_x(&editor, "box_a"), 0.0, "no drag was applied");
}

#[test]
fn select_box_selects_by_world_anchor() {
    let mut editor = editor_with_two_rects();
    editor.mouse_down(&PointerEvent::at(-10.0, -10.0), &HitObject::None);
    editor.mouse_move(&PointerEvent::at(450.0, 150.0), &HitObject::None);
    editor.mouse_up(&PointerEvent::at(450.0, 150.0).released(), &HitObject::None);

    assert_eq!(editor.scheme.selected_items.len(), 2);

    // A smaller box replaces the selection (exclusive mode).
    editor.mouse_down(&PointerEvent::at(-10.0, -10.0), &HitObject::None);
    editor.mouse_up(&PointerEvent::at(50.0, 50.0).released(), &HitObject::None);
    assert_eq!(editor.scheme.selected_items, vec![ItemId::intern("box_a")]);
}

#[test]
fn inclusive_select_box_keeps_prior_selection() {
    let mut editor = editor_with_two_rects();
    editor.scheme.select_item(ItemId::intern("box_b"), false);

    let shift = Modifiers {
        shift: true,
        ..Modifiers::NONE
    };
    editor.mouse_down(&PointerEvent::at(-10.0, -10.0).with_modifiers(shift), &HitObject::None);
    editor.mouse_move(&PointerEvent::at(50.0, 50.0).with_modifiers(shift), &HitObject::None);
    editor.mouse_up(
        &PointerEvent::at(50.0, 50.0).with_modifiers(shift).released(),
        &HitObject::None,
    );
    let mut selected = editor.scheme.selected_items.clone();
    selected.sort();
    let mut expected = vec![ItemId::intern("box_a"), ItemId::intern("box_b")];
    expected.sort();
    assert_eq!(selected, expected);
}

// ─── Connector rebuilds during drags ────────────────────────────────────

#[test]
fn dragging_endpoint_rebuilds_connector_before_notifications() {
    let mut editor = editor_with_two_rects();
    let a = ItemId::intern("box_a");
    let b = ItemId::intern("box_b");
    let cid = editor.scheme.connect_items(a, b).unwrap();
    let path_before = editor.scheme.find_connector_by_id(cid).unwrap().path.clone();
    editor.drain_events();

    editor.mouse_down(&PointerEvent::at(50.0, 50.0), &HitObject::Item(a));
    editor.mouse_move(&PointerEvent::at(50.0, 250.0), &HitObject::Item(a));

    // The path was rebuilt synchronously during the move.
    let path_after = editor.scheme.find_connector_by_id(cid).unwrap().path.clone();
    assert_ne!(path_before, path_after);
    let events = editor.drain_events();
    assert!(
        events.iter().any(|e| matches!(e, EditorEvent::RedrawConnector(id) if *id == cid)),
        "a redraw notification names the rebuilt connector"
    );
    editor.mouse_up(&PointerEvent::at(50.0, 250.0).released(), &HitObject::Item(a));
}

// ─── Undo / redo ────────────────────────────────────────────────────────

fn drag_once(editor: &mut Editor, id: ItemId, from: (f32, f32), to: (f32, f32)) {
    editor.mouse_down(&PointerEvent::at(from.0, from.1), &HitObject::Item(id));
    editor.mouse_move(&PointerEvent::at(to.0, to.1), &HitObject::Item(id));
    editor.mouse_up(&PointerEvent::at(to.0, to.1).released(), &HitObject::Item(id));
}

#[test]
fn n_commits_then_n_undos_restore_the_original_scene() {
    let mut editor = editor_with_two_rects();
    let a = ItemId::intern("box_a");

    drag_once(&mut editor, a, (50.0, 50.0), (70.0, 50.0));
    drag_once(&mut editor, a, (90.0, 50.0), (110.0, 50.0));
    drag_once(&mut editor, a, (130.0, 50.0), (150.0, 50.0));
    assert_eq!(item_x(&editor, "box_a"), 60.0);

    editor.undo();
    assert_eq!(item_x(&editor, "box_a"), 40.0);
    editor.undo();
    assert_eq!(item_x(&editor, "box_a"), 20.0);
    editor.undo();
    assert_eq!(item_x(&editor, "box_a"), 0.0);

    editor.redo();
    editor.redo();
    editor.redo();
    assert_eq!(item_x(&editor, "box_a"), 60.0);
}

#[test]
fn commit_after_undo_discards_redo_branch() {
    let mut editor = editor_with_two_rects();
    let a = ItemId::intern("box_a");

    drag_once(&mut editor, a, (50.0, 50.0), (70.0, 50.0)); // x = 20
    drag_once(&mut editor, a, (90.0, 50.0), (110.0, 50.0)); // x = 40
    editor.undo(); // x = 20
    drag_once(&mut editor, a, (70.0, 50.0), (75.0, 50.0)); // x = 25

    editor.redo();
    assert_eq!(item_x(&editor, "box_a"), 25.0, "old redo branch is gone");
    editor.undo();
    assert_eq!(item_x(&editor, "box_a"), 20.0);
}

#[test]
fn delete_key_removes_selection_and_is_undoable() {
    let mut editor = editor_with_two_rects();
    editor.scheme.select_item(ItemId::intern("box_a"), false);
    editor.key_pressed(Key::Delete);

    assert!(editor.scheme.find_item_by_id(ItemId::intern("box_a")).is_none());
    editor.undo();
    assert!(editor.scheme.find_item_by_id(ItemId::intern("box_a")).is_some());
}

// ─── Screen drag ────────────────────────────────────────────────────────

#[test]
fn space_pans_the_screen_and_returns_to_idle() {
    let mut editor = editor_with_two_rects();
    editor.key_pressed(Key::Space);
    assert_eq!(editor.state_name(), "drag-screen");

    editor.mouse_down(&PointerEvent::at(100.0, 100.0), &HitObject::None);
    editor.mouse_move(&PointerEvent::at(160.0, 130.0), &HitObject::None);
    editor.mouse_up(&PointerEvent::at(160.0, 130.0).released(), &HitObject::None);
    assert_eq!(editor.scheme.screen_transform.x, 60.0);
    assert_eq!(editor.scheme.screen_transform.y, 30.0);

    editor.key_up(Key::Space);
    assert_eq!(editor.state_name(), "idle");
}

#[test]
fn short_click_while_panning_deselects() {
    let mut editor = editor_with_two_rects();
    editor.scheme.select_item(ItemId::intern("box_a"), false);
    editor.key_pressed(Key::Space);

    editor.mouse_down(&PointerEvent::at(100.0, 100.0), &HitObject::None);
    editor.mouse_up(&PointerEvent::at(101.0, 100.0).released(), &HitObject::None);
    assert!(editor.scheme.selected_items.is_empty());
}

#[test]
fn zoom_keeps_the_anchor_point_fixed() {
    let mut editor = editor_with_two_rects();
    editor.zoom_at(200.0, 150.0, 2.0);
    let st = editor.scheme.screen_transform;
    // The world point that was under (200, 150) must still be there.
    let world = st.to_world(skema_core::geometry::Point::new(200.0, 150.0));
    let back = st.to_screen(world);
    assert!((back.x - 200.0).abs() < 1e-3);
    assert!((back.y - 150.0).abs() < 1e-3);
    assert_eq!(st.scale, 2.0);
}
