//! Integration tests: curve drawing and editing gestures (skema-editor).

use skema_core::geometry::{Area, Point};
use skema_core::id::ItemId;
use skema_core::model::{CurvePoint, CurveProps, Item, Scheme, Shape};
use skema_editor::editor::Editor;
use skema_editor::events::EditorEvent;
use skema_editor::input::{HitObject, Key, PointerEvent};

fn rect(id: &str, x: f32, y: f32, w: f32, h: f32) -> Item {
    let mut item = Item::new(ItemId::intern(id), id, Shape::default());
    item.area = Area::new(x, y, w, h);
    item
}

fn curve_item(id: &str, connector: bool) -> Item {
    Item::new(
        ItemId::intern(id),
        "Curve",
        Shape::Curve(CurveProps {
            connector,
            ..CurveProps::default()
        }),
    )
}

fn curve_props(editor: &Editor, id: ItemId) -> CurveProps {
    match &editor.scheme.find_item_by_id(id).unwrap().shape {
        Shape::Curve(props) => props.clone(),
        other => panic!("expected a curve, got {}", other.name()),
    }
}

fn only_curve_id(editor: &Editor) -> ItemId {
    let ids: Vec<ItemId> = editor
        .scheme
        .items_iter()
        .filter(|item| matches!(item.shape, Shape::Curve(_)))
        .map(|item| item.id)
        .collect();
    assert_eq!(ids.len(), 1, "expected exactly one curve in the scene");
    ids[0]
}

// ─── Drawing ────────────────────────────────────────────────────────────

#[test]
fn first_click_plants_two_coincident_points() {
    let mut editor = Editor::new(Scheme::default());
    editor.start_drawing_curve(curve_item("c1", false));
    editor.mouse_down(&PointerEvent::at(10.0, 10.0), &HitObject::None);

    let props = curve_props(&editor, ItemId::intern("c1"));
    assert_eq!(props.points.len(), 2);
    assert_eq!(props.points[0].pos(), Point::new(10.0, 10.0));
    assert_eq!(props.points[1].pos(), Point::new(10.0, 10.0));
}

#[test]
fn clicks_append_points_and_escape_submits() {
    let mut editor = Editor::new(Scheme::default());
    editor.start_drawing_curve(curve_item("c2", false));
    let id = ItemId::intern("c2");

    editor.mouse_down(&PointerEvent::at(10.0, 10.0), &HitObject::None);
    editor.mouse_up(&PointerEvent::at(10.0, 10.0).released(), &HitObject::None);
    editor.mouse_move(&PointerEvent::at(100.0, 50.0), &HitObject::None);
    editor.mouse_down(&PointerEvent::at(100.0, 50.0), &HitObject::None);
    editor.mouse_up(&PointerEvent::at(100.0, 50.0).released(), &HitObject::None);
    // The trailing candidate point follows the pointer until Escape.
    editor.mouse_move(&PointerEvent::at(150.0, 100.0), &HitObject::None);

    editor.key_pressed(Key::Escape);
    assert_eq!(editor.state_name(), "idle");

    let props = curve_props(&editor, id);
    assert_eq!(props.points.len(), 2, "unconfirmed point is dropped");
    assert_eq!(props.points[0].pos(), Point::new(10.0, 10.0));
    assert_eq!(props.points[1].pos(), Point::new(100.0, 50.0));
    assert!(editor.scheme.find_item_by_id(id).unwrap().meta.selected);
    assert!(
        editor
            .drain_events()
            .iter()
            .any(|e| matches!(e, EditorEvent::SchemeChangeCommitted)),
        "submitting the curve commits once"
    );
}

#[test]
fn single_point_curve_is_discarded_on_escape() {
    let mut editor = Editor::new(Scheme::default());
    editor.start_drawing_curve(curve_item("c3", false));
    editor.mouse_down(&PointerEvent::at(10.0, 10.0), &HitObject::None);
    editor.key_pressed(Key::Escape);

    assert!(editor.scheme.find_item_by_id(ItemId::intern("c3")).is_none());
    assert_eq!(editor.state_name(), "idle");
}

#[test]
fn moving_near_first_point_closes_the_curve() {
    let mut editor = Editor::new(Scheme::default());
    editor.start_drawing_curve(curve_item("c4", false));
    let id = ItemId::intern("c4");

    // Triangle: (0,0) → (100,0) → (100,100) → back to start.
    editor.mouse_down(&PointerEvent::at(0.0, 0.0), &HitObject::None);
    editor.mouse_up(&PointerEvent::at(0.0, 0.0).released(), &HitObject::None);
    editor.mouse_move(&PointerEvent::at(100.0, 0.0), &HitObject::None);
    editor.mouse_down(&PointerEvent::at(100.0, 0.0), &HitObject::None);
    editor.mouse_up(&PointerEvent::at(100.0, 0.0).released(), &HitObject::None);
    editor.mouse_move(&PointerEvent::at(100.0, 100.0), &HitObject::None);
    editor.mouse_down(&PointerEvent::at(100.0, 100.0), &HitObject::None);
    editor.mouse_up(&PointerEvent::at(100.0, 100.0).released(), &HitObject::None);

    // Within 5 screen px of the first point: the candidate snaps onto it.
    editor.mouse_move(&PointerEvent::at(2.0, 2.0), &HitObject::None);
    let props = curve_props(&editor, id);
    assert_eq!(props.points.last().unwrap().pos(), Point::new(0.0, 0.0));

    editor.mouse_down(&PointerEvent::at(2.0, 2.0), &HitObject::None);
    assert_eq!(editor.state_name(), "idle");
    let props = curve_props(&editor, id);
    assert!(props.closed);
    assert_eq!(props.points.len(), 3);
}

#[test]
fn dragging_fresh_point_grows_mirrored_bezier_handles() {
    let mut editor = Editor::new(Scheme::default());
    editor.start_drawing_curve(curve_item("c5", false));

    editor.mouse_down(&PointerEvent::at(0.0, 0.0), &HitObject::None);
    editor.mouse_up(&PointerEvent::at(0.0, 0.0).released(), &HitObject::None);
    editor.mouse_move(&PointerEvent::at(50.0, 0.0), &HitObject::None);
    editor.mouse_down(&PointerEvent::at(50.0, 0.0), &HitObject::None);
    // Dragging before release converts the point to a bezier point.
    editor.mouse_move(&PointerEvent::at(60.0, 10.0), &HitObject::None);

    let props = curve_props(&editor, ItemId::intern("c5"));
    match props.points.last().unwrap() {
        CurvePoint::Bezier { x, y, x1, y1, x2, y2 } => {
            assert_eq!((*x, *y), (50.0, 0.0));
            assert_eq!((*x2, *y2), (10.0, 10.0));
            assert_eq!((*x1, *y1), (-10.0, -10.0), "handles stay symmetric");
        }
        other => panic!("expected a bezier point, got {other:?}"),
    }
}

// ─── Connector attachment ───────────────────────────────────────────────

#[test]
fn connector_edge_point_snaps_to_item_outline() {
    let mut editor = Editor::new(Scheme {
        items: vec![rect("target", 300.0, 0.0, 100.0, 100.0)],
        ..Scheme::default()
    });
    editor.start_drawing_curve(curve_item("wire", true));
    let id = ItemId::intern("wire");

    editor.mouse_down(&PointerEvent::at(10.0, 50.0), &HitObject::None);
    editor.mouse_up(&PointerEvent::at(10.0, 50.0).released(), &HitObject::None);
    // 5 px away from the target's left edge: inside the 20 px threshold.
    editor.mouse_move(&PointerEvent::at(295.0, 50.0), &HitObject::None);

    let props = curve_props(&editor, id);
    assert_eq!(props.destination_item.as_deref(), Some("#target"));
    assert_eq!(props.points.last().unwrap().pos(), Point::new(300.0, 50.0));
    assert!(
        editor.drain_events().iter().any(|e| matches!(
            e,
            EditorEvent::ItemsHighlighted(ids) if ids == &vec![ItemId::intern("target")]
        )),
        "the snap target is highlighted"
    );

    // Clicking with a live attachment submits the connector.
    editor.mouse_down(&PointerEvent::at(295.0, 50.0), &HitObject::None);
    assert_eq!(editor.state_name(), "idle");
    let props = curve_props(&editor, id);
    assert_eq!(props.points.len(), 2);
}

#[test]
fn attached_endpoint_tracks_item_geometry() {
    let mut editor = Editor::new(Scheme {
        items: vec![rect("anchor2", 300.0, 0.0, 100.0, 100.0)],
        ..Scheme::default()
    });
    editor.start_drawing_curve(curve_item("wire2", true));
    let id = ItemId::intern("wire2");
    let target = ItemId::intern("anchor2");

    editor.mouse_down(&PointerEvent::at(10.0, 50.0), &HitObject::None);
    editor.mouse_up(&PointerEvent::at(10.0, 50.0).released(), &HitObject::None);
    editor.mouse_move(&PointerEvent::at(295.0, 50.0), &HitObject::None);
    editor.mouse_down(&PointerEvent::at(295.0, 50.0), &HitObject::None);

    let before = curve_props(&editor, id).points.last().unwrap().pos();

    // Move the attached item; its dependants are readjusted.
    {
        let item = editor.scheme.find_item_by_id_mut(target).unwrap();
        item.area.y += 120.0;
    }
    editor.scheme.reindex_item_transforms(target);
    let rebuilt = editor.scheme.rebuild_dependants(target);
    assert!(rebuilt.contains(&id));

    let after = curve_props(&editor, id).points.last().unwrap().pos();
    assert!((after.y - before.y - 120.0).abs() < 1e-2, "endpoint follows the item");
}

#[test]
fn out_of_range_probe_detaches() {
    let mut editor = Editor::new(Scheme {
        items: vec![rect("faraway", 300.0, 0.0, 100.0, 100.0)],
        ..Scheme::default()
    });
    editor.start_drawing_curve(curve_item("wire3", true));
    let id = ItemId::intern("wire3");

    editor.mouse_down(&PointerEvent::at(10.0, 50.0), &HitObject::None);
    editor.mouse_up(&PointerEvent::at(10.0, 50.0).released(), &HitObject::None);
    editor.mouse_move(&PointerEvent::at(295.0, 50.0), &HitObject::None);
    assert!(curve_props(&editor, id).destination_item.is_some());

    // Dragging far away clears the attachment again.
    editor.mouse_move(&PointerEvent::at(100.0, 250.0), &HitObject::None);
    let props = curve_props(&editor, id);
    assert!(props.destination_item.is_none());
    assert_eq!(props.destination_item_position, 0.0);
}

#[test]
fn connect_from_item_starts_attached_curve() {
    let mut editor = Editor::new(Scheme {
        items: vec![rect("origin", 0.0, 0.0, 100.0, 100.0)],
        ..Scheme::default()
    });
    editor.connect_from_item(ItemId::intern("origin"), None);
    assert_eq!(editor.state_name(), "edit-curve");

    let id = only_curve_id(&editor);
    let props = curve_props(&editor, id);
    assert!(props.connector);
    assert_eq!(props.source_item.as_deref(), Some("#origin"));
    assert_eq!(props.points.len(), 2);
}

// ─── Editing an existing curve ──────────────────────────────────────────

fn editor_with_editable_curve() -> (Editor, ItemId) {
    let mut curve = curve_item("edit_me", false);
    if let Shape::Curve(props) = &mut curve.shape {
        props.points = vec![
            CurvePoint::linear(0.0, 0.0),
            CurvePoint::linear(100.0, 0.0),
            CurvePoint::linear(200.0, 80.0),
        ];
    }
    let mut editor = Editor::new(Scheme {
        items: vec![curve],
        ..Scheme::default()
    });
    let id = ItemId::intern("edit_me");
    editor.edit_curve(id);
    (editor, id)
}

#[test]
fn dragging_a_point_moves_it_and_commits() {
    let (mut editor, id) = editor_with_editable_curve();

    editor.mouse_down(&PointerEvent::at(100.0, 0.0), &HitObject::CurvePoint { index: 1 });
    editor.mouse_move(&PointerEvent::at(120.0, 30.0), &HitObject::CurvePoint { index: 1 });
    editor.mouse_up(
        &PointerEvent::at(120.0, 30.0).released(),
        &HitObject::CurvePoint { index: 1 },
    );

    let props = curve_props(&editor, id);
    assert_eq!(props.points[1].pos(), Point::new(120.0, 30.0));
    assert!(
        editor
            .drain_events()
            .iter()
            .any(|e| matches!(e, EditorEvent::SchemeChangeCommitted)),
    );
    assert_eq!(editor.state_name(), "edit-curve", "editing continues after the drag");
}

#[test]
fn double_click_on_stroke_inserts_a_point() {
    let (mut editor, id) = editor_with_editable_curve();

    // Midway on the first segment, 1 px off the stroke.
    editor.mouse_double_click(&PointerEvent::at(50.0, 1.0), &HitObject::None);

    let props = curve_props(&editor, id);
    assert_eq!(props.points.len(), 4);
    let inserted = props.points[1].pos();
    assert!((inserted.x - 50.0).abs() < 1.0);
    assert!(inserted.y.abs() < 1e-3);
}

#[test]
fn double_click_far_from_stroke_does_nothing() {
    let (mut editor, id) = editor_with_editable_curve();
    editor.mouse_double_click(&PointerEvent::at(50.0, 60.0), &HitObject::None);
    assert_eq!(curve_props(&editor, id).points.len(), 3);
}

#[test]
fn context_actions_convert_and_delete_points() {
    let (mut editor, id) = editor_with_editable_curve();

    editor.convert_curve_point_to_bezier(1);
    assert!(matches!(
        curve_props(&editor, id).points[1],
        CurvePoint::Bezier { .. }
    ));

    editor.convert_curve_point_to_simple(1);
    assert!(matches!(
        curve_props(&editor, id).points[1],
        CurvePoint::Linear { .. }
    ));

    editor.delete_curve_point(1);
    assert_eq!(curve_props(&editor, id).points.len(), 2);
}

#[test]
fn right_click_on_point_requests_context_menu() {
    let (mut editor, _id) = editor_with_editable_curve();
    editor.drain_events();

    editor.mouse_down(
        &PointerEvent::at(100.0, 0.0).with_button(skema_editor::input::MouseButton::Right),
        &HitObject::CurvePoint { index: 1 },
    );
    let events = editor.drain_events();
    assert!(
        events
            .iter()
            .any(|e| matches!(e, EditorEvent::ContextMenuRequested { .. })),
    );
}

#[test]
fn detach_clears_attachment_fields() {
    let mut curve = curve_item("det", true);
    if let Shape::Curve(props) = &mut curve.shape {
        props.points = vec![CurvePoint::linear(100.0, 50.0), CurvePoint::linear(250.0, 50.0)];
        props.source_item = Some("#det_anchor".to_string());
        props.source_item_position = 0.5;
    }
    let mut editor = Editor::new(Scheme {
        items: vec![rect("det_anchor", 0.0, 0.0, 100.0, 100.0), curve],
        ..Scheme::default()
    });
    let id = ItemId::intern("det");
    editor.edit_curve(id);

    editor.detach_curve_source();
    let props = curve_props(&editor, id);
    assert!(props.source_item.is_none());
    assert_eq!(props.source_item_position, 0.0);
}

#[test]
fn point_select_box_and_delete_key() {
    let (mut editor, id) = editor_with_editable_curve();

    // Box over the two left points.
    editor.mouse_down(&PointerEvent::at(-10.0, -10.0), &HitObject::None);
    editor.mouse_move(&PointerEvent::at(110.0, 10.0), &HitObject::None);
    editor.mouse_up(&PointerEvent::at(110.0, 10.0).released(), &HitObject::None);

    editor.key_pressed(Key::Delete);
    let props = curve_props(&editor, id);
    assert_eq!(props.points.len(), 1);
    assert_eq!(props.points[0].pos(), Point::new(200.0, 80.0));
}
