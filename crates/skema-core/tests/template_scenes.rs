//! Integration tests: template expansion into live scenes (skema-core).
//!
//! Exercises the full path from an annotated JSON template through item
//! generation into the scheme container, including regeneration with
//! native-children preservation.

use serde_json::json;
use skema_core::container::SchemeContainer;
use skema_core::id::ItemId;
use skema_core::model::{Item, Scheme, Shape};
use skema_core::templater::{find_item_by_templated_id, generate_items, preserve_native_children};

fn row_template() -> serde_json::Value {
    json!({
        "$-eval": ["gap = 20"],
        "items": [{
            "id": "row",
            "name": "Row",
            "shape": "rect",
            "shapeProps": {},
            "area": {"x": 0, "y": 0, "w": {"$-expr": "cells * (size + gap)"}, "h": {"$-expr": "size"}},
            "childItems": [{
                "$-for": {"start": 0, "until": {"$-expr": "cells"}, "step": 1, "it": "i"},
                "id": {"$-str": "cell_${i}"},
                "name": {"$-str": "Cell ${i}"},
                "shape": "rect",
                "shapeProps": {},
                "area": {
                    "x": {"$-expr": "i * (size + gap)"},
                    "y": 0,
                    "w": {"$-expr": "size"},
                    "h": {"$-expr": "size"}
                }
            }]
        }]
    })
}

#[test]
fn template_expands_into_a_live_scene() {
    let items = generate_items(&row_template(), &json!({"cells": 3, "size": 40})).unwrap();
    assert_eq!(items.len(), 1);
    assert_eq!(items[0].child_items.len(), 3);

    let container = SchemeContainer::from_scheme(Scheme {
        items,
        ..Scheme::default()
    });
    assert_eq!(container.items_count(), 4);

    // Children were laid out by the loop variable and are spatially
    // queryable through the container.
    let roots = container.top_level_items();
    let children = container.children_of(roots[0]);
    assert_eq!(children.len(), 3);
    let second = container.find_item_by_id(children[1]).unwrap();
    assert_eq!(second.name, "Cell 1");
    assert_eq!(second.area.x, 60.0);
    let world = container.world_point_on_item(0.0, 0.0, second);
    assert!((world.x - 60.0).abs() < 1e-3);
}

#[test]
fn regeneration_is_deterministic_modulo_ids() {
    let params = json!({"cells": 2, "size": 30});
    let strip_ids = |items: &[Item]| -> serde_json::Value {
        let mut value = serde_json::to_value(items).unwrap();
        fn strip(v: &mut serde_json::Value) {
            if let serde_json::Value::Object(map) = v {
                map.remove("id");
                if let Some(children) = map.get_mut("childItems") {
                    if let serde_json::Value::Array(items) = children {
                        for item in items {
                            strip(item);
                        }
                    }
                }
            }
            if let serde_json::Value::Array(items) = v {
                for item in items {
                    strip(item);
                }
            }
        }
        strip(&mut value);
        value
    };

    let first = generate_items(&row_template(), &params).unwrap();
    let second = generate_items(&row_template(), &params).unwrap();
    assert_eq!(strip_ids(&first), strip_ids(&second));
}

#[test]
fn parameter_change_preserves_native_children() {
    let params_small = json!({"cells": 2, "size": 30});
    let params_large = json!({"cells": 4, "size": 30});

    let mut old_root = Item::new(ItemId::intern("instance_root"), "instance", Shape::default());
    old_root.child_items = generate_items(&row_template(), &params_small).unwrap();

    // The user drops their own item inside the first generated cell.
    {
        let row = &mut old_root.child_items[0];
        let note = Item::new(ItemId::intern("sticky_note"), "Note", Shape::default());
        row.child_items[0].child_items.push(note);
    }

    let mut new_root = Item::new(ItemId::intern("instance_root"), "instance", Shape::default());
    new_root.child_items = generate_items(&row_template(), &params_large).unwrap();
    preserve_native_children(&old_root, &mut new_root);

    // The regenerated row has more cells, and the native note landed in
    // the cell with the matching templated id, not at some position.
    assert_eq!(new_root.child_items[0].child_items.len(), 4);
    let cell = find_item_by_templated_id(&new_root, "cell_0").unwrap();
    assert_eq!(cell.child_items.len(), 1);
    assert_eq!(cell.child_items[0].id, ItemId::intern("sticky_note"));
    assert!(!cell.child_items[0].is_templated());
}
