//! JSON template engine.
//!
//! Templates are plain JSON documents annotated with `$-` directives that
//! are expanded against a scope of named values:
//!
//! - `{"$-expr": "x + 1"}` — replaced by the expression result
//! - `{"$-str": "item ${i}"}` — string interpolation
//! - `"$-if"` / `"$-else-if"` / `"$-else"` — conditional array elements
//! - `"$-for": {start, until, step, it}` — numeric range expansion
//! - `"$-foreach": {source, it}` — expansion over an array in scope
//! - `"$-eval": [..]` — assignment scripts run before the rest of the object
//! - `"$-def:<name>"` / `{"$-ref": "<name>"}` — named values with outward
//!   scope lookup, evaluated at the reference site
//!
//! Evaluation is a pure tree transform: the same template and scope always
//! produce deep-equal output. Malformed expressions are logged and the
//! enclosing key or array element is skipped — the rest of the template
//! proceeds.

use crate::expr::{Scope, evaluate_expression, format_value, number_value, truthy};
use crate::id::ItemId;
use crate::model::Item;
use log::{debug, warn};
use serde_json::{Map, Value};

const DIRECTIVE_EXPR: &str = "$-expr";
const DIRECTIVE_STR: &str = "$-str";
const DIRECTIVE_REF: &str = "$-ref";
const DIRECTIVE_IF: &str = "$-if";
const DIRECTIVE_ELSE_IF: &str = "$-else-if";
const DIRECTIVE_ELSE: &str = "$-else";
const DIRECTIVE_FOR: &str = "$-for";
const DIRECTIVE_FOREACH: &str = "$-foreach";
const DIRECTIVE_EVAL: &str = "$-eval";
const DIRECTIVE_DEF_PREFIX: &str = "$-def:";

/// Expand a template against a parameter object.
pub fn process_json_template(template: &Value, params: &Value) -> Result<Value, String> {
    let mut scope = match params {
        Value::Object(map) => Scope::with_values(map.clone()),
        Value::Null => Scope::new(),
        other => return Err(format!("template parameters must be an object, got {other}")),
    };
    Ok(process_value(template, &mut scope))
}

fn process_value(value: &Value, scope: &mut Scope) -> Value {
    match value {
        Value::Object(map) => {
            if let Some(expr) = map.get(DIRECTIVE_EXPR) {
                return eval_directive(expr, scope);
            }
            if let Some(template) = map.get(DIRECTIVE_STR) {
                return interpolate_directive(template, scope);
            }
            if let Some(name) = map.get(DIRECTIVE_REF) {
                return resolve_ref(name, scope);
            }
            Value::Object(process_object(map, scope))
        }
        Value::Array(items) => Value::Array(process_array(items, scope)),
        other => other.clone(),
    }
}

fn eval_directive(expr: &Value, scope: &mut Scope) -> Value {
    let Value::String(text) = expr else {
        warn!("$-expr directive must hold a string, got {expr}");
        return Value::Null;
    };
    match evaluate_expression(text, scope) {
        Ok(result) => result,
        Err(err) => {
            warn!("skipping $-expr {text:?}: {err}");
            Value::Null
        }
    }
}

fn interpolate_directive(template: &Value, scope: &mut Scope) -> Value {
    let Value::String(text) = template else {
        warn!("$-str directive must hold a string, got {template}");
        return Value::Null;
    };
    Value::String(interpolate(text, scope))
}

/// Replace every `${expr}` region with its evaluated value.
fn interpolate(text: &str, scope: &mut Scope) -> String {
    let mut result = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(start) = rest.find("${") {
        result.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        match after.find('}') {
            Some(end) => {
                let expr = &after[..end];
                match evaluate_expression(expr, scope) {
                    Ok(value) => result.push_str(&format_value(&value)),
                    Err(err) => warn!("skipping interpolation {expr:?}: {err}"),
                }
                rest = &after[end + 1..];
            }
            None => {
                // Unterminated interpolation: keep the raw text.
                result.push_str(&rest[start..]);
                rest = "";
            }
        }
    }
    result.push_str(rest);
    result
}

fn resolve_ref(name: &Value, scope: &mut Scope) -> Value {
    let Value::String(name) = name else {
        warn!("$-ref directive must hold a string, got {name}");
        return Value::Null;
    };
    match scope.lookup_def(name).cloned() {
        // Definitions are evaluated at the reference site, against the
        // scope that is current there.
        Some(template) => process_value(&template, scope),
        None => {
            warn!("unresolved $-ref {name:?}");
            Value::Null
        }
    }
}

/// Process object keys top-to-bottom so `$-eval` and `$-def` bindings made
/// earlier in the object are visible to later siblings and descendants.
fn process_object(map: &Map<String, Value>, scope: &mut Scope) -> Map<String, Value> {
    scope.push_frame();
    let mut output = Map::new();
    for (key, value) in map {
        if key == DIRECTIVE_EVAL {
            run_eval_scripts(value, scope);
            continue;
        }
        if let Some(name) = key.strip_prefix(DIRECTIVE_DEF_PREFIX) {
            scope.define(name, value.clone());
            continue;
        }
        if matches!(
            key.as_str(),
            DIRECTIVE_IF | DIRECTIVE_ELSE_IF | DIRECTIVE_ELSE | DIRECTIVE_FOR | DIRECTIVE_FOREACH
        ) {
            // Conditional and loop directives only make sense on array
            // elements; the array layer consumes them before recursing.
            debug!("ignoring stray {key} directive outside of an array");
            continue;
        }
        output.insert(key.clone(), process_value(value, scope));
    }
    scope.pop_frame();
    output
}

fn run_eval_scripts(scripts: &Value, scope: &mut Scope) {
    let Value::Array(scripts) = scripts else {
        warn!("$-eval directive must hold an array of expressions");
        return;
    };
    for script in scripts {
        let Value::String(text) = script else {
            warn!("$-eval entries must be strings, got {script}");
            continue;
        };
        if let Err(err) = evaluate_expression(text, scope) {
            warn!("skipping $-eval script {text:?}: {err}");
        }
    }
}

fn process_array(items: &[Value], scope: &mut Scope) -> Vec<Value> {
    let mut output = Vec::with_capacity(items.len());
    // Tracks whether the current if/else-if/else chain already matched.
    let mut chain_matched = false;
    for element in items {
        let Value::Object(map) = element else {
            chain_matched = false;
            output.push(process_value(element, scope));
            continue;
        };

        if let Some(spec) = map.get(DIRECTIVE_FOR) {
            chain_matched = false;
            expand_for(spec, map, scope, &mut output);
        } else if let Some(spec) = map.get(DIRECTIVE_FOREACH) {
            chain_matched = false;
            expand_foreach(spec, map, scope, &mut output);
        } else if let Some(condition) = map.get(DIRECTIVE_IF) {
            chain_matched = eval_condition(condition, scope);
            if chain_matched {
                output.push(process_stripped(map, DIRECTIVE_IF, scope));
            }
        } else if let Some(condition) = map.get(DIRECTIVE_ELSE_IF) {
            if !chain_matched && eval_condition(condition, scope) {
                chain_matched = true;
                output.push(process_stripped(map, DIRECTIVE_ELSE_IF, scope));
            }
        } else if map.contains_key(DIRECTIVE_ELSE) {
            if !chain_matched {
                output.push(process_stripped(map, DIRECTIVE_ELSE, scope));
            }
            chain_matched = false;
        } else {
            chain_matched = false;
            output.push(Value::Object(process_object(map, scope)));
        }
    }
    output
}

fn eval_condition(condition: &Value, scope: &mut Scope) -> bool {
    let Value::String(text) = condition else {
        warn!("condition directive must hold a string, got {condition}");
        return false;
    };
    match evaluate_expression(text, scope) {
        Ok(value) => truthy(&value),
        Err(err) => {
            warn!("skipping conditional element, bad condition {text:?}: {err}");
            false
        }
    }
}

/// Process an array element object with one directive key removed.
fn process_stripped(map: &Map<String, Value>, directive: &str, scope: &mut Scope) -> Value {
    let mut stripped = map.clone();
    stripped.remove(directive);
    Value::Object(process_object(&stripped, scope))
}

fn expand_for(spec: &Value, element: &Map<String, Value>, scope: &mut Scope, output: &mut Vec<Value>) {
    let Value::Object(spec) = spec else {
        warn!("$-for directive must hold an object");
        return;
    };
    let start = loop_bound(spec.get("start"), scope).unwrap_or(0.0);
    let Some(until) = loop_bound(spec.get("until"), scope) else {
        warn!("$-for is missing a valid 'until' bound");
        return;
    };
    let step = loop_bound(spec.get("step"), scope).unwrap_or(1.0);
    if step == 0.0 || (step > 0.0) != (until >= start) {
        warn!("$-for range from {start} to {until} with step {step} does not terminate");
        return;
    }
    let Some(Value::String(it)) = spec.get("it") else {
        warn!("$-for is missing the iterator name 'it'");
        return;
    };

    let mut stripped = element.clone();
    stripped.remove(DIRECTIVE_FOR);
    let mut i = start;
    while (step > 0.0 && i < until) || (step < 0.0 && i > until) {
        scope.push_frame();
        scope.bind_local(it, number_value(i));
        output.push(Value::Object(process_object(&stripped, scope)));
        scope.pop_frame();
        i += step;
    }
}

fn loop_bound(value: Option<&Value>, scope: &mut Scope) -> Option<f64> {
    let value = value?;
    let processed = process_value(value, scope);
    processed.as_f64()
}

fn expand_foreach(
    spec: &Value,
    element: &Map<String, Value>,
    scope: &mut Scope,
    output: &mut Vec<Value>,
) {
    let Value::Object(spec) = spec else {
        warn!("$-foreach directive must hold an object");
        return;
    };
    let Some(Value::String(source)) = spec.get("source") else {
        warn!("$-foreach is missing the 'source' name");
        return;
    };
    let Some(Value::String(it)) = spec.get("it") else {
        warn!("$-foreach is missing the iterator name 'it'");
        return;
    };
    let Some(Value::Array(values)) = scope.get(source).cloned() else {
        warn!("$-foreach source {source:?} is not an array in scope");
        return;
    };

    let mut stripped = element.clone();
    stripped.remove(DIRECTIVE_FOREACH);
    for value in values {
        scope.push_frame();
        scope.bind_local(it, value);
        output.push(Value::Object(process_object(&stripped, scope)));
        scope.pop_frame();
    }
}

// ─── Template instances ──────────────────────────────────────────────────

/// Expand a template's `items` array into concrete items. Every generated
/// item is marked as templated; an id declared in the template becomes the
/// item's stable `templatedId` while the real scene id is freshly
/// generated, so re-evaluation never collides with live ids.
pub fn generate_items(template: &Value, params: &Value) -> Result<Vec<Item>, String> {
    let processed = process_json_template(template, params)?;
    let mut items_value = processed
        .get("items")
        .cloned()
        .unwrap_or_else(|| Value::Array(Vec::new()));
    if let Value::Array(elements) = &mut items_value {
        for element in elements {
            mark_templated(element);
        }
    }
    serde_json::from_value(items_value).map_err(|e| format!("template produced invalid items: {e}"))
}

fn mark_templated(value: &mut Value) {
    let Value::Object(map) = value else {
        return;
    };
    let declared_id = map.get("id").and_then(|v| v.as_str()).map(str::to_string);
    map.insert(
        "id".to_string(),
        Value::String(ItemId::unique("item").to_string()),
    );
    let mut args = Map::new();
    args.insert("templated".to_string(), Value::Bool(true));
    if let Some(tid) = declared_id {
        args.insert("templatedId".to_string(), Value::String(tid));
    }
    map.insert("args".to_string(), Value::Object(args));
    if !map.contains_key("shape") {
        map.insert("shape".to_string(), Value::String("rect".to_string()));
    }
    if let Some(Value::Array(children)) = map.get_mut("childItems") {
        for child in children {
            mark_templated(child);
        }
    }
}

/// Find an item in a template instance by the id the template assigned it
/// (not its scene id).
pub fn find_item_by_templated_id<'a>(root: &'a Item, templated_id: &str) -> Option<&'a Item> {
    let mut queue: Vec<&Item> = root.child_items.iter().collect();
    while let Some(item) = queue.pop() {
        if item.templated_id() == Some(templated_id) {
            return Some(item);
        }
        queue.extend(item.child_items.iter());
    }
    None
}

/// Carry native (non-templated) children from a previous template instance
/// into a freshly generated one, matching by `templatedId` rather than
/// structural position.
pub fn preserve_native_children(old_root: &Item, new_root: &mut Item) {
    let mut natives: Vec<(Option<String>, Vec<Item>)> = Vec::new();
    collect_natives(old_root, true, &mut natives);
    for (templated_id, children) in natives {
        let target = match &templated_id {
            None => Some(&mut *new_root),
            Some(tid) => find_item_by_templated_id_mut(new_root, tid),
        };
        if let Some(target) = target {
            target.child_items.extend(children);
        } else {
            debug!("dropping native children of a removed templated item");
        }
    }
}

fn collect_natives(item: &Item, is_root: bool, out: &mut Vec<(Option<String>, Vec<Item>)>) {
    let natives: Vec<Item> = item
        .child_items
        .iter()
        .filter(|child| !child.is_templated())
        .cloned()
        .collect();
    if !natives.is_empty() {
        let key = if is_root {
            None
        } else {
            item.templated_id().map(str::to_string)
        };
        out.push((key, natives));
    }
    for child in item.child_items.iter().filter(|c| c.is_templated()) {
        collect_natives(child, false, out);
    }
}

fn find_item_by_templated_id_mut<'a>(root: &'a mut Item, templated_id: &str) -> Option<&'a mut Item> {
    if root.templated_id() == Some(templated_id) {
        return Some(root);
    }
    for child in &mut root.child_items {
        if let Some(found) = find_item_by_templated_id_mut(child, templated_id) {
            return Some(found);
        }
    }
    None
}
