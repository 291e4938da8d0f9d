//! Depth-first walk of a form's component tree against submission data.
//!
//! Container components move the data cursor (array rows, nested-form `data`
//! wrappers, plain containers); layout components recurse without moving it;
//! leaves dispatch to the registered handlers. The walk is strictly
//! sequential and mutates the data tree in place.

use serde_json::{Map, Value};

use super::handlers::{FieldContext, FieldHandlerRegistry};
use crate::action::HandlerPhase;
use crate::request::ResourceMethod;

/// Layout types whose children share the parent's data object.
const LAYOUT_TYPES: &[&str] = &["columns", "table", "panel", "well", "fieldset"];

/// Walk `components` (the form's `components` array) over `data` (the
/// submission's `data` object), invoking matching handlers on each leaf.
pub fn visit(
    components: &Value,
    data: &mut Value,
    phase: HandlerPhase,
    method: ResourceMethod,
    registry: &FieldHandlerRegistry,
) {
    let Some(list) = components.as_array() else {
        return;
    };
    for component in list {
        visit_component(component, data, phase, method, registry, "");
    }
}

fn visit_component(
    component: &Value,
    data: &mut Value,
    phase: HandlerPhase,
    method: ResourceMethod,
    registry: &FieldHandlerRegistry,
    path: &str,
) {
    let component_type = component
        .get("type")
        .and_then(Value::as_str)
        .unwrap_or_default();
    let key = component.get("key").and_then(Value::as_str).unwrap_or_default();

    match component_type {
        // Array containers: one data row per entry, indexed paths.
        "datagrid" | "editgrid" => {
            if key.is_empty() {
                return;
            }
            let row_path = join(path, key);
            if let Some(rows) = data.get_mut(key).and_then(Value::as_array_mut) {
                for (index, row) in rows.iter_mut().enumerate() {
                    let indexed = format!("{row_path}.{index}");
                    visit_children(component, row, phase, method, registry, &indexed);
                }
            }
        }
        // Nested form: the row wraps its fields in a `data` key.
        "form" => {
            if key.is_empty() {
                return;
            }
            let child_path = join(&join(path, key), "data");
            if let Some(inner) = data.get_mut(key).and_then(|row| row.get_mut("data")) {
                visit_children(component, inner, phase, method, registry, &child_path);
            }
        }
        // Container: children live under the component key.
        "container" => {
            if key.is_empty() {
                return;
            }
            let child_path = join(path, key);
            if let Some(inner) = data.get_mut(key) {
                visit_children(component, inner, phase, method, registry, &child_path);
            }
        }
        // Layout: children share this data object.
        t if LAYOUT_TYPES.contains(&t) => {
            for child in layout_children(component) {
                visit_component(child, data, phase, method, registry, path);
            }
        }
        // Leaf: dispatch handlers.
        _ => {
            if key.is_empty() {
                return;
            }
            let Some(parent) = data.as_object_mut() else {
                return;
            };
            dispatch(component, parent, key, phase, method, registry, path);
        }
    }
}

fn visit_children(
    component: &Value,
    data: &mut Value,
    phase: HandlerPhase,
    method: ResourceMethod,
    registry: &FieldHandlerRegistry,
    path: &str,
) {
    if let Some(children) = component.get("components").and_then(Value::as_array) {
        for child in children {
            visit_component(child, data, phase, method, registry, path);
        }
    }
}

/// Flatten the nested child lists a layout component may carry: direct
/// `components`, `columns[].components`, and `rows[][].components`.
fn layout_children(component: &Value) -> Vec<&Value> {
    let mut children = Vec::new();
    if let Some(direct) = component.get("components").and_then(Value::as_array) {
        children.extend(direct);
    }
    if let Some(columns) = component.get("columns").and_then(Value::as_array) {
        for column in columns {
            if let Some(nested) = column.get("components").and_then(Value::as_array) {
                children.extend(nested);
            }
        }
    }
    if let Some(rows) = component.get("rows").and_then(Value::as_array) {
        for row in rows.iter().filter_map(Value::as_array) {
            for cell in row {
                if let Some(nested) = cell.get("components").and_then(Value::as_array) {
                    children.extend(nested);
                }
            }
        }
    }
    children
}

fn dispatch(
    component: &Value,
    parent: &mut Map<String, Value>,
    key: &str,
    phase: HandlerPhase,
    method: ResourceMethod,
    registry: &FieldHandlerRegistry,
    path: &str,
) {
    let full_path = join(path, key);
    let cx = FieldContext {
        phase,
        method,
        path: &full_path,
    };
    let component_type = component
        .get("type")
        .and_then(Value::as_str)
        .unwrap_or_default();
    for handler in registry.for_type(component_type) {
        handler.handle(component, parent, key, cx);
    }
    for handler in registry.for_properties(component) {
        handler.handle(component, parent, key, cx);
    }
}

fn join(path: &str, key: &str) -> String {
    if path.is_empty() {
        key.to_string()
    } else {
        format!("{path}.{key}")
    }
}
