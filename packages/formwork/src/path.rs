//! Dot-path access into JSON document trees.
//!
//! Paths are dot-separated (`data.address.city`); a numeric segment indexes
//! into an array (`items.0.price`).

use serde_json::Value;

/// Resolve a dot-path to a single value.
pub fn get<'a>(doc: &'a Value, path: &str) -> Option<&'a Value> {
    let mut current = doc;
    for segment in path.split('.') {
        current = match current {
            Value::Object(map) => map.get(segment)?,
            Value::Array(items) => items.get(segment.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }
    Some(current)
}

/// Resolve a dot-path to every matching value, descending into arrays the
/// way a document store does: a non-numeric segment applied to an array maps
/// over its elements. Used by filter matching, where `access.resources`
/// must reach inside an array of access entries.
pub fn candidates<'a>(doc: &'a Value, path: &str) -> Vec<&'a Value> {
    let mut current = vec![doc];
    for segment in path.split('.') {
        let mut next = Vec::new();
        for value in current {
            match value {
                Value::Object(map) => {
                    if let Some(v) = map.get(segment) {
                        next.push(v);
                    }
                }
                Value::Array(items) => {
                    if let Ok(index) = segment.parse::<usize>() {
                        if let Some(v) = items.get(index) {
                            next.push(v);
                        }
                    } else {
                        for item in items {
                            if let Some(v) = item.get(segment) {
                                next.push(v);
                            }
                        }
                    }
                }
                _ => {}
            }
        }
        current = next;
        if current.is_empty() {
            break;
        }
    }
    current
}
