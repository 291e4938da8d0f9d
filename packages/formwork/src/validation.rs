//! The validation & coercion engine.
//!
//! `apply(schema, input, prior, cx)` walks a schema against an input
//! document in two passes:
//!
//! 1. **set** — resolve defaults, enforce `readOnly` against the prior
//!    document, run custom setters, coerce every leaf to its declared
//!    primitive, and normalize strings. A coercion failure is dropped
//!    silently under `looseType`, otherwise recorded as a field error for
//!    that leaf only; sibling leaves are unaffected.
//! 2. **validate** — runs only after every leaf has been set, so rules may
//!    reference sibling values and issue uniqueness queries against the
//!    coerced value. `required`, `enum`, then each validator in declaration
//!    order.
//!
//! All errors across the whole document are collected into one path→message
//! map before the save is rejected; there is no first-error short-circuit.
//! Applying the engine to its own output yields the same document.

use chrono::{DateTime, SecondsFormat, Utc};
use futures::future::BoxFuture;
use futures::FutureExt;
use serde_json::{Map, Value};

use crate::error::{CoreError, CoreResult, FieldErrors};
use crate::id::DocumentId;
use crate::schema::{EntitySchema, FieldDescriptor, FieldType, ScalarType, ValidatorContext};
use crate::store::{DocumentStore, Filter};

/// Document-level context for one engine run.
pub struct ValidationContext<'a> {
    pub store: &'a dyn DocumentStore,
    pub collection: &'a str,
    /// Scoping predicate for uniqueness rules, from `EntityHooks::unique_query`.
    pub scope: Filter,
    /// The document's own id, excluded from uniqueness queries on update.
    pub exclude_id: Option<DocumentId>,
}

/// Coerce and validate `input` against `schema`. `prior` is the stored
/// document on update, `None` on create. Returns the coerced document or
/// the complete field-error map.
pub async fn apply(
    schema: &EntitySchema,
    input: &Value,
    prior: Option<&Value>,
    cx: &ValidationContext<'_>,
) -> CoreResult<Value> {
    let updating = prior.is_some();
    let mut errors = FieldErrors::new();
    let mut out = Map::new();

    // Pass 1: set. Fields not named by the schema are dropped.
    for (name, desc) in &schema.fields {
        let submitted = input.get(name);
        let prior_value = prior.and_then(|p| p.get(name));
        if let Some(value) = set_value(
            desc,
            submitted,
            prior_value,
            name,
            updating,
            &mut errors,
            cx.store,
        ) {
            out.insert(name.clone(), value);
        }
    }

    // Pass 2: validate, against the fully-set document.
    let doc = Value::Object(out);
    for (name, desc) in &schema.fields {
        validate_value(desc, doc.get(name), &doc, name.clone(), &mut errors, cx).await;
    }

    if errors.is_empty() {
        Ok(doc)
    } else {
        Err(CoreError::Validation(errors))
    }
}

// ============================================================================
// Pass 1: set
// ============================================================================

fn set_value(
    desc: &FieldDescriptor,
    submitted: Option<&Value>,
    prior: Option<&Value>,
    path: &str,
    updating: bool,
    errors: &mut FieldErrors,
    store: &dyn DocumentStore,
) -> Option<Value> {
    // Read-only paths ignore the submitted value entirely on update.
    if desc.read_only && updating {
        return prior.cloned();
    }

    let mut value = match submitted {
        Some(v) if !v.is_null() => Some(v.clone()),
        _ => desc.default.as_ref().map(|d| d.resolve()),
    };

    if let Some(set) = &desc.set {
        value = value.map(|v| set(v));
    }

    match &desc.field_type {
        FieldType::Any => value,
        FieldType::Scalar(scalar) => {
            let v = value?;
            match coerce_scalar(*scalar, v, store) {
                Ok(v) => Some(normalize_string(desc, v)),
                Err(()) => {
                    if !desc.loose_type {
                        errors.insert(path, format!("invalid value for type '{}'", scalar.name()));
                    }
                    None
                }
            }
        }
        FieldType::Object(fields) => {
            let base = match &value {
                Some(Value::Object(map)) => Some(map),
                Some(_) => {
                    if !desc.loose_type {
                        errors.insert(path, "invalid value for type 'object'");
                    }
                    return None;
                }
                None => None,
            };
            let mut out = Map::new();
            for (key, child) in fields {
                let child_submitted = base.and_then(|m| m.get(key));
                let child_prior = prior.and_then(|p| p.get(key));
                let child_path = format!("{path}.{key}");
                if let Some(v) = set_value(
                    child,
                    child_submitted,
                    child_prior,
                    &child_path,
                    updating,
                    errors,
                    store,
                ) {
                    out.insert(key.clone(), v);
                }
            }
            if out.is_empty() && value.is_none() {
                None
            } else {
                Some(Value::Object(out))
            }
        }
        FieldType::Array(element) => {
            let items = match value? {
                Value::Array(items) => items,
                _ => {
                    if !desc.loose_type {
                        errors.insert(path, "invalid value for type 'array'");
                    }
                    return None;
                }
            };
            let prior_items = prior.and_then(Value::as_array);
            let mut out = Vec::with_capacity(items.len());
            for (index, item) in items.into_iter().enumerate() {
                let item_prior = prior_items.and_then(|p| p.get(index));
                let item_path = format!("{path}.{index}");
                if let Some(v) = set_value(
                    element,
                    Some(&item),
                    item_prior,
                    &item_path,
                    updating,
                    errors,
                    store,
                ) {
                    out.push(v);
                }
            }
            Some(Value::Array(out))
        }
    }
}

fn coerce_scalar(scalar: ScalarType, value: Value, store: &dyn DocumentStore) -> Result<Value, ()> {
    match scalar {
        ScalarType::String => match value {
            Value::String(s) => Ok(Value::String(s)),
            Value::Number(n) => Ok(Value::String(n.to_string())),
            Value::Bool(b) => Ok(Value::String(b.to_string())),
            _ => Err(()),
        },
        ScalarType::Number => match value {
            Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Ok(Value::from(i))
                } else if n.as_f64().is_some_and(|f| f.fract() == 0.0) {
                    Ok(Value::from(n.as_f64().unwrap_or(0.0) as i64))
                } else {
                    Err(())
                }
            }
            Value::String(s) => s.trim().parse::<i64>().map(Value::from).map_err(|_| ()),
            _ => Err(()),
        },
        ScalarType::Boolean => Ok(Value::Bool(truthy(&value))),
        ScalarType::Date => parse_date(&value)
            .map(|d| Value::String(d.to_rfc3339_opts(SecondsFormat::Millis, true)))
            .ok_or(()),
        ScalarType::Id => match value {
            Value::String(s) => store
                .to_id(&s)
                .map(|id| Value::String(id.to_string()))
                .map_err(|_| ()),
            _ => Err(()),
        },
    }
}

fn truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !matches!(s.as_str(), "" | "false" | "0"),
        Value::Array(_) | Value::Object(_) => true,
    }
}

fn parse_date(value: &Value) -> Option<DateTime<Utc>> {
    match value {
        Value::String(s) => DateTime::parse_from_rfc3339(s)
            .ok()
            .map(|d| d.with_timezone(&Utc)),
        Value::Number(n) => n.as_i64().and_then(DateTime::from_timestamp_millis),
        _ => None,
    }
}

fn normalize_string(desc: &FieldDescriptor, value: Value) -> Value {
    let Value::String(mut s) = value else {
        return value;
    };
    if desc.trim {
        s = s.trim().to_string();
    }
    if desc.lowercase {
        s = s.to_lowercase();
    }
    Value::String(s)
}

// ============================================================================
// Pass 2: validate
// ============================================================================

/// `0` and `false` are values; only null, absent, empty string, and empty
/// array count as empty.
fn is_empty(value: Option<&Value>) -> bool {
    match value {
        None | Some(Value::Null) => true,
        Some(Value::String(s)) => s.is_empty(),
        Some(Value::Array(items)) => items.is_empty(),
        _ => false,
    }
}

fn validate_value<'a>(
    desc: &'a FieldDescriptor,
    value: Option<&'a Value>,
    doc: &'a Value,
    path: String,
    errors: &'a mut FieldErrors,
    cx: &'a ValidationContext<'_>,
) -> BoxFuture<'a, ()> {
    async move {
        if is_empty(value) {
            if desc.required {
                errors.insert(&path, "is required");
            }
            return;
        }
        let value = value.unwrap_or(&Value::Null);

        if let Some(allowed) = &desc.enum_values {
            if !allowed.contains(value) {
                errors.insert(&path, "is not an allowed value");
                return;
            }
        }

        for validator in &desc.validators {
            let vcx = ValidatorContext {
                store: cx.store,
                collection: cx.collection,
                scope: &cx.scope,
                exclude_id: cx.exclude_id.as_ref(),
                path: &path,
            };
            match validator.check(value, doc, &vcx).await {
                Ok(true) => {}
                Ok(false) => {
                    errors.insert(&path, validator.message());
                    break;
                }
                Err(e) => {
                    errors.insert(&path, format!("validation failed: {e}"));
                    break;
                }
            }
        }

        match &desc.field_type {
            FieldType::Object(fields) => {
                for (key, child) in fields {
                    let child_value = value.get(key);
                    let child_path = format!("{path}.{key}");
                    validate_value(child, child_value, doc, child_path, errors, cx).await;
                }
            }
            FieldType::Array(element) => {
                if let Value::Array(items) = value {
                    for (index, item) in items.iter().enumerate() {
                        let item_path = format!("{path}.{index}");
                        validate_value(element, Some(item), doc, item_path, errors, cx).await;
                    }
                }
            }
            _ => {}
        }
    }
    .boxed()
}
