//! Built-in entity schemas: Form, Submission, Role, Action, ActionItem.

use anyhow::Result;
use async_trait::async_trait;
use indexmap::IndexMap;
use serde_json::{json, Value};

use super::descriptor::{FieldDescriptor, UniqueRule};
use super::entity::{EntityHooks, EntitySchema};
use crate::store::{DocumentStore, Filter};

// ============================================================================
// Machine names
// ============================================================================

/// Reduce a title to a machine-name slug: lowercase alphanumerics only.
fn slugify(title: &str) -> String {
    let slug: String = title
        .chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .map(|c| c.to_ascii_lowercase())
        .collect();
    if slug.is_empty() {
        "entity".to_string()
    } else {
        slug
    }
}

/// Generate a machine name for `doc` unless it already has one. Collisions
/// get a numeric suffix one past the highest existing suffix, so repeated
/// saves never re-increment.
async fn ensure_machine_name(
    doc: &mut Value,
    store: &dyn DocumentStore,
    collection: &str,
) -> Result<()> {
    if doc
        .get("machineName")
        .and_then(Value::as_str)
        .is_some_and(|name| !name.is_empty())
    {
        return Ok(());
    }
    let title = doc.get("title").and_then(Value::as_str).unwrap_or("");
    let slug = slugify(title);

    let taken = store
        .find(
            collection,
            &Filter::new().regex("machineName", format!("^{slug}[0-9]*$")),
            &Default::default(),
        )
        .await?;
    if taken.is_empty() {
        doc["machineName"] = Value::String(slug);
        return Ok(());
    }
    let next = taken
        .iter()
        .filter_map(|d| d.get("machineName").and_then(Value::as_str))
        .filter_map(|name| name.strip_prefix(&slug))
        .map(|suffix| suffix.parse::<u64>().unwrap_or(0))
        .max()
        .unwrap_or(0)
        + 1;
    doc["machineName"] = Value::String(format!("{slug}{next}"));
    Ok(())
}

// ============================================================================
// Shared pieces
// ============================================================================

const PERMISSION_TYPES: &[&str] = &[
    "create_all",
    "read_all",
    "update_all",
    "delete_all",
    "create_own",
    "read_own",
    "update_own",
    "delete_own",
    "read",
    "write",
    "admin",
    "self",
];

/// An access list: `[{type: PermissionName, resources: [RoleRef]}]`.
/// Role references are opaque strings, not document ids: built-in roles
/// like `everyone` never have a stored document behind them.
fn access_field() -> FieldDescriptor {
    let mut entry = IndexMap::new();
    entry.insert(
        "type".to_string(),
        FieldDescriptor::string()
            .required()
            .enumerated(PERMISSION_TYPES.iter().map(|p| json!(p)).collect()),
    );
    entry.insert(
        "resources".to_string(),
        FieldDescriptor::array(FieldDescriptor::string()).default_value(json!([])),
    );
    FieldDescriptor::array(FieldDescriptor::object(entry)).default_value(json!([]))
}

// ============================================================================
// Form
// ============================================================================

struct FormHooks;

#[async_trait]
impl EntityHooks for FormHooks {
    async fn pre_save(&self, doc: &mut Value, store: &dyn DocumentStore) -> Result<()> {
        ensure_machine_name(doc, store, "forms").await
    }
}

pub fn form_schema() -> EntitySchema {
    EntitySchema::builder("form")
        .field("title", FieldDescriptor::string().required())
        .field(
            "name",
            FieldDescriptor::string().required().trim(),
        )
        .field(
            "path",
            FieldDescriptor::string()
                .required()
                .lowercase()
                .trim()
                .unique_index()
                .validator(UniqueRule::new()),
        )
        .field(
            "type",
            FieldDescriptor::string()
                .default_value("form")
                .enumerated(vec![json!("form"), json!("resource")])
                .index(),
        )
        .field("display", FieldDescriptor::string().default_value("form"))
        .field(
            "components",
            FieldDescriptor::array(FieldDescriptor::any()).default_value(json!([])),
        )
        .field("access", access_field())
        .field("submissionAccess", access_field())
        .field("owner", FieldDescriptor::id().index())
        .field("machineName", FieldDescriptor::string().read_only())
        .hooks(FormHooks)
        .build()
}

// ============================================================================
// Submission
// ============================================================================

pub fn submission_schema() -> EntitySchema {
    EntitySchema::builder("submission")
        .field("form", FieldDescriptor::id().required().index())
        .field("owner", FieldDescriptor::id().index())
        .field("data", FieldDescriptor::any().default_value(json!({})))
        .field("metadata", FieldDescriptor::any().default_value(json!({})))
        .field(
            "roles",
            FieldDescriptor::array(FieldDescriptor::id()).default_value(json!([])),
        )
        .field("access", access_field())
        .build()
}

// ============================================================================
// Role
// ============================================================================

struct RoleHooks;

#[async_trait]
impl EntityHooks for RoleHooks {
    async fn pre_save(&self, doc: &mut Value, store: &dyn DocumentStore) -> Result<()> {
        ensure_machine_name(doc, store, "roles").await
    }
}

pub fn role_schema() -> EntitySchema {
    EntitySchema::builder("role")
        .field(
            "title",
            FieldDescriptor::string()
                .required()
                .validator(UniqueRule::new()),
        )
        .field("description", FieldDescriptor::string().default_value(""))
        .field("default", FieldDescriptor::boolean().default_value(false))
        .field("admin", FieldDescriptor::boolean().default_value(false))
        .field("machineName", FieldDescriptor::string().read_only())
        .hooks(RoleHooks)
        .build()
}

// ============================================================================
// Action
// ============================================================================

struct ActionHooks;

#[async_trait]
impl EntityHooks for ActionHooks {
    async fn pre_save(&self, doc: &mut Value, store: &dyn DocumentStore) -> Result<()> {
        ensure_machine_name(doc, store, "actions").await
    }

    /// Action titles are unique per owning form, not globally.
    fn unique_query(&self, doc: &Value) -> Filter {
        match doc.get("form") {
            Some(form) => Filter::new().eq("form", form.clone()),
            None => Filter::new(),
        }
    }
}

pub fn action_schema() -> EntitySchema {
    EntitySchema::builder("action")
        .field("title", FieldDescriptor::string().required())
        .field("name", FieldDescriptor::string().required())
        .field(
            "handler",
            FieldDescriptor::array(
                FieldDescriptor::string()
                    .enumerated(vec![json!("before"), json!("after")]),
            )
            .default_value(json!(["after"])),
        )
        .field(
            "method",
            FieldDescriptor::array(FieldDescriptor::string().enumerated(vec![
                json!("create"),
                json!("update"),
                json!("read"),
                json!("delete"),
                json!("index"),
            ]))
            .default_value(json!(["create"])),
        )
        .field("priority", FieldDescriptor::number().default_value(0))
        .field("condition", FieldDescriptor::any())
        .field("settings", FieldDescriptor::any().default_value(json!({})))
        .field("form", FieldDescriptor::id().required().index())
        .field("machineName", FieldDescriptor::string().read_only())
        .hooks(ActionHooks)
        .build()
}

// ============================================================================
// ActionItem
// ============================================================================

pub fn action_item_schema() -> EntitySchema {
    EntitySchema::builder("actionitem")
        .field("title", FieldDescriptor::string())
        .field("form", FieldDescriptor::id().index())
        .field("submission", FieldDescriptor::id().index())
        .field("action", FieldDescriptor::string().required())
        .field("handler", FieldDescriptor::string())
        .field("method", FieldDescriptor::string())
        .field(
            "state",
            FieldDescriptor::string()
                .default_value("new")
                .enumerated(vec![json!("new"), json!("complete"), json!("error")]),
        )
        .field(
            "messages",
            FieldDescriptor::array(FieldDescriptor::any()).default_value(json!([])),
        )
        .field("data", FieldDescriptor::any())
        .field("context", FieldDescriptor::any())
        .field("attempts", FieldDescriptor::number().default_value(0))
        .build()
}
