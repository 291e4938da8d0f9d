//! Request context: what the transport layer hands the engine.
//!
//! The host router authenticates the caller, then builds a
//! [`RequestContext`] carrying the HTTP method, path segments, query
//! parameters, the optional [`Principal`], and whether the pre-shared admin
//! credential was presented. The engine loads path entities into the
//! context, normalizes the method, and drives authorization and actions
//! from it.

use std::collections::HashMap;

use serde_json::Value;

use crate::id::DocumentId;
use crate::store::{Condition, Filter, FindOptions, SortOrder};

/// Resource types in micro→macro order. The first of these present in the
/// loaded context is the request's *primary entity* for authorization.
pub const RESOURCE_TYPES: &[&str] = &["submission", "form", "role", "action"];

/// Inbound HTTP verb, before normalization.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpMethod {
    Get,
    Post,
    Put,
    Patch,
    Delete,
}

/// The engine's five operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResourceMethod {
    Create,
    Read,
    Update,
    Delete,
    Index,
}

impl ResourceMethod {
    pub fn name(self) -> &'static str {
        match self {
            ResourceMethod::Create => "create",
            ResourceMethod::Read => "read",
            ResourceMethod::Update => "update",
            ResourceMethod::Delete => "delete",
            ResourceMethod::Index => "index",
        }
    }
}

/// An authenticated requester: an id plus the role ids it holds explicitly.
#[derive(Debug, Clone)]
pub struct Principal {
    pub id: DocumentId,
    pub roles: Vec<String>,
}

impl Principal {
    pub fn new(id: DocumentId, roles: Vec<String>) -> Self {
        Self { id, roles }
    }
}

/// Everything the engine knows about one inbound request.
#[derive(Debug, Clone)]
pub struct RequestContext {
    pub http_method: HttpMethod,
    pub path: Vec<String>,
    /// Resource type → loaded document, populated from the path.
    pub entities: HashMap<String, Value>,
    pub principal: Option<Principal>,
    /// The pre-shared admin credential was presented.
    pub is_admin: bool,
    pub query: HashMap<String, String>,
}

impl RequestContext {
    pub fn new(http_method: HttpMethod, path: &str) -> Self {
        Self {
            http_method,
            path: path
                .split('/')
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect(),
            entities: HashMap::new(),
            principal: None,
            is_admin: false,
            query: HashMap::new(),
        }
    }

    pub fn with_principal(mut self, principal: Principal) -> Self {
        self.principal = Some(principal);
        self
    }

    pub fn with_admin(mut self) -> Self {
        self.is_admin = true;
        self
    }

    pub fn with_query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.insert(key.into(), value.into());
        self
    }

    /// Attach a loaded entity for a resource type in the path.
    pub fn load(&mut self, resource_type: impl Into<String>, doc: Value) {
        self.entities.insert(resource_type.into(), doc);
    }

    /// Map the HTTP verb to an engine operation.
    ///
    /// A GET whose final path segment names a resource type is an `index`,
    /// not a `read`. Known limitation carried over from the source system:
    /// a GET of an id that textually equals a resource-type name is
    /// misclassified as `index`. Ids here are UUID strings, so the collision
    /// cannot occur in practice.
    pub fn normalized_method(&self) -> ResourceMethod {
        match self.http_method {
            HttpMethod::Post => ResourceMethod::Create,
            HttpMethod::Put | HttpMethod::Patch => ResourceMethod::Update,
            HttpMethod::Delete => ResourceMethod::Delete,
            HttpMethod::Get => {
                let last = self.path.last().map(String::as_str).unwrap_or("");
                if last.is_empty() || RESOURCE_TYPES.contains(&last) {
                    ResourceMethod::Index
                } else {
                    ResourceMethod::Read
                }
            }
        }
    }

    /// The most specific loaded entity, scanned micro→macro. `None` means
    /// the request targets a collection root.
    pub fn primary_entity(&self) -> Option<(&str, &Value)> {
        RESOURCE_TYPES
            .iter()
            .find_map(|t| self.entities.get(*t).map(|doc| (*t, doc)))
    }

    /// The resource type this request targets: the last path segment that
    /// names a resource type.
    pub fn target_resource(&self) -> Option<&str> {
        self.path
            .iter()
            .rev()
            .map(String::as_str)
            .find(|segment| RESOURCE_TYPES.contains(segment))
    }

    /// The id segment for the targeted resource, when the path carries one
    /// (`/form/:id`, `/form/:formId/submission/:id`, ...).
    pub fn target_id(&self) -> Option<&str> {
        let target = self.target_resource()?;
        let position = self.path.iter().rposition(|s| s == target)?;
        self.path
            .get(position + 1)
            .map(String::as_str)
            .filter(|s| !RESOURCE_TYPES.contains(s))
    }

    /// Parse `field__operator=value` query keys plus `sort`/`skip`/`limit`
    /// into a store filter and find options.
    pub fn query_filter(&self) -> (Filter, FindOptions) {
        let mut filter = Filter::new();
        let mut options = FindOptions::new();
        for (key, raw) in &self.query {
            match key.as_str() {
                "sort" => {
                    for field in raw.split(',').map(str::trim).filter(|s| !s.is_empty()) {
                        match field.strip_prefix('-') {
                            Some(name) => {
                                options = options.sort(name, SortOrder::Descending);
                            }
                            None => {
                                options = options.sort(field, SortOrder::Ascending);
                            }
                        }
                    }
                }
                "skip" => {
                    if let Ok(skip) = raw.parse() {
                        options = options.skip(skip);
                    }
                }
                "limit" => {
                    if let Ok(limit) = raw.parse() {
                        options = options.limit(limit);
                    }
                }
                "select" => {
                    options = options.project(
                        raw.split(',')
                            .map(str::trim)
                            .filter(|s| !s.is_empty())
                            .map(str::to_string)
                            .collect(),
                    );
                }
                _ => {
                    let (path, condition) = parse_query_condition(key, raw);
                    filter.push(path, condition);
                }
            }
        }
        (filter, options)
    }
}

fn parse_query_condition(key: &str, raw: &str) -> (String, Condition) {
    match key.rsplit_once("__") {
        Some((path, "ne")) => (path.to_string(), Condition::Ne(query_value(raw))),
        Some((path, "in")) => (
            path.to_string(),
            Condition::In(raw.split(',').map(query_value).collect()),
        ),
        Some((path, "nin")) => (
            path.to_string(),
            Condition::NotIn(raw.split(',').map(query_value).collect()),
        ),
        Some((path, "exists")) => (
            path.to_string(),
            Condition::Exists(matches!(raw, "true" | "1")),
        ),
        Some((path, "regex")) => (
            path.to_string(),
            Condition::Regex {
                pattern: raw.to_string(),
                case_insensitive: true,
            },
        ),
        _ => (key.to_string(), Condition::Eq(query_value(raw))),
    }
}

/// Query values arrive as strings; recognize numbers and booleans so that
/// `priority=10` matches a numeric field.
fn query_value(raw: &str) -> Value {
    if let Ok(n) = raw.parse::<i64>() {
        return Value::from(n);
    }
    match raw {
        "true" => Value::Bool(true),
        "false" => Value::Bool(false),
        _ => Value::String(raw.to_string()),
    }
}
