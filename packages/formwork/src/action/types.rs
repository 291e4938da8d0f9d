//! Action configuration and execution-record types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::request::ResourceMethod;

// ============================================================================
// Handler phase
// ============================================================================

/// When a handler runs relative to the core CRUD operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HandlerPhase {
    Before,
    After,
}

impl HandlerPhase {
    pub fn name(self) -> &'static str {
        match self {
            HandlerPhase::Before => "before",
            HandlerPhase::After => "after",
        }
    }
}

// ============================================================================
// Conditions
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConditionOp {
    #[serde(rename = "equals")]
    Equals,
    #[serde(rename = "notEqual")]
    NotEqual,
}

/// A configured execution condition: either a field/operator/value triple
/// (the default, always-available form) or an opaque script (opt-in,
/// evaluated under a hard budget).
#[derive(Debug, Clone, PartialEq)]
pub enum ActionCondition {
    Field {
        field: String,
        op: Option<ConditionOp>,
        value: String,
    },
    Script(String),
}

impl ActionCondition {
    /// Parse the stored condition value. Returns `None` when no condition
    /// is configured (empty object, null, or all-blank triple).
    pub fn from_value(value: Option<&Value>) -> Option<Self> {
        let value = value?;
        if let Some(custom) = value.get("custom").and_then(Value::as_str) {
            if !custom.trim().is_empty() {
                return Some(ActionCondition::Script(custom.to_string()));
            }
        }
        let field = value.get("field").and_then(Value::as_str).unwrap_or("");
        if field.is_empty() {
            return None;
        }
        let op = value
            .get("eq")
            .cloned()
            .and_then(|v| serde_json::from_value(v).ok());
        let expected = value
            .get("value")
            .map(super::condition::coerce_string)
            .unwrap_or_default();
        Some(ActionCondition::Field {
            field: field.to_string(),
            op,
            value: expected,
        })
    }
}

// ============================================================================
// Action
// ============================================================================

/// One configured action on a form.
#[derive(Debug, Clone)]
pub struct Action {
    pub id: String,
    pub title: String,
    /// Registry key of the handler implementation.
    pub name: String,
    pub handler: Vec<HandlerPhase>,
    pub method: Vec<ResourceMethod>,
    /// Execution order, descending.
    pub priority: i64,
    pub condition: Option<ActionCondition>,
    pub settings: Value,
    pub form: String,
}

impl Action {
    /// Parse a stored action document, tolerating absent optional fields.
    /// Returns `None` when the document lacks the essentials (name, form).
    pub fn from_doc(doc: &Value) -> Option<Self> {
        let name = doc.get("name")?.as_str()?.to_string();
        let form = doc.get("form")?.as_str()?.to_string();
        let phases = doc
            .get("handler")
            .cloned()
            .and_then(|v| serde_json::from_value(v).ok())
            .unwrap_or_else(|| vec![HandlerPhase::After]);
        let methods = doc
            .get("method")
            .cloned()
            .and_then(|v| serde_json::from_value(v).ok())
            .unwrap_or_else(|| vec![ResourceMethod::Create]);
        Some(Self {
            id: doc
                .get("_id")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
            title: doc
                .get("title")
                .and_then(Value::as_str)
                .unwrap_or(&name)
                .to_string(),
            name,
            handler: phases,
            method: methods,
            priority: doc.get("priority").and_then(Value::as_i64).unwrap_or(0),
            condition: ActionCondition::from_value(doc.get("condition")),
            settings: doc.get("settings").cloned().unwrap_or_else(|| json!({})),
            form,
        })
    }

    pub fn matches(&self, phase: HandlerPhase, method: ResourceMethod) -> bool {
        self.handler.contains(&phase) && self.method.contains(&method)
    }
}

// ============================================================================
// ActionItem
// ============================================================================

/// Terminal states are `complete` and `error`; an item is never mutated
/// after reaching one except by a fresh orchestration call bumping
/// `attempts`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActionState {
    New,
    Complete,
    Error,
}

/// One ordered, append-only log entry on an ActionItem.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionMessage {
    pub datetime: DateTime<Utc>,
    pub info: String,
    #[serde(default)]
    pub data: Value,
}

/// The durable execution record of one triggered action.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionItem {
    #[serde(rename = "_id", default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub title: String,
    pub form: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub submission: Option<String>,
    /// The configured action's title.
    pub action: String,
    /// The handler registry key.
    pub handler: String,
    pub method: ResourceMethod,
    pub state: ActionState,
    pub messages: Vec<ActionMessage>,
    /// Snapshot of the triggering submission's data at execution time.
    #[serde(default)]
    pub data: Value,
    /// Trigger facts (phase, method) for the audit trail.
    #[serde(default)]
    pub context: Value,
    pub attempts: u32,
}

impl ActionItem {
    pub fn new(action: &Action, method: ResourceMethod, submission: Option<String>) -> Self {
        Self {
            id: None,
            title: action.title.clone(),
            form: action.form.clone(),
            submission,
            action: action.title.clone(),
            handler: action.name.clone(),
            method,
            state: ActionState::New,
            messages: Vec::new(),
            data: Value::Null,
            context: Value::Null,
            attempts: 0,
        }
    }

    /// Append a log entry. Messages are ordered by invocation and never
    /// removed.
    pub fn log(&mut self, info: impl Into<String>, data: Value) {
        self.messages.push(ActionMessage {
            datetime: Utc::now(),
            info: info.into(),
            data,
        });
    }

    pub fn to_value(&self) -> Value {
        serde_json::to_value(self).unwrap_or_else(|_| json!({}))
    }

    pub fn from_value(value: &Value) -> Option<Self> {
        serde_json::from_value(value.clone()).ok()
    }
}
