//! Field descriptors: the atomic schema unit.
//!
//! A descriptor is data plus two closure-valued hooks (`default`, `set`) and
//! an ordered list of validator strategies. The type is a tagged union over
//! scalars, nested objects, homogeneous arrays, and a pass-through `Any`
//! used for opaque subtrees like submission data and action settings.

use std::fmt;
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use indexmap::IndexMap;
use serde_json::Value;

use crate::id::DocumentId;
use crate::store::{DocumentStore, Filter};

// ============================================================================
// Types
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScalarType {
    String,
    Number,
    Boolean,
    Date,
    Id,
}

impl ScalarType {
    pub fn name(self) -> &'static str {
        match self {
            ScalarType::String => "string",
            ScalarType::Number => "number",
            ScalarType::Boolean => "boolean",
            ScalarType::Date => "date",
            ScalarType::Id => "id",
        }
    }
}

/// The declared shape of one schema path.
#[derive(Clone)]
pub enum FieldType {
    Scalar(ScalarType),
    /// A nested map of descriptors, recursed per key.
    Object(IndexMap<String, FieldDescriptor>),
    /// A homogeneous list; every element is coerced with the same descriptor.
    Array(Box<FieldDescriptor>),
    /// No coercion or descent; the value is carried as-is.
    Any,
}

/// Default for a path: a literal, or a zero-arg closure evaluated at set time.
#[derive(Clone)]
pub enum DefaultValue {
    Literal(Value),
    Computed(Arc<dyn Fn() -> Value + Send + Sync>),
}

impl DefaultValue {
    pub fn resolve(&self) -> Value {
        match self {
            DefaultValue::Literal(value) => value.clone(),
            DefaultValue::Computed(f) => f(),
        }
    }
}

impl fmt::Debug for DefaultValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DefaultValue::Literal(value) => write!(f, "Literal({value})"),
            DefaultValue::Computed(_) => write!(f, "Computed(..)"),
        }
    }
}

/// Custom setter applied after default resolution, before coercion.
pub type SetterFn = Arc<dyn Fn(Value) -> Value + Send + Sync>;

// ============================================================================
// Validator strategy
// ============================================================================

/// Per-leaf evaluation context handed to validators. Carries everything a
/// rule needs for I/O: the store, the entity's collection, the uniqueness
/// scope from `EntityHooks::unique_query`, and the own id to exclude on
/// update.
pub struct ValidatorContext<'a> {
    pub store: &'a dyn DocumentStore,
    pub collection: &'a str,
    pub scope: &'a Filter,
    pub exclude_id: Option<&'a DocumentId>,
    pub path: &'a str,
}

/// A validation rule for one leaf.
///
/// Synchronous rules and asynchronous rules are distinct implementations of
/// this one interface: [`SyncRule`] wraps a plain closure, [`UniqueRule`]
/// does store I/O. Rules run in declaration order; `Ok(false)` records the
/// rule's message as a field error, `Err` surfaces as a field error with the
/// underlying cause (the rule owns its own I/O timeout).
#[async_trait]
pub trait Validator: Send + Sync {
    /// Message recorded when the rule judges the value invalid.
    fn message(&self) -> &str;

    /// Judge the coerced value. `doc` is the whole coerced document, so
    /// rules may reference sibling values.
    async fn check(&self, value: &Value, doc: &Value, cx: &ValidatorContext<'_>) -> Result<bool>;
}

/// Synchronous boolean rule over `(value, doc)`.
pub struct SyncRule {
    message: String,
    rule: Arc<dyn Fn(&Value, &Value) -> bool + Send + Sync>,
}

impl SyncRule {
    pub fn new(
        message: impl Into<String>,
        rule: impl Fn(&Value, &Value) -> bool + Send + Sync + 'static,
    ) -> Self {
        Self {
            message: message.into(),
            rule: Arc::new(rule),
        }
    }
}

#[async_trait]
impl Validator for SyncRule {
    fn message(&self) -> &str {
        &self.message
    }

    async fn check(&self, value: &Value, doc: &Value, _cx: &ValidatorContext<'_>) -> Result<bool> {
        Ok((self.rule)(value, doc))
    }
}

/// Uniqueness rule: no *other* document in the scope may hold this value at
/// this path. The own id is excluded on update.
pub struct UniqueRule {
    message: String,
}

impl UniqueRule {
    pub fn new() -> Self {
        Self {
            message: "must be unique".to_string(),
        }
    }
}

impl Default for UniqueRule {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Validator for UniqueRule {
    fn message(&self) -> &str {
        &self.message
    }

    async fn check(&self, value: &Value, _doc: &Value, cx: &ValidatorContext<'_>) -> Result<bool> {
        if value.is_null() {
            return Ok(true);
        }
        let mut filter = cx.scope.clone().eq(cx.path, value.clone());
        if let Some(id) = cx.exclude_id {
            filter = filter.not_in("_id", vec![Value::String(id.to_string())]);
        }
        let existing = cx.store.count(cx.collection, &filter).await?;
        Ok(existing == 0)
    }
}

// ============================================================================
// Field descriptor
// ============================================================================

/// The declarative rule set governing one schema path.
#[derive(Clone)]
pub struct FieldDescriptor {
    pub field_type: FieldType,
    pub required: bool,
    pub default: Option<DefaultValue>,
    /// On update, the submitted value is discarded and the prior document's
    /// value at this path is retained.
    pub read_only: bool,
    pub lowercase: bool,
    pub trim: bool,
    /// Closed value set checked after coercion.
    pub enum_values: Option<Vec<Value>>,
    pub index: bool,
    pub unique_index: bool,
    /// Suppress coercion failure as a hard error; the value is dropped.
    pub loose_type: bool,
    pub set: Option<SetterFn>,
    pub validators: Vec<Arc<dyn Validator>>,
}

impl FieldDescriptor {
    fn with_type(field_type: FieldType) -> Self {
        Self {
            field_type,
            required: false,
            default: None,
            read_only: false,
            lowercase: false,
            trim: false,
            enum_values: None,
            index: false,
            unique_index: false,
            loose_type: false,
            set: None,
            validators: Vec::new(),
        }
    }

    pub fn string() -> Self {
        Self::with_type(FieldType::Scalar(ScalarType::String))
    }

    pub fn number() -> Self {
        Self::with_type(FieldType::Scalar(ScalarType::Number))
    }

    pub fn boolean() -> Self {
        Self::with_type(FieldType::Scalar(ScalarType::Boolean))
    }

    pub fn date() -> Self {
        Self::with_type(FieldType::Scalar(ScalarType::Date))
    }

    pub fn id() -> Self {
        Self::with_type(FieldType::Scalar(ScalarType::Id))
    }

    pub fn object(fields: IndexMap<String, FieldDescriptor>) -> Self {
        Self::with_type(FieldType::Object(fields))
    }

    pub fn array(element: FieldDescriptor) -> Self {
        Self::with_type(FieldType::Array(Box::new(element)))
    }

    pub fn any() -> Self {
        Self::with_type(FieldType::Any)
    }

    // Chainable configuration, builder style.

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn default_value(mut self, value: impl Into<Value>) -> Self {
        self.default = Some(DefaultValue::Literal(value.into()));
        self
    }

    pub fn computed_default(
        mut self,
        f: impl Fn() -> Value + Send + Sync + 'static,
    ) -> Self {
        self.default = Some(DefaultValue::Computed(Arc::new(f)));
        self
    }

    pub fn read_only(mut self) -> Self {
        self.read_only = true;
        self
    }

    pub fn lowercase(mut self) -> Self {
        self.lowercase = true;
        self
    }

    pub fn trim(mut self) -> Self {
        self.trim = true;
        self
    }

    pub fn enumerated(mut self, values: Vec<Value>) -> Self {
        self.enum_values = Some(values);
        self
    }

    pub fn index(mut self) -> Self {
        self.index = true;
        self
    }

    pub fn unique_index(mut self) -> Self {
        self.index = true;
        self.unique_index = true;
        self
    }

    pub fn loose(mut self) -> Self {
        self.loose_type = true;
        self
    }

    pub fn setter(mut self, f: impl Fn(Value) -> Value + Send + Sync + 'static) -> Self {
        self.set = Some(Arc::new(f));
        self
    }

    pub fn validator(mut self, validator: impl Validator + 'static) -> Self {
        self.validators.push(Arc::new(validator));
        self
    }
}
