//! The document-store contract.
//!
//! The engine never talks to a storage engine directly; every round trip
//! goes through [`DocumentStore`]. Filters are structured predicates rather
//! than backend query strings, so an implementation can translate them to
//! its own query language. The crate ships [`MemoryStore`], a full-contract
//! in-memory implementation used by tests and single-instance deployments.

mod memory;

pub use memory::MemoryStore;

use anyhow::Result;
use async_trait::async_trait;
use serde_json::Value;

use crate::id::DocumentId;
use crate::path;

// ============================================================================
// Filters
// ============================================================================

/// A single per-path condition.
#[derive(Debug, Clone, PartialEq)]
pub enum Condition {
    /// Equality. Against an array field this matches when any element is
    /// equal, mirroring document-store semantics.
    Eq(Value),
    /// Inequality.
    Ne(Value),
    /// Membership in a value set.
    In(Vec<Value>),
    /// Absence from a value set.
    NotIn(Vec<Value>),
    /// Regular-expression match on string values.
    Regex {
        pattern: String,
        case_insensitive: bool,
    },
    /// Whether the path is present at all.
    Exists(bool),
}

/// A structured query predicate: a conjunction of per-path conditions plus
/// optional `$or` groups (each group is satisfied by any one branch).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Filter {
    clauses: Vec<(String, Condition)>,
    or_groups: Vec<Vec<Filter>>,
}

impl Filter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a raw condition.
    pub fn push(&mut self, path: impl Into<String>, condition: Condition) {
        self.clauses.push((path.into(), condition));
    }

    pub fn eq(mut self, path: impl Into<String>, value: impl Into<Value>) -> Self {
        self.clauses.push((path.into(), Condition::Eq(value.into())));
        self
    }

    pub fn ne(mut self, path: impl Into<String>, value: impl Into<Value>) -> Self {
        self.clauses.push((path.into(), Condition::Ne(value.into())));
        self
    }

    pub fn is_in(mut self, path: impl Into<String>, values: Vec<Value>) -> Self {
        self.clauses.push((path.into(), Condition::In(values)));
        self
    }

    pub fn not_in(mut self, path: impl Into<String>, values: Vec<Value>) -> Self {
        self.clauses.push((path.into(), Condition::NotIn(values)));
        self
    }

    pub fn regex(mut self, path: impl Into<String>, pattern: impl Into<String>) -> Self {
        self.clauses.push((
            path.into(),
            Condition::Regex {
                pattern: pattern.into(),
                case_insensitive: false,
            },
        ));
        self
    }

    pub fn regex_ci(mut self, path: impl Into<String>, pattern: impl Into<String>) -> Self {
        self.clauses.push((
            path.into(),
            Condition::Regex {
                pattern: pattern.into(),
                case_insensitive: true,
            },
        ));
        self
    }

    pub fn exists(mut self, path: impl Into<String>, present: bool) -> Self {
        self.clauses
            .push((path.into(), Condition::Exists(present)));
        self
    }

    /// Add an `$or` group: the filter matches only if at least one branch does.
    pub fn any_of(mut self, branches: Vec<Filter>) -> Self {
        self.or_groups.push(branches);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.clauses.is_empty() && self.or_groups.is_empty()
    }

    /// Evaluate the predicate against a document. This is the reference
    /// semantics every store implementation must reproduce.
    pub fn matches(&self, doc: &Value) -> bool {
        for (path, condition) in &self.clauses {
            if !condition_matches(condition, doc, path) {
                return false;
            }
        }
        for group in &self.or_groups {
            if !group.iter().any(|branch| branch.matches(doc)) {
                return false;
            }
        }
        true
    }
}

fn condition_matches(condition: &Condition, doc: &Value, path: &str) -> bool {
    let found = path::candidates(doc, path);

    // Flatten terminal arrays so equality against an array field matches
    // any element, as document stores do.
    let mut values: Vec<&Value> = Vec::new();
    for value in &found {
        match value {
            Value::Array(items) => values.extend(items.iter()),
            other => values.push(other),
        }
    }

    match condition {
        Condition::Eq(expected) => values.iter().any(|v| *v == expected),
        Condition::Ne(expected) => !values.iter().any(|v| *v == expected),
        Condition::In(set) => values.iter().any(|v| set.contains(v)),
        Condition::NotIn(set) => !values.iter().any(|v| set.contains(v)),
        Condition::Regex {
            pattern,
            case_insensitive,
        } => {
            let pattern = if *case_insensitive {
                format!("(?i){pattern}")
            } else {
                pattern.clone()
            };
            match regex::Regex::new(&pattern) {
                Ok(re) => values
                    .iter()
                    .any(|v| v.as_str().is_some_and(|s| re.is_match(s))),
                Err(_) => false,
            }
        }
        Condition::Exists(present) => found.is_empty() != *present,
    }
}

// ============================================================================
// Find options
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortOrder {
    Ascending,
    Descending,
}

/// Sort, pagination, and projection options carried alongside a filter.
#[derive(Debug, Clone, Default)]
pub struct FindOptions {
    pub sort: Vec<(String, SortOrder)>,
    pub limit: Option<usize>,
    pub skip: Option<usize>,
    /// When non-empty, only these top-level fields (plus `_id`) are returned.
    pub projection: Vec<String>,
}

impl FindOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sort(mut self, path: impl Into<String>, order: SortOrder) -> Self {
        self.sort.push((path.into(), order));
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn skip(mut self, skip: usize) -> Self {
        self.skip = Some(skip);
        self
    }

    pub fn project(mut self, fields: Vec<String>) -> Self {
        self.projection = fields;
        self
    }
}

// ============================================================================
// Store contract
// ============================================================================

/// The narrow contract the engine requires from a storage engine.
///
/// Documents are JSON objects keyed by a string `_id`. Backend failures are
/// `anyhow::Error`s; the model layer maps them to `CoreError::Store` at the
/// public boundary.
#[async_trait]
pub trait DocumentStore: Send + Sync + 'static {
    /// Find all documents matching the filter, honoring sort/skip/limit.
    async fn find(
        &self,
        collection: &str,
        filter: &Filter,
        options: &FindOptions,
    ) -> Result<Vec<Value>>;

    /// First document matching the filter, if any.
    async fn find_one(&self, collection: &str, filter: &Filter) -> Result<Option<Value>>;

    /// Number of documents matching the filter.
    async fn count(&self, collection: &str, filter: &Filter) -> Result<u64>;

    /// Insert a document, assigning `_id` when absent. Returns the stored doc.
    async fn create(&self, collection: &str, doc: Value) -> Result<Value>;

    /// Read a single document by filter.
    async fn read(&self, collection: &str, filter: &Filter) -> Result<Option<Value>>;

    /// Replace the document whose `_id` matches `doc["_id"]`.
    async fn update(&self, collection: &str, doc: Value) -> Result<Value>;

    /// Delete the first document matching the filter, returning it.
    async fn delete(&self, collection: &str, filter: &Filter) -> Result<Option<Value>>;

    /// Parse a string into a store identifier, failing if it is not valid.
    fn to_id(&self, value: &str) -> Result<DocumentId>;

    /// Create the collection if it does not already exist.
    async fn ensure_collection(&self, collection: &str) -> Result<()>;

    /// Create an index on a path; `unique` requests a uniqueness constraint.
    async fn create_index(&self, collection: &str, path: &str, unique: bool) -> Result<()>;
}
