//! Structured error types for the engine.
//!
//! # The Error Boundary Rule
//!
//! > **No `anyhow::Error` ever crosses the public API boundary.**
//!
//! - `anyhow` is internal transport (store backends, validators, handlers)
//! - `CoreError` is the externalized taxonomy the host maps to HTTP codes
//!
//! Validation failures carry the *complete* path→message map so one round
//! trip surfaces every problem. Authorization failures carry no detail
//! beyond denial. Action handler failures never appear here at all: they are
//! logged to the ActionItem and swallowed (fire-and-log, not fire-and-fail).

use std::collections::BTreeMap;

use thiserror::Error;

/// A map from field path (dot-separated, e.g. `data.email`) to error message.
///
/// Ordered by path so output is deterministic. The whole map is collected
/// before a save is rejected; the engine never short-circuits on the first
/// violating field.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FieldErrors(BTreeMap<String, String>);

impl FieldErrors {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an error for a path. The first message for a path wins;
    /// later validators for the same leaf do not overwrite it.
    pub fn insert(&mut self, path: impl Into<String>, message: impl Into<String>) {
        self.0.entry(path.into()).or_insert_with(|| message.into());
    }

    pub fn get(&self, path: &str) -> Option<&str> {
        self.0.get(path).map(String::as_str)
    }

    pub fn contains(&self, path: &str) -> bool {
        self.0.contains_key(path)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Merge another error map in, keeping existing entries on collision.
    pub fn merge(&mut self, other: FieldErrors) {
        for (path, message) in other.0 {
            self.0.entry(path).or_insert(message);
        }
    }
}

impl IntoIterator for FieldErrors {
    type Item = (String, String);
    type IntoIter = std::collections::btree_map::IntoIter<String, String>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

/// The externalized error taxonomy.
#[derive(Error, Debug)]
pub enum CoreError {
    /// One or more field constraints were violated. User-fixable; the map
    /// holds every violation found in the document.
    #[error("validation failed on {} field(s)", .0.len())]
    Validation(FieldErrors),

    /// The requester is not permitted to perform the operation. Carries no
    /// further detail by design.
    #[error("unauthorized")]
    Unauthorized,

    /// Read/update/delete of an id that does not exist.
    #[error("resource not found")]
    NotFound,

    /// Optimistic-concurrency or mutual-exclusion conflict.
    #[error("conflict: {0}")]
    Conflict(String),

    /// The request itself is malformed (bad id, missing body, unknown path).
    #[error("bad request: {0}")]
    BadRequest(String),

    /// The storage backend or another internal collaborator failed.
    #[error("store error: {0}")]
    Store(#[from] anyhow::Error),
}

impl CoreError {
    /// HTTP status code the host should respond with.
    pub fn status(&self) -> u16 {
        match self {
            CoreError::Validation(_) | CoreError::BadRequest(_) => 400,
            CoreError::Unauthorized => 401,
            CoreError::NotFound => 404,
            CoreError::Conflict(_) => 409,
            CoreError::Store(_) => 500,
        }
    }
}

/// Convenience alias used throughout the crate.
pub type CoreResult<T> = Result<T, CoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_message_per_path_wins() {
        let mut errors = FieldErrors::new();
        errors.insert("email", "is required");
        errors.insert("email", "must be unique");
        assert_eq!(errors.get("email"), Some("is required"));
        assert_eq!(errors.len(), 1);
    }

    #[test]
    fn status_codes_follow_the_taxonomy() {
        let mut errors = FieldErrors::new();
        errors.insert("a", "bad");
        assert_eq!(CoreError::Validation(errors).status(), 400);
        assert_eq!(CoreError::Unauthorized.status(), 401);
        assert_eq!(CoreError::NotFound.status(), 404);
        assert_eq!(CoreError::Conflict("stale".into()).status(), 409);
        assert_eq!(
            CoreError::Store(anyhow::anyhow!("backend down")).status(),
            500
        );
    }
}
