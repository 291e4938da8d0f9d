//! In-memory document store.
//!
//! Honors the full [`DocumentStore`] contract against DashMap-backed
//! collections. Suitable for tests and single-instance deployments; it is
//! the reference implementation of the filter semantics.

use std::cmp::Ordering;
use std::collections::BTreeMap;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use dashmap::DashMap;
use serde_json::Value;
use tracing::debug;

use super::{DocumentStore, Filter, FindOptions, SortOrder};
use crate::id::DocumentId;
use crate::path;

/// DashMap-backed store. Documents are keyed by their `_id` string; the
/// inner `BTreeMap` preserves insertion-by-id ordering, which is stable for
/// the random ids this store mints.
#[derive(Debug, Default)]
pub struct MemoryStore {
    collections: DashMap<String, BTreeMap<String, Value>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn select(&self, collection: &str, filter: &Filter) -> Vec<Value> {
        match self.collections.get(collection) {
            Some(docs) => docs
                .values()
                .filter(|doc| filter.matches(doc))
                .cloned()
                .collect(),
            None => Vec::new(),
        }
    }
}

/// Total order over JSON values for sorting: null < bool < number < string,
/// anything else compares equal.
fn compare_values(a: &Value, b: &Value) -> Ordering {
    fn rank(v: &Value) -> u8 {
        match v {
            Value::Null => 0,
            Value::Bool(_) => 1,
            Value::Number(_) => 2,
            Value::String(_) => 3,
            Value::Array(_) => 4,
            Value::Object(_) => 5,
        }
    }
    match (a, b) {
        (Value::Bool(x), Value::Bool(y)) => x.cmp(y),
        (Value::Number(x), Value::Number(y)) => x
            .as_f64()
            .partial_cmp(&y.as_f64())
            .unwrap_or(Ordering::Equal),
        (Value::String(x), Value::String(y)) => x.cmp(y),
        _ => rank(a).cmp(&rank(b)),
    }
}

fn apply_options(mut docs: Vec<Value>, options: &FindOptions) -> Vec<Value> {
    for (path, order) in options.sort.iter().rev() {
        docs.sort_by(|a, b| {
            let left = path::get(a, path).unwrap_or(&Value::Null);
            let right = path::get(b, path).unwrap_or(&Value::Null);
            let ordering = compare_values(left, right);
            match order {
                SortOrder::Ascending => ordering,
                SortOrder::Descending => ordering.reverse(),
            }
        });
    }
    let skip = options.skip.unwrap_or(0);
    let mut docs: Vec<Value> = docs.into_iter().skip(skip).collect();
    if let Some(limit) = options.limit {
        docs.truncate(limit);
    }
    if !options.projection.is_empty() {
        for doc in &mut docs {
            if let Value::Object(map) = doc {
                map.retain(|key, _| key == "_id" || options.projection.iter().any(|f| f == key));
            }
        }
    }
    docs
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn find(
        &self,
        collection: &str,
        filter: &Filter,
        options: &FindOptions,
    ) -> Result<Vec<Value>> {
        let docs = self.select(collection, filter);
        debug!(collection, matched = docs.len(), "memory store find");
        Ok(apply_options(docs, options))
    }

    async fn find_one(&self, collection: &str, filter: &Filter) -> Result<Option<Value>> {
        Ok(self.select(collection, filter).into_iter().next())
    }

    async fn count(&self, collection: &str, filter: &Filter) -> Result<u64> {
        Ok(self.select(collection, filter).len() as u64)
    }

    async fn create(&self, collection: &str, mut doc: Value) -> Result<Value> {
        let map = doc
            .as_object_mut()
            .ok_or_else(|| anyhow!("documents must be JSON objects"))?;
        let id = match map.get("_id").and_then(Value::as_str) {
            Some(id) => id.to_string(),
            None => {
                let id = DocumentId::new().to_string();
                map.insert("_id".into(), Value::String(id.clone()));
                id
            }
        };
        self.collections
            .entry(collection.to_string())
            .or_default()
            .insert(id, doc.clone());
        Ok(doc)
    }

    async fn read(&self, collection: &str, filter: &Filter) -> Result<Option<Value>> {
        self.find_one(collection, filter).await
    }

    async fn update(&self, collection: &str, doc: Value) -> Result<Value> {
        let id = doc
            .get("_id")
            .and_then(Value::as_str)
            .ok_or_else(|| anyhow!("update requires an _id"))?
            .to_string();
        let mut docs = self
            .collections
            .entry(collection.to_string())
            .or_default();
        if !docs.contains_key(&id) {
            return Err(anyhow!("no document with id {id} in {collection}"));
        }
        docs.insert(id, doc.clone());
        Ok(doc)
    }

    async fn delete(&self, collection: &str, filter: &Filter) -> Result<Option<Value>> {
        let Some(mut docs) = self.collections.get_mut(collection) else {
            return Ok(None);
        };
        let id = docs
            .iter()
            .find(|(_, doc)| filter.matches(doc))
            .map(|(id, _)| id.clone());
        Ok(id.and_then(|id| docs.remove(&id)))
    }

    fn to_id(&self, value: &str) -> Result<DocumentId> {
        value
            .parse()
            .map_err(|_| anyhow!("'{value}' is not a valid document id"))
    }

    async fn ensure_collection(&self, collection: &str) -> Result<()> {
        self.collections.entry(collection.to_string()).or_default();
        Ok(())
    }

    async fn create_index(&self, _collection: &str, _path: &str, _unique: bool) -> Result<()> {
        // Indexes are a no-op in memory; uniqueness is enforced by the
        // validation engine's unique rule.
        Ok(())
    }
}
