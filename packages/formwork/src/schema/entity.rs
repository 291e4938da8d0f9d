//! Entity schemas: a named, ordered mapping of field paths to descriptors
//! plus a handful of per-entity hooks.
//!
//! Schemas are defined at process start, built through
//! [`EntitySchemaBuilder`], and held immutable in `Arc`s thereafter.

use anyhow::Result;
use async_trait::async_trait;
use indexmap::IndexMap;
use serde_json::Value;

use super::descriptor::FieldDescriptor;
use crate::store::{DocumentStore, Filter};

/// Per-entity lifecycle hooks.
///
/// `pre_save` runs after validation and before first persistence (machine
/// name generation lives here). `unique_query` scopes uniqueness validators
/// (e.g. action names unique per form, not globally). `post_load` shapes a
/// document after every read.
#[async_trait]
pub trait EntityHooks: Send + Sync {
    async fn pre_save(&self, _doc: &mut Value, _store: &dyn DocumentStore) -> Result<()> {
        Ok(())
    }

    fn unique_query(&self, _doc: &Value) -> Filter {
        Filter::new()
    }

    async fn post_load(&self, _doc: &mut Value) -> Result<()> {
        Ok(())
    }
}

/// The default no-op hook set.
pub struct NoHooks;

impl EntityHooks for NoHooks {}

/// A declarative schema for one entity type.
pub struct EntitySchema {
    pub name: String,
    pub collection: String,
    /// Ordered: coercion and validation walk fields in declaration order.
    pub fields: IndexMap<String, FieldDescriptor>,
    pub hooks: Box<dyn EntityHooks>,
}

impl EntitySchema {
    pub fn builder(name: impl Into<String>) -> EntitySchemaBuilder {
        EntitySchemaBuilder::new(name)
    }

    /// Paths that requested an index, paired with their uniqueness flag.
    pub fn indexed_paths(&self) -> Vec<(&str, bool)> {
        self.fields
            .iter()
            .filter(|(_, desc)| desc.index)
            .map(|(name, desc)| (name.as_str(), desc.unique_index))
            .collect()
    }
}

pub struct EntitySchemaBuilder {
    name: String,
    collection: Option<String>,
    fields: IndexMap<String, FieldDescriptor>,
    hooks: Box<dyn EntityHooks>,
}

impl EntitySchemaBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            collection: None,
            fields: IndexMap::new(),
            hooks: Box::new(NoHooks),
        }
    }

    pub fn collection(mut self, collection: impl Into<String>) -> Self {
        self.collection = Some(collection.into());
        self
    }

    pub fn field(mut self, name: impl Into<String>, descriptor: FieldDescriptor) -> Self {
        self.fields.insert(name.into(), descriptor);
        self
    }

    pub fn hooks(mut self, hooks: impl EntityHooks + 'static) -> Self {
        self.hooks = Box::new(hooks);
        self
    }

    pub fn build(self) -> EntitySchema {
        let collection = self
            .collection
            .unwrap_or_else(|| format!("{}s", self.name));
        EntitySchema {
            name: self.name,
            collection,
            fields: self.fields,
            hooks: self.hooks,
        }
    }
}
