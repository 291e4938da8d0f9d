//! Per-entity CRUD orchestration.
//!
//! A `Model` binds one immutable [`EntitySchema`] to the document-store
//! contract. Documents are created and mutated only through it: every write
//! goes through the validation engine, timestamps are owned here, and the
//! entity's `pre_save`/`post_load` hooks run at fixed points.
//!
//! `prepare_*`/`commit_*` split validation from persistence so the request
//! pipeline can run before-actions between the two.

use std::sync::Arc;

use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::Value;
use tracing::debug;

use crate::error::{CoreError, CoreResult};
use crate::schema::EntitySchema;
use crate::store::{DocumentStore, Filter, FindOptions};
use crate::validation::{self, ValidationContext};

pub struct Model {
    schema: Arc<EntitySchema>,
    store: Arc<dyn DocumentStore>,
}

impl Model {
    pub fn new(schema: Arc<EntitySchema>, store: Arc<dyn DocumentStore>) -> Self {
        Self { schema, store }
    }

    pub fn schema(&self) -> &EntitySchema {
        &self.schema
    }

    pub fn collection(&self) -> &str {
        &self.schema.collection
    }

    fn now() -> String {
        Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
    }

    /// Validate and coerce `input` into a document ready for first
    /// persistence: timestamps set, `pre_save` (machine names) applied.
    pub async fn prepare_create(&self, input: &Value) -> CoreResult<Value> {
        let cx = ValidationContext {
            store: self.store.as_ref(),
            collection: &self.schema.collection,
            scope: self.schema.hooks.unique_query(input),
            exclude_id: None,
        };
        let mut doc = validation::apply(&self.schema, input, None, &cx).await?;
        let now = Self::now();
        doc["created"] = Value::String(now.clone());
        doc["modified"] = Value::String(now);
        self.schema
            .hooks
            .pre_save(&mut doc, self.store.as_ref())
            .await?;
        Ok(doc)
    }

    /// Persist a document produced by [`Model::prepare_create`].
    pub async fn commit_create(&self, doc: Value) -> CoreResult<Value> {
        let mut saved = self.store.create(&self.schema.collection, doc).await?;
        self.schema.hooks.post_load(&mut saved).await?;
        debug!(entity = %self.schema.name, id = saved["_id"].as_str(), "created");
        Ok(saved)
    }

    pub async fn create(&self, input: &Value) -> CoreResult<Value> {
        let doc = self.prepare_create(input).await?;
        self.commit_create(doc).await
    }

    pub async fn read(&self, id: &str) -> CoreResult<Value> {
        let id = self
            .store
            .to_id(id)
            .map_err(|e| CoreError::BadRequest(e.to_string()))?;
        let filter = Filter::new().eq("_id", id.to_string());
        let mut doc = self
            .store
            .read(&self.schema.collection, &filter)
            .await?
            .ok_or(CoreError::NotFound)?;
        self.schema.hooks.post_load(&mut doc).await?;
        Ok(doc)
    }

    /// Validate `input` as a full replacement for the stored document.
    ///
    /// A submitted `modified` timestamp older than the stored one is an
    /// optimistic-concurrency conflict.
    pub async fn prepare_update(&self, prior: &Value, input: &Value) -> CoreResult<Value> {
        if let (Some(submitted), Some(stored)) = (
            parse_timestamp(input.get("modified")),
            parse_timestamp(prior.get("modified")),
        ) {
            if submitted < stored {
                return Err(CoreError::Conflict(
                    "document was modified by another request".to_string(),
                ));
            }
        }

        let exclude_id = prior
            .get("_id")
            .and_then(Value::as_str)
            .and_then(|s| self.store.to_id(s).ok());
        let cx = ValidationContext {
            store: self.store.as_ref(),
            collection: &self.schema.collection,
            scope: self.schema.hooks.unique_query(input),
            exclude_id,
        };
        let mut doc = validation::apply(&self.schema, input, Some(prior), &cx).await?;
        if let Some(id) = prior.get("_id") {
            doc["_id"] = id.clone();
        }
        if let Some(created) = prior.get("created") {
            doc["created"] = created.clone();
        }
        doc["modified"] = Value::String(Self::now());
        self.schema
            .hooks
            .pre_save(&mut doc, self.store.as_ref())
            .await?;
        Ok(doc)
    }

    /// Persist a document produced by [`Model::prepare_update`].
    pub async fn commit_update(&self, doc: Value) -> CoreResult<Value> {
        let mut saved = self.store.update(&self.schema.collection, doc).await?;
        self.schema.hooks.post_load(&mut saved).await?;
        Ok(saved)
    }

    pub async fn update(&self, id: &str, input: &Value) -> CoreResult<Value> {
        let prior = self.read(id).await?;
        let doc = self.prepare_update(&prior, input).await?;
        self.commit_update(doc).await
    }

    /// Partial update: shallow-merge `partial` over the stored document,
    /// then re-validate as a full document.
    pub async fn patch(&self, id: &str, partial: &Value) -> CoreResult<Value> {
        let prior = self.read(id).await?;
        let mut merged = prior.clone();
        if let (Value::Object(target), Value::Object(changes)) = (&mut merged, partial) {
            for (key, value) in changes {
                target.insert(key.clone(), value.clone());
            }
        }
        let doc = self.prepare_update(&prior, &merged).await?;
        self.commit_update(doc).await
    }

    pub async fn delete(&self, id: &str) -> CoreResult<Value> {
        let id = self
            .store
            .to_id(id)
            .map_err(|e| CoreError::BadRequest(e.to_string()))?;
        let filter = Filter::new().eq("_id", id.to_string());
        self.store
            .delete(&self.schema.collection, &filter)
            .await?
            .ok_or(CoreError::NotFound)
    }

    pub async fn find(&self, filter: &Filter, options: &FindOptions) -> CoreResult<Vec<Value>> {
        let mut docs = self.store.find(&self.schema.collection, filter, options).await?;
        for doc in &mut docs {
            self.schema.hooks.post_load(doc).await?;
        }
        Ok(docs)
    }

    pub async fn count(&self, filter: &Filter) -> CoreResult<u64> {
        Ok(self.store.count(&self.schema.collection, filter).await?)
    }

    /// Create the collection and any indexes the schema declares.
    pub async fn ensure_indexes(&self) -> CoreResult<()> {
        self.store
            .ensure_collection(&self.schema.collection)
            .await?;
        for (path, unique) in self.schema.indexed_paths() {
            self.store
                .create_index(&self.schema.collection, path, unique)
                .await?;
        }
        Ok(())
    }
}

fn parse_timestamp(value: Option<&Value>) -> Option<DateTime<Utc>> {
    value
        .and_then(Value::as_str)
        .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
        .map(|d| d.with_timezone(&Utc))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::builtin::form_schema;
    use crate::store::MemoryStore;
    use serde_json::json;

    fn form_model(store: Arc<MemoryStore>) -> Model {
        Model::new(Arc::new(form_schema()), store)
    }

    #[tokio::test]
    async fn create_sets_timestamps_and_machine_name() {
        let store = Arc::new(MemoryStore::new());
        let model = form_model(store);
        let doc = model
            .create(&json!({"title": "Contact", "name": "contact", "path": "contact"}))
            .await
            .unwrap();
        assert_eq!(doc["machineName"], json!("contact"));
        assert!(doc["created"].is_string());
        assert_eq!(doc["created"], doc["modified"]);
    }

    #[tokio::test]
    async fn read_of_missing_id_is_not_found() {
        let store = Arc::new(MemoryStore::new());
        let model = form_model(store);
        let missing = crate::id::DocumentId::new().to_string();
        assert!(matches!(
            model.read(&missing).await,
            Err(CoreError::NotFound)
        ));
        assert!(matches!(
            model.read("garbage").await,
            Err(CoreError::BadRequest(_))
        ));
    }

    #[tokio::test]
    async fn stale_modified_timestamp_conflicts() {
        let store = Arc::new(MemoryStore::new());
        let model = form_model(store);
        let doc = model
            .create(&json!({"title": "A", "name": "a", "path": "a"}))
            .await
            .unwrap();
        let id = doc["_id"].as_str().unwrap();

        let mut stale = doc.clone();
        stale["modified"] = json!("2000-01-01T00:00:00.000Z");
        stale["title"] = json!("stale write");
        assert!(matches!(
            model.update(id, &stale).await,
            Err(CoreError::Conflict(_))
        ));

        // A fresh read-modify-write succeeds.
        let mut fresh = model.read(id).await.unwrap();
        fresh["title"] = json!("fresh write");
        let updated = model.update(id, &fresh).await.unwrap();
        assert_eq!(updated["title"], json!("fresh write"));
    }

    #[tokio::test]
    async fn update_keeps_machine_name_and_created() {
        let store = Arc::new(MemoryStore::new());
        let model = form_model(store);
        let doc = model
            .create(&json!({"title": "Keep", "name": "keep", "path": "keep"}))
            .await
            .unwrap();
        let id = doc["_id"].as_str().unwrap().to_string();

        let updated = model
            .update(
                &id,
                &json!({"title": "Renamed", "name": "keep", "path": "keep", "machineName": "evil"}),
            )
            .await
            .unwrap();
        assert_eq!(updated["machineName"], doc["machineName"]);
        assert_eq!(updated["created"], doc["created"]);
        assert_eq!(updated["_id"], doc["_id"]);
    }

    #[tokio::test]
    async fn patch_revalidates_as_a_full_document() {
        let store = Arc::new(MemoryStore::new());
        let model = form_model(store);
        let doc = model
            .create(&json!({"title": "P", "name": "p", "path": "p"}))
            .await
            .unwrap();
        let id = doc["_id"].as_str().unwrap();

        let patched = model.patch(id, &json!({"title": "P2"})).await.unwrap();
        assert_eq!(patched["title"], json!("P2"));
        assert_eq!(patched["path"], json!("p"));

        // Clearing a required field through patch is rejected.
        assert!(matches!(
            model.patch(id, &json!({"title": ""})).await,
            Err(CoreError::Validation(_))
        ));
    }
}
