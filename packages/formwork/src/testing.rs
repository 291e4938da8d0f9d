//! Test fixtures, available behind the `testing` feature.
//!
//! Downstream crates enable `formwork = { features = ["testing"] }` in their
//! dev-dependencies to get a ready-made in-memory pipeline and seeded
//! documents without repeating the wiring.

use std::sync::Arc;

use serde_json::{json, Value};

use crate::action::{ActionPipeline, ActionRegistry, MemoryLease};
use crate::id::DocumentId;
use crate::pipeline::ResourcePipeline;
use crate::request::{HttpMethod, Principal, RequestContext};
use crate::store::{DocumentStore, MemoryStore};

/// An in-memory pipeline plus handles to its moving parts.
pub struct TestHarness {
    pub store: Arc<MemoryStore>,
    pub pipeline: ResourcePipeline,
}

impl TestHarness {
    /// A pipeline over a fresh [`MemoryStore`] with the standard resources
    /// and the given action handlers registered.
    pub fn new(registry: ActionRegistry) -> Self {
        let store = Arc::new(MemoryStore::new());
        let dyn_store: Arc<dyn DocumentStore> = store.clone();
        let actions = ActionPipeline::new(
            Arc::new(registry),
            Arc::new(MemoryLease::new()),
            dyn_store.clone(),
        );
        let pipeline = ResourcePipeline::builder(actions)
            .standard_resources(dyn_store)
            .build();
        Self { store, pipeline }
    }

    /// Create a form as the admin and return its id.
    pub async fn seed_form(&self, doc: Value) -> String {
        let created = self
            .pipeline
            .handle(admin(HttpMethod::Post, "/form"), Some(doc))
            .await
            .expect("seed form");
        created["_id"].as_str().expect("form id").to_string()
    }
}

/// A minimal valid form document with the given components.
pub fn form_doc(name: &str, components: Value) -> Value {
    json!({
        "title": name,
        "name": name,
        "path": name,
        "components": components,
        "submissionAccess": [],
        "access": [],
    })
}

/// An admin-credentialed request.
pub fn admin(method: HttpMethod, path: &str) -> RequestContext {
    RequestContext::new(method, path).with_admin()
}

/// A request from an authenticated principal with the given roles.
pub fn as_user(
    method: HttpMethod,
    path: &str,
    id: DocumentId,
    roles: &[&str],
) -> RequestContext {
    RequestContext::new(method, path)
        .with_principal(Principal::new(id, roles.iter().map(|r| r.to_string()).collect()))
}
