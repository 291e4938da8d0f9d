// Common test utilities

use std::sync::Arc;

use serde_json::{json, Value};

use formwork::{
    ActionPipeline, ActionRegistry, DocumentId, DocumentStore, HttpMethod, MemoryLease,
    MemoryStore, Principal, RequestContext, ResourcePipeline,
};

/// An in-memory pipeline plus the store backing it.
pub struct Harness {
    pub store: Arc<MemoryStore>,
    pub pipeline: ResourcePipeline,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_registry(ActionRegistry::builder().build())
    }

    pub fn with_registry(registry: ActionRegistry) -> Self {
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

    /// Create a submission under `form_id` as the admin.
    pub async fn seed_submission(&self, form_id: &str, data: Value) -> Value {
        self.pipeline
            .handle(
                admin(HttpMethod::Post, &format!("/form/{form_id}/submission")),
                Some(json!({"data": data})),
            )
            .await
            .expect("seed submission")
    }
}

/// A minimal valid form document.
pub fn form_doc(name: &str, components: Value, submission_access: Value) -> Value {
    json!({
        "title": name,
        "name": name,
        "path": name,
        "components": components,
        "submissionAccess": submission_access,
        "access": [],
    })
}

pub fn admin(method: HttpMethod, path: &str) -> RequestContext {
    RequestContext::new(method, path).with_admin()
}

pub fn as_user(method: HttpMethod, path: &str, id: DocumentId, roles: &[&str]) -> RequestContext {
    RequestContext::new(method, path)
        .with_principal(Principal::new(id, roles.iter().map(|r| r.to_string()).collect()))
}

pub fn anonymous(method: HttpMethod, path: &str) -> RequestContext {
    RequestContext::new(method, path)
}
