//! The resource pipeline: the library's entry point for a host server.
//!
//! # Overview
//!
//! A transport (HTTP router, message consumer, test harness) builds a
//! [`RequestContext`] and hands it here. The pipeline then runs the stages
//! strictly in sequence:
//!
//! ```text
//! context load -> authorize -> validate -> before-actions -> persist
//!              -> after-actions -> field visit -> response
//! ```
//!
//! Action failures never fail the request; authorization and validation
//! failures always do.

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::{json, Value};
use tracing::debug;

use crate::access::{authorize, list_filter, AccessSettings};
use crate::action::{ActionPipeline, HandlerPhase};
use crate::error::{CoreError, CoreResult};
use crate::fields::{visit, FieldHandlerRegistry};
use crate::model::Model;
use crate::request::{HttpMethod, RequestContext, ResourceMethod, RESOURCE_TYPES};
use crate::schema;
use crate::store::DocumentStore;

pub struct ResourcePipeline {
    resources: HashMap<String, Arc<Model>>,
    actions: ActionPipeline,
    fields: FieldHandlerRegistry,
    access: AccessSettings,
}

impl ResourcePipeline {
    pub fn builder(actions: ActionPipeline) -> ResourcePipelineBuilder {
        ResourcePipelineBuilder {
            resources: HashMap::new(),
            actions,
            fields: FieldHandlerRegistry::builder().with_defaults().build(),
            access: AccessSettings::default(),
        }
    }

    pub fn resource(&self, resource_type: &str) -> Option<&Arc<Model>> {
        self.resources.get(resource_type)
    }

    /// Run one request through every stage and produce the response document
    /// (an array for index requests).
    pub async fn handle(&self, mut ctx: RequestContext, body: Option<Value>) -> CoreResult<Value> {
        self.load_context(&mut ctx).await?;
        let method = ctx.normalized_method();
        let grant = authorize(&ctx, &self.access)?;

        let resource = ctx
            .target_resource()
            .ok_or_else(|| CoreError::NotFound)?
            .to_string();
        let model = self
            .resources
            .get(&resource)
            .ok_or(CoreError::NotFound)?
            .clone();
        debug!(%resource, method = method.name(), "dispatching");

        match method {
            ResourceMethod::Create => {
                let mut input = body.ok_or_else(|| {
                    CoreError::BadRequest("request body is required".to_string())
                })?;
                if matches!(resource.as_str(), "submission" | "action") {
                    self.prime_child(&ctx, &resource, &mut input);
                }
                let prepared = model.prepare_create(&input).await?;
                ctx.load(resource.clone(), prepared.clone());
                self.run_actions(&resource, HandlerPhase::Before, method, &ctx)
                    .await?;
                let saved = model.commit_create(prepared).await?;
                ctx.load(resource.clone(), saved.clone());
                self.run_actions(&resource, HandlerPhase::After, method, &ctx)
                    .await?;
                Ok(self.render(&ctx, method, saved))
            }
            ResourceMethod::Read => {
                let doc = ctx
                    .entities
                    .get(resource.as_str())
                    .cloned()
                    .ok_or(CoreError::NotFound)?;
                self.run_actions(&resource, HandlerPhase::Before, method, &ctx)
                    .await?;
                self.run_actions(&resource, HandlerPhase::After, method, &ctx)
                    .await?;
                Ok(self.render(&ctx, method, doc))
            }
            ResourceMethod::Update => {
                let prior = ctx
                    .entities
                    .get(resource.as_str())
                    .cloned()
                    .ok_or(CoreError::NotFound)?;
                let input = body.ok_or_else(|| {
                    CoreError::BadRequest("request body is required".to_string())
                })?;
                // PATCH merges into the stored document; PUT replaces it.
                let input = if ctx.http_method == HttpMethod::Patch {
                    merge_shallow(&prior, input)
                } else {
                    input
                };
                let prepared = model.prepare_update(&prior, &input).await?;
                ctx.load(resource.clone(), prepared.clone());
                self.run_actions(&resource, HandlerPhase::Before, method, &ctx)
                    .await?;
                let saved = model.commit_update(prepared).await?;
                ctx.load(resource.clone(), saved.clone());
                self.run_actions(&resource, HandlerPhase::After, method, &ctx)
                    .await?;
                Ok(self.render(&ctx, method, saved))
            }
            ResourceMethod::Delete => {
                let id = ctx
                    .target_id()
                    .map(str::to_string)
                    .ok_or(CoreError::NotFound)?;
                self.run_actions(&resource, HandlerPhase::Before, method, &ctx)
                    .await?;
                let deleted = model.delete(&id).await?;
                ctx.load(resource.clone(), deleted.clone());
                self.run_actions(&resource, HandlerPhase::After, method, &ctx)
                    .await?;
                Ok(self.render(&ctx, method, deleted))
            }
            ResourceMethod::Index => {
                self.run_actions(&resource, HandlerPhase::Before, method, &ctx)
                    .await?;
                let (base, options) = ctx.query_filter();
                let mut filter = list_filter(&ctx, &grant, base);
                // Child listings are scoped to the loaded parent form.
                if matches!(resource.as_str(), "submission" | "action") {
                    if let Some(form_id) = ctx
                        .entities
                        .get("form")
                        .and_then(|f| f.get("_id"))
                        .and_then(Value::as_str)
                    {
                        filter = filter.eq("form", form_id);
                    }
                }
                let docs = model.find(&filter, &options).await?;
                self.run_actions(&resource, HandlerPhase::After, method, &ctx)
                    .await?;
                let docs = docs
                    .into_iter()
                    .map(|doc| self.render(&ctx, method, doc))
                    .collect();
                Ok(Value::Array(docs))
            }
        }
    }

    /// Form-configured actions react to submission and form traffic only;
    /// administrative resources (the actions themselves, roles) must never
    /// trigger them.
    async fn run_actions(
        &self,
        resource: &str,
        phase: HandlerPhase,
        method: ResourceMethod,
        ctx: &RequestContext,
    ) -> CoreResult<()> {
        if matches!(resource, "submission" | "form") {
            self.actions.run(phase, method, ctx).await?;
        }
        Ok(())
    }

    /// Resolve every `<resource-type>/<id>` pair in the path into a loaded
    /// entity. A missing document fails the whole request.
    async fn load_context(&self, ctx: &mut RequestContext) -> CoreResult<()> {
        let segments = ctx.path.clone();
        let mut i = 0;
        while i < segments.len() {
            let resource_type = segments[i].as_str();
            if RESOURCE_TYPES.contains(&resource_type) {
                if let Some(id) = segments.get(i + 1) {
                    if !id.is_empty() && !RESOURCE_TYPES.contains(&id.as_str()) {
                        let model = self
                            .resources
                            .get(resource_type)
                            .ok_or(CoreError::NotFound)?;
                        let doc = model.read(id).await?;
                        ctx.load(resource_type, doc);
                        i += 2;
                        continue;
                    }
                }
            }
            i += 1;
        }
        Ok(())
    }

    /// Child creates get their parent form stamped in; submissions
    /// additionally get an owner. Non-admins cannot submit on behalf of
    /// someone else.
    fn prime_child(&self, ctx: &RequestContext, resource: &str, input: &mut Value) {
        let Some(obj) = input.as_object_mut() else {
            return;
        };
        if let Some(form_id) = ctx
            .entities
            .get("form")
            .and_then(|f| f.get("_id"))
            .and_then(Value::as_str)
        {
            obj.insert("form".to_string(), json!(form_id));
        }
        if resource != "submission" {
            return;
        }
        let explicit = obj.get("owner").filter(|v| !v.is_null()).is_some();
        if !explicit || !ctx.is_admin {
            match &ctx.principal {
                Some(principal) => {
                    obj.insert("owner".to_string(), json!(principal.id.to_string()));
                }
                None => {
                    obj.remove("owner");
                }
            }
        }
    }

    /// Post-process an outgoing document: submissions get the owning form's
    /// component tree walked over their data.
    fn render(&self, ctx: &RequestContext, method: ResourceMethod, mut doc: Value) -> Value {
        let Some(components) = ctx
            .entities
            .get("form")
            .and_then(|f| f.get("components"))
            .cloned()
        else {
            return doc;
        };
        if let Some(data) = doc.get_mut("data") {
            visit(&components, data, HandlerPhase::After, method, &self.fields);
        }
        doc
    }
}

fn merge_shallow(prior: &Value, patch: Value) -> Value {
    let (Some(base), Value::Object(overrides)) = (prior.as_object(), patch) else {
        return prior.clone();
    };
    let mut merged = base.clone();
    for (key, value) in overrides {
        merged.insert(key, value);
    }
    Value::Object(merged)
}

pub struct ResourcePipelineBuilder {
    resources: HashMap<String, Arc<Model>>,
    actions: ActionPipeline,
    fields: FieldHandlerRegistry,
    access: AccessSettings,
}

impl ResourcePipelineBuilder {
    pub fn resource(mut self, resource_type: impl Into<String>, model: Model) -> Self {
        self.resources.insert(resource_type.into(), Arc::new(model));
        self
    }

    /// Register models for the built-in resource types.
    pub fn standard_resources(self, store: Arc<dyn DocumentStore>) -> Self {
        self.resource(
            "form",
            Model::new(Arc::new(schema::form_schema()), store.clone()),
        )
        .resource(
            "submission",
            Model::new(Arc::new(schema::submission_schema()), store.clone()),
        )
        .resource(
            "role",
            Model::new(Arc::new(schema::role_schema()), store.clone()),
        )
        .resource(
            "action",
            Model::new(Arc::new(schema::action_schema()), store),
        )
    }

    pub fn fields(mut self, fields: FieldHandlerRegistry) -> Self {
        self.fields = fields;
        self
    }

    pub fn access(mut self, access: AccessSettings) -> Self {
        self.access = access;
        self
    }

    pub fn build(self) -> ResourcePipeline {
        ResourcePipeline {
            resources: self.resources,
            actions: self.actions,
            fields: self.fields,
            access: self.access,
        }
    }
}
