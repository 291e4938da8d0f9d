//! # Formwork
//!
//! A schema-driven resource engine: forms describe resources, submissions
//! are their documents, and every request flows through one validation,
//! authorization, and action pipeline.
//!
//! ## Core Concepts
//!
//! Formwork separates **shape** from **storage**:
//! - [`EntitySchema`] = Shape (fields, coercions, validators)
//! - [`DocumentStore`] = Storage (a thin, swappable document contract)
//!
//! The key principle: **one request = one pipeline pass**. Every stage sees
//! the same loaded context; no stage reaches around another.
//!
//! ## Architecture
//!
//! ```text
//! Transport (router / test harness)
//!     │
//!     ▼ RequestContext
//! ResourcePipeline.handle()
//!     │
//!     ├─► load_context()    path pairs → entity map
//!     ├─► authorize()       roles × access lists → AccessGrant
//!     ├─► Model.prepare_*   two-pass coerce + validate (all errors)
//!     ├─► ActionPipeline    before-phase handlers, lease-guarded
//!     ├─► DocumentStore     persist
//!     ├─► ActionPipeline    after-phase handlers (failures swallowed)
//!     └─► fields::visit     component-tree post-processing
//!             │
//!             ▼
//!       response document
//! ```
//!
//! ## Key Invariants
//!
//! 1. **Validation is total** - One pass reports every field error, not the
//!    first
//! 2. **Read-only means sticky** - Updates silently retain the stored value
//! 3. **Denial is opaque** - Authorization failures carry no detail
//! 4. **Actions are best-effort** - A failing handler never fails the request
//! 5. **Leases reject, never queue** - Concurrent execution of one action
//!    item is a conflict
//!
//! ## Example
//!
//! ```ignore
//! use formwork::{
//!     ActionPipeline, ActionRegistry, MemoryLease, MemoryStore,
//!     RequestContext, ResourcePipeline, HttpMethod,
//! };
//! use std::sync::Arc;
//!
//! let store = Arc::new(MemoryStore::new());
//! let actions = ActionPipeline::new(
//!     Arc::new(ActionRegistry::builder().build()),
//!     Arc::new(MemoryLease::new()),
//!     store.clone(),
//! );
//! let pipeline = ResourcePipeline::builder(actions)
//!     .standard_resources(store)
//!     .build();
//!
//! let ctx = RequestContext::new(HttpMethod::Post, "/form").with_admin();
//! let form = pipeline.handle(ctx, Some(serde_json::json!({
//!     "title": "Contact", "name": "contact", "path": "contact",
//! }))).await?;
//! ```
//!
//! ## What This Is Not
//!
//! Formwork is **not**:
//! - An HTTP server (bring your own router)
//! - A rendering engine (component trees are data, not UI)
//! - A migration tool
//!
//! Formwork **is**:
//! > A schema-driven core where forms describe resources and one pipeline
//! > validates, authorizes, persists, and reacts.

// Core modules
mod config;
mod error;
mod id;
mod model;
pub mod path;
mod pipeline;
mod request;
mod validation;

// Subsystems
pub mod access;
pub mod action;
pub mod fields;
pub mod schema;
pub mod store;

// Testing utilities (feature-gated)
#[cfg(feature = "testing")]
pub mod testing;

// Re-export configuration
pub use config::CoreConfig;

// Re-export error types
pub use error::{CoreError, CoreResult, FieldErrors};

// Re-export identifiers
pub use id::DocumentId;

// Re-export the model layer
pub use model::Model;

// Re-export request types
pub use request::{
    HttpMethod, Principal, RequestContext, ResourceMethod, RESOURCE_TYPES,
};

// Re-export the pipeline (primary entry point)
pub use pipeline::{ResourcePipeline, ResourcePipelineBuilder};

// Re-export validation
pub use validation::{apply as validate, ValidationContext};

// Re-export the commonly used subsystem types at the crate root
pub use access::{authorize, list_filter, AccessGrant, AccessSettings};
pub use action::{
    Action, ActionContext, ActionHandler, ActionInfo, ActionItem, ActionPipeline,
    ActionRegistry, ActionState, ConditionEvaluator, HandlerPhase, Lease, MemoryLease,
    MessageSink,
};
pub use fields::{FieldHandler, FieldHandlerRegistry};
pub use schema::{EntitySchema, FieldDescriptor};
pub use store::{DocumentStore, Filter, FindOptions, MemoryStore, SortOrder};

// Re-export commonly used external types
pub use async_trait::async_trait;
