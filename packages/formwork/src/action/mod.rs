//! Actions: side effects attached to forms.
//!
//! A form configures zero or more actions. When a request touches the form's
//! resource, the [`ActionPipeline`] selects the actions whose phase and
//! method match, checks their conditions, and executes their handlers with a
//! durable [`ActionItem`] audit record per execution.

mod condition;
mod lease;
mod pipeline;
mod registry;
mod types;

pub use condition::{coerce_string, field_condition_met, ConditionEvaluator, ConditionScope};
pub use lease::{Lease, LeaseError, MemoryLease};
pub use pipeline::ActionPipeline;
pub use registry::{ActionContext, ActionHandler, ActionInfo, ActionRegistry, ActionRegistryBuilder, MessageSink};
pub use types::{
    Action, ActionCondition, ActionItem, ActionMessage, ActionState, ConditionOp, HandlerPhase,
};
