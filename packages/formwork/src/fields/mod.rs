//! Component-tree field handlers.
//!
//! After validation and persistence, submission data is post-processed by
//! walking the owning form's component tree and dispatching registered
//! handlers per component. The built-in `protected` handler strips write-only
//! values from responses.

mod handlers;
mod visitor;

pub use handlers::{FieldContext, FieldHandler, FieldHandlerRegistry, FieldHandlerRegistryBuilder};
pub use visitor::visit;
