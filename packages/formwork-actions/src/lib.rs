//! # Formwork standard actions
//!
//! The handlers every deployment wants: webhook delivery, submission
//! copying, and role assignment. Each implements
//! [`formwork::ActionHandler`] and registers by name into the engine's
//! action registry.
//!
//! ```ignore
//! use formwork::ActionRegistry;
//! use formwork_actions::register_standard;
//!
//! let registry = register_standard(ActionRegistry::builder()).build();
//! ```

mod role;
mod save;
mod webhook;

pub use role::RoleHandler;
pub use save::SaveHandler;
pub use webhook::WebhookHandler;

use formwork::action::ActionRegistryBuilder;

/// Register every standard handler on the builder.
pub fn register_standard(builder: ActionRegistryBuilder) -> ActionRegistryBuilder {
    builder
        .register(WebhookHandler::new())
        .register(SaveHandler)
        .register(RoleHandler)
}

#[cfg(test)]
mod tests {
    use super::*;
    use formwork::ActionRegistry;

    #[test]
    fn standard_handlers_register_under_their_names() {
        let registry = register_standard(ActionRegistry::builder()).build();
        for name in ["webhook", "save", "role"] {
            assert!(registry.get(name).is_some(), "{name} missing");
        }
    }
}
