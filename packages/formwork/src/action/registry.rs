//! The action handler registry.
//!
//! Built once at start-up through [`ActionRegistryBuilder`] and injected
//! into the orchestration pipeline; there is no ambient global registry.
//! Each handler exposes static metadata through `info()` and its behavior
//! through `resolve()`.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::Utc;
use serde_json::Value;
use tracing::warn;

use super::types::{Action, ActionMessage, HandlerPhase};
use crate::request::{Principal, ResourceMethod};
use crate::store::DocumentStore;

/// Static metadata describing a handler implementation.
#[derive(Debug, Clone)]
pub struct ActionInfo {
    /// Registry key; `Action::name` refers to this.
    pub name: &'static str,
    pub title: &'static str,
    pub description: &'static str,
    /// Default ordering when a form configures the action without one.
    pub priority: i64,
    pub default_phases: Vec<HandlerPhase>,
    pub default_methods: Vec<ResourceMethod>,
    /// Whether a form may override phases/methods in its configuration.
    pub configurable_phases: bool,
    pub configurable_methods: bool,
}

/// Everything a handler may see during one invocation.
pub struct ActionContext<'a> {
    pub action: &'a Action,
    pub phase: HandlerPhase,
    pub method: ResourceMethod,
    pub form: Option<&'a Value>,
    pub submission: Option<&'a Value>,
    pub principal: Option<&'a Principal>,
    pub store: &'a dyn DocumentStore,
}

/// Collects log entries during a handler invocation; the pipeline drains
/// them onto the ActionItem in order afterwards.
#[derive(Default)]
pub struct MessageSink {
    messages: Mutex<Vec<ActionMessage>>,
}

impl MessageSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn log(&self, info: impl Into<String>, data: Value) {
        let entry = ActionMessage {
            datetime: Utc::now(),
            info: info.into(),
            data,
        };
        if let Ok(mut messages) = self.messages.lock() {
            messages.push(entry);
        }
    }

    pub fn drain(&self) -> Vec<ActionMessage> {
        self.messages
            .lock()
            .map(|mut messages| messages.drain(..).collect())
            .unwrap_or_default()
    }
}

/// A side-effecting action implementation.
#[async_trait]
pub trait ActionHandler: Send + Sync {
    fn info(&self) -> ActionInfo;

    /// Perform the side effect. Errors are recorded on the ActionItem and
    /// swallowed by the pipeline; they never fail the triggering request.
    async fn resolve(&self, cx: ActionContext<'_>, log: &MessageSink) -> anyhow::Result<()>;
}

/// Name → handler map, immutable after build.
pub struct ActionRegistry {
    handlers: HashMap<&'static str, Arc<dyn ActionHandler>>,
}

impl ActionRegistry {
    pub fn builder() -> ActionRegistryBuilder {
        ActionRegistryBuilder::default()
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn ActionHandler>> {
        self.handlers.get(name).cloned()
    }

    /// Metadata for every registered handler (the `/form/:id/actions`
    /// listing).
    pub fn infos(&self) -> Vec<ActionInfo> {
        let mut infos: Vec<ActionInfo> =
            self.handlers.values().map(|h| h.info()).collect();
        infos.sort_by_key(|info| info.name);
        infos
    }
}

#[derive(Default)]
pub struct ActionRegistryBuilder {
    handlers: HashMap<&'static str, Arc<dyn ActionHandler>>,
}

impl ActionRegistryBuilder {
    pub fn register(mut self, handler: impl ActionHandler + 'static) -> Self {
        let name = handler.info().name;
        if self.handlers.insert(name, Arc::new(handler)).is_some() {
            warn!(name, "action handler registered twice, keeping the last");
        }
        self
    }

    pub fn build(self) -> ActionRegistry {
        ActionRegistry {
            handlers: self.handlers,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    struct NoopHandler;

    #[async_trait]
    impl ActionHandler for NoopHandler {
        fn info(&self) -> ActionInfo {
            ActionInfo {
                name: "noop",
                title: "No-op",
                description: "does nothing",
                priority: 0,
                default_phases: vec![HandlerPhase::After],
                default_methods: vec![ResourceMethod::Create],
                configurable_phases: true,
                configurable_methods: true,
            }
        }

        async fn resolve(&self, _cx: ActionContext<'_>, log: &MessageSink) -> anyhow::Result<()> {
            log.log("noop ran", json!({}));
            Ok(())
        }
    }

    #[test]
    fn lookup_by_registered_name() {
        let registry = ActionRegistry::builder().register(NoopHandler).build();
        assert!(registry.get("noop").is_some());
        assert!(registry.get("missing").is_none());
        assert_eq!(registry.infos().len(), 1);
    }

    #[test]
    fn sink_preserves_message_order() {
        let sink = MessageSink::new();
        sink.log("first", json!({}));
        sink.log("second", json!({}));
        let messages = sink.drain();
        assert_eq!(messages[0].info, "first");
        assert_eq!(messages[1].info, "second");
        assert!(sink.drain().is_empty());
    }
}
