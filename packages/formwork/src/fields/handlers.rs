//! Per-component field handlers.
//!
//! A handler is invoked for each leaf component the visitor reaches, with
//! mutable access to the parent object holding the component's value. Handlers
//! are looked up two ways: by the component's `type`, and by the presence of a
//! truthy component property (e.g. `protected`).

use std::sync::Arc;

use indexmap::IndexMap;

use serde_json::{Map, Value};

use crate::action::HandlerPhase;
use crate::request::ResourceMethod;

/// Ambient request facts available to every handler invocation.
#[derive(Debug, Clone, Copy)]
pub struct FieldContext<'a> {
    pub phase: HandlerPhase,
    pub method: ResourceMethod,
    /// Dot path of the component within the submission data tree.
    pub path: &'a str,
}

/// Mutates one component's slot in the submission data tree.
pub trait FieldHandler: Send + Sync {
    fn handle(&self, component: &Value, parent: &mut Map<String, Value>, key: &str, cx: FieldContext<'_>);
}

impl<F> FieldHandler for F
where
    F: Fn(&Value, &mut Map<String, Value>, &str, FieldContext<'_>) + Send + Sync,
{
    fn handle(&self, component: &Value, parent: &mut Map<String, Value>, key: &str, cx: FieldContext<'_>) {
        self(component, parent, key, cx)
    }
}

/// Strips protected values from responses. Protected fields accept writes
/// but never echo their value back.
struct ProtectedHandler;

impl FieldHandler for ProtectedHandler {
    fn handle(&self, _component: &Value, parent: &mut Map<String, Value>, key: &str, cx: FieldContext<'_>) {
        if cx.phase == HandlerPhase::After {
            parent.remove(key);
        }
    }
}

#[derive(Default)]
pub struct FieldHandlerRegistry {
    // IndexMap keeps registration order, so property handlers fire
    // deterministically.
    by_type: IndexMap<String, Vec<Arc<dyn FieldHandler>>>,
    by_property: IndexMap<String, Vec<Arc<dyn FieldHandler>>>,
}

impl FieldHandlerRegistry {
    pub fn builder() -> FieldHandlerRegistryBuilder {
        FieldHandlerRegistryBuilder::default()
    }

    /// Handlers registered for the component's `type`, in registration order.
    pub fn for_type(&self, component_type: &str) -> &[Arc<dyn FieldHandler>] {
        self.by_type
            .get(component_type)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Handlers whose trigger property is truthy on `component`.
    pub fn for_properties<'a>(
        &'a self,
        component: &'a Value,
    ) -> impl Iterator<Item = &'a Arc<dyn FieldHandler>> {
        self.by_property
            .iter()
            .filter(move |(property, _)| {
                matches!(component.get(property.as_str()), Some(Value::Bool(true)))
            })
            .flat_map(|(_, handlers)| handlers.iter())
    }
}

#[derive(Default)]
pub struct FieldHandlerRegistryBuilder {
    registry: FieldHandlerRegistry,
}

impl FieldHandlerRegistryBuilder {
    /// Start from the built-in handlers.
    pub fn with_defaults(self) -> Self {
        self.by_property("protected", ProtectedHandler)
    }

    pub fn by_type(mut self, component_type: impl Into<String>, handler: impl FieldHandler + 'static) -> Self {
        self.registry
            .by_type
            .entry(component_type.into())
            .or_default()
            .push(Arc::new(handler));
        self
    }

    pub fn by_property(mut self, property: impl Into<String>, handler: impl FieldHandler + 'static) -> Self {
        self.registry
            .by_property
            .entry(property.into())
            .or_default()
            .push(Arc::new(handler));
        self
    }

    pub fn build(self) -> FieldHandlerRegistry {
        self.registry
    }
}
