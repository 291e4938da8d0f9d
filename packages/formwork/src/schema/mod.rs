//! Declarative entity schemas.
//!
//! A schema is pure data: an ordered map of field paths to
//! [`FieldDescriptor`]s, plus per-entity hooks for machine-name generation
//! and uniqueness scoping. The validation engine in [`crate::validation`]
//! interprets schemas; nothing here performs I/O except the hooks.

pub mod builtin;
mod descriptor;
mod entity;

pub use builtin::{
    action_item_schema, action_schema, form_schema, role_schema, submission_schema,
};
pub use descriptor::{
    DefaultValue, FieldDescriptor, FieldType, ScalarType, SetterFn, SyncRule, UniqueRule,
    Validator, ValidatorContext,
};
pub use entity::{EntityHooks, EntitySchema, EntitySchemaBuilder, NoHooks};
