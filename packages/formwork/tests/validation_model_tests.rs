//! Integration tests for the validation engine through the model layer.
//!
//! Exercises a registration-style schema end to end:
//! - coercion of submitted strings into their declared types
//! - one complete error map per failing save
//! - read-only retention across updates
//! - deterministic re-validation of the engine's own output

use std::sync::Arc;

use formwork::schema::{EntitySchema, FieldDescriptor, SyncRule, UniqueRule};
use formwork::{CoreError, DocumentStore, MemoryStore, Model};
use serde_json::json;

fn registration_schema() -> EntitySchema {
    EntitySchema::builder("registration")
        .field(
            "email",
            FieldDescriptor::string()
                .required()
                .trim()
                .lowercase()
                .validator(SyncRule::new("must contain @", |value, _doc| {
                    value.as_str().map(|s| s.contains('@')).unwrap_or(true)
                }))
                .validator(UniqueRule::new()),
        )
        .field(
            "age",
            FieldDescriptor::number().validator(SyncRule::new(
                "must be at least 13",
                |value, _doc| value.as_i64().map(|n| n >= 13).unwrap_or(true),
            )),
        )
        .field(
            "tier",
            FieldDescriptor::string()
                .default_value("basic")
                .enumerated(vec![json!("basic"), json!("vip")]),
        )
        .field("referrer", FieldDescriptor::string().read_only())
        .build()
}

fn model(store: &Arc<MemoryStore>) -> Model {
    let store: Arc<dyn DocumentStore> = Arc::clone(store) as _;
    Model::new(Arc::new(registration_schema()), store)
}

// =============================================================================
// Coercion
// =============================================================================

#[tokio::test]
async fn submitted_strings_coerce_into_declared_types() {
    let store = Arc::new(MemoryStore::new());
    let model = model(&store);

    let saved = model
        .create(&json!({
            "email": "  Ada@Example.COM ",
            "age": "42",
            "referrer": "friend",
        }))
        .await
        .unwrap();

    assert_eq!(saved["email"], json!("ada@example.com"));
    assert_eq!(saved["age"], json!(42));
    assert_eq!(saved["tier"], json!("basic"));
    assert!(saved["created"].is_string());
    assert!(saved["modified"].is_string());
}

#[tokio::test]
async fn revalidating_stored_output_changes_nothing() {
    let store = Arc::new(MemoryStore::new());
    let model = model(&store);

    let first = model
        .create(&json!({"email": "a@b.c", "age": "30"}))
        .await
        .unwrap();
    let id = first["_id"].as_str().unwrap();

    // Echo the stored document back through a full update.
    let second = model.update(id, &first).await.unwrap();
    for field in ["email", "age", "tier", "_id", "created"] {
        assert_eq!(first[field], second[field], "{field} drifted");
    }
}

// =============================================================================
// Error completeness
// =============================================================================

#[tokio::test]
async fn one_save_reports_every_failing_field() {
    let store = Arc::new(MemoryStore::new());
    let model = model(&store);

    let err = model
        .create(&json!({
            "email": "not-an-address",
            "age": "9",
            "tier": "platinum",
        }))
        .await
        .unwrap_err();

    let CoreError::Validation(errors) = err else {
        panic!("expected a validation error");
    };
    assert!(errors.contains("email"));
    assert!(errors.contains("age"));
    assert!(errors.contains("tier"));
}

#[tokio::test]
async fn duplicate_email_is_rejected_but_own_record_is_not() {
    let store = Arc::new(MemoryStore::new());
    let model = model(&store);

    let first = model
        .create(&json!({"email": "a@b.c", "age": 30}))
        .await
        .unwrap();
    let err = model
        .create(&json!({"email": "a@b.c", "age": 31}))
        .await
        .unwrap_err();
    assert!(matches!(err, CoreError::Validation(_)));

    // Updating the holder itself passes the uniqueness check.
    let id = first["_id"].as_str().unwrap();
    model.update(id, &first).await.unwrap();
}

// =============================================================================
// Read-only retention
// =============================================================================

#[tokio::test]
async fn read_only_fields_keep_the_stored_value_on_update() {
    let store = Arc::new(MemoryStore::new());
    let model = model(&store);

    let saved = model
        .create(&json!({"email": "a@b.c", "referrer": "friend"}))
        .await
        .unwrap();
    let id = saved["_id"].as_str().unwrap();

    let mut tampered = saved.clone();
    tampered["referrer"] = json!("self");
    let updated = model.update(id, &tampered).await.unwrap();
    assert_eq!(updated["referrer"], json!("friend"));
}

#[tokio::test]
async fn patch_merges_then_revalidates_the_whole_document() {
    let store = Arc::new(MemoryStore::new());
    let model = model(&store);

    let saved = model
        .create(&json!({"email": "a@b.c", "age": 30}))
        .await
        .unwrap();
    let id = saved["_id"].as_str().unwrap();

    let patched = model.patch(id, &json!({"age": "31"})).await.unwrap();
    assert_eq!(patched["age"], json!(31));
    assert_eq!(patched["email"], json!("a@b.c"));

    // A patch that breaks a rule is rejected like any save.
    let err = model.patch(id, &json!({"age": 7})).await.unwrap_err();
    assert!(matches!(err, CoreError::Validation(_)));
}
