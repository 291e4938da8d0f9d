//! Integration tests for the standard handlers, run through a full
//! in-memory pipeline.

use formwork::testing::{admin, form_doc, TestHarness};
use formwork::{ActionRegistry, DocumentStore, Filter, FindOptions, HttpMethod};
use formwork_actions::register_standard;
use serde_json::{json, Value};

fn harness() -> TestHarness {
    TestHarness::new(register_standard(ActionRegistry::builder()).build())
}

async fn configure_action(harness: &TestHarness, form_id: &str, doc: Value) {
    harness
        .pipeline
        .handle(
            admin(HttpMethod::Post, &format!("/form/{form_id}/action")),
            Some(doc),
        )
        .await
        .expect("configure action");
}

async fn submit(harness: &TestHarness, form_id: &str, data: Value) -> Value {
    harness
        .pipeline
        .handle(
            admin(HttpMethod::Post, &format!("/form/{form_id}/submission")),
            Some(json!({"data": data})),
        )
        .await
        .expect("create submission")
}

#[tokio::test]
async fn save_action_copies_mapped_fields_into_the_target_collection() {
    let harness = harness();
    let form_id = harness.seed_form(form_doc("signup", json!([]))).await;
    configure_action(
        &harness,
        &form_id,
        json!({
            "title": "Copy to contacts",
            "name": "save",
            "handler": ["after"],
            "method": ["create"],
            "settings": {
                "collection": "contacts",
                "fields": {"address": "email", "years": "age"},
            },
        }),
    )
    .await;

    let created = submit(
        &harness,
        &form_id,
        json!({"email": "a@b.c", "age": 30, "ignored": true}),
    )
    .await;

    let copies = harness
        .store
        .find("contacts", &Filter::new(), &FindOptions::new())
        .await
        .unwrap();
    assert_eq!(copies.len(), 1);
    assert_eq!(copies[0]["data"], json!({"address": "a@b.c", "years": 30}));
    assert_eq!(copies[0]["submission"], created["_id"]);
}

#[tokio::test]
async fn role_action_adds_the_configured_role_once() {
    let harness = harness();
    let form_id = harness.seed_form(form_doc("register", json!([]))).await;
    configure_action(
        &harness,
        &form_id,
        json!({
            "title": "Grant member role",
            "name": "role",
            "handler": ["after"],
            "method": ["create"],
            "settings": {"type": "add", "role": "member-role-id"},
        }),
    )
    .await;

    let created = submit(&harness, &form_id, json!({})).await;
    let sid = created["_id"].as_str().unwrap();
    let stored = harness
        .store
        .read("submissions", &Filter::new().eq("_id", sid))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored["roles"], json!(["member-role-id"]));
}

#[tokio::test]
async fn misconfigured_webhook_records_an_error_item() {
    let harness = harness();
    let form_id = harness.seed_form(form_doc("hooked", json!([]))).await;
    configure_action(
        &harness,
        &form_id,
        json!({
            "title": "Broken webhook",
            "name": "webhook",
            "handler": ["after"],
            "method": ["create"],
            "settings": {},
        }),
    )
    .await;

    // The request still succeeds; the failure lands on the action item.
    submit(&harness, &form_id, json!({})).await;
    let items = harness
        .store
        .find("actionitems", &Filter::new(), &FindOptions::new())
        .await
        .unwrap();
    assert_eq!(items.len(), 1);
    assert_eq!(items[0]["state"], json!("error"));
}
