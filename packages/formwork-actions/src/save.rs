//! Save handler: copy the triggering submission into another collection.
//!
//! `settings.collection` names the target; `settings.fields`, when present,
//! is a `{target_field: source_path}` map applied against the submission's
//! data tree. Without a mapping the whole data object is copied.

use async_trait::async_trait;
use formwork::path;
use formwork::{
    ActionContext, ActionHandler, ActionInfo, HandlerPhase, MessageSink, ResourceMethod,
};
use serde_json::{json, Map, Value};

pub struct SaveHandler;

#[async_trait]
impl ActionHandler for SaveHandler {
    fn info(&self) -> ActionInfo {
        ActionInfo {
            name: "save",
            title: "Save Submission",
            description: "Copy the submission into another collection",
            priority: 10,
            default_phases: vec![HandlerPhase::After],
            default_methods: vec![ResourceMethod::Create, ResourceMethod::Update],
            configurable_phases: false,
            configurable_methods: true,
        }
    }

    async fn resolve(&self, cx: ActionContext<'_>, log: &MessageSink) -> anyhow::Result<()> {
        let collection = cx
            .action
            .settings
            .get("collection")
            .and_then(Value::as_str)
            .ok_or_else(|| anyhow::anyhow!("save action has no collection configured"))?;
        let submission = cx
            .submission
            .ok_or_else(|| anyhow::anyhow!("save action triggered without a submission"))?;
        let data = submission.get("data").cloned().unwrap_or_else(|| json!({}));

        let copied = match cx.action.settings.get("fields").and_then(Value::as_object) {
            Some(mapping) => {
                let mut mapped = Map::new();
                for (target, source) in mapping {
                    let Some(source_path) = source.as_str() else {
                        continue;
                    };
                    if let Some(value) = path::get(&data, source_path) {
                        mapped.insert(target.clone(), value.clone());
                    }
                }
                Value::Object(mapped)
            }
            None => data,
        };

        let doc = json!({
            "form": cx.action.form,
            "submission": submission.get("_id").cloned().unwrap_or(Value::Null),
            "data": copied,
        });
        let saved = cx.store.create(collection, doc).await?;
        log.log(
            "Submission copied",
            json!({"collection": collection, "id": saved.get("_id").cloned()}),
        );
        Ok(())
    }
}
