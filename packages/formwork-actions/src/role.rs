//! Role handler: add or remove a role on the triggering submission.
//!
//! `settings.type` is `add` or `remove`; `settings.role` is the role id to
//! apply to the submission's `roles` array. The updated document is written
//! straight through the store; validation already ran on the original save.

use async_trait::async_trait;
use formwork::{
    ActionContext, ActionHandler, ActionInfo, HandlerPhase, MessageSink, ResourceMethod,
};
use serde_json::{json, Value};

pub struct RoleHandler;

#[async_trait]
impl ActionHandler for RoleHandler {
    fn info(&self) -> ActionInfo {
        ActionInfo {
            name: "role",
            title: "Role Assignment",
            description: "Add or remove a role on the submission",
            priority: 1,
            default_phases: vec![HandlerPhase::After],
            default_methods: vec![ResourceMethod::Create],
            configurable_phases: false,
            configurable_methods: false,
        }
    }

    async fn resolve(&self, cx: ActionContext<'_>, log: &MessageSink) -> anyhow::Result<()> {
        let role = cx
            .action
            .settings
            .get("role")
            .and_then(Value::as_str)
            .ok_or_else(|| anyhow::anyhow!("role action has no role configured"))?;
        let operation = cx
            .action
            .settings
            .get("type")
            .and_then(Value::as_str)
            .unwrap_or("add");
        let submission = cx
            .submission
            .ok_or_else(|| anyhow::anyhow!("role action triggered without a submission"))?;

        let mut doc = submission.clone();
        let mut roles: Vec<Value> = doc
            .get("roles")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();
        let present = roles.iter().any(|r| r.as_str() == Some(role));
        match operation {
            "add" if !present => roles.push(json!(role)),
            "remove" => roles.retain(|r| r.as_str() != Some(role)),
            "add" => {
                log.log("Role already present", json!({"role": role}));
                return Ok(());
            }
            other => anyhow::bail!("unknown role operation '{other}'"),
        }
        doc["roles"] = Value::Array(roles);

        cx.store.update("submissions", doc).await?;
        log.log(
            "Role updated",
            json!({"role": role, "operation": operation}),
        );
        Ok(())
    }
}
