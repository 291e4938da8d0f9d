//! Webhook handler: POST the triggering submission to a configured URL.

use std::time::Duration;

use async_trait::async_trait;
use formwork::{
    ActionContext, ActionHandler, ActionInfo, HandlerPhase, MessageSink, ResourceMethod,
};
use serde_json::{json, Value};
use tracing::debug;

/// A slow endpoint must not stall the submission pipeline indefinitely.
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

pub struct WebhookHandler {
    client: reqwest::Client,
    timeout: Duration,
}

impl WebhookHandler {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
            timeout: DEFAULT_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

impl Default for WebhookHandler {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ActionHandler for WebhookHandler {
    fn info(&self) -> ActionInfo {
        ActionInfo {
            name: "webhook",
            title: "Webhook",
            description: "POST the submission to an external URL",
            priority: 0,
            default_phases: vec![HandlerPhase::After],
            default_methods: vec![
                ResourceMethod::Create,
                ResourceMethod::Update,
                ResourceMethod::Delete,
            ],
            configurable_phases: true,
            configurable_methods: true,
        }
    }

    async fn resolve(&self, cx: ActionContext<'_>, log: &MessageSink) -> anyhow::Result<()> {
        let url = cx
            .action
            .settings
            .get("url")
            .and_then(Value::as_str)
            .ok_or_else(|| anyhow::anyhow!("webhook action has no url configured"))?;

        let payload = json!({
            "request": {"method": cx.method.name()},
            "submission": cx.submission.cloned().unwrap_or(Value::Null),
        });
        debug!(%url, "delivering webhook");
        let response = self
            .client
            .post(url)
            .timeout(self.timeout)
            .json(&payload)
            .send()
            .await?;
        let status = response.status();
        log.log("Webhook delivered", json!({"url": url, "status": status.as_u16()}));
        if !status.is_success() {
            anyhow::bail!("webhook endpoint returned {status}");
        }
        Ok(())
    }
}
