//! The action orchestration pipeline.
//!
//! Invoked once before and once after the underlying CRUD operation.
//! Candidates are the form's configured actions whose method and phase sets
//! match the trigger; they execute strictly in descending-priority order
//! (ties broken by stored order). Each satisfied candidate gets a durable
//! ActionItem, a lease guaranteeing at-most-one concurrent execution per
//! item, and a handler invocation whose failure is logged to the item and
//! swallowed — a misbehaving action never fails the triggering request.

use std::sync::Arc;
use std::time::Duration;

use serde_json::{json, Value};
use tracing::{debug, error, warn};

use super::condition::{field_condition_met, ConditionEvaluator, ConditionScope};
use super::lease::{Lease, LeaseError};
use super::registry::{ActionContext, ActionRegistry, MessageSink};
use super::types::{Action, ActionCondition, ActionItem, ActionState, HandlerPhase};
use crate::error::{CoreError, CoreResult};
use crate::model::Model;
use crate::request::{RequestContext, ResourceMethod};
use crate::schema::action_item_schema;
use crate::store::{DocumentStore, Filter, FindOptions};

const ACTION_COLLECTION: &str = "actions";

pub struct ActionPipeline {
    registry: Arc<ActionRegistry>,
    leases: Arc<dyn Lease>,
    store: Arc<dyn DocumentStore>,
    /// ActionItems persist through their schema like any other entity.
    items: Model,
    script_evaluator: Option<Arc<dyn ConditionEvaluator>>,
    lease_ttl: Duration,
    condition_budget: Duration,
}

impl ActionPipeline {
    pub fn new(
        registry: Arc<ActionRegistry>,
        leases: Arc<dyn Lease>,
        store: Arc<dyn DocumentStore>,
    ) -> Self {
        Self {
            registry,
            leases,
            items: Model::new(Arc::new(action_item_schema()), store.clone()),
            store,
            script_evaluator: None,
            lease_ttl: Duration::from_secs(30),
            condition_budget: Duration::from_millis(250),
        }
    }

    /// Opt in to scripted conditions. Without an evaluator, scripted
    /// conditions never execute (fail closed).
    pub fn with_script_evaluator(mut self, evaluator: Arc<dyn ConditionEvaluator>) -> Self {
        self.script_evaluator = Some(evaluator);
        self
    }

    pub fn with_lease_ttl(mut self, ttl: Duration) -> Self {
        self.lease_ttl = ttl;
        self
    }

    pub fn with_condition_budget(mut self, budget: Duration) -> Self {
        self.condition_budget = budget;
        self
    }

    /// Run every matching action for one phase of one CRUD operation.
    pub async fn run(
        &self,
        phase: HandlerPhase,
        method: ResourceMethod,
        ctx: &RequestContext,
    ) -> CoreResult<()> {
        let Some(form) = ctx.entities.get("form") else {
            return Ok(());
        };
        let Some(form_id) = form.get("_id").and_then(Value::as_str) else {
            return Ok(());
        };

        let docs = self
            .store
            .find(
                ACTION_COLLECTION,
                &Filter::new().eq("form", form_id),
                &FindOptions::new(),
            )
            .await?;
        let mut candidates: Vec<Action> = docs
            .iter()
            .filter_map(Action::from_doc)
            .filter(|action| action.matches(phase, method))
            .collect();
        // Stable sort: ties keep stored order.
        candidates.sort_by_key(|action| std::cmp::Reverse(action.priority));

        for action in &candidates {
            if !self.should_execute(action, ctx).await {
                debug!(action = %action.name, "condition not met, skipping");
                continue;
            }

            let submission = ctx.entities.get("submission");
            let submission_id = submission
                .and_then(|s| s.get("_id"))
                .and_then(Value::as_str)
                .map(str::to_string);
            let mut item = ActionItem::new(action, method, submission_id);
            item.data = submission
                .and_then(|s| s.get("data"))
                .cloned()
                .unwrap_or(Value::Null);
            item.context = json!({"phase": phase.name(), "method": method.name()});
            item.log(
                "New action triggered",
                json!({"handler": action.name, "phase": phase.name()}),
            );
            let created = self.items.create(&item.to_value()).await?;
            item.id = created
                .get("_id")
                .and_then(Value::as_str)
                .map(str::to_string);

            // A fresh item's lease cannot be contended, but retries of the
            // same item go through the same guarded path.
            let _ = self.execute(&mut item, action, phase, ctx).await;
        }
        Ok(())
    }

    /// Evaluate whether a configured condition permits execution.
    async fn should_execute(&self, action: &Action, ctx: &RequestContext) -> bool {
        let submission = ctx.entities.get("submission");
        match &action.condition {
            None => true,
            Some(ActionCondition::Field { field, op, value }) => field_condition_met(
                field,
                *op,
                value,
                submission.unwrap_or(&Value::Null),
            ),
            Some(ActionCondition::Script(script)) => {
                let Some(evaluator) = &self.script_evaluator else {
                    warn!(
                        action = %action.name,
                        "scripted condition without an evaluator, not executing"
                    );
                    return false;
                };
                let null = Value::Null;
                let scope = ConditionScope {
                    data: submission
                        .and_then(|s| s.get("data"))
                        .unwrap_or(&null),
                    form: ctx.entities.get("form").unwrap_or(&null),
                };
                match tokio::time::timeout(self.condition_budget, evaluator.evaluate(script, scope))
                    .await
                {
                    Ok(Ok(met)) => met,
                    Ok(Err(e)) => {
                        warn!(action = %action.name, error = %e, "condition script failed, not executing");
                        false
                    }
                    Err(_) => {
                        warn!(action = %action.name, "condition script timed out, not executing");
                        false
                    }
                }
            }
        }
    }

    /// Execute one action against its ActionItem under the item's lease.
    ///
    /// Contention is a `Conflict`: the caller is rejected immediately, never
    /// queued. Handler failures terminate the item in `error` state and are
    /// otherwise swallowed.
    pub async fn execute(
        &self,
        item: &mut ActionItem,
        action: &Action,
        phase: HandlerPhase,
        ctx: &RequestContext,
    ) -> CoreResult<()> {
        let key = match &item.id {
            Some(id) => format!("actionitem:{id}"),
            None => format!("action:{}", action.id),
        };
        match self.leases.acquire(&key, self.lease_ttl).await {
            Ok(()) => {}
            Err(LeaseError::Held) => {
                warn!(action = %action.name, %key, "execution rejected, lease held");
                item.log(
                    "Execution rejected, another worker holds the lease",
                    json!({"key": key}),
                );
                item.state = ActionState::Error;
                self.persist_item(item).await;
                return Err(CoreError::Conflict(format!(
                    "action '{}' is already executing",
                    action.name
                )));
            }
            Err(LeaseError::Backend(e)) => return Err(CoreError::Store(e)),
        }

        item.attempts += 1;
        let outcome = match self.registry.get(&action.name) {
            Some(handler) => {
                let sink = MessageSink::new();
                let cx = ActionContext {
                    action,
                    phase,
                    method: item.method,
                    form: ctx.entities.get("form"),
                    submission: ctx.entities.get("submission"),
                    principal: ctx.principal.as_ref(),
                    store: self.store.as_ref(),
                };
                let result = handler.resolve(cx, &sink).await;
                item.messages.extend(sink.drain());
                result
            }
            None => Err(anyhow::anyhow!(
                "no action handler registered under '{}'",
                action.name
            )),
        };

        match outcome {
            Ok(()) => {
                item.log("Action completed", json!({}));
                item.state = ActionState::Complete;
            }
            Err(e) => {
                error!(action = %action.name, error = %e, "action handler failed");
                item.log("Action failed", json!({"error": e.to_string()}));
                item.state = ActionState::Error;
            }
        }

        self.persist_item(item).await;
        self.leases.release(&key).await;
        Ok(())
    }

    /// Best-effort write-back of the item's terminal state. A persistence
    /// failure is logged, not raised: the outcome already happened.
    async fn persist_item(&self, item: &ActionItem) {
        let Some(id) = &item.id else { return };
        if let Err(e) = self.items.update(id, &item.to_value()).await {
            error!(error = %e, "failed to persist action item");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::action::lease::MemoryLease;
    use crate::action::registry::{ActionHandler, ActionInfo};
    use crate::id::DocumentId;
    use crate::request::HttpMethod;
    use crate::store::MemoryStore;
    use async_trait::async_trait;
    use std::sync::Mutex;

    const ITEMS: &str = "actionitems";

    /// Records invocation order; optionally fails or sleeps.
    struct Recorder {
        name: &'static str,
        order: Arc<Mutex<Vec<String>>>,
        fail: bool,
        delay: Duration,
    }

    #[async_trait]
    impl ActionHandler for Recorder {
        fn info(&self) -> ActionInfo {
            ActionInfo {
                name: self.name,
                title: "Recorder",
                description: "records invocations",
                priority: 0,
                default_phases: vec![HandlerPhase::Before, HandlerPhase::After],
                default_methods: vec![ResourceMethod::Create],
                configurable_phases: true,
                configurable_methods: true,
            }
        }

        async fn resolve(&self, cx: ActionContext<'_>, log: &MessageSink) -> anyhow::Result<()> {
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            if let Ok(mut order) = self.order.lock() {
                order.push(cx.action.title.clone());
            }
            log.log("recorded", json!({}));
            if self.fail {
                anyhow::bail!("configured to fail");
            }
            Ok(())
        }
    }

    fn recorder(name: &'static str, order: &Arc<Mutex<Vec<String>>>) -> Recorder {
        Recorder {
            name,
            order: Arc::clone(order),
            fail: false,
            delay: Duration::ZERO,
        }
    }

    async fn seed_action(
        store: &MemoryStore,
        form: &str,
        title: &str,
        name: &str,
        priority: i64,
        condition: Value,
    ) {
        store
            .create(
                ACTION_COLLECTION,
                json!({
                    "title": title,
                    "name": name,
                    "handler": ["before"],
                    "method": ["create"],
                    "priority": priority,
                    "condition": condition,
                    "form": form,
                }),
            )
            .await
            .unwrap();
    }

    fn create_ctx(form_id: &str, data: Value) -> RequestContext {
        let mut ctx = RequestContext::new(HttpMethod::Post, &format!("/form/{form_id}/submission"));
        ctx.load("form", json!({"_id": form_id, "title": "F"}));
        ctx.load(
            "submission",
            json!({"_id": DocumentId::new().to_string(), "data": data}),
        );
        ctx
    }

    fn pipeline(store: Arc<MemoryStore>, registry: ActionRegistry) -> ActionPipeline {
        ActionPipeline::new(Arc::new(registry), Arc::new(MemoryLease::new()), store)
    }

    #[tokio::test]
    async fn candidates_run_in_descending_priority_order() {
        let store = Arc::new(MemoryStore::new());
        let order = Arc::new(Mutex::new(Vec::new()));
        let form = DocumentId::new().to_string();
        for (title, priority) in [("five", 5), ("ten", 10), ("one", 1)] {
            seed_action(&store, &form, title, "record", priority, json!({})).await;
        }
        let registry = ActionRegistry::builder()
            .register(recorder("record", &order))
            .build();
        let pipeline = pipeline(Arc::clone(&store), registry);

        pipeline
            .run(
                HandlerPhase::Before,
                ResourceMethod::Create,
                &create_ctx(&form, json!({})),
            )
            .await
            .unwrap();

        assert_eq!(
            *order.lock().unwrap(),
            vec!["ten".to_string(), "five".to_string(), "one".to_string()]
        );
    }

    #[tokio::test]
    async fn vip_condition_gates_execution() {
        let store = Arc::new(MemoryStore::new());
        let order = Arc::new(Mutex::new(Vec::new()));
        let form = DocumentId::new().to_string();
        seed_action(
            &store,
            &form,
            "vip only",
            "record",
            0,
            json!({"field": "data.vip", "eq": "equals", "value": "true"}),
        )
        .await;
        let registry = ActionRegistry::builder()
            .register(recorder("record", &order))
            .build();
        let pipeline = pipeline(Arc::clone(&store), registry);

        pipeline
            .run(
                HandlerPhase::Before,
                ResourceMethod::Create,
                &create_ctx(&form, json!({"vip": "false"})),
            )
            .await
            .unwrap();
        assert_eq!(store.count(ITEMS, &Filter::new()).await.unwrap(), 0);

        pipeline
            .run(
                HandlerPhase::Before,
                ResourceMethod::Create,
                &create_ctx(&form, json!({"vip": "true"})),
            )
            .await
            .unwrap();
        let items = store
            .find(ITEMS, &Filter::new(), &FindOptions::new())
            .await
            .unwrap();
        assert_eq!(items.len(), 1);
        let item = ActionItem::from_value(&items[0]).unwrap();
        assert_eq!(item.state, ActionState::Complete);
        assert_eq!(item.attempts, 1);
        assert_eq!(item.data, json!({"vip": "true"}));
        assert!(items[0].get("created").and_then(Value::as_str).is_some());
        assert!(items[0].get("modified").and_then(Value::as_str).is_some());
    }

    #[tokio::test]
    async fn handler_failure_is_logged_not_raised() {
        let store = Arc::new(MemoryStore::new());
        let order = Arc::new(Mutex::new(Vec::new()));
        let form = DocumentId::new().to_string();
        seed_action(&store, &form, "boom", "bad", 10, json!({})).await;
        seed_action(&store, &form, "fine", "good", 5, json!({})).await;
        let registry = ActionRegistry::builder()
            .register(Recorder {
                name: "bad",
                order: Arc::clone(&order),
                fail: true,
                delay: Duration::ZERO,
            })
            .register(recorder("good", &order))
            .build();
        let pipeline = pipeline(Arc::clone(&store), registry);

        // The failing action does not prevent its sibling, and run() is Ok.
        pipeline
            .run(
                HandlerPhase::Before,
                ResourceMethod::Create,
                &create_ctx(&form, json!({})),
            )
            .await
            .unwrap();
        assert_eq!(*order.lock().unwrap(), vec!["boom", "fine"]);

        let items = store
            .find(ITEMS, &Filter::new(), &FindOptions::new())
            .await
            .unwrap();
        let states: Vec<ActionState> = items
            .iter()
            .filter_map(ActionItem::from_value)
            .map(|i| i.state)
            .collect();
        assert!(states.contains(&ActionState::Error));
        assert!(states.contains(&ActionState::Complete));
    }

    #[tokio::test]
    async fn unknown_handler_terminates_the_item_in_error() {
        let store = Arc::new(MemoryStore::new());
        let form = DocumentId::new().to_string();
        seed_action(&store, &form, "ghost", "unregistered", 0, json!({})).await;
        let registry = ActionRegistry::builder().build();
        let pipeline = pipeline(Arc::clone(&store), registry);
        pipeline
            .run(
                HandlerPhase::Before,
                ResourceMethod::Create,
                &create_ctx(&form, json!({})),
            )
            .await
            .unwrap();
        let items = store
            .find(ITEMS, &Filter::new(), &FindOptions::new())
            .await
            .unwrap();
        let item = ActionItem::from_value(&items[0]).unwrap();
        assert_eq!(item.state, ActionState::Error);
    }

    #[tokio::test]
    async fn concurrent_execution_of_one_item_is_rejected() {
        let store = Arc::new(MemoryStore::new());
        let order = Arc::new(Mutex::new(Vec::new()));
        let registry = ActionRegistry::builder()
            .register(Recorder {
                name: "slow",
                order: Arc::clone(&order),
                fail: false,
                delay: Duration::from_millis(50),
            })
            .build();
        let pipeline = pipeline(Arc::clone(&store), registry);

        let form = DocumentId::new().to_string();
        let action = Action::from_doc(&json!({
            "_id": DocumentId::new().to_string(),
            "title": "slow", "name": "slow", "form": form,
            "handler": ["before"], "method": ["create"]
        }))
        .unwrap();
        let ctx = create_ctx(&form, json!({}));
        let mut item_a = ActionItem::new(&action, ResourceMethod::Create, None);
        let created = store.create(ITEMS, item_a.to_value()).await.unwrap();
        item_a.id = created["_id"].as_str().map(str::to_string);
        let mut item_b = item_a.clone();

        let (left, right) = tokio::join!(
            pipeline.execute(&mut item_a, &action, HandlerPhase::Before, &ctx),
            pipeline.execute(&mut item_b, &action, HandlerPhase::Before, &ctx),
        );
        let rejections = [&left, &right]
            .iter()
            .filter(|r| matches!(r, Err(CoreError::Conflict(_))))
            .count();
        assert_eq!(rejections, 1, "exactly one side must be rejected");
        assert_eq!(order.lock().unwrap().len(), 1, "exactly one execution ran");
    }

    #[tokio::test]
    async fn lease_contention_is_recorded_on_the_item() {
        let store = Arc::new(MemoryStore::new());
        let order = Arc::new(Mutex::new(Vec::new()));
        let leases = Arc::new(MemoryLease::new());
        let registry = ActionRegistry::builder()
            .register(recorder("slow", &order))
            .build();
        let pipeline = ActionPipeline::new(
            Arc::new(registry),
            Arc::clone(&leases) as Arc<dyn Lease>,
            Arc::clone(&store) as Arc<dyn DocumentStore>,
        );

        let form = DocumentId::new().to_string();
        let action = Action::from_doc(&json!({
            "_id": DocumentId::new().to_string(),
            "title": "slow", "name": "slow", "form": form,
            "handler": ["before"], "method": ["create"]
        }))
        .unwrap();
        let ctx = create_ctx(&form, json!({}));
        let mut item = ActionItem::new(&action, ResourceMethod::Create, None);
        let created = store.create(ITEMS, item.to_value()).await.unwrap();
        let id = created["_id"].as_str().unwrap().to_string();
        item.id = Some(id.clone());

        // Another worker already holds this item's lease.
        leases
            .acquire(&format!("actionitem:{id}"), Duration::from_secs(30))
            .await
            .unwrap();

        let outcome = pipeline
            .execute(&mut item, &action, HandlerPhase::Before, &ctx)
            .await;
        assert!(matches!(outcome, Err(CoreError::Conflict(_))));
        assert!(order.lock().unwrap().is_empty(), "handler must not run");

        // The rejection is durable: the stored item carries it.
        let stored = store
            .read(ITEMS, &Filter::new().eq("_id", id.as_str()))
            .await
            .unwrap()
            .unwrap();
        let stored = ActionItem::from_value(&stored).unwrap();
        assert_eq!(stored.state, ActionState::Error);
        assert!(stored
            .messages
            .iter()
            .any(|m| m.info.contains("Execution rejected")));
    }
}
