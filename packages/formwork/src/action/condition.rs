//! Condition evaluation.
//!
//! The field/operator/value triple is the default, always-available
//! condition form. Scripted conditions are an explicit opt-in: the host
//! supplies a [`ConditionEvaluator`] that sees only a small variable set
//! and runs under a hard wall-clock budget. Any script error or timeout is
//! treated as "do not execute" — conditions fail closed.

use anyhow::Result;
use async_trait::async_trait;
use serde_json::Value;

use super::types::ConditionOp;
use crate::path;

/// The only variables a scripted condition may see.
pub struct ConditionScope<'a> {
    pub data: &'a Value,
    pub form: &'a Value,
}

/// Restricted expression evaluator for scripted conditions.
#[async_trait]
pub trait ConditionEvaluator: Send + Sync {
    /// Evaluate `script` against the scope. Expected to enforce its own
    /// step budget; the pipeline additionally bounds wall-clock time.
    async fn evaluate(&self, script: &str, scope: ConditionScope<'_>) -> Result<bool>;
}

/// String coercion used on both sides of a field comparison.
pub fn coerce_string(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Compare the submission's value at `field` against `expected` using
/// string coercion. An unset operator defaults to "execute".
pub fn field_condition_met(
    field: &str,
    op: Option<ConditionOp>,
    expected: &str,
    submission: &Value,
) -> bool {
    let Some(op) = op else {
        return true;
    };
    let actual = path::get(submission, field)
        .map(coerce_string)
        .unwrap_or_default();
    match op {
        ConditionOp::Equals => actual == expected,
        ConditionOp::NotEqual => actual != expected,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn equals_requires_exact_string_match() {
        let submission = json!({"data": {"vip": "true"}});
        assert!(field_condition_met(
            "data.vip",
            Some(ConditionOp::Equals),
            "true",
            &submission
        ));
        assert!(!field_condition_met(
            "data.vip",
            Some(ConditionOp::Equals),
            "false",
            &submission
        ));
    }

    #[test]
    fn comparison_coerces_both_sides_to_strings() {
        let submission = json!({"data": {"count": 5, "ok": true}});
        assert!(field_condition_met(
            "data.count",
            Some(ConditionOp::Equals),
            "5",
            &submission
        ));
        assert!(field_condition_met(
            "data.ok",
            Some(ConditionOp::Equals),
            "true",
            &submission
        ));
    }

    #[test]
    fn missing_field_compares_as_empty_string() {
        let submission = json!({"data": {}});
        assert!(field_condition_met(
            "data.vip",
            Some(ConditionOp::NotEqual),
            "true",
            &submission
        ));
        assert!(field_condition_met(
            "data.vip",
            Some(ConditionOp::Equals),
            "",
            &submission
        ));
    }

    #[test]
    fn unset_operator_defaults_to_execute() {
        assert!(field_condition_met("data.vip", None, "whatever", &json!({})));
    }
}
