//! Engine configuration loaded from environment variables.

use std::env;
use std::time::Duration;

use anyhow::{Context, Result};
use dotenvy::dotenv;

/// Runtime configuration for the engine.
#[derive(Debug, Clone)]
pub struct CoreConfig {
    /// Pre-shared administrative credential. When a request presents this
    /// value, authorization short-circuits to a full grant. `None` disables
    /// the bypass entirely.
    pub admin_key: Option<String>,
    /// Role id implicitly held by every principal, authenticated or not.
    pub everyone_role: String,
    /// Roles assumed for unauthenticated requesters (beyond `everyone_role`).
    pub default_roles: Vec<String>,
    /// TTL on the per-action execution lease.
    pub lease_ttl: Duration,
    /// Hard wall-clock budget for scripted action conditions.
    pub condition_budget: Duration,
}

impl CoreConfig {
    /// Load configuration from environment variables, reading a `.env` file
    /// first if one is present (development).
    pub fn from_env() -> Result<Self> {
        let _ = dotenv();

        let lease_ttl_secs: u64 = env::var("FORMWORK_LEASE_TTL_SECS")
            .unwrap_or_else(|_| "30".to_string())
            .parse()
            .context("FORMWORK_LEASE_TTL_SECS must be a valid number")?;
        let condition_budget_ms: u64 = env::var("FORMWORK_CONDITION_BUDGET_MS")
            .unwrap_or_else(|_| "250".to_string())
            .parse()
            .context("FORMWORK_CONDITION_BUDGET_MS must be a valid number")?;

        Ok(Self {
            admin_key: env::var("FORMWORK_ADMIN_KEY").ok(),
            everyone_role: env::var("FORMWORK_EVERYONE_ROLE")
                .unwrap_or_else(|_| "everyone".to_string()),
            default_roles: env::var("FORMWORK_DEFAULT_ROLES")
                .map(|s| {
                    s.split(',')
                        .map(str::trim)
                        .filter(|s| !s.is_empty())
                        .map(str::to_string)
                        .collect()
                })
                .unwrap_or_default(),
            lease_ttl: Duration::from_secs(lease_ttl_secs),
            condition_budget: Duration::from_millis(condition_budget_ms),
        })
    }
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            admin_key: None,
            everyone_role: "everyone".to_string(),
            default_roles: Vec::new(),
            lease_ttl: Duration::from_secs(30),
            condition_budget: Duration::from_millis(250),
        }
    }
}
