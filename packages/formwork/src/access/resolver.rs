//! The authorization resolver.
//!
//! Given a request's loaded entities and the requester's role set, decide
//! grant or deny and produce a per-request permission summary. The summary
//! drives both the gate decision and, for index requests, the store-filter
//! narrowing in [`super::list_filter`].

use serde_json::Value;
use tracing::debug;

use crate::config::CoreConfig;
use crate::error::{CoreError, CoreResult};
use crate::request::{RequestContext, ResourceMethod};

/// Role configuration the resolver needs, derived from [`CoreConfig`].
#[derive(Debug, Clone)]
pub struct AccessSettings {
    /// Role implicitly held by every principal, authenticated or not.
    pub everyone_role: String,
    /// Roles assumed for unauthenticated requesters.
    pub default_roles: Vec<String>,
}

impl Default for AccessSettings {
    fn default() -> Self {
        Self::from(&CoreConfig::default())
    }
}

impl From<&CoreConfig> for AccessSettings {
    fn from(config: &CoreConfig) -> Self {
        Self {
            everyone_role: config.everyone_role.clone(),
            default_roles: config.default_roles.clone(),
        }
    }
}

/// The per-request permission summary.
#[derive(Debug, Clone, Default)]
pub struct AccessGrant {
    /// Granted through the method's `_all` permission (or collection root).
    pub all: bool,
    /// Granted through ownership plus the method's `_own` permission.
    pub owner: bool,
    /// The consulted access list carried a standing `self` entry.
    pub self_access: bool,
    /// Granted through the pre-shared admin credential.
    pub admin: bool,
}

/// `(all, own)` permission names for a method. Index reuses the read names.
fn permission_names(method: ResourceMethod) -> (&'static str, &'static str) {
    match method {
        ResourceMethod::Create => ("create_all", "create_own"),
        ResourceMethod::Read | ResourceMethod::Index => ("read_all", "read_own"),
        ResourceMethod::Update => ("update_all", "update_own"),
        ResourceMethod::Delete => ("delete_all", "delete_own"),
    }
}

fn role_strings(list: Option<&Value>) -> Vec<String> {
    list.and_then(Value::as_array)
        .map(|roles| {
            roles
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

/// The requester's effective role set: explicit roles ∪ everyone, or
/// default roles ∪ everyone when unauthenticated.
fn effective_roles(ctx: &RequestContext, settings: &AccessSettings) -> Vec<String> {
    let mut roles = match &ctx.principal {
        Some(principal) => principal.roles.clone(),
        None => settings.default_roles.clone(),
    };
    roles.push(settings.everyone_role.clone());
    roles
}

/// Decide whether the requester may perform the normalized method on the
/// request's primary entity. Denial carries no detail beyond 401.
pub fn authorize(ctx: &RequestContext, settings: &AccessSettings) -> CoreResult<AccessGrant> {
    if ctx.is_admin {
        return Ok(AccessGrant {
            all: true,
            admin: true,
            ..Default::default()
        });
    }

    let method = ctx.normalized_method();
    let Some((entity_type, entity)) = ctx.primary_entity() else {
        // Collection root: granted unconditionally; index narrowing still
        // applies downstream because `all` is not set.
        return Ok(AccessGrant::default());
    };

    // Submission-typed requests, and create/index against a form, consult
    // the owning form's submissionAccess; everything else the entity's own
    // access list.
    let access_list = if entity_type == "submission" {
        ctx.entities
            .get("form")
            .and_then(|form| form.get("submissionAccess"))
    } else if entity_type == "form"
        && matches!(method, ResourceMethod::Create | ResourceMethod::Index)
    {
        entity.get("submissionAccess")
    } else {
        entity.get("access")
    };

    let (all_name, own_name) = permission_names(method);
    let mut all_roles: Vec<String> = Vec::new();
    let mut own_roles: Vec<String> = Vec::new();
    let mut self_access = false;
    if let Some(Value::Array(entries)) = access_list {
        for entry in entries {
            let entry_type = entry.get("type").and_then(Value::as_str).unwrap_or("");
            if entry_type == all_name {
                all_roles.extend(role_strings(entry.get("resources")));
            } else if entry_type == own_name {
                own_roles.extend(role_strings(entry.get("resources")));
            } else if entry_type == "self" {
                self_access = true;
            }
        }
    }

    let roles = effective_roles(ctx, settings);
    if roles.iter().any(|r| all_roles.contains(r)) {
        return Ok(AccessGrant {
            all: true,
            self_access,
            ..Default::default()
        });
    }

    let requester_id = ctx.principal.as_ref().map(|p| p.id.to_string());
    let owns = match (&requester_id, entity.get("owner").and_then(Value::as_str)) {
        (Some(requester), Some(owner)) => requester == owner,
        _ => false,
    };
    let is_self = self_access
        && match (&requester_id, entity.get("_id").and_then(Value::as_str)) {
            (Some(requester), Some(id)) => requester == id,
            _ => false,
        };
    let ownership_path = owns
        || is_self
        || method == ResourceMethod::Create
        || (method == ResourceMethod::Index && ctx.principal.is_some());

    if ownership_path && roles.iter().any(|r| own_roles.contains(r)) {
        return Ok(AccessGrant {
            owner: true,
            self_access,
            ..Default::default()
        });
    }

    debug!(
        entity = entity_type,
        method = method.name(),
        "authorization denied"
    );
    Err(CoreError::Unauthorized)
}
