//! Index-query narrowing.
//!
//! When an index request is granted without `all` (and without the admin
//! bypass), the store filter is narrowed to what the requester may see.
//! Anonymous index requests are constrained to match nothing rather than
//! denied: a resource may permit anonymous creation without anonymous
//! listing, and an empty page is the correct answer.

use serde_json::Value;

use super::resolver::AccessGrant;
use crate::request::RequestContext;
use crate::store::Filter;

/// Roles granted through any of these entry types can see the entity in a
/// listing, independent of the method's `read_all`/`read_own` pair.
const LIST_VISIBLE_TYPES: &[&str] = &["read", "write", "admin"];

/// Narrow `base` for an index request according to the grant.
pub fn list_filter(ctx: &RequestContext, grant: &AccessGrant, base: Filter) -> Filter {
    if grant.admin || grant.all {
        return base;
    }

    let Some(principal) = &ctx.principal else {
        // Impossible clause: no document has a boolean `false` owner.
        return base.eq("owner", false);
    };

    let requester = principal.id.to_string();
    let mut roles: Vec<Value> = principal
        .roles
        .iter()
        .map(|r| Value::String(r.clone()))
        .collect();
    roles.push(Value::String(requester.clone()));

    let mut branches = vec![
        Filter::new().eq("owner", requester.clone()),
        Filter::new()
            .is_in(
                "access.type",
                LIST_VISIBLE_TYPES.iter().map(|t| Value::String((*t).to_string())).collect(),
            )
            .is_in("access.resources", roles),
    ];
    if grant.self_access {
        branches.push(Filter::new().eq("_id", requester));
    }
    base.any_of(branches)
}
