//! Access-control context and the fixed role→permission policy table.

use std::collections::BTreeSet;

use serde::Serialize;

/// Fixed policy table. Unknown roles contribute no permissions.
fn role_permissions(role: &str) -> &'static [&'static str] {
    match role {
        "admin" => &["query:read", "ingest:write", "tickets:read"],
        "support_rep" => &["query:read", "tickets:read"],
        "viewer" => &["query:read"],
        _ => &[],
    }
}

/// Expand a set of roles into the permissions they grant.
#[must_use]
pub fn permissions_for_roles(roles: &BTreeSet<String>) -> BTreeSet<String> {
    roles
        .iter()
        .flat_map(|role| role_permissions(role).iter().map(|permission| (*permission).to_string()))
        .collect()
}

/// Resolved identity for one request, produced by the gateway before the
/// pipeline runs and immutable afterwards. Permissions are always derived
/// from roles through the policy table, never accepted from the caller.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct AccessContext {
    pub user_id: String,
    pub roles: BTreeSet<String>,
    pub permissions: BTreeSet<String>,
    pub allowed_product_tags: BTreeSet<String>,
}

impl AccessContext {
    #[must_use]
    pub fn new(
        user_id: impl Into<String>,
        roles: BTreeSet<String>,
        allowed_product_tags: BTreeSet<String>,
    ) -> Self {
        let permissions = permissions_for_roles(&roles);
        Self { user_id: user_id.into(), roles, permissions, allowed_product_tags }
    }

    #[must_use]
    pub fn has_permission(&self, permission: &str) -> bool {
        self.permissions.contains(permission)
    }
}
