//! API-side authorization guard.
//!
//! Enforces permissions at the route boundary (before dispatch), keeping
//! domain aggregates and infra auth-agnostic.

use repset_auth::{AuthzError, Permission, Principal, Role, TenantMembership, authorize};

use crate::context::{PrincipalContext, TenantContext};

/// Check that the request principal holds `required` in the request tenant.
///
/// Intended to be called **before** dispatching a command.
pub fn require_permission(
    tenant: &TenantContext,
    principal: &PrincipalContext,
    required: &Permission,
) -> Result<(), AuthzError> {
    let membership = TenantMembership {
        tenant_id: tenant.tenant_id(),
        roles: principal.roles().to_vec(),
        permissions: permissions_from_roles(principal.roles()),
    };

    let principal = Principal {
        principal_id: principal.principal_id(),
        active_tenant_id: tenant.tenant_id(),
        membership,
    };

    authorize(&principal, required)
}

/// Role→permission mapping.
///
/// Intentionally simple until a real policy source exists: "admin" gets
/// everything, "front_desk" gets the door and the drawer.
fn permissions_from_roles(roles: &[Role]) -> Vec<Permission> {
    let mut perms = Vec::new();

    for role in roles {
        match role.as_str() {
            "admin" => return vec![Permission::new("*")],
            "front_desk" => {
                perms.extend([
                    Permission::new("attendance.check_in"),
                    Permission::new("cashbook.open"),
                    Permission::new("cashbook.record"),
                    Permission::new("cashbook.close"),
                    Permission::new("members.debt.settle"),
                ]);
            }
            _ => {}
        }
    }

    perms
}
