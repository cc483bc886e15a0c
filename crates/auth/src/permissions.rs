//! Permission and role checks.

use gatehouse_common::{AuditEvent, AuditOutcome, AuditSink, RouteAuthPolicy};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::debug;

use crate::claims::Identity;
use crate::error::AuthError;

/// Permission that implies every other permission.
pub const ADMIN_PERMISSION: &str = "admin";

/// Role that satisfies every role requirement.
pub const ADMIN_ROLE: &str = "admin";

/// `true` iff `required` is held directly or the admin wildcard is held.
pub fn has_permission(user_permissions: &HashSet<String>, required: &str) -> bool {
    user_permissions.contains(required) || user_permissions.contains(ADMIN_PERMISSION)
}

/// `true` iff the role matches exactly or the user is an admin.
pub fn has_role(user_role: &str, required: &str) -> bool {
    user_role == required || user_role == ADMIN_ROLE
}

/// Evaluates permission/role requirements and audits every decision.
#[derive(Clone)]
pub struct PermissionEngine {
    service: String,
    audit: Arc<dyn AuditSink>,
}

impl PermissionEngine {
    /// `service` names the component doing the checking; it keys the audit trail.
    pub fn new(service: impl Into<String>, audit: Arc<dyn AuditSink>) -> Self {
        Self {
            service: service.into(),
            audit,
        }
    }

    pub fn check_permission(&self, identity: &Identity, required: &str) -> bool {
        let granted = identity.has_permission(required);
        self.record(identity, "permission_check", granted, format!("permission={required}"));
        granted
    }

    pub fn check_role(&self, identity: &Identity, required: &str) -> bool {
        let granted = identity.has_role(required);
        self.record(identity, "role_check", granted, format!("role={required}"));
        granted
    }

    /// Enforce a route policy: every requirement present must hold.
    pub fn enforce(&self, identity: &Identity, policy: &RouteAuthPolicy) -> Result<(), AuthError> {
        if let Some(role) = policy.role.as_deref() {
            if !self.check_role(identity, role) {
                return Err(AuthError::MissingRole(role.to_string()));
            }
        }
        if let Some(permission) = policy.permission.as_deref() {
            if !self.check_permission(identity, permission) {
                return Err(AuthError::MissingPermission(permission.to_string()));
            }
        }
        Ok(())
    }

    fn record(&self, identity: &Identity, action: &str, granted: bool, detail: String) {
        debug!(action, granted, detail = %detail, "authorization check");
        let outcome = if granted {
            AuditOutcome::Allowed
        } else {
            AuditOutcome::Denied
        };
        self.audit.record(
            AuditEvent::new(action, outcome)
                .service(self.service.clone())
                .user(identity.user_id.clone())
                .detail(detail),
        );
    }
}
