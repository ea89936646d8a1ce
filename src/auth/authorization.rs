//! Role-hierarchy authorization guard.
//!
//! Token claims are never trusted alone: every guarded request re-fetches
//! the account and checks its live role and state. Any persistence error
//! during the check fails closed.

use crate::audit::{AuditContext, AuditDetails, AuditService};
use crate::database::DatabaseManager;
use crate::database::entities::{AuditAction, Role, UserRecord};
use crate::error::{AuthError, SecurityViolation};
use metrics::counter;
use serde_json::json;
use std::sync::Arc;
use tracing::warn;

/// Authorization demands a route declares. `min_role == None` means the
/// route is open to any authenticated caller.
#[derive(Debug, Clone, Copy, Default)]
pub struct RouteRequirement {
    pub min_role: Option<Role>,
    /// Sensitive routes additionally require a verified email address.
    pub sensitive: bool,
}

impl RouteRequirement {
    pub fn role(min_role: Role) -> Self {
        Self {
            min_role: Some(min_role),
            sensitive: false,
        }
    }

    pub fn sensitive_role(min_role: Role) -> Self {
        Self {
            min_role: Some(min_role),
            sensitive: true,
        }
    }
}

/// Per-request context assembled by the authentication middleware from the
/// verified access token and the connection.
#[derive(Debug, Clone)]
pub struct RequestContext {
    pub user_id: i32,
    pub token_role: Role,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
}

pub struct AuthorizationGuard {
    database: Arc<dyn DatabaseManager>,
    audit: Arc<AuditService>,
}

impl AuthorizationGuard {
    pub fn new(database: Arc<dyn DatabaseManager>, audit: Arc<AuditService>) -> Self {
        Self { database, audit }
    }

    /// Decide whether the request may proceed. Returns the live account
    /// record for routes that declared a requirement, `None` for open
    /// routes.
    pub async fn can_activate(
        &self,
        context: &RequestContext,
        requirement: &RouteRequirement,
    ) -> Result<Option<UserRecord>, AuthError> {
        let Some(min_role) = requirement.min_role else {
            return Ok(None);
        };

        let audit_base = AuditContext {
            user_id: Some(context.user_id),
            ip_address: context.ip_address.clone(),
            user_agent: context.user_agent.clone(),
            ..Default::default()
        };

        let user = match self.database.users().find_by_id(context.user_id).await {
            Ok(Some(user)) => user,
            Ok(None) => {
                counter!("authorization_denials_total", "reason" => "unknown_user").increment(1);
                self.audit
                    .log_failure(AuditAction::AuthFailure, &audit_base, "account not found")
                    .await;
                return Err(AuthError::PermissionDenied);
            }
            Err(e) => {
                // Fail closed: an unreachable account record is a denial,
                // never a pass-through.
                counter!("authorization_denials_total", "reason" => "database_error").increment(1);
                warn!(user_id = %context.user_id, "Authorization check hit database error: {}", e);
                self.audit
                    .log_failure(
                        AuditAction::SecurityViolation,
                        &audit_base,
                        format!("database error during auth: {e}"),
                    )
                    .await;
                return Err(AuthError::SecurityViolation(
                    SecurityViolation::DatabaseErrorDuringAuth,
                ));
            }
        };

        let audit_context = AuditContext::for_user(&user)
            .with_client(context.ip_address.clone(), context.user_agent.clone());

        if !user.is_active {
            counter!("authorization_denials_total", "reason" => "inactive_user").increment(1);
            self.audit
                .log_failure(
                    AuditAction::SecurityViolation,
                    &audit_context,
                    SecurityViolation::InactiveUserAccess.code(),
                )
                .await;
            return Err(AuthError::SecurityViolation(
                SecurityViolation::InactiveUserAccess,
            ));
        }

        if context.token_role != user.role {
            // The token carries a role the account no longer has; log both
            // values for the investigation trail.
            counter!("authorization_denials_total", "reason" => "role_escalation").increment(1);
            warn!(
                user_id = %user.id,
                token_role = context.token_role.as_str(),
                db_role = user.role.as_str(),
                "Token role does not match persisted role"
            );
            self.audit
                .log_event(
                    AuditAction::SecurityViolation,
                    &audit_context,
                    false,
                    AuditDetails {
                        before_state: Some(json!({
                            "token_role": context.token_role.as_str(),
                            "db_role": user.role.as_str(),
                        })),
                        error_message: Some(
                            SecurityViolation::RoleEscalationAttempt.code().to_string(),
                        ),
                        ..Default::default()
                    },
                )
                .await;
            return Err(AuthError::SecurityViolation(
                SecurityViolation::RoleEscalationAttempt,
            ));
        }

        if requirement.sensitive && !user.email_verified {
            counter!("authorization_denials_total", "reason" => "unverified_email").increment(1);
            self.audit
                .log_failure(
                    AuditAction::SecurityViolation,
                    &audit_context,
                    SecurityViolation::UnverifiedEmailAccess.code(),
                )
                .await;
            return Err(AuthError::SecurityViolation(
                SecurityViolation::UnverifiedEmailAccess,
            ));
        }

        if !user.role.meets(min_role) {
            counter!("authorization_denials_total", "reason" => "insufficient_role").increment(1);
            self.audit
                .log_failure(
                    AuditAction::AuthFailure,
                    &audit_context,
                    format!(
                        "role {} does not meet required {}",
                        user.role.as_str(),
                        min_role.as_str()
                    ),
                )
                .await;
            return Err(AuthError::PermissionDenied);
        }

        if min_role >= Role::Admin {
            self.audit
                .log_success(AuditAction::AdminAccess, &audit_context)
                .await;
        }

        Ok(Some(user))
    }
}
