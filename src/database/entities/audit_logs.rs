use super::users::Role;
use chrono::{DateTime, Utc};
use sea_orm::{entity::prelude::*, sea_query::StringLen};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Security-relevant actions recorded by the audit ledger.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, EnumIter, DeriveActiveEnum, Serialize, Deserialize,
    ToSchema,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(32))")]
#[serde(rename_all = "snake_case")]
pub enum AuditAction {
    #[sea_orm(string_value = "login")]
    Login,
    #[sea_orm(string_value = "logout")]
    Logout,
    #[sea_orm(string_value = "token_refresh")]
    TokenRefresh,
    #[sea_orm(string_value = "token_reuse")]
    TokenReuse,
    #[sea_orm(string_value = "token_revoke")]
    TokenRevoke,
    #[sea_orm(string_value = "password_reset")]
    PasswordReset,
    #[sea_orm(string_value = "account_create")]
    AccountCreate,
    #[sea_orm(string_value = "account_update")]
    AccountUpdate,
    #[sea_orm(string_value = "account_delete")]
    AccountDelete,
    #[sea_orm(string_value = "role_change")]
    RoleChange,
    #[sea_orm(string_value = "system_config_change")]
    SystemConfigChange,
    #[sea_orm(string_value = "admin_access")]
    AdminAccess,
    #[sea_orm(string_value = "content_create")]
    ContentCreate,
    #[sea_orm(string_value = "content_update")]
    ContentUpdate,
    #[sea_orm(string_value = "content_delete")]
    ContentDelete,
    #[sea_orm(string_value = "rate_limit_exceeded")]
    RateLimitExceeded,
    #[sea_orm(string_value = "auth_failure")]
    AuthFailure,
    #[sea_orm(string_value = "security_violation")]
    SecurityViolation,
}

impl AuditAction {
    /// Fixed severity classification table. Token reuse is the one
    /// security event classified critical on its own.
    pub fn severity(&self) -> AuditSeverity {
        match self {
            AuditAction::RoleChange
            | AuditAction::AccountDelete
            | AuditAction::SystemConfigChange
            | AuditAction::TokenReuse => AuditSeverity::Critical,
            AuditAction::AdminAccess
            | AuditAction::AccountCreate
            | AuditAction::AccountUpdate
            | AuditAction::ContentDelete => AuditSeverity::High,
            AuditAction::Login
            | AuditAction::Logout
            | AuditAction::PasswordReset
            | AuditAction::ContentCreate
            | AuditAction::ContentUpdate => AuditSeverity::Medium,
            _ => AuditSeverity::Low,
        }
    }
}

#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    EnumIter,
    DeriveActiveEnum,
    Serialize,
    Deserialize,
    ToSchema,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(16))")]
pub enum AuditSeverity {
    #[sea_orm(string_value = "low")]
    #[serde(rename = "low")]
    Low,
    #[sea_orm(string_value = "medium")]
    #[serde(rename = "medium")]
    Medium,
    #[sea_orm(string_value = "high")]
    #[serde(rename = "high")]
    High,
    #[sea_orm(string_value = "critical")]
    #[serde(rename = "critical")]
    Critical,
}

/// Append-only audit record. Actor fields are a snapshot taken at event
/// time, not a live reference; `expires_at` drives retention.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Eq, Serialize, Deserialize)]
#[sea_orm(table_name = "audit_logs")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    pub action: AuditAction,
    pub severity: AuditSeverity,
    pub user_id: Option<i32>,
    pub username: Option<String>,
    pub actor_role: Option<Role>,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    pub resource: Option<String>,
    pub before_state: Option<String>,
    pub after_state: Option<String>,
    pub success: bool,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_critical_actions() {
        for action in [
            AuditAction::RoleChange,
            AuditAction::AccountDelete,
            AuditAction::SystemConfigChange,
            AuditAction::TokenReuse,
        ] {
            assert_eq!(action.severity(), AuditSeverity::Critical);
        }
    }

    #[test]
    fn test_high_actions() {
        for action in [
            AuditAction::AdminAccess,
            AuditAction::AccountCreate,
            AuditAction::AccountUpdate,
            AuditAction::ContentDelete,
        ] {
            assert_eq!(action.severity(), AuditSeverity::High);
        }
    }

    #[test]
    fn test_medium_actions() {
        for action in [
            AuditAction::Login,
            AuditAction::Logout,
            AuditAction::PasswordReset,
            AuditAction::ContentCreate,
            AuditAction::ContentUpdate,
        ] {
            assert_eq!(action.severity(), AuditSeverity::Medium);
        }
    }

    #[test]
    fn test_everything_else_is_low() {
        for action in [
            AuditAction::TokenRefresh,
            AuditAction::TokenRevoke,
            AuditAction::RateLimitExceeded,
            AuditAction::AuthFailure,
            AuditAction::SecurityViolation,
        ] {
            assert_eq!(action.severity(), AuditSeverity::Low);
        }
    }

    #[test]
    fn test_severity_ordering() {
        assert!(AuditSeverity::Low < AuditSeverity::Medium);
        assert!(AuditSeverity::Medium < AuditSeverity::High);
        assert!(AuditSeverity::High < AuditSeverity::Critical);
    }
}
