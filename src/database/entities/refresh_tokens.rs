use chrono::{DateTime, Utc};
use sea_orm::{entity::prelude::*, sea_query::StringLen};
use serde::{Deserialize, Serialize};

/// Why a refresh token stopped being usable. Rotation is the only reason
/// that marks the token as superseded rather than terminated; presenting a
/// rotated token again is treated as replay.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, EnumIter, DeriveActiveEnum, Serialize, Deserialize,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(24))")]
pub enum RevocationReason {
    #[sea_orm(string_value = "rotated")]
    Rotated,
    #[sea_orm(string_value = "logout")]
    Logout,
    #[sea_orm(string_value = "admin_revoked")]
    AdminRevoked,
    #[sea_orm(string_value = "reuse_detected")]
    ReuseDetected,
}

/// One link of a per-user rotation chain. Only the token's hash is stored;
/// the raw value never touches the database. Chain membership is expressed
/// through `replaces_token_id` / `replaced_by_token_id` back-references.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Eq, Serialize, Deserialize)]
#[sea_orm(table_name = "refresh_tokens")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    #[sea_orm(unique)]
    pub token_hash: String,
    pub user_id: i32,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub last_used_at: Option<DateTime<Utc>>,
    pub revoked: bool,
    pub revoked_at: Option<DateTime<Utc>>,
    pub revoked_reason: Option<RevocationReason>,
    pub replaces_token_id: Option<i32>,
    pub replaced_by_token_id: Option<i32>,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

impl Model {
    pub fn is_expired(&self) -> bool {
        self.expires_at <= Utc::now()
    }

    /// A token is usable when it is neither revoked nor expired. The chain
    /// invariant guarantees at most one such member per chain.
    pub fn is_usable(&self) -> bool {
        !self.revoked && !self.is_expired()
    }

    /// Revoked specifically because it was rotated away, i.e. superseded.
    pub fn is_superseded(&self) -> bool {
        self.revoked && self.revoked_reason == Some(RevocationReason::Rotated)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn token() -> Model {
        Model {
            id: 1,
            token_hash: "hash".to_string(),
            user_id: 7,
            created_at: Utc::now(),
            expires_at: Utc::now() + Duration::days(30),
            last_used_at: None,
            revoked: false,
            revoked_at: None,
            revoked_reason: None,
            replaces_token_id: None,
            replaced_by_token_id: None,
            ip_address: None,
            user_agent: None,
        }
    }

    #[test]
    fn test_fresh_token_is_usable() {
        assert!(token().is_usable());
        assert!(!token().is_superseded());
    }

    #[test]
    fn test_expired_token_is_not_usable() {
        let mut t = token();
        t.expires_at = Utc::now() - Duration::seconds(1);
        assert!(!t.is_usable());
    }

    #[test]
    fn test_only_rotation_marks_superseded() {
        let mut t = token();
        t.revoked = true;
        t.revoked_reason = Some(RevocationReason::Logout);
        assert!(!t.is_superseded());

        t.revoked_reason = Some(RevocationReason::Rotated);
        assert!(t.is_superseded());
    }
}
