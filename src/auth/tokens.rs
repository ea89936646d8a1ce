//! Refresh-token ledger: issuance, rotation, and reuse detection.
//!
//! Tokens form per-user chains linked through `replaces`/`replaced_by`
//! ids. A token refreshes exactly once; presenting a superseded token
//! again is treated as credential theft and revokes the entire chain.

use crate::audit::{AuditContext, AuditDetails, AuditService};
use crate::auth::jwt::TokenIssuer;
use crate::database::entities::{AuditAction, RefreshTokenRecord, RevocationReason, UserRecord};
use crate::database::{DatabaseManager, NewRefreshToken};
use crate::error::{AuthError, SecurityViolation};
use chrono::{Duration as ChronoDuration, Utc};
use metrics::counter;
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::sync::Arc;
use tracing::warn;
use uuid::Uuid;

/// Client-supplied request metadata stored with each token and echoed
/// into audit events.
#[derive(Debug, Clone, Default)]
pub struct TokenMetadata {
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
    /// Access-token lifetime in seconds
    pub expires_in: u64,
}

/// Hash a raw refresh token for storage and lookup. Only this digest is
/// ever persisted.
pub fn hash_refresh_token(raw: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(raw.as_bytes());
    format!("{:x}", hasher.finalize())
}

fn generate_refresh_value() -> String {
    format!("{}{}", Uuid::new_v4().simple(), Uuid::new_v4().simple())
}

pub struct TokenService {
    database: Arc<dyn DatabaseManager>,
    issuer: Arc<dyn TokenIssuer>,
    audit: Arc<AuditService>,
    refresh_ttl: ChronoDuration,
}

impl TokenService {
    pub fn new(
        database: Arc<dyn DatabaseManager>,
        issuer: Arc<dyn TokenIssuer>,
        audit: Arc<AuditService>,
        refresh_token_ttl_days: i64,
    ) -> Self {
        Self {
            database,
            issuer,
            audit,
            refresh_ttl: ChronoDuration::days(refresh_token_ttl_days),
        }
    }

    /// Issue a fresh access/refresh pair for a login. Starts a new chain.
    pub async fn generate_token_pair(
        &self,
        user_id: i32,
        metadata: &TokenMetadata,
    ) -> Result<TokenPair, AuthError> {
        let user = self
            .database
            .users()
            .find_by_id(user_id)
            .await?
            .ok_or_else(|| AuthError::BadRequest(format!("Unknown user: {user_id}")))?;

        let context = AuditContext::for_user(&user)
            .with_client(metadata.ip_address.clone(), metadata.user_agent.clone());

        if !user.is_active {
            self.audit
                .log_failure(AuditAction::Login, &context, "inactive account")
                .await;
            return Err(AuthError::SecurityViolation(
                SecurityViolation::InactiveUserAccess,
            ));
        }

        let pair = self.issue_pair(&user, None, metadata).await?;

        if let Err(e) = self.database.users().touch_last_login(user.id).await {
            warn!(user_id = %user.id, "Failed to update last login: {}", e);
        }
        self.audit.log_success(AuditAction::Login, &context).await;

        Ok(pair)
    }

    /// Validate a presented refresh token: it must exist, be non-revoked,
    /// and non-expired. Reuse detection runs here: a token revoked by
    /// rotation is a replay and triggers chain revocation.
    pub async fn validate(
        &self,
        raw_token: &str,
        metadata: &TokenMetadata,
    ) -> Result<RefreshTokenRecord, AuthError> {
        let hash = hash_refresh_token(raw_token);
        let token = self
            .database
            .refresh_tokens()
            .find_by_hash(&hash)
            .await?
            .ok_or(AuthError::InvalidToken)?;

        if token.is_superseded() {
            return Err(self.handle_reuse(&token, metadata).await);
        }

        if token.revoked || token.is_expired() {
            return Err(AuthError::InvalidToken);
        }

        self.database
            .refresh_tokens()
            .touch_last_used(token.id)
            .await?;

        Ok(token)
    }

    /// Rotate a valid refresh token into a successor pair. The presented
    /// token is revoked with reason `rotated` in the same transaction that
    /// creates its replacement.
    pub async fn refresh_tokens(
        &self,
        raw_token: &str,
        metadata: &TokenMetadata,
    ) -> Result<TokenPair, AuthError> {
        let anonymous =
            AuditContext::anonymous(metadata.ip_address.clone(), metadata.user_agent.clone());

        let token = match self.validate(raw_token, metadata).await {
            Ok(token) => token,
            Err(e) => {
                self.audit
                    .log_failure(AuditAction::TokenRefresh, &anonymous, e.to_string())
                    .await;
                return Err(e);
            }
        };

        let user = self
            .database
            .users()
            .find_by_id(token.user_id)
            .await?
            .ok_or(AuthError::InvalidToken)?;

        let context = AuditContext::for_user(&user)
            .with_client(metadata.ip_address.clone(), metadata.user_agent.clone());

        if !user.is_active {
            self.audit
                .log_failure(AuditAction::TokenRefresh, &context, "inactive account")
                .await;
            return Err(AuthError::SecurityViolation(
                SecurityViolation::InactiveUserAccess,
            ));
        }

        let pair = self.issue_pair(&user, Some(token.id), metadata).await?;
        self.audit
            .log_success(AuditAction::TokenRefresh, &context)
            .await;

        Ok(pair)
    }

    /// Manually revoke a single refresh token.
    pub async fn revoke_refresh_token(
        &self,
        raw_token: &str,
        reason: RevocationReason,
        metadata: &TokenMetadata,
    ) -> Result<(), AuthError> {
        let hash = hash_refresh_token(raw_token);
        let token = self
            .database
            .refresh_tokens()
            .find_by_hash(&hash)
            .await?
            .ok_or(AuthError::InvalidToken)?;

        self.database.refresh_tokens().revoke(token.id, reason).await?;

        let context = AuditContext {
            user_id: Some(token.user_id),
            ip_address: metadata.ip_address.clone(),
            user_agent: metadata.user_agent.clone(),
            ..Default::default()
        };
        self.audit
            .log_event(
                AuditAction::TokenRevoke,
                &context,
                true,
                AuditDetails {
                    resource: Some(format!("refresh_token:{}", token.id)),
                    ..Default::default()
                },
            )
            .await;

        Ok(())
    }

    /// Revoke every live token a user holds, e.g. on logout-everywhere or
    /// an administrative lockout.
    pub async fn revoke_all_user_tokens(
        &self,
        user_id: i32,
        reason: RevocationReason,
        metadata: &TokenMetadata,
    ) -> Result<u64, AuthError> {
        let revoked = self
            .database
            .refresh_tokens()
            .revoke_all_for_user(user_id, reason)
            .await?;

        let action = match reason {
            RevocationReason::Logout => AuditAction::Logout,
            _ => AuditAction::TokenRevoke,
        };
        let context = AuditContext {
            user_id: Some(user_id),
            ip_address: metadata.ip_address.clone(),
            user_agent: metadata.user_agent.clone(),
            ..Default::default()
        };
        self.audit
            .log_event(
                action,
                &context,
                true,
                AuditDetails {
                    after_state: Some(serde_json::json!({ "revoked_count": revoked })),
                    ..Default::default()
                },
            )
            .await;

        Ok(revoked)
    }

    async fn issue_pair(
        &self,
        user: &UserRecord,
        rotate_from: Option<i32>,
        metadata: &TokenMetadata,
    ) -> Result<TokenPair, AuthError> {
        let raw = generate_refresh_value();
        let new_token = NewRefreshToken {
            token_hash: hash_refresh_token(&raw),
            user_id: user.id,
            expires_at: Utc::now() + self.refresh_ttl,
            replaces_token_id: rotate_from,
            ip_address: metadata.ip_address.clone(),
            user_agent: metadata.user_agent.clone(),
        };

        match rotate_from {
            Some(old_id) => {
                self.database
                    .refresh_tokens()
                    .rotate(old_id, new_token)
                    .await?
            }
            None => self.database.refresh_tokens().create(new_token).await?,
        };

        let access_token = self.issuer.mint(user.id, user.role)?;

        Ok(TokenPair {
            access_token,
            refresh_token: raw,
            expires_in: self.issuer.access_ttl_secs(),
        })
    }

    /// A superseded token was presented: legitimate clients always hold
    /// the newest token in a chain, so this is evidence of theft. Revoke
    /// every chain member and emit a critical audit event.
    async fn handle_reuse(
        &self,
        token: &RefreshTokenRecord,
        metadata: &TokenMetadata,
    ) -> AuthError {
        counter!("token_reuse_detected_total").increment(1);
        warn!(
            user_id = %token.user_id,
            token_id = %token.id,
            "Superseded refresh token presented; revoking chain"
        );

        let dao = self.database.refresh_tokens();
        let chain_length = match dao.chain_members(token).await {
            Ok(chain) => {
                for member in chain.iter().filter(|m| !m.revoked) {
                    if let Err(e) = dao.revoke(member.id, RevocationReason::ReuseDetected).await {
                        warn!(token_id = %member.id, "Failed to revoke chain member: {}", e);
                    }
                }
                chain.len()
            }
            Err(e) => {
                // Fail safe: when the chain cannot be read, pull every
                // token the user holds.
                warn!(user_id = %token.user_id, "Chain walk failed, revoking all user tokens: {}", e);
                if let Err(e) = dao
                    .revoke_all_for_user(token.user_id, RevocationReason::ReuseDetected)
                    .await
                {
                    warn!(user_id = %token.user_id, "Failed to revoke user tokens: {}", e);
                }
                0
            }
        };

        let context = AuditContext {
            user_id: Some(token.user_id),
            ip_address: metadata.ip_address.clone(),
            user_agent: metadata.user_agent.clone(),
            ..Default::default()
        };
        self.audit
            .log_event(
                AuditAction::TokenReuse,
                &context,
                false,
                AuditDetails {
                    resource: Some(format!("refresh_token:{}", token.id)),
                    after_state: Some(serde_json::json!({ "revoked_chain_length": chain_length })),
                    error_message: Some("superseded refresh token replayed".to_string()),
                    ..Default::default()
                },
            )
            .await;

        AuthError::TokenReuseDetected
    }
}
