use super::{Job, JobResult};
use crate::{
    audit::AuditService, database::DatabaseManager, error::AuthError, rate_limit::RateLimitService,
};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::info;

/// Purges refresh tokens past their expiry, ending their chains.
pub struct TokenCleanupJob {
    database: Arc<dyn DatabaseManager>,
}

impl TokenCleanupJob {
    pub fn new(database: Arc<dyn DatabaseManager>) -> Self {
        Self { database }
    }
}

#[async_trait]
impl Job for TokenCleanupJob {
    fn name(&self) -> &str {
        "token_cleanup"
    }

    async fn execute(&self) -> Result<JobResult, AuthError> {
        let removed = self.database.refresh_tokens().cleanup_expired().await?;
        info!("Removed {} expired refresh tokens", removed);
        Ok(JobResult::success_with_count(removed))
    }
}

/// Purges audit records whose retention window has elapsed.
pub struct AuditRetentionJob {
    audit: Arc<AuditService>,
}

impl AuditRetentionJob {
    pub fn new(audit: Arc<AuditService>) -> Self {
        Self { audit }
    }
}

#[async_trait]
impl Job for AuditRetentionJob {
    fn name(&self) -> &str {
        "audit_retention"
    }

    async fn execute(&self) -> Result<JobResult, AuthError> {
        let removed = self.audit.cleanup_expired().await?;
        info!(
            "Removed {} audit records past the {}-day retention window",
            removed,
            self.audit.retention_days()
        );
        Ok(JobResult::success_with_count(removed))
    }
}

/// Drops stale rate-limit counters and expired blacklist entries.
pub struct RateLimitSweepJob {
    limiter: Arc<RateLimitService>,
}

impl RateLimitSweepJob {
    pub fn new(limiter: Arc<RateLimitService>) -> Self {
        Self { limiter }
    }
}

#[async_trait]
impl Job for RateLimitSweepJob {
    fn name(&self) -> &str {
        "rate_limit_sweep"
    }

    async fn execute(&self) -> Result<JobResult, AuthError> {
        let removed = self.limiter.sweep();
        Ok(JobResult::success_with_count(removed as u64))
    }
}
