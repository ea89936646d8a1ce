pub mod cleanup;
pub mod scheduler;

use crate::error::AuthError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

pub use cleanup::{AuditRetentionJob, RateLimitSweepJob, TokenCleanupJob};
pub use scheduler::JobScheduler;

/// Configuration for the job system
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobsConfig {
    /// Enable/disable the internal job scheduler
    pub enabled: bool,

    /// Expired refresh-token purge
    pub token_cleanup: JobSchedule,

    /// Audit-log retention purge
    pub audit_retention: JobSchedule,

    /// Rate-limiter counter sweep
    pub rate_limit_sweep: JobSchedule,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobSchedule {
    /// Cron schedule expression (6-field format: sec min hour day month dow)
    pub schedule: String,
}

impl Default for JobsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            token_cleanup: JobSchedule {
                schedule: "0 0 3 * * *".to_string(), // Daily at 3 AM
            },
            audit_retention: JobSchedule {
                schedule: "0 30 3 * * *".to_string(), // Daily at 3:30 AM
            },
            rate_limit_sweep: JobSchedule {
                schedule: "0 */15 * * * *".to_string(), // Every 15 minutes
            },
        }
    }
}

/// Result of job execution
#[derive(Debug, Clone)]
pub struct JobResult {
    pub success: bool,
    pub message: String,
    pub items_processed: u64,
}

impl JobResult {
    pub fn success_with_count(count: u64) -> Self {
        Self {
            success: true,
            message: format!("Successfully processed {count} items"),
            items_processed: count,
        }
    }

    pub fn failure(message: String) -> Self {
        Self {
            success: false,
            message,
            items_processed: 0,
        }
    }
}

/// Trait for executable jobs
#[async_trait]
pub trait Job: Send + Sync {
    /// Get the job name for logging and schedule lookup
    fn name(&self) -> &str;

    /// Execute the job and return the result
    async fn execute(&self) -> Result<JobResult, AuthError>;
}
