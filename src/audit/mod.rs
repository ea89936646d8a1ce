//! Security audit ledger.
//!
//! Events are append-only and classified by a fixed severity table. A
//! failed audit write is logged locally and swallowed; it never aborts the
//! operation that produced the event.

use crate::database::entities::{AuditAction, AuditRecord, Role, UserRecord};
use crate::database::{AuditLogDraft, AuditLogQueryParams, DatabaseManager};
use crate::error::AuthError;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use sea_orm::ActiveEnum;
use serde::Serialize;
use serde_json::Value;
use std::{collections::HashMap, sync::Arc};
use tracing::warn;
use utoipa::ToSchema;

pub const DEFAULT_RETENTION_DAYS: u32 = 365;

/// Actor snapshot recorded with every event. Taken at event time, not a
/// live reference.
#[derive(Debug, Clone, Default)]
pub struct AuditContext {
    pub user_id: Option<i32>,
    pub username: Option<String>,
    pub role: Option<Role>,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
}

impl AuditContext {
    pub fn for_user(user: &UserRecord) -> Self {
        Self {
            user_id: Some(user.id),
            username: Some(user.username.clone()),
            role: Some(user.role),
            ..Default::default()
        }
    }

    pub fn anonymous(ip_address: Option<String>, user_agent: Option<String>) -> Self {
        Self {
            ip_address,
            user_agent,
            ..Default::default()
        }
    }

    pub fn with_client(mut self, ip_address: Option<String>, user_agent: Option<String>) -> Self {
        self.ip_address = ip_address;
        self.user_agent = user_agent;
        self
    }
}

#[derive(Debug, Clone, Default)]
pub struct AuditDetails {
    pub resource: Option<String>,
    pub before_state: Option<Value>,
    pub after_state: Option<Value>,
    pub error_message: Option<String>,
}

impl AuditDetails {
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            error_message: Some(message.into()),
            ..Default::default()
        }
    }

    pub fn states(before: Value, after: Value) -> Self {
        Self {
            before_state: Some(before),
            after_state: Some(after),
            ..Default::default()
        }
    }
}

/// One page of query results.
#[derive(Debug, Clone, Serialize)]
pub struct AuditPage {
    pub records: Vec<AuditRecord>,
    pub total: u64,
    pub limit: u64,
    pub offset: u64,
}

/// Aggregate counts for reporting.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct AuditStats {
    pub by_action: HashMap<String, i64>,
    pub by_severity: HashMap<String, i64>,
}

pub struct AuditService {
    database: Arc<dyn DatabaseManager>,
    retention_days: u32,
}

impl AuditService {
    pub fn new(database: Arc<dyn DatabaseManager>, retention_days: u32) -> Self {
        Self {
            database,
            retention_days,
        }
    }

    pub fn retention_days(&self) -> u32 {
        self.retention_days
    }

    /// Append an event. Severity comes from the fixed classification
    /// table; persistence failures are logged and swallowed.
    pub async fn log_event(
        &self,
        action: AuditAction,
        context: &AuditContext,
        success: bool,
        details: AuditDetails,
    ) {
        let draft = AuditLogDraft {
            action,
            severity: action.severity(),
            user_id: context.user_id,
            username: context.username.clone(),
            actor_role: context.role,
            ip_address: context.ip_address.clone(),
            user_agent: context.user_agent.clone(),
            resource: details.resource,
            before_state: details.before_state.map(|v| v.to_string()),
            after_state: details.after_state.map(|v| v.to_string()),
            success,
            error_message: details.error_message,
            expires_at: Utc::now() + ChronoDuration::days(self.retention_days as i64),
        };

        if let Err(e) = self.database.audit_logs().store(draft).await {
            warn!(action = ?action, "Failed to store audit log entry: {}", e);
        }
    }

    pub async fn log_success(&self, action: AuditAction, context: &AuditContext) {
        self.log_event(action, context, true, AuditDetails::default())
            .await;
    }

    pub async fn log_failure(
        &self,
        action: AuditAction,
        context: &AuditContext,
        error: impl Into<String>,
    ) {
        self.log_event(action, context, false, AuditDetails::error(error))
            .await;
    }

    /// Filterable, paginated query surface.
    pub async fn query(&self, mut params: AuditLogQueryParams) -> Result<AuditPage, AuthError> {
        params.limit = Some(params.limit.unwrap_or(50).clamp(1, 1000));
        params.offset = Some(params.offset.unwrap_or(0));

        let dao = self.database.audit_logs();
        let total = dao.count_all(&params).await?;
        let records = dao.find_all(&params).await?;

        Ok(AuditPage {
            records,
            total,
            limit: params.limit.unwrap_or(50),
            offset: params.offset.unwrap_or(0),
        })
    }

    /// Aggregate counts by action and severity.
    pub async fn stats(
        &self,
        start_date: Option<DateTime<Utc>>,
        end_date: Option<DateTime<Utc>>,
    ) -> Result<AuditStats, AuthError> {
        let dao = self.database.audit_logs();

        let by_action = dao
            .counts_by_action(start_date, end_date)
            .await?
            .into_iter()
            .map(|(action, count)| (action.to_value(), count))
            .collect();

        let by_severity = dao
            .counts_by_severity(start_date, end_date)
            .await?
            .into_iter()
            .map(|(severity, count)| (severity.to_value(), count))
            .collect();

        Ok(AuditStats {
            by_action,
            by_severity,
        })
    }

    /// Purge records past their retention expiry. Exposed both as a
    /// scheduled job and as an on-demand operation.
    pub async fn cleanup_expired(&self) -> Result<u64, AuthError> {
        let removed = self.database.audit_logs().cleanup_expired().await?;
        Ok(removed)
    }
}
