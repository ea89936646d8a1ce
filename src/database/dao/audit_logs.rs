use crate::database::entities::{AuditAction, AuditRecord, AuditSeverity, Role, audit_logs};
use crate::database::{DatabaseError, DatabaseResult};
use chrono::{DateTime, Utc};
use sea_orm::{
    ActiveModelTrait, ActiveValue, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter,
    QueryOrder, QuerySelect, Select, Set,
};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

/// Everything an audit record carries except its id and timestamps.
#[derive(Debug, Clone)]
pub struct AuditLogDraft {
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
    pub expires_at: DateTime<Utc>,
}

/// Filter set for the audit query surface.
#[derive(Debug, Clone, Default, Serialize, Deserialize, IntoParams, ToSchema)]
pub struct AuditLogQueryParams {
    /// Filter by actor user id
    pub user_id: Option<i32>,
    /// Filter by action
    pub action: Option<AuditAction>,
    /// Filter by severity
    pub severity: Option<AuditSeverity>,
    /// Filter by actor IP address
    pub ip_address: Option<String>,
    /// Filter by outcome
    pub success: Option<bool>,
    /// Events at or after this instant
    pub start_date: Option<DateTime<Utc>>,
    /// Events at or before this instant
    pub end_date: Option<DateTime<Utc>>,
    /// Page size (1..=1000)
    pub limit: Option<u64>,
    /// Page offset
    pub offset: Option<u64>,
}

/// Audit logs DAO. Records are append-only; the only mutation is the
/// retention purge.
pub struct AuditLogsDao {
    db: DatabaseConnection,
}

impl AuditLogsDao {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    pub async fn store(&self, draft: AuditLogDraft) -> DatabaseResult<()> {
        let active_model = audit_logs::ActiveModel {
            id: ActiveValue::NotSet,
            action: Set(draft.action),
            severity: Set(draft.severity),
            user_id: Set(draft.user_id),
            username: Set(draft.username),
            actor_role: Set(draft.actor_role),
            ip_address: Set(draft.ip_address),
            user_agent: Set(draft.user_agent),
            resource: Set(draft.resource),
            before_state: Set(draft.before_state),
            after_state: Set(draft.after_state),
            success: Set(draft.success),
            error_message: Set(draft.error_message),
            created_at: Set(Utc::now()),
            expires_at: Set(draft.expires_at),
        };

        active_model
            .insert(&self.db)
            .await
            .map_err(|e| DatabaseError::Database(e.to_string()))?;

        Ok(())
    }

    fn apply_filters(
        mut query: Select<audit_logs::Entity>,
        params: &AuditLogQueryParams,
    ) -> Select<audit_logs::Entity> {
        if let Some(user_id) = params.user_id {
            query = query.filter(audit_logs::Column::UserId.eq(user_id));
        }
        if let Some(action) = params.action {
            query = query.filter(audit_logs::Column::Action.eq(action));
        }
        if let Some(severity) = params.severity {
            query = query.filter(audit_logs::Column::Severity.eq(severity));
        }
        if let Some(ip_address) = &params.ip_address {
            query = query.filter(audit_logs::Column::IpAddress.eq(ip_address.clone()));
        }
        if let Some(success) = params.success {
            query = query.filter(audit_logs::Column::Success.eq(success));
        }
        if let Some(start) = params.start_date {
            query = query.filter(audit_logs::Column::CreatedAt.gte(start));
        }
        if let Some(end) = params.end_date {
            query = query.filter(audit_logs::Column::CreatedAt.lte(end));
        }
        query
    }

    pub async fn find_all(&self, params: &AuditLogQueryParams) -> DatabaseResult<Vec<AuditRecord>> {
        Self::apply_filters(audit_logs::Entity::find(), params)
            .order_by_desc(audit_logs::Column::CreatedAt)
            .limit(params.limit)
            .offset(params.offset)
            .all(&self.db)
            .await
            .map_err(|e| DatabaseError::Database(e.to_string()))
    }

    pub async fn count_all(&self, params: &AuditLogQueryParams) -> DatabaseResult<u64> {
        use sea_orm::PaginatorTrait;

        Self::apply_filters(audit_logs::Entity::find(), params)
            .count(&self.db)
            .await
            .map_err(|e| DatabaseError::Database(e.to_string()))
    }

    pub async fn counts_by_action(
        &self,
        start_date: Option<DateTime<Utc>>,
        end_date: Option<DateTime<Utc>>,
    ) -> DatabaseResult<Vec<(AuditAction, i64)>> {
        let mut query = audit_logs::Entity::find();
        if let Some(start) = start_date {
            query = query.filter(audit_logs::Column::CreatedAt.gte(start));
        }
        if let Some(end) = end_date {
            query = query.filter(audit_logs::Column::CreatedAt.lte(end));
        }

        query
            .select_only()
            .column(audit_logs::Column::Action)
            .column_as(audit_logs::Column::Id.count(), "count")
            .group_by(audit_logs::Column::Action)
            .into_tuple()
            .all(&self.db)
            .await
            .map_err(|e| DatabaseError::Database(e.to_string()))
    }

    pub async fn counts_by_severity(
        &self,
        start_date: Option<DateTime<Utc>>,
        end_date: Option<DateTime<Utc>>,
    ) -> DatabaseResult<Vec<(AuditSeverity, i64)>> {
        let mut query = audit_logs::Entity::find();
        if let Some(start) = start_date {
            query = query.filter(audit_logs::Column::CreatedAt.gte(start));
        }
        if let Some(end) = end_date {
            query = query.filter(audit_logs::Column::CreatedAt.lte(end));
        }

        query
            .select_only()
            .column(audit_logs::Column::Severity)
            .column_as(audit_logs::Column::Id.count(), "count")
            .group_by(audit_logs::Column::Severity)
            .into_tuple()
            .all(&self.db)
            .await
            .map_err(|e| DatabaseError::Database(e.to_string()))
    }

    /// Purge records whose retention window has elapsed.
    pub async fn cleanup_expired(&self) -> DatabaseResult<u64> {
        let result = audit_logs::Entity::delete_many()
            .filter(audit_logs::Column::ExpiresAt.lt(Utc::now()))
            .exec(&self.db)
            .await
            .map_err(|e| DatabaseError::Database(e.to_string()))?;

        Ok(result.rows_affected)
    }
}
