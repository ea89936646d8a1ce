use crate::audit::AuditStats;
use crate::auth::middleware::CurrentUser;
use crate::database::AuditLogQueryParams;
use crate::database::entities::{AuditAction, AuditRecord, AuditSeverity, Role};
use crate::error::AuthError;
use crate::routes::ApiErrorResponse;
use crate::server::Server;
use axum::{
    Json, Router,
    extract::{Query, State},
    routing::get,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, OpenApi, ToSchema};

/// Admin audit log API endpoints
#[derive(OpenApi)]
#[openapi(
    paths(get_audit_logs, get_audit_stats),
    components(schemas(
        AuditLogEntry,
        AuditLogsResponse,
        AuditLogQueryParams,
        AuditStats,
        ApiErrorResponse,
    )),
    tags(
        (name = "admin-audit", description = "Admin audit log operations")
    )
)]
pub struct AdminAuditApi;

/// Audit log entry for API responses
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct AuditLogEntry {
    pub id: i32,
    pub action: AuditAction,
    pub severity: AuditSeverity,
    /// Actor user id (nullable for anonymous events)
    pub user_id: Option<i32>,
    /// Actor username snapshot
    pub username: Option<String>,
    /// Actor role snapshot
    pub actor_role: Option<Role>,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    pub resource: Option<String>,
    /// State before the change, as JSON
    pub before_state: Option<serde_json::Value>,
    /// State after the change, as JSON
    pub after_state: Option<serde_json::Value>,
    pub success: bool,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl From<AuditRecord> for AuditLogEntry {
    fn from(record: AuditRecord) -> Self {
        let parse = |raw: Option<String>| raw.and_then(|s| serde_json::from_str(&s).ok());

        Self {
            id: record.id,
            action: record.action,
            severity: record.severity,
            user_id: record.user_id,
            username: record.username,
            actor_role: record.actor_role,
            ip_address: record.ip_address,
            user_agent: record.user_agent,
            resource: record.resource,
            before_state: parse(record.before_state),
            after_state: parse(record.after_state),
            success: record.success,
            error_message: record.error_message,
            created_at: record.created_at,
        }
    }
}

/// Response for audit log queries
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct AuditLogsResponse {
    pub logs: Vec<AuditLogEntry>,
    /// Total number of matching records
    pub total: u64,
    pub offset: u64,
    pub limit: u64,
}

#[derive(Debug, Default, Deserialize, IntoParams)]
pub struct StatsQueryParams {
    /// Events at or after this instant
    pub start_date: Option<DateTime<Utc>>,
    /// Events at or before this instant
    pub end_date: Option<DateTime<Utc>>,
}

/// Query audit logs with filtering and pagination
#[utoipa::path(
    get,
    path = "/admin/audit-logs",
    params(AuditLogQueryParams),
    responses(
        (status = 200, description = "Audit logs retrieved successfully", body = AuditLogsResponse),
        (status = 400, description = "Invalid query parameters", body = ApiErrorResponse),
        (status = 401, description = "Authentication required", body = ApiErrorResponse),
        (status = 403, description = "Admin access required", body = ApiErrorResponse),
    ),
    security(("bearer_auth" = [])),
    tag = "admin-audit"
)]
pub async fn get_audit_logs(
    State(server): State<Server>,
    Query(params): Query<AuditLogQueryParams>,
    _user: CurrentUser,
) -> Result<Json<AuditLogsResponse>, AuthError> {
    if let (Some(start), Some(end)) = (params.start_date, params.end_date) {
        if start > end {
            return Err(AuthError::BadRequest(
                "start_date must be before end_date".to_string(),
            ));
        }
    }

    let page = server.audit.query(params).await?;

    Ok(Json(AuditLogsResponse {
        logs: page.records.into_iter().map(AuditLogEntry::from).collect(),
        total: page.total,
        offset: page.offset,
        limit: page.limit,
    }))
}

/// Aggregate audit event counts by action and severity
#[utoipa::path(
    get,
    path = "/admin/audit-logs/stats",
    params(StatsQueryParams),
    responses(
        (status = 200, description = "Aggregated audit counts", body = AuditStats),
        (status = 401, description = "Authentication required", body = ApiErrorResponse),
        (status = 403, description = "Admin access required", body = ApiErrorResponse),
    ),
    security(("bearer_auth" = [])),
    tag = "admin-audit"
)]
pub async fn get_audit_stats(
    State(server): State<Server>,
    Query(params): Query<StatsQueryParams>,
    _user: CurrentUser,
) -> Result<Json<AuditStats>, AuthError> {
    let stats = server
        .audit
        .stats(params.start_date, params.end_date)
        .await?;

    Ok(Json(stats))
}

/// Admin audit log routes; callers must stack the admin guard on top.
pub fn create_admin_audit_routes() -> Router<Server> {
    Router::new()
        .route("/admin/audit-logs", get(get_audit_logs))
        .route("/admin/audit-logs/stats", get(get_audit_stats))
}
