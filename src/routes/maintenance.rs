use crate::auth::middleware::CurrentUser;
use crate::error::AuthError;
use crate::server::Server;
use axum::{Json, Router, extract::State, routing::post};
use serde::{Deserialize, Serialize};
use tracing::info;
use utoipa::ToSchema;

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct CleanupResponse {
    pub expired_tokens_removed: u64,
    pub audit_records_removed: u64,
    pub rate_limit_entries_removed: u64,
}

/// On-demand run of the same cleanups the scheduled jobs perform.
pub async fn run_cleanup(
    State(server): State<Server>,
    _user: CurrentUser,
) -> Result<Json<CleanupResponse>, AuthError> {
    let expired_tokens_removed = server.database.refresh_tokens().cleanup_expired().await?;
    let audit_records_removed = server.audit.cleanup_expired().await?;
    let rate_limit_entries_removed = server.rate_limiter.sweep() as u64;

    info!(
        expired_tokens_removed,
        audit_records_removed, rate_limit_entries_removed, "On-demand cleanup finished"
    );

    Ok(Json(CleanupResponse {
        expired_tokens_removed,
        audit_records_removed,
        rate_limit_entries_removed,
    }))
}

pub fn create_maintenance_routes() -> Router<Server> {
    Router::new().route("/admin/maintenance/cleanup", post(run_cleanup))
}
