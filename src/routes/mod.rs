pub mod audit_logs;
pub mod auth;
pub mod health;
pub mod maintenance;

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

pub use audit_logs::create_admin_audit_routes;
pub use auth::{create_auth_routes, create_session_routes};
pub use health::create_health_routes;
pub use maintenance::create_maintenance_routes;

/// Generic error body returned by every route.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ApiErrorResponse {
    pub error: String,
}
