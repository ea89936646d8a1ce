use crate::health::{HealthReport, HealthStatus};
use crate::server::Server;
use axum::{Json, Router, extract::State, http::StatusCode, routing::get};

pub async fn health(State(server): State<Server>) -> (StatusCode, Json<HealthReport>) {
    let report = server.health_service.check_all().await;
    let status = match report.status {
        HealthStatus::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
        _ => StatusCode::OK,
    };

    (status, Json(report))
}

pub fn create_health_routes() -> Router<Server> {
    Router::new().route("/health", get(health))
}
