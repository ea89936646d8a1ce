use crate::auth::middleware::{Authenticated, ClientIp};
use crate::auth::tokens::{TokenMetadata, TokenPair};
use crate::database::entities::RevocationReason;
use crate::error::AuthError;
use crate::server::Server;
use axum::{
    Json, Router,
    extract::State,
    http::{HeaderMap, StatusCode, header::USER_AGENT},
    routing::post,
};
use serde::{Deserialize, Serialize};
use std::net::IpAddr;
use utoipa::ToSchema;

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct RefreshRequest {
    pub refresh_token: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct TokenPairResponse {
    pub access_token: String,
    pub refresh_token: String,
    pub token_type: String,
    pub expires_in: u64,
}

impl From<TokenPair> for TokenPairResponse {
    fn from(pair: TokenPair) -> Self {
        Self {
            access_token: pair.access_token,
            refresh_token: pair.refresh_token,
            token_type: "Bearer".to_string(),
            expires_in: pair.expires_in,
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct RevokedResponse {
    pub revoked: u64,
}

fn request_metadata(headers: &HeaderMap, ip: Option<IpAddr>) -> TokenMetadata {
    TokenMetadata {
        ip_address: ip.map(|ip| ip.to_string()),
        user_agent: headers
            .get(USER_AGENT)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string),
    }
}

/// Rotate a refresh token into a fresh access/refresh pair.
pub async fn refresh(
    State(server): State<Server>,
    ClientIp(ip): ClientIp,
    headers: HeaderMap,
    Json(request): Json<RefreshRequest>,
) -> Result<Json<TokenPairResponse>, AuthError> {
    let metadata = request_metadata(&headers, ip);
    let pair = server
        .token_service
        .refresh_tokens(&request.refresh_token, &metadata)
        .await?;

    Ok(Json(pair.into()))
}

/// Revoke a single refresh token, ending that session.
pub async fn revoke(
    State(server): State<Server>,
    ClientIp(ip): ClientIp,
    headers: HeaderMap,
    Json(request): Json<RefreshRequest>,
) -> Result<StatusCode, AuthError> {
    let metadata = request_metadata(&headers, ip);
    server
        .token_service
        .revoke_refresh_token(&request.refresh_token, RevocationReason::Logout, &metadata)
        .await?;

    Ok(StatusCode::NO_CONTENT)
}

/// Revoke every refresh token of the authenticated user.
pub async fn logout(
    State(server): State<Server>,
    Authenticated(context): Authenticated,
) -> Result<Json<RevokedResponse>, AuthError> {
    let metadata = TokenMetadata {
        ip_address: context.ip_address.clone(),
        user_agent: context.user_agent.clone(),
    };
    let revoked = server
        .token_service
        .revoke_all_user_tokens(context.user_id, RevocationReason::Logout, &metadata)
        .await?;

    Ok(Json(RevokedResponse { revoked }))
}

/// Unauthenticated token endpoints, gated by the auth rate-limit category.
pub fn create_auth_routes() -> Router<Server> {
    Router::new()
        .route("/auth/refresh", post(refresh))
        .route("/auth/revoke", post(revoke))
}

/// Endpoints that act on the authenticated session.
pub fn create_session_routes() -> Router<Server> {
    Router::new().route("/auth/logout", post(logout))
}
