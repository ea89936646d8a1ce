//! Request policy middleware, applied in fixed order:
//! rate limit -> authentication -> authorization. Each policy is an
//! explicit function invoked by the routing layer; outcomes land in the
//! audit ledger regardless of path.

use crate::audit::{AuditContext, AuditDetails};
use crate::auth::authorization::{RequestContext, RouteRequirement};
use crate::database::entities::{AuditAction, Role, UserRecord};
use crate::error::AuthError;
use crate::rate_limit::{RateLimitCategory, ip_identifier, user_identifier};
use crate::server::Server;
use axum::{
    extract::{ConnectInfo, FromRequestParts, Request, State},
    http::{
        HeaderMap, HeaderValue,
        header::{AUTHORIZATION, USER_AGENT},
        request::Parts,
    },
    middleware::Next,
    response::Response,
};
use std::convert::Infallible;
use std::net::{IpAddr, SocketAddr};

/// Determine the client IP: proxy headers first, then the socket address.
pub fn extract_client_ip(headers: &HeaderMap, socket_ip: Option<IpAddr>) -> Option<IpAddr> {
    if let Some(ip) = headers.get("X-Real-IP") {
        if let Ok(ip_str) = ip.to_str() {
            if let Ok(ip) = ip_str.parse() {
                return Some(ip);
            }
        }
    }

    if let Some(forwarded) = headers.get("X-Forwarded-For") {
        if let Ok(forwarded_str) = forwarded.to_str() {
            // First entry is the original client
            if let Some(first_ip) = forwarded_str.split(',').next() {
                if let Ok(ip) = first_ip.trim().parse() {
                    return Some(ip);
                }
            }
        }
    }

    socket_ip
}

fn client_ip_of(req: &Request) -> Option<IpAddr> {
    let socket_ip = req
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|info| info.0.ip());
    extract_client_ip(req.headers(), socket_ip)
}

fn user_agent_of(headers: &HeaderMap) -> Option<String> {
    headers
        .get(USER_AGENT)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
}

/// Infallible client-IP extractor for route handlers.
pub struct ClientIp(pub Option<IpAddr>);

impl<S> FromRequestParts<S> for ClientIp
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let socket_ip = parts
            .extensions
            .get::<ConnectInfo<SocketAddr>>()
            .map(|info| info.0.ip());
        Ok(ClientIp(extract_client_ip(&parts.headers, socket_ip)))
    }
}

async fn enforce_rate_limit(
    server: Server,
    category: RateLimitCategory,
    req: Request,
    next: Next,
) -> Result<Response, AuthError> {
    let ip = client_ip_of(&req);

    // Authenticated traffic is keyed by user, anonymous traffic by hashed
    // IP. Only IP identifiers are eligible for auto-blacklisting.
    let (identifier, is_ip_based) = match req.extensions().get::<RequestContext>() {
        Some(context) => (user_identifier(context.user_id), false),
        None => match ip {
            Some(ip) => (ip_identifier(ip), true),
            None => ("unidentified".to_string(), false),
        },
    };

    let decision = server.rate_limiter.check(&identifier, category, is_ip_based);

    if !decision.allowed {
        let context = AuditContext::anonymous(
            ip.map(|ip| ip.to_string()),
            user_agent_of(req.headers()),
        );
        server
            .audit
            .log_event(
                AuditAction::RateLimitExceeded,
                &context,
                false,
                AuditDetails {
                    resource: Some(format!("rate_limit:{}", category.as_str())),
                    ..Default::default()
                },
            )
            .await;

        return Err(AuthError::RateLimited {
            retry_after: decision.retry_after.unwrap_or_default(),
        });
    }

    let mut response = next.run(req).await;

    if let Some(remaining) = decision.remaining {
        let headers = response.headers_mut();
        if let Ok(value) = HeaderValue::from_str(&remaining.to_string()) {
            headers.insert("X-RateLimit-Remaining", value);
        }
        if let Ok(value) = HeaderValue::from_str(&decision.reset_at.timestamp().to_string()) {
            headers.insert("X-RateLimit-Reset", value);
        }
    }

    Ok(response)
}

/// Rate limit for login/refresh traffic
pub async fn auth_rate_limit(
    State(server): State<Server>,
    req: Request,
    next: Next,
) -> Result<Response, AuthError> {
    enforce_rate_limit(server, RateLimitCategory::Auth, req, next).await
}

/// Rate limit for general API traffic
pub async fn api_rate_limit(
    State(server): State<Server>,
    req: Request,
    next: Next,
) -> Result<Response, AuthError> {
    enforce_rate_limit(server, RateLimitCategory::Api, req, next).await
}

/// Rate limit for admin and account-mutating traffic
pub async fn sensitive_rate_limit(
    State(server): State<Server>,
    req: Request,
    next: Next,
) -> Result<Response, AuthError> {
    enforce_rate_limit(server, RateLimitCategory::Sensitive, req, next).await
}

/// Verify the bearer access token and attach a `RequestContext` for the
/// authorization layer.
pub async fn authenticate(
    State(server): State<Server>,
    mut req: Request,
    next: Next,
) -> Result<Response, AuthError> {
    let token = req
        .headers()
        .get(AUTHORIZATION)
        .and_then(|header| header.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .ok_or(AuthError::Unauthenticated)?;

    let claims = server
        .issuer
        .verify(token)
        .map_err(|_| AuthError::Unauthenticated)?;

    let context = RequestContext {
        user_id: claims.sub,
        token_role: claims.role,
        ip_address: client_ip_of(&req).map(|ip| ip.to_string()),
        user_agent: user_agent_of(req.headers()),
    };
    req.extensions_mut().insert(context);

    Ok(next.run(req).await)
}

async fn authorize(
    server: Server,
    requirement: RouteRequirement,
    mut req: Request,
    next: Next,
) -> Result<Response, AuthError> {
    let context = req
        .extensions()
        .get::<RequestContext>()
        .cloned()
        .ok_or(AuthError::Unauthenticated)?;

    if let Some(user) = server.guard.can_activate(&context, &requirement).await? {
        req.extensions_mut().insert(user);
    }

    Ok(next.run(req).await)
}

/// Requires contributor or above
pub async fn require_contributor(
    State(server): State<Server>,
    req: Request,
    next: Next,
) -> Result<Response, AuthError> {
    authorize(server, RouteRequirement::role(Role::Contributor), req, next).await
}

/// Requires admin or above; admin routes are sensitive, so the email must
/// be verified too
pub async fn require_admin(
    State(server): State<Server>,
    req: Request,
    next: Next,
) -> Result<Response, AuthError> {
    authorize(
        server,
        RouteRequirement::sensitive_role(Role::Admin),
        req,
        next,
    )
    .await
}

/// Requires superadmin
pub async fn require_superadmin(
    State(server): State<Server>,
    req: Request,
    next: Next,
) -> Result<Response, AuthError> {
    authorize(
        server,
        RouteRequirement::sensitive_role(Role::SuperAdmin),
        req,
        next,
    )
    .await
}

/// Extractor for the live account record attached by the authorization
/// middleware.
pub struct CurrentUser(pub UserRecord);

impl<S> FromRequestParts<S> for CurrentUser
where
    S: Send + Sync,
{
    type Rejection = AuthError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<UserRecord>()
            .cloned()
            .map(CurrentUser)
            .ok_or(AuthError::Unauthenticated)
    }
}

/// Extractor for the authenticated request context.
pub struct Authenticated(pub RequestContext);

impl<S> FromRequestParts<S> for Authenticated
where
    S: Send + Sync,
{
    type Rejection = AuthError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<RequestContext>()
            .cloned()
            .map(Authenticated)
            .ok_or(AuthError::Unauthenticated)
    }
}
