use crate::auth::secret::{SecretValidationReport, validate_jwt_secret};
use crate::database::entities::Role;
use crate::error::AuthError;
use crate::health::{HealthCheckResult, HealthChecker};
use chrono::{DateTime, Utc};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::sync::Arc;

/// Tokens are signed with a shared secret, so only the HMAC family is
/// accepted; asymmetric algorithms would make the strength validator
/// meaningless.
pub fn parse_algorithm(alg: &str) -> Result<Algorithm, AuthError> {
    let algorithm = Algorithm::from_str(alg)
        .map_err(|_| AuthError::BadRequest(format!("Unsupported JWT algorithm: {alg}")))?;

    match algorithm {
        Algorithm::HS256 | Algorithm::HS384 | Algorithm::HS512 => Ok(algorithm),
        _ => Err(AuthError::BadRequest(format!(
            "Algorithm {alg} requires an asymmetric key; configure an HMAC algorithm"
        ))),
    }
}

/// Access-token claims: subject plus a role snapshot. The authorization
/// guard re-checks the role against the live account record on every
/// protected request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccessClaims {
    pub sub: i32,
    pub role: Role,
    pub iat: usize,
    pub exp: usize,
}

impl AccessClaims {
    pub fn new(user_id: i32, role: Role, ttl_secs: u64) -> Self {
        let now = Utc::now().timestamp() as usize;
        Self {
            sub: user_id,
            role,
            iat: now,
            exp: now + ttl_secs as usize,
        }
    }

    pub fn is_expired(&self) -> bool {
        let now = Utc::now().timestamp() as usize;
        self.exp <= now
    }

    pub fn expires_at(&self) -> DateTime<Utc> {
        DateTime::from_timestamp(self.exp as i64, 0).unwrap_or_else(Utc::now)
    }
}

/// Access-token issuer trait for dependency injection and testing
pub trait TokenIssuer: Send + Sync {
    /// Mint a short-lived signed access token
    fn mint(&self, user_id: i32, role: Role) -> Result<String, AuthError>;

    /// Verify a token and return its claims
    fn verify(&self, token: &str) -> Result<AccessClaims, AuthError>;

    /// Configured access-token lifetime
    fn access_ttl_secs(&self) -> u64;
}

/// Stateless JWT minter/verifier. Construction is gated on the secret
/// strength validator: an invalid secret means no issuer, which means the
/// process never serves token traffic.
#[derive(Clone)]
pub struct JwtIssuer {
    algorithm: Algorithm,
    access_ttl_secs: u64,
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    report: SecretValidationReport,
}

impl JwtIssuer {
    pub fn new(secret: &str, algorithm: Algorithm, access_ttl_secs: u64) -> Result<Self, AuthError> {
        let report = validate_jwt_secret(secret);
        if !report.is_valid {
            return Err(AuthError::SecretValidation(report.errors.join("; ")));
        }

        Ok(Self {
            algorithm,
            access_ttl_secs,
            encoding_key: EncodingKey::from_secret(secret.as_ref()),
            decoding_key: DecodingKey::from_secret(secret.as_ref()),
            report,
        })
    }

    /// The boot-time validation report for the configured secret.
    pub fn validation_report(&self) -> &SecretValidationReport {
        &self.report
    }

    /// Create a health checker for this issuer
    pub fn health_checker(&self) -> Arc<IssuerHealthChecker> {
        Arc::new(IssuerHealthChecker {
            issuer: self.clone(),
        })
    }
}

impl TokenIssuer for JwtIssuer {
    fn mint(&self, user_id: i32, role: Role) -> Result<String, AuthError> {
        let claims = AccessClaims::new(user_id, role, self.access_ttl_secs);
        let header = Header::new(self.algorithm);
        encode(&header, &claims, &self.encoding_key)
            .map_err(|e| AuthError::Internal(format!("Failed to create token: {e}")))
    }

    fn verify(&self, token: &str) -> Result<AccessClaims, AuthError> {
        let mut validation = Validation::new(self.algorithm);
        validation.validate_exp = true;
        validation.leeway = 0;

        let token_data = decode::<AccessClaims>(token, &self.decoding_key, &validation)
            .map_err(|_| AuthError::InvalidToken)?;

        Ok(token_data.claims)
    }

    fn access_ttl_secs(&self) -> u64 {
        self.access_ttl_secs
    }
}

/// Health checker that exercises a mint/verify roundtrip.
pub struct IssuerHealthChecker {
    issuer: JwtIssuer,
}

#[async_trait::async_trait]
impl HealthChecker for IssuerHealthChecker {
    fn name(&self) -> &str {
        "token_issuer"
    }

    async fn check(&self) -> HealthCheckResult {
        match self.issuer.mint(1, Role::User) {
            Ok(token) => match self.issuer.verify(&token) {
                Ok(claims) if claims.sub == 1 => {
                    HealthCheckResult::healthy_with_details(serde_json::json!({
                        "algorithm": format!("{:?}", self.issuer.algorithm),
                        "secret_score": self.issuer.report.score,
                    }))
                }
                Ok(_) => HealthCheckResult::unhealthy(
                    "Token verification returned incorrect claims".to_string(),
                ),
                Err(e) => {
                    HealthCheckResult::unhealthy(format!("Failed to verify test token: {e}"))
                }
            },
            Err(e) => HealthCheckResult::unhealthy(format!("Failed to mint test token: {e}")),
        }
    }
}
