pub mod authorization;
pub mod jwt;
pub mod middleware;
pub mod secret;
pub mod tokens;

pub use authorization::{AuthorizationGuard, RequestContext, RouteRequirement};
pub use jwt::{AccessClaims, JwtIssuer, TokenIssuer, parse_algorithm};
pub use secret::{
    SecretStrength, SecretValidationReport, generate_secure_secret, validate_jwt_secret,
};
pub use tokens::{TokenMetadata, TokenPair, TokenService};
