use crate::auth::secret::generate_secure_secret;
use crate::config::Config;
use crate::database::DatabaseManager;
use crate::database::entities::{Role, UserRecord};
use crate::rate_limit::RateLimitConfig;
use crate::server::Server;
use std::sync::Arc;

/// Test server builder wiring an in-memory database, a freshly generated
/// strong secret, and a disabled job scheduler.
pub struct TestServerBuilder {
    config: Config,
    jwt_secret: Option<String>,
}

impl TestServerBuilder {
    pub fn new() -> Self {
        Self {
            config: Config::default(),
            jwt_secret: None,
        }
    }

    /// Set a custom configuration
    pub fn with_config(mut self, config: Config) -> Self {
        self.config = config;
        self
    }

    /// Set a custom JWT secret for testing
    pub fn with_jwt_secret(mut self, secret: String) -> Self {
        self.jwt_secret = Some(secret);
        self
    }

    /// Override the rate limiter configuration
    pub fn with_rate_limit(mut self, rate_limit: RateLimitConfig) -> Self {
        self.config.rate_limit = rate_limit;
        self
    }

    /// Build the test server with migrations applied
    pub async fn build(self) -> Server {
        let mut config = self.config;

        config.database.url = "sqlite::memory:".to_string();
        config.jobs.enabled = false;

        if let Some(secret) = self.jwt_secret {
            config.jwt.secret = secret;
        }
        if config.jwt.secret.is_empty() {
            config.jwt.secret = generate_secure_secret(64);
        }

        let server = Server::new(config).await.unwrap();
        server.database.migrate().await.unwrap();
        server
    }
}

impl Default for TestServerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Create an active, verified test user with the given role
pub async fn create_test_user(
    database: &Arc<dyn DatabaseManager>,
    username: &str,
    role: Role,
) -> i32 {
    let user = UserRecord::new(username, format!("{username}@example.com")).with_role(role);
    database.users().create(&user).await.unwrap()
}

/// Create a test user with explicit account state
pub async fn create_test_user_with_state(
    database: &Arc<dyn DatabaseManager>,
    username: &str,
    role: Role,
    is_active: bool,
    email_verified: bool,
) -> i32 {
    let user = UserRecord::new(username, format!("{username}@example.com"))
        .with_role(role)
        .with_active(is_active)
        .with_email_verified(email_verified);
    database.users().create(&user).await.unwrap()
}
