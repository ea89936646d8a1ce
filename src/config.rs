use crate::jobs::JobsConfig;
use crate::rate_limit::RateLimitConfig;
use config::{Config as ConfigBuilder, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    pub jwt: JwtConfig,
    pub database: DatabaseConfig,
    pub rate_limit: RateLimitConfig,
    pub audit: AuditConfig,
    pub jobs: JobsConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Request timeout enforced by the transport layer
    pub request_timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JwtConfig {
    /// Signing secret. Validated at boot; the process refuses to start
    /// when the validator rejects it.
    pub secret: String,
    pub algorithm: String,
    /// Access-token lifetime in seconds
    pub access_token_ttl_secs: u64,
    /// Refresh-token lifetime in days
    pub refresh_token_ttl_days: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditConfig {
    /// Days before an audit record becomes eligible for the retention purge
    pub retention_days: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                host: "0.0.0.0".to_string(),
                port: 8085,
                request_timeout_secs: 30,
            },
            jwt: JwtConfig {
                // No usable default on purpose: boot-time validation
                // rejects an empty secret.
                secret: String::new(),
                algorithm: "HS256".to_string(),
                access_token_ttl_secs: 900,
                refresh_token_ttl_days: 30,
            },
            database: DatabaseConfig {
                url: "sqlite://wordvault_auth.db?mode=rwc".to_string(),
            },
            rate_limit: RateLimitConfig::default(),
            audit: AuditConfig {
                retention_days: 365,
            },
            jobs: JobsConfig::default(),
            logging: LoggingConfig {
                level: "info".to_string(),
            },
        }
    }
}

impl Config {
    pub fn load() -> Result<Self, ConfigError> {
        let mut builder =
            ConfigBuilder::builder().add_source(config::Config::try_from(&Config::default())?);

        if Path::new("config.yaml").exists() {
            builder = builder.add_source(File::with_name("config"));
        }

        builder = builder.add_source(
            Environment::with_prefix("WORDVAULT")
                .prefix_separator("_")
                .separator("__"),
        );

        builder.build()?.try_deserialize()
    }

    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let mut builder =
            ConfigBuilder::builder().add_source(config::Config::try_from(&Config::default())?);

        if path.as_ref().exists() {
            builder = builder.add_source(File::from(path.as_ref()));
        }

        builder = builder.add_source(
            Environment::with_prefix("WORDVAULT")
                .prefix_separator("_")
                .separator("__"),
        );

        builder.build()?.try_deserialize()
    }
}
