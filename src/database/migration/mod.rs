use sea_orm_migration::prelude::*;

pub use sea_orm_migration::MigratorTrait;

mod m20250512_000100_create_users_table;
mod m20250512_000200_create_refresh_tokens_table;
mod m20250512_000300_create_audit_logs_table;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m20250512_000100_create_users_table::Migration),
            Box::new(m20250512_000200_create_refresh_tokens_table::Migration),
            Box::new(m20250512_000300_create_audit_logs_table::Migration),
        ]
    }
}

/// Common table and column identifiers
#[derive(Iden)]
pub enum Users {
    Table,
    Id,
    Username,
    Email,
    Role,
    IsActive,
    EmailVerified,
    CreatedAt,
    UpdatedAt,
    LastLogin,
}

#[derive(Iden)]
pub enum RefreshTokens {
    Table,
    Id,
    TokenHash,
    UserId,
    CreatedAt,
    ExpiresAt,
    LastUsedAt,
    Revoked,
    RevokedAt,
    RevokedReason,
    ReplacesTokenId,
    ReplacedByTokenId,
    IpAddress,
    UserAgent,
}

#[derive(Iden)]
pub enum AuditLogs {
    Table,
    Id,
    Action,
    Severity,
    UserId,
    Username,
    ActorRole,
    IpAddress,
    UserAgent,
    Resource,
    BeforeState,
    AfterState,
    Success,
    ErrorMessage,
    CreatedAt,
    ExpiresAt,
}
