pub mod audit_logs;
pub mod refresh_tokens;
pub mod users;

pub use audit_logs::{AuditLogDraft, AuditLogQueryParams, AuditLogsDao};
pub use refresh_tokens::{NewRefreshToken, RefreshTokensDao};
pub use users::UsersDao;
