pub mod audit_logs;
pub mod refresh_tokens;
pub mod users;

pub use audit_logs::{AuditAction, AuditSeverity, Model as AuditRecord};
pub use refresh_tokens::{Model as RefreshTokenRecord, RevocationReason};
pub use users::{Model as UserRecord, Role};
