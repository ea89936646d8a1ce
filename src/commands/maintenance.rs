use crate::Config;
use crate::database::{DatabaseManager, DatabaseManagerImpl};
use clap::Subcommand;

#[derive(Subcommand)]
pub enum MaintenanceTask {
    /// Purge refresh tokens past their expiry
    CleanupTokens,
    /// Purge audit records past the retention window
    CleanupAuditLogs,
}

pub async fn handle_maintenance_command(
    task: MaintenanceTask,
    config: &Config,
) -> Result<(), Box<dyn std::error::Error>> {
    let database = DatabaseManagerImpl::new_from_config(&config.database).await?;

    match task {
        MaintenanceTask::CleanupTokens => {
            let removed = database.refresh_tokens().cleanup_expired().await?;
            println!("Removed {removed} expired refresh tokens");
        }
        MaintenanceTask::CleanupAuditLogs => {
            let removed = database.audit_logs().cleanup_expired().await?;
            println!("Removed {removed} expired audit records");
        }
    }

    Ok(())
}
