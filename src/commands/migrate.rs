use crate::Config;
use crate::database::{DatabaseManagerImpl, Migrator, MigratorTrait};
use clap::Subcommand;

#[derive(Subcommand)]
pub enum MigrateAction {
    /// Apply pending migrations
    Up,
    /// Drop all tables and re-apply every migration
    Fresh,
    /// Show migration status
    Status,
}

pub async fn handle_migrate_command(
    action: MigrateAction,
    config: &Config,
) -> Result<(), Box<dyn std::error::Error>> {
    let database = DatabaseManagerImpl::new_from_config(&config.database).await?;

    match action {
        MigrateAction::Up => {
            Migrator::up(&database.connection, None).await?;
            println!("Migrations applied");
        }
        MigrateAction::Fresh => {
            Migrator::fresh(&database.connection).await?;
            println!("Database recreated from scratch");
        }
        MigrateAction::Status => {
            Migrator::status(&database.connection).await?;
        }
    }

    Ok(())
}
