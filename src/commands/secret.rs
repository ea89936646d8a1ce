use crate::Config;
use crate::auth::secret::{generate_secure_secret, validate_jwt_secret};
use clap::Subcommand;

#[derive(Subcommand)]
pub enum SecretAction {
    /// Validate a signing secret and print the full report
    Validate {
        /// Secret to validate; defaults to the configured jwt.secret
        #[arg(long)]
        secret: Option<String>,
    },
    /// Generate a strong signing secret
    Generate {
        /// Secret length in characters
        #[arg(long, default_value_t = 64)]
        length: usize,
    },
}

pub fn handle_secret_command(
    action: SecretAction,
    config: &Config,
) -> Result<(), Box<dyn std::error::Error>> {
    match action {
        SecretAction::Validate { secret } => {
            let value = secret.unwrap_or_else(|| config.jwt.secret.clone());
            let report = validate_jwt_secret(&value);
            println!("{}", serde_json::to_string_pretty(&report)?);

            if !report.is_valid {
                return Err("secret failed validation".into());
            }
        }
        SecretAction::Generate { length } => {
            println!("{}", generate_secure_secret(length));
        }
    }

    Ok(())
}
