use chrono::Utc;
use clap::{Parser, Subcommand};
use std::sync::Arc;

use crate::adapters::PostgresStore;
use crate::config::Config;
use crate::services::Reaper;

#[derive(Parser)]
#[command(name = "courtside")]
#[command(about = "Courtside - court booking and payment reconciliation service", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start the HTTP server and reaper loop (default)
    Serve,

    /// Database management commands
    #[command(subcommand)]
    Db(DbCommands),

    /// Abandon stale combined-payment reservations once and exit
    Reap,

    /// Print the configuration with secrets masked
    Config,
}

#[derive(Subcommand)]
pub enum DbCommands {
    /// Run database migrations
    Migrate,
}

pub async fn handle_db_migrate(config: &Config) -> anyhow::Result<()> {
    let pool = crate::db::create_pool(config).await?;

    tracing::info!("Running database migrations...");
    crate::db::run_migrations(&pool).await?;
    println!("✓ Database migrations completed");

    Ok(())
}

pub async fn handle_reap(config: &Config) -> anyhow::Result<()> {
    let pool = crate::db::create_pool(config).await?;
    let reaper = Reaper::new(
        Arc::new(PostgresStore::new(pool)),
        config.reaper_stale_after(),
    );

    let abandoned = reaper.sweep(Utc::now()).await?;
    println!("✓ Abandoned {} stale reservation(s)", abandoned);

    Ok(())
}

pub fn handle_config_show(config: &Config) -> anyhow::Result<()> {
    println!("Configuration:");
    println!("  Server Port: {}", config.server_port);
    println!("  Database URL: {}", mask_password(&config.database_url));
    println!("  Database Max Connections: {}", config.database_max_connections);
    println!("  Gateway Base URL: {}", config.gateway_base_url);
    println!("  Gateway Key ID: {}", config.gateway_key_id);
    println!("  Gateway Key Secret: {}", mask_secret(&config.gateway_key_secret));
    println!("  Webhook Secret: {}", mask_secret(&config.gateway_webhook_secret));
    println!("  Admin API Key: {}", mask_secret(&config.admin_api_key));
    println!("  Currency: {}", config.currency);
    println!("  Reaper Stale After: {}s", config.reaper_stale_after_secs);
    println!(
        "  Reaper Schedule: {}",
        config.reaper_schedule.as_deref().unwrap_or("off")
    );
    println!("  Log Format: {:?}", config.log_format);

    println!("✓ Configuration is valid");
    Ok(())
}

pub fn mask_password(url: &str) -> String {
    if let Some(at_pos) = url.rfind('@') {
        if let Some(colon_pos) = url[..at_pos].rfind(':') {
            if let Some(slash_pos) = url[..colon_pos].rfind("//") {
                let prefix = &url[..slash_pos + 2];
                let user = &url[slash_pos + 2..colon_pos];
                let suffix = &url[at_pos..];
                return format!("{}{}:****{}", prefix, user, suffix);
            }
        }
    }
    url.to_string()
}

pub fn mask_secret(secret: &str) -> String {
    let visible: String = secret.chars().take(4).collect();
    if secret.chars().count() <= 8 {
        "****".to_string()
    } else {
        format!("{}****", visible)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn masks_database_password() {
        assert_eq!(
            mask_password("postgres://courtside:hunter2@db:5432/courtside"),
            "postgres://courtside:****@db:5432/courtside"
        );
        assert_eq!(mask_password("postgres://db/courtside"), "postgres://db/courtside");
    }

    #[test]
    fn masks_short_and_long_secrets() {
        assert_eq!(mask_secret("abc"), "****");
        assert_eq!(mask_secret("whsec_0123456789"), "whse****");
    }

    #[test]
    fn parses_subcommands() {
        let cli = Cli::try_parse_from(["courtside", "db", "migrate"]).unwrap();
        assert!(matches!(cli.command, Some(Commands::Db(DbCommands::Migrate))));

        let cli = Cli::try_parse_from(["courtside"]).unwrap();
        assert!(cli.command.is_none());
    }
}
