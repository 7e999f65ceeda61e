use clap::Parser;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use courtside::adapters::{
    GatewayCredentials, HttpPaymentGateway, PostgresChatDirectory, PostgresStore,
    RegistryNotifier,
};
use courtside::cli::{self, Cli, Commands, DbCommands};
use courtside::config::{Config, LogFormat};
use courtside::health::{DependencyChecker, GatewayChecker, PostgresChecker};
use courtside::services::ConnectionRegistry;
use courtside::{create_app, AppState, Collaborators, Settings};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = Config::from_env()?;
    init_tracing(config.log_format);

    match cli.command.unwrap_or(Commands::Serve) {
        Commands::Serve => serve(config).await,
        Commands::Db(DbCommands::Migrate) => cli::handle_db_migrate(&config).await,
        Commands::Reap => cli::handle_reap(&config).await,
        Commands::Config => cli::handle_config_show(&config),
    }
}

fn init_tracing(format: LogFormat) {
    let filter =
        tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into());
    let registry = tracing_subscriber::registry().with(filter);
    match format {
        LogFormat::Json => registry.with(tracing_subscriber::fmt::layer().json()).init(),
        LogFormat::Text => registry.with(tracing_subscriber::fmt::layer()).init(),
    }
}

async fn serve(config: Config) -> anyhow::Result<()> {
    let pool = courtside::db::create_pool(&config).await?;
    courtside::db::run_migrations(&pool).await?;

    let gateway = Arc::new(HttpPaymentGateway::new(
        config.gateway_base_url.clone(),
        GatewayCredentials {
            key_id: config.gateway_key_id.clone(),
            key_secret: config.gateway_key_secret.clone(),
        },
    ));
    tracing::info!("Payment gateway client initialized with URL: {}", config.gateway_base_url);

    let registry = Arc::new(ConnectionRegistry::new());
    let checkers: Vec<Arc<dyn DependencyChecker>> = vec![
        Arc::new(PostgresChecker::new(pool.clone())),
        Arc::new(GatewayChecker::new(gateway.clone())),
    ];

    let state = AppState::new(
        Collaborators {
            store: Arc::new(PostgresStore::new(pool.clone())),
            gateway,
            chat: Arc::new(PostgresChatDirectory::new(pool)),
            notifier: Arc::new(RegistryNotifier::new(registry.clone())),
            registry,
        },
        Settings {
            currency: config.currency.clone(),
            webhook_secret: config.gateway_webhook_secret.clone(),
            admin_api_key: config.admin_api_key.clone(),
            reaper_stale_after: config.reaper_stale_after(),
        },
    )
    .with_checkers(checkers);

    match config.reaper_schedule()? {
        Some(schedule) => {
            tokio::spawn(state.reaper.clone().run_schedule(schedule));
        }
        None => tracing::info!("Reaper loop disabled"),
    }

    let app = create_app(state);
    let addr = SocketAddr::from(([0, 0, 0, 0], config.server_port));
    tracing::info!("listening on {}", addr);

    let listener = TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
