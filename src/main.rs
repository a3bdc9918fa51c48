use anyhow::Context;
use clap::{Parser, Subcommand};
use lms_server::app::account_use_case::AccountUseCase;
use lms_server::app::ports::PaymentGatewayPort;
use lms_server::config::{Config, PaymentMode};
use lms_server::infra::{HttpInvoiceGateway, OfflineInvoiceGateway};
use lms_server::logging::init_logging;
use lms_server::metrics::init_metrics;
use lms_server::server::{start_server, AppState};
use lms_server::storage::{SqliteStorage, Storage};
use std::sync::Arc;
use tracing::{info, warn};

#[derive(Parser)]
#[command(name = "lms_server")]
#[command(about = "Learning management backend: courses, enrollment, payments and certificates")]
#[command(version)]
struct Cli {
    /// Path to the TOML configuration file
    #[arg(long, global = true, default_value = "config.toml")]
    config: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the HTTP API
    Serve {
        /// Override the configured port
        #[arg(long)]
        port: Option<u16>,
    },
    /// Create or update the database schema and exit
    Migrate,
    /// Create an administrator account and print its API token
    CreateAdmin {
        #[arg(long)]
        name: String,
        #[arg(long)]
        email: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    let cli = Cli::parse();

    let mut config = Config::load(&cli.config)
        .with_context(|| format!("loading configuration from {}", cli.config))?;
    let _guard = init_logging(&config.logging);

    match cli.command {
        Commands::Serve { port } => {
            if let Some(port) = port {
                config.server.port = port;
            }
            config.validate()?;
            if config.metrics.enabled {
                init_metrics(&config.metrics.addr);
            }

            let storage: Arc<dyn Storage> = Arc::new(SqliteStorage::open(&config.database.path)?);
            let gateway: Arc<dyn PaymentGatewayPort> = match config.payment.mode {
                PaymentMode::Gateway => Arc::new(
                    HttpInvoiceGateway::new(&config.payment.api_base_url, &config.payment.secret_key)
                        .map_err(anyhow::Error::msg)?,
                ),
                PaymentMode::Offline => {
                    warn!("Payment gateway is offline; invoices are local and must be settled via the webhook");
                    Arc::new(OfflineInvoiceGateway::new(format!(
                        "http://{}:{}",
                        config.server.host, config.server.port
                    )))
                }
            };

            let state = AppState::new(storage, gateway, config.payment.clone());
            start_server(state, &config.server.host, config.server.port).await?;
        }
        Commands::Migrate => {
            SqliteStorage::open(&config.database.path)?;
            info!("Database at {} is up to date", config.database.path);
            println!("Migrations applied to {}", config.database.path);
        }
        Commands::CreateAdmin { name, email } => {
            let storage: Arc<dyn Storage> = Arc::new(SqliteStorage::open(&config.database.path)?);
            let registration = AccountUseCase::new(storage).create_admin(&name, &email).await?;
            println!("Created admin {} ({})", registration.user.name, registration.user.id);
            println!("API token (shown once): {}", registration.api_token);
        }
    }

    Ok(())
}
