//! MediTrack - Main Server
//!
//! Patient-records API with a live change stream.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use meditrack::{db::Database, Config};
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "meditrack")]
#[command(about = "Patient records server")]
struct Cli {
    /// Path to the YAML config file (default: ./config.yaml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the API server
    Serve {
        /// Port to listen on (overrides config.yaml and SERVER_PORT)
        #[arg(short, long)]
        port: Option<u16>,

        /// SQLite database file (overrides config.yaml and DATABASE_PATH)
        #[arg(long)]
        db: Option<PathBuf>,
    },

    /// Apply pending database migrations and exit
    Migrate {
        /// SQLite database file (overrides config.yaml and DATABASE_PATH)
        #[arg(long)]
        db: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,meditrack=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();

    // Load configuration
    let mut config = Config::from_yaml_and_env(cli.config.as_deref())?;

    match cli.command {
        Commands::Serve { port, db } => {
            if let Some(port) = port {
                config.server_port = port;
            }
            if let Some(db) = db {
                config.database_path = db;
            }
            meditrack::start_server(config).await
        }
        Commands::Migrate { db } => {
            let path = db.unwrap_or(config.database_path);
            Database::open(&path)
                .with_context(|| format!("Failed to migrate {}", path.display()))?;
            tracing::info!("Database {} is up to date", path.display());
            Ok(())
        }
    }
}
