//! MediTrack
//!
//! Patient-records backend with:
//! - SQLite storage for patients, consultations, exams and families
//! - A JSON REST API over every record operation
//! - A server-sent event stream pushing change notifications to every
//!   connected client
//! - Exam document analysis with a simulated fallback

pub mod analysis;
pub mod api;
pub mod db;
pub mod events;
pub mod records;

#[cfg(test)]
pub(crate) mod test_helpers;

use anyhow::{Context, Result};
use serde::Deserialize;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;

// ============================================================================
// YAML config structs (deserialization targets)
// ============================================================================

/// Top-level YAML configuration file structure
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct YamlConfig {
    pub server: ServerYamlConfig,
    pub database: DatabaseYamlConfig,
    pub exams: ExamsYamlConfig,
    pub analysis: AnalysisYamlConfig,
}

/// Server configuration section
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerYamlConfig {
    pub host: String,
    pub port: u16,
    /// Interval between keep-alive comments on event streams
    pub keep_alive_secs: u64,
}

impl Default for ServerYamlConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".into(),
            port: 3001,
            keep_alive_secs: 15,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DatabaseYamlConfig {
    pub path: PathBuf,
}

impl Default for DatabaseYamlConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("data/meditrack.db"),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ExamsYamlConfig {
    /// Largest accepted exam file, after base64 decoding
    pub max_file_bytes: usize,
}

impl Default for ExamsYamlConfig {
    fn default() -> Self {
        Self {
            max_file_bytes: 20 * 1024 * 1024,
        }
    }
}

/// Document analysis section. Without an endpoint the simulated report is used.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AnalysisYamlConfig {
    pub endpoint: Option<String>,
    pub timeout_secs: u64,
}

impl Default for AnalysisYamlConfig {
    fn default() -> Self {
        Self {
            endpoint: None,
            timeout_secs: 30,
        }
    }
}

// ============================================================================
// Runtime config (what the application actually uses)
// ============================================================================

/// Application configuration
#[derive(Debug, Clone)]
pub struct Config {
    pub server_host: String,
    pub server_port: u16,
    pub database_path: PathBuf,
    pub keep_alive_secs: u64,
    pub max_exam_file_bytes: usize,
    pub analysis_endpoint: Option<String>,
    pub analysis_timeout_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self::from_yaml(YamlConfig::default())
    }
}

fn env_parse<T: std::str::FromStr>(name: &str) -> Option<T> {
    std::env::var(name).ok().and_then(|s| s.parse().ok())
}

impl Config {
    fn from_yaml(yaml: YamlConfig) -> Self {
        Self {
            server_host: yaml.server.host,
            server_port: yaml.server.port,
            database_path: yaml.database.path,
            keep_alive_secs: yaml.server.keep_alive_secs,
            max_exam_file_bytes: yaml.exams.max_file_bytes,
            analysis_endpoint: yaml.analysis.endpoint,
            analysis_timeout_secs: yaml.analysis.timeout_secs,
        }
    }

    /// Load configuration from an optional YAML file, then override with env vars.
    ///
    /// Priority: env var > YAML > default
    ///
    /// If `yaml_path` is None, tries "config.yaml" in CWD. If the file doesn't
    /// exist, falls back to pure env var / defaults.
    pub fn from_yaml_and_env(yaml_path: Option<&Path>) -> Result<Self> {
        let mut config = Self::from_yaml(Self::load_yaml(yaml_path));

        if let Ok(host) = std::env::var("SERVER_HOST") {
            config.server_host = host;
        }
        if let Some(port) = env_parse("SERVER_PORT") {
            config.server_port = port;
        }
        if let Ok(path) = std::env::var("DATABASE_PATH") {
            config.database_path = PathBuf::from(path);
        }
        if let Some(secs) = env_parse("SSE_KEEP_ALIVE_SECS") {
            config.keep_alive_secs = secs;
        }
        if let Some(bytes) = env_parse("EXAM_MAX_FILE_BYTES") {
            config.max_exam_file_bytes = bytes;
        }
        if let Ok(endpoint) = std::env::var("ANALYSIS_ENDPOINT") {
            // Empty disables the remote analyzer
            config.analysis_endpoint = Some(endpoint).filter(|e| !e.trim().is_empty());
        }

        if config.keep_alive_secs == 0 {
            anyhow::bail!("keep_alive_secs must be greater than 0");
        }

        Ok(config)
    }

    /// Try to load and parse a YAML config file. Returns defaults on any failure.
    fn load_yaml(yaml_path: Option<&Path>) -> YamlConfig {
        let default_path = Path::new("config.yaml");
        let path = yaml_path.unwrap_or(default_path);

        match std::fs::read_to_string(path) {
            Ok(contents) => match serde_yaml::from_str(&contents) {
                Ok(config) => {
                    tracing::info!("Loaded config from {}", path.display());
                    config
                }
                Err(e) => {
                    tracing::warn!("Failed to parse {}: {}. Using defaults.", path.display(), e);
                    YamlConfig::default()
                }
            },
            Err(_) => {
                tracing::debug!(
                    "No config file at {}, using env vars / defaults",
                    path.display()
                );
                YamlConfig::default()
            }
        }
    }

    pub fn keep_alive(&self) -> Duration {
        Duration::from_secs(self.keep_alive_secs)
    }
}

// ============================================================================
// Server lifecycle
// ============================================================================

/// Build the shared server state: database, broadcaster and analyzer.
pub fn build_state(config: Config, database: db::Database) -> Result<api::SharedState> {
    let analyzer: Option<Arc<dyn analysis::DocumentAnalyzer>> = match &config.analysis_endpoint {
        Some(url) => {
            let analyzer = analysis::HttpAnalyzer::new(
                url.clone(),
                Duration::from_secs(config.analysis_timeout_secs),
            )
            .context("Failed to build analysis client")?;
            tracing::info!("Document analysis service: {}", analyzer.url());
            Some(Arc::new(analyzer))
        }
        None => {
            tracing::info!("No document analysis service configured, using simulated reports");
            None
        }
    };

    Ok(Arc::new(api::ServerState {
        db: database,
        broadcaster: events::Broadcaster::new(),
        analyzer,
        config: Arc::new(config),
    }))
}

/// Serve the API on `listener` until `shutdown` resolves.
///
/// Open event streams are closed before in-flight requests are drained.
pub async fn serve<F>(state: api::SharedState, listener: TcpListener, shutdown: F) -> Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let broadcaster = state.broadcaster.clone();
    let router = api::create_router(state);

    let shutdown = async move {
        shutdown.await;
        let closed = broadcaster.close_all();
        tracing::info!(closed, "Shutting down, event streams closed");
    };

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown)
        .await
        .context("server error")?;

    tracing::info!("Server stopped");
    Ok(())
}

/// Open the database, bind the configured address and serve until Ctrl+C.
pub async fn start_server(config: Config) -> Result<()> {
    let database = db::Database::open(&config.database_path)
        .with_context(|| format!("Failed to open database {}", config.database_path.display()))?;

    let addr = format!("{}:{}", config.server_host, config.server_port);
    let state = build_state(config, database)?;

    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    tracing::info!("Server listening on http://{}", addr);

    serve(state, listener, shutdown_signal()).await
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
}

// ============================================================================
// Tests
// ============================================================================
