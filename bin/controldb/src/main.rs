//! ControlDB daemon
//!
//! Opens the metadata stores for one cluster and serves them until
//! interrupted.

use anyhow::{Context, Result};
use clap::Parser;
use controldb::ControlDbServer;
use controldb_common::ControlDbConfig;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(name = "controldb")]
#[command(about = "ControlDB control-plane metadata store")]
#[command(version)]
struct Args {
    /// Configuration file path
    #[arg(short, long, default_value = "/etc/controldb/controldb.toml")]
    config: String,

    /// Root data directory
    #[arg(long, env = "CONTROLDB_DATA_DIR")]
    data_dir: Option<PathBuf>,

    /// Cluster served by this instance
    #[arg(long, env = "CONTROLDB_CLUSTER")]
    cluster: Option<String>,

    /// Log level (overrides `[logging] level`)
    #[arg(long)]
    log_level: Option<String>,
}

/// Configuration file structure
#[derive(Debug, Deserialize, Default)]
struct Config {
    #[serde(default)]
    store: ControlDbConfig,
    #[serde(default)]
    logging: LoggingConfig,
}

#[derive(Debug, Deserialize)]
struct LoggingConfig {
    #[serde(default = "default_log_level")]
    level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn load_config(path: &Path) -> Result<Config> {
    if !path.exists() {
        return Ok(Config::default());
    }
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("reading config file {}", path.display()))?;
    toml::from_str(&raw).with_context(|| format!("parsing config file {}", path.display()))
}

/// Store settings and log level, CLI taking precedence over the file
fn merge(args: Args, config: Config) -> (ControlDbConfig, String) {
    let mut store = config.store;
    if let Some(data_dir) = args.data_dir {
        store.data_dir = data_dir;
    }
    if let Some(cluster) = args.cluster {
        store.cluster_name = cluster;
    }
    let log_level = args.log_level.unwrap_or(config.logging.level);
    (store, log_level)
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let config_path = args.config.clone();
    let config = load_config(Path::new(&config_path))?;
    let (store, log_level) = merge(args, config);

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| log_level.clone().into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting ControlDB");
    info!("Config file: {}", config_path);
    info!("Data directory: {}", store.data_dir.display());
    info!("Cluster: {}", store.cluster_name);
    info!(
        "max_versions={}, parallel_reqs={}, request_timeout={}s",
        store.max_versions, store.parallel_reqs, store.request_timeout_secs
    );

    let server = match ControlDbServer::open(store) {
        Ok(server) => server,
        Err(e) => {
            error!("Failed to open ControlDB: {}", e);
            return Err(e.into());
        }
    };
    info!("ControlDB ready");

    tokio::signal::ctrl_c()
        .await
        .context("waiting for shutdown signal")?;
    info!("Shutdown signal received");

    server.shutdown().await;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn file_config(level: &str) -> Config {
        toml::from_str(&format!(
            "[store]\ncluster_name = \"from-file\"\n\n[logging]\nlevel = \"{level}\"\n"
        ))
        .unwrap()
    }

    #[test]
    fn test_explicit_log_level_overrides_file() {
        let args = Args::parse_from(["controldb", "--log-level", "info"]);
        let (_, level) = merge(args, file_config("debug"));
        assert_eq!(level, "info");
    }

    #[test]
    fn test_file_log_level_used_without_flag() {
        let args = Args::parse_from(["controldb"]);
        let (_, level) = merge(args, file_config("warn"));
        assert_eq!(level, "warn");

        let (_, level) = merge(Args::parse_from(["controldb"]), Config::default());
        assert_eq!(level, "info");
    }

    #[test]
    fn test_cluster_flag_overrides_file() {
        let args = Args::parse_from(["controldb", "--cluster", "c9"]);
        let (store, _) = merge(args, file_config("info"));
        assert_eq!(store.cluster_name, "c9");
    }
}
