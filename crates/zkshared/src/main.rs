//! zkshared: zkshare maintenance daemon
//!
//! Usage:
//!   zkshared [--config /etc/zkshare/config.toml] [--purge-once]

mod daemon;
mod metrics;

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use std::path::{Path, PathBuf};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use zkshare_core::config::ZkConfig;

#[derive(Parser, Debug)]
#[command(name = "zkshared", version, about = "zkshare maintenance daemon")]
struct Cli {
    /// Path to the zkshare.toml configuration file
    #[arg(
        long,
        short = 'c',
        env = "ZKSHARE_CONFIG",
        default_value = "/etc/zkshare/config.toml"
    )]
    config: PathBuf,

    /// Log level (trace, debug, info, warn, error); overrides the config file
    #[arg(long, env = "ZKSHARE_LOG")]
    log: Option<String>,

    /// Log format; overrides the config file
    #[arg(long, env = "ZKSHARE_LOG_FORMAT")]
    log_format: Option<LogFormat>,

    /// Run a single expiry sweep and exit
    #[arg(long)]
    purge_once: bool,
}

#[derive(Clone, Debug, ValueEnum)]
enum LogFormat {
    Json,
    Text,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let (config, found) = load_config(&cli.config).await?;

    let level = cli.log.as_deref().unwrap_or(&config.daemon.log_level);
    let format = match cli.log_format {
        Some(f) => f,
        None if config.daemon.log_format.eq_ignore_ascii_case("json") => LogFormat::Json,
        None => LogFormat::Text,
    };
    init_logging(level, &format);

    info!(
        version = env!("CARGO_PKG_VERSION"),
        config = %cli.config.display(),
        "zkshared starting"
    );
    if !found {
        warn!("config file not found: {}  (using defaults)", cli.config.display());
    } else if config.config_file_mode_check {
        check_config_mode(&cli.config);
    }

    if cli.purge_once {
        return daemon::purge_once(config).await;
    }

    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("interrupt received, shutting down");
        }
        trigger.cancel();
    });

    daemon::run(config, cancel).await
}

/// Returns the config and whether it came from a file.
async fn load_config(path: &Path) -> Result<(ZkConfig, bool)> {
    if !path.exists() {
        return Ok((ZkConfig::default(), false));
    }
    let content = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("reading config {}", path.display()))?;
    let config = toml::from_str(&content)
        .with_context(|| format!("parsing config {}", path.display()))?;
    Ok((config, true))
}

/// The config may carry S3 credentials.
#[cfg(unix)]
fn check_config_mode(path: &Path) {
    use std::os::unix::fs::PermissionsExt;
    if let Ok(meta) = std::fs::metadata(path) {
        let mode = meta.permissions().mode();
        if mode & 0o004 != 0 {
            warn!(
                path = %path.display(),
                mode = %format!("{:o}", mode & 0o777),
                "config file is world-readable"
            );
        }
    }
}

#[cfg(not(unix))]
fn check_config_mode(_path: &Path) {}

/// `level` already reflects `--log`, then `ZKSHARE_LOG`, then the config file.
fn log_filter(level: &str) -> tracing_subscriber::EnvFilter {
    use tracing_subscriber::EnvFilter;
    EnvFilter::try_new(level).unwrap_or_else(|_| EnvFilter::new("info"))
}

fn init_logging(level: &str, format: &LogFormat) {
    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt};

    let filter = log_filter(level);

    match format {
        LogFormat::Json => {
            tracing_subscriber::registry()
                .with(filter)
                .with(fmt::layer().json())
                .init();
        }
        LogFormat::Text => {
            tracing_subscriber::registry()
                .with(filter)
                .with(fmt::layer())
                .init();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn missing_config_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let (config, found) = load_config(&dir.path().join("absent.toml")).await.unwrap();
        assert!(!found);
        assert_eq!(config.daemon.purge_interval_secs, 60);
    }

    #[tokio::test]
    async fn config_file_is_parsed() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("zkshare.toml");
        std::fs::write(&path, "[daemon]\npurge_interval_secs = 5\n").unwrap();
        let (config, found) = load_config(&path).await.unwrap();
        assert!(found);
        assert_eq!(config.daemon.purge_interval_secs, 5);
    }

    #[tokio::test]
    async fn malformed_config_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("zkshare.toml");
        std::fs::write(&path, "[daemon\n").unwrap();
        let err = load_config(&path).await.unwrap_err();
        assert!(err.to_string().contains("parsing config"));
    }

    #[test]
    fn log_flag_wins_over_environment() {
        std::env::set_var("ZKSHARE_LOG", "error");
        let cli = Cli::parse_from(["zkshared", "--log", "debug"]);
        std::env::remove_var("ZKSHARE_LOG");

        let level = cli.log.as_deref().unwrap_or("info");
        assert_eq!(level, "debug");
        assert_eq!(log_filter(level).to_string(), "debug");
    }

    #[test]
    fn invalid_level_falls_back_to_info() {
        assert_eq!(log_filter("no=such=level").to_string(), "info");
    }

    #[test]
    fn cli_parses_overrides() {
        let cli = Cli::parse_from([
            "zkshared",
            "--config",
            "/tmp/z.toml",
            "--log-format",
            "json",
            "--purge-once",
        ]);
        assert_eq!(cli.config, PathBuf::from("/tmp/z.toml"));
        assert!(matches!(cli.log_format, Some(LogFormat::Json)));
        assert!(cli.purge_once);
    }
}
