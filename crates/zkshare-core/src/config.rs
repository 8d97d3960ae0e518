use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Top-level configuration (loaded from zkshare.toml)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ZkConfig {
    pub daemon: DaemonConfig,
    pub store: StoreConfig,
    pub storage: StorageConfig,
    pub shares: SharesConfig,
    pub handshake: HandshakeConfig,
    /// Warn if the config file is world-readable (default: true)
    #[serde(default = "default_true")]
    pub config_file_mode_check: bool,
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DaemonConfig {
    /// Prometheus metrics endpoint (default: 127.0.0.1:9464)
    pub metrics_addr: Option<String>,
    /// Log level (default: info)
    pub log_level: String,
    /// Log format: "json" or "text"
    pub log_format: String,
    /// Seconds between expiry sweeps
    pub purge_interval_secs: u64,
}

/// Record store backend for share and handshake metadata
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    /// Single JSON file, rewritten atomically on every mutation
    #[default]
    Json,
    /// Embedded RocksDB (requires the `rocksdb` feature)
    Rocksdb,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub backend: StoreBackend,
    /// JSON file or RocksDB directory
    pub path: PathBuf,
}

/// Object storage backend for encrypted blobs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ObjectBackend {
    #[default]
    Fs,
    Memory,
    S3,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub backend: ObjectBackend,
    /// Root directory (fs) or key prefix (s3)
    pub root: String,
    /// S3 endpoint
    pub endpoint: String,
    /// S3 region (default: us-east-1)
    pub region: String,
    pub bucket: String,
    pub access_key_id: Option<String>,
    pub secret_access_key: Option<String>,
    /// Refuse plaintext HTTP S3 endpoints
    pub enforce_tls: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SharesConfig {
    /// Lifetime applied when a sender does not pick one
    pub default_ttl_secs: u64,
    /// 0 = unlimited
    pub default_max_downloads: u64,
    /// Upper bound on any requested lifetime
    pub max_ttl_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HandshakeConfig {
    pub ttl_secs: u64,
    pub poll_interval_ms: u64,
    pub poll_timeout_secs: u64,
    /// Pairing-code creation attempts before giving up
    pub code_attempts: u32,
}

impl HandshakeConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn poll_timeout(&self) -> Duration {
        Duration::from_secs(self.poll_timeout_secs)
    }
}

impl Default for ZkConfig {
    fn default() -> Self {
        Self {
            daemon: DaemonConfig::default(),
            store: StoreConfig::default(),
            storage: StorageConfig::default(),
            shares: SharesConfig::default(),
            handshake: HandshakeConfig::default(),
            config_file_mode_check: true,
        }
    }
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            metrics_addr: Some("127.0.0.1:9464".into()),
            log_level: "info".into(),
            log_format: "text".into(),
            purge_interval_secs: 60,
        }
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: StoreBackend::Json,
            path: PathBuf::from("/var/lib/zkshare/records.json"),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: ObjectBackend::Fs,
            root: "/var/lib/zkshare/objects".into(),
            endpoint: "http://localhost:9000".into(),
            region: "us-east-1".into(),
            bucket: "zkshare".into(),
            access_key_id: None,
            secret_access_key: None,
            enforce_tls: false,
        }
    }
}

impl Default for SharesConfig {
    fn default() -> Self {
        Self {
            default_ttl_secs: 24 * 60 * 60,
            default_max_downloads: 0,
            max_ttl_secs: 7 * 24 * 60 * 60,
        }
    }
}

impl Default for HandshakeConfig {
    fn default() -> Self {
        Self {
            ttl_secs: 30 * 60,
            poll_interval_ms: 2000,
            poll_timeout_secs: 10 * 60,
            code_attempts: 10,
        }
    }
}
