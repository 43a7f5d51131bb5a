//! Ledger configuration, loaded from TOML

use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LedgerConfig {
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub bootstrap: BootstrapConfig,
    #[serde(default)]
    pub rules: RulesConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// sled database directory
    #[serde(default = "default_db_path")]
    pub path: PathBuf,

    /// Flush to disk after every committed operation
    #[serde(default)]
    pub flush_on_commit: bool,

    /// In-memory database removed on drop
    #[serde(default)]
    pub temporary: bool,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
            flush_on_commit: false,
            temporary: false,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BootstrapConfig {
    /// Granted every role when the ledger has no administrator yet
    #[serde(default)]
    pub administrator: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RulesConfig {
    /// Pesticide ceiling in effect until a regulator sets one
    #[serde(default = "default_pesticide_ceiling")]
    pub default_pesticide_ceiling_ppm: f64,
}

impl Default for RulesConfig {
    fn default() -> Self {
        Self {
            default_pesticide_ceiling_ppm: default_pesticide_ceiling(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// `tracing_subscriber::EnvFilter` directive, overridden by RUST_LOG
    #[serde(default = "default_log_filter")]
    pub filter: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: default_log_filter(),
        }
    }
}

fn default_db_path() -> PathBuf {
    PathBuf::from("ledger.db")
}
fn default_pesticide_ceiling() -> f64 {
    0.5
}
fn default_log_filter() -> String {
    "provenance_ledger=info".to_string()
}

impl LedgerConfig {
    /// Reads `path`, or falls back to defaults when the file doesn't exist.
    pub fn load(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config {}", path.display()))?;
        Self::from_toml(&content).with_context(|| format!("invalid config {}", path.display()))
    }

    pub fn from_toml(content: &str) -> anyhow::Result<Self> {
        let config: Self = toml::from_str(content)?;
        let ceiling = config.rules.default_pesticide_ceiling_ppm;
        if !ceiling.is_finite() || ceiling < 0.0 {
            anyhow::bail!("rules.default_pesticide_ceiling_ppm must be finite and non-negative");
        }
        Ok(config)
    }

    /// Config for an in-memory ledger, used by tests and dry runs.
    pub fn temporary() -> Self {
        let mut config = Self::default();
        config.storage.temporary = true;
        config
    }

    pub fn with_administrator(mut self, administrator: &str) -> Self {
        self.bootstrap.administrator = Some(administrator.to_string());
        self
    }

    pub fn open_db(&self) -> anyhow::Result<sled::Db> {
        // temporary dbs get a unique generated path so parallel instances don't share a lock
        let mut builder = sled::Config::new().temporary(self.storage.temporary);
        if !self.storage.temporary {
            builder = builder.path(&self.storage.path);
        }
        let db = builder
            .open()
            .with_context(|| format!("failed to open sled at {}", self.storage.path.display()))?;
        Ok(db)
    }
}
