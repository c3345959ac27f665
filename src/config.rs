use anyhow::{Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub s3: Option<S3Config>,
    #[serde(default)]
    pub ledger: LedgerConfig,
    pub bag: BagConfig,
    #[serde(default)]
    pub batch: BatchConfig,
    #[serde(default)]
    pub dropbox: DropboxConfig,
    pub logging: Option<LoggingConfig>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct S3Config {
    pub endpoint: Option<String>,
    pub region: String,
    pub bucket: String,
    pub access_key_id: Option<String>,
    pub secret_access_key: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LedgerConfig {
    pub db_path: String,
    #[serde(default = "default_visibility_poll_ms")]
    pub visibility_poll_ms: u64,
    /// Unset means wait for as long as it takes.
    pub visibility_timeout_secs: Option<u64>,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            db_path: "ledger.db".to_string(),
            visibility_poll_ms: default_visibility_poll_ms(),
            visibility_timeout_secs: Some(300),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct BagConfig {
    pub institution_id: String,
    pub source_organization: String,
    #[serde(default = "default_access")]
    pub access: String,
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,
    #[serde(default = "default_working_dir")]
    pub working_dir: PathBuf,
    #[serde(default)]
    pub source: PayloadSourceConfig,
}

/// Which payload source feeds the batch loop.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum PayloadSourceConfig {
    Local { dump_root: PathBuf },
    Http,
}

impl Default for PayloadSourceConfig {
    fn default() -> Self {
        PayloadSourceConfig::Local {
            dump_root: PathBuf::from("dump"),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct BatchConfig {
    #[serde(default = "default_page_size")]
    pub page_size: usize,
    pub quota_bytes: u64,
    #[serde(default)]
    pub overwrite: bool,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            page_size: default_page_size(),
            quota_bytes: u64::MAX,
            overwrite: false,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct DropboxConfig {
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,
    #[serde(default = "default_move_interval_secs")]
    pub move_interval_secs: u64,
    #[serde(default = "default_grace_period_secs")]
    pub grace_period_secs: u64,
    #[serde(default = "default_refresh_interval_secs")]
    pub refresh_interval_secs: u64,
}

impl Default for DropboxConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: default_poll_interval_secs(),
            move_interval_secs: default_move_interval_secs(),
            grace_period_secs: default_grace_period_secs(),
            refresh_interval_secs: default_refresh_interval_secs(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    pub path: String,
    /// Maximum size of one log file in MiB
    #[serde(default = "default_log_size")]
    pub size: u64,
    #[serde(default = "default_log_max_files")]
    pub max_files: usize,
}

fn default_visibility_poll_ms() -> u64 {
    250
}

fn default_access() -> String {
    "Consortia".to_string()
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("output")
}

fn default_working_dir() -> PathBuf {
    PathBuf::from("work")
}

fn default_page_size() -> usize {
    100
}

fn default_poll_interval_secs() -> u64 {
    5
}

fn default_move_interval_secs() -> u64 {
    5
}

fn default_grace_period_secs() -> u64 {
    60
}

fn default_refresh_interval_secs() -> u64 {
    60
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_size() -> u64 {
    10
}

fn default_log_max_files() -> usize {
    5
}

pub fn load_config(path: &str) -> Result<Config> {
    let config_text = fs::read_to_string(Path::new(path))
        .with_context(|| format!("Failed to read configuration file {}", path))?;
    let config: Config = toml::from_str(&config_text)
        .with_context(|| format!("Failed to parse configuration file {}", path))?;
    Ok(config)
}
