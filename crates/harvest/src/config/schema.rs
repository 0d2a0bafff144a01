use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::db::default_database_path;
use crate::error::ConfigError;

pub const CONFIG_VERSION: &str = "1.0";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default = "default_version")]
    pub version: String,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub runner: RunnerConfig,
    #[serde(default)]
    pub extractor: ExtractorConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

fn default_version() -> String {
    CONFIG_VERSION.to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            version: default_version(),
            server: ServerConfig::default(),
            database: DatabaseConfig::default(),
            runner: RunnerConfig::default(),
            extractor: ExtractorConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_allowed_origins")]
    pub allowed_origins: Vec<String>,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    8001
}

fn default_allowed_origins() -> Vec<String> {
    vec![
        "http://localhost:3000".to_string(),
        "http://127.0.0.1:3000".to_string(),
    ]
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            allowed_origins: default_allowed_origins(),
        }
    }
}

impl ServerConfig {
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// `None` means `~/.harvest/data/harvest.db`. A leading `~/` is expanded.
    #[serde(default)]
    pub path: Option<String>,
}

impl DatabaseConfig {
    pub fn resolved_path(&self) -> Result<PathBuf, ConfigError> {
        match self.path.as_deref() {
            Some(p) => expand_home(p),
            None => default_database_path().ok_or_else(|| ConfigError::Validation {
                message: "cannot determine home directory for the default database path"
                    .to_string(),
            }),
        }
    }
}

fn expand_home(path: &str) -> Result<PathBuf, ConfigError> {
    match path.strip_prefix("~/") {
        Some(rest) => dirs::home_dir()
            .map(|home| home.join(rest))
            .ok_or_else(|| ConfigError::Validation {
                message: format!("cannot expand '{}': no home directory", path),
            }),
        None => Ok(PathBuf::from(path)),
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunnerConfig {
    /// Upper bound on concurrently executing jobs.
    #[serde(default = "default_worker_count")]
    pub worker_count: usize,
    #[serde(default = "default_max_results")]
    pub default_max_results: u32,
    #[serde(default = "default_max_results_limit")]
    pub max_results_limit: u32,
    /// Events buffered per observer before it is considered lagging.
    #[serde(default = "default_observer_buffer")]
    pub observer_buffer: usize,
}

fn default_worker_count() -> usize {
    num_cpus::get()
}

fn default_max_results() -> u32 {
    15
}

fn default_max_results_limit() -> u32 {
    100
}

fn default_observer_buffer() -> usize {
    64
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            worker_count: default_worker_count(),
            default_max_results: default_max_results(),
            max_results_limit: default_max_results_limit(),
            observer_buffer: default_observer_buffer(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ExtractorKind {
    #[default]
    Sample,
    Http,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractorConfig {
    #[serde(default)]
    pub kind: ExtractorKind,
    #[serde(default)]
    pub sample_delay_ms: u64,
    #[serde(default)]
    pub endpoint: Option<String>,
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
}

fn default_connect_timeout() -> u64 {
    10
}

fn default_timeout() -> u64 {
    120
}

impl Default for ExtractorConfig {
    fn default() -> Self {
        Self {
            kind: ExtractorKind::Sample,
            sample_delay_ms: 0,
            endpoint: None,
            connect_timeout_secs: default_connect_timeout(),
            timeout_secs: default_timeout(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Filter directive used when `RUST_LOG` is unset.
    #[serde(default = "default_level")]
    pub level: String,
    #[serde(default)]
    pub json: bool,
}

fn default_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_level(),
            json: false,
        }
    }
}
