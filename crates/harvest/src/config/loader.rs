use std::path::{Path, PathBuf};

use crate::config::schema::{Config, ExtractorKind, CONFIG_VERSION};
use crate::error::ConfigError;

const SCHEMA_JSON: &str = include_str!("../../../../schema/config-v1.json");

/// File looked up in the working directory when `HARVEST_CONFIG` is unset.
pub const DEFAULT_CONFIG_FILE: &str = "harvest.json";

pub fn load_config<P: AsRef<Path>>(path: P) -> Result<Config, ConfigError> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadFile {
        path: path.to_path_buf(),
        source: e,
    })?;

    load_config_from_str(&content)
}

pub fn load_config_from_str(content: &str) -> Result<Config, ConfigError> {
    let json_value: serde_json::Value = serde_json::from_str(content)?;

    validate_schema(&json_value)?;

    let config: Config = serde_json::from_value(json_value)?;

    validate_config(&config)?;

    Ok(config)
}

/// Loads the process configuration.
///
/// Reads `HARVEST_CONFIG` (or `./harvest.json` when present), falls back to
/// defaults, then applies `HARVEST_*` environment overrides.
pub fn load_from_env() -> Result<Config, ConfigError> {
    load_with(|name| std::env::var(name).ok())
}

/// Same as [`load_from_env`] with an injectable variable lookup.
pub fn load_with<F>(lookup: F) -> Result<Config, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let mut config = match lookup("HARVEST_CONFIG") {
        Some(path) => load_config(PathBuf::from(path))?,
        None if Path::new(DEFAULT_CONFIG_FILE).is_file() => load_config(DEFAULT_CONFIG_FILE)?,
        None => Config::default(),
    };

    apply_env_overrides(&mut config, lookup)?;
    validate_config(&config)?;
    Ok(config)
}

fn apply_env_overrides<F>(config: &mut Config, lookup: F) -> Result<(), ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(host) = lookup("HARVEST_HOST") {
        config.server.host = host;
    }
    if let Some(port) = lookup("HARVEST_PORT") {
        config.server.port = parse_env("HARVEST_PORT", &port)?;
    }
    if let Some(path) = lookup("HARVEST_DATABASE_PATH") {
        config.database.path = Some(path);
    }
    if let Some(endpoint) = lookup("HARVEST_EXTRACTOR_ENDPOINT") {
        config.extractor.kind = ExtractorKind::Http;
        config.extractor.endpoint = Some(endpoint);
    }
    if let Some(workers) = lookup("HARVEST_WORKERS") {
        config.runner.worker_count = parse_env("HARVEST_WORKERS", &workers)?;
    }
    Ok(())
}

fn parse_env<T>(name: &str, value: &str) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    value.trim().parse().map_err(|e: T::Err| ConfigError::InvalidEnv {
        name: name.to_string(),
        reason: e.to_string(),
    })
}

fn validate_schema(json_value: &serde_json::Value) -> Result<(), ConfigError> {
    let schema: serde_json::Value =
        serde_json::from_str(SCHEMA_JSON).map_err(|e| ConfigError::Validation {
            message: format!("Invalid embedded schema JSON: {}", e),
        })?;

    let validator = jsonschema::validator_for(&schema).map_err(|e| ConfigError::Validation {
        message: format!("Failed to compile JSON schema: {}", e),
    })?;

    let error_messages: Vec<String> = validator
        .iter_errors(json_value)
        .map(|e| e.to_string())
        .collect();
    if !error_messages.is_empty() {
        return Err(ConfigError::SchemaValidation {
            errors: error_messages.join("; "),
        });
    }

    Ok(())
}

fn validate_config(config: &Config) -> Result<(), ConfigError> {
    if config.version != CONFIG_VERSION {
        return Err(ConfigError::Validation {
            message: format!("Unsupported config version: {}", config.version),
        });
    }

    let runner = &config.runner;
    if runner.worker_count == 0 {
        return Err(ConfigError::Validation {
            message: "runner.worker_count must be at least 1".to_string(),
        });
    }
    if runner.observer_buffer == 0 {
        return Err(ConfigError::Validation {
            message: "runner.observer_buffer must be at least 1".to_string(),
        });
    }
    if runner.default_max_results == 0 || runner.default_max_results > runner.max_results_limit {
        return Err(ConfigError::Validation {
            message: format!(
                "runner.default_max_results ({}) must be between 1 and max_results_limit ({})",
                runner.default_max_results, runner.max_results_limit
            ),
        });
    }

    if config.extractor.kind == ExtractorKind::Http {
        match config.extractor.endpoint.as_deref() {
            Some(endpoint) if endpoint.starts_with("http://") || endpoint.starts_with("https://") => {}
            Some(endpoint) => {
                return Err(ConfigError::Validation {
                    message: format!(
                        "extractor.endpoint must be an http(s) URL, got '{}'",
                        crate::sanitize::redact_url(endpoint)
                    ),
                });
            }
            None => {
                return Err(ConfigError::Validation {
                    message: "extractor.endpoint is required when extractor.kind is \"http\""
                        .to_string(),
                });
            }
        }
    }

    Ok(())
}
