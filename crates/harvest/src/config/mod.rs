pub mod loader;
pub mod schema;

pub use loader::{load_config, load_config_from_str, load_from_env, load_with};
pub use schema::{
    Config, DatabaseConfig, ExtractorConfig, ExtractorKind, LoggingConfig, RunnerConfig,
    ServerConfig,
};
