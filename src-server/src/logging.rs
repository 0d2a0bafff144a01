//! Process-wide log and trace output.
//!
//! The library logs through the `log` facade and opens `tracing` spans; both
//! end up in one `tracing-subscriber` pipeline.

use thiserror::Error;
use tracing_log::LogTracer;
use tracing_subscriber::{layer::SubscriberExt, EnvFilter};

use harvest::config::LoggingConfig;

#[derive(Debug, Error)]
pub enum LoggingError {
    #[error("invalid log filter '{filter}': {source}")]
    Filter {
        filter: String,
        #[source]
        source: tracing_subscriber::filter::ParseError,
    },

    #[error("a global subscriber is already installed: {0}")]
    Subscriber(#[from] tracing::subscriber::SetGlobalDefaultError),

    #[error("a log bridge is already installed: {0}")]
    Bridge(#[from] log::SetLoggerError),
}

/// `RUST_LOG` wins over the configured level.
fn env_filter(config: &LoggingConfig) -> Result<EnvFilter, LoggingError> {
    if let Ok(filter) = EnvFilter::try_from_default_env() {
        return Ok(filter);
    }
    let directives = format!("{},tower_http=info", config.level);
    EnvFilter::try_new(&directives).map_err(|source| LoggingError::Filter {
        filter: directives,
        source,
    })
}

/// Installs the global subscriber and the `log` bridge. Call once.
pub fn init(config: &LoggingConfig) -> Result<(), LoggingError> {
    let registry = tracing_subscriber::registry().with(env_filter(config)?);

    if config.json {
        tracing::subscriber::set_global_default(
            registry.with(tracing_subscriber::fmt::layer().json().with_current_span(true)),
        )?;
    } else {
        tracing::subscriber::set_global_default(
            registry.with(tracing_subscriber::fmt::layer().with_target(true)),
        )?;
    }

    LogTracer::init()?;
    Ok(())
}
