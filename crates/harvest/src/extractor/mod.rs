//! Turning a query into structured records.
//!
//! The runner only sees the [`Extractor`] trait. How records are acquired
//! (canned data, a remote service) is up to the implementation.

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

use crate::config::{ExtractorConfig, ExtractorKind};
use crate::error::ConfigError;
use crate::job::ExtractedRecord;

pub mod http;
pub mod sample;

pub use http::HttpExtractor;
pub use sample::SampleExtractor;

#[derive(Error, Debug)]
pub enum ExtractionError {
    #[error("request to extraction service failed: {0}")]
    Request(String),

    #[error("extraction service returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("invalid response from extraction service: {0}")]
    Decode(String),

    #[error("{0}")]
    Failed(String),
}

/// A source of records for a query.
///
/// Implementations must tolerate concurrent calls; the runner invokes
/// `extract` from several workers at once.
#[async_trait]
pub trait Extractor: Send + Sync {
    /// Returns at most `max_results` records. An empty vector is a valid
    /// answer; the runner decides what it means for the job.
    async fn extract(
        &self,
        query: &str,
        max_results: u32,
    ) -> Result<Vec<ExtractedRecord>, ExtractionError>;

    /// Short name used in logs.
    fn name(&self) -> &str;
}

/// Builds the extractor selected in the configuration.
pub fn from_config(config: &ExtractorConfig) -> Result<Arc<dyn Extractor>, ConfigError> {
    match config.kind {
        ExtractorKind::Sample => Ok(Arc::new(SampleExtractor::with_delay_ms(
            config.sample_delay_ms,
        ))),
        ExtractorKind::Http => {
            let endpoint = config.endpoint.as_deref().ok_or_else(|| ConfigError::Validation {
                message: "extractor.endpoint is required when extractor.kind is \"http\""
                    .to_string(),
            })?;
            let extractor = HttpExtractor::new(
                endpoint,
                config.connect_timeout_secs,
                config.timeout_secs,
            )
            .map_err(|e| ConfigError::Validation {
                message: e.to_string(),
            })?;
            Ok(Arc::new(extractor))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_config_sample_by_default() {
        let extractor = from_config(&ExtractorConfig::default()).unwrap();
        assert_eq!(extractor.name(), "sample");
    }

    #[test]
    fn test_from_config_http_requires_endpoint() {
        let config = ExtractorConfig {
            kind: ExtractorKind::Http,
            endpoint: None,
            ..Default::default()
        };
        assert!(matches!(
            from_config(&config),
            Err(ConfigError::Validation { .. })
        ));
    }

    #[test]
    fn test_from_config_http() {
        let config = ExtractorConfig {
            kind: ExtractorKind::Http,
            endpoint: Some("http://127.0.0.1:9/extract".to_string()),
            ..Default::default()
        };
        assert_eq!(from_config(&config).unwrap().name(), "http");
    }
}
