//! Extractor that delegates to a remote extraction service.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use super::{ExtractionError, Extractor};
use crate::job::ExtractedRecord;
use crate::sanitize;

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ExtractRequest<'a> {
    query: &'a str,
    max_results: u32,
}

/// The service may answer with a bare array or wrap it in `{"items": [...]}`.
#[derive(Deserialize)]
#[serde(untagged)]
enum ExtractResponse {
    Items(Vec<ExtractedRecord>),
    Wrapped { items: Vec<ExtractedRecord> },
}

impl ExtractResponse {
    fn into_records(self) -> Vec<ExtractedRecord> {
        match self {
            ExtractResponse::Items(items) | ExtractResponse::Wrapped { items } => items,
        }
    }
}

/// POSTs `{"query", "maxResults"}` to `endpoint` and decodes the records.
pub struct HttpExtractor {
    client: Client,
    endpoint: String,
}

impl HttpExtractor {
    pub fn new(
        endpoint: &str,
        connect_timeout_secs: u64,
        timeout_secs: u64,
    ) -> Result<Self, ExtractionError> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(connect_timeout_secs))
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .map_err(|e| ExtractionError::Request(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            endpoint: endpoint.to_string(),
        })
    }
}

#[async_trait]
impl Extractor for HttpExtractor {
    async fn extract(
        &self,
        query: &str,
        max_results: u32,
    ) -> Result<Vec<ExtractedRecord>, ExtractionError> {
        log::debug!(
            "Requesting extraction from {}",
            sanitize::redact_url(&self.endpoint)
        );

        let response = self
            .client
            .post(&self.endpoint)
            .json(&ExtractRequest { query, max_results })
            .send()
            .await
            .map_err(|e| ExtractionError::Request(e.without_url().to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(ExtractionError::Status {
                status: status.as_u16(),
                body: sanitize::truncate(&body, 200),
            });
        }

        let decoded: ExtractResponse = response
            .json()
            .await
            .map_err(|e| ExtractionError::Decode(e.without_url().to_string()))?;

        let mut records = decoded.into_records();
        records.truncate(max_results as usize);
        Ok(records)
    }

    fn name(&self) -> &str {
        "http"
    }
}
