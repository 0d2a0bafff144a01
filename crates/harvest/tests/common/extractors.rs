//! Extractors with scripted behavior for lifecycle tests.

#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Semaphore;

use harvest::extractor::{ExtractionError, Extractor, SampleExtractor};
use harvest::ExtractedRecord;

/// Blocks every call until [`GatedExtractor::open`] releases it, then
/// answers like the sample extractor.
pub struct GatedExtractor {
    gate: Arc<Semaphore>,
    entered: AtomicUsize,
    inner: SampleExtractor,
}

impl GatedExtractor {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            gate: Arc::new(Semaphore::new(0)),
            entered: AtomicUsize::new(0),
            inner: SampleExtractor::new(),
        })
    }

    /// Lets `calls` pending or future extractions through.
    pub fn open(&self, calls: usize) {
        self.gate.add_permits(calls);
    }

    /// Number of calls that reached the gate.
    pub fn entered(&self) -> usize {
        self.entered.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Extractor for GatedExtractor {
    async fn extract(
        &self,
        query: &str,
        max_results: u32,
    ) -> Result<Vec<ExtractedRecord>, ExtractionError> {
        self.entered.fetch_add(1, Ordering::SeqCst);
        let permit = self
            .gate
            .acquire()
            .await
            .map_err(|e| ExtractionError::Failed(e.to_string()))?;
        permit.forget();
        self.inner.extract(query, max_results).await
    }

    fn name(&self) -> &str {
        "gated"
    }
}

/// Fails every query containing "fail", panics on queries containing
/// "panic", returns nothing for "empty", and answers like the sample
/// extractor otherwise.
pub struct ScriptedExtractor {
    inner: SampleExtractor,
}

impl ScriptedExtractor {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            inner: SampleExtractor::new(),
        })
    }
}

#[async_trait]
impl Extractor for ScriptedExtractor {
    async fn extract(
        &self,
        query: &str,
        max_results: u32,
    ) -> Result<Vec<ExtractedRecord>, ExtractionError> {
        if query.contains("panic") {
            panic!("scripted panic for '{}'", query);
        }
        if query.contains("fail") {
            return Err(ExtractionError::Failed(format!(
                "search backend unavailable for '{}'",
                query
            )));
        }
        if query.contains("empty") {
            return Ok(Vec::new());
        }
        self.inner.extract(query, max_results).await
    }

    fn name(&self) -> &str {
        "scripted"
    }
}
