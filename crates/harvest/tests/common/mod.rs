//! Shared test utilities for harvest integration tests.
//!
//! This module provides:
//! - `TestHarness` wiring a file-backed store, a bus and a runner
//! - Extractors with controllable behavior (gated, failing, panicking)

pub mod extractors;
pub mod harness;

pub use extractors::*;
pub use harness::{TestHarness, WAIT_LIMIT};
