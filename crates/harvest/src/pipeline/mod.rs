pub mod progress;
pub mod runner;

pub use progress::{BusProgress, NoopProgress, ProgressReporter, Stage};
pub use runner::{JobOutcome, JobPipeline, NO_DATA_REASON};
