use crate::broadcast::{ProgressBus, ProgressEvent};
use crate::job::JobId;

/// Steps the pipeline reports while executing a job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Stage {
    Started,
    Extracting,
    Processing,
    Completed { items: u32 },
    Failed { reason: String },
}

impl Stage {
    /// Percentage shown to observers. Non-decreasing until a terminal stage.
    pub fn progress(&self) -> u8 {
        match self {
            Stage::Started => 10,
            Stage::Extracting => 30,
            Stage::Processing => 70,
            Stage::Completed { .. } => 100,
            Stage::Failed { .. } => 0,
        }
    }

    pub fn into_event(self, job_id: JobId) -> ProgressEvent {
        match self {
            Stage::Started => ProgressEvent::running(job_id, 10, "started"),
            Stage::Extracting => ProgressEvent::running(job_id, 30, "extracting"),
            Stage::Processing => ProgressEvent::running(job_id, 70, "processing"),
            Stage::Completed { items } => ProgressEvent::completed(job_id, items as usize),
            Stage::Failed { reason } => ProgressEvent::failed(job_id, &reason),
        }
    }
}

pub trait ProgressReporter: Send + Sync {
    fn report(&self, stage: Stage);
}

/// No-op reporter for unit tests.
pub struct NoopProgress;

impl ProgressReporter for NoopProgress {
    fn report(&self, _stage: Stage) {}
}

/// Publishes one job's stages on the shared bus.
pub struct BusProgress {
    job_id: JobId,
    bus: ProgressBus,
}

impl BusProgress {
    pub fn new(job_id: JobId, bus: ProgressBus) -> Self {
        Self { job_id, bus }
    }
}

impl ProgressReporter for BusProgress {
    fn report(&self, stage: Stage) {
        let event = stage.into_event(self.job_id);
        let delivered = self.bus.publish(&event);
        log::debug!(
            "Job {} {}% '{}' delivered to {} observer(s)",
            self.job_id,
            event.progress,
            event.message,
            delivered
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::job::JobStatus;

    #[test]
    fn test_stage_events() {
        let started = Stage::Started.into_event(3);
        assert_eq!(started.status, JobStatus::Running);
        assert_eq!(started.progress, 10);
        assert_eq!(started.message, "started");

        let done = Stage::Completed { items: 2 }.into_event(3);
        assert_eq!(done.progress, 100);
        assert_eq!(done.message, "2 items extracted");

        let failed = Stage::Failed {
            reason: "no data extracted".to_string(),
        }
        .into_event(3);
        assert_eq!(failed.status, JobStatus::Failed);
        assert_eq!(failed.message, "Error: no data extracted");
    }

    #[test]
    fn test_running_stages_increase() {
        let stages = [Stage::Started, Stage::Extracting, Stage::Processing];
        assert!(stages.windows(2).all(|w| w[0].progress() < w[1].progress()));
        assert_eq!(Stage::Completed { items: 0 }.progress(), 100);
    }

    #[tokio::test]
    async fn test_bus_progress_publishes() {
        let bus = ProgressBus::new();
        let mut sub = bus.subscribe(4);
        BusProgress::new(9, bus.clone()).report(Stage::Extracting);

        let event = sub.recv().await.unwrap();
        assert_eq!(event.job_id, 9);
        assert_eq!(event.progress, 30);
    }
}
