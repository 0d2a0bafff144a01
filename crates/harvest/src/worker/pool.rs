use std::any::Any;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use log::{debug, error, info};
use serde::Serialize;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::task::JoinHandle;

use crate::broadcast::ProgressBus;
use crate::error::WorkerError;
use crate::job::JobId;
use crate::pipeline::{BusProgress, JobOutcome, JobPipeline};

#[derive(Default)]
struct Counters {
    queued: AtomicUsize,
    in_flight: AtomicUsize,
    completed: AtomicU64,
    failed: AtomicU64,
}

/// Point-in-time view of the pool.
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct WorkerStats {
    pub workers: usize,
    pub queued: usize,
    pub in_flight: usize,
    pub completed: u64,
    pub failed: u64,
}

/// Fixed set of tokio workers pulling job ids from an unbounded queue.
///
/// Submission never waits; at most `worker_count` jobs execute at once.
/// Each job runs in its own task so a panic only takes that job down.
pub struct WorkerPool {
    sender: Mutex<Option<UnboundedSender<JobId>>>,
    workers: Mutex<Vec<JoinHandle<()>>>,
    worker_count: usize,
    shutdown: AtomicBool,
    counters: Arc<Counters>,
}

impl WorkerPool {
    /// Spawns the workers on the current tokio runtime.
    pub fn new(pipeline: Arc<JobPipeline>, bus: ProgressBus, worker_count: usize) -> Self {
        let worker_count = worker_count.max(1);
        let (sender, receiver) = mpsc::unbounded_channel::<JobId>();
        let receiver = Arc::new(tokio::sync::Mutex::new(receiver));
        let counters = Arc::new(Counters::default());

        let workers = (0..worker_count)
            .map(|worker_id| {
                tokio::spawn(run_worker(
                    worker_id,
                    Arc::clone(&receiver),
                    Arc::clone(&pipeline),
                    bus.clone(),
                    Arc::clone(&counters),
                ))
            })
            .collect();

        info!("Started {} workers", worker_count);

        Self {
            sender: Mutex::new(Some(sender)),
            workers: Mutex::new(workers),
            worker_count,
            shutdown: AtomicBool::new(false),
            counters,
        }
    }

    pub fn submit(&self, job_id: JobId) -> Result<(), WorkerError> {
        if self.shutdown.load(Ordering::Acquire) {
            return Err(WorkerError::ChannelClosed);
        }

        let guard = self.sender.lock().map_err(|_| WorkerError::ChannelClosed)?;
        let sender = guard.as_ref().ok_or(WorkerError::ChannelClosed)?;
        self.counters.queued.fetch_add(1, Ordering::AcqRel);
        sender.send(job_id).map_err(|_| {
            self.counters.queued.fetch_sub(1, Ordering::AcqRel);
            WorkerError::ChannelClosed
        })
    }

    /// Stops accepting jobs. Already queued jobs still run.
    pub fn shutdown(&self) {
        if self.shutdown.swap(true, Ordering::AcqRel) {
            return;
        }
        info!("Shutting down worker pool...");
        match self.sender.lock() {
            Ok(mut guard) => {
                guard.take();
            }
            Err(poisoned) => {
                log::warn!("Worker pool sender lock was poisoned, recovering");
                poisoned.into_inner().take();
            }
        }
    }

    /// Waits for every worker to drain the queue and exit.
    ///
    /// Call [`shutdown`](Self::shutdown) first, otherwise this waits forever.
    pub async fn wait(&self) {
        let workers = match self.workers.lock() {
            Ok(mut guard) => std::mem::take(&mut *guard),
            Err(poisoned) => std::mem::take(&mut *poisoned.into_inner()),
        };

        for (i, worker) in workers.into_iter().enumerate() {
            if let Err(e) = worker.await {
                error!("Worker {} panicked: {}", i, e);
            } else {
                debug!("Worker {} finished", i);
            }
        }

        info!("All workers have stopped");
    }

    pub fn is_shutdown(&self) -> bool {
        self.shutdown.load(Ordering::Acquire)
    }

    pub fn stats(&self) -> WorkerStats {
        WorkerStats {
            workers: self.worker_count,
            queued: self.counters.queued.load(Ordering::Acquire),
            in_flight: self.counters.in_flight.load(Ordering::Acquire),
            completed: self.counters.completed.load(Ordering::Acquire),
            failed: self.counters.failed.load(Ordering::Acquire),
        }
    }
}

async fn run_worker(
    worker_id: usize,
    receiver: Arc<tokio::sync::Mutex<UnboundedReceiver<JobId>>>,
    pipeline: Arc<JobPipeline>,
    bus: ProgressBus,
    counters: Arc<Counters>,
) {
    debug!("Worker {} started", worker_id);

    loop {
        let next = { receiver.lock().await.recv().await };
        let Some(job_id) = next else {
            debug!("Worker {} job channel closed", worker_id);
            break;
        };

        counters.queued.fetch_sub(1, Ordering::AcqRel);
        counters.in_flight.fetch_add(1, Ordering::AcqRel);
        debug!("Worker {} processing job {}", worker_id, job_id);

        let task_pipeline = Arc::clone(&pipeline);
        let progress = BusProgress::new(job_id, bus.clone());
        let handle = tokio::spawn(async move { task_pipeline.run(job_id, &progress).await });

        let outcome = match handle.await {
            Ok(outcome) => outcome,
            Err(e) => {
                let reason = if e.is_panic() {
                    format!("job task panicked: {}", panic_message(e.into_panic()))
                } else {
                    "job task was cancelled".to_string()
                };
                error!("Worker {} lost job {}: {}", worker_id, job_id, reason);
                let progress = BusProgress::new(job_id, bus.clone());
                pipeline.abort(job_id, reason, &progress).await
            }
        };

        match outcome {
            JobOutcome::Completed { .. } => {
                counters.completed.fetch_add(1, Ordering::AcqRel);
            }
            JobOutcome::Failed { .. } => {
                counters.failed.fetch_add(1, Ordering::AcqRel);
            }
            JobOutcome::Skipped { .. } => {}
        }
        counters.in_flight.fetch_sub(1, Ordering::AcqRel);
    }

    debug!("Worker {} stopped", worker_id);
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
