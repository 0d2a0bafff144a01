//! In-process fan-out of job progress to connected observers.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use thiserror::Error;
use tokio::sync::mpsc;

use super::event::ProgressEvent;

/// Why an observer could not take an event.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ObserverDeliveryError {
    #[error("observer disconnected")]
    Disconnected,

    #[error("observer fell behind")]
    Lagged,
}

/// Something that wants to hear about job progress.
///
/// `deliver` must not block. An error removes the observer from the bus.
pub trait Observer: Send + Sync {
    fn deliver(&self, event: &ProgressEvent) -> Result<(), ObserverDeliveryError>;
}

/// Identifies one registration on a [`ProgressBus`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ObserverHandle(u64);

impl ObserverHandle {
    pub fn id(&self) -> u64 {
        self.0
    }
}

type ObserverMap = HashMap<ObserverHandle, Arc<dyn Observer>>;

struct BusInner {
    observers: RwLock<Arc<ObserverMap>>,
    next_id: AtomicU64,
}

/// Registry of observers with copy-on-write publishing.
///
/// `publish` clones the current map `Arc` and delivers without holding the
/// lock, so registrations made during a publish only see later events.
/// Cloning the bus shares the same registry.
#[derive(Clone)]
pub struct ProgressBus {
    inner: Arc<BusInner>,
}

impl Default for ProgressBus {
    fn default() -> Self {
        Self::new()
    }
}

impl ProgressBus {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(BusInner {
                observers: RwLock::new(Arc::new(HashMap::new())),
                next_id: AtomicU64::new(1),
            }),
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, Arc<ObserverMap>> {
        match self.inner.observers.read() {
            Ok(g) => g,
            Err(poisoned) => {
                log::warn!("Progress bus lock was poisoned, recovering");
                poisoned.into_inner()
            }
        }
    }

    fn write(&self) -> RwLockWriteGuard<'_, Arc<ObserverMap>> {
        match self.inner.observers.write() {
            Ok(g) => g,
            Err(poisoned) => {
                log::warn!("Progress bus lock was poisoned, recovering");
                poisoned.into_inner()
            }
        }
    }

    pub fn register(&self, observer: Arc<dyn Observer>) -> ObserverHandle {
        let handle = ObserverHandle(self.inner.next_id.fetch_add(1, Ordering::Relaxed));
        let mut guard = self.write();
        let mut next = ObserverMap::clone(&guard);
        next.insert(handle, observer);
        *guard = Arc::new(next);
        log::debug!("Registered observer {} ({} total)", handle.0, guard.len());
        handle
    }

    /// Removes a registration. Returns `false` if it was already gone.
    pub fn unregister(&self, handle: ObserverHandle) -> bool {
        let mut guard = self.write();
        if !guard.contains_key(&handle) {
            return false;
        }
        let mut next = ObserverMap::clone(&guard);
        next.remove(&handle);
        *guard = Arc::new(next);
        log::debug!("Unregistered observer {} ({} left)", handle.0, guard.len());
        true
    }

    /// Delivers `event` to every observer registered right now.
    ///
    /// Observers that fail are unregistered; the others still get the event.
    /// Returns the number of successful deliveries.
    pub fn publish(&self, event: &ProgressEvent) -> usize {
        let snapshot = Arc::clone(&self.read());

        let mut delivered = 0;
        let mut failed = Vec::new();
        for (handle, observer) in snapshot.iter() {
            match observer.deliver(event) {
                Ok(()) => delivered += 1,
                Err(e) => failed.push((*handle, e)),
            }
        }

        for (handle, err) in failed {
            log::warn!(
                "Dropping observer {} for job {} event: {}",
                handle.0,
                event.job_id,
                err
            );
            self.unregister(handle);
        }

        delivered
    }

    pub fn observer_count(&self) -> usize {
        self.read().len()
    }

    /// Registers a bounded channel observer and returns its receiving end.
    ///
    /// The registration is removed when the [`Subscription`] is dropped.
    pub fn subscribe(&self, capacity: usize) -> Subscription {
        let (observer, receiver) = ChannelObserver::new(capacity);
        let handle = self.register(Arc::new(observer));
        Subscription {
            receiver,
            handle,
            bus: self.clone(),
        }
    }
}

/// Observer that forwards events into a bounded tokio channel.
///
/// A full channel counts as [`ObserverDeliveryError::Lagged`]: the observer
/// is dropped instead of silently skipping events.
pub struct ChannelObserver {
    sender: mpsc::Sender<ProgressEvent>,
}

impl ChannelObserver {
    pub fn new(capacity: usize) -> (Self, mpsc::Receiver<ProgressEvent>) {
        let (sender, receiver) = mpsc::channel(capacity.max(1));
        (Self { sender }, receiver)
    }
}

impl Observer for ChannelObserver {
    fn deliver(&self, event: &ProgressEvent) -> Result<(), ObserverDeliveryError> {
        self.sender.try_send(event.clone()).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => ObserverDeliveryError::Lagged,
            mpsc::error::TrySendError::Closed(_) => ObserverDeliveryError::Disconnected,
        })
    }
}

/// Receiving side of [`ProgressBus::subscribe`].
pub struct Subscription {
    receiver: mpsc::Receiver<ProgressEvent>,
    handle: ObserverHandle,
    bus: ProgressBus,
}

impl Subscription {
    /// Waits for the next event. `None` once the bus has dropped this
    /// observer and the buffer is drained.
    pub async fn recv(&mut self) -> Option<ProgressEvent> {
        self.receiver.recv().await
    }

    pub fn try_recv(&mut self) -> Option<ProgressEvent> {
        self.receiver.try_recv().ok()
    }

    pub fn handle(&self) -> ObserverHandle {
        self.handle
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.bus.unregister(self.handle);
    }
}
