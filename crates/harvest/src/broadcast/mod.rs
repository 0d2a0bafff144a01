//! Real-time progress streaming.
//!
//! Jobs publish [`ProgressEvent`]s on a shared [`ProgressBus`]; every
//! connected observer gets its own copy.

pub mod event;
pub mod progress_bus;

pub use event::ProgressEvent;
pub use progress_bus::{
    ChannelObserver, Observer, ObserverDeliveryError, ObserverHandle, ProgressBus, Subscription,
};
