//! Shutdown coordination for long-running processes.
//!
//! A [`Coordinator`] tracks spawned background work and registered
//! [`Releasable`] resources. Shutdown, either explicit through
//! [`Coordinator::shutdown_now`] or triggered by a [`Signal`], waits for every
//! task and then releases every resource once, in registration order.

pub mod config;
mod coordinator;
mod error;
pub mod logging;
mod resource;
pub mod signals;
mod task_counter;

pub use coordinator::{Coordinator, ErrorSink, Phase};
pub use error::{CoordinatorError, ReleaseError};
pub use resource::{BoxError, ReleaseFn, Releasable, release_fn};
pub use signals::{ManualSignals, Signal, SignalHandler, SignalRegistrar, TokioSignals};
pub use task_counter::{TaskCounter, TaskToken};
