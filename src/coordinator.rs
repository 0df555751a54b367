//! Shutdown coordination.
//!
//! A [`Coordinator`] tracks background work and owned resources for the life
//! of a process, then finalizes them exactly once:
//!
//! 1. New work and registrations are refused.
//! 2. Every tracked task is awaited.
//! 3. Resources are released in registration order; failures go to the
//!    error sink and do not stop the pass.
//!
//! ```no_run
//! use conductor::{Coordinator, release_fn};
//!
//! #[tokio::main]
//! async fn main() {
//!     let coordinator = Coordinator::logging();
//!     coordinator
//!         .spawn(async { /* background work */ })
//!         .unwrap();
//!     coordinator
//!         .register(release_fn("socket", || Ok(())))
//!         .unwrap();
//!     coordinator.shutdown_now().await;
//! }
//! ```

use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::runtime::Handle;
use tokio::sync::{RwLock, RwLockReadGuard, watch};
use tracing::{debug, error, info, warn};

use crate::error::{CoordinatorError, ReleaseError};
use crate::resource::Releasable;
use crate::signals::{Signal, SignalRegistrar};
use crate::task_counter::TaskCounter;

/// Stage of the shutdown sequence. Transitions only move forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Phase {
    /// Accepting work and resources.
    Running,
    /// Waiting for tracked tasks to finish.
    Draining,
    /// Releasing resources in registration order.
    Releasing,
    /// Every resource has been released.
    Finished,
}

/// Callback that observes release failures.
pub type ErrorSink = Arc<dyn Fn(ReleaseError) + Send + Sync>;

struct Inner {
    runtime: Handle,
    tasks: Arc<TaskCounter>,
    // shared by spawn/register, exclusive for the shutdown pass
    gate: RwLock<()>,
    resources: Mutex<Vec<Box<dyn Releasable>>>,
    phase: watch::Sender<Phase>,
    sink: ErrorSink,
}

/// Handle to a shutdown coordinator.
///
/// Clones share state; hand one to every component that spawns work or owns
/// a resource.
#[derive(Clone)]
pub struct Coordinator {
    inner: Arc<Inner>,
}

impl fmt::Debug for Coordinator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Coordinator")
            .field("phase", &self.phase())
            .field("live_tasks", &self.live_tasks())
            .field("resources", &self.resource_count())
            .finish()
    }
}

impl Coordinator {
    /// Create a coordinator on the current Tokio runtime.
    ///
    /// # Panics
    ///
    /// Panics when called outside a Tokio runtime. Use
    /// [`Coordinator::with_runtime`] to pass a handle explicitly.
    pub fn new<F>(sink: F) -> Self
    where
        F: Fn(ReleaseError) + Send + Sync + 'static,
    {
        Self::with_runtime(Handle::current(), sink)
    }

    /// Create a coordinator that schedules work on `runtime`.
    pub fn with_runtime<F>(runtime: Handle, sink: F) -> Self
    where
        F: Fn(ReleaseError) + Send + Sync + 'static,
    {
        let (phase, _) = watch::channel(Phase::Running);
        Self {
            inner: Arc::new(Inner {
                runtime,
                tasks: Arc::new(TaskCounter::new()),
                gate: RwLock::new(()),
                resources: Mutex::new(Vec::new()),
                phase,
                sink: Arc::new(sink),
            }),
        }
    }

    /// Create a coordinator whose error sink logs failures with `tracing`.
    pub fn logging() -> Self {
        Self::new(|e: ReleaseError| {
            error!(resource = %e.resource, error = %e.source, "release failed");
        })
    }

    /// Current stage of the shutdown sequence.
    pub fn phase(&self) -> Phase {
        *self.inner.phase.borrow()
    }

    /// Number of spawned units still running.
    pub fn live_tasks(&self) -> usize {
        self.inner.tasks.live()
    }

    /// Number of resources waiting to be released.
    pub fn resource_count(&self) -> usize {
        self.resources().len()
    }

    /// Run `work` on the runtime and hold shutdown until it completes.
    ///
    /// The task is counted before it is scheduled and uncounted when it
    /// finishes, panics included. Fails only once shutdown has begun, in
    /// which case `work` is dropped without running.
    pub fn spawn<F>(&self, work: F) -> Result<(), CoordinatorError>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let _gate = self.enter("spawn")?;
        let token = self.inner.tasks.track();
        debug!(live = self.live_tasks(), "spawning tracked task");
        self.inner.runtime.spawn(async move {
            let _token = token;
            work.await;
        });
        Ok(())
    }

    /// Run a blocking closure on the runtime's blocking pool and hold
    /// shutdown until it returns.
    pub fn spawn_blocking<F>(&self, work: F) -> Result<(), CoordinatorError>
    where
        F: FnOnce() + Send + 'static,
    {
        let _gate = self.enter("spawn_blocking")?;
        let token = self.inner.tasks.track();
        debug!(live = self.live_tasks(), "spawning tracked blocking task");
        self.inner.runtime.spawn_blocking(move || {
            let _token = token;
            work();
        });
        Ok(())
    }

    /// Register a single resource. See [`Coordinator::register_resources`].
    pub fn register<R>(&self, resource: R) -> Result<(), CoordinatorError>
    where
        R: Releasable + 'static,
    {
        self.register_resources([Box::new(resource) as Box<dyn Releasable>])
    }

    /// Append resources, in iteration order, to the release list.
    ///
    /// After shutdown has begun the resources are dropped unreleased and
    /// [`CoordinatorError::ShuttingDown`] is returned.
    pub fn register_resources<I>(&self, resources: I) -> Result<(), CoordinatorError>
    where
        I: IntoIterator<Item = Box<dyn Releasable>>,
    {
        let _gate = self.enter("register")?;
        let mut list = self.resources();
        let before = list.len();
        list.extend(resources);
        debug!(added = list.len() - before, total = list.len(), "registered resources");
        Ok(())
    }

    fn resources(&self) -> MutexGuard<'_, Vec<Box<dyn Releasable>>> {
        // a panic inside a caller's resource iterator must not wedge shutdown
        self.inner
            .resources
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Take the shared side of the gate, refusing once shutdown has begun.
    fn enter(&self, op: &'static str) -> Result<RwLockReadGuard<'_, ()>, CoordinatorError> {
        // the only writer is the shutdown pass, so a failed try_read means shutdown
        let guard = self.inner.gate.try_read().ok();
        match guard {
            Some(guard) if self.phase() == Phase::Running => Ok(guard),
            _ => {
                warn!(op, phase = ?self.phase(), "rejected: coordinator is shutting down");
                Err(CoordinatorError::ShuttingDown)
            }
        }
    }

    fn set_phase(&self, phase: Phase) {
        self.inner.phase.send_replace(phase);
        info!(?phase, "shutdown phase");
    }

    /// Wait for tracked work, then release every resource.
    ///
    /// Returns once every task has completed and every resource has had its
    /// release attempted exactly once, in registration order. Failures are
    /// reported to the error sink only.
    ///
    /// Only the first call starts the sequence, and it runs as its own task on
    /// the runtime: dropping this future (a timeout, a `select!`) stops the
    /// wait, not the shutdown. Later or concurrent calls wait until it is
    /// [`Phase::Finished`] and return.
    pub async fn shutdown_now(&self) {
        let started = self.inner.phase.send_if_modified(|phase| {
            if *phase == Phase::Running {
                *phase = Phase::Draining;
                true
            } else {
                false
            }
        });
        if started {
            info!(phase = ?Phase::Draining, "shutdown phase");
            let coordinator = self.clone();
            self.inner
                .runtime
                .spawn(async move { coordinator.drain_and_release().await });
        } else {
            debug!("shutdown already in progress; waiting for it to finish");
        }
        self.wait_finished().await;
    }

    async fn drain_and_release(&self) {
        let _gate = self.inner.gate.write().await;

        info!(live = self.live_tasks(), "draining tracked tasks");
        self.inner.tasks.wait_idle().await;

        self.set_phase(Phase::Releasing);
        let resources = std::mem::take(&mut *self.resources());
        let total = resources.len();
        let mut failed = 0usize;
        for mut resource in resources {
            let name = resource.name().to_string();
            match resource.release().await {
                Ok(()) => debug!(resource = %name, "released"),
                Err(source) => {
                    failed += 1;
                    warn!(resource = %name, error = %source, "release failed");
                    (self.inner.sink)(ReleaseError {
                        resource: name,
                        source,
                    });
                }
            }
        }
        info!(total, failed, "release pass complete");

        self.set_phase(Phase::Finished);
    }

    /// Resolve once the shutdown sequence has finished.
    pub async fn wait_finished(&self) {
        let mut rx = self.inner.phase.subscribe();
        // the sender lives in `self`, so the channel cannot close while we wait
        let _ = rx.wait_for(|phase| *phase == Phase::Finished).await;
    }

    /// Bind shutdown to `signals` and block until it has completed.
    ///
    /// The first delivery of any bound signal starts [`shutdown_now`] on the
    /// runtime. Later deliveries are ignored. The call also returns if
    /// shutdown is driven to completion some other way.
    ///
    /// [`shutdown_now`]: Coordinator::shutdown_now
    pub async fn shutdown_on_signals<R>(
        &self,
        registrar: &mut R,
        signals: &[Signal],
    ) -> Result<(), CoordinatorError>
    where
        R: SignalRegistrar + ?Sized,
    {
        let fired = Arc::new(AtomicBool::new(false));
        for &signal in signals {
            let coordinator = self.clone();
            let fired = Arc::clone(&fired);
            registrar.register(
                signal,
                Arc::new(move |received: Signal| {
                    if fired.swap(true, Ordering::AcqRel) {
                        debug!(signal = %received, "shutdown already triggered; ignoring signal");
                        return;
                    }
                    info!(signal = %received, "signal received; shutting down");
                    let coordinator = coordinator.clone();
                    coordinator
                        .inner
                        .runtime
                        .clone()
                        .spawn(async move { coordinator.shutdown_now().await });
                }),
            )?;
        }
        info!(?signals, "waiting for shutdown signal");
        self.wait_finished().await;
        Ok(())
    }
}
