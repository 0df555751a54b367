//! Signal subscription boundary.
//!
//! The coordinator never talks to the operating system directly. It hands a
//! [`SignalHandler`] to a [`SignalRegistrar`], and the registrar invokes the
//! handler whenever the signal is delivered. [`TokioSignals`] is the OS-backed
//! registrar; [`ManualSignals`] lets a host raise signals itself.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde::Deserialize;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tracing::debug;


/// Termination signals a host can bind shutdown to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Signal {
    /// Interactive interrupt, usually Ctrl-C.
    #[serde(alias = "SIGINT")]
    Interrupt,
    /// Polite termination request from a supervisor.
    #[serde(alias = "SIGTERM")]
    Terminate,
    /// Controlling terminal closed.
    #[serde(alias = "SIGHUP")]
    Hangup,
    /// Quit request from the terminal.
    #[serde(alias = "SIGQUIT")]
    Quit,
    /// First user-defined signal.
    #[serde(alias = "SIGUSR1")]
    User1,
    /// Second user-defined signal.
    #[serde(alias = "SIGUSR2")]
    User2,
}

impl fmt::Display for Signal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Signal::Interrupt => "SIGINT",
            Signal::Terminate => "SIGTERM",
            Signal::Hangup => "SIGHUP",
            Signal::Quit => "SIGQUIT",
            Signal::User1 => "SIGUSR1",
            Signal::User2 => "SIGUSR2",
        };
        f.write_str(name)
    }
}

/// Callback invoked once per delivery of a bound signal.
pub type SignalHandler = Arc<dyn Fn(Signal) + Send + Sync>;

/// Delivery mechanism that shutdown handlers are bound to.
pub trait SignalRegistrar {
    /// Bind `handler` so it runs every time `signal` is delivered.
    fn register(&mut self, signal: Signal, handler: SignalHandler) -> std::io::Result<()>;
}

/// Registrar backed by `tokio::signal`.
///
/// Each bound signal gets a listener task on the registrar's runtime. The
/// listeners are aborted when the registrar is dropped, so keep it alive for
/// as long as the handlers should fire.
pub struct TokioSignals {
    runtime: Handle,
    listeners: Vec<JoinHandle<()>>,
}

impl TokioSignals {
    /// Create a registrar on the current Tokio runtime.
    ///
    /// # Panics
    ///
    /// Panics when called outside a Tokio runtime. Use
    /// [`TokioSignals::with_runtime`] to pass a handle explicitly.
    pub fn new() -> Self {
        Self::with_runtime(Handle::current())
    }

    /// Create a registrar whose listeners run on `runtime`.
    pub fn with_runtime(runtime: Handle) -> Self {
        Self {
            runtime,
            listeners: Vec::new(),
        }
    }

    /// Number of listeners still running.
    pub fn listening(&self) -> usize {
        self.listeners.iter().filter(|l| !l.is_finished()).count()
    }
}

impl Drop for TokioSignals {
    fn drop(&mut self) {
        for listener in self.listeners.drain(..) {
            listener.abort();
        }
    }
}

impl SignalRegistrar for TokioSignals {
    #[cfg(unix)]
    fn register(&mut self, signal: Signal, handler: SignalHandler) -> std::io::Result<()> {
        use tokio::signal::unix::{SignalKind, signal as os_signal};

        let kind = match signal {
            Signal::Interrupt => SignalKind::interrupt(),
            Signal::Terminate => SignalKind::terminate(),
            Signal::Hangup => SignalKind::hangup(),
            Signal::Quit => SignalKind::quit(),
            Signal::User1 => SignalKind::user_defined1(),
            Signal::User2 => SignalKind::user_defined2(),
        };
        // the signal driver lives on the runtime, not the calling thread
        let mut stream = {
            let _rt = self.runtime.enter();
            os_signal(kind)?
        };
        debug!(%signal, "listening for signal");
        self.listeners.push(self.runtime.spawn(async move {
            while stream.recv().await.is_some() {
                debug!(%signal, "signal received");
                handler(signal);
            }
        }));
        Ok(())
    }

    #[cfg(not(unix))]
    fn register(&mut self, signal: Signal, handler: SignalHandler) -> std::io::Result<()> {
        if signal != Signal::Interrupt {
            return Err(std::io::Error::new(
                std::io::ErrorKind::Unsupported,
                format!("{signal} is not supported on this platform"),
            ));
        }
        debug!(%signal, "listening for ctrl-c");
        self.listeners.push(self.runtime.spawn(async move {
            while tokio::signal::ctrl_c().await.is_ok() {
                debug!(%signal, "signal received");
                handler(signal);
            }
        }));
        Ok(())
    }
}

/// Registrar whose deliveries are triggered in-process with [`raise`].
///
/// Clones share the same bindings.
///
/// [`raise`]: ManualSignals::raise
#[derive(Clone, Default)]
pub struct ManualSignals {
    handlers: Arc<Mutex<HashMap<Signal, Vec<SignalHandler>>>>,
}

impl ManualSignals {
    /// Create a registrar with nothing bound.
    pub fn new() -> Self {
        Self::default()
    }

    fn handlers(&self) -> MutexGuard<'_, HashMap<Signal, Vec<SignalHandler>>> {
        self.handlers.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Deliver `signal` to every handler bound to it. Returns how many
    /// handlers ran.
    pub fn raise(&self, signal: Signal) -> usize {
        let handlers = self.handlers().get(&signal).cloned().unwrap_or_default();
        debug!(%signal, handlers = handlers.len(), "raising signal");
        for handler in &handlers {
            handler(signal);
        }
        handlers.len()
    }

    /// Whether at least one handler is bound to `signal`.
    pub fn is_bound(&self, signal: Signal) -> bool {
        self.handlers()
            .get(&signal)
            .is_some_and(|h| !h.is_empty())
    }
}

impl SignalRegistrar for ManualSignals {
    fn register(&mut self, signal: Signal, handler: SignalHandler) -> std::io::Result<()> {
        self.handlers()
            .entry(signal)
            .or_default()
            .push(handler);
        Ok(())
    }
}
