//! Single-shot debounce timer that coalesces change bursts into one rescan.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Asks the registry owner for one full rescan.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RescanRequest;

/// Where elapsed debounce timers deliver their rescan request.
///
/// The registry has a single owner, so the monitor never rescans it
/// directly; it hands the request to whoever owns it.
pub trait RescanSink: Send + Sync + 'static {
    /// Deliver one rescan request.
    fn request_rescan(&self);
}

impl RescanSink for mpsc::UnboundedSender<RescanRequest> {
    fn request_rescan(&self) {
        if self.send(RescanRequest).is_err() {
            tracing::debug!("rescan receiver dropped; request discarded");
        }
    }
}

/// Restartable timer: every [`Debouncer::schedule`] call pushes the deadline
/// back, and only when the delay passes without another call is a single
/// rescan requested.
pub struct Debouncer {
    delay: Duration,
    sink: Arc<dyn RescanSink>,
    runtime: Handle,
    /// The one live timer, if any.
    pending: Mutex<Option<JoinHandle<()>>>,
}

impl fmt::Debug for Debouncer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Debouncer")
            .field("delay", &self.delay)
            .field("pending", &self.is_pending())
            .finish()
    }
}

impl Debouncer {
    /// Create a debouncer whose timers run on `runtime`.
    pub fn new(delay: Duration, sink: Arc<dyn RescanSink>, runtime: Handle) -> Self {
        Self {
            delay,
            sink,
            runtime,
            pending: Mutex::new(None),
        }
    }

    /// Debounce delay.
    pub fn delay(&self) -> Duration {
        self.delay
    }

    /// Start the timer, or restart it if already running.
    pub fn schedule(&self) {
        let mut pending = self.pending.lock();
        if let Some(timer) = pending.take() {
            timer.abort();
        }

        let sink = Arc::clone(&self.sink);
        let delay = self.delay;
        *pending = Some(self.runtime.spawn(async move {
            tokio::time::sleep(delay).await;
            sink.request_rescan();
        }));
    }

    /// Drop the pending timer without requesting a rescan.
    pub fn cancel(&self) {
        if let Some(timer) = self.pending.lock().take() {
            timer.abort();
        }
    }

    /// Check if a timer is waiting to fire.
    pub fn is_pending(&self) -> bool {
        self.pending
            .lock()
            .as_ref()
            .is_some_and(|timer| !timer.is_finished())
    }
}

impl Drop for Debouncer {
    fn drop(&mut self) {
        self.cancel();
    }
}
