//! The resource monitor: OS watcher, event loop and rescan scheduling.

use std::sync::Arc;
use std::time::Duration;

use notify::{Event, RecommendedWatcher, RecursiveMode, Watcher};
use strum::Display;
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use projectfs_core::{NotificationHub, ProjectConfig};

use crate::debouncer::{Debouncer, RescanSink};
use crate::error::MonitorError;
use crate::events::{EventRouter, ResourceChange};

/// How long the first half of a rename waits for its partner.
const RENAME_PAIR_WINDOW: Duration = Duration::from_millis(50);

/// Lifecycle of a [`ResourceMonitor`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[strum(serialize_all = "lowercase")]
pub enum MonitorState {
    Uninitialized,
    Watching,
    Stopped,
}

/// Watches a project folder and keeps its registry in sync.
///
/// Surviving events are announced right away through the notification hub,
/// then a debounced rescan request goes to the [`RescanSink`].
pub struct ResourceMonitor {
    config: Arc<ProjectConfig>,
    hub: NotificationHub,
    sink: Arc<dyn RescanSink>,
    state: MonitorState,
    debouncer: Option<Arc<Debouncer>>,
    watcher: Option<RecommendedWatcher>,
    cancel: CancellationToken,
}

impl std::fmt::Debug for ResourceMonitor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResourceMonitor")
            .field("root", &self.config.root)
            .field("state", &self.state)
            .finish()
    }
}

impl ResourceMonitor {
    /// Create a monitor. Nothing is watched until [`ResourceMonitor::initialize`].
    pub fn new(
        config: Arc<ProjectConfig>,
        hub: NotificationHub,
        sink: Arc<dyn RescanSink>,
    ) -> Self {
        Self {
            config,
            hub,
            sink,
            state: MonitorState::Uninitialized,
            debouncer: None,
            watcher: None,
            cancel: CancellationToken::new(),
        }
    }

    /// Current lifecycle state.
    pub fn state(&self) -> MonitorState {
        self.state
    }

    /// Subscribe to the project folder recursively and start the event loop.
    ///
    /// Must be called from within a tokio runtime.
    pub fn initialize(&mut self) -> Result<(), MonitorError> {
        if self.state != MonitorState::Uninitialized {
            return Err(MonitorError::InvalidState { state: self.state });
        }
        if !self.config.root.is_dir() {
            return Err(MonitorError::MissingRoot {
                path: self.config.root.clone(),
            });
        }
        let runtime = Handle::try_current().map_err(|e| MonitorError::NoRuntime {
            reason: e.to_string(),
        })?;

        let router = EventRouter::new(Arc::clone(&self.config))?;
        let debouncer = Arc::new(Debouncer::new(
            self.config.debounce(),
            Arc::clone(&self.sink),
            runtime.clone(),
        ));

        let (tx, rx) = mpsc::unbounded_channel();
        let mut watcher = notify::recommended_watcher(move |res: notify::Result<Event>| {
            let _ = tx.send(res);
        })?;
        watcher.watch(&self.config.root, RecursiveMode::Recursive)?;

        runtime.spawn(run_event_loop(
            rx,
            router,
            Arc::clone(&debouncer),
            self.hub.clone(),
            self.cancel.clone(),
        ));

        self.debouncer = Some(debouncer);
        self.watcher = Some(watcher);
        self.state = MonitorState::Watching;
        tracing::debug!("watching {}", self.config.root.display());
        Ok(())
    }

    /// Restart the debounce timer; one rescan follows once changes settle.
    ///
    /// Does nothing unless the monitor is watching.
    pub fn schedule_resource_update(&self) {
        if let Some(debouncer) = &self.debouncer {
            debouncer.schedule();
        }
    }

    /// Stop watching: cancel the pending timer, end the event loop and
    /// release the OS watcher. Safe to call repeatedly.
    pub fn shutdown(&mut self) {
        if self.state == MonitorState::Stopped {
            return;
        }

        self.cancel.cancel();
        if let Some(debouncer) = self.debouncer.take() {
            debouncer.cancel();
        }
        self.watcher = None;
        self.state = MonitorState::Stopped;
        tracing::debug!("stopped watching {}", self.config.root.display());
    }
}

impl Drop for ResourceMonitor {
    fn drop(&mut self) {
        self.shutdown();
    }
}

async fn run_event_loop(
    mut events: mpsc::UnboundedReceiver<notify::Result<Event>>,
    mut router: EventRouter,
    debouncer: Arc<Debouncer>,
    hub: NotificationHub,
    cancel: CancellationToken,
) {
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,

            received = events.recv() => match received {
                Some(Ok(event)) => handle_event(&mut router, &debouncer, &hub, &event),
                Some(Err(e)) => tracing::error!("file watch error: {e}"),
                None => break,
            },

            // No partner showed up: the resource was moved out of the project
            _ = tokio::time::sleep(RENAME_PAIR_WINDOW), if router.has_pending() => {
                let changes = router.flush_pending();
                publish(&changes, &debouncer, &hub);
            }
        }
    }
    debouncer.cancel();
    tracing::debug!("monitor event loop finished");
}

/// Publish the changes in one event and schedule a rescan if any survived.
pub(crate) fn handle_event(
    router: &mut EventRouter,
    debouncer: &Debouncer,
    hub: &NotificationHub,
    event: &Event,
) {
    let changes = router.classify(event);
    publish(&changes, debouncer, hub);

    // The backend dropped events; only a full rescan can catch up
    if event.need_rescan() {
        debouncer.schedule();
    }
}

fn publish(changes: &[ResourceChange], debouncer: &Debouncer, hub: &NotificationHub) {
    for change in changes {
        for notification in change.notifications() {
            hub.publish(notification);
        }
    }
    if !changes.is_empty() {
        debouncer.schedule();
    }
}
