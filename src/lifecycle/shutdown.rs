//! Shutdown coordination.

use std::sync::Arc;

use tokio::sync::watch;

/// What asked the process to stop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// SIGINT / SIGTERM / Ctrl+C.
    Interrupt,
    /// The controller hit a connect-time failure it can't recover from.
    TransportFatal,
    /// Tray menu or another in-process caller.
    Requested,
}

/// Single-fire stop signal.
///
/// Any number of clones may call [`StopSignal::trigger`]; only the first call
/// records a reason and wakes listeners, every later call is a no-op. Built
/// on a watch channel so a listener created after the trigger still sees it.
#[derive(Clone)]
pub struct StopSignal {
    tx: Arc<watch::Sender<Option<StopReason>>>,
}

impl StopSignal {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(None);
        Self { tx: Arc::new(tx) }
    }

    /// Raise the signal. Returns `true` only for the call that won.
    pub fn trigger(&self, reason: StopReason) -> bool {
        let won = self.tx.send_if_modified(|current| {
            if current.is_none() {
                *current = Some(reason);
                true
            } else {
                false
            }
        });

        if won {
            tracing::debug!(reason = ?reason, "Stop signal raised");
        } else {
            tracing::debug!(reason = ?reason, "Stop already signaled, ignoring");
        }
        won
    }

    pub fn reason(&self) -> Option<StopReason> {
        *self.tx.borrow()
    }

    pub fn is_triggered(&self) -> bool {
        self.reason().is_some()
    }

    pub fn listener(&self) -> StopListener {
        StopListener {
            rx: self.tx.subscribe(),
        }
    }
}

impl Default for StopSignal {
    fn default() -> Self {
        Self::new()
    }
}

pub struct StopListener {
    rx: watch::Receiver<Option<StopReason>>,
}

impl StopListener {
    /// Wait until the signal is raised and return the winning reason.
    pub async fn wait(&mut self) -> StopReason {
        match self.rx.wait_for(Option::is_some).await {
            Ok(reason) => reason.unwrap_or(StopReason::Requested),
            // Every sender is gone; nobody can stop us any more cleanly.
            Err(_) => StopReason::Requested,
        }
    }
}
