//! Slider → target routing.
//!
//! # Responsibilities
//! - Resolve each slider move to its targets through the current snapshot
//! - Hand the level to the platform volume primitive ([`VolumeSink`])
//! - Release the platform resources at shutdown
//!
//! # Design Decisions
//! - The mapping is read from the store on every event, so a reload takes
//!   effect on the next move without any subscription
//! - Sink failures are logged per target and never stop routing

use std::sync::Arc;

use thiserror::Error;
use tokio::sync::{broadcast, oneshot};

use crate::config::store::ConfigStore;
use crate::controller::SliderMoveEvent;

#[derive(Debug, Error)]
pub enum SinkError {
    #[error("target {target} unavailable: {reason}")]
    Unavailable { target: String, reason: String },
}

#[derive(Debug, Error)]
#[error("failed to release {resource}: {reason}")]
pub struct ReleaseError {
    pub resource: String,
    pub reason: String,
}

/// The OS-level volume primitive, keyed by logical target name.
pub trait VolumeSink: Send + Sync {
    fn set_volume(&self, target: &str, level: f32) -> Result<(), SinkError>;

    fn release(&self) -> Result<(), ReleaseError>;
}

/// Logs volume changes instead of applying them.
#[derive(Debug, Default, Clone, Copy)]
pub struct LoggingVolumeSink;

impl VolumeSink for LoggingVolumeSink {
    fn set_volume(&self, target: &str, level: f32) -> Result<(), SinkError> {
        tracing::info!(target_name = target, level, "Set volume");
        Ok(())
    }

    fn release(&self) -> Result<(), ReleaseError> {
        Ok(())
    }
}

pub struct TargetRouter {
    store: Arc<ConfigStore>,
    sink: Arc<dyn VolumeSink>,
}

impl TargetRouter {
    pub fn new(store: Arc<ConfigStore>, sink: Arc<dyn VolumeSink>) -> Self {
        Self { store, sink }
    }

    /// Apply one move. Returns how many targets accepted it.
    pub fn route(&self, event: SliderMoveEvent) -> usize {
        let config = self.store.current();
        let targets = config.slider_mapping.get(event.slider_id);
        if targets.is_empty() {
            tracing::trace!(slider_id = event.slider_id, "Slider has no mapped targets");
            return 0;
        }

        let mut applied = 0;
        for target in targets {
            match self.sink.set_volume(target, event.percent) {
                Ok(()) => applied += 1,
                Err(e) => tracing::warn!(slider_id = event.slider_id, error = %e, "Failed to set volume"),
            }
        }
        applied
    }

    pub async fn run(
        self,
        mut events: broadcast::Receiver<SliderMoveEvent>,
        mut halt: oneshot::Receiver<()>,
    ) {
        loop {
            tokio::select! {
                _ = &mut halt => break,
                event = events.recv() => match event {
                    Ok(event) => {
                        self.route(event);
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        tracing::debug!(skipped, "Target router lagged behind slider events");
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        let _ = (&mut halt).await;
                        break;
                    }
                },
            }
        }
        tracing::debug!("Target router stopped");
    }
}
