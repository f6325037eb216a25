//! Process lifecycle orchestration.
//!
//! [`Orchestrator::initialize`] loads the configuration and launches the
//! background units; [`Orchestrator::run`] waits for the stop signal and
//! unwinds them in a fixed order.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

use crate::config::loader::ConfigError;
use crate::config::store::ConfigStore;
use crate::config::watcher::{ConfigWatcher, WatchError, WatcherStats};
use crate::controller::{event_bus, Controller, TransportError};
use crate::lifecycle::shutdown::{StopReason, StopSignal};
use crate::lifecycle::signals::spawn_interrupt_listener;
use crate::lifecycle::startup::{classify, StartFailure};
use crate::lifecycle::state::LifecycleState;
use crate::lifecycle::tray::TrayIntegration;
use crate::observability::logging;
use crate::targets::{LoggingVolumeSink, ReleaseError, TargetRouter, VolumeSink};

/// How long each background unit gets to stop before it is aborted.
pub const DEFAULT_GRACE_PERIOD: Duration = Duration::from_secs(2);

#[derive(Debug, Error)]
pub enum LifecycleError {
    #[error("failed to load configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("invalid lifecycle transition {from} -> {to}")]
    InvalidTransition {
        from: LifecycleState,
        to: LifecycleState,
    },
}

#[derive(Debug, Clone)]
pub struct OrchestratorOptions {
    /// Pin the user config instead of searching for it.
    pub config_path: Option<PathBuf>,
    pub grace_period: Duration,
}

impl Default for OrchestratorOptions {
    fn default() -> Self {
        Self {
            config_path: None,
            grace_period: DEFAULT_GRACE_PERIOD,
        }
    }
}

/// What the shutdown sequence did.
#[derive(Debug)]
pub struct ShutdownReport {
    pub reason: StopReason,
    pub final_state: LifecycleState,
    pub watcher: Option<WatcherStats>,
    pub errors: Vec<ReleaseError>,
}

impl ShutdownReport {
    /// 0 on a clean shutdown, 1 if releasing resources failed.
    pub fn exit_code(&self) -> u8 {
        if self.errors.is_empty() {
            0
        } else {
            1
        }
    }
}

/// A background task together with the sender that asks it to stop.
struct Unit<T> {
    name: &'static str,
    halt: oneshot::Sender<()>,
    handle: JoinHandle<T>,
}

impl<T> Unit<T> {
    async fn stop(self, grace: Duration) -> Option<T> {
        let Unit {
            name,
            halt,
            mut handle,
        } = self;

        // The task may already be gone (e.g. controller after a fatal start).
        let _ = halt.send(());

        match tokio::time::timeout(grace, &mut handle).await {
            Ok(Ok(value)) => {
                tracing::debug!(unit = name, "Stopped");
                Some(value)
            }
            Ok(Err(e)) => {
                tracing::warn!(unit = name, error = %e, "Background task ended abnormally");
                None
            }
            Err(_) => {
                tracing::warn!(unit = name, grace_ms = grace.as_millis() as u64, "Did not stop in time, aborting");
                handle.abort();
                None
            }
        }
    }
}

struct RunningUnits {
    watcher: Unit<Result<WatcherStats, WatchError>>,
    controller: Unit<()>,
    router: Unit<()>,
    interrupt: JoinHandle<()>,
}

pub struct Orchestrator {
    state: LifecycleState,
    store: Arc<ConfigStore>,
    sink: Arc<dyn VolumeSink>,
    tray: Option<Arc<dyn TrayIntegration>>,
    stop: StopSignal,
    options: OrchestratorOptions,
    units: Option<RunningUnits>,
}

impl Orchestrator {
    pub fn new(store: Arc<ConfigStore>) -> Self {
        Self {
            state: LifecycleState::Uninitialized,
            store,
            sink: Arc::new(LoggingVolumeSink),
            tray: None,
            stop: StopSignal::new(),
            options: OrchestratorOptions::default(),
            units: None,
        }
    }

    pub fn with_options(mut self, options: OrchestratorOptions) -> Self {
        self.options = options;
        self
    }

    pub fn with_volume_sink(mut self, sink: Arc<dyn VolumeSink>) -> Self {
        self.sink = sink;
        self
    }

    pub fn with_tray(mut self, tray: Arc<dyn TrayIntegration>) -> Self {
        self.tray = Some(tray);
        self
    }

    pub fn state(&self) -> LifecycleState {
        self.state
    }

    pub fn store(&self) -> &Arc<ConfigStore> {
        &self.store
    }

    /// Handle for stop requests from outside (tray menu, tests).
    pub fn stop_signal(&self) -> StopSignal {
        self.stop.clone()
    }

    fn transition(&mut self, next: LifecycleState) -> Result<(), LifecycleError> {
        if !self.state.can_transition_to(next) {
            return Err(LifecycleError::InvalidTransition {
                from: self.state,
                to: next,
            });
        }
        tracing::debug!(from = %self.state, to = %next, "Lifecycle transition");
        self.state = next;
        Ok(())
    }

    /// Load configuration and launch the background units.
    pub async fn initialize(&mut self) -> Result<(), LifecycleError> {
        self.transition(LifecycleState::Initializing)?;
        tracing::debug!("Initializing");

        // Resolve the search order once and pin the result for the watcher.
        // If nothing is found, `load` reports it (and notifies) below.
        match &self.options.config_path {
            Some(path) => self.store.override_source_location(path.clone()),
            None => {
                if let Ok(path) = self.store.locate_source() {
                    self.store.override_source_location(path);
                }
            }
        }

        let outcome = match self.store.load() {
            Ok(outcome) => outcome,
            Err(e) => {
                tracing::error!(error = %e, "Failed to load config during initialization");
                self.transition(LifecycleState::Failed)?;
                return Err(e.into());
            }
        };
        let config = outcome.config;

        let controller = Controller::from_config(&config);
        tracing::info!(kind = %controller.kind(), endpoint = %controller.endpoint(), "Created controller");

        let watcher = {
            let (halt, halt_rx) = oneshot::channel();
            let path = self.store.source_location().unwrap_or_default();
            let watcher = ConfigWatcher::new(Arc::clone(&self.store), &path);
            let handle = tokio::spawn(async move {
                let result = watcher.run(halt_rx).await;
                if let Err(e) = &result {
                    tracing::error!(error = %e, "Config watcher failed, hot reload disabled");
                }
                result
            });
            Unit {
                name: "config-watcher",
                halt,
                handle,
            }
        };

        let events = event_bus();

        let router = {
            let (halt, halt_rx) = oneshot::channel();
            let router = TargetRouter::new(Arc::clone(&self.store), Arc::clone(&self.sink));
            let handle = tokio::spawn(router.run(events.subscribe(), halt_rx));
            Unit {
                name: "target-router",
                halt,
                handle,
            }
        };

        let controller = {
            let (halt, halt_rx) = oneshot::channel();
            let reloads = self.store.subscribe();
            let notifier = Arc::clone(self.store.notifier());
            let stop = self.stop.clone();
            let endpoint = controller.endpoint();
            let on_first_failure = move |e: &TransportError| {
                tracing::warn!(error = %e, "Failed to start first-time controller connection");
                match classify(e) {
                    StartFailure::Fatal { title, message } => {
                        tracing::warn!(endpoint = %endpoint, "Controller can't recover, notifying user and closing");
                        notifier.notify(&title, &message);
                        stop.trigger(StopReason::TransportFatal);
                        true
                    }
                    StartFailure::Transient => false,
                }
            };
            let handle = tokio::spawn(async move {
                controller
                    .run(&config, reloads, events, halt_rx, on_first_failure)
                    .await;
            });
            Unit {
                name: "controller",
                halt,
                handle,
            }
        };

        let interrupt = spawn_interrupt_listener(self.stop.clone());

        self.units = Some(RunningUnits {
            watcher,
            controller,
            router,
            interrupt,
        });
        self.transition(LifecycleState::Running)?;
        tracing::info!("Run loop started");
        Ok(())
    }

    /// Block until stopped, then shut everything down in order.
    pub async fn run(mut self) -> Result<ShutdownReport, LifecycleError> {
        let Some(units) = self.units.take() else {
            return Err(LifecycleError::InvalidTransition {
                from: self.state,
                to: LifecycleState::Stopping,
            });
        };

        let reason = self.stop.listener().wait().await;
        tracing::info!(reason = ?reason, "Stop signaled, shutting down");
        self.transition(LifecycleState::Stopping)?;

        let grace = self.options.grace_period;
        let mut errors = Vec::new();

        let watcher = units.watcher.stop(grace).await.and_then(Result::ok);
        units.controller.stop(grace).await;
        units.router.stop(grace).await;

        if let Err(e) = self.sink.release() {
            tracing::error!(error = %e, "Failed to release volume targets");
            errors.push(e);
        }

        if let Some(tray) = &self.tray {
            tray.stop();
        }

        units.interrupt.abort();
        self.transition(LifecycleState::Stopped)?;
        tracing::info!(errors = errors.len(), "Shutdown complete");
        logging::flush();

        Ok(ShutdownReport {
            reason,
            final_state: self.state,
            watcher,
            errors,
        })
    }
}
