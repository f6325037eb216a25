//! The configuration store.
//!
//! Holds the currently published [`CanonicalConfig`] and the reload
//! subscriber registry. Readers call [`ConfigStore::current`] from any task;
//! [`ConfigStore::load`] builds a complete new snapshot off to the side and
//! publishes it with a single atomic swap, so a reader sees either the old
//! snapshot or the new one.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use arc_swap::{ArcSwap, ArcSwapOption};

use crate::config::loader::{load_config, ConfigError, SourceLocator, USER_CONFIG_FILE};
use crate::config::reload::{ReloadNotice, ReloadSubscription, SubscriberRegistry};
use crate::config::schema::CanonicalConfig;
use crate::config::validation::ConfigWarning;
use crate::notification::NotificationSink;

/// What a successful [`ConfigStore::load`] published.
#[derive(Debug, Clone)]
pub struct LoadOutcome {
    pub generation: u64,
    pub config: Arc<CanonicalConfig>,
    pub warnings: Vec<ConfigWarning>,
}

pub struct ConfigStore {
    locator: SourceLocator,
    pinned_source: ArcSwapOption<PathBuf>,
    current: ArcSwap<CanonicalConfig>,
    generation: AtomicU64,
    subscribers: SubscriberRegistry,
    notifier: Arc<dyn NotificationSink>,
}

impl ConfigStore {
    pub fn new(locator: SourceLocator, notifier: Arc<dyn NotificationSink>) -> Self {
        Self {
            locator,
            pinned_source: ArcSwapOption::empty(),
            current: ArcSwap::from_pointee(CanonicalConfig::default()),
            generation: AtomicU64::new(0),
            subscribers: SubscriberRegistry::new(),
            notifier,
        }
    }

    /// Resolve the user document through the search order, ignoring any pin.
    pub fn locate_source(&self) -> Result<PathBuf, ConfigError> {
        self.locator.locate_user_source()
    }

    /// Pin the user document to `path` for every later load.
    pub fn override_source_location(&self, path: impl Into<PathBuf>) {
        let path = path.into();
        tracing::debug!(path = %path.display(), "Pinned user config source");
        self.pinned_source.store(Some(Arc::new(path)));
    }

    /// The pinned user document, if any.
    pub fn source_location(&self) -> Option<PathBuf> {
        self.pinned_source.load_full().map(|path| PathBuf::clone(&path))
    }

    /// Load, validate and publish a new snapshot.
    ///
    /// On failure the user is notified, the previously published snapshot
    /// stays in place and the error is returned.
    pub fn load(&self) -> Result<LoadOutcome, ConfigError> {
        let result = self
            .resolve_source()
            .and_then(|path| {
                tracing::debug!(path = %path.display(), "Loading config");
                load_config(&path, self.locator.internal_path())
            });

        let loaded = match result {
            Ok(loaded) => loaded,
            Err(e) => {
                self.notify_failure(&e);
                return Err(e);
            }
        };

        let config = Arc::new(loaded.config);
        self.current.store(Arc::clone(&config));
        let generation = self.generation.fetch_add(1, Ordering::AcqRel) + 1;

        tracing::info!(
            generation,
            controller = %config.controller,
            slider_mapping = %config.slider_mapping,
            button_mapping = %config.button_mapping,
            com_port = %config.serial.com_port,
            baud_rate = config.serial.baud_rate,
            udp_port = config.udp.port,
            invert_sliders = config.invert_sliders,
            noise_reduction = config.noise_reduction.as_str(),
            "Loaded config successfully"
        );

        Ok(LoadOutcome {
            generation,
            config,
            warnings: loaded.warnings,
        })
    }

    /// The latest published snapshot.
    pub fn current(&self) -> Arc<CanonicalConfig> {
        self.current.load_full()
    }

    /// Number of snapshots published so far (0 before the first load).
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }

    pub fn subscribe(&self) -> ReloadSubscription {
        self.subscribers.subscribe()
    }

    /// Tell every subscriber about a freshly published snapshot.
    pub fn announce_reload(&self, outcome: &LoadOutcome) -> usize {
        let notice = ReloadNotice {
            generation: outcome.generation,
            config: Arc::clone(&outcome.config),
        };
        let delivered = self.subscribers.deliver(&notice);
        tracing::debug!(generation = outcome.generation, delivered, "Notified reload subscribers");
        delivered
    }

    pub fn notifier(&self) -> &Arc<dyn NotificationSink> {
        &self.notifier
    }

    fn resolve_source(&self) -> Result<PathBuf, ConfigError> {
        match self.pinned_source.load_full() {
            Some(path) => Ok(PathBuf::clone(&path)),
            None => self.locator.locate_user_source(),
        }
    }

    fn notify_failure(&self, error: &ConfigError) {
        match error {
            ConfigError::NotFound { searched } => {
                tracing::warn!(searched = ?searched, "Config file not found");
                self.notifier.notify(
                    "Can't find configuration!",
                    &format!(
                        "{} must be in one of the valid locations. Please re-launch.",
                        USER_CONFIG_FILE
                    ),
                );
            }
            ConfigError::Parse { path, cause } => {
                tracing::warn!(path = %path.display(), error = %cause, "Failed to read user config");
                if error.is_format_related() {
                    self.notifier.notify(
                        "Invalid configuration!",
                        &format!(
                            "Please make sure {} is in a valid TOML format.",
                            display_name(path)
                        ),
                    );
                } else {
                    self.notifier.notify(
                        "Error loading configuration!",
                        "Please check the logs for more details.",
                    );
                }
            }
        }
    }
}

fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| USER_CONFIG_FILE.to_string())
}
