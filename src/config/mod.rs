//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config.toml (user) + preferences.toml (internal, optional)
//!     → loader.rs (locate, parse & deserialize)
//!     → validation.rs (defaults, warnings, mapping union)
//!     → CanonicalConfig (validated, immutable)
//!     → store.rs publishes it with an atomic swap
//!
//! On file change:
//!     watcher.rs receives a write event
//!     → cooldown check, settle delay
//!     → store.rs loads and publishes a new snapshot
//!     → reload.rs notifies every subscriber
//! ```
//!
//! # Design Decisions
//! - Config is immutable once published; changes require a full reload
//! - All fields have defaults to allow minimal configs
//! - Invalid values are replaced, not rejected; only unreadable files fail

pub mod loader;
pub mod reload;
pub mod schema;
pub mod store;
pub mod validation;
pub mod watcher;

pub use loader::{ConfigError, ParseCause, SourceLocator};
pub use reload::{ReloadNotice, ReloadSubscription};
pub use schema::{CanonicalConfig, ControllerKind, NoiseReduction};
pub use store::{ConfigStore, LoadOutcome};
pub use watcher::ConfigWatcher;
