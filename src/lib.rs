//! Bridge between a physical slider controller and host volume targets.

pub mod config;
pub mod controller;
pub mod lifecycle;
pub mod notification;
pub mod observability;
pub mod targets;

pub use config::{CanonicalConfig, ConfigStore, ConfigWatcher};
pub use lifecycle::{Orchestrator, StopSignal};
pub use notification::{LogNotifier, NotificationSink};
