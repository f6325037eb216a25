//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Startup (orchestrator.rs):
//!     Locate config → Load → Spawn watcher, router, controller → Running
//!     First connect failure → classify (startup.rs) → notify + stop, or retry
//!
//! Stop (shutdown.rs):
//!     Interrupt (signals.rs) | fatal controller error | tray Quit
//!         → StopSignal (first trigger wins)
//!
//! Shutdown (orchestrator.rs):
//!     Stop watcher → Stop controller → Stop router → Release targets
//!         → Stop tray → Flush logs
//! ```
//!
//! # Design Decisions
//! - Shutdown is driven by a single signal, so it runs exactly once
//! - Each unit gets a grace period, then is aborted
//! - Release failures are collected and turn into a non-zero exit code

pub mod orchestrator;
pub mod shutdown;
pub mod signals;
pub mod startup;
pub mod state;
pub mod tray;

pub use orchestrator::{LifecycleError, Orchestrator, OrchestratorOptions, ShutdownReport};
pub use shutdown::{StopReason, StopSignal};
pub use state::LifecycleState;
pub use tray::{RunMode, TrayIntegration};
