//! Observability subsystem.
//!
//! Everything logs through `tracing`; this module only owns subscriber
//! setup and the final flush on shutdown.

pub mod logging;
