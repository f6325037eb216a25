//! Desktop tray integration seam.
//!
//! The tray menu itself is platform code; the orchestrator only needs to
//! stop it during shutdown. Its "Quit" entry is expected to call
//! `StopSignal::trigger(StopReason::Requested)`.

use std::ffi::OsString;

/// Set to any value to run without a tray icon.
pub const ENV_NO_TRAY: &str = "MIXBRIDGE_NO_TRAY_ICON";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunMode {
    Foreground,
    Tray,
}

impl RunMode {
    pub fn from_env() -> Self {
        Self::from_var(std::env::var_os(ENV_NO_TRAY))
    }

    pub fn from_var(value: Option<OsString>) -> Self {
        match value {
            Some(_) => RunMode::Foreground,
            None => RunMode::Tray,
        }
    }
}

pub trait TrayIntegration: Send + Sync {
    fn stop(&self);
}
