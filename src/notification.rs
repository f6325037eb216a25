//! User-facing notifications.
//!
//! The desktop toast renderer is platform code outside this crate; everything
//! here talks to it through [`NotificationSink`]. Implementations must return
//! promptly and never fail the caller.

/// Fire-and-forget message display.
pub trait NotificationSink: Send + Sync {
    fn notify(&self, title: &str, message: &str);
}

/// Writes notifications to the log. Used when no desktop backend is wired in.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

impl NotificationSink for LogNotifier {
    fn notify(&self, title: &str, message: &str) {
        tracing::info!(target: "mixbridge::notification", title, message, "Notification");
    }
}
