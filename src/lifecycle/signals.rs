//! OS signal handling.
//!
//! SIGINT (Ctrl+C) and, on Unix, SIGTERM raise the stop signal. The listener
//! task also ends when the process is stopped through another path, so it
//! never outlives the shutdown.

use tokio::task::JoinHandle;

use crate::lifecycle::shutdown::{StopReason, StopSignal};

pub fn spawn_interrupt_listener(stop: StopSignal) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut listener = stop.listener();
        tokio::select! {
            interrupted = wait_for_interrupt() => match interrupted {
                Ok(signal) => {
                    tracing::info!(signal, "Interrupted");
                    stop.trigger(StopReason::Interrupt);
                }
                Err(e) => tracing::error!(error = %e, "Failed to install interrupt handler"),
            },
            _ = listener.wait() => {}
        }
    })
}

#[cfg(unix)]
async fn wait_for_interrupt() -> std::io::Result<&'static str> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut terminate = signal(SignalKind::terminate())?;
    tokio::select! {
        res = tokio::signal::ctrl_c() => res.map(|()| "SIGINT"),
        _ = terminate.recv() => Ok("SIGTERM"),
    }
}

#[cfg(not(unix))]
async fn wait_for_interrupt() -> std::io::Result<&'static str> {
    tokio::signal::ctrl_c().await.map(|()| "ctrl-c")
}
