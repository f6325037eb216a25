//! Device controllers.
//!
//! # Data Flow
//! ```text
//! serial port / UDP socket
//!     → serial.rs / udp.rs (connect, read lines)
//!     → frame.rs (parse, normalize, noise filter)
//!     → SliderMoveEvent on the event bus
//!     → targets::TargetRouter
//! ```
//!
//! # Design Decisions
//! - One controller per process, picked from the validated
//!   [`ControllerKind`] at startup and never switched at runtime
//! - Connection failures after the first attempt are retried every
//!   [`RETRY_INTERVAL`] until the controller is halted
//! - Reloads update decoder settings in place; changed connection
//!   parameters force a reconnect

pub mod frame;
pub mod serial;
pub mod udp;

use std::io;
use std::time::Duration;

use thiserror::Error;
use tokio::sync::{broadcast, oneshot};

use crate::config::reload::{ReloadNotice, ReloadSubscription};
use crate::config::schema::{CanonicalConfig, ControllerKind};
use crate::controller::frame::FrameDecoder;
use crate::controller::serial::SerialController;
use crate::controller::udp::UdpController;

pub const RETRY_INTERVAL: Duration = Duration::from_secs(2);

/// Capacity of the slider event bus.
pub const EVENT_BUS_CAPACITY: usize = 64;

/// A slider moved to `percent` (0.0 ..= 1.0).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SliderMoveEvent {
    pub slider_id: usize,
    pub percent: f32,
}

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("can't open serial port {port}: {source}")]
    SerialOpen { port: String, source: io::Error },

    #[error("can't bind UDP port {port}: {source}")]
    UdpBind { port: u16, source: io::Error },

    #[error("read failed: {0}")]
    Read(#[from] io::Error),

    #[error("connection closed by device")]
    Closed,

    #[error("not connected")]
    NotConnected,
}

/// The active transport.
pub enum Controller {
    Serial(SerialController),
    Udp(UdpController),
}

impl Controller {
    pub fn from_config(config: &CanonicalConfig) -> Self {
        match config.controller {
            ControllerKind::Serial => Controller::Serial(SerialController::new(config.serial.clone())),
            ControllerKind::Udp => Controller::Udp(UdpController::new(config.udp.clone())),
        }
    }

    pub fn kind(&self) -> ControllerKind {
        match self {
            Controller::Serial(_) => ControllerKind::Serial,
            Controller::Udp(_) => ControllerKind::Udp,
        }
    }

    /// Human-readable endpoint, for logs and notifications.
    pub fn endpoint(&self) -> String {
        match self {
            Controller::Serial(serial) => serial.settings().com_port.clone(),
            Controller::Udp(udp) => udp.settings().port.to_string(),
        }
    }

    pub fn is_connected(&self) -> bool {
        match self {
            Controller::Serial(serial) => serial.is_connected(),
            Controller::Udp(udp) => udp.is_connected(),
        }
    }

    /// Open the connection.
    pub async fn start(&mut self) -> Result<(), TransportError> {
        match self {
            Controller::Serial(serial) => serial.connect().await,
            Controller::Udp(udp) => udp.connect().await,
        }
    }

    /// Close the connection. Safe to call when not connected.
    pub fn stop(&mut self) {
        match self {
            Controller::Serial(serial) => serial.disconnect(),
            Controller::Udp(udp) => udp.disconnect(),
        }
    }

    async fn next_lines(&mut self) -> Result<Vec<String>, TransportError> {
        match self {
            Controller::Serial(serial) => serial.next_lines().await,
            Controller::Udp(udp) => udp.next_lines().await,
        }
    }

    /// Apply a reloaded config. Returns whether the connection was dropped.
    fn apply_reload(&mut self, config: &CanonicalConfig) -> bool {
        if config.controller != self.kind() {
            tracing::warn!(
                active = %self.kind(),
                configured = %config.controller,
                "Controller type changed, restart to apply"
            );
        }

        match self {
            Controller::Serial(serial) if *serial.settings() != config.serial => {
                tracing::info!(
                    com_port = %config.serial.com_port,
                    baud_rate = config.serial.baud_rate,
                    "Serial connection settings changed, reconnecting"
                );
                serial.reconfigure(config.serial.clone());
                true
            }
            Controller::Udp(udp) if *udp.settings() != config.udp => {
                tracing::info!(udp_port = config.udp.port, "UDP port changed, rebinding");
                udp.reconfigure(config.udp.clone());
                true
            }
            _ => false,
        }
    }

    /// Read loop. Runs until `halt` fires; reconnects on its own after
    /// transport failures, waiting [`RETRY_INTERVAL`] before every attempt
    /// that follows a failure.
    ///
    /// If the controller is not connected yet, the first connect error is
    /// passed to `on_first_failure`; returning `true` gives up and ends the
    /// loop.
    pub async fn run<F>(
        mut self,
        initial: &CanonicalConfig,
        mut reloads: ReloadSubscription,
        events: broadcast::Sender<SliderMoveEvent>,
        mut halt: oneshot::Receiver<()>,
        on_first_failure: F,
    ) where
        F: FnOnce(&TransportError) -> bool + Send,
    {
        let mut decoder = FrameDecoder::new(initial.invert_sliders, initial.noise_reduction);
        let mut reloads_open = true;
        let mut on_first_failure = (!self.is_connected()).then_some(on_first_failure);
        let mut backoff = false;

        loop {
            if backoff {
                backoff = false;
                tokio::select! {
                    _ = &mut halt => break,
                    _ = tokio::time::sleep(RETRY_INTERVAL) => {}
                }
            }

            if !self.is_connected() {
                match self.start().await {
                    Ok(()) => on_first_failure = None,
                    Err(e) => {
                        if on_first_failure.take().is_some_and(|give_up| give_up(&e)) {
                            break;
                        }
                        tracing::warn!(endpoint = %self.endpoint(), error = %e, "Connection attempt failed, retrying");
                        backoff = true;
                        continue;
                    }
                }
            }

            tokio::select! {
                _ = &mut halt => break,
                notice = reloads.recv(), if reloads_open => match notice {
                    Some(ReloadNotice { config, generation }) => {
                        tracing::debug!(generation, "Controller picked up reloaded config");
                        decoder.apply_settings(config.invert_sliders, config.noise_reduction);
                        self.apply_reload(&config);
                    }
                    None => reloads_open = false,
                },
                read = self.next_lines() => match read {
                    Ok(lines) => {
                        for line in lines {
                            for event in decoder.feed(&line) {
                                // No receivers just means nobody is listening yet.
                                let _ = events.send(event);
                            }
                        }
                    }
                    Err(e) => {
                        tracing::warn!(endpoint = %self.endpoint(), error = %e, "Lost connection to device");
                        self.stop();
                        backoff = true;
                    }
                },
            }
        }

        self.stop();
        tracing::debug!(kind = %self.kind(), "Controller stopped");
    }
}

/// Build the slider event bus.
pub fn event_bus() -> broadcast::Sender<SliderMoveEvent> {
    broadcast::channel(EVENT_BUS_CAPACITY).0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::reload::SubscriberRegistry;
    use crate::config::schema::{SerialSettings, UdpSettings};
    use crate::controller::serial::PortStream;
    use std::io::{self, Cursor};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use tokio::task::JoinHandle;

    fn free_udp_port() -> u16 {
        let socket = std::net::UdpSocket::bind("0.0.0.0:0").unwrap();
        socket.local_addr().unwrap().port()
    }

    /// A serial controller whose every connect attempt is counted.
    fn counted_serial<O>(open: O) -> (Controller, Arc<AtomicUsize>)
    where
        O: Fn() -> io::Result<PortStream> + Send + Sync + 'static,
    {
        let opens = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&opens);
        let serial = SerialController::with_opener(
            CanonicalConfig::default().serial,
            Arc::new(move |_: &SerialSettings| {
                counter.fetch_add(1, Ordering::SeqCst);
                open()
            }),
        );
        (Controller::Serial(serial), opens)
    }

    fn spawn_run<F>(
        controller: Controller,
        registry: &SubscriberRegistry,
        on_first_failure: F,
    ) -> (oneshot::Sender<()>, JoinHandle<()>)
    where
        F: FnOnce(&TransportError) -> bool + Send + 'static,
    {
        let (halt_tx, halt_rx) = oneshot::channel();
        let reloads = registry.subscribe();
        let handle = tokio::spawn(async move {
            let config = CanonicalConfig::default();
            controller
                .run(&config, reloads, event_bus(), halt_rx, on_first_failure)
                .await
        });
        (halt_tx, handle)
    }

    #[test]
    fn test_selects_variant_from_kind() {
        let mut config = CanonicalConfig::default();
        assert_eq!(Controller::from_config(&config).kind(), ControllerKind::Serial);
        assert_eq!(Controller::from_config(&config).endpoint(), "COM4");

        config.controller = ControllerKind::Udp;
        let controller = Controller::from_config(&config);
        assert_eq!(controller.kind(), ControllerKind::Udp);
        assert_eq!(controller.endpoint(), "16990");
    }

    #[tokio::test]
    async fn test_udp_frames_become_events() {
        let port = free_udp_port();
        let mut config = CanonicalConfig::default();
        config.controller = ControllerKind::Udp;
        config.udp = UdpSettings { port };

        let registry = SubscriberRegistry::new();
        let bus = event_bus();
        let mut rx = bus.subscribe();
        let (halt_tx, halt_rx) = oneshot::channel();

        let mut controller = Controller::from_config(&config);
        controller.start().await.unwrap();
        let task = {
            let config = config.clone();
            let reloads = registry.subscribe();
            let bus = bus.clone();
            tokio::spawn(async move { controller.run(&config, reloads, bus, halt_rx, |_| false).await })
        };

        let sender = tokio::net::UdpSocket::bind("127.0.0.1:0").await.unwrap();
        sender.send_to(b"0|1023\n", ("127.0.0.1", port)).await.unwrap();

        assert_eq!(rx.recv().await.unwrap(), SliderMoveEvent { slider_id: 0, percent: 0.0 });
        assert_eq!(rx.recv().await.unwrap(), SliderMoveEvent { slider_id: 1, percent: 1.0 });

        // Inverting through a reload re-reports the sliders flipped.
        let mut inverted = config.clone();
        inverted.invert_sliders = true;
        registry.deliver(&ReloadNotice {
            generation: 2,
            config: Arc::new(inverted),
        });
        tokio::time::sleep(Duration::from_millis(50)).await;
        sender.send_to(b"0|1023\n", ("127.0.0.1", port)).await.unwrap();
        assert_eq!(rx.recv().await.unwrap(), SliderMoveEvent { slider_id: 0, percent: 1.0 });

        halt_tx.send(()).unwrap();
        task.await.unwrap();
    }

    #[tokio::test]
    async fn test_halt_while_retrying() {
        let holder = std::net::UdpSocket::bind("0.0.0.0:0").unwrap();
        let mut config = CanonicalConfig::default();
        config.controller = ControllerKind::Udp;
        config.udp = UdpSettings {
            port: holder.local_addr().unwrap().port(),
        };

        let registry = SubscriberRegistry::new();
        let (halt_tx, halt_rx) = oneshot::channel();
        let controller = Controller::from_config(&config);
        let task = {
            let reloads = registry.subscribe();
            tokio::spawn(async move { controller.run(&config, reloads, event_bus(), halt_rx, |_| false).await })
        };

        tokio::time::sleep(Duration::from_millis(50)).await;
        halt_tx.send(()).unwrap();
        tokio::time::timeout(Duration::from_secs(1), task)
            .await
            .unwrap()
            .unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_lost_connection_waits_before_reconnecting() {
        // Every connection delivers one line and then ends.
        let (controller, opens) = counted_serial(|| Ok(Box::new(Cursor::new(&b"512\n"[..])) as PortStream));
        let registry = SubscriberRegistry::new();
        let (halt_tx, handle) = spawn_run(controller, &registry, |_| false);

        // Connects at 0 s, 2 s and 4 s.
        tokio::time::sleep(Duration::from_millis(4500)).await;
        assert_eq!(opens.load(Ordering::SeqCst), 3);

        halt_tx.send(()).unwrap();
        handle.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_transient_first_failure_waits_before_retrying() {
        let (controller, opens) = counted_serial(|| Err(io::Error::from(io::ErrorKind::TimedOut)));
        let registry = SubscriberRegistry::new();
        let reported = Arc::new(AtomicUsize::new(0));
        let (halt_tx, handle) = {
            let reported = Arc::clone(&reported);
            spawn_run(controller, &registry, move |_| {
                reported.fetch_add(1, Ordering::SeqCst);
                false
            })
        };

        tokio::time::sleep(Duration::from_millis(4500)).await;
        assert_eq!(opens.load(Ordering::SeqCst), 3);
        assert_eq!(reported.load(Ordering::SeqCst), 1);

        halt_tx.send(()).unwrap();
        handle.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_fatal_first_failure_ends_the_loop() {
        let (controller, opens) = counted_serial(|| Err(io::Error::from(io::ErrorKind::NotFound)));
        let registry = SubscriberRegistry::new();
        let (_halt_tx, handle) = spawn_run(controller, &registry, |e| {
            matches!(e, TransportError::SerialOpen { .. })
        });

        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(opens.load(Ordering::SeqCst), 1);
    }
}
