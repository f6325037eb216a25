//! UDP transport.
//!
//! Wireless boards push the same `|`-separated frames as the serial ones,
//! one or more lines per datagram.

use std::net::{Ipv4Addr, SocketAddr};

use tokio::net::UdpSocket;

use crate::config::schema::UdpSettings;
use crate::controller::TransportError;

const MAX_DATAGRAM: usize = 1024;

pub struct UdpController {
    settings: UdpSettings,
    socket: Option<UdpSocket>,
    buf: Vec<u8>,
}

impl UdpController {
    pub fn new(settings: UdpSettings) -> Self {
        Self {
            settings,
            socket: None,
            buf: vec![0; MAX_DATAGRAM],
        }
    }

    pub fn settings(&self) -> &UdpSettings {
        &self.settings
    }

    pub fn is_connected(&self) -> bool {
        self.socket.is_some()
    }

    pub async fn connect(&mut self) -> Result<(), TransportError> {
        let addr = SocketAddr::from((Ipv4Addr::UNSPECIFIED, self.settings.port));
        let socket = UdpSocket::bind(addr)
            .await
            .map_err(|source| TransportError::UdpBind {
                port: self.settings.port,
                source,
            })?;

        tracing::info!(udp_port = self.settings.port, "UDP listener bound");
        self.socket = Some(socket);
        Ok(())
    }

    pub fn disconnect(&mut self) {
        if self.socket.take().is_some() {
            tracing::debug!(udp_port = self.settings.port, "Closed UDP listener");
        }
    }

    pub fn reconfigure(&mut self, settings: UdpSettings) {
        self.disconnect();
        self.settings = settings;
    }

    /// Wait for the next datagram and split it into lines. Cancel safe.
    pub async fn next_lines(&mut self) -> Result<Vec<String>, TransportError> {
        let socket = self.socket.as_ref().ok_or(TransportError::NotConnected)?;
        let (len, peer) = socket.recv_from(&mut self.buf).await?;
        tracing::trace!(peer = %peer, len, "Datagram received");

        let text = String::from_utf8_lossy(&self.buf[..len]);
        Ok(text
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(ToOwned::to_owned)
            .collect())
    }
}
