//! Serial transport.
//!
//! The port is opened 8N1 at the configured baud rate and read line by line.
//! Lines are decoded lossily: boards tend to emit junk bytes on reset, and a
//! garbled line is dropped by the frame decoder instead of costing the
//! connection.

use std::fmt;
use std::io;
use std::sync::Arc;

use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio_serial::{DataBits, Parity, SerialPortBuilderExt, StopBits};

use crate::config::schema::SerialSettings;
use crate::controller::TransportError;

/// Byte stream behind an open port.
pub type PortStream = Box<dyn AsyncRead + Send + Unpin>;

/// Opens the device described by the settings.
pub type PortOpener = Arc<dyn Fn(&SerialSettings) -> io::Result<PortStream> + Send + Sync>;

pub struct SerialController {
    settings: SerialSettings,
    opener: PortOpener,
    reader: Option<BufReader<PortStream>>,
    /// Bytes of the line being read; survives a cancelled read.
    pending: Vec<u8>,
}

impl fmt::Debug for SerialController {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SerialController")
            .field("settings", &self.settings)
            .field("connected", &self.reader.is_some())
            .finish()
    }
}

impl SerialController {
    pub fn new(settings: SerialSettings) -> Self {
        Self::with_opener(settings, Arc::new(open_port))
    }

    /// Use a custom device opener (e.g. a pseudo terminal or an in-memory
    /// stream).
    pub fn with_opener(settings: SerialSettings, opener: PortOpener) -> Self {
        Self {
            settings,
            opener,
            reader: None,
            pending: Vec::new(),
        }
    }

    pub fn settings(&self) -> &SerialSettings {
        &self.settings
    }

    pub fn is_connected(&self) -> bool {
        self.reader.is_some()
    }

    pub async fn connect(&mut self) -> Result<(), TransportError> {
        let stream = (self.opener)(&self.settings).map_err(|source| TransportError::SerialOpen {
            port: self.settings.com_port.clone(),
            source,
        })?;

        tracing::info!(
            com_port = %self.settings.com_port,
            baud_rate = self.settings.baud_rate,
            "Connected to serial port"
        );
        self.pending.clear();
        self.reader = Some(BufReader::new(stream));
        Ok(())
    }

    pub fn disconnect(&mut self) {
        if self.reader.take().is_some() {
            tracing::debug!(com_port = %self.settings.com_port, "Closed serial port");
        }
        self.pending.clear();
    }

    /// Replace the connection parameters. The caller reconnects.
    pub fn reconfigure(&mut self, settings: SerialSettings) {
        self.disconnect();
        self.settings = settings;
    }

    /// Wait for the next line. Cancel safe: a partly read line is kept and
    /// completed by the next call.
    pub async fn next_lines(&mut self) -> Result<Vec<String>, TransportError> {
        let reader = self.reader.as_mut().ok_or(TransportError::NotConnected)?;
        let read = reader.read_until(b'\n', &mut self.pending).await?;
        if read == 0 {
            self.pending.clear();
            return Err(TransportError::Closed);
        }

        let line = String::from_utf8_lossy(&self.pending).trim().to_string();
        self.pending.clear();
        Ok(vec![line])
    }
}

fn open_port(settings: &SerialSettings) -> io::Result<PortStream> {
    let stream = tokio_serial::new(settings.com_port.as_str(), settings.baud_rate)
        .data_bits(DataBits::Eight)
        .parity(Parity::None)
        .stop_bits(StopBits::One)
        .open_native_async()
        .map_err(port_error)?;
    Ok(Box::new(stream))
}

/// Keep the OS error kind so start-up classification can tell a missing
/// port from a busy one.
fn port_error(err: tokio_serial::Error) -> io::Error {
    let kind = match err.kind {
        tokio_serial::ErrorKind::NoDevice => io::ErrorKind::NotFound,
        tokio_serial::ErrorKind::InvalidInput => io::ErrorKind::InvalidInput,
        tokio_serial::ErrorKind::Io(kind) => kind,
        tokio_serial::ErrorKind::Unknown => io::ErrorKind::Other,
    };
    io::Error::new(kind, err.description)
}
