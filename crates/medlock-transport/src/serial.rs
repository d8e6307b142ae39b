//! RS-485 link through a USB serial adapter.
//!
//! Both board families talk 8N1 without flow control; only the baud rate varies by
//! deployment (19200 for the single-board controller by default).

use tokio::io::WriteHalf;
use tokio::sync::mpsc;
use tokio_serial::{
    DataBits, FlowControl, Parity, SerialPortBuilderExt, SerialStream, StopBits,
};
use tracing::{debug, info, warn};

use crate::connection::Connection;
use crate::error::{Result, TransportError};
use crate::traits::{Transport, TransportEvent};

/// Transport over a local serial port.
#[derive(Debug)]
pub struct SerialTransport {
    path: String,
    baud_rate: u32,
    connection: Option<Connection<WriteHalf<SerialStream>>>,
}

impl SerialTransport {
    pub fn new(path: impl Into<String>, baud_rate: u32) -> Self {
        Self {
            path: path.into(),
            baud_rate,
            connection: None,
        }
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    fn map_open_error(&self, err: tokio_serial::Error) -> TransportError {
        let target = self.path.clone();
        match err.kind() {
            tokio_serial::ErrorKind::NoDevice => TransportError::DeviceNotFound { target },
            tokio_serial::ErrorKind::Io(std::io::ErrorKind::NotFound) => {
                TransportError::DeviceNotFound { target }
            }
            // EBUSY: another process holds the port
            tokio_serial::ErrorKind::Io(
                std::io::ErrorKind::PermissionDenied | std::io::ErrorKind::ResourceBusy,
            ) => TransportError::AccessDenied { target },
            _ => TransportError::Io(std::io::Error::other(err.to_string())),
        }
    }
}

impl Transport for SerialTransport {
    async fn open(&mut self) -> Result<mpsc::Receiver<TransportEvent>> {
        if let Some(previous) = self.connection.take() {
            previous.shutdown().await;
        }

        let target = self.describe();
        info!(%target, "Opening serial port");

        let stream = tokio_serial::new(&self.path, self.baud_rate)
            .data_bits(DataBits::Eight)
            .parity(Parity::None)
            .stop_bits(StopBits::One)
            .flow_control(FlowControl::None)
            .open_native_async()
            .map_err(|e| {
                let mapped = self.map_open_error(e);
                if mapped.is_soft() {
                    debug!(%target, error = %mapped, "Serial port busy");
                } else {
                    warn!(%target, error = %mapped, "Failed to open serial port");
                }
                mapped
            })?;

        let (reader, writer) = tokio::io::split(stream);
        let (connection, events) = Connection::start(reader, writer, target.clone());
        self.connection = Some(connection);
        info!(%target, "Serial port open");
        Ok(events)
    }

    async fn close(&mut self) -> Result<()> {
        if let Some(connection) = self.connection.take() {
            debug!(target = %self.describe(), "Closing serial port");
            connection.shutdown().await;
        }
        Ok(())
    }

    async fn write_frame(&mut self, bytes: &[u8]) -> Result<()> {
        let target = self.describe();
        let connection = self
            .connection
            .as_mut()
            .ok_or(TransportError::NotConnected)?;
        connection.write(&target, bytes).await
    }

    fn is_connected(&self) -> bool {
        self.connection.as_ref().is_some_and(Connection::is_alive)
    }

    fn describe(&self) -> String {
        format!("{}@{}", self.path, self.baud_rate)
    }
}
