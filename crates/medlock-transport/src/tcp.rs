//! TCP link to a serial-over-IP bridge.
//!
//! Lock boards on site are often reached through an RS-485 to Ethernet converter
//! that forwards raw bytes. The transport connects with a timeout and disables
//! Nagle's algorithm so 5 to 14 byte frames leave immediately.
//!
//! ```no_run
//! use medlock_transport::{TcpTransport, Transport};
//! use std::time::Duration;
//!
//! # async fn example() -> medlock_transport::Result<()> {
//! let mut link = TcpTransport::new("10.0.0.5", 4001, Duration::from_secs(3));
//! let mut events = link.open().await?;
//! link.write_frame(&[0x02, 0x00, 0x30, 0x03, 0x35]).await?;
//! let first = events.recv().await;
//! # Ok(())
//! # }
//! ```

use std::time::Duration;
use tokio::net::TcpStream;
use tokio::net::tcp::OwnedWriteHalf;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::connection::Connection;
use crate::error::{Result, TransportError};
use crate::traits::{Transport, TransportEvent};

/// Transport over a TCP stream.
#[derive(Debug)]
pub struct TcpTransport {
    host: String,
    port: u16,
    connect_timeout: Duration,
    connection: Option<Connection<OwnedWriteHalf>>,
}

impl TcpTransport {
    pub fn new(host: impl Into<String>, port: u16, connect_timeout: Duration) -> Self {
        Self {
            host: host.into(),
            port,
            connect_timeout,
            connection: None,
        }
    }
}

impl Transport for TcpTransport {
    async fn open(&mut self) -> Result<mpsc::Receiver<TransportEvent>> {
        if let Some(previous) = self.connection.take() {
            previous.shutdown().await;
        }

        let target = self.describe();
        info!(%target, "Connecting");

        let stream = match tokio::time::timeout(
            self.connect_timeout,
            TcpStream::connect((self.host.as_str(), self.port)),
        )
        .await
        {
            Ok(Ok(stream)) => stream,
            Ok(Err(e)) => {
                warn!(%target, error = %e, "Connection failed");
                return Err(TransportError::from_io(&target, e));
            }
            Err(_) => {
                let timeout_ms = self.connect_timeout.as_millis() as u64;
                warn!(%target, timeout_ms, "Connection timeout");
                return Err(TransportError::ConnectTimeout { target, timeout_ms });
            }
        };

        if let Err(e) = stream.set_nodelay(true) {
            warn!(%target, error = %e, "Failed to set TCP_NODELAY");
        }

        let (reader, writer) = stream.into_split();
        let (connection, events) = Connection::start(reader, writer, target.clone());
        self.connection = Some(connection);
        info!(%target, "Connected");
        Ok(events)
    }

    async fn close(&mut self) -> Result<()> {
        if let Some(connection) = self.connection.take() {
            debug!(target = %self.describe(), "Closing connection");
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
        format!("{}:{}", self.host, self.port)
    }
}
