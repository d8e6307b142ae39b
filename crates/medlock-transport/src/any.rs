//! Enum wrapper for transport dispatch.
//!
//! [`Transport`] uses `impl Future` returns and cannot be boxed as a trait object.
//! `AnyTransport` gives the controller one concrete type chosen from configuration.
//!
//! ```
//! use medlock_transport::{AnyTransport, MockTransport, Transport};
//!
//! let (mock, _handle) = MockTransport::new();
//! let link = AnyTransport::Mock(mock);
//! assert!(!link.is_connected());
//! ```

use std::time::Duration;
use tokio::sync::mpsc;

use medlock_core::LinkConfig;

use crate::error::Result;
use crate::mock::MockTransport;
#[cfg(feature = "serial")]
use crate::serial::SerialTransport;
use crate::tcp::TcpTransport;
use crate::traits::{Transport, TransportEvent};

#[derive(Debug)]
#[non_exhaustive]
pub enum AnyTransport {
    #[cfg(feature = "serial")]
    Serial(SerialTransport),
    Tcp(TcpTransport),
    Mock(MockTransport),
}

impl AnyTransport {
    /// Transport for a configured link.
    #[cfg(feature = "serial")]
    pub fn from_config(link: &LinkConfig, connect_timeout: Duration) -> Result<Self> {
        Ok(match link {
            LinkConfig::Serial { path, baud_rate } => {
                Self::Serial(SerialTransport::new(path.clone(), *baud_rate))
            }
            LinkConfig::Tcp { host, port } => {
                Self::Tcp(TcpTransport::new(host.clone(), *port, connect_timeout))
            }
        })
    }

    /// Transport for a configured link.
    #[cfg(not(feature = "serial"))]
    pub fn from_config(link: &LinkConfig, connect_timeout: Duration) -> Result<Self> {
        match link {
            LinkConfig::Serial { path, .. } => Err(crate::TransportError::DeviceNotFound {
                target: format!("{path} (built without serial support)"),
            }),
            LinkConfig::Tcp { host, port } => Ok(Self::Tcp(TcpTransport::new(
                host.clone(),
                *port,
                connect_timeout,
            ))),
        }
    }
}

impl Transport for AnyTransport {
    async fn open(&mut self) -> Result<mpsc::Receiver<TransportEvent>> {
        match self {
            #[cfg(feature = "serial")]
            Self::Serial(link) => link.open().await,
            Self::Tcp(link) => link.open().await,
            Self::Mock(link) => link.open().await,
        }
    }

    async fn close(&mut self) -> Result<()> {
        match self {
            #[cfg(feature = "serial")]
            Self::Serial(link) => link.close().await,
            Self::Tcp(link) => link.close().await,
            Self::Mock(link) => link.close().await,
        }
    }

    async fn write_frame(&mut self, bytes: &[u8]) -> Result<()> {
        match self {
            #[cfg(feature = "serial")]
            Self::Serial(link) => link.write_frame(bytes).await,
            Self::Tcp(link) => link.write_frame(bytes).await,
            Self::Mock(link) => link.write_frame(bytes).await,
        }
    }

    fn is_connected(&self) -> bool {
        match self {
            #[cfg(feature = "serial")]
            Self::Serial(link) => link.is_connected(),
            Self::Tcp(link) => link.is_connected(),
            Self::Mock(link) => link.is_connected(),
        }
    }

    fn describe(&self) -> String {
        match self {
            #[cfg(feature = "serial")]
            Self::Serial(link) => link.describe(),
            Self::Tcp(link) => link.describe(),
            Self::Mock(link) => link.describe(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_config_tcp() {
        let link = LinkConfig::Tcp {
            host: "10.0.0.5".into(),
            port: 4001,
        };
        let transport = AnyTransport::from_config(&link, Duration::from_secs(1)).unwrap();
        assert!(matches!(transport, AnyTransport::Tcp(_)));
        assert_eq!(transport.describe(), "10.0.0.5:4001");
    }

    #[cfg(feature = "serial")]
    #[test]
    fn test_from_config_serial() {
        let link = LinkConfig::Serial {
            path: "/dev/ttyUSB0".into(),
            baud_rate: 9600,
        };
        let transport = AnyTransport::from_config(&link, Duration::from_secs(1)).unwrap();
        assert_eq!(transport.describe(), "/dev/ttyUSB0@9600");
    }
}
