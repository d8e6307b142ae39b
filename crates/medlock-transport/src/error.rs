//! Error types for link operations.

use std::io;

/// Result type alias for transport operations.
pub type Result<T> = std::result::Result<T, TransportError>;

/// Errors that can occur while opening or using a link.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// Operation needs an open link.
    #[error("Not connected")]
    NotConnected,

    /// Remote end refused the connection.
    #[error("Connection refused by {target}")]
    ConnectionRefused { target: String },

    /// Connection attempt did not finish in time.
    #[error("Connection to {target} timed out after {timeout_ms}ms")]
    ConnectTimeout { target: String, timeout_ms: u64 },

    /// Port exists but is held by another process or not permitted.
    #[error("Access denied to {target} (already open?)")]
    AccessDenied { target: String },

    /// No such serial device.
    #[error("Device not found: {target}")]
    DeviceNotFound { target: String },

    /// Link dropped while in use.
    #[error("Connection lost: {reason}")]
    ConnectionLost { reason: String },

    /// Generic I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl TransportError {
    pub fn connection_lost(reason: impl Into<String>) -> Self {
        Self::ConnectionLost {
            reason: reason.into(),
        }
    }

    /// Soft errors are expected on start-up (a port already held by this process)
    /// and are reported without escalating.
    pub fn is_soft(&self) -> bool {
        matches!(self, Self::AccessDenied { .. })
    }

    /// Map an I/O failure on `target` to the closest variant.
    pub(crate) fn from_io(target: &str, err: io::Error) -> Self {
        match err.kind() {
            io::ErrorKind::ConnectionRefused => Self::ConnectionRefused {
                target: target.to_string(),
            },
            io::ErrorKind::PermissionDenied => Self::AccessDenied {
                target: target.to_string(),
            },
            io::ErrorKind::NotFound => Self::DeviceNotFound {
                target: target.to_string(),
            },
            io::ErrorKind::BrokenPipe
            | io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionAborted
            | io::ErrorKind::UnexpectedEof => Self::connection_lost(err.to_string()),
            _ => Self::Io(err),
        }
    }
}
