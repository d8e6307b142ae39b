//! Errors surfaced by the dispatcher and the controller façade.
//!
//! Lower layers keep their own error types; the façade translates them into
//! [`ControllerError`] and keeps the original detail in the message.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use medlock_core::SlotId;
use medlock_protocol::AddressError;
use medlock_transport::TransportError;

use crate::lifecycle::SlotState;

/// Why a dispatched command produced no reply frame.
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("No reply within {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    #[error("Connection lost: {reason}")]
    ConnectionLost { reason: String },

    #[error("Not connected")]
    NotConnected,

    #[error("Command cancelled")]
    Cancelled,

    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),
}

/// Machine-readable error category carried by error events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    CommandTimeout,
    ConnectionLost,
    ConnectionRefused,
    NotConnected,
    InvalidSlot,
    MissingContentId,
    InvalidFrame,
    AuthorizationFailed,
    IllegalStateTransition,
    OperationInProgress,
    Refused,
    Store,
    Config,
    Cancelled,
    EngineStopped,
}

/// Result type alias for façade operations.
pub type Result<T> = std::result::Result<T, ControllerError>;

#[derive(Debug, Error)]
pub enum ControllerError {
    #[error("Command timed out after {timeout_ms}ms")]
    CommandTimeout { timeout_ms: u64 },

    #[error("Connection lost: {reason}")]
    ConnectionLost { reason: String },

    #[error("Connection refused: {reason}")]
    ConnectionRefused { reason: String, soft: bool },

    #[error("Not connected to the lock controller")]
    NotConnected,

    #[error("Invalid slot: {0}")]
    InvalidSlot(String),

    #[error("Slot {slot} needs a content id to unlock")]
    MissingContentId { slot: SlotId },

    #[error("Authorization failed")]
    AuthorizationFailed,

    #[error("Slot {slot} is {state}, cannot {operation}")]
    IllegalStateTransition {
        slot: SlotId,
        state: SlotState,
        operation: &'static str,
    },

    #[error("Slot {slot} has an operation in progress")]
    OperationInProgress { slot: SlotId },

    #[error("Lock controller refused to unlock slot {slot}")]
    Refused { slot: SlotId },

    #[error("Slot store error: {0}")]
    Store(String),

    #[error("Configuration error: {0}")]
    Config(#[from] medlock_core::Error),

    #[error("Operation cancelled")]
    Cancelled,

    #[error("Controller engine stopped")]
    EngineStopped,
}

impl ControllerError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::CommandTimeout { .. } => ErrorKind::CommandTimeout,
            Self::ConnectionLost { .. } => ErrorKind::ConnectionLost,
            Self::ConnectionRefused { .. } => ErrorKind::ConnectionRefused,
            Self::NotConnected => ErrorKind::NotConnected,
            Self::InvalidSlot(_) => ErrorKind::InvalidSlot,
            Self::MissingContentId { .. } => ErrorKind::MissingContentId,
            Self::AuthorizationFailed => ErrorKind::AuthorizationFailed,
            Self::IllegalStateTransition { .. } => ErrorKind::IllegalStateTransition,
            Self::OperationInProgress { .. } => ErrorKind::OperationInProgress,
            Self::Refused { .. } => ErrorKind::Refused,
            Self::Store(_) => ErrorKind::Store,
            Self::Config(_) => ErrorKind::Config,
            Self::Cancelled => ErrorKind::Cancelled,
            Self::EngineStopped => ErrorKind::EngineStopped,
        }
    }

    /// Soft errors (a port already held) are reported without escalating.
    pub fn is_soft(&self) -> bool {
        matches!(self, Self::ConnectionRefused { soft: true, .. })
    }
}

impl From<AddressError> for ControllerError {
    fn from(err: AddressError) -> Self {
        Self::InvalidSlot(err.to_string())
    }
}

impl From<TransportError> for ControllerError {
    fn from(err: TransportError) -> Self {
        match err {
            TransportError::NotConnected => Self::NotConnected,
            TransportError::ConnectionLost { reason } => Self::ConnectionLost { reason },
            TransportError::ConnectionRefused { .. }
            | TransportError::ConnectTimeout { .. }
            | TransportError::AccessDenied { .. }
            | TransportError::DeviceNotFound { .. } => Self::ConnectionRefused {
                soft: err.is_soft(),
                reason: err.to_string(),
            },
            TransportError::Io(e) => Self::ConnectionLost {
                reason: e.to_string(),
            },
        }
    }
}

impl From<DispatchError> for ControllerError {
    fn from(err: DispatchError) -> Self {
        match err {
            DispatchError::Timeout { timeout_ms } => Self::CommandTimeout { timeout_ms },
            DispatchError::ConnectionLost { reason } => Self::ConnectionLost { reason },
            DispatchError::NotConnected => Self::NotConnected,
            DispatchError::Cancelled => Self::Cancelled,
            DispatchError::Transport(e) => e.into(),
        }
    }
}
