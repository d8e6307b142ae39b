//! The link abstraction the dispatcher drives.
//!
//! Methods return `impl Future + Send` so a dispatcher generic over the transport can
//! run on a spawned task. Implementations may still write `async fn`.
//!
//! The trait is not object-safe; use [`AnyTransport`](crate::AnyTransport) where a
//! concrete type must be picked at runtime.

use bytes::Bytes;
use std::future::Future;
use tokio::sync::mpsc;

use crate::error::Result;

/// What arrives from an open link.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    /// A chunk of bytes, with no relation to frame boundaries.
    Data(Bytes),

    /// The link closed without being asked to.
    Closed(String),
}

/// Byte pipe to the lock hardware.
pub trait Transport: Send + 'static {
    /// Open the link. Inbound data arrives on the returned channel until the link
    /// closes; the last event of an unexpected close is [`TransportEvent::Closed`].
    fn open(&mut self) -> impl Future<Output = Result<mpsc::Receiver<TransportEvent>>> + Send;

    /// Close the link. Closing a closed link is a no-op.
    fn close(&mut self) -> impl Future<Output = Result<()>> + Send;

    /// Write one complete frame.
    fn write_frame(&mut self, bytes: &[u8]) -> impl Future<Output = Result<()>> + Send;

    fn is_connected(&self) -> bool;

    /// Human readable target, e.g. `/dev/ttyUSB0@19200` or `10.0.0.5:4001`.
    fn describe(&self) -> String;
}
