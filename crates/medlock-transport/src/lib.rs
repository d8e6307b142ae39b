//! Byte links to lock controller hardware.
//!
//! Every transport hands inbound bytes to its owner through a channel of
//! [`TransportEvent`]s fed by a reader task, so nothing polls the link.

pub mod any;
mod connection;
pub mod error;
pub mod mock;
#[cfg(feature = "serial")]
pub mod serial;
pub mod tcp;
pub mod traits;

pub use any::AnyTransport;
pub use error::{Result, TransportError};
pub use mock::{MockOpenFailure, MockTransport, MockTransportHandle};
#[cfg(feature = "serial")]
pub use serial::SerialTransport;
pub use tcp::TcpTransport;
pub use traits::{Transport, TransportEvent};
