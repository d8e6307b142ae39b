//! Mock link for testing without hardware.
//!
//! A [`MockTransport`] is driven from a [`MockTransportHandle`]: the handle sees every
//! frame written, injects inbound bytes, drops the link and makes the next opens fail.
//!
//! ```
//! use medlock_transport::{MockTransport, Transport, TransportEvent};
//!
//! #[tokio::main]
//! async fn main() -> medlock_transport::Result<()> {
//!     let (mut link, mut handle) = MockTransport::new();
//!     let mut events = link.open().await?;
//!
//!     link.write_frame(&[0x02, 0x00, 0x30, 0x03, 0x35]).await?;
//!     assert_eq!(handle.next_written().await.unwrap().as_ref(), &[0x02, 0x00, 0x30, 0x03, 0x35]);
//!
//!     handle.inject(&[0x02, 0x00, 0x36]).await?;
//!     assert!(matches!(events.recv().await, Some(TransportEvent::Data(_))));
//!     Ok(())
//! }
//! ```

use bytes::Bytes;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::trace;

use crate::connection::EVENT_CHANNEL_CAPACITY;
use crate::error::{Result, TransportError};
use crate::traits::{Transport, TransportEvent};

/// How a scripted open attempt fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MockOpenFailure {
    Refused,
    AccessDenied,
    Timeout,
}

impl MockOpenFailure {
    fn into_error(self, target: &str) -> TransportError {
        let target = target.to_string();
        match self {
            Self::Refused => TransportError::ConnectionRefused { target },
            Self::AccessDenied => TransportError::AccessDenied { target },
            Self::Timeout => TransportError::ConnectTimeout {
                target,
                timeout_ms: 0,
            },
        }
    }
}

#[derive(Debug, Default)]
struct MockState {
    inbound: Option<mpsc::Sender<TransportEvent>>,
    open_failures: VecDeque<MockOpenFailure>,
    opens: usize,
}

fn lock(state: &Mutex<MockState>) -> MutexGuard<'_, MockState> {
    state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// In-memory transport.
#[derive(Debug)]
pub struct MockTransport {
    name: String,
    state: Arc<Mutex<MockState>>,
    written_tx: mpsc::UnboundedSender<Bytes>,
}

impl MockTransport {
    /// Create a mock link and the handle that controls it.
    pub fn new() -> (Self, MockTransportHandle) {
        Self::with_name("mock")
    }

    pub fn with_name(name: impl Into<String>) -> (Self, MockTransportHandle) {
        let state = Arc::new(Mutex::new(MockState::default()));
        let (written_tx, written_rx) = mpsc::unbounded_channel();
        let transport = Self {
            name: name.into(),
            state: Arc::clone(&state),
            written_tx,
        };
        let handle = MockTransportHandle { state, written_rx };
        (transport, handle)
    }
}

impl Transport for MockTransport {
    async fn open(&mut self) -> Result<mpsc::Receiver<TransportEvent>> {
        let mut state = lock(&self.state);
        state.opens += 1;
        if let Some(failure) = state.open_failures.pop_front() {
            trace!(name = %self.name, ?failure, "Mock open failing");
            return Err(failure.into_error(&self.name));
        }
        let (tx, rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        state.inbound = Some(tx);
        Ok(rx)
    }

    async fn close(&mut self) -> Result<()> {
        lock(&self.state).inbound = None;
        Ok(())
    }

    async fn write_frame(&mut self, bytes: &[u8]) -> Result<()> {
        if lock(&self.state).inbound.is_none() {
            return Err(TransportError::NotConnected);
        }
        trace!(name = %self.name, len = bytes.len(), "Mock write");
        self.written_tx
            .send(Bytes::copy_from_slice(bytes))
            .map_err(|_| TransportError::connection_lost("mock handle dropped"))
    }

    fn is_connected(&self) -> bool {
        lock(&self.state).inbound.is_some()
    }

    fn describe(&self) -> String {
        self.name.clone()
    }
}

/// Controls a [`MockTransport`] from a test.
#[derive(Debug)]
pub struct MockTransportHandle {
    state: Arc<Mutex<MockState>>,
    written_rx: mpsc::UnboundedReceiver<Bytes>,
}

impl MockTransportHandle {
    /// Deliver bytes as if the hardware had sent them.
    pub async fn inject(&self, bytes: &[u8]) -> Result<()> {
        let sender = lock(&self.state)
            .inbound
            .clone()
            .ok_or(TransportError::NotConnected)?;
        sender
            .send(TransportEvent::Data(Bytes::copy_from_slice(bytes)))
            .await
            .map_err(|_| TransportError::connection_lost("receiver dropped"))
    }

    /// Drop the link as a pulled cable would.
    pub async fn disconnect(&self, reason: &str) {
        let sender = lock(&self.state).inbound.take();
        if let Some(sender) = sender {
            let _ = sender.send(TransportEvent::Closed(reason.to_string())).await;
        }
    }

    /// Make the next open attempts fail, in order.
    pub fn fail_next_opens(&self, failures: impl IntoIterator<Item = MockOpenFailure>) {
        lock(&self.state).open_failures.extend(failures);
    }

    /// Number of open attempts so far.
    pub fn open_count(&self) -> usize {
        lock(&self.state).opens
    }

    pub fn is_connected(&self) -> bool {
        lock(&self.state).inbound.is_some()
    }

    /// Next frame written by the host.
    pub async fn next_written(&mut self) -> Option<Bytes> {
        self.written_rx.recv().await
    }

    /// Next written frame, or `None` if nothing arrives within `wait`.
    pub async fn next_written_within(&mut self, wait: Duration) -> Option<Bytes> {
        tokio::time::timeout(wait, self.written_rx.recv())
            .await
            .ok()
            .flatten()
    }

    /// A frame already written, without waiting.
    pub fn try_written(&mut self) -> Option<Bytes> {
        self.written_rx.try_recv().ok()
    }
}
