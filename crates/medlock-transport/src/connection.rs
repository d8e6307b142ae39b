//! Split connection shared by the stream-backed transports.
//!
//! The read half moves into a reader task that forwards chunks as
//! [`TransportEvent::Data`]; the write half stays with the transport.

use bytes::BytesMut;
use std::fmt;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, trace, warn};

use crate::error::{Result, TransportError};
use crate::traits::TransportEvent;

/// Capacity of the inbound event channel.
pub(crate) const EVENT_CHANNEL_CAPACITY: usize = 64;

const READ_BUFFER_SIZE: usize = 256;

/// Forward everything read from `reader` until EOF or error.
pub(crate) fn spawn_reader<R>(
    mut reader: R,
    tx: mpsc::Sender<TransportEvent>,
    target: String,
) -> JoinHandle<()>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut buf = BytesMut::with_capacity(READ_BUFFER_SIZE);
        loop {
            match reader.read_buf(&mut buf).await {
                Ok(0) => {
                    debug!(%target, "Link reached end of stream");
                    let _ = tx.send(TransportEvent::Closed("end of stream".into())).await;
                    break;
                }
                Ok(n) => {
                    trace!(%target, bytes = n, "Link data received");
                    if tx.send(TransportEvent::Data(buf.split().freeze())).await.is_err() {
                        break;
                    }
                    buf.reserve(READ_BUFFER_SIZE);
                }
                Err(e) => {
                    warn!(%target, error = %e, "Link read failed");
                    let _ = tx.send(TransportEvent::Closed(e.to_string())).await;
                    break;
                }
            }
        }
    })
}

/// Write half plus the task reading the other half.
pub(crate) struct Connection<W> {
    writer: W,
    reader: JoinHandle<()>,
}

impl<W> fmt::Debug for Connection<W> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("reader_finished", &self.reader.is_finished())
            .finish_non_exhaustive()
    }
}

impl<W> Connection<W>
where
    W: AsyncWrite + Unpin + Send,
{
    /// Split a duplex stream into a connection and its event receiver.
    pub(crate) fn start<R>(
        reader: R,
        writer: W,
        target: String,
    ) -> (Self, mpsc::Receiver<TransportEvent>)
    where
        R: AsyncRead + Unpin + Send + 'static,
    {
        let (tx, rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        let reader = spawn_reader(reader, tx, target);
        (Self { writer, reader }, rx)
    }

    pub(crate) fn is_alive(&self) -> bool {
        !self.reader.is_finished()
    }

    pub(crate) async fn write(&mut self, target: &str, bytes: &[u8]) -> Result<()> {
        if !self.is_alive() {
            return Err(TransportError::connection_lost("reader stopped"));
        }
        self.writer
            .write_all(bytes)
            .await
            .map_err(|e| TransportError::from_io(target, e))?;
        self.writer
            .flush()
            .await
            .map_err(|e| TransportError::from_io(target, e))
    }

    pub(crate) async fn shutdown(mut self) {
        self.reader.abort();
        if let Err(e) = self.writer.shutdown().await {
            trace!(error = %e, "Ignoring shutdown error on close");
        }
    }
}

impl<W> Drop for Connection<W> {
    fn drop(&mut self) {
        self.reader.abort();
    }
}
