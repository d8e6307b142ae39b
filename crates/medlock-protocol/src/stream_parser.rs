//! Stream parser for lock controller frames.
//!
//! Serial lines and TCP bridges deliver bytes in arbitrary chunks. The parser
//! accumulates them and cuts complete frames using the variant's
//! [`frame_len`](crate::LockProtocol::frame_len), so frame boundaries come from the
//! layout rather than from scanning for an end marker that may also appear inside
//! status data.
//!
//! # Resynchronisation
//!
//! ```text
//! ┌─────────────┐  STX at head  ┌──────────────┐  len known + bytes  ┌──────────┐
//! │ Scanning    │──────────────>│ Measuring    │────────────────────>│ Decode   │
//! └─────────────┘               └──────────────┘                     └──────────┘
//!       ^   non-STX bytes dropped                    misaligned: drop 1 byte │
//!       └────────────────────────────────────────────────────────────────────┘
//!                                                    bad checksum: drop frame
//! ```
//!
//! ```
//! use medlock_protocol::{SingleBoard, StreamParser};
//!
//! let mut parser = StreamParser::new(SingleBoard);
//! parser.feed(&[0xFF, 0x02, 0x00]);
//! assert!(parser.next_frame().is_none());
//! parser.feed(&[0x30, 0x03, 0x35]);
//!
//! let frame = parser.next_frame().unwrap().unwrap();
//! assert_eq!(frame.command(), 0x30);
//! ```

use bytes::{Buf, BytesMut};
use tracing::trace;

use medlock_core::constants::START_BYTE;

use crate::error::FrameResult;
use crate::frame::{Frame, HexBytes};
use crate::protocol::{FrameLength, LockProtocol};

/// Upper bound on buffered bytes; a stream that grows past it without yielding a
/// frame is noise and is discarded.
const MAX_BUFFER_SIZE: usize = 4 * 1024;

/// Initial buffer capacity; frames are at most 14 bytes.
const INITIAL_BUFFER_CAPACITY: usize = 256;

/// Stateful splitter of a byte stream into decoded frames.
#[derive(Debug)]
pub struct StreamParser<P: LockProtocol> {
    protocol: P,
    buffer: BytesMut,
    discarded: usize,
}

impl<P: LockProtocol> StreamParser<P> {
    pub fn new(protocol: P) -> Self {
        Self {
            protocol,
            buffer: BytesMut::with_capacity(INITIAL_BUFFER_CAPACITY),
            discarded: 0,
        }
    }

    /// Append bytes received from the link.
    pub fn feed(&mut self, data: &[u8]) {
        if self.buffer.len() + data.len() > MAX_BUFFER_SIZE {
            trace!(
                buffered = self.buffer.len(),
                incoming = data.len(),
                "Stream parser overflow, clearing buffer"
            );
            self.discarded += self.buffer.len();
            self.buffer.clear();
        }
        self.buffer.extend_from_slice(data);
    }

    /// Next complete frame, `None` when more bytes are needed.
    ///
    /// Invalid candidates surface as `Some(Err(_))` so the caller can log them;
    /// parsing continues with the following bytes on the next call.
    pub fn next_frame(&mut self) -> Option<FrameResult<Frame>> {
        self.skip_to_start();
        if self.buffer.is_empty() {
            return None;
        }

        let len = match self.protocol.frame_len(&self.buffer) {
            FrameLength::Incomplete => return None,
            FrameLength::Complete(len) => len,
        };
        if self.buffer.len() < len {
            return None;
        }

        let result = self.protocol.decode(&self.buffer[..len]);
        match &result {
            Ok(_) => self.buffer.advance(len),
            Err(e) if e.is_misaligned() => {
                self.buffer.advance(1);
                self.discarded += 1;
            }
            Err(_) => {
                self.buffer.advance(len);
                self.discarded += len;
            }
        }
        Some(result)
    }

    /// Bytes currently waiting for the rest of a frame.
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    /// Total bytes dropped as noise or invalid frames.
    pub fn discarded(&self) -> usize {
        self.discarded
    }

    /// Drop everything buffered, e.g. after the link reconnects.
    pub fn clear(&mut self) {
        self.buffer.clear();
    }

    fn skip_to_start(&mut self) {
        let skip = self
            .buffer
            .iter()
            .position(|b| *b == START_BYTE)
            .unwrap_or(self.buffer.len());
        if skip > 0 {
            trace!(noise = %HexBytes(&self.buffer[..skip]), "Discarding bytes before start marker");
            self.buffer.advance(skip);
            self.discarded += skip;
        }
    }
}
