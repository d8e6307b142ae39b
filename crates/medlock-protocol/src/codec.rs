//! Tokio codec for lock controller frames.
//!
//! [`LockCodec`] is a thin layer over [`StreamParser`] so a TCP socket or serial
//! port can be wrapped in `tokio_util::codec::Framed`:
//!
//! ```text
//! bytes -> Decoder -> Result<Frame, FrameError>
//! Frame -> Encoder -> bytes
//! ```
//!
//! Invalid frames are yielded as items rather than stream errors. A corrupted packet
//! on a noisy RS-485 line is routine and must not end the stream; only I/O failures
//! do.
//!
//! ```rust,no_run
//! use futures::{SinkExt, StreamExt};
//! use tokio::net::TcpStream;
//! use tokio_util::codec::Framed;
//! use medlock_protocol::{LockCodec, LockProtocol, SingleBoard};
//!
//! # async fn example() -> std::io::Result<()> {
//! let stream = TcpStream::connect("127.0.0.1:4001").await?;
//! let mut framed = Framed::new(stream, LockCodec::new(SingleBoard));
//!
//! let request = SingleBoard.encode_status_request(0).expect("valid address");
//! framed.send(request).await?;
//!
//! if let Some(Ok(Ok(reply))) = framed.next().await {
//!     println!("{reply}");
//! }
//! # Ok(())
//! # }
//! ```

use bytes::BytesMut;
use std::io;
use tokio_util::codec::{Decoder, Encoder};

use crate::error::FrameResult;
use crate::frame::Frame;
use crate::protocol::LockProtocol;
use crate::stream_parser::StreamParser;

/// Framing codec for one protocol variant.
#[derive(Debug)]
pub struct LockCodec<P: LockProtocol> {
    parser: StreamParser<P>,
}

impl<P: LockProtocol> LockCodec<P> {
    pub fn new(protocol: P) -> Self {
        Self {
            parser: StreamParser::new(protocol),
        }
    }

    /// Bytes dropped so far as noise or invalid frames.
    pub fn discarded(&self) -> usize {
        self.parser.discarded()
    }
}

impl<P: LockProtocol> Default for LockCodec<P> {
    fn default() -> Self {
        Self::new(P::default())
    }
}

impl<P: LockProtocol> Decoder for LockCodec<P> {
    type Item = FrameResult<Frame>;
    type Error = io::Error;

    fn decode(&mut self, src: &mut BytesMut) -> io::Result<Option<Self::Item>> {
        if !src.is_empty() {
            // All bytes now belong to the parser.
            self.parser.feed(&src[..]);
            src.clear();
        }
        Ok(self.parser.next_frame())
    }
}

impl<P: LockProtocol> Encoder<Frame> for LockCodec<P> {
    type Error = io::Error;

    fn encode(&mut self, item: Frame, dst: &mut BytesMut) -> io::Result<()> {
        dst.extend_from_slice(item.as_bytes());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{FrameError, MultiBoard, SingleBoard};

    #[test]
    fn test_decode_partial_then_complete() {
        let mut codec = LockCodec::new(SingleBoard);
        let mut buffer = BytesMut::from(&[0x02, 0x00][..]);
        assert!(codec.decode(&mut buffer).unwrap().is_none());
        assert!(buffer.is_empty());

        buffer.extend_from_slice(&[0x31, 0x03, 0x36]);
        let frame = codec.decode(&mut buffer).unwrap().unwrap().unwrap();
        assert_eq!(frame.command(), 0x31);
    }

    #[test]
    fn test_decode_yields_frame_errors_as_items() {
        let mut codec = LockCodec::new(MultiBoard);
        let mut buffer = BytesMut::from(&[0x02, 0x00, 0x00, 0x80, 0x00, 0x00, 0x03, 0x00][..]);
        let item = codec.decode(&mut buffer).unwrap().unwrap();
        assert!(matches!(item, Err(FrameError::ChecksumMismatch { .. })));
        assert!(codec.decode(&mut buffer).unwrap().is_none());
    }

    #[test]
    fn test_encode_writes_wire_bytes() {
        let mut codec = LockCodec::new(MultiBoard);
        let frame = MultiBoard.encode_unlock_request(0x01, 0).unwrap();
        let mut dst = BytesMut::new();
        codec.encode(frame.clone(), &mut dst).unwrap();
        assert_eq!(&dst[..], frame.as_bytes());
    }
}
