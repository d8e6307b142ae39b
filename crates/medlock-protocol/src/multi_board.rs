//! Variant B: up to two boards of twelve locks each.
//!
//! # Wire Format
//!
//! ```text
//! STX  BOARD  LOCK  CMD  ASK  DATALEN  ETX  XOR  [DATA ...]
//! 02   00     04    81   00   00       03   85
//! ```
//!
//! - `CMD`: `0x80` status, `0x81` unlock. Replies echo the command.
//! - `ASK`: `0x00` on requests, `0x10` on an accepted reply, `0x11` on a refusal.
//! - `DATALEN`: 0 on commands; 1 or 2 lock bitmap bytes on status replies, or 6 in
//!   the extended form (2 lock bytes, 2 hook sensor bytes, 2 infrared bytes).
//! - `XOR`: XOR of `BOARD` through `DATALEN` and of every data byte.
//!
//! Board-level status requests carry `LOCK = 0x00`.
//!
//! ```
//! use medlock_protocol::{LockProtocol, MultiBoard};
//!
//! let frame = MultiBoard.encode_unlock_request(0x01, 0).unwrap();
//! assert_eq!(frame.as_bytes(), &[0x02, 0x01, 0x00, 0x81, 0x00, 0x00, 0x03, 0x80]);
//! ```

use bytes::{BufMut, Bytes, BytesMut};

use medlock_core::ProtocolVariant;
use medlock_core::constants::{
    ASK_ACK, ASK_NAK, ASK_REQUEST, END_BYTE, LOCKS_PER_BOARD, MULTI_BOARD_CMD_STATUS,
    MULTI_BOARD_CMD_UNLOCK, MULTI_BOARD_HEADER_LEN, MULTI_BOARD_MAX_DATA_LEN, START_BYTE,
};

use crate::error::{AddressError, FrameError, FrameResult};
use crate::frame::{CommandKind, Frame, FrameParts, LockBitmap, SensorState};
use crate::protocol::{FrameLength, LockProtocol};

const END_OFFSET: usize = 6;
const CHECKSUM_OFFSET: usize = 7;
const DATALEN_OFFSET: usize = 5;

/// Variant B codec.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MultiBoard;

fn xor_checksum<'a>(bytes: impl IntoIterator<Item = &'a u8>) -> u8 {
    bytes.into_iter().fold(0u8, |acc, b| acc ^ b)
}

fn check_lock_index(lock_index: u8) -> Result<(), AddressError> {
    if lock_index >= LOCKS_PER_BOARD {
        return Err(AddressError::LockIndexOutOfRange {
            lock_index,
            max: LOCKS_PER_BOARD - 1,
        });
    }
    Ok(())
}

impl MultiBoard {
    fn build(&self, board: u8, lock_index: u8, command: u8, ask: u8, data: &[u8]) -> Frame {
        let mut buf = BytesMut::with_capacity(MULTI_BOARD_HEADER_LEN + data.len());
        // DATALEN never exceeds MULTI_BOARD_MAX_DATA_LEN here.
        let header = [board, lock_index, command, ask, data.len() as u8];
        let checksum = xor_checksum(&header) ^ xor_checksum(data);

        buf.put_u8(START_BYTE);
        buf.put_slice(&header);
        buf.put_u8(END_BYTE);
        buf.put_u8(checksum);
        buf.put_slice(data);

        let raw = buf.freeze();
        let payload = raw.slice(MULTI_BOARD_HEADER_LEN..);
        Frame::assemble(
            ProtocolVariant::MultiBoard,
            raw,
            FrameParts {
                address: board,
                lock_index,
                command,
                ask: Some(ask),
                payload,
                checksum,
                reply: ask != ASK_REQUEST,
            },
        )
    }
}

impl LockProtocol for MultiBoard {
    const VARIANT: ProtocolVariant = ProtocolVariant::MultiBoard;

    fn encode_status_request(&self, address: u8) -> Result<Frame, AddressError> {
        Ok(self.build(address, 0, MULTI_BOARD_CMD_STATUS, ASK_REQUEST, &[]))
    }

    fn encode_unlock_request(&self, address: u8, lock_index: u8) -> Result<Frame, AddressError> {
        check_lock_index(lock_index)?;
        Ok(self.build(
            address,
            lock_index,
            MULTI_BOARD_CMD_UNLOCK,
            ASK_REQUEST,
            &[],
        ))
    }

    fn encode_status_reply(
        &self,
        address: u8,
        locks: LockBitmap,
        sensors: Option<SensorState>,
    ) -> Result<Frame, AddressError> {
        let mut data = Vec::with_capacity(MULTI_BOARD_MAX_DATA_LEN);
        data.extend_from_slice(&locks.to_le_bytes());
        if let Some(sensors) = sensors {
            data.extend_from_slice(&sensors.hooks.to_le_bytes());
            data.extend_from_slice(&sensors.infrared.to_le_bytes());
        }
        Ok(self.build(address, 0, MULTI_BOARD_CMD_STATUS, ASK_ACK, &data))
    }

    fn encode_unlock_reply(&self, address: u8, lock_index: u8) -> Result<Frame, AddressError> {
        check_lock_index(lock_index)?;
        Ok(self.build(address, lock_index, MULTI_BOARD_CMD_UNLOCK, ASK_ACK, &[]))
    }

    fn encode_unlock_refusal(
        &self,
        address: u8,
        lock_index: u8,
    ) -> Result<Option<Frame>, AddressError> {
        check_lock_index(lock_index)?;
        Ok(Some(self.build(
            address,
            lock_index,
            MULTI_BOARD_CMD_UNLOCK,
            ASK_NAK,
            &[],
        )))
    }

    fn decode(&self, raw: &[u8]) -> FrameResult<Frame> {
        let bytes = Bytes::copy_from_slice(raw);

        if raw.len() < MULTI_BOARD_HEADER_LEN {
            return Err(FrameError::TooShort {
                needed: MULTI_BOARD_HEADER_LEN,
                raw: bytes,
            });
        }
        if raw[0] != START_BYTE {
            return Err(FrameError::MissingStart { raw: bytes });
        }
        if raw[END_OFFSET] != END_BYTE {
            return Err(FrameError::MissingEnd {
                offset: END_OFFSET,
                raw: bytes,
            });
        }

        let declared = usize::from(raw[DATALEN_OFFSET]);
        let available = raw.len() - MULTI_BOARD_HEADER_LEN;
        if declared > MULTI_BOARD_MAX_DATA_LEN || declared > available {
            return Err(FrameError::PayloadOverrun {
                declared,
                available,
                raw: bytes,
            });
        }
        if available > declared {
            return Err(FrameError::UnexpectedLength {
                expected: MULTI_BOARD_HEADER_LEN + declared,
                raw: bytes,
            });
        }

        let computed = xor_checksum(&raw[1..=DATALEN_OFFSET])
            ^ xor_checksum(&raw[MULTI_BOARD_HEADER_LEN..]);
        let actual = raw[CHECKSUM_OFFSET];
        if computed != actual {
            return Err(FrameError::ChecksumMismatch {
                expected: computed,
                actual,
                raw: bytes,
            });
        }

        let ask = raw[4];
        let payload = bytes.slice(MULTI_BOARD_HEADER_LEN..);
        Ok(Frame::assemble(
            ProtocolVariant::MultiBoard,
            bytes,
            FrameParts {
                address: raw[1],
                lock_index: raw[2],
                command: raw[3],
                ask: Some(ask),
                payload,
                checksum: actual,
                reply: ask != ASK_REQUEST,
            },
        ))
    }

    fn classify(&self, frame: &Frame) -> CommandKind {
        match frame.command() {
            MULTI_BOARD_CMD_STATUS => CommandKind::Status,
            MULTI_BOARD_CMD_UNLOCK => CommandKind::Unlock,
            other => CommandKind::Unknown(other),
        }
    }

    fn frame_len(&self, buffered: &[u8]) -> FrameLength {
        match buffered.get(DATALEN_OFFSET) {
            None => FrameLength::Incomplete,
            Some(&len) if usize::from(len) > MULTI_BOARD_MAX_DATA_LEN => {
                // Let decode report the overrun on the bare header.
                FrameLength::Complete(MULTI_BOARD_HEADER_LEN)
            }
            Some(&len) => FrameLength::Complete(MULTI_BOARD_HEADER_LEN + usize::from(len)),
        }
    }

    fn is_refusal(&self, frame: &Frame) -> bool {
        frame.ask() == Some(ASK_NAK)
    }
}
