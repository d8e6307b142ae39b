//! Variant A: one board, sixteen locks (KU16 style).
//!
//! # Wire Format
//!
//! ```text
//! command / unlock reply   STX  ADDR  CMD  ETX  SUM
//! status reply             STX  ADDR  35   ETX  SUM  S0  S1
//! ```
//!
//! - `ADDR` packs the device address in the upper nibble and the lock index in the
//!   lower nibble (lock index 0 for status frames).
//! - `CMD`: `0x30` status request, `0x31` unlock request, `0x35` status reply,
//!   `0x36` unlock reply.
//! - `S0 S1`: little-endian lock bitmap, bit `n` is lock `n`, 1 = closed.
//! - `SUM`: low byte of the sum of every other byte in the frame.
//!
//! ```
//! use medlock_protocol::{LockProtocol, SingleBoard};
//!
//! let frame = SingleBoard.encode_status_request(0x00).unwrap();
//! assert_eq!(frame.as_bytes(), &[0x02, 0x00, 0x30, 0x03, 0x35]);
//! ```

use bytes::{BufMut, Bytes, BytesMut};

use medlock_core::ProtocolVariant;
use medlock_core::constants::{
    END_BYTE, SINGLE_BOARD_CMD_STATUS, SINGLE_BOARD_CMD_UNLOCK, SINGLE_BOARD_FRAME_LEN,
    SINGLE_BOARD_MAX_DEVICE_ADDRESS, SINGLE_BOARD_MAX_SLOTS, SINGLE_BOARD_REPLY_STATUS,
    SINGLE_BOARD_REPLY_UNLOCK, SINGLE_BOARD_STATUS_FRAME_LEN, START_BYTE,
};

use crate::error::{AddressError, FrameError, FrameResult};
use crate::frame::{CommandKind, Frame, FrameParts, LockBitmap, SensorState};
use crate::protocol::{FrameLength, LockProtocol};

/// Offset of the checksum trailer.
const CHECKSUM_OFFSET: usize = 4;

/// Offset of the end marker.
const END_OFFSET: usize = 3;

/// Variant A codec.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SingleBoard;

fn additive_checksum<'a>(bytes: impl IntoIterator<Item = &'a u8>) -> u8 {
    bytes.into_iter().fold(0u8, |acc, b| acc.wrapping_add(*b))
}

fn address_byte(address: u8, lock_index: u8) -> Result<u8, AddressError> {
    if address > SINGLE_BOARD_MAX_DEVICE_ADDRESS {
        return Err(AddressError::DeviceAddressOutOfRange {
            address,
            max: SINGLE_BOARD_MAX_DEVICE_ADDRESS,
        });
    }
    if lock_index >= SINGLE_BOARD_MAX_SLOTS {
        return Err(AddressError::LockIndexOutOfRange {
            lock_index,
            max: SINGLE_BOARD_MAX_SLOTS - 1,
        });
    }
    Ok((address << 4) | lock_index)
}

impl SingleBoard {
    fn build(&self, addr: u8, command: u8, status: Option<[u8; 2]>) -> Frame {
        let mut buf = BytesMut::with_capacity(SINGLE_BOARD_STATUS_FRAME_LEN);
        buf.put_slice(&[START_BYTE, addr, command, END_BYTE]);
        let mut checksum = additive_checksum(&buf[..]);
        if let Some(bytes) = status {
            checksum = checksum.wrapping_add(additive_checksum(&bytes));
        }
        buf.put_u8(checksum);
        if let Some(bytes) = status {
            buf.put_slice(&bytes);
        }

        let raw = buf.freeze();
        let payload = raw.slice(SINGLE_BOARD_FRAME_LEN..);
        Frame::assemble(
            ProtocolVariant::SingleBoard,
            raw,
            FrameParts {
                address: addr >> 4,
                lock_index: addr & 0x0F,
                command,
                ask: None,
                payload,
                checksum,
                reply: is_reply_code(command),
            },
        )
    }
}

fn is_reply_code(command: u8) -> bool {
    matches!(command, SINGLE_BOARD_REPLY_STATUS | SINGLE_BOARD_REPLY_UNLOCK)
}

impl LockProtocol for SingleBoard {
    const VARIANT: ProtocolVariant = ProtocolVariant::SingleBoard;

    fn encode_status_request(&self, address: u8) -> Result<Frame, AddressError> {
        Ok(self.build(address_byte(address, 0)?, SINGLE_BOARD_CMD_STATUS, None))
    }

    fn encode_unlock_request(&self, address: u8, lock_index: u8) -> Result<Frame, AddressError> {
        Ok(self.build(
            address_byte(address, lock_index)?,
            SINGLE_BOARD_CMD_UNLOCK,
            None,
        ))
    }

    fn encode_status_reply(
        &self,
        address: u8,
        locks: LockBitmap,
        _sensors: Option<SensorState>,
    ) -> Result<Frame, AddressError> {
        Ok(self.build(
            address_byte(address, 0)?,
            SINGLE_BOARD_REPLY_STATUS,
            Some(locks.to_le_bytes()),
        ))
    }

    fn encode_unlock_reply(&self, address: u8, lock_index: u8) -> Result<Frame, AddressError> {
        Ok(self.build(
            address_byte(address, lock_index)?,
            SINGLE_BOARD_REPLY_UNLOCK,
            None,
        ))
    }

    fn encode_unlock_refusal(
        &self,
        address: u8,
        lock_index: u8,
    ) -> Result<Option<Frame>, AddressError> {
        address_byte(address, lock_index)?;
        Ok(None)
    }

    fn decode(&self, raw: &[u8]) -> FrameResult<Frame> {
        let bytes = Bytes::copy_from_slice(raw);

        if raw.len() < SINGLE_BOARD_FRAME_LEN {
            return Err(FrameError::TooShort {
                needed: SINGLE_BOARD_FRAME_LEN,
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

        let command = raw[2];
        let expected = if command == SINGLE_BOARD_REPLY_STATUS {
            SINGLE_BOARD_STATUS_FRAME_LEN
        } else {
            SINGLE_BOARD_FRAME_LEN
        };
        if raw.len() < expected {
            return Err(FrameError::TooShort {
                needed: expected,
                raw: bytes,
            });
        }
        if raw.len() > expected {
            return Err(FrameError::UnexpectedLength {
                expected,
                raw: bytes,
            });
        }

        let computed = additive_checksum(&raw[..CHECKSUM_OFFSET])
            .wrapping_add(additive_checksum(&raw[SINGLE_BOARD_FRAME_LEN..]));
        let actual = raw[CHECKSUM_OFFSET];
        if computed != actual {
            return Err(FrameError::ChecksumMismatch {
                expected: computed,
                actual,
                raw: bytes,
            });
        }

        let payload = bytes.slice(SINGLE_BOARD_FRAME_LEN..);
        Ok(Frame::assemble(
            ProtocolVariant::SingleBoard,
            bytes,
            FrameParts {
                address: raw[1] >> 4,
                lock_index: raw[1] & 0x0F,
                command,
                ask: None,
                payload,
                checksum: actual,
                reply: is_reply_code(command),
            },
        ))
    }

    fn classify(&self, frame: &Frame) -> CommandKind {
        match frame.command() {
            SINGLE_BOARD_CMD_STATUS | SINGLE_BOARD_REPLY_STATUS => CommandKind::Status,
            SINGLE_BOARD_CMD_UNLOCK | SINGLE_BOARD_REPLY_UNLOCK => CommandKind::Unlock,
            other => CommandKind::Unknown(other),
        }
    }

    fn frame_len(&self, buffered: &[u8]) -> FrameLength {
        match buffered.get(2) {
            None => FrameLength::Incomplete,
            Some(&SINGLE_BOARD_REPLY_STATUS) => {
                FrameLength::Complete(SINGLE_BOARD_STATUS_FRAME_LEN)
            }
            Some(_) => FrameLength::Complete(SINGLE_BOARD_FRAME_LEN),
        }
    }

    fn is_refusal(&self, _frame: &Frame) -> bool {
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(0x00, 0, &[0x02, 0x00, 0x31, 0x03, 0x36])]
    #[case(0x00, 7, &[0x02, 0x07, 0x31, 0x03, 0x3D])]
    #[case(0x01, 15, &[0x02, 0x1F, 0x31, 0x03, 0x55])]
    fn test_unlock_request_bytes(#[case] address: u8, #[case] lock: u8, #[case] expected: &[u8]) {
        let frame = SingleBoard.encode_unlock_request(address, lock).unwrap();
        assert_eq!(frame.as_bytes(), expected);
        assert_eq!(frame.lock_index(), lock);
        assert_eq!(frame.address(), address);
        assert!(!frame.is_reply());
    }

    #[test]
    fn test_status_reply_slot_eight_open() {
        // S0 = 0x7F leaves bit 7 clear: slot 8 is open.
        let sum = [0x02u8, 0x00, 0x35, 0x03, 0x7F, 0xFF]
            .iter()
            .fold(0u8, |a, b| a.wrapping_add(*b));
        let raw = [0x02, 0x00, 0x35, 0x03, sum, 0x7F, 0xFF];

        let frame = SingleBoard.decode(&raw).unwrap();
        assert_eq!(SingleBoard.classify(&frame), CommandKind::Status);
        let bitmap = frame.lock_bitmap().unwrap();
        assert!(!bitmap.is_closed(7));
        assert!((0..15).filter(|b| *b != 7).all(|b| bitmap.is_closed(b)));
    }

    #[test]
    fn test_rejects_out_of_range_address() {
        assert!(matches!(
            SingleBoard.encode_status_request(0x10),
            Err(AddressError::DeviceAddressOutOfRange { .. })
        ));
        assert!(matches!(
            SingleBoard.encode_unlock_request(0, 16),
            Err(AddressError::LockIndexOutOfRange { .. })
        ));
    }

    #[test]
    fn test_decode_bad_checksum() {
        let result = SingleBoard.decode(&[0x02, 0x00, 0x30, 0x03, 0x36]);
        assert!(matches!(
            result,
            Err(FrameError::ChecksumMismatch {
                expected: 0x35,
                actual: 0x36,
                ..
            })
        ));
    }

    #[test]
    fn test_decode_missing_markers() {
        assert!(matches!(
            SingleBoard.decode(&[0x00, 0x00, 0x30, 0x03, 0x35]),
            Err(FrameError::MissingStart { .. })
        ));
        assert!(matches!(
            SingleBoard.decode(&[0x02, 0x00, 0x30, 0x04, 0x35]),
            Err(FrameError::MissingEnd { offset: 3, .. })
        ));
    }

    #[test]
    fn test_decode_truncated_status_reply() {
        let reply = SingleBoard
            .encode_status_reply(0, LockBitmap::ALL_CLOSED, None)
            .unwrap();
        let truncated = &reply.as_bytes()[..6];
        assert!(matches!(
            SingleBoard.decode(truncated),
            Err(FrameError::TooShort { needed: 7, .. })
        ));
    }

    #[test]
    fn test_decode_trailing_bytes() {
        let mut raw = SingleBoard.encode_status_request(0).unwrap().as_bytes().to_vec();
        raw.push(0x00);
        assert!(matches!(
            SingleBoard.decode(&raw),
            Err(FrameError::UnexpectedLength { expected: 5, .. })
        ));
    }

    #[test]
    fn test_unknown_command_retained() {
        let raw = [0x02, 0x00, 0x42, 0x03, 0x47];
        let frame = SingleBoard.decode(&raw).unwrap();
        assert_eq!(SingleBoard.classify(&frame), CommandKind::Unknown(0x42));
    }

    #[test]
    fn test_frame_len() {
        assert_eq!(SingleBoard.frame_len(&[0x02, 0x00]), FrameLength::Incomplete);
        assert_eq!(
            SingleBoard.frame_len(&[0x02, 0x00, 0x35]),
            FrameLength::Complete(7)
        );
        assert_eq!(
            SingleBoard.frame_len(&[0x02, 0x00, 0x36]),
            FrameLength::Complete(5)
        );
    }

    #[test]
    fn test_single_board_never_refuses() {
        let ack = SingleBoard.encode_unlock_reply(0, 3).unwrap();
        assert!(!SingleBoard.is_refusal(&ack));
        assert!(SingleBoard.encode_unlock_refusal(0, 3).unwrap().is_none());
    }
}
