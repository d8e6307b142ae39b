//! Codec and addressing errors.
//!
//! Decode failures never escape as panics. Each [`FrameError`] keeps the raw bytes
//! that produced it so the caller can log them before dropping the frame or asking
//! for a resend.

use bytes::Bytes;
use thiserror::Error;

use crate::frame::HexBytes;

/// A byte sequence that is not a valid frame.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FrameError {
    /// Fewer bytes than the smallest frame of this shape.
    #[error("frame too short: need {needed} bytes, got {} [{}]", raw.len(), HexBytes(raw))]
    TooShort { needed: usize, raw: Bytes },

    /// First byte is not the start marker.
    #[error("missing start marker [{}]", HexBytes(raw))]
    MissingStart { raw: Bytes },

    /// End marker absent at the offset the frame layout requires.
    #[error("missing end marker at offset {offset} [{}]", HexBytes(raw))]
    MissingEnd { offset: usize, raw: Bytes },

    /// Recomputed checksum differs from the trailer.
    #[error("checksum mismatch: expected {expected:#04x}, got {actual:#04x} [{}]", HexBytes(raw))]
    ChecksumMismatch { expected: u8, actual: u8, raw: Bytes },

    /// Declared data length exceeds what the frame carries or the protocol allows.
    #[error("declared payload of {declared} bytes, {available} available [{}]", HexBytes(raw))]
    PayloadOverrun {
        declared: usize,
        available: usize,
        raw: Bytes,
    },

    /// Frame is longer than its layout allows.
    #[error("expected {expected} bytes, got {} [{}]", raw.len(), HexBytes(raw))]
    UnexpectedLength { expected: usize, raw: Bytes },
}

impl FrameError {
    /// The offending bytes, for diagnostics.
    pub fn raw(&self) -> &[u8] {
        match self {
            Self::TooShort { raw, .. }
            | Self::MissingStart { raw }
            | Self::MissingEnd { raw, .. }
            | Self::ChecksumMismatch { raw, .. }
            | Self::PayloadOverrun { raw, .. }
            | Self::UnexpectedLength { raw, .. } => raw,
        }
    }

    /// Whether the bytes probably did not start on a frame boundary.
    ///
    /// A stream parser drops only the first byte of a misaligned candidate and
    /// rescans, but drops a whole well-delimited frame with a bad checksum.
    pub fn is_misaligned(&self) -> bool {
        matches!(
            self,
            Self::MissingStart { .. } | Self::MissingEnd { .. } | Self::PayloadOverrun { .. }
        )
    }
}

/// Slot or hardware address outside the deployment's addressing space.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum AddressError {
    /// Slot id outside `1..=slot_count`.
    #[error("slot {slot} is outside 1-{slot_count}")]
    InvalidSlot { slot: u8, slot_count: u8 },

    /// Bus address that matches no configured board.
    #[error("no board at address {address:#04x}")]
    UnknownBoard { address: u8 },

    /// Lock index beyond the locks of one board.
    #[error("lock index {lock_index} exceeds maximum {max}")]
    LockIndexOutOfRange { lock_index: u8, max: u8 },

    /// Device address that does not fit the protocol's address field.
    #[error("device address {address:#04x} exceeds maximum {max:#04x}")]
    DeviceAddressOutOfRange { address: u8, max: u8 },

    /// Slot count beyond what the variant can address.
    #[error("slot count {slot_count} exceeds capacity {capacity}")]
    CapacityExceeded { slot_count: u8, capacity: u8 },
}

pub type FrameResult<T> = std::result::Result<T, FrameError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_error_keeps_raw_bytes() {
        let error = FrameError::ChecksumMismatch {
            expected: 0x35,
            actual: 0x36,
            raw: Bytes::from_static(&[0x02, 0x00, 0x30, 0x03, 0x36]),
        };
        assert_eq!(error.raw(), &[0x02, 0x00, 0x30, 0x03, 0x36]);
        assert_eq!(
            error.to_string(),
            "checksum mismatch: expected 0x35, got 0x36 [02 00 30 03 36]"
        );
        assert!(!error.is_misaligned());
    }

    #[test]
    fn test_misaligned_classification() {
        let error = FrameError::MissingEnd {
            offset: 3,
            raw: Bytes::from_static(&[0x02, 0x00, 0x30, 0x00, 0x00]),
        };
        assert!(error.is_misaligned());
    }

    #[test]
    fn test_address_error_display() {
        let error = AddressError::InvalidSlot {
            slot: 16,
            slot_count: 15,
        };
        assert_eq!(error.to_string(), "slot 16 is outside 1-15");
    }
}
