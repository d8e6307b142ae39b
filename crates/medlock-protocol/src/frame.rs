//! Decoded wire frames shared by both protocol variants.
//!
//! A [`Frame`] is an immutable, validated view over the bytes of one packet. The
//! only ways to obtain one are the `encode_*` functions of a
//! [`LockProtocol`](crate::LockProtocol) implementation or a successful
//! [`decode`](crate::LockProtocol::decode); no other code path fabricates wire bytes.

use bytes::Bytes;
use std::fmt;

use medlock_core::ProtocolVariant;

/// What a frame asks for or answers, derived purely from its command byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CommandKind {
    /// Status request or status reply.
    Status,

    /// Unlock request or unlock reply.
    Unlock,

    /// A command byte this engine does not know. Kept so callers can log it.
    Unknown(u8),
}

impl fmt::Display for CommandKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Status => write!(f, "status"),
            Self::Unlock => write!(f, "unlock"),
            Self::Unknown(code) => write!(f, "unknown({code:#04x})"),
        }
    }
}

/// Closed/open state of up to 16 locks, one bit per lock (1 = closed).
///
/// The two status bytes travel little-endian: lock 0 is bit 0 of the first byte,
/// lock 8 is bit 0 of the second byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct LockBitmap(u16);

impl LockBitmap {
    pub const ALL_CLOSED: LockBitmap = LockBitmap(0xFFFF);

    pub fn new(bits: u16) -> Self {
        Self(bits)
    }

    /// Build a bitmap from status bytes; a single byte covers locks 0-7.
    pub fn from_le_slice(bytes: &[u8]) -> Self {
        let low = bytes.first().copied().unwrap_or(0);
        let high = bytes.get(1).copied().unwrap_or(0);
        Self(u16::from_le_bytes([low, high]))
    }

    pub fn bits(&self) -> u16 {
        self.0
    }

    pub fn to_le_bytes(&self) -> [u8; 2] {
        self.0.to_le_bytes()
    }

    /// Whether the lock at `bit` reports closed. Bits past 15 read as open.
    pub fn is_closed(&self, bit: u8) -> bool {
        bit < 16 && self.0 & (1 << bit) != 0
    }

    /// Return a copy with `bit` set to the given closed state.
    #[must_use]
    pub fn with(self, bit: u8, closed: bool) -> Self {
        if bit >= 16 {
            return self;
        }
        if closed {
            Self(self.0 | (1 << bit))
        } else {
            Self(self.0 & !(1 << bit))
        }
    }
}

/// Extended sensor section of a generalized multi-board status reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct SensorState {
    /// Hook (item present) sensors, one bit per lock.
    pub hooks: LockBitmap,

    /// Infrared (compartment clear) sensors, one bit per lock.
    pub infrared: LockBitmap,
}

/// One validated packet.
///
/// Field meaning per variant:
///
/// | Field | Variant A | Variant B |
/// |---|---|---|
/// | `address` | device address (upper nibble of ADDR) | board address |
/// | `lock_index` | lower nibble of ADDR | LOCK_INDEX byte |
/// | `ask` | `None` | ASK byte |
/// | `payload` | 2 status bytes on status replies | DATA section |
#[derive(Clone, PartialEq, Eq)]
pub struct Frame {
    variant: ProtocolVariant,
    raw: Bytes,
    address: u8,
    lock_index: u8,
    command: u8,
    ask: Option<u8>,
    payload: Bytes,
    checksum: u8,
    reply: bool,
}

/// Decoded fields handed to [`Frame::assemble`] by the variant codecs.
pub(crate) struct FrameParts {
    pub address: u8,
    pub lock_index: u8,
    pub command: u8,
    pub ask: Option<u8>,
    pub payload: Bytes,
    pub checksum: u8,
    pub reply: bool,
}

impl Frame {
    pub(crate) fn assemble(variant: ProtocolVariant, raw: Bytes, parts: FrameParts) -> Self {
        Self {
            variant,
            raw,
            address: parts.address,
            lock_index: parts.lock_index,
            command: parts.command,
            ask: parts.ask,
            payload: parts.payload,
            checksum: parts.checksum,
            reply: parts.reply,
        }
    }

    pub fn variant(&self) -> ProtocolVariant {
        self.variant
    }

    /// Complete wire bytes including markers and checksum.
    pub fn as_bytes(&self) -> &[u8] {
        &self.raw
    }

    /// Cheap clone of the wire bytes.
    pub fn to_bytes(&self) -> Bytes {
        self.raw.clone()
    }

    pub fn len(&self) -> usize {
        self.raw.len()
    }

    pub fn is_empty(&self) -> bool {
        self.raw.is_empty()
    }

    pub fn address(&self) -> u8 {
        self.address
    }

    pub fn lock_index(&self) -> u8 {
        self.lock_index
    }

    pub fn command(&self) -> u8 {
        self.command
    }

    pub fn ask(&self) -> Option<u8> {
        self.ask
    }

    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    pub fn checksum(&self) -> u8 {
        self.checksum
    }

    /// Whether this frame travels from the hardware to the host.
    pub fn is_reply(&self) -> bool {
        self.reply
    }

    /// Lock bitmap of a status reply.
    pub fn lock_bitmap(&self) -> Option<LockBitmap> {
        if !self.reply || self.payload.is_empty() {
            return None;
        }
        Some(LockBitmap::from_le_slice(&self.payload[..self.payload.len().min(2)]))
    }

    /// Hook and infrared sensors of an extended multi-board status reply.
    pub fn sensors(&self) -> Option<SensorState> {
        if self.payload.len() < 6 {
            return None;
        }
        Some(SensorState {
            hooks: LockBitmap::from_le_slice(&self.payload[2..4]),
            infrared: LockBitmap::from_le_slice(&self.payload[4..6]),
        })
    }
}

impl fmt::Debug for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Frame")
            .field("variant", &self.variant)
            .field("address", &format_args!("{:#04x}", self.address))
            .field("lock_index", &self.lock_index)
            .field("command", &format_args!("{:#04x}", self.command))
            .field("ask", &self.ask)
            .field("payload", &HexBytes(&self.payload))
            .field("reply", &self.reply)
            .finish()
    }
}

impl fmt::Display for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", HexBytes(&self.raw))
    }
}

/// Space separated upper-case hex, the way lock vendors print packets.
pub struct HexBytes<'a>(pub &'a [u8]);

impl fmt::Display for HexBytes<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, byte) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, " ")?;
            }
            write!(f, "{byte:02X}")?;
        }
        Ok(())
    }
}

impl fmt::Debug for HexBytes<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{self}]")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bitmap_little_endian() {
        let bitmap = LockBitmap::from_le_slice(&[0x7F, 0xFF]);
        assert!(!bitmap.is_closed(7));
        for bit in (0..16).filter(|b| *b != 7) {
            assert!(bitmap.is_closed(bit), "bit {bit} should be closed");
        }
    }

    #[test]
    fn test_bitmap_single_byte() {
        let bitmap = LockBitmap::from_le_slice(&[0x01]);
        assert!(bitmap.is_closed(0));
        assert!(!bitmap.is_closed(8));
    }

    #[test]
    fn test_bitmap_with() {
        let bitmap = LockBitmap::ALL_CLOSED.with(3, false);
        assert!(!bitmap.is_closed(3));
        assert!(bitmap.with(3, true).is_closed(3));
        assert_eq!(bitmap.with(20, false), bitmap);
        assert!(!bitmap.is_closed(20));
    }

    #[test]
    fn test_hex_display() {
        assert_eq!(HexBytes(&[0x02, 0x00, 0x30]).to_string(), "02 00 30");
    }

    #[test]
    fn test_command_kind_display() {
        assert_eq!(CommandKind::Unknown(0x42).to_string(), "unknown(0x42)");
        assert_eq!(CommandKind::Status.to_string(), "status");
    }
}
