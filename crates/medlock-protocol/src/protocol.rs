//! The capability every protocol variant implements.

use std::fmt;

use medlock_core::ProtocolVariant;

use crate::error::{AddressError, FrameResult};
use crate::frame::{CommandKind, Frame, LockBitmap, SensorState};

/// How much of a buffer the frame starting at its head occupies.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameLength {
    /// Not enough bytes yet to know.
    Incomplete,

    /// The frame spans this many bytes (which may not all be buffered yet).
    Complete(usize),
}

/// Packet codec for one lock controller protocol variant.
///
/// Implementations are zero-sized and `Copy`; the engine is generic over the
/// variant and picks one at start-up. Both variants expose the same operations so
/// nothing above the codec needs to know which wire format is in use.
///
/// Host-side encoders (`encode_status_request`, `encode_unlock_request`) are what the
/// engine sends. Device-side encoders (`encode_*_reply`) exist for the board
/// simulator and tests.
pub trait LockProtocol: fmt::Debug + Clone + Copy + Default + Send + Sync + 'static {
    /// Variant tag used in configuration and logs.
    const VARIANT: ProtocolVariant;

    /// Status request for one device or board.
    fn encode_status_request(&self, address: u8) -> Result<Frame, AddressError>;

    /// Unlock request for one lock.
    fn encode_unlock_request(&self, address: u8, lock_index: u8) -> Result<Frame, AddressError>;

    /// Status reply as the hardware would send it.
    fn encode_status_reply(
        &self,
        address: u8,
        locks: LockBitmap,
        sensors: Option<SensorState>,
    ) -> Result<Frame, AddressError>;

    /// Unlock acknowledgement as the hardware would send it.
    fn encode_unlock_reply(&self, address: u8, lock_index: u8) -> Result<Frame, AddressError>;

    /// Unlock refusal, for variants that have one. `None` means the hardware
    /// signals refusal by staying silent.
    fn encode_unlock_refusal(
        &self,
        address: u8,
        lock_index: u8,
    ) -> Result<Option<Frame>, AddressError>;

    /// Validate raw bytes and decode them into a frame.
    fn decode(&self, raw: &[u8]) -> FrameResult<Frame>;

    /// Classify a frame purely from its command byte.
    fn classify(&self, frame: &Frame) -> CommandKind;

    /// Length of the frame that begins at `buffered[0]` (a start marker).
    fn frame_len(&self, buffered: &[u8]) -> FrameLength;

    /// Whether a reply tells the host the command was refused.
    fn is_refusal(&self, frame: &Frame) -> bool;
}
