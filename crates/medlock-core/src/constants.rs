//! Protocol-level constants for both lock controller variants.
//!
//! Two controller families are supported:
//!
//! | | Variant A (single board) | Variant B (multi board) |
//! |---|---|---|
//! | Locks per board | 16 | 12 |
//! | Boards | 1 | 2 |
//! | Command frame | 5 bytes | 8 bytes |
//! | Checksum | additive, low byte | XOR |
//!
//! Both families frame packets with the same start (`0x02`) and end (`0x03`) markers.
//!
//! ```
//! use medlock_core::constants::*;
//!
//! assert_eq!(START_BYTE, 0x02);
//! assert_eq!(SINGLE_BOARD_MAX_SLOTS, 16);
//! assert_eq!(MULTI_BOARD_MAX_SLOTS, LOCKS_PER_BOARD * BOARD_COUNT);
//! ```

// ============================================================================
// Framing
// ============================================================================

/// Start-of-frame marker shared by both variants.
pub const START_BYTE: u8 = 0x02;

/// End-of-frame marker shared by both variants.
pub const END_BYTE: u8 = 0x03;

// ============================================================================
// Variant A: single board, 16 locks
// ============================================================================

/// Length of every Variant A command frame and of the status reply header.
pub const SINGLE_BOARD_FRAME_LEN: usize = 5;

/// Number of status bytes appended to a Variant A status reply.
pub const SINGLE_BOARD_STATUS_LEN: usize = 2;

/// Total length of a Variant A status reply.
pub const SINGLE_BOARD_STATUS_FRAME_LEN: usize = SINGLE_BOARD_FRAME_LEN + SINGLE_BOARD_STATUS_LEN;

/// Variant A status request command.
pub const SINGLE_BOARD_CMD_STATUS: u8 = 0x30;

/// Variant A unlock request command.
pub const SINGLE_BOARD_CMD_UNLOCK: u8 = 0x31;

/// Variant A status reply command.
pub const SINGLE_BOARD_REPLY_STATUS: u8 = 0x35;

/// Variant A unlock reply command.
pub const SINGLE_BOARD_REPLY_UNLOCK: u8 = 0x36;

/// Highest device address that fits the upper nibble of the address byte.
pub const SINGLE_BOARD_MAX_DEVICE_ADDRESS: u8 = 0x0F;

/// Maximum slots addressable by a Variant A controller.
pub const SINGLE_BOARD_MAX_SLOTS: u8 = 16;

// ============================================================================
// Variant B: two boards, 12 locks each
// ============================================================================

/// Length of a Variant B frame without its data section.
pub const MULTI_BOARD_HEADER_LEN: usize = 8;

/// Variant B status request command.
pub const MULTI_BOARD_CMD_STATUS: u8 = 0x80;

/// Variant B unlock request command.
pub const MULTI_BOARD_CMD_UNLOCK: u8 = 0x81;

/// ASK value carried by requests.
pub const ASK_REQUEST: u8 = 0x00;

/// ASK value of a reply confirming the command.
pub const ASK_ACK: u8 = 0x10;

/// ASK value of a reply refusing the command.
pub const ASK_NAK: u8 = 0x11;

/// Largest data section a Variant B reply may declare.
///
/// The extended status form carries 2 lock bytes, 2 hook sensor bytes and
/// 2 infrared sensor bytes.
pub const MULTI_BOARD_MAX_DATA_LEN: usize = 6;

/// Locks driven by one Variant B board.
pub const LOCKS_PER_BOARD: u8 = 12;

/// Boards on a Variant B bus.
pub const BOARD_COUNT: u8 = 2;

/// Default board addresses of a Variant B bus.
pub const DEFAULT_BOARD_ADDRESSES: [u8; 2] = [0x00, 0x01];

/// Maximum slots addressable by a Variant B deployment.
pub const MULTI_BOARD_MAX_SLOTS: u8 = LOCKS_PER_BOARD * BOARD_COUNT;

// ============================================================================
// Slots
// ============================================================================

/// Smallest valid slot id.
pub const MIN_SLOT_ID: u8 = 1;

/// Largest slot id any deployment can use.
pub const MAX_SLOT_ID: u8 = MULTI_BOARD_MAX_SLOTS;

// ============================================================================
// Timing
// ============================================================================

/// Default per-command reply budget in milliseconds.
pub const DEFAULT_COMMAND_TIMEOUT_MS: u64 = 3000;

/// Default TCP connect budget in milliseconds.
pub const DEFAULT_CONNECT_TIMEOUT_MS: u64 = 3000;

/// Pause before the follow-up status recheck, letting the lock report a stable state.
pub const DEFAULT_SETTLE_DELAY_MS: u64 = 1000;

/// Default serial baud rate.
pub const DEFAULT_BAUD_RATE: u32 = 19200;
