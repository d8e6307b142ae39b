use crate::{
    Result,
    constants::{MAX_SLOT_ID, MIN_SLOT_ID, MULTI_BOARD_MAX_SLOTS, SINGLE_BOARD_MAX_SLOTS},
    error::Error,
};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Logical slot identifier (1-based).
///
/// A `SlotId` is stable for the lifetime of a deployment and independent of the
/// protocol used to reach the physical lock. Whether a given id exists in a
/// deployment is decided by the address mapper, which knows the slot count.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub struct SlotId(u8);

impl SlotId {
    /// Create a new slot id with validation.
    ///
    /// # Errors
    /// Returns `Error::InvalidSlotId` if the id is outside `1..=24`.
    pub fn new(id: u8) -> Result<Self> {
        if !(MIN_SLOT_ID..=MAX_SLOT_ID).contains(&id) {
            return Err(Error::InvalidSlotId(format!(
                "slot id must be {MIN_SLOT_ID}-{MAX_SLOT_ID}, got {id}"
            )));
        }
        Ok(SlotId(id))
    }

    /// Get the raw slot number.
    #[must_use]
    pub fn get(&self) -> u8 {
        self.0
    }

    /// Zero-based index of this slot.
    #[must_use]
    pub fn index(&self) -> usize {
        usize::from(self.0 - 1)
    }
}

impl fmt::Display for SlotId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl TryFrom<u8> for SlotId {
    type Error = Error;

    fn try_from(value: u8) -> Result<Self> {
        SlotId::new(value)
    }
}

impl From<SlotId> for u8 {
    fn from(id: SlotId) -> u8 {
        id.0
    }
}

impl std::str::FromStr for SlotId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let id: u8 = s
            .trim()
            .parse()
            .map_err(|_| Error::InvalidSlotId(format!("not a slot number: {s}")))?;
        SlotId::new(id)
    }
}

/// Wire protocol spoken by the lock controller hardware.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProtocolVariant {
    /// One board driving up to 16 locks (KU16 style, additive checksum).
    SingleBoard,

    /// Two boards driving up to 12 locks each (XOR checksum).
    MultiBoard,
}

impl ProtocolVariant {
    /// Largest slot count a deployment of this variant can declare.
    #[must_use]
    pub fn max_slots(&self) -> u8 {
        match self {
            Self::SingleBoard => SINGLE_BOARD_MAX_SLOTS,
            Self::MultiBoard => MULTI_BOARD_MAX_SLOTS,
        }
    }
}

impl fmt::Display for ProtocolVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SingleBoard => write!(f, "single_board"),
            Self::MultiBoard => write!(f, "multi_board"),
        }
    }
}

impl std::str::FromStr for ProtocolVariant {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "single_board" | "single-board" | "ku16" | "a" => Ok(Self::SingleBoard),
            "multi_board" | "multi-board" | "b" => Ok(Self::MultiBoard),
            other => Err(Error::InvalidProtocol(other.to_string())),
        }
    }
}
