//! Logical slot ↔ physical lock addressing.
//!
//! The mapping is pure and bijective over `1..=slot_count` for each variant:
//!
//! | Variant | Slot | Physical address |
//! |---|---|---|
//! | A | `n` | device address, bit `n - 1` |
//! | B | `1..=12` | first board, lock `n - 1` |
//! | B | `13..=24` | second board, lock `n - 13` |
//!
//! Slots outside the deployment are rejected, never wrapped onto another lock.
//!
//! ```
//! use medlock_core::{ProtocolVariant, SlotId};
//! use medlock_protocol::{AddressMapper, PhysicalAddress};
//!
//! let mapper = AddressMapper::multi_board(15, [0x00, 0x01]).unwrap();
//! let address = mapper.to_address(SlotId::new(13).unwrap()).unwrap();
//! assert_eq!(address, PhysicalAddress::Board { board: 1, address: 0x01, lock_index: 0 });
//! assert_eq!(mapper.from_address(address).unwrap().get(), 13);
//! ```

use serde::{Deserialize, Serialize};

use medlock_core::constants::{LOCKS_PER_BOARD, SINGLE_BOARD_MAX_DEVICE_ADDRESS};
use medlock_core::{ControllerConfig, ProtocolVariant, SlotId};

use crate::error::AddressError;

/// Where a slot lives on the bus.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PhysicalAddress {
    /// Variant A: one device, one bit per lock in the 16-bit status field.
    Device { address: u8, bit: u8 },

    /// Variant B: board index (0 or 1), its bus address, and the lock on it.
    Board { board: u8, address: u8, lock_index: u8 },
}

impl PhysicalAddress {
    /// Address byte placed on the wire for this lock's device or board.
    pub fn bus_address(&self) -> u8 {
        match self {
            Self::Device { address, .. } | Self::Board { address, .. } => *address,
        }
    }

    /// Lock index on the device or board, which is also its status bit.
    pub fn lock_index(&self) -> u8 {
        match self {
            Self::Device { bit, .. } => *bit,
            Self::Board { lock_index, .. } => *lock_index,
        }
    }
}

/// Converts between [`SlotId`] and [`PhysicalAddress`] for one deployment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddressMapper {
    variant: ProtocolVariant,
    slot_count: u8,
    device_address: u8,
    board_addresses: [u8; 2],
}

impl AddressMapper {
    /// Mapper for a single-board deployment.
    pub fn single_board(slot_count: u8, device_address: u8) -> Result<Self, AddressError> {
        if device_address > SINGLE_BOARD_MAX_DEVICE_ADDRESS {
            return Err(AddressError::DeviceAddressOutOfRange {
                address: device_address,
                max: SINGLE_BOARD_MAX_DEVICE_ADDRESS,
            });
        }
        Self::checked(ProtocolVariant::SingleBoard, slot_count, device_address, [0, 1])
    }

    /// Mapper for a two-board deployment.
    pub fn multi_board(slot_count: u8, board_addresses: [u8; 2]) -> Result<Self, AddressError> {
        if board_addresses[0] == board_addresses[1] {
            return Err(AddressError::UnknownBoard {
                address: board_addresses[1],
            });
        }
        Self::checked(ProtocolVariant::MultiBoard, slot_count, 0, board_addresses)
    }

    /// Mapper for the deployment described by `config`.
    pub fn from_config(config: &ControllerConfig) -> Result<Self, AddressError> {
        match config.protocol {
            ProtocolVariant::SingleBoard => {
                Self::single_board(config.slot_count, config.device_address)
            }
            ProtocolVariant::MultiBoard => {
                Self::multi_board(config.slot_count, config.board_addresses)
            }
        }
    }

    fn checked(
        variant: ProtocolVariant,
        slot_count: u8,
        device_address: u8,
        board_addresses: [u8; 2],
    ) -> Result<Self, AddressError> {
        let capacity = variant.max_slots();
        if slot_count == 0 || slot_count > capacity {
            return Err(AddressError::CapacityExceeded {
                slot_count,
                capacity,
            });
        }
        Ok(Self {
            variant,
            slot_count,
            device_address,
            board_addresses,
        })
    }

    pub fn variant(&self) -> ProtocolVariant {
        self.variant
    }

    pub fn slot_count(&self) -> u8 {
        self.slot_count
    }

    /// Every slot of the deployment in ascending order.
    pub fn slots(&self) -> impl Iterator<Item = SlotId> + use<> {
        (1..=self.slot_count).filter_map(|n| SlotId::new(n).ok())
    }

    fn check(&self, slot: SlotId) -> Result<u8, AddressError> {
        if slot.get() > self.slot_count {
            return Err(AddressError::InvalidSlot {
                slot: slot.get(),
                slot_count: self.slot_count,
            });
        }
        Ok(slot.get())
    }

    /// Physical address of `slot`.
    pub fn to_address(&self, slot: SlotId) -> Result<PhysicalAddress, AddressError> {
        let n = self.check(slot)?;
        Ok(match self.variant {
            ProtocolVariant::SingleBoard => PhysicalAddress::Device {
                address: self.device_address,
                bit: n - 1,
            },
            ProtocolVariant::MultiBoard if n <= LOCKS_PER_BOARD => PhysicalAddress::Board {
                board: 0,
                address: self.board_addresses[0],
                lock_index: n - 1,
            },
            ProtocolVariant::MultiBoard => PhysicalAddress::Board {
                board: 1,
                address: self.board_addresses[1],
                lock_index: n - 1 - LOCKS_PER_BOARD,
            },
        })
    }

    /// Slot at `address`; the exact inverse of [`to_address`](Self::to_address).
    pub fn from_address(&self, address: PhysicalAddress) -> Result<SlotId, AddressError> {
        let n = match (self.variant, address) {
            (ProtocolVariant::SingleBoard, PhysicalAddress::Device { address, bit }) => {
                if address != self.device_address {
                    return Err(AddressError::UnknownBoard { address });
                }
                u16::from(bit) + 1
            }
            (
                ProtocolVariant::MultiBoard,
                PhysicalAddress::Board {
                    board,
                    address,
                    lock_index,
                },
            ) => {
                if usize::from(board) >= self.board_addresses.len()
                    || self.board_addresses[usize::from(board)] != address
                {
                    return Err(AddressError::UnknownBoard { address });
                }
                if lock_index >= LOCKS_PER_BOARD {
                    return Err(AddressError::LockIndexOutOfRange {
                        lock_index,
                        max: LOCKS_PER_BOARD - 1,
                    });
                }
                u16::from(board) * u16::from(LOCKS_PER_BOARD) + u16::from(lock_index) + 1
            }
            (_, other) => {
                return Err(AddressError::UnknownBoard {
                    address: other.bus_address(),
                });
            }
        };

        if n > u16::from(self.slot_count) {
            return Err(AddressError::InvalidSlot {
                slot: n.min(u16::from(u8::MAX)) as u8,
                slot_count: self.slot_count,
            });
        }
        // n is within 1..=slot_count, so it fits a SlotId.
        SlotId::new(n as u8).map_err(|_| AddressError::InvalidSlot {
            slot: n as u8,
            slot_count: self.slot_count,
        })
    }

    /// Resolve a wire-level `(bus address, lock index)` pair to a slot.
    pub fn slot_at(&self, bus_address: u8, lock_index: u8) -> Result<SlotId, AddressError> {
        let address = match self.variant {
            ProtocolVariant::SingleBoard => PhysicalAddress::Device {
                address: bus_address,
                bit: lock_index,
            },
            ProtocolVariant::MultiBoard => PhysicalAddress::Board {
                board: self.board_index(bus_address)?,
                address: bus_address,
                lock_index,
            },
        };
        self.from_address(address)
    }

    fn board_index(&self, bus_address: u8) -> Result<u8, AddressError> {
        self.board_addresses
            .iter()
            .position(|a| *a == bus_address)
            .map(|i| i as u8)
            .ok_or(AddressError::UnknownBoard {
                address: bus_address,
            })
    }

    /// Bus addresses a full status check must query, in board order.
    ///
    /// One device for Variant A; for Variant B only boards that carry slots.
    pub fn status_targets(&self) -> Vec<u8> {
        match self.variant {
            ProtocolVariant::SingleBoard => vec![self.device_address],
            ProtocolVariant::MultiBoard if self.slot_count <= LOCKS_PER_BOARD => {
                vec![self.board_addresses[0]]
            }
            ProtocolVariant::MultiBoard => self.board_addresses.to_vec(),
        }
    }

    /// Slots reported by a status reply from `bus_address`, with their status bit.
    pub fn slots_on(&self, bus_address: u8) -> Vec<(SlotId, u8)> {
        self.slots()
            .filter_map(|slot| {
                let address = self.to_address(slot).ok()?;
                (address.bus_address() == bus_address).then_some((slot, address.lock_index()))
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn slot(n: u8) -> SlotId {
        SlotId::new(n).unwrap()
    }

    #[rstest]
    #[case(1, 0x00, 0)]
    #[case(12, 0x00, 11)]
    #[case(13, 0x01, 0)]
    #[case(24, 0x01, 11)]
    fn test_multi_board_mapping(#[case] n: u8, #[case] address: u8, #[case] lock: u8) {
        let mapper = AddressMapper::multi_board(24, [0x00, 0x01]).unwrap();
        let physical = mapper.to_address(slot(n)).unwrap();
        assert_eq!(physical.bus_address(), address);
        assert_eq!(physical.lock_index(), lock);
        assert_eq!(mapper.from_address(physical).unwrap(), slot(n));
    }

    #[test]
    fn test_single_board_mapping_all_slots() {
        let mapper = AddressMapper::single_board(15, 0x00).unwrap();
        for n in 1..=15 {
            let physical = mapper.to_address(slot(n)).unwrap();
            assert_eq!(
                physical,
                PhysicalAddress::Device {
                    address: 0x00,
                    bit: n - 1
                }
            );
            assert_eq!(mapper.from_address(physical).unwrap(), slot(n));
        }
    }

    #[test]
    fn test_out_of_range_slot_rejected() {
        let mapper = AddressMapper::single_board(15, 0x00).unwrap();
        assert_eq!(
            mapper.to_address(slot(16)),
            Err(AddressError::InvalidSlot {
                slot: 16,
                slot_count: 15
            })
        );
        let mapper = AddressMapper::multi_board(15, [0x00, 0x01]).unwrap();
        assert!(mapper.to_address(slot(16)).is_err());
        assert!(mapper.slot_at(0x01, 3).is_err());
        assert_eq!(mapper.slot_at(0x01, 2).unwrap(), slot(15));
    }

    #[test]
    fn test_unknown_board() {
        let mapper = AddressMapper::multi_board(24, [0x10, 0x20]).unwrap();
        assert_eq!(
            mapper.slot_at(0x30, 0),
            Err(AddressError::UnknownBoard { address: 0x30 })
        );
        assert_eq!(mapper.slot_at(0x20, 0).unwrap(), slot(13));
    }

    #[test]
    fn test_mismatched_board_index() {
        let mapper = AddressMapper::multi_board(24, [0x10, 0x20]).unwrap();
        let forged = PhysicalAddress::Board {
            board: 0,
            address: 0x20,
            lock_index: 0,
        };
        assert!(mapper.from_address(forged).is_err());
    }

    #[test]
    fn test_capacity() {
        assert!(AddressMapper::single_board(17, 0).is_err());
        assert!(AddressMapper::multi_board(25, [0, 1]).is_err());
        assert!(AddressMapper::multi_board(24, [1, 1]).is_err());
        assert!(AddressMapper::single_board(12, 0x10).is_err());
    }

    #[test]
    fn test_status_targets() {
        assert_eq!(
            AddressMapper::single_board(15, 0x03).unwrap().status_targets(),
            vec![0x03]
        );
        assert_eq!(
            AddressMapper::multi_board(12, [0, 1]).unwrap().status_targets(),
            vec![0]
        );
        assert_eq!(
            AddressMapper::multi_board(15, [0, 1]).unwrap().status_targets(),
            vec![0, 1]
        );
    }

    #[test]
    fn test_slots_on_board() {
        let mapper = AddressMapper::multi_board(15, [0, 1]).unwrap();
        let second = mapper.slots_on(1);
        assert_eq!(second, vec![(slot(13), 0), (slot(14), 1), (slot(15), 2)]);
        assert_eq!(mapper.slots_on(0).len(), 12);
        assert!(mapper.slots_on(7).is_empty());
    }
}
