//! Property-based tests for addressing and frame validation.

use proptest::prelude::*;
use std::collections::HashSet;

use medlock_core::SlotId;
use medlock_protocol::{
    AddressMapper, LockBitmap, LockProtocol, MultiBoard, SensorState, SingleBoard, StreamParser,
};

fn flip(raw: &[u8], index: usize, mask: u8) -> Vec<u8> {
    let mut corrupted = raw.to_vec();
    corrupted[index] ^= mask;
    corrupted
}

proptest! {
    /// Every slot maps to a distinct address and back to itself.
    #[test]
    fn prop_single_board_mapping_bijective(slot_count in 1u8..=16, device in 0u8..=0x0F) {
        let mapper = AddressMapper::single_board(slot_count, device).unwrap();
        let mut seen = HashSet::new();
        for slot in mapper.slots() {
            let address = mapper.to_address(slot).unwrap();
            prop_assert!(seen.insert(address));
            prop_assert_eq!(mapper.from_address(address).unwrap(), slot);
        }
        prop_assert_eq!(seen.len(), usize::from(slot_count));
    }

    #[test]
    fn prop_multi_board_mapping_bijective(slot_count in 1u8..=24, first in 0u8..=0x7F) {
        let boards = [first, first + 1];
        let mapper = AddressMapper::multi_board(slot_count, boards).unwrap();
        for slot in mapper.slots() {
            let address = mapper.to_address(slot).unwrap();
            prop_assert!(address.lock_index() < 12);
            prop_assert_eq!(
                mapper.slot_at(address.bus_address(), address.lock_index()).unwrap(),
                slot
            );
        }
    }

    /// Slots past the deployment never resolve to a lock.
    #[test]
    fn prop_slots_beyond_count_rejected(slot_count in 1u8..=23, extra in 1u8..=24) {
        let mapper = AddressMapper::multi_board(slot_count, [0, 1]).unwrap();
        if let Ok(slot) = SlotId::new(slot_count.saturating_add(extra).min(24)) {
            if slot.get() > slot_count {
                prop_assert!(mapper.to_address(slot).is_err());
            }
        }
    }

    #[test]
    fn prop_single_board_status_reply_decodes(bits in any::<u16>(), device in 0u8..=0x0F) {
        let frame = SingleBoard.encode_status_reply(device, LockBitmap::new(bits), None).unwrap();
        let decoded = SingleBoard.decode(frame.as_bytes()).unwrap();
        prop_assert_eq!(decoded.address(), device);
        prop_assert_eq!(decoded.lock_bitmap(), Some(LockBitmap::new(bits)));
    }

    #[test]
    fn prop_multi_board_status_reply_decodes(
        board in any::<u8>(),
        bits in any::<u16>(),
        hooks in any::<u16>(),
        infrared in any::<u16>(),
    ) {
        let sensors = SensorState {
            hooks: LockBitmap::new(hooks),
            infrared: LockBitmap::new(infrared),
        };
        let frame = MultiBoard
            .encode_status_reply(board, LockBitmap::new(bits), Some(sensors))
            .unwrap();
        let decoded = MultiBoard.decode(frame.as_bytes()).unwrap();
        prop_assert_eq!(decoded.address(), board);
        prop_assert_eq!(decoded.lock_bitmap(), Some(LockBitmap::new(bits)));
        prop_assert_eq!(decoded.sensors(), Some(sensors));
    }

    /// Any single corrupted byte is detected.
    #[test]
    fn prop_single_board_byte_flip_detected(
        bits in any::<u16>(),
        index in 0usize..7,
        mask in 1u8..=255,
    ) {
        let frame = SingleBoard.encode_status_reply(0, LockBitmap::new(bits), None).unwrap();
        let corrupted = flip(frame.as_bytes(), index, mask);
        prop_assert!(SingleBoard.decode(&corrupted).is_err());
    }

    #[test]
    fn prop_multi_board_byte_flip_detected(
        bits in any::<u16>(),
        index in 0usize..10,
        mask in 1u8..=255,
    ) {
        let frame = MultiBoard.encode_status_reply(1, LockBitmap::new(bits), None).unwrap();
        let corrupted = flip(frame.as_bytes(), index, mask);
        prop_assert!(MultiBoard.decode(&corrupted).is_err());
    }

    /// Chunk boundaries never change what the parser produces.
    #[test]
    fn prop_stream_parser_any_chunking(
        locks in prop::collection::vec(0u8..12, 1..8),
        chunk in 1usize..16,
    ) {
        let frames: Vec<_> = locks
            .iter()
            .map(|lock| MultiBoard.encode_unlock_reply(0, *lock).unwrap())
            .collect();
        let stream: Vec<u8> = frames.iter().flat_map(|f| f.as_bytes().to_vec()).collect();

        let mut parser = StreamParser::new(MultiBoard);
        let mut decoded = Vec::new();
        for piece in stream.chunks(chunk) {
            parser.feed(piece);
            while let Some(result) = parser.next_frame() {
                decoded.push(result.unwrap());
            }
        }
        prop_assert_eq!(decoded, frames);
    }
}
