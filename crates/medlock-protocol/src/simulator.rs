//! In-process stand-in for lock boards.
//!
//! The simulator answers host frames the way the hardware does, which lets the
//! engine be exercised end to end without a serial port. The CLI `simulate` command
//! serves it over TCP and the controller tests drive it through a mock transport.

use tracing::{debug, trace};

use medlock_core::ProtocolVariant;
use medlock_core::constants::{LOCKS_PER_BOARD, SINGLE_BOARD_MAX_SLOTS};

use crate::address::AddressMapper;
use crate::frame::{CommandKind, Frame, LockBitmap};
use crate::protocol::LockProtocol;

#[derive(Debug, Clone)]
struct SimulatedBoard {
    address: u8,
    lock_count: u8,
    closed: LockBitmap,
}

impl SimulatedBoard {
    fn new(address: u8, lock_count: u8) -> Self {
        let closed = (0..lock_count).fold(LockBitmap::new(0), |bits, i| bits.with(i, true));
        Self {
            address,
            lock_count,
            closed,
        }
    }
}

/// Lock boards that remember which locks are open.
#[derive(Debug, Clone)]
pub struct BoardSimulator<P: LockProtocol> {
    protocol: P,
    boards: Vec<SimulatedBoard>,
    refuse_unlocks: bool,
    silent: bool,
}

impl<P: LockProtocol> BoardSimulator<P> {
    /// Simulator with no boards attached.
    pub fn new(protocol: P) -> Self {
        Self {
            protocol,
            boards: Vec::new(),
            refuse_unlocks: false,
            silent: false,
        }
    }

    /// Simulator with every board the mapper's deployment queries, all locks closed.
    pub fn for_deployment(protocol: P, mapper: &AddressMapper) -> Self {
        let lock_count = match P::VARIANT {
            ProtocolVariant::SingleBoard => SINGLE_BOARD_MAX_SLOTS,
            ProtocolVariant::MultiBoard => LOCKS_PER_BOARD,
        };
        mapper
            .status_targets()
            .into_iter()
            .fold(Self::new(protocol), |sim, address| {
                sim.with_board(address, lock_count)
            })
    }

    #[must_use]
    pub fn with_board(mut self, address: u8, lock_count: u8) -> Self {
        self.boards.push(SimulatedBoard::new(address, lock_count));
        self
    }

    /// Refuse unlock requests (NAK on variants that have one, silence otherwise).
    pub fn set_refuse_unlocks(&mut self, refuse: bool) {
        self.refuse_unlocks = refuse;
    }

    /// Stop answering anything, as a powered-off board would.
    pub fn set_silent(&mut self, silent: bool) {
        self.silent = silent;
    }

    /// Close one lock, as a user pushing the door shut.
    pub fn close_lock(&mut self, address: u8, lock_index: u8) {
        if let Some(board) = self.board_mut(address) {
            board.closed = board.closed.with(lock_index, true);
        }
    }

    /// Open one lock without a command, as a forced door.
    pub fn open_lock(&mut self, address: u8, lock_index: u8) {
        if let Some(board) = self.board_mut(address) {
            board.closed = board.closed.with(lock_index, false);
        }
    }

    pub fn close_all(&mut self) {
        for board in &mut self.boards {
            *board = SimulatedBoard::new(board.address, board.lock_count);
        }
    }

    pub fn is_open(&self, address: u8, lock_index: u8) -> bool {
        self.boards
            .iter()
            .find(|b| b.address == address)
            .is_some_and(|b| lock_index < b.lock_count && !b.closed.is_closed(lock_index))
    }

    /// Current bitmap of a board.
    pub fn bitmap(&self, address: u8) -> Option<LockBitmap> {
        self.boards
            .iter()
            .find(|b| b.address == address)
            .map(|b| b.closed)
    }

    fn board_mut(&mut self, address: u8) -> Option<&mut SimulatedBoard> {
        self.boards.iter_mut().find(|b| b.address == address)
    }

    /// Reply the hardware would give to `request`, if any.
    pub fn respond(&mut self, request: &Frame) -> Option<Frame> {
        if self.silent || request.is_reply() {
            return None;
        }
        let protocol = self.protocol;
        let refuse = self.refuse_unlocks;
        let address = request.address();
        let Some(board) = self.board_mut(address) else {
            trace!(address, "No simulated board at address");
            return None;
        };

        match protocol.classify(request) {
            CommandKind::Status => protocol
                .encode_status_reply(address, board.closed, None)
                .ok(),
            CommandKind::Unlock => {
                let lock_index = request.lock_index();
                if lock_index >= board.lock_count {
                    return None;
                }
                if refuse {
                    debug!(address, lock_index, "Simulated board refusing unlock");
                    return protocol
                        .encode_unlock_refusal(address, lock_index)
                        .ok()
                        .flatten();
                }
                board.closed = board.closed.with(lock_index, false);
                debug!(address, lock_index, "Simulated lock opened");
                protocol.encode_unlock_reply(address, lock_index).ok()
            }
            CommandKind::Unknown(code) => {
                trace!(address, code, "Simulated board ignoring unknown command");
                None
            }
        }
    }
}
