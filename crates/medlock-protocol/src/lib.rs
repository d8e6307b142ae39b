pub mod address;
pub mod codec;
pub mod error;
pub mod frame;
pub mod multi_board;
pub mod protocol;
pub mod simulator;
pub mod single_board;
pub mod stream_parser;

pub use address::{AddressMapper, PhysicalAddress};
pub use codec::LockCodec;
pub use error::{AddressError, FrameError, FrameResult};
pub use frame::{CommandKind, Frame, HexBytes, LockBitmap, SensorState};
pub use multi_board::MultiBoard;
pub use protocol::{FrameLength, LockProtocol};
pub use simulator::BoardSimulator;
pub use single_board::SingleBoard;
pub use stream_parser::StreamParser;
