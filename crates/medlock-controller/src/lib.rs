//! Lock controller engine for medication cabinets.
//!
//! The crate ties the wire codecs and transports together:
//!
//! - [`dispatcher`] keeps exactly one command on the wire and matches replies.
//! - [`lifecycle`] tracks each slot through loading, dispensing and lock-back.
//! - [`controller`] is the façade the UI drives, with the persistence, credential
//!   and event seams in [`collaborators`].
//!
//! ```no_run
//! use medlock_controller::{
//!     Collaborators, LockController, MemoryCredentials, MemorySlotStore, NullEventSink,
//!     SingleBoardController,
//! };
//! use medlock_core::{ControllerConfig, LinkConfig, ProtocolVariant};
//! use medlock_transport::TcpTransport;
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() -> medlock_controller::Result<()> {
//!     let link = LinkConfig::Tcp { host: "10.0.0.20".into(), port: 4001 };
//!     let config = ControllerConfig::new(ProtocolVariant::SingleBoard, link, 15);
//!     let transport = TcpTransport::new("10.0.0.20", 4001, Duration::from_secs(3));
//!     let collaborators =
//!         Collaborators::new(MemorySlotStore::new(), MemoryCredentials::new(), NullEventSink);
//!
//!     let controller = SingleBoardController::start(config, transport, collaborators).await?;
//!     controller.open().await?;
//!     for slot in controller.send_check_state().await? {
//!         println!("{} {} closed={:?}", slot.slot, slot.state, slot.closed);
//!     }
//!     Ok(())
//! }
//! ```

pub mod collaborators;
pub mod controller;
pub mod dispatcher;
mod engine;
pub mod error;
pub mod events;
pub mod lifecycle;

pub use collaborators::{
    ChannelEventSink, Collaborators, CredentialLookup, EventSink, Identity, MemoryCredentials,
    MemorySlotStore, NullEventSink, SlotRecord, SlotStore, StoreError,
};
pub use controller::{
    AnyController, Controller, LockController, MultiBoardController, SingleBoardController,
};
pub use dispatcher::{Command, CommandPhase, DispatcherHandle, LinkEvent, PendingReply};
pub use error::{ControllerError, DispatchError, ErrorKind, Result};
pub use events::{ControllerEvent, SlotSnapshot};
pub use lifecycle::{ActiveLifecycle, Lifecycle, LifecycleKind, SlotState, SlotTransition};
