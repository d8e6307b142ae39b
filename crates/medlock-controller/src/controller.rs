//! The public façade.
//!
//! [`LockController`] is the capability set the UI layer drives. [`Controller`]
//! implements it for one protocol variant; [`AnyController`] picks the variant
//! from configuration at start-up.
//!
//! ```no_run
//! use medlock_controller::{
//!     AnyController, ChannelEventSink, Collaborators, LockController, MemoryCredentials,
//!     MemorySlotStore,
//! };
//! use medlock_core::{ControllerConfig, SlotId};
//!
//! #[tokio::main]
//! async fn main() -> medlock_controller::Result<()> {
//!     let config = ControllerConfig::from_json_file("medlock.json")?;
//!     let (events, mut rx) = ChannelEventSink::new(64);
//!     let collaborators = Collaborators::new(
//!         MemorySlotStore::new(),
//!         MemoryCredentials::new().with("4821", "nurse-7", "Ward nurse"),
//!         events,
//!     );
//!
//!     let controller = AnyController::from_config(config, collaborators).await?;
//!     controller.open().await?;
//!     controller.send_unlock(SlotId::new(3)?, "HN-2231").await?;
//!
//!     while let Some(event) = rx.recv().await {
//!         println!("{event:?}");
//!     }
//!     Ok(())
//! }
//! ```

use std::future::Future;
use std::marker::PhantomData;

use tokio::sync::{mpsc, oneshot, watch};
use tracing::info;

use medlock_core::{ControllerConfig, ProtocolVariant, SlotId};
use medlock_protocol::{AddressMapper, LockProtocol, MultiBoard, SingleBoard};
use medlock_transport::{AnyTransport, Transport};

use crate::collaborators::{Collaborators, CredentialLookup, EventSink, SlotStore};
use crate::dispatcher;
use crate::engine::{Engine, EngineRequest, Timings};
use crate::error::{ControllerError, Result};
use crate::events::SlotSnapshot;
use crate::lifecycle::Lifecycle;

/// Pending façade calls the engine buffers before callers wait.
const REQUEST_CHANNEL_CAPACITY: usize = 32;

/// Operations the UI layer may invoke.
///
/// Calls resolve when the engine has handled them: `send_unlock` and `dispense`
/// resolve once the hardware acknowledged (or refused) the unlock, not when the
/// door is shut again. Completion of the lifecycle arrives as a
/// [`ControllerEvent::SlotClosed`](crate::ControllerEvent::SlotClosed) event.
pub trait LockController: Send + Sync {
    /// Open the hardware link.
    fn open(&self) -> impl Future<Output = Result<()>> + Send;

    /// Close the link; queued commands are cancelled and reconnection stops.
    fn close(&self) -> impl Future<Output = Result<()>> + Send;

    fn is_connected(&self) -> bool;

    /// Query every board and return the reconciled slot view.
    fn send_check_state(&self) -> impl Future<Output = Result<Vec<SlotSnapshot>>> + Send;

    /// Unlock an idle slot so `content_id` can be loaded.
    fn send_unlock(
        &self,
        slot: SlotId,
        content_id: &str,
    ) -> impl Future<Output = Result<()>> + Send;

    /// Unlock an occupied slot for removal, after checking `credential`.
    fn dispense(&self, slot: SlotId, credential: &str) -> impl Future<Output = Result<()>> + Send;

    /// Abort whatever the slot is doing and return it to idle.
    fn reset_slot(&self, slot: SlotId) -> impl Future<Output = Result<()>> + Send;

    fn deactivate(&self, slot: SlotId, credential: &str) -> impl Future<Output = Result<()>> + Send;

    fn reactivate(&self, slot: SlotId) -> impl Future<Output = Result<()>> + Send;

    /// Deactivate every slot; returns how many changed.
    fn deactivate_all(&self, credential: &str) -> impl Future<Output = Result<usize>> + Send;

    /// Reactivate every slot; returns how many changed.
    fn reactivate_all(&self) -> impl Future<Output = Result<usize>> + Send;

    /// Current view of every slot, without touching the hardware.
    fn slots(&self) -> impl Future<Output = Result<Vec<SlotSnapshot>>> + Send;
}

/// Controller for one protocol variant. Clones drive the same engine.
#[derive(Debug)]
pub struct Controller<P: LockProtocol> {
    requests: mpsc::Sender<EngineRequest>,
    connected: watch::Receiver<bool>,
    _protocol: PhantomData<P>,
}

impl<P: LockProtocol> Clone for Controller<P> {
    fn clone(&self) -> Self {
        Self {
            requests: self.requests.clone(),
            connected: self.connected.clone(),
            _protocol: PhantomData,
        }
    }
}

/// Controller for Variant A hardware.
pub type SingleBoardController = Controller<SingleBoard>;

/// Controller for Variant B hardware.
pub type MultiBoardController = Controller<MultiBoard>;

impl<P: LockProtocol> Controller<P> {
    /// Validate `config`, restore slot state from the store and start the engine.
    ///
    /// The link stays closed until [`LockController::open`] is called.
    ///
    /// # Errors
    /// Fails on an invalid configuration, a configuration for another protocol
    /// variant, or a store that cannot be read.
    pub async fn start<T, S, C, E>(
        config: ControllerConfig,
        transport: T,
        collaborators: Collaborators<S, C, E>,
    ) -> Result<Self>
    where
        T: Transport,
        S: SlotStore,
        C: CredentialLookup,
        E: EventSink,
    {
        config.validate()?;
        if config.protocol != P::VARIANT {
            return Err(medlock_core::Error::Config(format!(
                "configuration is for {}, controller speaks {}",
                config.protocol,
                P::VARIANT
            ))
            .into());
        }
        let mapper = AddressMapper::from_config(&config)
            .map_err(|e| medlock_core::Error::Config(e.to_string()))?;

        let records = collaborators
            .store
            .load_slots()
            .await
            .map_err(|e| ControllerError::Store(e.to_string()))?;
        let lifecycle = Lifecycle::new(mapper.slots(), records);

        let protocol = P::default();
        let (link_tx, link_rx) = mpsc::unbounded_channel();
        let (dispatcher, _) =
            dispatcher::spawn(protocol, transport, config.reconnect_interval(), link_tx);
        let connected = dispatcher.connected();

        let engine = Engine::new(
            protocol,
            Timings::from(&config),
            mapper,
            lifecycle,
            dispatcher,
            collaborators,
        );
        let (requests, requests_rx) = mpsc::channel(REQUEST_CHANNEL_CAPACITY);
        tokio::spawn(engine.run(requests_rx, link_rx));

        info!(
            variant = %P::VARIANT,
            link = %config.link.describe(),
            slots = config.slot_count,
            "Lock controller started"
        );
        Ok(Self {
            requests,
            connected,
            _protocol: PhantomData,
        })
    }

    async fn call<R>(
        &self,
        request: impl FnOnce(oneshot::Sender<R>) -> EngineRequest,
    ) -> Result<R> {
        let (tx, rx) = oneshot::channel();
        self.requests
            .send(request(tx))
            .await
            .map_err(|_| ControllerError::EngineStopped)?;
        rx.await.map_err(|_| ControllerError::EngineStopped)
    }
}

impl<P: LockProtocol> LockController for Controller<P> {
    async fn open(&self) -> Result<()> {
        self.call(EngineRequest::Open).await?
    }

    async fn close(&self) -> Result<()> {
        self.call(EngineRequest::Close).await
    }

    fn is_connected(&self) -> bool {
        *self.connected.borrow()
    }

    async fn send_check_state(&self) -> Result<Vec<SlotSnapshot>> {
        self.call(EngineRequest::CheckState).await?
    }

    async fn send_unlock(&self, slot: SlotId, content_id: &str) -> Result<()> {
        let content_id = content_id.to_string();
        self.call(|reply| EngineRequest::Unlock {
            slot,
            content_id,
            reply,
        })
        .await?
    }

    async fn dispense(&self, slot: SlotId, credential: &str) -> Result<()> {
        let credential = credential.to_string();
        self.call(|reply| EngineRequest::Dispense {
            slot,
            credential,
            reply,
        })
        .await?
    }

    async fn reset_slot(&self, slot: SlotId) -> Result<()> {
        self.call(|reply| EngineRequest::ResetSlot { slot, reply })
            .await?
    }

    async fn deactivate(&self, slot: SlotId, credential: &str) -> Result<()> {
        let credential = credential.to_string();
        self.call(|reply| EngineRequest::Deactivate {
            slot,
            credential,
            reply,
        })
        .await?
    }

    async fn reactivate(&self, slot: SlotId) -> Result<()> {
        self.call(|reply| EngineRequest::Reactivate { slot, reply })
            .await?
    }

    async fn deactivate_all(&self, credential: &str) -> Result<usize> {
        let credential = credential.to_string();
        self.call(|reply| EngineRequest::DeactivateAll { credential, reply })
            .await?
    }

    async fn reactivate_all(&self) -> Result<usize> {
        self.call(EngineRequest::ReactivateAll).await?
    }

    async fn slots(&self) -> Result<Vec<SlotSnapshot>> {
        self.call(EngineRequest::Slots).await
    }
}

/// Controller whose protocol variant is chosen at runtime.
#[derive(Debug, Clone)]
pub enum AnyController {
    SingleBoard(SingleBoardController),
    MultiBoard(MultiBoardController),
}

impl AnyController {
    /// Start the controller matching `config.protocol` over `transport`.
    pub async fn start<T, S, C, E>(
        config: ControllerConfig,
        transport: T,
        collaborators: Collaborators<S, C, E>,
    ) -> Result<Self>
    where
        T: Transport,
        S: SlotStore,
        C: CredentialLookup,
        E: EventSink,
    {
        match config.protocol {
            ProtocolVariant::SingleBoard => {
                SingleBoardController::start(config, transport, collaborators)
                    .await
                    .map(Self::SingleBoard)
            }
            ProtocolVariant::MultiBoard => {
                MultiBoardController::start(config, transport, collaborators)
                    .await
                    .map(Self::MultiBoard)
            }
        }
    }

    /// Start a controller over the link described by `config.link`.
    pub async fn from_config<S, C, E>(
        config: ControllerConfig,
        collaborators: Collaborators<S, C, E>,
    ) -> Result<Self>
    where
        S: SlotStore,
        C: CredentialLookup,
        E: EventSink,
    {
        config.validate()?;
        let transport = AnyTransport::from_config(&config.link, config.connect_timeout())?;
        Self::start(config, transport, collaborators).await
    }

    pub fn variant(&self) -> ProtocolVariant {
        match self {
            Self::SingleBoard(_) => ProtocolVariant::SingleBoard,
            Self::MultiBoard(_) => ProtocolVariant::MultiBoard,
        }
    }
}

impl LockController for AnyController {
    async fn open(&self) -> Result<()> {
        match self {
            Self::SingleBoard(c) => c.open().await,
            Self::MultiBoard(c) => c.open().await,
        }
    }

    async fn close(&self) -> Result<()> {
        match self {
            Self::SingleBoard(c) => c.close().await,
            Self::MultiBoard(c) => c.close().await,
        }
    }

    fn is_connected(&self) -> bool {
        match self {
            Self::SingleBoard(c) => c.is_connected(),
            Self::MultiBoard(c) => c.is_connected(),
        }
    }

    async fn send_check_state(&self) -> Result<Vec<SlotSnapshot>> {
        match self {
            Self::SingleBoard(c) => c.send_check_state().await,
            Self::MultiBoard(c) => c.send_check_state().await,
        }
    }

    async fn send_unlock(&self, slot: SlotId, content_id: &str) -> Result<()> {
        match self {
            Self::SingleBoard(c) => c.send_unlock(slot, content_id).await,
            Self::MultiBoard(c) => c.send_unlock(slot, content_id).await,
        }
    }

    async fn dispense(&self, slot: SlotId, credential: &str) -> Result<()> {
        match self {
            Self::SingleBoard(c) => c.dispense(slot, credential).await,
            Self::MultiBoard(c) => c.dispense(slot, credential).await,
        }
    }

    async fn reset_slot(&self, slot: SlotId) -> Result<()> {
        match self {
            Self::SingleBoard(c) => c.reset_slot(slot).await,
            Self::MultiBoard(c) => c.reset_slot(slot).await,
        }
    }

    async fn deactivate(&self, slot: SlotId, credential: &str) -> Result<()> {
        match self {
            Self::SingleBoard(c) => c.deactivate(slot, credential).await,
            Self::MultiBoard(c) => c.deactivate(slot, credential).await,
        }
    }

    async fn reactivate(&self, slot: SlotId) -> Result<()> {
        match self {
            Self::SingleBoard(c) => c.reactivate(slot).await,
            Self::MultiBoard(c) => c.reactivate(slot).await,
        }
    }

    async fn deactivate_all(&self, credential: &str) -> Result<usize> {
        match self {
            Self::SingleBoard(c) => c.deactivate_all(credential).await,
            Self::MultiBoard(c) => c.deactivate_all(credential).await,
        }
    }

    async fn reactivate_all(&self) -> Result<usize> {
        match self {
            Self::SingleBoard(c) => c.reactivate_all().await,
            Self::MultiBoard(c) => c.reactivate_all().await,
        }
    }

    async fn slots(&self) -> Result<Vec<SlotSnapshot>> {
        match self {
            Self::SingleBoard(c) => c.slots().await,
            Self::MultiBoard(c) => c.slots().await,
        }
    }
}
