//! The controller actor.
//!
//! One task owns the slot lifecycle and talks to the dispatcher. Façade calls
//! arrive as [`EngineRequest`]s; replies from the dispatcher come back as
//! internal messages from short-lived waiter tasks, so the actor never blocks on
//! the wire while holding slot state.

use std::time::Duration;

use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, info, warn};

use medlock_core::{ControllerConfig, SlotId};
use medlock_protocol::{AddressMapper, CommandKind, Frame, LockProtocol};

use crate::collaborators::{Collaborators, CredentialLookup, EventSink, SlotStore};
use crate::dispatcher::{Command, CommandPhase, DispatcherHandle, LinkEvent, PendingReply};
use crate::error::{ControllerError, DispatchError, ErrorKind, Result};
use crate::events::{ControllerEvent, SlotSnapshot};
use crate::lifecycle::{ActiveLifecycle, Lifecycle, SlotTransition};

type Reply<T> = oneshot::Sender<Result<T>>;

/// Calls from the façade.
pub(crate) enum EngineRequest {
    Open(Reply<()>),
    Close(oneshot::Sender<()>),
    CheckState(Reply<Vec<SlotSnapshot>>),
    Unlock {
        slot: SlotId,
        content_id: String,
        reply: Reply<()>,
    },
    Dispense {
        slot: SlotId,
        credential: String,
        reply: Reply<()>,
    },
    ResetSlot {
        slot: SlotId,
        reply: Reply<()>,
    },
    Deactivate {
        slot: SlotId,
        credential: String,
        reply: Reply<()>,
    },
    Reactivate {
        slot: SlotId,
        reply: Reply<()>,
    },
    DeactivateAll {
        credential: String,
        reply: Reply<usize>,
    },
    ReactivateAll(Reply<usize>),
    Slots(oneshot::Sender<Vec<SlotSnapshot>>),
}

/// Results handed back to the actor by waiter tasks.
enum Internal {
    Opened {
        result: std::result::Result<(), DispatchError>,
        reply: Reply<()>,
    },
    UnlockReplied {
        active: ActiveLifecycle,
        result: std::result::Result<Frame, DispatchError>,
        reply: Reply<()>,
    },
    LockBackDue {
        generation: u64,
    },
    LockBackReplied {
        generation: u64,
        result: std::result::Result<Frame, DispatchError>,
    },
    StatusGathered {
        results: Vec<std::result::Result<Frame, DispatchError>>,
        reply: Option<Reply<Vec<SlotSnapshot>>>,
    },
}

/// Timings the engine applies to every command.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Timings {
    pub command_timeout: Duration,
    pub settle_delay: Duration,
}

impl From<&ControllerConfig> for Timings {
    fn from(config: &ControllerConfig) -> Self {
        Self {
            command_timeout: config.command_timeout(),
            settle_delay: config.settle_delay(),
        }
    }
}

pub(crate) struct Engine<P, S, C, E> {
    protocol: P,
    timings: Timings,
    mapper: AddressMapper,
    lifecycle: Lifecycle,
    dispatcher: DispatcherHandle,
    store: S,
    credentials: C,
    events: E,
    internal_tx: mpsc::UnboundedSender<Internal>,
    internal_rx: mpsc::UnboundedReceiver<Internal>,

    /// Generation whose lock-back polling chain is running.
    lock_back: Option<u64>,
}

impl<P, S, C, E> Engine<P, S, C, E>
where
    P: LockProtocol,
    S: SlotStore,
    C: CredentialLookup,
    E: EventSink,
{
    pub(crate) fn new(
        protocol: P,
        timings: Timings,
        mapper: AddressMapper,
        lifecycle: Lifecycle,
        dispatcher: DispatcherHandle,
        collaborators: Collaborators<S, C, E>,
    ) -> Self {
        let (internal_tx, internal_rx) = mpsc::unbounded_channel();
        let Collaborators {
            store,
            credentials,
            events,
        } = collaborators;
        Self {
            protocol,
            timings,
            mapper,
            lifecycle,
            dispatcher,
            store,
            credentials,
            events,
            internal_tx,
            internal_rx,
            lock_back: None,
        }
    }

    pub(crate) async fn run(
        mut self,
        mut requests: mpsc::Receiver<EngineRequest>,
        mut link: mpsc::UnboundedReceiver<LinkEvent>,
    ) {
        info!(
            variant = %P::VARIANT,
            slots = self.mapper.slot_count(),
            "Lock controller engine started"
        );
        loop {
            tokio::select! {
                request = requests.recv() => match request {
                    Some(request) => self.handle_request(request).await,
                    None => break,
                },
                Some(message) = self.internal_rx.recv() => self.handle_internal(message).await,
                Some(event) = link.recv() => self.handle_link_event(event).await,
            }
        }
        self.dispatcher.close().await;
        info!("Lock controller engine stopped");
    }

    async fn handle_request(&mut self, request: EngineRequest) {
        match request {
            EngineRequest::Open(reply) => self.open(reply),
            EngineRequest::Close(reply) => {
                self.dispatcher.close().await;
                let _ = reply.send(());
            }
            EngineRequest::CheckState(reply) => {
                self.check_state(CommandPhase::StatusSnapshot, Some(reply));
            }
            EngineRequest::Unlock {
                slot,
                content_id,
                reply,
            } => self.unlock(slot, content_id, reply).await,
            EngineRequest::Dispense {
                slot,
                credential,
                reply,
            } => self.dispense(slot, credential, reply).await,
            EngineRequest::ResetSlot { slot, reply } => {
                let result = self.reset_slot(slot).await;
                let _ = reply.send(result);
            }
            EngineRequest::Deactivate {
                slot,
                credential,
                reply,
            } => {
                let result = self.deactivate(slot, &credential).await;
                let succeeded = result.is_ok();
                let _ = reply.send(result);
                if succeeded {
                    self.admin_recheck();
                }
            }
            EngineRequest::Reactivate { slot, reply } => {
                let result = self.reactivate(slot).await;
                let succeeded = result.is_ok();
                let _ = reply.send(result);
                if succeeded {
                    self.admin_recheck();
                }
            }
            EngineRequest::DeactivateAll { credential, reply } => {
                let result = self.deactivate_all(&credential).await;
                let succeeded = result.is_ok();
                let _ = reply.send(result);
                if succeeded {
                    self.admin_recheck();
                }
            }
            EngineRequest::ReactivateAll(reply) => {
                let result = self.reactivate_all().await;
                let succeeded = result.is_ok();
                let _ = reply.send(result);
                if succeeded {
                    self.admin_recheck();
                }
            }
            EngineRequest::Slots(reply) => {
                let _ = reply.send(self.lifecycle.snapshot());
            }
        }
    }

    async fn handle_internal(&mut self, message: Internal) {
        match message {
            Internal::Opened { result, reply } => {
                let result = result.map_err(ControllerError::from);
                if let Err(e) = &result {
                    if e.is_soft() {
                        warn!(error = %e, "Link busy");
                    } else {
                        error!(error = %e, "Failed to open link");
                    }
                    self.emit_error(e);
                }
                let _ = reply.send(result);
            }
            Internal::UnlockReplied {
                active,
                result,
                reply,
            } => self.unlock_replied(active, result, reply).await,
            Internal::LockBackDue { generation } => self.lock_back_due(generation),
            Internal::LockBackReplied { generation, result } => {
                self.lock_back_replied(generation, result).await;
            }
            Internal::StatusGathered { results, reply } => {
                self.status_gathered(results, reply).await;
            }
        }
    }

    async fn handle_link_event(&mut self, event: LinkEvent) {
        match event {
            LinkEvent::Connected => {
                self.events.emit(ControllerEvent::Connection { connected: true });
                self.resume_lock_back();
            }
            LinkEvent::Disconnected { reason } => {
                debug!(%reason, "Link down");
                self.events.emit(ControllerEvent::Connection { connected: false });
            }
            LinkEvent::Reconnecting { attempt } => {
                self.events.emit(ControllerEvent::Reconnecting { attempt });
            }
            LinkEvent::ReconnectFailed { attempt, error } => {
                debug!(attempt, %error, "Reconnect attempt failed");
                self.events.emit(ControllerEvent::Error {
                    kind: ErrorKind::ConnectionRefused,
                    message: error,
                });
            }
            LinkEvent::Unsolicited(frame) => match self.protocol.classify(&frame) {
                CommandKind::Status => self.reconcile(&frame).await,
                kind => debug!(%kind, %frame, "Ignoring unsolicited frame"),
            },
            LinkEvent::FrameRejected(e) => {
                self.events.emit(ControllerEvent::Error {
                    kind: ErrorKind::InvalidFrame,
                    message: e.to_string(),
                });
            }
        }
    }

    fn open(&self, reply: Reply<()>) {
        let dispatcher = self.dispatcher.clone();
        let internal = self.internal_tx.clone();
        tokio::spawn(async move {
            let result = dispatcher.open().await;
            let _ = internal.send(Internal::Opened { result, reply });
        });
    }

    // ------------------------------------------------------------------
    // Unlock and dispense
    // ------------------------------------------------------------------

    async fn unlock(&mut self, slot: SlotId, content_id: String, reply: Reply<()>) {
        let frame = match self.unlock_frame(slot) {
            Ok(frame) => frame,
            Err(e) => {
                let _ = reply.send(Err(e));
                return;
            }
        };

        let (active, transition) = match self.lifecycle.begin_unlock(slot, &content_id) {
            Ok(started) => started,
            Err(e) => {
                debug!(%slot, error = %e, "Unlock rejected");
                let _ = reply.send(Err(e));
                return;
            }
        };
        let _ = self.record(&transition).await;
        info!(%slot, %content_id, "Unlocking slot for loading");
        self.events.emit(ControllerEvent::Unlocking { slot });

        self.send_unlock(active, frame, CommandPhase::Unlock { slot }, reply);
    }

    async fn dispense(&mut self, slot: SlotId, credential: String, reply: Reply<()>) {
        let Some(identity) = self.credentials.lookup(&credential).await else {
            warn!(%slot, "Dispense refused: unknown credential");
            let err = ControllerError::AuthorizationFailed;
            self.emit_error(&err);
            let _ = reply.send(Err(err));
            return;
        };

        let frame = match self.unlock_frame(slot) {
            Ok(frame) => frame,
            Err(e) => {
                let _ = reply.send(Err(e));
                return;
            }
        };

        let (active, transition) = match self.lifecycle.begin_dispense(slot) {
            Ok(started) => started,
            Err(e) => {
                debug!(%slot, error = %e, "Dispense rejected");
                let _ = reply.send(Err(e));
                return;
            }
        };
        let content_id = self
            .lifecycle
            .machine(slot)
            .and_then(|m| m.content_id().map(str::to_string))
            .unwrap_or_default();
        let _ = self.record(&transition).await;
        info!(%slot, user = %identity.user_id, %content_id, "Dispensing slot");
        self.events.emit(ControllerEvent::Dispensing {
            slot,
            user: identity.user_id,
        });

        self.send_unlock(active, frame, CommandPhase::DispenseUnlock { slot }, reply);
    }

    /// Unlock request for `slot`, checked against the deployment and the link.
    fn unlock_frame(&self, slot: SlotId) -> Result<Frame> {
        let address = self.mapper.to_address(slot)?;
        if !self.dispatcher.is_connected() {
            return Err(ControllerError::NotConnected);
        }
        Ok(self
            .protocol
            .encode_unlock_request(address.bus_address(), address.lock_index())?)
    }

    fn send_unlock(
        &self,
        active: ActiveLifecycle,
        frame: Frame,
        phase: CommandPhase,
        reply: Reply<()>,
    ) {
        let pending = self.dispatcher.submit(Command::new(
            frame,
            CommandKind::Unlock,
            phase,
            self.timings.command_timeout,
        ));
        self.forward(pending, move |result| Internal::UnlockReplied {
            active,
            result,
            reply,
        });
    }

    async fn unlock_replied(
        &mut self,
        active: ActiveLifecycle,
        result: std::result::Result<Frame, DispatchError>,
        reply: Reply<()>,
    ) {
        let slot = active.slot;
        let outcome = match result {
            Ok(frame) if self.protocol.is_refusal(&frame) => Err(ControllerError::Refused { slot }),
            Ok(_) => Ok(()),
            Err(e) => Err(ControllerError::from(e)),
        };

        match outcome {
            Ok(()) => match self.lifecycle.confirm_unlocked(active.generation) {
                Some(transition) => {
                    let _ = self.record(&transition).await;
                    info!(%slot, kind = ?active.kind, "Slot unlocked, waiting for close");
                    let _ = reply.send(Ok(()));
                    self.schedule_lock_back(active.generation);
                }
                None => {
                    debug!(%slot, "Unlock acknowledged after lifecycle ended");
                    let _ = reply.send(Err(ControllerError::Cancelled));
                }
            },
            Err(err) => {
                warn!(%slot, kind = ?active.kind, error = %err, "Unlock failed");
                if let Some(transition) = self.lifecycle.abort(active.generation) {
                    let _ = self.record(&transition).await;
                }
                self.emit_error(&err);
                let _ = reply.send(Err(err));
            }
        }
    }

    // ------------------------------------------------------------------
    // Lock-back polling
    // ------------------------------------------------------------------

    fn schedule_lock_back(&mut self, generation: u64) {
        self.lock_back = Some(generation);
        let internal = self.internal_tx.clone();
        let delay = self.timings.settle_delay;
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = internal.send(Internal::LockBackDue { generation });
        });
    }

    fn resume_lock_back(&mut self) {
        if self.lock_back.is_some() {
            return;
        }
        if let Some(active) = self.lifecycle.active()
            && self.lifecycle.is_waiting(active.generation)
        {
            debug!(slot = %active.slot, "Resuming lock-back polling");
            self.schedule_lock_back(active.generation);
        }
    }

    fn lock_back_due(&mut self, generation: u64) {
        if self.lock_back != Some(generation) {
            return;
        }
        let Some(active) = self.lifecycle.active().filter(|_| self.lifecycle.is_waiting(generation))
        else {
            self.lock_back = None;
            return;
        };
        if !self.dispatcher.is_connected() {
            debug!(slot = %active.slot, "Lock-back check deferred until reconnect");
            self.lock_back = None;
            return;
        }

        let frame = match self
            .mapper
            .to_address(active.slot)
            .and_then(|address| self.protocol.encode_status_request(address.bus_address()))
        {
            Ok(frame) => frame,
            Err(e) => {
                error!(slot = %active.slot, error = %e, "Cannot address slot for lock-back check");
                self.lock_back = None;
                return;
            }
        };
        let pending = self.dispatcher.submit(Command::new(
            frame,
            CommandKind::Status,
            CommandPhase::LockBackCheck { slot: active.slot },
            self.timings.command_timeout,
        ));
        self.forward(pending, move |result| Internal::LockBackReplied { generation, result });
    }

    async fn lock_back_replied(
        &mut self,
        generation: u64,
        result: std::result::Result<Frame, DispatchError>,
    ) {
        let keep_polling = match result {
            Ok(frame) => {
                self.reconcile(&frame).await;
                true
            }
            Err(DispatchError::Timeout { timeout_ms }) => {
                debug!(timeout_ms, "Lock-back check timed out, polling again");
                true
            }
            Err(e) => {
                debug!(error = %e, "Lock-back polling paused");
                false
            }
        };

        if self.lock_back != Some(generation) {
            return;
        }
        if keep_polling && self.lifecycle.is_waiting(generation) {
            self.schedule_lock_back(generation);
        } else {
            self.lock_back = None;
        }
    }

    /// Apply a status reply to every slot on the replying device.
    async fn reconcile(&mut self, frame: &Frame) {
        let Some(bitmap) = frame.lock_bitmap() else {
            return;
        };
        for (slot, bit) in self.mapper.slots_on(frame.address()) {
            let closed = bitmap.is_closed(bit);
            if let Some(transition) = self.lifecycle.observe(slot, closed) {
                let _ = self.record(&transition).await;
                let occupied = transition.to.is_occupied();
                info!(%slot, occupied, "Slot closed");
                self.events.emit(ControllerEvent::SlotClosed { slot, occupied });
            }
        }
    }

    // ------------------------------------------------------------------
    // Status checks
    // ------------------------------------------------------------------

    fn check_state(&mut self, phase: CommandPhase, reply: Option<Reply<Vec<SlotSnapshot>>>) {
        if !self.dispatcher.is_connected() {
            if let Some(reply) = reply {
                let _ = reply.send(Err(ControllerError::NotConnected));
            }
            return;
        }

        let mut pending = Vec::new();
        for address in self.mapper.status_targets() {
            match self.protocol.encode_status_request(address) {
                Ok(frame) => pending.push(self.dispatcher.submit(Command::new(
                    frame,
                    CommandKind::Status,
                    phase,
                    self.timings.command_timeout,
                ))),
                Err(e) => {
                    error!(address, error = %e, "Cannot encode status request");
                    if let Some(reply) = reply {
                        let _ = reply.send(Err(e.into()));
                    }
                    return;
                }
            }
        }

        let internal = self.internal_tx.clone();
        tokio::spawn(async move {
            let mut results = Vec::with_capacity(pending.len());
            for reply in pending {
                results.push(reply.await);
            }
            let _ = internal.send(Internal::StatusGathered { results, reply });
        });
    }

    fn admin_recheck(&mut self) {
        if self.dispatcher.is_connected() {
            self.check_state(CommandPhase::AdminRecheck, None);
        }
    }

    async fn status_gathered(
        &mut self,
        results: Vec<std::result::Result<Frame, DispatchError>>,
        reply: Option<Reply<Vec<SlotSnapshot>>>,
    ) {
        let mut failure = None;
        for result in results {
            match result {
                Ok(frame) => self.reconcile(&frame).await,
                Err(e) => {
                    failure.get_or_insert(e);
                }
            }
        }

        match failure {
            Some(e) => {
                let err = ControllerError::from(e);
                warn!(error = %err, "Status check failed");
                self.emit_error(&err);
                if let Some(reply) = reply {
                    let _ = reply.send(Err(err));
                }
            }
            None => {
                let slots = self.lifecycle.snapshot();
                self.events.emit(ControllerEvent::Status {
                    slots: slots.clone(),
                });
                if let Some(reply) = reply {
                    let _ = reply.send(Ok(slots));
                }
            }
        }
    }

    // ------------------------------------------------------------------
    // Administration
    // ------------------------------------------------------------------

    async fn authorize(&self, credential: &str) -> Result<()> {
        match self.credentials.lookup(credential).await {
            Some(identity) => {
                debug!(user = %identity.user_id, "Administrator authorized");
                Ok(())
            }
            None => {
                let err = ControllerError::AuthorizationFailed;
                self.emit_error(&err);
                Err(err)
            }
        }
    }

    /// Cancel wire traffic for `slot` if it holds the lifecycle guard.
    fn release_if_active(&mut self, slot: SlotId) {
        if self.lifecycle.active().is_some_and(|a| a.slot == slot) {
            self.dispatcher.cancel_slot(slot);
            self.lock_back = None;
        }
    }

    async fn reset_slot(&mut self, slot: SlotId) -> Result<()> {
        self.mapper.to_address(slot)?;
        self.release_if_active(slot);
        if let Some(transition) = self.lifecycle.reset_slot(slot)? {
            info!(%slot, from = %transition.from, "Slot reset");
            self.record(&transition).await?;
        }
        Ok(())
    }

    async fn deactivate(&mut self, slot: SlotId, credential: &str) -> Result<()> {
        self.authorize(credential).await?;
        self.mapper.to_address(slot)?;
        self.release_if_active(slot);
        if let Some(transition) = self.lifecycle.deactivate(slot)? {
            info!(%slot, "Slot deactivated");
            self.record(&transition).await?;
        }
        Ok(())
    }

    async fn reactivate(&mut self, slot: SlotId) -> Result<()> {
        self.mapper.to_address(slot)?;
        if let Some(transition) = self.lifecycle.reactivate(slot)? {
            info!(%slot, "Slot reactivated");
            self.record(&transition).await?;
        }
        Ok(())
    }

    async fn deactivate_all(&mut self, credential: &str) -> Result<usize> {
        self.authorize(credential).await?;
        if let Some(active) = self.lifecycle.active() {
            self.release_if_active(active.slot);
        }
        let transitions = self.lifecycle.deactivate_all();
        info!(count = transitions.len(), "All slots deactivated");
        self.record_all(&transitions).await?;
        Ok(transitions.len())
    }

    async fn reactivate_all(&mut self) -> Result<usize> {
        let transitions = self.lifecycle.reactivate_all();
        info!(count = transitions.len(), "All slots reactivated");
        self.record_all(&transitions).await?;
        Ok(transitions.len())
    }

    // ------------------------------------------------------------------
    // Helpers
    // ------------------------------------------------------------------

    /// Emit a transition and persist the slot's new record.
    async fn record(&self, transition: &SlotTransition) -> Result<()> {
        self.events.emit(ControllerEvent::from(transition));
        let Some(record) = self.lifecycle.machine(transition.slot).map(|m| m.record()) else {
            return Ok(());
        };
        if let Err(e) = self.store.save_slot(&record).await {
            let err = ControllerError::Store(e.to_string());
            error!(slot = %transition.slot, error = %e, "Failed to persist slot");
            self.emit_error(&err);
            return Err(err);
        }
        Ok(())
    }

    /// Record every transition; the first store failure is returned.
    async fn record_all(&self, transitions: &[SlotTransition]) -> Result<()> {
        let mut first_error = None;
        for transition in transitions {
            if let Err(e) = self.record(transition).await {
                first_error.get_or_insert(e);
            }
        }
        first_error.map_or(Ok(()), Err)
    }

    fn emit_error(&self, err: &ControllerError) {
        self.events.emit(ControllerEvent::error(err));
    }

    /// Await `pending` on a waiter task and hand the result back to the actor.
    fn forward<F>(&self, pending: PendingReply, into: F)
    where
        F: FnOnce(std::result::Result<Frame, DispatchError>) -> Internal + Send + 'static,
    {
        let internal = self.internal_tx.clone();
        tokio::spawn(async move {
            let result = pending.await;
            let _ = internal.send(into(result));
        });
    }
}
