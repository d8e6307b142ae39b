//! Single in-flight command dispatcher.
//!
//! The dispatcher owns the transport and the stream parser. Commands are queued
//! and written one at a time; the next command is not written until the current
//! one has its reply, has timed out or has been cancelled. Frames that do not
//! answer the in-flight command, and every link state change, are forwarded as
//! [`LinkEvent`]s.
//!
//! ```text
//!  submit ──> queue ──> write ──> in flight ──reply──> PendingReply
//!                                    │
//!                                    ├──deadline──> Timeout, next command
//!                                    └──link lost─> ConnectionLost (all queued too)
//! ```

use std::collections::VecDeque;
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;

use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, trace, warn};

use medlock_core::SlotId;
use medlock_protocol::{CommandKind, Frame, FrameError, HexBytes, LockProtocol, StreamParser};
use medlock_transport::{Transport, TransportError, TransportEvent};

use crate::error::DispatchError;

/// Why a command was sent; carried into logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandPhase {
    /// Unlock for loading.
    Unlock { slot: SlotId },

    /// Unlock for removal.
    DispenseUnlock { slot: SlotId },

    /// Status poll waiting for a door to be shut.
    LockBackCheck { slot: SlotId },

    /// Part of a full status check.
    StatusSnapshot,

    /// Status poll after an administrative change.
    AdminRecheck,
}

impl CommandPhase {
    /// The slot this command belongs to, if any.
    pub fn slot(&self) -> Option<SlotId> {
        match self {
            Self::Unlock { slot }
            | Self::DispenseUnlock { slot }
            | Self::LockBackCheck { slot } => Some(*slot),
            Self::StatusSnapshot | Self::AdminRecheck => None,
        }
    }
}

/// A frame to write plus what counts as its reply.
#[derive(Debug, Clone)]
pub struct Command {
    pub frame: Frame,
    pub expected: CommandKind,
    pub phase: CommandPhase,
    pub timeout: Duration,
}

impl Command {
    pub fn new(
        frame: Frame,
        expected: CommandKind,
        phase: CommandPhase,
        timeout: Duration,
    ) -> Self {
        Self {
            frame,
            expected,
            phase,
            timeout,
        }
    }

    /// Whether `reply` answers this command.
    ///
    /// Same command class from the addressed device; unlock replies must also
    /// name the same lock.
    pub fn is_answered_by<P: LockProtocol>(&self, protocol: &P, reply: &Frame) -> bool {
        reply.is_reply()
            && protocol.classify(reply) == self.expected
            && reply.address() == self.frame.address()
            && (self.expected != CommandKind::Unlock
                || reply.lock_index() == self.frame.lock_index())
    }
}

/// Link-level happenings forwarded to the engine.
#[derive(Debug)]
pub enum LinkEvent {
    Connected,
    Disconnected { reason: String },
    Reconnecting { attempt: u32 },
    ReconnectFailed { attempt: u32, error: String },

    /// A valid frame that answers no in-flight command.
    Unsolicited(Frame),

    /// Bytes that failed validation.
    FrameRejected(FrameError),
}

type ReplySender = oneshot::Sender<Result<Frame, DispatchError>>;

enum Request {
    Submit { command: Command, reply: ReplySender },
    Open { reply: oneshot::Sender<Result<(), TransportError>> },
    Close { reply: oneshot::Sender<()> },
    CancelSlot(SlotId),
}

/// Reply to a submitted command.
#[derive(Debug)]
pub struct PendingReply {
    rx: oneshot::Receiver<Result<Frame, DispatchError>>,
}

impl Future for PendingReply {
    type Output = Result<Frame, DispatchError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.rx)
            .poll(cx)
            .map(|result| result.unwrap_or(Err(DispatchError::Cancelled)))
    }
}

/// Cloneable front of a running dispatcher.
#[derive(Debug, Clone)]
pub struct DispatcherHandle {
    tx: mpsc::UnboundedSender<Request>,
    connected: watch::Receiver<bool>,
}

impl DispatcherHandle {
    /// Queue a command. The reply future may be awaited elsewhere.
    pub fn submit(&self, command: Command) -> PendingReply {
        let (reply, rx) = oneshot::channel();
        // A stopped dispatcher drops the sender, which the future reports as Cancelled.
        let _ = self.tx.send(Request::Submit { command, reply });
        PendingReply { rx }
    }

    /// Queue a command and wait for its reply.
    pub async fn send(&self, command: Command) -> Result<Frame, DispatchError> {
        self.submit(command).await
    }

    pub async fn open(&self) -> Result<(), DispatchError> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(Request::Open { reply })
            .map_err(|_| DispatchError::Cancelled)?;
        rx.await
            .map_err(|_| DispatchError::Cancelled)?
            .map_err(DispatchError::from)
    }

    /// Close the link, cancelling every queued command and stopping reconnection.
    pub async fn close(&self) {
        let (reply, rx) = oneshot::channel();
        if self.tx.send(Request::Close { reply }).is_ok() {
            let _ = rx.await;
        }
    }

    /// Cancel the in-flight and queued commands issued for `slot`.
    ///
    /// Commands for other slots and status snapshots keep their place; the
    /// link stays open.
    pub fn cancel_slot(&self, slot: SlotId) {
        let _ = self.tx.send(Request::CancelSlot(slot));
    }

    pub fn is_connected(&self) -> bool {
        *self.connected.borrow()
    }

    /// Watch channel tracking the link state.
    pub fn connected(&self) -> watch::Receiver<bool> {
        self.connected.clone()
    }
}

struct Queued {
    command: Command,
    reply: ReplySender,
}

struct InFlight {
    command: Command,
    reply: ReplySender,
    deadline: Instant,
}

struct Dispatcher<P: LockProtocol, T: Transport> {
    protocol: P,
    transport: T,
    parser: StreamParser<P>,
    link: Option<mpsc::Receiver<TransportEvent>>,
    queue: VecDeque<Queued>,
    in_flight: Option<InFlight>,
    connected: watch::Sender<bool>,
    events: mpsc::UnboundedSender<LinkEvent>,
    reconnect_interval: Option<Duration>,
    reconnect_at: Option<Instant>,
    reconnect_attempt: u32,
    wants_open: bool,
}

/// Start a dispatcher task that owns `transport`.
pub fn spawn<P, T>(
    protocol: P,
    transport: T,
    reconnect_interval: Option<Duration>,
    events: mpsc::UnboundedSender<LinkEvent>,
) -> (DispatcherHandle, JoinHandle<()>)
where
    P: LockProtocol,
    T: Transport,
{
    let (tx, rx) = mpsc::unbounded_channel();
    let (connected, connected_rx) = watch::channel(false);
    let dispatcher = Dispatcher {
        protocol,
        transport,
        parser: StreamParser::new(protocol),
        link: None,
        queue: VecDeque::new(),
        in_flight: None,
        connected,
        events,
        reconnect_interval,
        reconnect_at: None,
        reconnect_attempt: 0,
        wants_open: false,
    };
    let task = tokio::spawn(dispatcher.run(rx));
    (
        DispatcherHandle {
            tx,
            connected: connected_rx,
        },
        task,
    )
}

async fn next_link_event(
    link: &mut Option<mpsc::Receiver<TransportEvent>>,
) -> Option<TransportEvent> {
    match link {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}

async fn sleep_until_opt(at: Option<Instant>) {
    match at {
        Some(at) => tokio::time::sleep_until(at).await,
        None => std::future::pending().await,
    }
}

impl<P: LockProtocol, T: Transport> Dispatcher<P, T> {
    async fn run(mut self, mut requests: mpsc::UnboundedReceiver<Request>) {
        debug!(target = %self.transport.describe(), variant = %P::VARIANT, "Dispatcher started");
        loop {
            self.pump().await;

            let deadline = self.in_flight.as_ref().map(|f| f.deadline);
            let reconnect_at = self.reconnect_at;

            tokio::select! {
                request = requests.recv() => match request {
                    Some(request) => self.handle_request(request).await,
                    None => break,
                },
                event = next_link_event(&mut self.link) => match event {
                    Some(TransportEvent::Data(chunk)) => self.handle_data(&chunk),
                    Some(TransportEvent::Closed(reason)) => self.link_lost(reason).await,
                    None => self.link_lost("link reader stopped".to_string()).await,
                },
                () = sleep_until_opt(deadline) => self.expire_in_flight(),
                () = sleep_until_opt(reconnect_at) => self.reconnect().await,
            }
        }

        self.cancel_all(|| DispatchError::Cancelled);
        let _ = self.transport.close().await;
        debug!("Dispatcher stopped");
    }

    fn is_connected(&self) -> bool {
        self.link.is_some()
    }

    /// Write the next queued command if nothing is in flight.
    async fn pump(&mut self) {
        while self.in_flight.is_none() && self.is_connected() {
            let Some(Queued { command, reply }) = self.queue.pop_front() else {
                return;
            };
            if reply.is_closed() {
                trace!(phase = ?command.phase, "Skipping command abandoned by caller");
                continue;
            }

            trace!(
                phase = ?command.phase,
                frame = %HexBytes(command.frame.as_bytes()),
                "Writing command"
            );
            match self.transport.write_frame(command.frame.as_bytes()).await {
                Ok(()) => {
                    let deadline = Instant::now() + command.timeout;
                    self.in_flight = Some(InFlight {
                        command,
                        reply,
                        deadline,
                    });
                }
                Err(e) => {
                    let reason = e.to_string();
                    let _ = reply.send(Err(DispatchError::ConnectionLost {
                        reason: reason.clone(),
                    }));
                    self.link_lost(reason).await;
                }
            }
        }
    }

    async fn handle_request(&mut self, request: Request) {
        match request {
            Request::Submit { command, reply } => {
                if !self.is_connected() {
                    let _ = reply.send(Err(DispatchError::NotConnected));
                    return;
                }
                self.queue.push_back(Queued { command, reply });
            }
            Request::Open { reply } => {
                self.wants_open = true;
                let result = self.open().await;
                if result.is_err() {
                    self.schedule_reconnect();
                }
                let _ = reply.send(result);
            }
            Request::Close { reply } => {
                self.wants_open = false;
                self.reconnect_at = None;
                self.cancel_all(|| DispatchError::Cancelled);
                if self.link.take().is_some() {
                    self.parser.clear();
                    if let Err(e) = self.transport.close().await {
                        warn!(error = %e, "Error closing link");
                    }
                    self.connected.send_replace(false);
                    let _ = self.events.send(LinkEvent::Disconnected {
                        reason: "closed by host".to_string(),
                    });
                }
                let _ = reply.send(());
            }
            Request::CancelSlot(slot) => self.cancel_slot(slot),
        }
    }

    async fn open(&mut self) -> Result<(), TransportError> {
        if self.is_connected() {
            return Ok(());
        }
        let rx = self.transport.open().await?;
        self.link = Some(rx);
        self.parser.clear();
        self.reconnect_at = None;
        self.reconnect_attempt = 0;
        self.connected.send_replace(true);
        info!(target = %self.transport.describe(), "Link connected");
        let _ = self.events.send(LinkEvent::Connected);
        Ok(())
    }

    fn handle_data(&mut self, chunk: &[u8]) {
        trace!(len = chunk.len(), bytes = %HexBytes(chunk), "Received");
        self.parser.feed(chunk);
        while let Some(result) = self.parser.next_frame() {
            match result {
                Ok(frame) => self.route(frame),
                Err(e) => {
                    warn!(error = %e, "Dropping invalid frame");
                    let _ = self.events.send(LinkEvent::FrameRejected(e));
                }
            }
        }
    }

    fn route(&mut self, frame: Frame) {
        let answers = self
            .in_flight
            .as_ref()
            .is_some_and(|f| f.command.is_answered_by(&self.protocol, &frame));

        if answers {
            if let Some(in_flight) = self.in_flight.take() {
                trace!(phase = ?in_flight.command.phase, %frame, "Reply matched");
                let _ = in_flight.reply.send(Ok(frame));
            }
        } else {
            debug!(%frame, "Unsolicited frame");
            let _ = self.events.send(LinkEvent::Unsolicited(frame));
        }
    }

    fn expire_in_flight(&mut self) {
        if let Some(in_flight) = self.in_flight.take() {
            let timeout_ms =
                u64::try_from(in_flight.command.timeout.as_millis()).unwrap_or(u64::MAX);
            warn!(phase = ?in_flight.command.phase, timeout_ms, "Command timed out");
            let _ = in_flight.reply.send(Err(DispatchError::Timeout { timeout_ms }));
        }
    }

    fn cancel_all(&mut self, error: impl Fn() -> DispatchError) {
        if let Some(in_flight) = self.in_flight.take() {
            let _ = in_flight.reply.send(Err(error()));
        }
        for queued in self.queue.drain(..) {
            let _ = queued.reply.send(Err(error()));
        }
    }

    fn cancel_slot(&mut self, slot: SlotId) {
        let mut dropped = 0usize;
        let owns_in_flight = self
            .in_flight
            .as_ref()
            .is_some_and(|f| f.command.phase.slot() == Some(slot));
        if owns_in_flight {
            // A late reply to it is forwarded as unsolicited.
            if let Some(in_flight) = self.in_flight.take() {
                let _ = in_flight.reply.send(Err(DispatchError::Cancelled));
                dropped += 1;
            }
        }
        let (cancelled, kept) = self
            .queue
            .drain(..)
            .partition::<VecDeque<_>, _>(|q| q.command.phase.slot() == Some(slot));
        self.queue = kept;
        for queued in cancelled {
            let _ = queued.reply.send(Err(DispatchError::Cancelled));
            dropped += 1;
        }
        debug!(%slot, dropped, "Cancelled commands for slot");
    }

    async fn link_lost(&mut self, reason: String) {
        if self.link.take().is_none() {
            return;
        }
        warn!(%reason, "Link lost");
        self.cancel_all(|| DispatchError::ConnectionLost {
            reason: reason.clone(),
        });
        self.parser.clear();
        let _ = self.transport.close().await;
        self.connected.send_replace(false);
        let _ = self.events.send(LinkEvent::Disconnected { reason });
        self.schedule_reconnect();
    }

    fn schedule_reconnect(&mut self) {
        if let (true, Some(interval)) = (self.wants_open, self.reconnect_interval) {
            self.reconnect_at = Some(Instant::now() + interval);
        }
    }

    async fn reconnect(&mut self) {
        self.reconnect_at = None;
        self.reconnect_attempt += 1;
        let attempt = self.reconnect_attempt;
        info!(attempt, target = %self.transport.describe(), "Reconnecting");
        let _ = self.events.send(LinkEvent::Reconnecting { attempt });

        if let Err(e) = self.open().await {
            warn!(attempt, error = %e, "Reconnect failed");
            let _ = self.events.send(LinkEvent::ReconnectFailed {
                attempt,
                error: e.to_string(),
            });
            self.schedule_reconnect();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use medlock_protocol::{MultiBoard, SingleBoard};
    use medlock_transport::{MockOpenFailure, MockTransport};

    const TIMEOUT: Duration = Duration::from_millis(500);

    fn status(address: u8) -> Command {
        Command::new(
            SingleBoard.encode_status_request(address).unwrap(),
            CommandKind::Status,
            CommandPhase::StatusSnapshot,
            TIMEOUT,
        )
    }

    #[test]
    fn test_unlock_reply_must_name_same_lock() {
        let command = Command::new(
            MultiBoard.encode_unlock_request(1, 4).unwrap(),
            CommandKind::Unlock,
            CommandPhase::Unlock {
                slot: SlotId::new(17).unwrap(),
            },
            TIMEOUT,
        );
        let same = MultiBoard.encode_unlock_reply(1, 4).unwrap();
        let other_lock = MultiBoard.encode_unlock_reply(1, 5).unwrap();
        let other_board = MultiBoard.encode_unlock_reply(0, 4).unwrap();
        let status = MultiBoard
            .encode_status_reply(1, Default::default(), None)
            .unwrap();

        assert!(command.is_answered_by(&MultiBoard, &same));
        assert!(!command.is_answered_by(&MultiBoard, &other_lock));
        assert!(!command.is_answered_by(&MultiBoard, &other_board));
        assert!(!command.is_answered_by(&MultiBoard, &status));
        assert!(!command.is_answered_by(&MultiBoard, &command.frame));
    }

    #[tokio::test]
    async fn test_submit_while_disconnected() {
        let (link, _handle) = MockTransport::new();
        let (events, _rx) = mpsc::unbounded_channel();
        let (dispatcher, _task) = spawn(SingleBoard, link, None, events);

        let result = dispatcher.send(status(0)).await;
        assert!(matches!(result, Err(DispatchError::NotConnected)));
    }

    #[tokio::test]
    async fn test_one_command_in_flight() {
        let (link, mut handle) = MockTransport::new();
        let (events, _rx) = mpsc::unbounded_channel();
        let (dispatcher, _task) = spawn(SingleBoard, link, None, events);
        dispatcher.open().await.unwrap();

        let first = dispatcher.submit(status(0));
        let second = dispatcher.submit(status(1));

        let written = handle.next_written().await.unwrap();
        assert_eq!(written.as_ref(), SingleBoard.encode_status_request(0).unwrap().as_bytes());
        assert!(handle.next_written_within(Duration::from_millis(50)).await.is_none());

        let reply = SingleBoard
            .encode_status_reply(0, Default::default(), None)
            .unwrap();
        handle.inject(reply.as_bytes()).await.unwrap();
        assert_eq!(first.await.unwrap().address(), 0);

        let written = handle.next_written().await.unwrap();
        assert_eq!(written.as_ref(), SingleBoard.encode_status_request(1).unwrap().as_bytes());
        let reply = SingleBoard
            .encode_status_reply(1, Default::default(), None)
            .unwrap();
        handle.inject(reply.as_bytes()).await.unwrap();
        assert_eq!(second.await.unwrap().address(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_advances_queue() {
        let (link, mut handle) = MockTransport::new();
        let (events, _rx) = mpsc::unbounded_channel();
        let (dispatcher, _task) = spawn(SingleBoard, link, None, events);
        dispatcher.open().await.unwrap();

        let first = dispatcher.submit(status(0));
        let second = dispatcher.submit(status(1));
        handle.next_written().await.unwrap();

        assert!(matches!(
            first.await,
            Err(DispatchError::Timeout { timeout_ms: 500 })
        ));
        let written = handle.next_written().await.unwrap();
        assert_eq!(written[1], 0x10);
        drop(second);
    }

    #[tokio::test]
    async fn test_unsolicited_frame_forwarded() {
        let (link, handle) = MockTransport::new();
        let (events, mut rx) = mpsc::unbounded_channel();
        let (dispatcher, _task) = spawn(SingleBoard, link, None, events);
        dispatcher.open().await.unwrap();
        assert!(matches!(rx.recv().await, Some(LinkEvent::Connected)));

        let reply = SingleBoard
            .encode_status_reply(0, Default::default(), None)
            .unwrap();
        handle.inject(&[0xAA]).await.unwrap();
        handle.inject(reply.as_bytes()).await.unwrap();
        match rx.recv().await {
            Some(LinkEvent::Unsolicited(frame)) => assert_eq!(frame, reply),
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_cancel_slot_keeps_other_commands() {
        let (link, mut handle) = MockTransport::new();
        let (events, mut rx) = mpsc::unbounded_channel();
        let (dispatcher, _task) = spawn(SingleBoard, link, None, events);
        dispatcher.open().await.unwrap();
        assert!(matches!(rx.recv().await, Some(LinkEvent::Connected)));

        let slot = SlotId::new(3).unwrap();
        let lock_back = dispatcher.submit(Command::new(
            SingleBoard.encode_status_request(0).unwrap(),
            CommandKind::Status,
            CommandPhase::LockBackCheck { slot },
            TIMEOUT,
        ));
        let snapshot = dispatcher.submit(status(1));
        let unlock = dispatcher.submit(Command::new(
            SingleBoard.encode_unlock_request(0, 2).unwrap(),
            CommandKind::Unlock,
            CommandPhase::Unlock { slot },
            TIMEOUT,
        ));
        handle.next_written().await.unwrap();

        dispatcher.cancel_slot(slot);
        assert!(matches!(lock_back.await, Err(DispatchError::Cancelled)));
        assert!(matches!(unlock.await, Err(DispatchError::Cancelled)));

        let written = handle.next_written().await.unwrap();
        assert_eq!(written.as_ref(), SingleBoard.encode_status_request(1).unwrap().as_bytes());

        // Late answer to the cancelled poll
        let late = SingleBoard
            .encode_status_reply(0, Default::default(), None)
            .unwrap();
        handle.inject(late.as_bytes()).await.unwrap();
        match rx.recv().await {
            Some(LinkEvent::Unsolicited(frame)) => assert_eq!(frame, late),
            other => panic!("unexpected event: {other:?}"),
        }

        let reply = SingleBoard
            .encode_status_reply(1, Default::default(), None)
            .unwrap();
        handle.inject(reply.as_bytes()).await.unwrap();
        assert_eq!(snapshot.await.unwrap().address(), 1);
        assert!(handle.next_written_within(Duration::from_millis(50)).await.is_none());
        assert!(dispatcher.is_connected());
    }

    #[test]
    fn test_command_phase_slot() {
        let slot = SlotId::new(9).unwrap();
        assert_eq!(CommandPhase::DispenseUnlock { slot }.slot(), Some(slot));
        assert_eq!(CommandPhase::LockBackCheck { slot }.slot(), Some(slot));
        assert_eq!(CommandPhase::StatusSnapshot.slot(), None);
        assert_eq!(CommandPhase::AdminRecheck.slot(), None);
    }

    #[tokio::test]
    async fn test_disconnect_fails_pending_commands() {
        let (link, mut handle) = MockTransport::new();
        let (events, mut rx) = mpsc::unbounded_channel();
        let (dispatcher, _task) = spawn(SingleBoard, link, None, events);
        dispatcher.open().await.unwrap();
        let _ = rx.recv().await;

        let first = dispatcher.submit(status(0));
        let second = dispatcher.submit(status(1));
        handle.next_written().await.unwrap();
        handle.disconnect("cable pulled").await;

        assert!(matches!(first.await, Err(DispatchError::ConnectionLost { .. })));
        assert!(matches!(second.await, Err(DispatchError::ConnectionLost { .. })));
        assert!(matches!(
            rx.recv().await,
            Some(LinkEvent::Disconnected { reason }) if reason == "cable pulled"
        ));
        assert!(!dispatcher.is_connected());
    }

    #[tokio::test(start_paused = true)]
    async fn test_reconnects_after_loss() {
        let (link, handle) = MockTransport::new();
        let (events, mut rx) = mpsc::unbounded_channel();
        let (dispatcher, _task) = spawn(SingleBoard, link, Some(Duration::from_secs(2)), events);
        dispatcher.open().await.unwrap();
        let _ = rx.recv().await;

        handle.fail_next_opens([MockOpenFailure::Refused]);
        handle.disconnect("power cut").await;

        assert!(matches!(rx.recv().await, Some(LinkEvent::Disconnected { .. })));
        assert!(matches!(rx.recv().await, Some(LinkEvent::Reconnecting { attempt: 1 })));
        assert!(matches!(rx.recv().await, Some(LinkEvent::ReconnectFailed { attempt: 1, .. })));
        assert!(matches!(rx.recv().await, Some(LinkEvent::Reconnecting { attempt: 2 })));
        assert!(matches!(rx.recv().await, Some(LinkEvent::Connected)));
        assert!(dispatcher.is_connected());
        assert_eq!(handle.open_count(), 3);
    }

    #[tokio::test]
    async fn test_close_cancels_and_stops() {
        let (link, handle) = MockTransport::new();
        let (events, _rx) = mpsc::unbounded_channel();
        let (dispatcher, _task) = spawn(SingleBoard, link, Some(Duration::from_millis(10)), events);
        dispatcher.open().await.unwrap();

        let pending = dispatcher.submit(status(0));
        dispatcher.close().await;
        assert!(matches!(pending.await, Err(DispatchError::Cancelled)));
        assert!(!dispatcher.is_connected());
        assert!(!handle.is_connected());
    }
}
