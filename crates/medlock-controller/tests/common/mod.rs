//! Test rig: a controller wired to simulated boards through a mock transport.

#![allow(dead_code)]

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use chrono::Utc;
use tokio::sync::mpsc;
use tokio::time::timeout;

use medlock_controller::{
    ChannelEventSink, Collaborators, Controller, ControllerEvent, LockController,
    MemoryCredentials, MemorySlotStore, SlotRecord, SlotState,
};
use medlock_core::{ControllerConfig, LinkConfig, ProtocolVariant, SlotId};
use medlock_protocol::{AddressMapper, BoardSimulator, Frame, LockProtocol};
use medlock_transport::{MockOpenFailure, MockTransport, MockTransportHandle};

pub const CREDENTIAL: &str = "4821";
pub const WAIT: Duration = Duration::from_secs(30);

pub fn slot(n: u8) -> SlotId {
    SlotId::new(n).unwrap()
}

pub fn config(protocol: ProtocolVariant, slot_count: u8) -> ControllerConfig {
    let link = LinkConfig::Tcp {
        host: "cabinet".into(),
        port: 4001,
    };
    let mut config = ControllerConfig::new(protocol, link, slot_count);
    config.command_timeout_ms = 500;
    config.settle_delay_ms = 200;
    config
}

pub fn occupied(n: u8, content_id: &str) -> SlotRecord {
    SlotRecord {
        slot_id: slot(n),
        content_id: Some(content_id.to_string()),
        occupied: true,
        opening: false,
        is_active: true,
        updated_at: Utc::now(),
    }
}

enum LinkControl {
    Disconnect(String),
    FailNextOpens(Vec<MockOpenFailure>),
    Inject(Vec<u8>),
}

pub struct Rig<P: LockProtocol> {
    pub controller: Controller<P>,
    pub store: MemorySlotStore,
    pub events: mpsc::Receiver<ControllerEvent>,
    written: mpsc::UnboundedReceiver<Frame>,
    board: Arc<Mutex<BoardSimulator<P>>>,
    control: mpsc::UnboundedSender<LinkControl>,
}

impl<P: LockProtocol> Rig<P> {
    pub async fn start(config: ControllerConfig, store: MemorySlotStore) -> Self {
        let protocol = P::default();
        let mapper = AddressMapper::from_config(&config).unwrap();
        let board = Arc::new(Mutex::new(BoardSimulator::for_deployment(protocol, &mapper)));

        let (transport, handle) = MockTransport::with_name("cabinet");
        let (written_tx, written) = mpsc::unbounded_channel();
        let (control, control_rx) = mpsc::unbounded_channel();
        tokio::spawn(respond(
            protocol,
            handle,
            Arc::clone(&board),
            written_tx,
            control_rx,
        ));

        let (sink, events) = ChannelEventSink::new(256);
        let credentials = MemoryCredentials::new().with(CREDENTIAL, "nurse-7", "Ward nurse");
        let collaborators = Collaborators::new(store.clone(), credentials, sink);
        let controller = Controller::<P>::start(config, transport, collaborators)
            .await
            .unwrap();

        Self {
            controller,
            store,
            events,
            written,
            board,
            control,
        }
    }

    pub fn board(&self) -> MutexGuard<'_, BoardSimulator<P>> {
        self.board.lock().unwrap()
    }

    /// Next frame the host wrote.
    pub async fn next_written(&mut self) -> Frame {
        timeout(WAIT, self.written.recv())
            .await
            .expect("no frame written")
            .expect("responder stopped")
    }

    /// Frames written so far, without waiting.
    pub fn drain_written(&mut self) -> Vec<Frame> {
        std::iter::from_fn(|| self.written.try_recv().ok()).collect()
    }

    /// Skip events until one matches.
    pub async fn expect_event(
        &mut self,
        predicate: impl Fn(&ControllerEvent) -> bool,
    ) -> ControllerEvent {
        timeout(WAIT, async {
            loop {
                let event = self.events.recv().await.expect("event channel closed");
                if predicate(&event) {
                    return event;
                }
            }
        })
        .await
        .expect("expected event not emitted")
    }

    pub async fn state(&self, n: u8) -> SlotState {
        self.controller
            .slots()
            .await
            .unwrap()
            .into_iter()
            .find(|s| s.slot == slot(n))
            .map(|s| s.state)
            .expect("slot not in deployment")
    }

    pub fn disconnect(&self, reason: &str) {
        self.control
            .send(LinkControl::Disconnect(reason.to_string()))
            .unwrap();
    }

    pub fn fail_next_opens(&self, failures: Vec<MockOpenFailure>) {
        self.control
            .send(LinkControl::FailNextOpens(failures))
            .unwrap();
    }

    /// Deliver a frame as if the board had sent it unprompted.
    pub fn inject(&self, frame: &Frame) {
        self.control
            .send(LinkControl::Inject(frame.as_bytes().to_vec()))
            .unwrap();
    }

    /// Let queued work run while time is paused.
    pub async fn settle(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// Plays the boards: decodes every frame the host writes and answers it.
async fn respond<P: LockProtocol>(
    protocol: P,
    mut handle: MockTransportHandle,
    board: Arc<Mutex<BoardSimulator<P>>>,
    written: mpsc::UnboundedSender<Frame>,
    mut control: mpsc::UnboundedReceiver<LinkControl>,
) {
    loop {
        tokio::select! {
            bytes = handle.next_written() => {
                let Some(bytes) = bytes else { break };
                let frame = protocol.decode(&bytes).expect("host wrote an invalid frame");
                let reply = board.lock().unwrap().respond(&frame);
                let _ = written.send(frame);
                if let Some(reply) = reply {
                    let _ = handle.inject(reply.as_bytes()).await;
                }
            }
            Some(message) = control.recv() => match message {
                LinkControl::Disconnect(reason) => handle.disconnect(&reason).await,
                LinkControl::FailNextOpens(failures) => handle.fail_next_opens(failures),
                LinkControl::Inject(bytes) => {
                    let _ = handle.inject(&bytes).await;
                }
            },
        }
    }
}
