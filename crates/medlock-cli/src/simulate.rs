//! `simulate`: serve simulated boards over TCP.
//!
//! Stands in for a serial-to-Ethernet bridge so the other subcommands (or a
//! cabinet UI) can be driven without hardware.

use std::net::SocketAddr;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use anyhow::{Context, Result};
use futures::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio_util::codec::Framed;
use tracing::{debug, info, warn};

use medlock_core::{ControllerConfig, ProtocolVariant};
use medlock_protocol::{
    AddressMapper, BoardSimulator, CommandKind, LockCodec, LockProtocol, MultiBoard, SingleBoard,
};

#[derive(Debug, Clone, Copy)]
pub struct SimulateOptions {
    pub listen: SocketAddr,
    pub refuse: bool,
    pub auto_close: Option<Duration>,
}

pub async fn run(config: &ControllerConfig, options: SimulateOptions) -> Result<()> {
    let mapper = AddressMapper::from_config(config)?;
    match config.protocol {
        ProtocolVariant::SingleBoard => serve(SingleBoard, &mapper, options).await,
        ProtocolVariant::MultiBoard => serve(MultiBoard, &mapper, options).await,
    }
}

type SharedBoards<P> = Arc<Mutex<BoardSimulator<P>>>;

fn lock<P: LockProtocol>(boards: &SharedBoards<P>) -> MutexGuard<'_, BoardSimulator<P>> {
    boards.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

async fn serve<P: LockProtocol>(
    protocol: P,
    mapper: &AddressMapper,
    options: SimulateOptions,
) -> Result<()> {
    let mut simulator = BoardSimulator::for_deployment(protocol, mapper);
    simulator.set_refuse_unlocks(options.refuse);
    let boards = Arc::new(Mutex::new(simulator));

    let listener = TcpListener::bind(options.listen)
        .await
        .with_context(|| format!("binding {}", options.listen))?;
    info!(
        listen = %options.listen,
        variant = %P::VARIANT,
        boards = ?mapper.status_targets(),
        "Simulated boards listening"
    );

    loop {
        let (stream, peer) = listener.accept().await?;
        if let Err(e) = stream.set_nodelay(true) {
            warn!(%peer, error = %e, "Failed to set TCP_NODELAY");
        }
        info!(%peer, "Host connected");
        let boards = Arc::clone(&boards);
        tokio::spawn(async move {
            match session(protocol, stream, boards, options.auto_close).await {
                Ok(()) => info!(%peer, "Host disconnected"),
                Err(e) => warn!(%peer, error = %e, "Session ended"),
            }
        });
    }
}

async fn session<P: LockProtocol>(
    protocol: P,
    stream: TcpStream,
    boards: SharedBoards<P>,
    auto_close: Option<Duration>,
) -> Result<()> {
    let mut framed = Framed::new(stream, LockCodec::new(protocol));

    while let Some(item) = framed.next().await {
        let request = match item? {
            Ok(frame) => frame,
            Err(e) => {
                warn!(error = %e, "Ignoring invalid frame from host");
                continue;
            }
        };
        debug!(%request, "Host frame");

        let reply = lock(&boards).respond(&request);
        let Some(reply) = reply else {
            debug!(%request, "No reply");
            continue;
        };

        let opened =
            protocol.classify(&request) == CommandKind::Unlock && !protocol.is_refusal(&reply);
        framed.send(reply).await?;

        if let (true, Some(delay)) = (opened, auto_close) {
            let boards = Arc::clone(&boards);
            let (address, lock_index) = (request.address(), request.lock_index());
            tokio::spawn(async move {
                tokio::time::sleep(delay).await;
                lock(&boards).close_lock(address, lock_index);
                info!(address, lock_index, "Door closed");
            });
        }
    }
    Ok(())
}
