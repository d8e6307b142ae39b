use std::io::Write;

use anyhow::{Context, Result, bail};
use tokio::sync::mpsc;
use tracing::{info, warn};

use medlock_controller::{
    AnyController, ChannelEventSink, Collaborators, ControllerEvent, LockController,
    MemoryCredentials, SlotSnapshot, SlotStore,
};
use medlock_core::{ControllerConfig, SlotId};

use crate::cli::Command;

const EVENT_BUFFER: usize = 256;
const OPERATOR_ID: &str = "operator";

/// Start a controller on `store`, open the link and run one command.
pub async fn run<S: SlotStore>(
    config: ControllerConfig,
    store: S,
    operator: Option<String>,
    command: Command,
) -> Result<()> {
    let credentials = match operator {
        Some(credential) => MemoryCredentials::new().with(credential, OPERATOR_ID, "Operator"),
        None => MemoryCredentials::new(),
    };
    let (events, mut rx) = ChannelEventSink::new(EVENT_BUFFER);

    let controller =
        AnyController::from_config(config, Collaborators::new(store, credentials, events))
            .await
            .context("starting controller")?;
    controller.open().await.context("opening link")?;
    info!(variant = %controller.variant(), "Connected");

    let result = execute(&controller, &mut rx, command).await;
    controller.close().await?;
    result
}

async fn execute(
    controller: &AnyController,
    rx: &mut mpsc::Receiver<ControllerEvent>,
    command: Command,
) -> Result<()> {
    match command {
        Command::Status => {
            let slots = controller.send_check_state().await?;
            print_table(&slots)?;
        }
        Command::Unlock {
            slot,
            content_id,
            no_wait,
        } => {
            controller.send_unlock(slot, &content_id).await?;
            println!("Slot {slot} unlocked for {content_id}");
            if !no_wait {
                wait_for_close(rx, slot).await?;
            }
        }
        Command::Dispense {
            slot,
            credential,
            no_wait,
        } => {
            controller.dispense(slot, &credential).await?;
            println!("Slot {slot} unlocked for dispensing");
            if !no_wait {
                wait_for_close(rx, slot).await?;
            }
        }
        Command::Reset { slot } => {
            controller.reset_slot(slot).await?;
            println!("Slot {slot} reset");
        }
        Command::Deactivate {
            slot,
            all,
            credential,
        } => match (slot, all) {
            (_, true) => {
                let changed = controller.deactivate_all(&credential).await?;
                println!("{changed} slot(s) deactivated");
            }
            (Some(slot), false) => {
                controller.deactivate(slot, &credential).await?;
                println!("Slot {slot} deactivated");
            }
            (None, false) => bail!("name a slot or pass --all"),
        },
        Command::Reactivate { slot, all } => match (slot, all) {
            (_, true) => {
                let changed = controller.reactivate_all().await?;
                println!("{changed} slot(s) reactivated");
            }
            (Some(slot), false) => {
                controller.reactivate(slot).await?;
                println!("Slot {slot} reactivated");
            }
            (None, false) => bail!("name a slot or pass --all"),
        },
        Command::Watch => watch(controller, rx).await?,
        Command::Simulate { .. } => bail!("simulate does not use a controller"),
    }
    Ok(())
}

/// Block until the door of `slot` is shut again, or Ctrl-C.
async fn wait_for_close(rx: &mut mpsc::Receiver<ControllerEvent>, slot: SlotId) -> Result<()> {
    println!("Waiting for slot {slot} to close (Ctrl-C to stop waiting)");
    loop {
        tokio::select! {
            event = rx.recv() => match event {
                Some(ControllerEvent::SlotClosed { slot: closed, occupied }) if closed == slot => {
                    let content = if occupied { "occupied" } else { "empty" };
                    println!("Slot {slot} closed, {content}");
                    return Ok(());
                }
                Some(ControllerEvent::Error { kind, message }) => {
                    warn!(?kind, %message, "Controller error while waiting");
                }
                Some(_) => {}
                None => bail!("controller stopped"),
            },
            _ = tokio::signal::ctrl_c() => {
                println!("Stopped waiting; slot {slot} is still being watched by the controller");
                return Ok(());
            }
        }
    }
}

/// Print events as JSON lines until Ctrl-C.
async fn watch(controller: &AnyController, rx: &mut mpsc::Receiver<ControllerEvent>) -> Result<()> {
    if let Err(e) = controller.send_check_state().await {
        warn!(error = %e, "Initial status check failed");
    }
    let mut stdout = std::io::stdout();
    loop {
        tokio::select! {
            event = rx.recv() => {
                let Some(event) = event else {
                    bail!("controller stopped");
                };
                serde_json::to_writer(&mut stdout, &event)?;
                writeln!(stdout)?;
                stdout.flush()?;
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Interrupted");
                return Ok(());
            }
        }
    }
}

fn print_table(slots: &[SlotSnapshot]) -> Result<()> {
    let mut out = std::io::stdout().lock();
    writeln!(
        out,
        "{:>4}  {:<28}  {:<7}  {:<8}  {:<6}  CONTENT",
        "SLOT", "STATE", "LOCK", "OCCUPIED", "ACTIVE"
    )?;
    for row in slots.iter().map(format_row) {
        writeln!(out, "{row}")?;
    }
    Ok(())
}

fn format_row(slot: &SlotSnapshot) -> String {
    let lock = match slot.closed {
        Some(true) => "closed",
        Some(false) => "open",
        None => "?",
    };
    format!(
        "{:>4}  {:<28}  {:<7}  {:<8}  {:<6}  {}",
        slot.slot.get(),
        slot.state.to_string(),
        lock,
        if slot.occupied { "yes" } else { "no" },
        if slot.active { "yes" } else { "no" },
        slot.content_id.as_deref().unwrap_or("-"),
    )
}
