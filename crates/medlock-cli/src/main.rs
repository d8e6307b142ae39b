//! `medlock`: bench tool for medication cabinet lock controllers.

mod cli;
mod commands;
mod simulate;
mod store;

use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;

use medlock_controller::MemorySlotStore;
use medlock_core::ControllerConfig;

use crate::cli::{Cli, Command};
use crate::simulate::SimulateOptions;
use crate::store::JsonSlotStore;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::builder()
                .with_default_directive(if cli.verbose {
                    tracing::Level::DEBUG.into()
                } else {
                    tracing::Level::INFO.into()
                })
                .from_env_lossy(),
        )
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber).context("setting default subscriber")?;

    let config = ControllerConfig::from_json_file(&cli.config)
        .with_context(|| format!("loading {}", cli.config.display()))?;
    info!(
        version = medlock_core::VERSION,
        config = %cli.config.display(),
        variant = %config.protocol,
        slots = config.slot_count,
        link = %config.link.describe(),
        "Configuration loaded"
    );

    match cli.command {
        Command::Simulate {
            listen,
            refuse,
            auto_close_ms,
        } => {
            let options = SimulateOptions {
                listen,
                refuse,
                auto_close: auto_close_ms.map(Duration::from_millis),
            };
            simulate::run(&config, options).await
        }
        command => match cli.state {
            Some(path) => {
                commands::run(config, JsonSlotStore::new(path), cli.operator, command).await
            }
            None => commands::run(config, MemorySlotStore::new(), cli.operator, command).await,
        },
    }
}
