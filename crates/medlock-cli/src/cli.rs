use std::net::SocketAddr;
use std::path::PathBuf;

use clap::{Parser, Subcommand};

use medlock_core::SlotId;

#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "Medication cabinet lock controller bench tool",
    long_about = None
)]
pub struct Cli {
    /// Deployment configuration (JSON)
    #[arg(short, long, default_value = "medlock.json")]
    pub config: PathBuf,

    /// Slot records file; slot state is kept in memory when omitted
    #[arg(long)]
    pub state: Option<PathBuf>,

    /// Credential accepted for dispense and deactivate
    #[arg(long)]
    pub operator: Option<String>,

    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Query every board and print the slot table
    Status,

    /// Unlock an idle slot for loading
    Unlock {
        slot: SlotId,

        /// What is being loaded (e.g. a patient HN)
        content_id: String,

        /// Return once unlocked instead of waiting for the door to close
        #[arg(long)]
        no_wait: bool,
    },

    /// Unlock an occupied slot for removal
    Dispense {
        slot: SlotId,

        #[arg(long)]
        credential: String,

        /// Return once unlocked instead of waiting for the door to close
        #[arg(long)]
        no_wait: bool,
    },

    /// Return a slot to idle
    Reset { slot: SlotId },

    /// Take a slot out of service, or every slot with --all
    Deactivate {
        slot: Option<SlotId>,

        #[arg(long)]
        all: bool,

        #[arg(long)]
        credential: String,
    },

    /// Return a slot to service, or every slot with --all
    Reactivate {
        slot: Option<SlotId>,

        #[arg(long)]
        all: bool,
    },

    /// Stay connected and print controller events as JSON lines
    Watch,

    /// Serve simulated boards over TCP for the configured protocol
    Simulate {
        #[arg(long, default_value = "127.0.0.1:4001")]
        listen: SocketAddr,

        /// Refuse every unlock
        #[arg(long)]
        refuse: bool,

        /// Close unlocked doors again after this many milliseconds
        #[arg(long)]
        auto_close_ms: Option<u64>,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_unlock() {
        let cli = Cli::try_parse_from(["medlock", "unlock", "4", "HN-2231"]).unwrap();
        match cli.command {
            Command::Unlock {
                slot,
                content_id,
                no_wait,
            } => {
                assert_eq!(slot.get(), 4);
                assert_eq!(content_id, "HN-2231");
                assert!(!no_wait);
            }
            other => panic!("unexpected command: {other:?}"),
        }
        assert_eq!(cli.config, PathBuf::from("medlock.json"));
    }

    #[test]
    fn test_rejects_slot_zero() {
        assert!(Cli::try_parse_from(["medlock", "reset", "0"]).is_err());
    }

    #[test]
    fn test_parse_simulate() {
        let cli = Cli::try_parse_from([
            "medlock",
            "--config",
            "cabinet.json",
            "simulate",
            "--listen",
            "0.0.0.0:5000",
            "--auto-close-ms",
            "1500",
        ])
        .unwrap();
        assert!(matches!(
            cli.command,
            Command::Simulate {
                auto_close_ms: Some(1500),
                refuse: false,
                ..
            }
        ));
    }

    #[test]
    fn test_verify_command_tree() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }
}
