//! Deployment configuration.
//!
//! The configuration is read once at start-up and treated as immutable for the
//! life of the process; changing it requires restarting the engine.
//!
//! ```
//! use medlock_core::{ControllerConfig, LinkConfig, ProtocolVariant};
//!
//! let json = r#"{
//!     "protocol": "multi_board",
//!     "link": { "kind": "tcp", "host": "10.0.0.20", "port": 4001 },
//!     "slot_count": 15
//! }"#;
//!
//! let config = ControllerConfig::from_json_str(json).unwrap();
//! assert_eq!(config.protocol, ProtocolVariant::MultiBoard);
//! assert!(matches!(config.link, LinkConfig::Tcp { port: 4001, .. }));
//! assert_eq!(config.settle_delay().as_millis(), 1000);
//! ```

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::constants::{
    DEFAULT_BAUD_RATE, DEFAULT_BOARD_ADDRESSES, DEFAULT_COMMAND_TIMEOUT_MS,
    DEFAULT_CONNECT_TIMEOUT_MS, DEFAULT_SETTLE_DELAY_MS, SINGLE_BOARD_MAX_DEVICE_ADDRESS,
};
use crate::{Error, ProtocolVariant, Result};

/// Physical link to the lock controller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum LinkConfig {
    /// RS-485 adapter exposed as a serial device (8N1).
    Serial {
        /// Device path, e.g. `/dev/ttyUSB0` or `COM3`.
        path: String,

        /// Line speed.
        #[serde(default = "default_baud_rate")]
        baud_rate: u32,
    },

    /// Serial-to-Ethernet bridge.
    Tcp {
        /// Bridge host name or address.
        host: String,

        /// Bridge port.
        port: u16,
    },
}

impl LinkConfig {
    /// Short human readable description used in logs.
    pub fn describe(&self) -> String {
        match self {
            Self::Serial { path, baud_rate } => format!("serial {path}@{baud_rate}"),
            Self::Tcp { host, port } => format!("tcp {host}:{port}"),
        }
    }
}

fn default_baud_rate() -> u32 {
    DEFAULT_BAUD_RATE
}

fn default_board_addresses() -> [u8; 2] {
    DEFAULT_BOARD_ADDRESSES
}

fn default_command_timeout_ms() -> u64 {
    DEFAULT_COMMAND_TIMEOUT_MS
}

fn default_connect_timeout_ms() -> u64 {
    DEFAULT_CONNECT_TIMEOUT_MS
}

fn default_settle_delay_ms() -> u64 {
    DEFAULT_SETTLE_DELAY_MS
}

/// Per-deployment controller configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ControllerConfig {
    /// Wire protocol of the installed hardware.
    pub protocol: ProtocolVariant,

    /// How to reach the hardware.
    pub link: LinkConfig,

    /// Number of slots in this cabinet.
    pub slot_count: u8,

    /// Variant A device address (0-15).
    #[serde(default)]
    pub device_address: u8,

    /// Variant B board addresses, first board then second board.
    #[serde(default = "default_board_addresses")]
    pub board_addresses: [u8; 2],

    /// Reply budget for a single command.
    #[serde(default = "default_command_timeout_ms")]
    pub command_timeout_ms: u64,

    /// Budget for establishing a TCP connection.
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,

    /// Delay before the follow-up status recheck after a state-advancing command.
    #[serde(default = "default_settle_delay_ms")]
    pub settle_delay_ms: u64,

    /// Fixed back-off between reconnection attempts. `None` disables reconnection.
    #[serde(default)]
    pub reconnect_interval_ms: Option<u64>,
}

impl ControllerConfig {
    /// Create a configuration with default timings.
    pub fn new(protocol: ProtocolVariant, link: LinkConfig, slot_count: u8) -> Self {
        Self {
            protocol,
            link,
            slot_count,
            device_address: 0,
            board_addresses: DEFAULT_BOARD_ADDRESSES,
            command_timeout_ms: DEFAULT_COMMAND_TIMEOUT_MS,
            connect_timeout_ms: DEFAULT_CONNECT_TIMEOUT_MS,
            settle_delay_ms: DEFAULT_SETTLE_DELAY_MS,
            reconnect_interval_ms: None,
        }
    }

    /// Parse and validate a JSON configuration document.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a JSON configuration file.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_json_str(&contents)
    }

    /// Check the configuration for values the hardware cannot honour.
    ///
    /// # Errors
    /// Returns `Error::Config` on a zero or oversized slot count, a device
    /// address that does not fit its nibble, duplicate board addresses, or a
    /// zero command timeout.
    pub fn validate(&self) -> Result<()> {
        let max = self.protocol.max_slots();
        if self.slot_count == 0 || self.slot_count > max {
            return Err(Error::Config(format!(
                "slot_count must be 1-{max} for {}, got {}",
                self.protocol, self.slot_count
            )));
        }

        if self.device_address > SINGLE_BOARD_MAX_DEVICE_ADDRESS {
            return Err(Error::Config(format!(
                "device_address must be 0-{SINGLE_BOARD_MAX_DEVICE_ADDRESS}, got {}",
                self.device_address
            )));
        }

        if self.board_addresses[0] == self.board_addresses[1] {
            return Err(Error::Config(format!(
                "board addresses must differ, both are {:#04x}",
                self.board_addresses[0]
            )));
        }

        if self.command_timeout_ms == 0 {
            return Err(Error::Config("command_timeout_ms must be non-zero".into()));
        }

        if let LinkConfig::Serial { path, .. } = &self.link
            && path.trim().is_empty()
        {
            return Err(Error::MissingConfig("link.path".into()));
        }

        Ok(())
    }

    pub fn command_timeout(&self) -> Duration {
        Duration::from_millis(self.command_timeout_ms)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.settle_delay_ms)
    }

    pub fn reconnect_interval(&self) -> Option<Duration> {
        self.reconnect_interval_ms.map(Duration::from_millis)
    }
}
