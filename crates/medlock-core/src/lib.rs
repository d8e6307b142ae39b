//! Shared building blocks for the medlock workspace: slot identifiers, protocol
//! constants, deployment configuration and the core error type.

pub mod config;
pub mod constants;
pub mod error;
pub mod types;

pub use config::{ControllerConfig, LinkConfig};
pub use error::{Error, Result};
pub use types::*;

/// Version info
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
