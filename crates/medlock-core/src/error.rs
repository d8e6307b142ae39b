use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Invalid slot id: {0}")]
    InvalidSlotId(String),

    #[error("Invalid protocol variant: {0}")]
    InvalidProtocol(String),

    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Missing configuration key: {0}")]
    MissingConfig(String),

    #[error("Configuration parse error: {0}")]
    ConfigParse(#[from] serde_json::Error),

    // IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
