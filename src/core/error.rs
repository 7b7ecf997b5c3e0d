//! Error types for the Orrery engine

use thiserror::Error;

use crate::persist::GatewayError;

/// Main error type for the engine
#[derive(Debug, Error)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Config error: {0}")]
    Config(String),

    #[error("Invalid cell key: {0:?}")]
    InvalidCellKey(String),

    #[error("Gateway error: {0}")]
    Gateway(#[from] GatewayError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Streaming error: {0}")]
    Streaming(String),
}
