//! Error types for the bistro bridge

use thiserror::Error;

/// Result type alias for bridge operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in the bistro bridge
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// Audio capture or conversion error
    #[error("audio error: {0}")]
    Audio(String),

    /// Transport chunking error
    #[error("chunk error: {0}")]
    Chunk(String),

    /// Control envelope error
    #[error("protocol error: {0}")]
    Protocol(String),

    /// Speech engine error
    #[error("engine error: {0}")]
    Engine(String),

    /// Session lifecycle error
    #[error("session error: {0}")]
    Session(String),

    /// Playback scheduling error
    #[error("playback error: {0}")]
    Playback(String),

    /// IO error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// WebSocket error
    #[error("websocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// TOML parsing error
    #[error("toml error: {0}")]
    Toml(#[from] toml::de::Error),
}
