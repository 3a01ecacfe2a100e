//! Error types shared across the engine and its transport adapters.

use thiserror::Error;

/// Errors that can occur when constructing or driving the sync engine.
#[derive(Debug, Error)]
pub enum EngineError {
    /// The room code supplied at construction time was empty.
    #[error("missing room code")]
    MissingRoomCode,
    /// The user id supplied at construction time was empty.
    #[error("missing user id")]
    MissingUserId,
    /// The engine task has stopped and no longer accepts commands.
    #[error("engine is no longer running")]
    Stopped,
}

/// Errors surfaced by transport adapters while connecting or sending.
#[derive(Debug, Error)]
pub enum TransportError {
    /// The underlying WebSocket connection could not be established.
    #[error("websocket connection failed: {0}")]
    Connect(#[from] tokio_tungstenite::tungstenite::Error),
    /// The transport was closed while the engine still needed it.
    #[error("transport closed")]
    Closed,
}
