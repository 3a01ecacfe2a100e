//! Client-side round synchronization engine for a real-time buzzer trivia
//! game.
//!
//! The engine reconstructs authoritative round state (reading, buzzer
//! window, answer window, result, game end) from a stream of server events
//! that may include duplicates and late arrivals from superseded rounds,
//! rebuilds countdown timers from server-provided end timestamps, gates
//! user actions (buzzer press, answer submit) on server acknowledgments,
//! and reconciles incremental score/player updates. It publishes a derived
//! [`dto::snapshot::EngineSnapshot`] for the UI to render.
//!
//! The transport is injected (see [`transport::Transport`]); a WebSocket
//! adapter ships in [`transport::ws`].

pub mod config;
pub mod dto;
pub mod error;
pub mod services;
pub mod state;
pub mod transport;

pub use config::EngineConfig;
pub use dto::snapshot::EngineSnapshot;
pub use error::{EngineError, TransportError};
pub use services::engine::{EngineHandle, spawn};
pub use transport::Transport;
