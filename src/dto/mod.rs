//! Wire payloads exchanged with the game server and UI-facing snapshots.

pub mod actions;
pub mod events;
pub mod player;
pub mod snapshot;
