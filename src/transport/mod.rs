//! Transport boundary: the engine never owns a socket, it is handed an
//! implementation of [`Transport`] plus a channel of inbound events. This
//! keeps the engine testable with a fake transport and leaves connection
//! management (reconnects, toasts) to the surrounding application.

pub mod ws;

use tokio::sync::oneshot;

use crate::dto::actions::{AckResponse, ClientAction};

/// Bidirectional event channel to the game server.
///
/// `emit` is fire-and-forget at the transport level: the returned receiver
/// resolves with the server's acknowledgment, or errs when the transport
/// drops the pending ack (disconnect, serialization failure). The engine
/// treats both the same way and releases the in-flight slot.
pub trait Transport: Send + Sync + 'static {
    /// Whether the channel is currently usable. Dispatching while
    /// disconnected is a silent no-op on the engine side.
    fn is_connected(&self) -> bool;

    /// Send an action and return the handle on which its acknowledgment
    /// will arrive.
    fn emit(&self, action: ClientAction) -> oneshot::Receiver<AckResponse>;

    /// Discard any resources still held for an action whose acknowledgment
    /// the engine stopped waiting for. Called when the ack timeout fires,
    /// so a never-answered emit does not accumulate transport-side state.
    fn abandon(&self, event_id: &str) {
        let _ = event_id;
    }
}
