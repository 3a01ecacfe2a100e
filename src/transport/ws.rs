//! WebSocket implementation of the transport boundary.
//!
//! Frames are JSON envelopes `{ "event": name, "data": payload }` in both
//! directions. The server answers dispatched actions with an
//! `{ "event": "ack", "eventId": ..., "data": { "ok": ... } }` frame, which
//! this adapter correlates back to the matching `emit` call.

use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};

use dashmap::DashMap;
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use tokio::{
    sync::{mpsc, oneshot},
    task::JoinHandle,
};
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{debug, info, warn};

use crate::{
    dto::{
        actions::{AckResponse, ClientAction},
        events::ServerEvent,
    },
    error::TransportError,
    transport::Transport,
};

/// Acknowledgment frame pushed by the server for a dispatched action.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AckFrame {
    event_id: String,
    #[serde(default)]
    data: AckResponse,
}

/// WebSocket-backed [`Transport`]. One instance covers one connection; the
/// surrounding application decides whether and when to reconnect.
pub struct WsTransport {
    outbound_tx: mpsc::UnboundedSender<Message>,
    pending_acks: Arc<DashMap<String, oneshot::Sender<AckResponse>>>,
    connected: Arc<AtomicBool>,
    reader_task: JoinHandle<()>,
    writer_task: JoinHandle<()>,
}

impl WsTransport {
    /// Connect to the game server and return the transport together with
    /// the inbound event channel to hand to the engine.
    pub async fn connect(
        url: &str,
    ) -> Result<(Self, mpsc::UnboundedReceiver<ServerEvent>), TransportError> {
        let (stream, _response) = connect_async(url).await?;
        info!(%url, "websocket connected");
        let (mut sink, mut source) = stream.split();

        let (outbound_tx, mut outbound_rx) = mpsc::unbounded_channel::<Message>();
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let connected = Arc::new(AtomicBool::new(true));
        let pending_acks: Arc<DashMap<String, oneshot::Sender<AckResponse>>> =
            Arc::new(DashMap::new());

        // Dedicated writer task keeps outbound frames flowing even while
        // the reader awaits inbound ones.
        let writer_task = tokio::spawn(async move {
            while let Some(message) = outbound_rx.recv().await {
                if sink.send(message).await.is_err() {
                    break;
                }
            }
        });

        let reader_connected = connected.clone();
        let reader_acks = pending_acks.clone();
        let pong_tx = outbound_tx.clone();
        let reader_task = tokio::spawn(async move {
            while let Some(message) = source.next().await {
                match message {
                    Ok(Message::Text(text)) => route_frame(&text, &reader_acks, &events_tx),
                    Ok(Message::Ping(payload)) => {
                        let _ = pong_tx.send(Message::Pong(payload));
                    }
                    Ok(Message::Close(_)) => {
                        info!("websocket closed by server");
                        break;
                    }
                    Ok(_) => {}
                    Err(err) => {
                        warn!(error = %err, "websocket receive error");
                        break;
                    }
                }
            }
            reader_connected.store(false, Ordering::SeqCst);
            // Dropping the pending senders resolves every waiting emit
            // with a closed-channel outcome.
            reader_acks.clear();
        });

        Ok((
            Self {
                outbound_tx,
                pending_acks,
                connected,
                reader_task,
                writer_task,
            },
            events_rx,
        ))
    }
}

impl Transport for WsTransport {
    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    fn emit(&self, action: ClientAction) -> oneshot::Receiver<AckResponse> {
        let (ack_tx, ack_rx) = oneshot::channel();
        let payload = match serde_json::to_string(&action) {
            Ok(payload) => payload,
            Err(err) => {
                // Serialization failure is permanent; the dropped sender
                // resolves the receiver immediately.
                warn!(error = %err, "failed to serialize action");
                return ack_rx;
            }
        };
        let event_id = action.event_id().to_owned();
        self.pending_acks.insert(event_id.clone(), ack_tx);
        if self.outbound_tx.send(Message::Text(payload)).is_err() {
            self.pending_acks.remove(&event_id);
        }
        ack_rx
    }

    fn abandon(&self, event_id: &str) {
        if self.pending_acks.remove(event_id).is_some() {
            debug!(%event_id, "dropped pending ack for an abandoned action");
        }
    }
}

impl Drop for WsTransport {
    fn drop(&mut self) {
        self.connected.store(false, Ordering::SeqCst);
        self.reader_task.abort();
        self.writer_task.abort();
    }
}

/// Parse one inbound frame and route it to the ack registry or the event
/// channel. Malformed frames are logged and skipped.
fn route_frame(
    text: &str,
    pending_acks: &DashMap<String, oneshot::Sender<AckResponse>>,
    events_tx: &mpsc::UnboundedSender<ServerEvent>,
) {
    let value: serde_json::Value = match serde_json::from_str(text) {
        Ok(value) => value,
        Err(err) => {
            warn!(error = %err, "malformed frame");
            return;
        }
    };

    if value.get("event").and_then(|event| event.as_str()) == Some("ack") {
        match serde_json::from_value::<AckFrame>(value) {
            Ok(frame) => match pending_acks.remove(&frame.event_id) {
                Some((_, sender)) => {
                    let _ = sender.send(frame.data);
                }
                None => debug!(event_id = %frame.event_id, "ack without pending action"),
            },
            Err(err) => warn!(error = %err, "malformed ack frame"),
        }
        return;
    }

    match serde_json::from_value::<ServerEvent>(value) {
        Ok(ServerEvent::Unknown) => debug!("ignoring unknown event"),
        Ok(event) => {
            let _ = events_tx.send(event);
        }
        Err(err) => warn!(error = %err, "malformed event frame"),
    }
}
