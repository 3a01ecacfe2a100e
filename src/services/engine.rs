//! The engine actor: one task owns the round machine, executes its effects,
//! and publishes snapshots.
//!
//! All protocol handlers and state updates run on this single logical
//! thread; timers and acknowledgment waiters re-enter only through message
//! channels, so handlers never interleave. Dropping the [`EngineHandle`]
//! stops the task and cancels every outstanding timer, which is the
//! resource-cleanup contract for a screen unmounting.

use std::{
    sync::Arc,
    time::{Duration, SystemTime, UNIX_EPOCH},
};

use tokio::{
    sync::{mpsc, watch},
    task::JoinHandle,
    time::{sleep, timeout},
};
use tokio_stream::wrappers::WatchStream;
use tracing::{debug, warn};

use crate::{
    config::EngineConfig,
    dto::{
        actions::{AckResponse, ActionKind, ClientAction},
        events::ServerEvent,
        snapshot::EngineSnapshot,
    },
    error::EngineError,
    services::timer::{TimerSlots, TimerTick},
    state::machine::{Effect, RoundMachine},
    transport::Transport,
};

/// Commands sent from the UI into the engine task.
enum EngineCommand {
    PressBuzzer,
    SubmitAnswer { selected_index: usize },
    Shutdown,
}

/// Messages spawned helper tasks feed back into the engine.
enum InternalMsg {
    Ack {
        kind: ActionKind,
        event_id: String,
        outcome: AckOutcome,
    },
    ClearBuzzDisplay,
}

/// How an acknowledgment wait concluded.
enum AckOutcome {
    Response(AckResponse),
    TimedOut,
    ChannelClosed,
}

/// Owning handle to a running engine. The UI talks to the engine
/// exclusively through this.
pub struct EngineHandle {
    commands_tx: mpsc::UnboundedSender<EngineCommand>,
    snapshot_rx: watch::Receiver<EngineSnapshot>,
    task: JoinHandle<()>,
}

impl EngineHandle {
    /// Request a buzzer press. Suppressed silently when disconnected,
    /// blocked, or already in flight.
    pub fn press_buzzer(&self) -> Result<(), EngineError> {
        self.commands_tx
            .send(EngineCommand::PressBuzzer)
            .map_err(|_| EngineError::Stopped)
    }

    /// Request an answer submission for the given option index.
    pub fn submit_answer(&self, selected_index: usize) -> Result<(), EngineError> {
        self.commands_tx
            .send(EngineCommand::SubmitAnswer { selected_index })
            .map_err(|_| EngineError::Stopped)
    }

    /// Latest published snapshot.
    pub fn snapshot(&self) -> EngineSnapshot {
        self.snapshot_rx.borrow().clone()
    }

    /// Subscribe to snapshot changes.
    pub fn watch(&self) -> watch::Receiver<EngineSnapshot> {
        self.snapshot_rx.clone()
    }

    /// Snapshot changes as an async stream.
    pub fn snapshot_stream(&self) -> WatchStream<EngineSnapshot> {
        WatchStream::new(self.snapshot_rx.clone())
    }

    /// Stop the engine and wait for the task to unwind. Dropping the handle
    /// without calling this also stops the engine, just without waiting.
    pub async fn shutdown(self) {
        let _ = self.commands_tx.send(EngineCommand::Shutdown);
        let _ = self.task.await;
    }
}

/// Start an engine bound to one game screen/session.
pub fn spawn(
    config: EngineConfig,
    transport: Arc<dyn Transport>,
    events: mpsc::UnboundedReceiver<ServerEvent>,
) -> EngineHandle {
    let (commands_tx, commands_rx) = mpsc::unbounded_channel();
    let (ticks_tx, ticks_rx) = mpsc::unbounded_channel();
    let (internal_tx, internal_rx) = mpsc::unbounded_channel();

    let machine = RoundMachine::new(
        config.room_code.clone(),
        config.user_id.clone(),
        config.buzz_clear_delay.as_millis() as u64,
    );
    let (snapshot_tx, snapshot_rx) = watch::channel(machine.snapshot());

    let engine = Engine {
        config,
        transport,
        machine,
        timers: TimerSlots::default(),
        events,
        commands: commands_rx,
        ticks: ticks_rx,
        ticks_tx,
        internal: internal_rx,
        internal_tx,
        snapshot_tx,
    };
    let task = tokio::spawn(engine.run());

    EngineHandle {
        commands_tx,
        snapshot_rx,
        task,
    }
}

struct Engine {
    config: EngineConfig,
    transport: Arc<dyn Transport>,
    machine: RoundMachine,
    timers: TimerSlots,
    events: mpsc::UnboundedReceiver<ServerEvent>,
    commands: mpsc::UnboundedReceiver<EngineCommand>,
    ticks: mpsc::UnboundedReceiver<TimerTick>,
    ticks_tx: mpsc::UnboundedSender<TimerTick>,
    internal: mpsc::UnboundedReceiver<InternalMsg>,
    internal_tx: mpsc::UnboundedSender<InternalMsg>,
    snapshot_tx: watch::Sender<EngineSnapshot>,
}

impl Engine {
    async fn run(mut self) {
        loop {
            tokio::select! {
                maybe_event = self.events.recv() => match maybe_event {
                    Some(event) => self.handle_event(event),
                    None => {
                        debug!("event channel closed; stopping engine");
                        break;
                    }
                },
                maybe_command = self.commands.recv() => match maybe_command {
                    Some(EngineCommand::PressBuzzer) => self.dispatch_button_press(),
                    Some(EngineCommand::SubmitAnswer { selected_index }) => {
                        self.dispatch_answer(selected_index)
                    }
                    Some(EngineCommand::Shutdown) | None => break,
                },
                Some(tick) = self.ticks.recv() => {
                    self.machine.on_tick(tick.purpose, tick.remaining_ms);
                }
                Some(message) = self.internal.recv() => self.handle_internal(message),
            }
            self.publish();
        }
        self.timers.cancel_all();
    }

    fn handle_event(&mut self, event: ServerEvent) {
        let effects = self.machine.apply(&event, wall_clock_ms());
        for effect in effects {
            match effect {
                Effect::StartCountdown {
                    purpose,
                    remaining_ms,
                    duration_ms: _,
                } => {
                    self.timers.start(
                        purpose,
                        Duration::from_millis(remaining_ms),
                        self.config.tick_interval,
                        self.ticks_tx.clone(),
                    );
                }
                Effect::CancelCountdown(purpose) => self.timers.cancel(purpose),
                Effect::CancelAllCountdowns => self.timers.cancel_all(),
                Effect::ClearBuzzDisplayAfter { delay_ms } => {
                    let internal_tx = self.internal_tx.clone();
                    tokio::spawn(async move {
                        sleep(Duration::from_millis(delay_ms)).await;
                        let _ = internal_tx.send(InternalMsg::ClearBuzzDisplay);
                    });
                }
            }
        }
    }

    fn dispatch_button_press(&mut self) {
        if !self.transport.is_connected() {
            debug!("transport disconnected; dropping buzzer press");
            return;
        }
        match self.machine.begin_button_press(wall_clock_ms()) {
            Ok(action) => self.emit(action),
            Err(reason) => debug!(%reason, "buzzer press suppressed"),
        }
    }

    fn dispatch_answer(&mut self, selected_index: usize) {
        if !self.transport.is_connected() {
            debug!("transport disconnected; dropping answer");
            return;
        }
        match self.machine.begin_answer(selected_index, wall_clock_ms()) {
            Ok(action) => self.emit(action),
            Err(reason) => debug!(%reason, "answer suppressed"),
        }
    }

    /// Send an action and wait for its acknowledgment off the engine
    /// thread. The in-flight slot is released only when the outcome comes
    /// back in, never by the emit itself.
    fn emit(&self, action: ClientAction) {
        let kind = action.kind();
        let event_id = action.event_id().to_owned();
        let ack_rx = self.transport.emit(action);
        let transport = self.transport.clone();
        let internal_tx = self.internal_tx.clone();
        let ack_timeout = self.config.ack_timeout;

        tokio::spawn(async move {
            let outcome = match ack_timeout {
                Some(limit) => match timeout(limit, ack_rx).await {
                    Ok(Ok(response)) => AckOutcome::Response(response),
                    Ok(Err(_)) => AckOutcome::ChannelClosed,
                    Err(_) => {
                        // The transport will never be asked to resolve this
                        // ack again; let it drop whatever it still holds.
                        transport.abandon(&event_id);
                        AckOutcome::TimedOut
                    }
                },
                None => match ack_rx.await {
                    Ok(response) => AckOutcome::Response(response),
                    Err(_) => AckOutcome::ChannelClosed,
                },
            };
            let _ = internal_tx.send(InternalMsg::Ack {
                kind,
                event_id,
                outcome,
            });
        });
    }

    fn handle_internal(&mut self, message: InternalMsg) {
        match message {
            InternalMsg::Ack {
                kind,
                event_id,
                outcome,
            } => {
                // Success or failure alike releases the slot; the next
                // authoritative round event is the source of truth for
                // whether the action counted.
                self.machine.finish_action(kind);
                match outcome {
                    AckOutcome::Response(ack) if ack.ok => {
                        debug!(kind = %kind, event_id = %event_id, "action acknowledged");
                    }
                    AckOutcome::Response(ack) => {
                        warn!(
                            kind = %kind,
                            event_id = %event_id,
                            message = ?ack.message,
                            "action rejected by server"
                        );
                    }
                    AckOutcome::TimedOut => {
                        warn!(
                            kind = %kind,
                            event_id = %event_id,
                            "acknowledgment timed out; releasing in-flight slot"
                        );
                    }
                    AckOutcome::ChannelClosed => {
                        warn!(
                            kind = %kind,
                            event_id = %event_id,
                            "transport dropped the acknowledgment"
                        );
                    }
                }
            }
            InternalMsg::ClearBuzzDisplay => self.machine.clear_buzz_display(),
        }
    }

    fn publish(&self) {
        let next = self.machine.snapshot();
        self.snapshot_tx.send_if_modified(|current| {
            if *current == next {
                return false;
            }
            *current = next;
            true
        });
    }
}

/// Wall clock in epoch milliseconds, matching the server's timestamps.
fn wall_clock_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

#[cfg(test)]
mod tests {
    use std::sync::{
        Mutex,
        atomic::{AtomicBool, Ordering},
    };

    use tokio::sync::oneshot;

    use super::*;
    use crate::state::phase::RoundPhase;

    #[derive(Default)]
    struct FakeTransport {
        disconnected: AtomicBool,
        emitted: Mutex<Vec<serde_json::Value>>,
        pending_acks: Mutex<Vec<oneshot::Sender<AckResponse>>>,
        abandoned: Mutex<Vec<String>>,
    }

    impl FakeTransport {
        fn emit_count(&self) -> usize {
            self.emitted.lock().unwrap().len()
        }

        fn ack_next(&self, response: AckResponse) {
            let sender = self.pending_acks.lock().unwrap().remove(0);
            let _ = sender.send(response);
        }
    }

    impl Transport for FakeTransport {
        fn is_connected(&self) -> bool {
            !self.disconnected.load(Ordering::SeqCst)
        }

        fn emit(&self, action: ClientAction) -> oneshot::Receiver<AckResponse> {
            let (tx, rx) = oneshot::channel();
            self.emitted
                .lock()
                .unwrap()
                .push(serde_json::to_value(&action).unwrap());
            self.pending_acks.lock().unwrap().push(tx);
            rx
        }

        fn abandon(&self, event_id: &str) {
            self.abandoned.lock().unwrap().push(event_id.to_owned());
        }
    }

    fn show_question(sequence: u64, read_ms: u64) -> ServerEvent {
        serde_json::from_value(serde_json::json!({
            "event": "round:showQuestion",
            "data": {"roundSequence": sequence, "questionText": "Q?", "readMs": read_ms}
        }))
        .unwrap()
    }

    fn open_button(sequence: u64, press_window_ms: u64) -> ServerEvent {
        serde_json::from_value(serde_json::json!({
            "event": "round:openButton",
            "data": {"roundSequence": sequence, "pressWindowMs": press_window_ms}
        }))
        .unwrap()
    }

    async fn wait_until(mut rx: watch::Receiver<EngineSnapshot>, pred: impl Fn(&EngineSnapshot) -> bool) {
        let deadline = Duration::from_secs(2);
        let waited = timeout(deadline, async {
            loop {
                if pred(&rx.borrow()) {
                    return;
                }
                rx.changed().await.expect("engine stopped");
            }
        })
        .await;
        waited.expect("condition not reached in time");
    }

    async fn wait_for(pred: impl Fn() -> bool) {
        let waited = timeout(Duration::from_secs(2), async {
            while !pred() {
                sleep(Duration::from_millis(10)).await;
            }
        })
        .await;
        waited.expect("condition not reached in time");
    }

    fn start_engine() -> (
        EngineHandle,
        Arc<FakeTransport>,
        mpsc::UnboundedSender<ServerEvent>,
    ) {
        let transport = Arc::new(FakeTransport::default());
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let config = EngineConfig::new("ROOM42", "u1").unwrap();
        let handle = spawn(config, transport.clone(), events_rx);
        (handle, transport, events_tx)
    }

    #[tokio::test]
    async fn round_flow_updates_published_snapshots() {
        let (handle, _transport, events_tx) = start_engine();

        events_tx.send(show_question(1, 5000)).unwrap();
        wait_until(handle.watch(), |s| s.phase == RoundPhase::Reading).await;
        assert_eq!(handle.snapshot().question_text.as_deref(), Some("Q?"));

        events_tx.send(open_button(1, 3000)).unwrap();
        wait_until(handle.watch(), |s| s.show_buzzer).await;
        assert_eq!(handle.snapshot().timer_duration_ms, 3000);

        handle.shutdown().await;
    }

    #[tokio::test]
    async fn duplicate_press_emits_once_until_acknowledged() {
        let (handle, transport, events_tx) = start_engine();

        events_tx.send(show_question(1, 5000)).unwrap();
        events_tx.send(open_button(1, 3000)).unwrap();
        wait_until(handle.watch(), |s| s.show_buzzer).await;

        handle.press_buzzer().unwrap();
        handle.press_buzzer().unwrap();
        wait_for(|| transport.emit_count() >= 1).await;
        // Let the engine drain the second command before asserting.
        sleep(Duration::from_millis(50)).await;
        assert_eq!(transport.emit_count(), 1, "in-flight guard must gate");

        // A failed ack still releases the slot.
        transport.ack_next(AckResponse {
            ok: false,
            message: Some("too late".into()),
            correct: None,
        });
        wait_for(|| {
            handle.press_buzzer().unwrap();
            transport.emit_count() >= 2
        })
        .await;

        handle.shutdown().await;
    }

    #[tokio::test]
    async fn dispatch_while_disconnected_is_a_noop() {
        let (handle, transport, events_tx) = start_engine();
        events_tx.send(show_question(1, 5000)).unwrap();
        events_tx.send(open_button(1, 3000)).unwrap();
        wait_until(handle.watch(), |s| s.show_buzzer).await;

        transport.disconnected.store(true, Ordering::SeqCst);
        handle.press_buzzer().unwrap();
        sleep(Duration::from_millis(50)).await;
        assert_eq!(transport.emit_count(), 0);

        handle.shutdown().await;
    }

    #[tokio::test]
    async fn ack_timeout_releases_the_in_flight_slot() {
        let transport = Arc::new(FakeTransport::default());
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let config = EngineConfig::new("ROOM42", "u1")
            .unwrap()
            .with_ack_timeout(Some(Duration::from_millis(50)));
        let handle = spawn(config, transport.clone(), events_rx);

        events_tx.send(show_question(1, 5000)).unwrap();
        events_tx.send(open_button(1, 3000)).unwrap();
        wait_until(handle.watch(), |s| s.show_buzzer).await;

        handle.press_buzzer().unwrap();
        wait_for(|| transport.emit_count() == 1).await;

        // No ack ever arrives; after the timeout a new press goes through.
        wait_for(|| {
            handle.press_buzzer().unwrap();
            transport.emit_count() >= 2
        })
        .await;

        // The timed-out emit is also handed back to the transport so it can
        // release anything still held for it.
        let timed_out_id = transport.emitted.lock().unwrap()[0]["data"]["eventId"]
            .as_str()
            .unwrap()
            .to_owned();
        wait_for(|| transport.abandoned.lock().unwrap().contains(&timed_out_id)).await;

        handle.shutdown().await;
    }

    #[tokio::test]
    async fn commands_after_shutdown_report_stopped() {
        let (handle, _transport, _events_tx) = start_engine();
        let probe = EngineHandle {
            commands_tx: handle.commands_tx.clone(),
            snapshot_rx: handle.snapshot_rx.clone(),
            task: tokio::spawn(async {}),
        };
        handle.shutdown().await;
        wait_for(|| probe.press_buzzer().is_err()).await;
        assert!(matches!(probe.press_buzzer(), Err(EngineError::Stopped)));
    }
}
