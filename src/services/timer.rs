//! Countdown timers reconstructing server-provided deadlines locally.

use std::time::Duration;

use tokio::{
    sync::mpsc,
    task::JoinHandle,
    time::{Instant, MissedTickBehavior, interval},
};

use crate::state::phase::TimerPurpose;

/// One remaining-time report from a running countdown.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimerTick {
    /// Slot the countdown runs in.
    pub purpose: TimerPurpose,
    /// Time left, never negative; the final tick is exactly 0.
    pub remaining_ms: u64,
}

/// Handle to a running countdown task. Dropping it cancels delivery, so a
/// slot being overwritten or the engine task unwinding stops the ticks.
#[derive(Debug)]
pub struct Countdown {
    handle: JoinHandle<()>,
}

impl Countdown {
    /// Spawn a countdown that reports `remaining_ms` on `tick_tx` at the
    /// given cadence, starting immediately, until it delivers a final zero
    /// tick and stops itself.
    pub fn start(
        purpose: TimerPurpose,
        remaining: Duration,
        cadence: Duration,
        tick_tx: mpsc::UnboundedSender<TimerTick>,
    ) -> Self {
        let deadline = Instant::now() + remaining;
        let handle = tokio::spawn(async move {
            let mut ticker = interval(cadence.max(Duration::from_millis(1)));
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                ticker.tick().await;
                let remaining_ms =
                    deadline.saturating_duration_since(Instant::now()).as_millis() as u64;
                if tick_tx
                    .send(TimerTick {
                        purpose,
                        remaining_ms,
                    })
                    .is_err()
                {
                    break;
                }
                if remaining_ms == 0 {
                    break;
                }
            }
        });
        Self { handle }
    }

    /// Stop delivery deterministically. A no-op on an already-finished
    /// countdown.
    pub fn cancel(&self) {
        self.handle.abort();
    }
}

impl Drop for Countdown {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

/// The engine's two countdown slots. Starting a slot replaces and thereby
/// cancels whatever ran in it before, synchronously with the transition.
#[derive(Debug, Default)]
pub struct TimerSlots {
    read: Option<Countdown>,
    answer: Option<Countdown>,
}

impl TimerSlots {
    /// Start (or restart) the countdown for a purpose.
    pub fn start(
        &mut self,
        purpose: TimerPurpose,
        remaining: Duration,
        cadence: Duration,
        tick_tx: mpsc::UnboundedSender<TimerTick>,
    ) {
        *self.slot_mut(purpose) = Some(Countdown::start(purpose, remaining, cadence, tick_tx));
    }

    /// Cancel the countdown for one purpose.
    pub fn cancel(&mut self, purpose: TimerPurpose) {
        *self.slot_mut(purpose) = None;
    }

    /// Cancel every outstanding countdown.
    pub fn cancel_all(&mut self) {
        self.read = None;
        self.answer = None;
    }

    fn slot_mut(&mut self, purpose: TimerPurpose) -> &mut Option<Countdown> {
        match purpose {
            TimerPurpose::Read => &mut self.read,
            TimerPurpose::Answer => &mut self.answer,
        }
    }
}
