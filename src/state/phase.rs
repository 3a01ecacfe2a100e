//! Round phases and the timer purposes tied to them.

use serde::Serialize;

/// Phase a question round can be in, driven exclusively by inbound events.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RoundPhase {
    /// No round is active yet.
    #[default]
    Idle,
    /// The question is being read; buzzing is not yet possible.
    Reading,
    /// The buzzer window is open.
    ButtonOpen,
    /// Someone won the buzzer race; waiting for the answer window.
    PlayerBuzzed,
    /// Answer options are shown and the answer window is running.
    Answering,
    /// The round result arrived; scores are settled for this round.
    RoundResolved,
    /// The game is over; no further round events are applied.
    GameEnded,
}

impl RoundPhase {
    /// Whether the buzzer control should be shown.
    pub fn show_buzzer(self) -> bool {
        self == RoundPhase::ButtonOpen
    }

    /// Whether a player has claimed the buzzer for this round.
    pub fn buzzer_pressed(self) -> bool {
        self == RoundPhase::PlayerBuzzed
    }

    /// Whether answer options should be shown.
    pub fn show_answer_options(self) -> bool {
        self == RoundPhase::Answering
    }

    /// The countdown slot a tick must match to be applied in this phase.
    /// Stale callbacks from a superseded phase are ignored through this.
    pub fn active_timer(self) -> Option<TimerPurpose> {
        match self {
            RoundPhase::Reading | RoundPhase::ButtonOpen => Some(TimerPurpose::Read),
            RoundPhase::Answering => Some(TimerPurpose::Answer),
            _ => None,
        }
    }
}

/// The two countdown slots the engine owns. Starting a countdown for a
/// purpose cancels any previous countdown of the same purpose.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerPurpose {
    /// Reading window and buzzer window.
    Read,
    /// Answer window.
    Answer,
}
