//! UI-facing snapshot published by the engine on every state change.

use indexmap::IndexMap;
use serde::Serialize;

use crate::state::{
    game::{Player, Winner},
    phase::RoundPhase,
};

/// Everything a game screen needs to render, derived from the engine's
/// round and game state. Consumers receive it through a watch channel, so
/// each value is a complete, self-consistent view.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EngineSnapshot {
    /// Current round phase.
    pub phase: RoundPhase,
    /// Tracked round sequence, `None` before the first round.
    pub round_sequence: Option<u64>,
    /// Question text of the active round.
    pub question_text: Option<String>,
    /// Answer options of the active round.
    pub answer_options: Vec<String>,
    /// Whether the buzzer control should be shown.
    pub show_buzzer: bool,
    /// Whether a player has claimed the buzzer.
    pub buzzer_pressed: bool,
    /// Whether answer options should be shown.
    pub show_answer_options: bool,
    /// Whether the local player is blocked from buzzing this round.
    pub is_blocked: bool,
    /// Display name of the player holding the buzzer.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub player_who_pressed: Option<String>,
    /// Remaining time of the active window in milliseconds.
    pub remaining_ms: u64,
    /// Full window duration in milliseconds, floored to 1.
    pub timer_duration_ms: u64,
    /// Current roster in server order.
    pub players: Vec<Player>,
    /// Current scores keyed by user id.
    pub scores: IndexMap<String, i64>,
    /// Number of the question currently on screen (0 before the first).
    pub current_question_index: u64,
    /// Total questions in the game.
    pub total_questions: u64,
    /// Whether the game reached its terminal state.
    pub ended: bool,
    /// Winner, present once the game has ended.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub winner: Option<Winner>,
}

impl EngineSnapshot {
    /// Remaining whole seconds for second-granularity displays.
    pub fn remaining_secs(&self) -> u64 {
        self.remaining_ms / 1000
    }

    /// Progress of the active window as a percentage in `0.0..=100.0`.
    pub fn progress_percent(&self) -> f64 {
        let denominator = self.timer_duration_ms.max(1) as f64;
        (self.remaining_ms as f64 / denominator * 100.0).clamp(0.0, 100.0)
    }
}
