//! Per-round state, recreated whenever a new round opens.

use std::collections::HashSet;

use serde::Serialize;

use crate::state::phase::RoundPhase;

/// Player currently holding the buzzer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BuzzedPlayer {
    /// Identifier of the player.
    pub id: String,
    /// Display name of the player.
    pub name: String,
}

/// State of the round currently on screen. Owned exclusively by the
/// reducer; mutated only through inbound events or dispatched actions.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RoundState {
    /// Tracked authoritative round sequence, `None` before the first round.
    pub round_sequence: Option<u64>,
    /// Current phase.
    pub phase: RoundPhase,
    /// Question text for the active round.
    pub question_text: Option<String>,
    /// Answer options for the active round.
    pub answer_options: Vec<String>,
    /// Full duration of the active phase window, the progress denominator.
    pub timer_duration_ms: u64,
    /// Latest remaining time reported by the active countdown.
    pub remaining_ms: u64,
    /// Player who won the buzzer race, if any.
    pub player_who_buzzed: Option<BuzzedPlayer>,
    /// Players disqualified from buzzing for this round.
    pub blocked_user_ids: HashSet<String>,
}

impl RoundState {
    /// Fresh state for a newly opened round, clearing every per-round flag.
    pub fn open(round_sequence: u64, question_text: String, read_ms: u64) -> Self {
        Self {
            round_sequence: Some(round_sequence),
            phase: RoundPhase::Reading,
            question_text: Some(question_text),
            answer_options: Vec::new(),
            timer_duration_ms: read_ms,
            remaining_ms: read_ms,
            player_who_buzzed: None,
            blocked_user_ids: HashSet::new(),
        }
    }

    /// Progress denominator, floored to 1 so a zero-length window cannot
    /// divide by zero.
    pub fn progress_denominator_ms(&self) -> u64 {
        self.timer_duration_ms.max(1)
    }
}
