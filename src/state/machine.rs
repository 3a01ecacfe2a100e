//! Pure round state machine.
//!
//! All protocol events funnel through [`RoundMachine::apply`], which mutates
//! the owned [`RoundState`]/[`GameState`] and returns the side effects the
//! async engine must execute (countdown starts/cancels, delayed display
//! clears). Keeping the reducer synchronous and effect-returning makes every
//! transition testable without a runtime.
//!
//! Protocol anomalies are never surfaced as errors: a stale or out-of-phase
//! event resolves to "no state change" with a debug log, because duplicate
//! and late delivery is expected steady-state behavior of the transport.

use thiserror::Error;
use tracing::debug;

use crate::{
    dto::{
        actions::{ActionKind, AnswerSubmit, ButtonPress, ClientAction},
        events::{
            AnswerRequest, GameEnded, GameStarted, GameUpdate, OpenButton, PlayerWonButton,
            ResumePhase, RoundResult, ServerEvent, ShowQuestion,
        },
        player::normalize_players,
        snapshot::EngineSnapshot,
    },
    state::{
        game::GameState,
        phase::{RoundPhase, TimerPurpose},
        round::{BuzzedPlayer, RoundState},
    },
};

/// Side effects the engine must execute after a transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    /// Start (or restart) the countdown for a purpose slot.
    StartCountdown {
        /// Slot to run the countdown in.
        purpose: TimerPurpose,
        /// Time left until the window closes.
        remaining_ms: u64,
        /// Full window duration, the progress denominator.
        duration_ms: u64,
    },
    /// Cancel the countdown of one purpose slot.
    CancelCountdown(TimerPurpose),
    /// Cancel every outstanding countdown.
    CancelAllCountdowns,
    /// Clear the buzzed-player display after the given delay.
    ClearBuzzDisplayAfter {
        /// Delay before the display is cleared.
        delay_ms: u64,
    },
}

/// Reasons a user action is suppressed client-side before reaching the
/// transport. These are logged, not surfaced: the UI reflects them through
/// the derived snapshot flags.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DispatchRejected {
    /// No round is open, so there is no sequence to attach.
    #[error("no active round")]
    NoActiveRound,
    /// The local player is blocked from buzzing this round.
    #[error("user is blocked for this round")]
    Blocked,
    /// An action of the same kind is already awaiting its acknowledgment.
    #[error("{0} action already in flight")]
    InFlight(ActionKind),
}

/// In-flight tracking, one slot per action kind. A slot holds the
/// correlation id of the unacknowledged emit.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PendingActions {
    button_press: Option<String>,
    answer_submit: Option<String>,
}

impl PendingActions {
    /// Whether an action of this kind is awaiting its acknowledgment.
    pub fn in_flight(&self, kind: ActionKind) -> bool {
        self.slot(kind).is_some()
    }

    fn slot(&self, kind: ActionKind) -> &Option<String> {
        match kind {
            ActionKind::ButtonPress => &self.button_press,
            ActionKind::AnswerSubmit => &self.answer_submit,
        }
    }

    fn slot_mut(&mut self, kind: ActionKind) -> &mut Option<String> {
        match kind {
            ActionKind::ButtonPress => &mut self.button_press,
            ActionKind::AnswerSubmit => &mut self.answer_submit,
        }
    }
}

/// The synchronous core of the engine: round sequencing, phase transitions,
/// score reconciliation, and acknowledgment gating.
#[derive(Debug, Clone, PartialEq)]
pub struct RoundMachine {
    user_id: String,
    room_code: String,
    buzz_clear_delay_ms: u64,
    round: RoundState,
    game: GameState,
    pending: PendingActions,
}

impl RoundMachine {
    /// Build an idle machine for one user in one room.
    pub fn new(room_code: String, user_id: String, buzz_clear_delay_ms: u64) -> Self {
        Self {
            user_id,
            room_code,
            buzz_clear_delay_ms,
            round: RoundState::default(),
            game: GameState::default(),
            pending: PendingActions::default(),
        }
    }

    /// Current round state.
    pub fn round(&self) -> &RoundState {
        &self.round
    }

    /// Current game state.
    pub fn game(&self) -> &GameState {
        &self.game
    }

    /// Apply one inbound event. `now_ms` is the wall clock in epoch
    /// milliseconds, used to turn absolute end timestamps into remaining
    /// durations.
    pub fn apply(&mut self, event: &ServerEvent, now_ms: u64) -> Vec<Effect> {
        match event {
            ServerEvent::ShowQuestion(payload) => self.on_show_question(payload),
            ServerEvent::OpenButton(payload) => self.on_open_button(payload),
            ServerEvent::PlayerWonButton(payload) => self.on_player_won_button(payload),
            ServerEvent::AnswerRequest(payload) => self.on_answer_request(payload, now_ms),
            ServerEvent::RoundResult(payload) => self.on_round_result(payload),
            ServerEvent::Started(payload) => self.on_started(payload),
            ServerEvent::Ended(payload) => self.on_ended(payload),
            ServerEvent::Update(payload) => self.on_update(payload, now_ms),
            ServerEvent::Unknown => Vec::new(),
        }
    }

    /// Stale-round rejection. `round:showQuestion` never goes through here:
    /// it is the authority that opens a round and updates the tracked
    /// sequence unconditionally.
    fn accept_sequence(&self, event_sequence: u64, event_name: &str) -> bool {
        if self.round.round_sequence == Some(event_sequence) {
            return true;
        }
        debug!(
            event = event_name,
            sequence = event_sequence,
            tracked = ?self.round.round_sequence,
            "dropping event from a stale round"
        );
        false
    }

    /// Phase check for non-opening transitions; mismatches are dropped the
    /// same way stale rounds are.
    fn accept_phase(&self, allowed: &[RoundPhase], event_name: &str) -> bool {
        if allowed.contains(&self.round.phase) {
            return true;
        }
        debug!(
            event = event_name,
            phase = ?self.round.phase,
            "dropping event not applicable to the current phase"
        );
        false
    }

    fn on_show_question(&mut self, payload: &ShowQuestion) -> Vec<Effect> {
        self.round = RoundState::open(
            payload.round_sequence,
            payload.question_text.clone(),
            payload.read_ms,
        );
        self.game.current_question_index = self.game.current_question_index.saturating_add(1);
        vec![
            Effect::CancelCountdown(TimerPurpose::Answer),
            Effect::StartCountdown {
                purpose: TimerPurpose::Read,
                remaining_ms: payload.read_ms,
                duration_ms: payload.read_ms,
            },
        ]
    }

    fn on_open_button(&mut self, payload: &OpenButton) -> Vec<Effect> {
        if !self.accept_sequence(payload.round_sequence, "round:openButton")
            || !self.accept_phase(&[RoundPhase::Reading], "round:openButton")
        {
            return Vec::new();
        }
        self.round.phase = RoundPhase::ButtonOpen;
        self.round.timer_duration_ms = payload.press_window_ms;
        self.round.remaining_ms = payload.press_window_ms;
        vec![Effect::StartCountdown {
            purpose: TimerPurpose::Read,
            remaining_ms: payload.press_window_ms,
            duration_ms: payload.press_window_ms,
        }]
    }

    fn on_player_won_button(&mut self, payload: &PlayerWonButton) -> Vec<Effect> {
        if !self.accept_sequence(payload.round_sequence, "round:playerWonButton")
            || !self.accept_phase(&[RoundPhase::ButtonOpen], "round:playerWonButton")
        {
            return Vec::new();
        }
        self.round.phase = RoundPhase::PlayerBuzzed;
        self.round.player_who_buzzed = Some(BuzzedPlayer {
            id: payload.player_id.clone(),
            name: payload
                .name
                .clone()
                .unwrap_or_else(|| payload.player_id.clone()),
        });
        vec![Effect::CancelCountdown(TimerPurpose::Read)]
    }

    fn on_answer_request(&mut self, payload: &AnswerRequest, now_ms: u64) -> Vec<Effect> {
        if !self.accept_sequence(payload.round_sequence, "round:answerRequest")
            || !self.accept_phase(
                &[
                    RoundPhase::Reading,
                    RoundPhase::ButtonOpen,
                    RoundPhase::PlayerBuzzed,
                ],
                "round:answerRequest",
            )
        {
            return Vec::new();
        }

        // Absolute deadline wins when provided: a client joining mid-window
        // counts down only what is left, while the full duration (when sent)
        // still serves as the progress denominator.
        let remaining_ms = match payload.ends_at {
            Some(ends_at) => ends_at.saturating_sub(now_ms),
            None => payload.answer_timeout_ms.unwrap_or(0),
        };
        let duration_ms = payload.answer_timeout_ms.unwrap_or(remaining_ms);

        self.round.phase = RoundPhase::Answering;
        self.round.answer_options = payload.options.clone();
        self.round.timer_duration_ms = duration_ms;
        self.round.remaining_ms = remaining_ms;
        vec![
            Effect::CancelCountdown(TimerPurpose::Read),
            Effect::StartCountdown {
                purpose: TimerPurpose::Answer,
                remaining_ms,
                duration_ms,
            },
        ]
    }

    fn on_round_result(&mut self, payload: &RoundResult) -> Vec<Effect> {
        if !self.accept_sequence(payload.round_sequence, "round:result")
            || !self.accept_phase(
                &[
                    RoundPhase::Reading,
                    RoundPhase::ButtonOpen,
                    RoundPhase::PlayerBuzzed,
                    RoundPhase::Answering,
                ],
                "round:result",
            )
        {
            return Vec::new();
        }

        self.round.phase = RoundPhase::RoundResolved;
        self.round.remaining_ms = 0;
        self.game.apply_result(payload.scores.clone());

        // A wrong answer disqualifies that player from buzzing again should
        // the round reopen; the set is rebuilt on the next showQuestion.
        if payload.correct == Some(false)
            && let Some(player_id) = &payload.player_id
        {
            self.round.blocked_user_ids.insert(player_id.clone());
        }

        vec![
            Effect::CancelAllCountdowns,
            Effect::ClearBuzzDisplayAfter {
                delay_ms: self.buzz_clear_delay_ms,
            },
        ]
    }

    fn on_started(&mut self, payload: &GameStarted) -> Vec<Effect> {
        self.game.start(payload.total_questions);
        Vec::new()
    }

    fn on_ended(&mut self, payload: &GameEnded) -> Vec<Effect> {
        if let Some(raw) = payload.players.clone() {
            self.game.set_players(normalize_players(raw));
        }
        self.game.apply_result(payload.scores.clone());
        self.game.ended = true;
        self.game.winner = payload
            .winner
            .clone()
            .or_else(|| self.game.winner_from_ranking());
        self.round.phase = RoundPhase::GameEnded;
        self.round.remaining_ms = 0;
        vec![Effect::CancelAllCountdowns]
    }

    fn on_update(&mut self, payload: &GameUpdate, now_ms: u64) -> Vec<Effect> {
        self.game = self.game.merge_update(payload);

        if let Some(blocked) = &payload.blocked_user_ids {
            self.round.blocked_user_ids = blocked.iter().cloned().collect();
        }
        if let Some(sequence) = payload.round_sequence {
            self.round.round_sequence = Some(sequence);
        }
        if let Some(question) = &payload.question_text {
            self.round.question_text = Some(question.clone());
        }
        if let Some(options) = &payload.answer_options {
            self.round.answer_options = options.clone();
        }

        // Reconnect recovery: the payload carries absolute end timestamps,
        // so the countdown resumes from whatever time is actually left.
        let purpose = match payload.phase {
            Some(ResumePhase::Reading) => {
                self.round.phase = RoundPhase::Reading;
                Some(TimerPurpose::Read)
            }
            Some(ResumePhase::Answering) => {
                self.round.phase = RoundPhase::Answering;
                Some(TimerPurpose::Answer)
            }
            _ => None,
        };
        match (purpose, payload.ends_at) {
            (Some(purpose), Some(ends_at)) => {
                let remaining_ms = ends_at.saturating_sub(now_ms);
                let duration_ms = payload.duration_ms.unwrap_or(remaining_ms);
                self.round.timer_duration_ms = duration_ms;
                self.round.remaining_ms = remaining_ms;
                vec![Effect::StartCountdown {
                    purpose,
                    remaining_ms,
                    duration_ms,
                }]
            }
            _ => Vec::new(),
        }
    }

    /// Record a countdown tick. Ticks for a purpose the current phase does
    /// not own are stale callbacks from a superseded timer and are ignored.
    pub fn on_tick(&mut self, purpose: TimerPurpose, remaining_ms: u64) {
        if self.round.phase.active_timer() == Some(purpose) {
            self.round.remaining_ms = remaining_ms;
        }
    }

    /// Clear the buzzed-player display once the post-result delay elapsed.
    /// A no-op if a new round opened in the meantime.
    pub fn clear_buzz_display(&mut self) {
        if self.round.phase == RoundPhase::RoundResolved {
            self.round.player_who_buzzed = None;
        }
    }

    /// Gate and build a buzzer press. On success the in-flight slot is
    /// occupied until [`RoundMachine::finish_action`] clears it.
    pub fn begin_button_press(&mut self, now_ms: u64) -> Result<ClientAction, DispatchRejected> {
        if self.round.blocked_user_ids.contains(&self.user_id) {
            return Err(DispatchRejected::Blocked);
        }
        let (round_sequence, event_id) = self.reserve(ActionKind::ButtonPress, now_ms)?;
        Ok(ClientAction::ButtonPress(ButtonPress {
            code: self.room_code.clone(),
            round_sequence,
            event_id,
        }))
    }

    /// Gate and build an answer submission.
    pub fn begin_answer(
        &mut self,
        selected_index: usize,
        now_ms: u64,
    ) -> Result<ClientAction, DispatchRejected> {
        let (round_sequence, event_id) = self.reserve(ActionKind::AnswerSubmit, now_ms)?;
        Ok(ClientAction::Answer(AnswerSubmit {
            code: self.room_code.clone(),
            round_sequence,
            selected_index,
            event_id,
        }))
    }

    fn reserve(
        &mut self,
        kind: ActionKind,
        now_ms: u64,
    ) -> Result<(u64, String), DispatchRejected> {
        if self.pending.in_flight(kind) {
            return Err(DispatchRejected::InFlight(kind));
        }
        let round_sequence = self
            .round
            .round_sequence
            .ok_or(DispatchRejected::NoActiveRound)?;
        let event_id = kind.correlation_id(&self.user_id, now_ms);
        *self.pending.slot_mut(kind) = Some(event_id.clone());
        Ok((round_sequence, event_id))
    }

    /// Release the in-flight slot for a kind. Called on acknowledgment
    /// arrival regardless of outcome, and on ack timeout when one is
    /// configured.
    pub fn finish_action(&mut self, kind: ActionKind) {
        *self.pending.slot_mut(kind) = None;
    }

    /// UI-facing snapshot derived from the current state.
    pub fn snapshot(&self) -> EngineSnapshot {
        EngineSnapshot {
            phase: self.round.phase,
            round_sequence: self.round.round_sequence,
            question_text: self.round.question_text.clone(),
            answer_options: self.round.answer_options.clone(),
            show_buzzer: self.round.phase.show_buzzer(),
            buzzer_pressed: self.round.phase.buzzer_pressed(),
            show_answer_options: self.round.phase.show_answer_options(),
            is_blocked: self.round.blocked_user_ids.contains(&self.user_id),
            player_who_pressed: self
                .round
                .player_who_buzzed
                .as_ref()
                .map(|player| player.name.clone()),
            remaining_ms: self.round.remaining_ms,
            timer_duration_ms: self.round.progress_denominator_ms(),
            players: self.game.players.values().cloned().collect(),
            scores: self.game.scores.clone(),
            current_question_index: self.game.current_question_index,
            total_questions: self.game.total_questions,
            ended: self.game.ended,
            winner: self.game.winner.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use indexmap::IndexMap;

    use super::*;

    const NOW: u64 = 1_700_000_000_000;

    fn machine() -> RoundMachine {
        RoundMachine::new("ROOM42".into(), "u1".into(), 1000)
    }

    fn show_question(sequence: u64, text: &str, read_ms: u64) -> ServerEvent {
        ServerEvent::ShowQuestion(ShowQuestion {
            round_sequence: sequence,
            question_text: text.into(),
            read_ms,
        })
    }

    fn open_button(sequence: u64, press_window_ms: u64) -> ServerEvent {
        ServerEvent::OpenButton(OpenButton {
            round_sequence: sequence,
            press_window_ms,
        })
    }

    fn player_won(sequence: u64, player_id: &str, name: &str) -> ServerEvent {
        ServerEvent::PlayerWonButton(PlayerWonButton {
            round_sequence: sequence,
            player_id: player_id.into(),
            name: Some(name.into()),
        })
    }

    fn answer_request(
        sequence: u64,
        options: &[&str],
        answer_timeout_ms: Option<u64>,
        ends_at: Option<u64>,
    ) -> ServerEvent {
        ServerEvent::AnswerRequest(AnswerRequest {
            round_sequence: sequence,
            options: options.iter().map(|s| s.to_string()).collect(),
            answer_timeout_ms,
            ends_at,
        })
    }

    fn result(sequence: u64, scores: &[(&str, i64)]) -> ServerEvent {
        ServerEvent::RoundResult(RoundResult {
            round_sequence: sequence,
            scores: scores
                .iter()
                .map(|(id, score)| (id.to_string(), *score))
                .collect(),
            player_id: None,
            correct: None,
            message: None,
            correct_answer: None,
        })
    }

    #[test]
    fn show_question_opens_round_and_starts_reading() {
        let mut m = machine();
        let effects = m.apply(&show_question(1, "Q1", 5000), NOW);
        assert_eq!(m.round().round_sequence, Some(1));
        assert_eq!(m.round().phase, RoundPhase::Reading);
        assert_eq!(m.round().question_text.as_deref(), Some("Q1"));
        assert!(effects.contains(&Effect::StartCountdown {
            purpose: TimerPurpose::Read,
            remaining_ms: 5000,
            duration_ms: 5000,
        }));
    }

    #[test]
    fn show_question_updates_sequence_unconditionally() {
        let mut m = machine();
        m.apply(&show_question(5, "Q5", 1000), NOW);
        assert_eq!(m.round().round_sequence, Some(5));
        // Lower than the tracked value is still accepted: the opening event
        // is the authority.
        m.apply(&show_question(3, "Q3", 1000), NOW);
        assert_eq!(m.round().round_sequence, Some(3));
        m.apply(&show_question(3, "Q3 again", 1000), NOW);
        assert_eq!(m.round().round_sequence, Some(3));
    }

    #[test]
    fn stale_round_events_leave_state_bit_identical() {
        let mut m = machine();
        m.apply(&show_question(1, "Q1", 5000), NOW);
        m.apply(&open_button(1, 3000), NOW);
        let before = m.clone();

        for event in [
            open_button(99, 3000),
            player_won(99, "u2", "Bob"),
            answer_request(99, &["A"], Some(1000), None),
            result(99, &[("u2", 100)]),
        ] {
            let effects = m.apply(&event, NOW);
            assert!(effects.is_empty(), "stale event produced effects");
            assert_eq!(m, before, "stale event changed state");
        }
    }

    #[test]
    fn open_button_shows_buzzer_with_press_window_denominator() {
        let mut m = machine();
        m.apply(&show_question(1, "Q1", 5000), NOW);
        let effects = m.apply(&open_button(1, 3000), NOW);

        let snapshot = m.snapshot();
        assert!(snapshot.show_buzzer);
        assert_eq!(snapshot.timer_duration_ms, 3000);
        assert_eq!(
            effects,
            vec![Effect::StartCountdown {
                purpose: TimerPurpose::Read,
                remaining_ms: 3000,
                duration_ms: 3000,
            }]
        );
    }

    #[test]
    fn player_won_button_records_player_and_hides_buzzer() {
        let mut m = machine();
        m.apply(&show_question(1, "Q1", 5000), NOW);
        m.apply(&open_button(1, 3000), NOW);
        let effects = m.apply(&player_won(1, "u2", "Bob"), NOW);

        let snapshot = m.snapshot();
        assert!(snapshot.buzzer_pressed);
        assert!(!snapshot.show_buzzer);
        assert_eq!(snapshot.player_who_pressed.as_deref(), Some("Bob"));
        assert_eq!(effects, vec![Effect::CancelCountdown(TimerPurpose::Read)]);
    }

    #[test]
    fn answer_then_result_replaces_scores_and_hides_options() {
        let mut m = machine();
        m.apply(&show_question(1, "Q1", 5000), NOW);
        m.apply(&open_button(1, 3000), NOW);
        m.apply(&player_won(1, "u2", "Bob"), NOW);
        m.apply(
            &answer_request(1, &["A", "B"], Some(10_000), Some(NOW + 10_000)),
            NOW,
        );
        assert!(m.snapshot().show_answer_options);

        let effects = m.apply(&result(1, &[("u2", 100)]), NOW);
        let snapshot = m.snapshot();
        assert_eq!(snapshot.scores.get("u2"), Some(&100));
        assert!(!snapshot.show_answer_options);
        assert!(effects.contains(&Effect::CancelAllCountdowns));
        assert!(effects.contains(&Effect::ClearBuzzDisplayAfter { delay_ms: 1000 }));
    }

    #[test]
    fn answer_request_prefers_absolute_deadline_for_remaining_time() {
        let mut m = machine();
        m.apply(&show_question(1, "Q1", 5000), NOW);
        // Joined mid-window: 4s left of a 10s window.
        let effects = m.apply(
            &answer_request(1, &["A", "B"], Some(10_000), Some(NOW + 4000)),
            NOW,
        );
        assert!(effects.contains(&Effect::StartCountdown {
            purpose: TimerPurpose::Answer,
            remaining_ms: 4000,
            duration_ms: 10_000,
        }));
        assert_eq!(m.round().timer_duration_ms, 10_000);
    }

    #[test]
    fn answer_request_without_duration_uses_remaining_as_denominator() {
        let mut m = machine();
        m.apply(&show_question(1, "Q1", 5000), NOW);
        m.apply(&answer_request(1, &["A"], None, Some(NOW + 7000)), NOW);
        assert_eq!(m.round().timer_duration_ms, 7000);
        assert_eq!(m.round().remaining_ms, 7000);
    }

    #[test]
    fn zero_length_window_cannot_divide_progress_by_zero() {
        let mut m = machine();
        m.apply(&show_question(1, "Q1", 0), NOW);
        assert_eq!(m.snapshot().timer_duration_ms, 1);
    }

    #[test]
    fn incorrect_result_blocks_that_player() {
        let mut m = machine();
        m.apply(&show_question(1, "Q1", 5000), NOW);
        m.apply(&open_button(1, 3000), NOW);
        m.apply(&player_won(1, "u1", "Me"), NOW);
        m.apply(&answer_request(1, &["A", "B"], Some(10_000), None), NOW);
        m.apply(
            &ServerEvent::RoundResult(RoundResult {
                round_sequence: 1,
                scores: IndexMap::new(),
                player_id: Some("u1".into()),
                correct: Some(false),
                message: None,
                correct_answer: None,
            }),
            NOW,
        );
        assert!(m.snapshot().is_blocked);
        assert!(matches!(
            m.begin_button_press(NOW),
            Err(DispatchRejected::Blocked)
        ));

        // A new round clears the blocked set.
        m.apply(&show_question(2, "Q2", 5000), NOW);
        assert!(!m.snapshot().is_blocked);
    }

    #[test]
    fn buzz_display_clear_is_guarded_by_phase() {
        let mut m = machine();
        m.apply(&show_question(1, "Q1", 5000), NOW);
        m.apply(&open_button(1, 3000), NOW);
        m.apply(&player_won(1, "u2", "Bob"), NOW);
        m.apply(&result(1, &[("u2", 100)]), NOW);
        assert!(m.snapshot().player_who_pressed.is_some());
        m.clear_buzz_display();
        assert!(m.snapshot().player_who_pressed.is_none());

        // Once a new round opened, a late clear must not touch it.
        m.apply(&show_question(2, "Q2", 5000), NOW);
        m.apply(&open_button(2, 3000), NOW);
        m.apply(&player_won(2, "u3", "Cara"), NOW);
        m.clear_buzz_display();
        assert_eq!(m.snapshot().player_who_pressed.as_deref(), Some("Cara"));
    }

    #[test]
    fn started_initializes_scores_for_known_roster() {
        let mut m = machine();
        m.apply(
            &ServerEvent::Update(GameUpdate {
                players: Some(
                    serde_json::from_str(r#"[{"userId": "a"}, {"userId": "b"}]"#).unwrap(),
                ),
                ..GameUpdate::default()
            }),
            NOW,
        );
        m.apply(
            &ServerEvent::Started(GameStarted {
                total_questions: 10,
            }),
            NOW,
        );

        let snapshot = m.snapshot();
        assert_eq!(snapshot.scores.get("a"), Some(&0));
        assert_eq!(snapshot.scores.get("b"), Some(&0));
        assert_eq!(snapshot.current_question_index, 0);
        assert_eq!(snapshot.total_questions, 10);
    }

    #[test]
    fn ended_cancels_timers_and_settles_winner() {
        let mut m = machine();
        m.apply(
            &ServerEvent::Update(GameUpdate {
                players: Some(
                    serde_json::from_str(
                        r#"[{"userId": "a", "name": "Alice"}, {"userId": "b", "name": "Bob"}]"#,
                    )
                    .unwrap(),
                ),
                ..GameUpdate::default()
            }),
            NOW,
        );
        m.apply(&show_question(1, "Q1", 5000), NOW);

        let effects = m.apply(
            &ServerEvent::Ended(GameEnded {
                scores: IndexMap::from([("a".to_string(), 10), ("b".to_string(), 40)]),
                players: None,
                winner: None,
            }),
            NOW,
        );
        assert_eq!(effects, vec![Effect::CancelAllCountdowns]);

        let snapshot = m.snapshot();
        assert!(snapshot.ended);
        let winner = snapshot.winner.unwrap();
        assert_eq!(winner.user_id, "b");
        assert_eq!(winner.score, 40);
    }

    #[test]
    fn update_resumes_answering_timer_from_absolute_deadline() {
        let mut m = machine();
        let update: GameUpdate = serde_json::from_str(&format!(
            r#"{{"roundSequence": 4,
                 "questionText": "Q4",
                 "answerOptions": ["A", "B"],
                 "phase": "answering",
                 "endsAt": {},
                 "durationMs": 10000}}"#,
            NOW + 2500
        ))
        .unwrap();
        let effects = m.apply(&ServerEvent::Update(update), NOW);

        assert_eq!(m.round().round_sequence, Some(4));
        assert_eq!(m.round().phase, RoundPhase::Answering);
        assert_eq!(
            effects,
            vec![Effect::StartCountdown {
                purpose: TimerPurpose::Answer,
                remaining_ms: 2500,
                duration_ms: 10_000,
            }]
        );
    }

    #[test]
    fn update_without_timer_fields_changes_no_phase() {
        let mut m = machine();
        m.apply(&show_question(1, "Q1", 5000), NOW);
        let effects = m.apply(
            &ServerEvent::Update(GameUpdate {
                scores: Some(IndexMap::from([("a".to_string(), 3)])),
                ..GameUpdate::default()
            }),
            NOW,
        );
        assert!(effects.is_empty());
        assert_eq!(m.round().phase, RoundPhase::Reading);
        assert_eq!(m.game().scores.get("a"), Some(&3));
    }

    #[test]
    fn in_flight_guard_suppresses_duplicate_dispatch() {
        let mut m = machine();
        m.apply(&show_question(1, "Q1", 5000), NOW);
        m.apply(&open_button(1, 3000), NOW);

        let first = m.begin_button_press(NOW).unwrap();
        assert_eq!(first.kind(), ActionKind::ButtonPress);
        assert!(matches!(
            m.begin_button_press(NOW + 1),
            Err(DispatchRejected::InFlight(ActionKind::ButtonPress))
        ));

        // A different kind has independent in-flight state.
        assert!(m.begin_answer(0, NOW + 1).is_ok());

        // The acknowledgment releases the slot, success or failure alike.
        m.finish_action(ActionKind::ButtonPress);
        assert!(m.begin_button_press(NOW + 2).is_ok());
    }

    #[test]
    fn dispatch_without_open_round_is_rejected() {
        let mut m = machine();
        assert!(matches!(
            m.begin_button_press(NOW),
            Err(DispatchRejected::NoActiveRound)
        ));
    }

    #[test]
    fn action_carries_room_code_sequence_and_correlation_id() {
        let mut m = machine();
        m.apply(&show_question(7, "Q7", 5000), NOW);
        let action = m.begin_answer(1, NOW).unwrap();
        let json = serde_json::to_value(&action).unwrap();
        assert_eq!(json["event"], "round:answer");
        assert_eq!(json["data"]["code"], "ROOM42");
        assert_eq!(json["data"]["roundSequence"], 7);
        assert_eq!(json["data"]["selectedIndex"], 1);
        assert_eq!(
            json["data"]["eventId"],
            format!("answerSubmit-u1-{NOW}").as_str()
        );
    }

    #[test]
    fn stale_tick_after_phase_transition_is_ignored() {
        let mut m = machine();
        m.apply(&show_question(1, "Q1", 5000), NOW);
        m.apply(&answer_request(1, &["A"], Some(10_000), None), NOW);
        // A Read tick arriving just after the transition to Answering must
        // not clobber the answer window's remaining time.
        m.on_tick(TimerPurpose::Read, 1234);
        assert_eq!(m.round().remaining_ms, 10_000);
        m.on_tick(TimerPurpose::Answer, 9000);
        assert_eq!(m.round().remaining_ms, 9000);
    }
}
