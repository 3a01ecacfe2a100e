//! Inbound protocol events pushed by the game server.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::{
    dto::player::RawPlayer,
    state::game::Winner,
};

/// Named events delivered over the real-time channel, tagged on the wire as
/// `{ "event": "...", "data": { ... } }`.
#[derive(Debug)]
pub enum ServerEvent {
    /// Partial game-state resync, typically sent after a reconnect.
    Update(GameUpdate),
    /// The game has started; scores should be zeroed for the known roster.
    Started(GameStarted),
    /// A new round opens with its question and reading window.
    ShowQuestion(ShowQuestion),
    /// The buzzer window opens for the current round.
    OpenButton(OpenButton),
    /// A player won the buzzer race for the current round.
    PlayerWonButton(PlayerWonButton),
    /// The buzzed player must now pick an answer within the window.
    AnswerRequest(AnswerRequest),
    /// The round resolved; the carried score map is authoritative.
    RoundResult(RoundResult),
    /// The game is over. Some server builds emit `game:finished` instead.
    Ended(GameEnded),
    /// Any event name this client does not understand.
    Unknown,
}

// The envelope is decoded in two steps because the event name must be
// matched before the payload shape is known: unrecognized names map to
// `Unknown` whether or not they carry a `data` object, which a derived
// adjacently-tagged enum cannot express for its catch-all variant.
impl<'de> Deserialize<'de> for ServerEvent {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        #[derive(Deserialize)]
        struct Envelope {
            event: String,
            #[serde(default)]
            data: serde_json::Value,
        }

        fn payload<'de, T, D>(data: serde_json::Value) -> Result<T, D::Error>
        where
            T: serde::de::DeserializeOwned,
            D: serde::Deserializer<'de>,
        {
            serde_json::from_value(data).map_err(serde::de::Error::custom)
        }

        let Envelope { event, data } = Envelope::deserialize(deserializer)?;
        let event = match event.as_str() {
            "game:update" => ServerEvent::Update(payload::<_, D>(data)?),
            "game:started" => ServerEvent::Started(payload::<_, D>(data)?),
            "round:showQuestion" => ServerEvent::ShowQuestion(payload::<_, D>(data)?),
            "round:openButton" => ServerEvent::OpenButton(payload::<_, D>(data)?),
            "round:playerWonButton" => ServerEvent::PlayerWonButton(payload::<_, D>(data)?),
            "round:answerRequest" => ServerEvent::AnswerRequest(payload::<_, D>(data)?),
            "round:result" => ServerEvent::RoundResult(payload::<_, D>(data)?),
            "game:ended" | "game:finished" => ServerEvent::Ended(payload::<_, D>(data)?),
            _ => ServerEvent::Unknown,
        };
        Ok(event)
    }
}

/// Payload of `game:started`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GameStarted {
    /// Number of questions the game will run.
    #[serde(default)]
    pub total_questions: u64,
}

/// Payload of `round:showQuestion`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShowQuestion {
    /// Server-assigned sequence number identifying the opened round.
    pub round_sequence: u64,
    /// Question text to display during the reading window.
    pub question_text: String,
    /// Duration of the reading window in milliseconds.
    #[serde(default)]
    pub read_ms: u64,
}

/// Payload of `round:openButton`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OpenButton {
    /// Round this buzzer window belongs to.
    pub round_sequence: u64,
    /// Duration of the buzzer window in milliseconds.
    #[serde(default)]
    pub press_window_ms: u64,
}

/// Payload of `round:playerWonButton`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerWonButton {
    /// Round this buzz belongs to.
    pub round_sequence: u64,
    /// Identifier of the winning player.
    pub player_id: String,
    /// Display name of the winning player.
    #[serde(default)]
    pub name: Option<String>,
}

/// Payload of `round:answerRequest`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnswerRequest {
    /// Round this answer window belongs to.
    pub round_sequence: u64,
    /// Ordered answer options to display.
    #[serde(default)]
    pub options: Vec<String>,
    /// Full answer window duration in milliseconds, when known.
    #[serde(default)]
    pub answer_timeout_ms: Option<u64>,
    /// Absolute wall-clock end of the window in epoch milliseconds. Takes
    /// precedence over `answer_timeout_ms` for the deadline so that a client
    /// resuming mid-window counts down only the remaining time.
    #[serde(default)]
    pub ends_at: Option<u64>,
}

/// Payload of `round:result`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoundResult {
    /// Round this result belongs to.
    pub round_sequence: u64,
    /// Authoritative score map replacing the local one wholesale.
    #[serde(default)]
    pub scores: IndexMap<String, i64>,
    /// Player whose answer produced this result, if any.
    #[serde(default)]
    pub player_id: Option<String>,
    /// Whether that answer was correct.
    #[serde(default)]
    pub correct: Option<bool>,
    /// Optional server-provided display message.
    #[serde(default)]
    pub message: Option<String>,
    /// The correct answer, revealed by some server builds.
    #[serde(default)]
    pub correct_answer: Option<String>,
}

/// Payload of `game:ended` / `game:finished`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GameEnded {
    /// Final authoritative score map.
    #[serde(default)]
    pub scores: IndexMap<String, i64>,
    /// Final roster, when the server includes it.
    #[serde(default)]
    pub players: Option<Vec<RawPlayer>>,
    /// Declared winner. Computed from the final ranking when absent.
    #[serde(default)]
    pub winner: Option<Winner>,
}

/// Phase hint carried by a resync payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum ResumePhase {
    /// The round is in its reading window.
    Reading,
    /// The round is in its answer window.
    Answering,
    /// Any other phase label; no timer is resumed for it.
    #[serde(other)]
    Other,
}

/// Payload of `game:update`. Every field is optional: absent fields keep
/// their previous value, present fields replace it.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GameUpdate {
    /// Replacement roster. A present-but-empty list clears the roster.
    #[serde(default)]
    pub players: Option<Vec<RawPlayer>>,
    /// Replacement score map.
    #[serde(default)]
    pub scores: Option<IndexMap<String, i64>>,
    /// Replacement blocked set for the current round.
    #[serde(default)]
    pub blocked_user_ids: Option<Vec<String>>,
    /// Replacement question counter.
    #[serde(default)]
    pub current_question_index: Option<u64>,
    /// Replacement question total.
    #[serde(default)]
    pub total_questions: Option<u64>,
    /// Round the resync refers to; replaces the tracked sequence.
    #[serde(default)]
    pub round_sequence: Option<u64>,
    /// Current question text, when mid-round.
    #[serde(default)]
    pub question_text: Option<String>,
    /// Current answer options, when mid-round.
    #[serde(default)]
    pub answer_options: Option<Vec<String>>,
    /// Phase the server believes the round is in.
    #[serde(default)]
    pub phase: Option<ResumePhase>,
    /// Absolute end of the active phase window in epoch milliseconds;
    /// required to resume a countdown.
    #[serde(default)]
    pub ends_at: Option<u64>,
    /// Full window duration, used as progress denominator when supplied.
    #[serde(default)]
    pub duration_ms: Option<u64>,
}
