//! Outbound user actions and their acknowledgment payloads.

use std::fmt;

use serde::{Deserialize, Serialize};

/// The two user intents the engine can emit, each with independent
/// in-flight tracking.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionKind {
    /// Press the buzzer during the button window.
    ButtonPress,
    /// Submit a selected answer option.
    AnswerSubmit,
}

impl ActionKind {
    /// Build the correlation id attached to an emitted action.
    pub fn correlation_id(self, user_id: &str, timestamp_ms: u64) -> String {
        format!("{self}-{user_id}-{timestamp_ms}")
    }
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ActionKind::ButtonPress => write!(f, "buttonPress"),
            ActionKind::AnswerSubmit => write!(f, "answerSubmit"),
        }
    }
}

/// Actions emitted over the transport, tagged on the wire the same way as
/// inbound events.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", content = "data")]
pub enum ClientAction {
    /// `round:buttonPress` — claim the buzzer.
    #[serde(rename = "round:buttonPress")]
    ButtonPress(ButtonPress),
    /// `round:answer` — submit an answer option.
    #[serde(rename = "round:answer")]
    Answer(AnswerSubmit),
}

impl ClientAction {
    /// Correlation id the server echoes back in its acknowledgment.
    pub fn event_id(&self) -> &str {
        match self {
            ClientAction::ButtonPress(payload) => &payload.event_id,
            ClientAction::Answer(payload) => &payload.event_id,
        }
    }

    /// Which in-flight slot this action occupies.
    pub fn kind(&self) -> ActionKind {
        match self {
            ClientAction::ButtonPress(_) => ActionKind::ButtonPress,
            ClientAction::Answer(_) => ActionKind::AnswerSubmit,
        }
    }
}

/// Payload of `round:buttonPress`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ButtonPress {
    /// Room code the action targets.
    pub code: String,
    /// Round the press belongs to.
    pub round_sequence: u64,
    /// Correlation id for the acknowledgment.
    pub event_id: String,
}

/// Payload of `round:answer`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AnswerSubmit {
    /// Room code the action targets.
    pub code: String,
    /// Round the answer belongs to.
    pub round_sequence: u64,
    /// Index of the selected option within the displayed list.
    pub selected_index: usize,
    /// Correlation id for the acknowledgment.
    pub event_id: String,
}

/// Acknowledgment payload returned for a dispatched action.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AckResponse {
    /// Whether the server accepted the action.
    pub ok: bool,
    /// Optional human-readable rejection or status message.
    #[serde(default)]
    pub message: Option<String>,
    /// Whether the submitted answer was correct, when applicable.
    #[serde(default)]
    pub correct: Option<bool>,
}
