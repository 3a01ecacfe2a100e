//! Engine configuration, validated once at construction time.

use std::time::Duration;

use crate::error::EngineError;

/// Cadence at which countdown timers re-emit the remaining time.
pub const DEFAULT_TICK_INTERVAL: Duration = Duration::from_millis(100);
/// Delay before the buzzed-player display is cleared after a round result.
pub const DEFAULT_BUZZ_CLEAR_DELAY: Duration = Duration::from_secs(1);
/// Bound on how long a dispatched action waits for its acknowledgment.
pub const DEFAULT_ACK_TIMEOUT: Duration = Duration::from_secs(10);

/// Immutable configuration for one engine instance bound to one game screen.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Room code attached to every outbound action.
    pub room_code: String,
    /// Identity of the local player, resolved by the caller's session layer.
    pub user_id: String,
    /// Countdown tick cadence.
    pub tick_interval: Duration,
    /// Delay before clearing the buzzed-player display after a result.
    pub buzz_clear_delay: Duration,
    /// Upper bound on waiting for an action acknowledgment. `None` waits
    /// forever, which can leave an action in flight if the ack is dropped.
    pub ack_timeout: Option<Duration>,
}

impl EngineConfig {
    /// Build a configuration, failing fast when the room code or user id is
    /// empty. These are the only caller-visible constructor preconditions.
    pub fn new(
        room_code: impl Into<String>,
        user_id: impl Into<String>,
    ) -> Result<Self, EngineError> {
        let room_code = room_code.into();
        if room_code.trim().is_empty() {
            return Err(EngineError::MissingRoomCode);
        }
        let user_id = user_id.into();
        if user_id.trim().is_empty() {
            return Err(EngineError::MissingUserId);
        }
        Ok(Self {
            room_code,
            user_id,
            tick_interval: DEFAULT_TICK_INTERVAL,
            buzz_clear_delay: DEFAULT_BUZZ_CLEAR_DELAY,
            ack_timeout: Some(DEFAULT_ACK_TIMEOUT),
        })
    }

    /// Override the countdown tick cadence.
    pub fn with_tick_interval(mut self, interval: Duration) -> Self {
        self.tick_interval = interval;
        self
    }

    /// Override or disable the acknowledgment timeout.
    pub fn with_ack_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.ack_timeout = timeout;
        self
    }

    /// Override the buzzed-player display clear delay.
    pub fn with_buzz_clear_delay(mut self, delay: Duration) -> Self {
        self.buzz_clear_delay = delay;
        self
    }
}
