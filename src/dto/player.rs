//! Tolerant decoding of player payloads.
//!
//! The server is not consistent about player shapes: rosters may arrive as
//! flat objects keyed by `userId`, `_id`, or `id`, or as wrappers with a
//! nested `user` object. Everything is normalized to [`Player`] before it
//! touches engine state.

use serde::Deserialize;

use crate::state::game::Player;

/// Raw player entry as found on the wire.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum RawPlayer {
    /// Wrapper shape: `{ "user": { ... }, "name"? }`.
    Nested {
        /// The nested user object carrying the identifier.
        user: RawUser,
        /// Display name at the wrapper level, overriding the nested one.
        #[serde(default)]
        name: Option<String>,
    },
    /// Flat shape with the identifier at the top level.
    Flat(RawUser),
}

/// Identifier/name pair tolerating the server's key variants.
#[derive(Debug, Clone, Deserialize)]
pub struct RawUser {
    /// Unique user identifier (`userId`, `_id`, or `id` on the wire).
    #[serde(rename = "userId", alias = "_id", alias = "id")]
    pub user_id: String,
    /// Display name (`name` or `username` on the wire).
    #[serde(default, alias = "username")]
    pub name: Option<String>,
}

impl From<RawPlayer> for Player {
    fn from(raw: RawPlayer) -> Self {
        let (user, outer_name) = match raw {
            RawPlayer::Nested { user, name } => (user, name),
            RawPlayer::Flat(user) => (user, None),
        };
        let name = outer_name
            .or(user.name)
            .filter(|name| !name.is_empty())
            .unwrap_or_else(|| user.user_id.clone());
        Player {
            user_id: user.user_id,
            name,
        }
    }
}

/// Normalize a raw roster, deduplicating by user id and keeping first wins
/// order.
pub fn normalize_players(raw: Vec<RawPlayer>) -> Vec<Player> {
    let mut players: Vec<Player> = Vec::with_capacity(raw.len());
    for entry in raw {
        let player = Player::from(entry);
        if players.iter().all(|known| known.user_id != player.user_id) {
            players.push(player);
        }
    }
    players
}
