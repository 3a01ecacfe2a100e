//! Game-long state surviving across rounds, plus the reconciliation rules
//! for server-pushed score and roster updates.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::dto::{events::GameUpdate, player::normalize_players};

/// A participant tracked for the duration of the game.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Player {
    /// Unique user identifier.
    pub user_id: String,
    /// Display name.
    pub name: String,
}

/// Winner entry attached to the terminal game snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Winner {
    /// Identifier of the winning player.
    #[serde(alias = "_id", alias = "id")]
    pub user_id: String,
    /// Display name of the winning player.
    #[serde(default)]
    pub name: String,
    /// Final score.
    #[serde(default)]
    pub score: i64,
}

/// State created at `game:started` (or on reconnect) and finalized at
/// `game:ended`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GameState {
    /// Roster, ordered and unique by user id.
    pub players: IndexMap<String, Player>,
    /// Current scores, defaulting to 0 once the game starts.
    pub scores: IndexMap<String, i64>,
    /// Number of the question currently on screen (0 before the first).
    pub current_question_index: u64,
    /// Total number of questions the game will run.
    pub total_questions: u64,
    /// Whether the game has reached its terminal state.
    pub ended: bool,
    /// Winner, set only once the game has ended.
    pub winner: Option<Winner>,
}

impl GameState {
    /// Initialize for a starting game: every known player gets a zero score
    /// and the terminal fields are reset.
    pub fn start(&mut self, total_questions: u64) {
        self.scores = self
            .players
            .keys()
            .map(|user_id| (user_id.clone(), 0))
            .collect();
        self.current_question_index = 0;
        self.total_questions = total_questions;
        self.ended = false;
        self.winner = None;
    }

    /// Replace the roster with a normalized player list.
    pub fn set_players(&mut self, players: Vec<Player>) {
        self.players = players
            .into_iter()
            .map(|player| (player.user_id.clone(), player))
            .collect();
    }

    /// Full replacement of the score map. The server is authoritative for
    /// scores at result time, so entries absent from `scores` are removed.
    pub fn apply_result(&mut self, scores: IndexMap<String, i64>) {
        self.scores = scores;
    }

    /// Field-wise merge of a partial update: present fields replace, absent
    /// fields keep their previous value. A present-but-empty roster is
    /// treated as authoritative and clears the list.
    pub fn merge_update(&self, incoming: &GameUpdate) -> GameState {
        let mut next = self.clone();
        if let Some(raw) = incoming.players.clone() {
            next.set_players(normalize_players(raw));
        }
        if let Some(scores) = incoming.scores.clone() {
            next.scores = scores;
        }
        if let Some(index) = incoming.current_question_index {
            next.current_question_index = index;
        }
        if let Some(total) = incoming.total_questions {
            next.total_questions = total;
        }
        next
    }

    /// Players sorted by score descending, roster order breaking ties.
    pub fn final_ranking(&self) -> Vec<(Player, i64)> {
        let mut ranking: Vec<(Player, i64)> = self
            .players
            .values()
            .map(|player| {
                let score = self.scores.get(&player.user_id).copied().unwrap_or(0);
                (player.clone(), score)
            })
            .collect();
        ranking.sort_by(|a, b| b.1.cmp(&a.1));
        ranking
    }

    /// Winner derived from the final ranking, used when the terminal event
    /// does not name one.
    pub fn winner_from_ranking(&self) -> Option<Winner> {
        self.final_ranking().first().map(|(player, score)| Winner {
            user_id: player.user_id.clone(),
            name: player.name.clone(),
            score: *score,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn roster(ids: &[(&str, &str)]) -> GameState {
        let mut state = GameState::default();
        state.set_players(
            ids.iter()
                .map(|(id, name)| Player {
                    user_id: (*id).into(),
                    name: (*name).into(),
                })
                .collect(),
        );
        state
    }

    #[test]
    fn start_zeroes_scores_for_known_roster() {
        let mut state = roster(&[("a", "Alice"), ("b", "Bob")]);
        state.ended = true;
        state.start(10);
        assert_eq!(state.scores.get("a"), Some(&0));
        assert_eq!(state.scores.get("b"), Some(&0));
        assert_eq!(state.current_question_index, 0);
        assert_eq!(state.total_questions, 10);
        assert!(!state.ended);
        assert!(state.winner.is_none());
    }

    #[test]
    fn apply_result_is_total_replacement() {
        let mut state = roster(&[("a", "Alice"), ("b", "Bob")]);
        state.scores = IndexMap::from([("a".to_string(), 1), ("b".to_string(), 2)]);
        state.apply_result(IndexMap::from([("a".to_string(), 1)]));
        assert_eq!(state.scores.get("a"), Some(&1));
        assert_eq!(state.scores.get("b"), None);
    }

    #[test]
    fn merge_update_preserves_absent_fields() {
        let mut state = roster(&[("a", "Alice"), ("b", "Bob")]);
        state.scores = IndexMap::from([("a".to_string(), 1)]);

        let incoming = GameUpdate {
            scores: Some(IndexMap::from([("a".to_string(), 5)])),
            ..GameUpdate::default()
        };
        let merged = state.merge_update(&incoming);

        assert_eq!(merged.scores.get("a"), Some(&5));
        assert_eq!(merged.players.len(), 2, "roster must survive the merge");
        assert_eq!(merged.players.get_index(0).unwrap().1.name, "Alice");
    }

    #[test]
    fn merge_update_with_present_players_replaces_roster() {
        let state = roster(&[("a", "Alice"), ("b", "Bob")]);
        let incoming: GameUpdate = serde_json::from_str(
            r#"{"players": [{"_id": "c", "username": "Cara"}]}"#,
        )
        .unwrap();
        let merged = state.merge_update(&incoming);
        assert_eq!(merged.players.len(), 1);
        assert_eq!(merged.players.get("c").unwrap().name, "Cara");
    }

    #[test]
    fn final_ranking_orders_by_score_descending() {
        let mut state = roster(&[("a", "Alice"), ("b", "Bob"), ("c", "Cara")]);
        state.scores = IndexMap::from([
            ("a".to_string(), 10),
            ("b".to_string(), 30),
            ("c".to_string(), 20),
        ]);
        let ranking = state.final_ranking();
        let ids: Vec<&str> = ranking.iter().map(|(p, _)| p.user_id.as_str()).collect();
        assert_eq!(ids, ["b", "c", "a"]);

        let winner = state.winner_from_ranking().unwrap();
        assert_eq!(winner.user_id, "b");
        assert_eq!(winner.score, 30);
    }

    #[test]
    fn ranking_defaults_missing_scores_to_zero() {
        let state = roster(&[("a", "Alice")]);
        let ranking = state.final_ranking();
        assert_eq!(ranking[0].1, 0);
    }
}
