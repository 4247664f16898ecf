//! The owned game session record and the snapshot it is built from.

use chrono::{DateTime, Utc};
use serde::Serialize;

use chess_core::{GameResult, Players, Side, Termination, UserId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Waiting,
    Active,
    Finished,
}

impl SessionStatus {
    /// Map the server's status vocabulary.
    pub fn parse(s: &str) -> Option<SessionStatus> {
        match s.trim().to_ascii_lowercase().as_str() {
            "waiting" | "pending" => Some(SessionStatus::Waiting),
            "active" | "in_progress" | "in-progress" | "in-game" | "in_game" => Some(SessionStatus::Active),
            "finished" | "completed" | "abandoned" => Some(SessionStatus::Finished),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MoveOrigin {
    LocalOptimistic,
    RemoteConfirmed,
    PhysicalDevice,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Move {
    /// 1-based half-move number within the session
    pub index: usize,
    pub mover: Side,
    pub san: String,
    pub fen: String,
    pub origin: MoveOrigin,
    pub recorded_at: DateTime<Utc>,
}

/// Who made a historical move, as reported by the history query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MoverRef {
    Side(Side),
    User(UserId),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoryEntry {
    pub mover: MoverRef,
    pub san: String,
    pub fen: String,
}

/// Point-in-time state of a game as returned by the snapshot query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionSnapshot {
    pub game_id: String,
    pub players: Players,
    pub started_by: Option<String>,
    pub category: String,
    pub initial_time: u32,
    pub white_time_left: u32,
    pub black_time_left: u32,
    pub status: SessionStatus,
    /// Missing on older servers; derived from the position when absent
    pub turn: Option<Side>,
    pub position: String,
    /// Set only for games that did not begin from the standard position
    pub start_position: Option<String>,
}

/// Everything one snapshot load produces.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadedSession {
    pub snapshot: SessionSnapshot,
    pub history: Vec<HistoryEntry>,
}

/// The single owned record of the game being shown.
#[derive(Debug, Clone)]
pub struct GameSession {
    pub id: String,
    pub players: Players,
    pub started_by: Option<String>,
    pub category: String,
    pub initial_time: u32,
    /// Position before the first move in `moves`
    pub start_position: String,
    pub position: String,
    pub status: SessionStatus,
    pub turn: Side,
    pub result: Option<GameResult>,
    pub termination: Option<Termination>,
    pub in_check: bool,
    pub moves: Vec<Move>,
}

impl GameSession {
    pub fn last_move(&self) -> Option<&Move> {
        self.moves.last()
    }

    pub fn sans(&self) -> Vec<String> {
        self.moves.iter().map(|m| m.san.clone()).collect()
    }

    /// End the game. Ignored when already finished.
    pub(crate) fn finish(&mut self, result: GameResult, termination: Termination) -> bool {
        if self.status == SessionStatus::Finished && self.result.is_some() {
            return false;
        }
        self.status = SessionStatus::Finished;
        self.result = Some(result);
        self.termination = Some(termination);
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_vocabulary() {
        assert_eq!(SessionStatus::parse("in_progress"), Some(SessionStatus::Active));
        assert_eq!(SessionStatus::parse("in-game"), Some(SessionStatus::Active));
        assert_eq!(SessionStatus::parse("completed"), Some(SessionStatus::Finished));
        assert_eq!(SessionStatus::parse("Waiting"), Some(SessionStatus::Waiting));
        assert_eq!(SessionStatus::parse("exploded"), None);
    }
}
