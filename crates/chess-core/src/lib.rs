//! Chess vocabulary shared by the game room client: sides, players, results,
//! the rules engine adapter and PGN export.

pub mod game_data;
pub mod pgn;
pub mod rules;

pub use game_data::{GameResult, PlayMethod, PlayerDescriptor, Players, Side, Termination, UserId};
pub use rules::{AppliedMove, MoveRequest, PositionStatus, RulesEngine, RulesError, ShakmatyRules};
