use serde::{Deserialize, Serialize};

pub type UserId = i64;

/// One side of the board.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    White,
    Black,
}

impl Side {
    pub fn opposite(self) -> Side {
        match self {
            Side::White => Side::Black,
            Side::Black => Side::White,
        }
    }

    /// Accepts the spellings the game server uses: "white"/"black" and "w"/"b".
    pub fn parse(s: &str) -> Option<Side> {
        match s.trim().to_ascii_lowercase().as_str() {
            "white" | "w" => Some(Side::White),
            "black" | "b" => Some(Side::Black),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Side::White => "white",
            Side::Black => "black",
        }
    }

    pub(crate) fn from_chess(color: shakmaty::Color) -> Side {
        match color {
            shakmaty::Color::White => Side::White,
            shakmaty::Color::Black => Side::Black,
        }
    }
}

impl std::fmt::Display for Side {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How a player enters moves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlayMethod {
    Phone,
    PhysicalBoard,
    Local,
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayerDescriptor {
    pub id: UserId,
    pub name: String,
    pub rating: i32,
    pub side: Side,
    pub play_method: PlayMethod,
}

/// The two seats of a game, keyed by color.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Players {
    pub white: PlayerDescriptor,
    pub black: PlayerDescriptor,
}

impl Players {
    pub fn get(&self, side: Side) -> &PlayerDescriptor {
        match side {
            Side::White => &self.white,
            Side::Black => &self.black,
        }
    }

    pub fn side_of(&self, user_id: UserId) -> Option<Side> {
        if self.white.id == user_id {
            Some(Side::White)
        } else if self.black.id == user_id {
            Some(Side::Black)
        } else {
            None
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GameResult {
    Winner(Side),
    Draw,
}

impl GameResult {
    /// PGN result token.
    pub fn pgn_token(result: Option<GameResult>) -> &'static str {
        match result {
            Some(GameResult::Winner(Side::White)) => "1-0",
            Some(GameResult::Winner(Side::Black)) => "0-1",
            Some(GameResult::Draw) => "1/2-1/2",
            None => "*",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Termination {
    Checkmate,
    Stalemate,
    InsufficientMaterial,
    FiftyMoveRule,
    ThreefoldRepetition,
    Timeout,
    /// Ended by the server for a reason this client does not model (resignation, agreement).
    ServerDeclared,
}
