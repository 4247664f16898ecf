//! Move validation and position status, backed by shakmaty.
//!
//! Positions cross this boundary as FEN strings so the rest of the client can
//! treat them as opaque encodings.

use shakmaty::fen::Fen;
use shakmaty::san::{San, SanPlus};
use shakmaty::uci::UciMove;
use shakmaty::{CastlingMode, Chess, EnPassantMode, Move, Position, Rank, Role, Square};

use crate::game_data::Side;

pub const STANDARD_START_FEN: &str = "rnbqkbnr/pppppppp/8/8/8/8/PPPPPPPP/RNBQKBNR w KQkq - 0 1";

/// Sentinel some servers store instead of the starting FEN.
pub const START_POS_SENTINEL: &str = "startpos";

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RulesError {
    #[error("invalid position {fen:?}: {reason}")]
    InvalidPosition { fen: String, reason: String },

    #[error("invalid square {0:?}")]
    InvalidSquare(String),

    #[error("invalid promotion piece {0:?}")]
    InvalidPromotion(char),

    #[error("unparsable move notation {0:?}")]
    InvalidNotation(String),

    #[error("illegal move {0}")]
    IllegalMove(String),
}

/// A move as the user expressed it on the board.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MoveRequest {
    pub from: String,
    pub to: String,
    pub promotion: Option<char>,
}

impl MoveRequest {
    pub fn new(from: impl Into<String>, to: impl Into<String>) -> Self {
        Self {
            from: from.into(),
            to: to.into(),
            promotion: None,
        }
    }

    pub fn with_promotion(mut self, piece: char) -> Self {
        self.promotion = Some(piece);
        self
    }

    /// Parse coordinate notation such as `e2e4` or `e7e8q`.
    pub fn parse_coordinates(s: &str) -> Option<Self> {
        let s = s.trim();
        if !(s.len() == 4 || s.len() == 5) || !s.is_ascii() {
            return None;
        }
        let mut req = MoveRequest::new(&s[0..2], &s[2..4]);
        if let Some(c) = s[4..].chars().next() {
            req = req.with_promotion(c);
        }
        Some(req)
    }
}

/// Outcome of applying a legal move.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppliedMove {
    pub san: String,
    pub fen: String,
    pub mover: Side,
    pub from: String,
    pub to: String,
    pub promotion: Option<char>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PositionStatus {
    pub check: bool,
    pub checkmate: bool,
    pub stalemate: bool,
    pub insufficient_material: bool,
    pub fifty_move: bool,
}

/// The rules collaborator the synchronization engine consults.
///
/// Implementations are pure: the same inputs always give the same outputs.
pub trait RulesEngine {
    fn normalize(&self, position: &str) -> Result<String, RulesError>;

    fn side_to_move(&self, position: &str) -> Result<Side, RulesError>;

    fn apply(&self, position: &str, request: &MoveRequest) -> Result<AppliedMove, RulesError>;

    fn apply_san(&self, position: &str, san: &str) -> Result<AppliedMove, RulesError>;

    fn status(&self, position: &str) -> Result<PositionStatus, RulesError>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ShakmatyRules;

impl ShakmatyRules {
    fn load(&self, position: &str) -> Result<Chess, RulesError> {
        let trimmed = position.trim();
        if trimmed.is_empty() || trimmed == START_POS_SENTINEL {
            return Ok(Chess::default());
        }
        let fen: Fen = trimmed.parse().map_err(|e| RulesError::InvalidPosition {
            fen: trimmed.to_string(),
            reason: format!("{e}"),
        })?;
        fen.into_position::<Chess>(CastlingMode::Standard)
            .map_err(|e| RulesError::InvalidPosition {
                fen: trimmed.to_string(),
                reason: format!("{e}"),
            })
    }

    fn finish(&self, mut pos: Chess, mv: Move) -> AppliedMove {
        let mover = Side::from_chess(pos.turn());
        let san = San::from_move(&pos, mv.clone()).to_string();
        let (from, to, promotion) = match mv.to_uci(CastlingMode::Standard) {
            UciMove::Normal {
                from,
                to,
                promotion,
            } => (from.to_string(), to.to_string(), promotion.map(|r| r.char())),
            _ => (String::new(), mv.to().to_string(), None),
        };
        pos.play_unchecked(mv);
        let suffix = if pos.is_checkmate() {
            "#"
        } else if pos.is_check() {
            "+"
        } else {
            ""
        };
        AppliedMove {
            san: format!("{san}{suffix}"),
            fen: Fen::from_position(&pos, EnPassantMode::Legal).to_string(),
            mover,
            from,
            to,
            promotion,
        }
    }
}

fn parse_square(s: &str) -> Result<Square, RulesError> {
    s.trim()
        .to_ascii_lowercase()
        .parse::<Square>()
        .map_err(|_| RulesError::InvalidSquare(s.to_string()))
}

impl RulesEngine for ShakmatyRules {
    fn normalize(&self, position: &str) -> Result<String, RulesError> {
        let pos = self.load(position)?;
        Ok(Fen::from_position(&pos, EnPassantMode::Legal).to_string())
    }

    fn side_to_move(&self, position: &str) -> Result<Side, RulesError> {
        Ok(Side::from_chess(self.load(position)?.turn()))
    }

    fn apply(&self, position: &str, request: &MoveRequest) -> Result<AppliedMove, RulesError> {
        let pos = self.load(position)?;
        let from = parse_square(&request.from)?;
        let to = parse_square(&request.to)?;

        let promotion = match request.promotion {
            Some(c) => Some(
                Role::from_char(c.to_ascii_lowercase())
                    .ok_or(RulesError::InvalidPromotion(c))?,
            ),
            None => {
                // Pawn reaching the last rank promotes to a queen unless told otherwise
                let is_pawn = pos
                    .board()
                    .piece_at(from)
                    .is_some_and(|p| p.role == Role::Pawn);
                let last_rank = to.rank() == Rank::Eighth || to.rank() == Rank::First;
                (is_pawn && last_rank).then_some(Role::Queen)
            }
        };

        let uci = UciMove::Normal {
            from,
            to,
            promotion,
        };
        let mv = uci
            .to_move(&pos)
            .map_err(|_| RulesError::IllegalMove(uci.to_string()))?;
        Ok(self.finish(pos, mv))
    }

    fn apply_san(&self, position: &str, san: &str) -> Result<AppliedMove, RulesError> {
        let pos = self.load(position)?;
        let parsed: SanPlus = san
            .trim()
            .parse()
            .map_err(|_| RulesError::InvalidNotation(san.to_string()))?;
        let mv = parsed
            .san
            .to_move(&pos)
            .map_err(|_| RulesError::IllegalMove(san.to_string()))?;
        Ok(self.finish(pos, mv))
    }

    fn status(&self, position: &str) -> Result<PositionStatus, RulesError> {
        let pos = self.load(position)?;
        Ok(PositionStatus {
            check: pos.is_check(),
            checkmate: pos.is_checkmate(),
            stalemate: pos.is_stalemate(),
            insufficient_material: pos.is_insufficient_material(),
            fifty_move: pos.halfmoves() >= 100,
        })
    }
}

/// Repetition key of a FEN: placement, side to move, castling and en passant fields.
pub fn position_key(fen: &str) -> String {
    fen.split_whitespace().take(4).collect::<Vec<_>>().join(" ")
}

/// True when two FENs describe the same board, side to move and castling rights.
///
/// En passant and move counters are ignored because servers disagree on how
/// they are written.
pub fn same_position(a: &str, b: &str) -> bool {
    let head = |fen: &str| fen.split_whitespace().take(3).collect::<Vec<_>>().join(" ");
    head(a) == head(b)
}

/// Replay a SAN sequence from `start`, returning the FEN after each move.
pub fn replay<R: RulesEngine + ?Sized>(
    rules: &R,
    start: &str,
    sans: &[String],
) -> Result<Vec<String>, RulesError> {
    let mut fen = rules.normalize(start)?;
    let mut fens = Vec::with_capacity(sans.len());
    for san in sans {
        fen = rules.apply_san(&fen, san)?.fen;
        fens.push(fen.clone());
    }
    Ok(fens)
}
