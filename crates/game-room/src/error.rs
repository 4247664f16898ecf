use chess_core::{RulesError, Side, UserId};

/// Failures of the network boundary and session setup.
#[derive(Debug, thiserror::Error)]
pub enum RoomError {
    #[error("Configuration error: {0}")]
    Config(&'static str),

    #[error("API error: {0}")]
    Api(String),

    #[error("Snapshot rejected: {0}")]
    InvalidSnapshot(String),

    #[error("User {user_id} is not a player in this game")]
    NotAParticipant { user_id: UserId },

    #[error("Live channel closed")]
    ChannelClosed,

    #[error(transparent)]
    Http(#[from] reqwest::Error),

    #[error(transparent)]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

/// Local move intents the room refuses; the session is left untouched.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MoveRejection {
    #[error("No game is loaded")]
    NoSession,

    #[error("The game is not in progress")]
    NotActive,

    #[error("It is {turn}'s turn")]
    NotYourTurn { turn: Side },

    #[error("Illegal move: {0}")]
    Illegal(#[from] RulesError),
}

/// Remote events that cannot be applied as received.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProtocolFault {
    #[error("move {san:?} by {mover} does not apply to the current position: {reason}")]
    Inapplicable {
        san: String,
        mover: Side,
        reason: String,
    },

    #[error("malformed {event} payload: {reason}")]
    Malformed { event: String, reason: String },
}

impl ProtocolFault {
    /// Faults that leave the local position in doubt and need a full resync.
    pub fn needs_resync(&self) -> bool {
        matches!(self, ProtocolFault::Inapplicable { .. })
    }
}
