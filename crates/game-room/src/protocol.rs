//! Wire formats: REST payloads and live channel frames.
//!
//! Live frames are JSON objects `{"event": name, "data": payload}`.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use chess_core::{GameResult, PlayMethod, PlayerDescriptor, Players, Side};

use crate::clock::ClockSnapshot;
use crate::error::{ProtocolFault, RoomError};
use crate::session::{HistoryEntry, MoverRef, SessionSnapshot, SessionStatus};

// ---- REST ----

/// Standard `{success, message, data}` response wrapper.
#[derive(Debug, Deserialize)]
pub struct ApiEnvelope<T> {
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub message: Option<String>,
    pub data: Option<T>,
}

impl<T> ApiEnvelope<T> {
    pub fn into_data(self) -> Result<T, RoomError> {
        match (self.success, self.data) {
            (true, Some(data)) => Ok(data),
            (_, _) => Err(RoomError::Api(
                self.message.unwrap_or_else(|| "request failed".to_string()),
            )),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct PlayerPayload {
    pub id: i64,
    pub name: String,
    #[serde(default, alias = "rating")]
    pub rank: Option<i32>,
}

#[derive(Debug, Deserialize)]
pub struct StarterPayload {
    pub name: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SnapshotPayload {
    pub white_player: PlayerPayload,
    pub black_player: PlayerPayload,
    #[serde(default)]
    pub started_by_user: Option<StarterPayload>,
    #[serde(default)]
    pub game_type: Option<String>,
    #[serde(default)]
    pub initial_time: Option<u32>,
    pub white_time_left: u32,
    pub black_time_left: u32,
    #[serde(default)]
    pub white_play_method: Option<PlayMethod>,
    #[serde(default)]
    pub black_play_method: Option<PlayMethod>,
    #[serde(default)]
    pub current_fen: Option<String>,
    #[serde(default, alias = "initialFen")]
    pub starting_fen: Option<String>,
    pub status: String,
    #[serde(default)]
    pub current_turn: Option<String>,
}

impl SnapshotPayload {
    pub fn into_snapshot(self, game_id: &str) -> Result<SessionSnapshot, RoomError> {
        let status = SessionStatus::parse(&self.status)
            .ok_or_else(|| RoomError::InvalidSnapshot(format!("unknown status {:?}", self.status)))?;
        let turn = match self.current_turn.as_deref() {
            Some(raw) => Some(
                Side::parse(raw)
                    .ok_or_else(|| RoomError::InvalidSnapshot(format!("unknown turn {raw:?}")))?,
            ),
            None => None,
        };

        let seat = |p: PlayerPayload, side, method: Option<PlayMethod>| PlayerDescriptor {
            id: p.id,
            name: p.name,
            rating: p.rank.unwrap_or(0),
            side,
            play_method: method.unwrap_or(PlayMethod::Unknown),
        };

        Ok(SessionSnapshot {
            game_id: game_id.to_string(),
            players: Players {
                white: seat(self.white_player, Side::White, self.white_play_method),
                black: seat(self.black_player, Side::Black, self.black_play_method),
            },
            started_by: self.started_by_user.map(|u| u.name),
            category: self.game_type.unwrap_or_else(|| "friend".to_string()),
            initial_time: self.initial_time.unwrap_or(self.white_time_left.max(self.black_time_left)),
            white_time_left: self.white_time_left,
            black_time_left: self.black_time_left,
            status,
            turn,
            position: self.current_fen.unwrap_or_default(),
            start_position: self.starting_fen.filter(|f| !f.trim().is_empty()),
        })
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryPayload {
    pub moved_by: Value,
    pub san: String,
    pub fen: String,
}

impl HistoryPayload {
    pub fn into_entry(self) -> Result<HistoryEntry, RoomError> {
        let mover = match &self.moved_by {
            Value::String(s) => match Side::parse(s) {
                Some(side) => MoverRef::Side(side),
                None => MoverRef::User(s.trim().parse().map_err(|_| {
                    RoomError::InvalidSnapshot(format!("unknown mover {s:?}"))
                })?),
            },
            Value::Number(n) => MoverRef::User(
                n.as_i64()
                    .ok_or_else(|| RoomError::InvalidSnapshot(format!("unknown mover {n}")))?,
            ),
            other => {
                return Err(RoomError::InvalidSnapshot(format!("unknown mover {other}")));
            }
        };
        Ok(HistoryEntry {
            mover,
            san: self.san,
            fen: self.fen,
        })
    }
}

// ---- Live channel, inbound ----

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Frame {
    pub event: String,
    #[serde(default)]
    pub data: Value,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteMove {
    pub san: String,
    pub fen: String,
    pub mover: Side,
    /// Entered on a physical board rather than the app
    pub physical: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LiveEvent {
    MoveMade(RemoteMove),
    ClockUpdate(ClockSnapshot),
    TurnUpdate { turn: Side },
    Timeout { winner: Side, reason: Option<String> },
    GameEnded { result: GameResult, reason: Option<String> },
    MoveAck,
    /// The server would not play the submitted move
    MoveRefused { reason: String },
    ServerError { message: String },
}

impl LiveEvent {
    /// Short name for logs.
    pub fn kind(&self) -> &'static str {
        match self {
            LiveEvent::MoveMade(_) => "moveMade",
            LiveEvent::ClockUpdate(_) => "clockUpdate",
            LiveEvent::TurnUpdate { .. } => "turnUpdate",
            LiveEvent::Timeout { .. } => "gameTimeout",
            LiveEvent::GameEnded { .. } => "gameEnded",
            LiveEvent::MoveAck => "moveAck",
            LiveEvent::MoveRefused { .. } => "invalidMove",
            LiveEvent::ServerError { .. } => "error",
        }
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct MoveMadePayload {
    san: String,
    fen: String,
    #[serde(default)]
    moved_by: Option<String>,
    #[serde(default)]
    is_physical_move: bool,
}

#[derive(Deserialize)]
struct TurnPayload {
    #[serde(rename = "currentTurn")]
    current_turn: String,
}

#[derive(Deserialize)]
struct TimeoutPayload {
    winner: String,
    #[serde(default)]
    reason: Option<String>,
}

#[derive(Deserialize)]
struct EndedPayload {
    result: String,
    #[serde(default)]
    reason: Option<String>,
}

fn malformed(event: &str, reason: impl Into<String>) -> ProtocolFault {
    ProtocolFault::Malformed {
        event: event.to_string(),
        reason: reason.into(),
    }
}

fn side_field(event: &str, field: &str, raw: &str) -> Result<Side, ProtocolFault> {
    Side::parse(raw).ok_or_else(|| malformed(event, format!("{field} {raw:?} is not a color")))
}

/// Non-negative whole seconds. Fractions are truncated; strings and negatives are refused.
fn seconds_field(event: &str, data: &Value, names: &[&str]) -> Result<u32, ProtocolFault> {
    let value = names
        .iter()
        .find_map(|name| data.get(*name))
        .ok_or_else(|| malformed(event, format!("missing {}", names[0])))?;
    if let Some(n) = value.as_u64() {
        return u32::try_from(n).map_err(|_| malformed(event, format!("{} out of range", names[0])));
    }
    match value.as_f64() {
        Some(f) if f.is_finite() && f >= 0.0 && f <= u32::MAX as f64 => Ok(f as u32),
        _ => Err(malformed(event, format!("{} is not a non-negative number: {value}", names[0]))),
    }
}

/// Decode one live frame. `Ok(None)` for events this client does not track.
pub fn decode_frame(text: &str) -> Result<Option<LiveEvent>, ProtocolFault> {
    let frame: Frame =
        serde_json::from_str(text).map_err(|e| malformed("frame", format!("undecodable: {e}")))?;
    decode_event(&frame.event, &frame.data)
}

pub fn decode_event(event: &str, data: &Value) -> Result<Option<LiveEvent>, ProtocolFault> {
    let parsed = match event {
        "moveMade" | "move_made" => {
            let p: MoveMadePayload =
                serde_json::from_value(data.clone()).map_err(|e| malformed(event, e.to_string()))?;
            let mover = match p.moved_by.as_deref() {
                Some(raw) => side_field(event, "movedBy", raw)?,
                // The position after the move has the other side to move
                None => p
                    .fen
                    .split_whitespace()
                    .nth(1)
                    .and_then(Side::parse)
                    .map(Side::opposite)
                    .ok_or_else(|| malformed(event, "no mover and no side to move in fen"))?,
            };
            LiveEvent::MoveMade(RemoteMove {
                san: p.san,
                fen: p.fen,
                mover,
                physical: p.is_physical_move,
            })
        }
        "clockUpdate" | "clock" => {
            let white = seconds_field(event, data, &["whiteTimeLeft", "whiteTime"])?;
            let black = seconds_field(event, data, &["blackTimeLeft", "blackTime"])?;
            let turn = data
                .get("currentTurn")
                .and_then(Value::as_str)
                .ok_or_else(|| malformed(event, "missing currentTurn"))?;
            LiveEvent::ClockUpdate(ClockSnapshot {
                white,
                black,
                turn: side_field(event, "currentTurn", turn)?,
            })
        }
        "turnUpdate" => {
            let p: TurnPayload =
                serde_json::from_value(data.clone()).map_err(|e| malformed(event, e.to_string()))?;
            LiveEvent::TurnUpdate {
                turn: side_field(event, "currentTurn", &p.current_turn)?,
            }
        }
        "gameTimeout" => {
            let p: TimeoutPayload =
                serde_json::from_value(data.clone()).map_err(|e| malformed(event, e.to_string()))?;
            LiveEvent::Timeout {
                winner: side_field(event, "winner", &p.winner)?,
                reason: p.reason,
            }
        }
        "gameEnded" => {
            let p: EndedPayload =
                serde_json::from_value(data.clone()).map_err(|e| malformed(event, e.to_string()))?;
            let result = match p.result.to_ascii_uppercase().as_str() {
                "WHITE_WIN" | "1-0" => GameResult::Winner(Side::White),
                "BLACK_WIN" | "0-1" => GameResult::Winner(Side::Black),
                "DRAW" | "1/2-1/2" => GameResult::Draw,
                other => return Err(malformed(event, format!("unknown result {other:?}"))),
            };
            LiveEvent::GameEnded {
                result,
                reason: p.reason,
            }
        }
        "moveAck" | "move_ack" => LiveEvent::MoveAck,
        "invalid_move" | "invalidMove" => {
            let from = data.get("from").and_then(Value::as_str).unwrap_or("?");
            let to = data.get("to").and_then(Value::as_str).unwrap_or("?");
            LiveEvent::MoveRefused {
                reason: format!("illegal move {from}{to}"),
            }
        }
        "error" => {
            let message = match data {
                Value::String(text) => text.clone(),
                _ => data
                    .get("message")
                    .and_then(Value::as_str)
                    .unwrap_or("unknown server error")
                    .to_string(),
            };
            LiveEvent::ServerError { message }
        }
        _ => return Ok(None),
    };
    Ok(Some(parsed))
}

// ---- Live channel, outbound ----

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MoveSubmission {
    pub game_id: String,
    pub from: String,
    pub to: String,
    pub promotion: String,
    pub san: String,
    pub fen: String,
    pub moved_by: Side,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outbound {
    Join { game_id: String },
    Leave { game_id: String },
    Move(MoveSubmission),
}

impl Outbound {
    pub fn to_frame(&self) -> Result<String, serde_json::Error> {
        let frame = match self {
            Outbound::Join { game_id } => Frame {
                event: "joinGameRoom".to_string(),
                data: serde_json::json!({ "gameId": game_id }),
            },
            Outbound::Leave { game_id } => Frame {
                event: "leaveGameRoom".to_string(),
                data: serde_json::json!({ "gameId": game_id }),
            },
            Outbound::Move(submission) => Frame {
                event: "move".to_string(),
                data: serde_json::to_value(submission)?,
            },
        };
        serde_json::to_string(&frame)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_clock_update_decodes() {
        let text = json!({
            "event": "clockUpdate",
            "data": { "whiteTimeLeft": 598, "blackTimeLeft": 600.0, "currentTurn": "white" }
        })
        .to_string();
        let event = decode_frame(&text).unwrap().unwrap();
        assert_eq!(
            event,
            LiveEvent::ClockUpdate(ClockSnapshot {
                white: 598,
                black: 600,
                turn: Side::White
            })
        );
    }

    #[test]
    fn test_clock_update_rejects_non_numeric() {
        let data = json!({ "whiteTimeLeft": "598", "blackTimeLeft": 600, "currentTurn": "w" });
        assert!(matches!(
            decode_event("clockUpdate", &data),
            Err(ProtocolFault::Malformed { .. })
        ));

        let data = json!({ "whiteTimeLeft": -3, "blackTimeLeft": 600, "currentTurn": "w" });
        assert!(decode_event("clockUpdate", &data).is_err());

        let data = json!({ "blackTimeLeft": 600, "currentTurn": "w" });
        assert!(decode_event("clockUpdate", &data).is_err());
    }

    #[test]
    fn test_move_made_infers_mover_from_fen() {
        let data = json!({
            "san": "e4",
            "fen": "rnbqkbnr/pppppppp/8/8/4P3/8/PPPP1PPP/RNBQKBNR b KQkq - 0 1",
        });
        let Some(LiveEvent::MoveMade(mv)) = decode_event("move_made", &data).unwrap() else {
            panic!("expected a move");
        };
        assert_eq!(mv.mover, Side::White);
        assert!(!mv.physical);
    }

    #[test]
    fn test_unknown_events_are_ignored() {
        assert_eq!(decode_event("chat_message", &json!({"message": "hi"})).unwrap(), None);
    }

    #[test]
    fn test_refusals_decode() {
        assert_eq!(
            decode_event("invalid_move", &json!({ "from": "e2", "to": "e5" })).unwrap(),
            Some(LiveEvent::MoveRefused {
                reason: "illegal move e2e5".into()
            })
        );
        assert_eq!(
            decode_event("error", &json!({ "message": "Not your turn" })).unwrap(),
            Some(LiveEvent::ServerError {
                message: "Not your turn".into()
            })
        );
    }

    #[test]
    fn test_game_ended_results() {
        let data = json!({ "result": "DRAW", "reason": "agreement" });
        assert_eq!(
            decode_event("gameEnded", &data).unwrap(),
            Some(LiveEvent::GameEnded {
                result: GameResult::Draw,
                reason: Some("agreement".into())
            })
        );
    }

    #[test]
    fn test_move_submission_frame() {
        let out = Outbound::Move(MoveSubmission {
            game_id: "12".into(),
            from: "e2".into(),
            to: "e4".into(),
            promotion: "q".into(),
            san: "e4".into(),
            fen: "fen".into(),
            moved_by: Side::White,
        });
        let frame: Value = serde_json::from_str(&out.to_frame().unwrap()).unwrap();
        assert_eq!(frame["event"], "move");
        assert_eq!(frame["data"]["gameId"], "12");
        assert_eq!(frame["data"]["movedBy"], "white");
    }

    #[test]
    fn test_snapshot_payload_maps_to_domain() {
        let payload: SnapshotPayload = serde_json::from_value(json!({
            "whitePlayer": { "id": 1, "name": "alice", "rank": 1400 },
            "blackPlayer": { "id": 2, "name": "bob", "rank": 1350 },
            "startedByUser": { "id": 1, "name": "alice" },
            "gameType": "friend",
            "initialTime": 600,
            "whiteTimeLeft": 598,
            "blackTimeLeft": 600,
            "whitePlayMethod": "phone",
            "blackPlayMethod": "physical_board",
            "currentFen": "startpos",
            "startingFen": "",
            "status": "in_progress"
        }))
        .unwrap();
        let snap = payload.into_snapshot("5").unwrap();
        assert_eq!(snap.status, SessionStatus::Active);
        assert_eq!(snap.players.black.play_method, PlayMethod::PhysicalBoard);
        assert_eq!(snap.turn, None);
        assert_eq!(snap.started_by.as_deref(), Some("alice"));
        assert_eq!(snap.start_position, None);
    }

    #[test]
    fn test_history_mover_forms() {
        let by_color: HistoryPayload =
            serde_json::from_value(json!({"movedBy": "black", "san": "e5", "fen": "x"})).unwrap();
        assert_eq!(by_color.into_entry().unwrap().mover, MoverRef::Side(Side::Black));
        let by_id: HistoryPayload =
            serde_json::from_value(json!({"movedBy": 2, "san": "e5", "fen": "x"})).unwrap();
        assert_eq!(by_id.into_entry().unwrap().mover, MoverRef::User(2));
    }
}
