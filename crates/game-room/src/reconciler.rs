//! Merges optimistic local moves and remote move events into one history.
//!
//! The reconciler never touches the session. It reads it and proposes a
//! [`MoveDelta`]; the controller decides whether to apply it.

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::debug;

use chess_core::rules::{position_key, same_position};
use chess_core::{AppliedMove, GameResult, MoveRequest, RulesEngine, Side, Termination};

use crate::error::{MoveRejection, ProtocolFault};
use crate::protocol::RemoteMove;
use crate::session::{GameSession, Move, MoveOrigin, SessionStatus};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncPhase {
    Idle,
    AwaitingConfirmation,
    Synced,
}

/// A move ready to be appended to the session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MoveDelta {
    pub applied: AppliedMove,
    pub record: Move,
    pub next_turn: Side,
    pub in_check: bool,
    pub ending: Option<(GameResult, Termination)>,
    /// Optimistic move this delta implicitly confirms
    pub confirms: Option<usize>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemoteOutcome {
    Applied(MoveDelta),
    /// Our own move coming back; confirms the optimistic entry when it matches
    Echo { confirms: Option<usize> },
    Duplicate,
    Fault(ProtocolFault),
}

#[derive(Debug, Clone)]
pub struct MoveReconciler {
    phase: SyncPhase,
    pending: Option<usize>,
}

impl Default for MoveReconciler {
    fn default() -> Self {
        Self::new()
    }
}

impl MoveReconciler {
    pub fn new() -> Self {
        Self {
            phase: SyncPhase::Idle,
            pending: None,
        }
    }

    pub fn phase(&self) -> SyncPhase {
        self.phase
    }

    pub fn pending(&self) -> Option<usize> {
        self.pending
    }

    /// Start over from a freshly loaded history.
    pub fn reset(&mut self, history_len: usize) {
        self.pending = None;
        self.phase = if history_len == 0 {
            SyncPhase::Idle
        } else {
            SyncPhase::Synced
        };
    }

    /// Validate a move intent of the local player.
    pub fn propose_local<R: RulesEngine + ?Sized>(
        &self,
        rules: &R,
        session: &GameSession,
        me: Side,
        request: &MoveRequest,
        at: DateTime<Utc>,
    ) -> Result<MoveDelta, MoveRejection> {
        if session.status != SessionStatus::Active {
            return Err(MoveRejection::NotActive);
        }
        if session.turn != me {
            return Err(MoveRejection::NotYourTurn { turn: session.turn });
        }
        let to_move = rules.side_to_move(&session.position)?;
        if to_move != me {
            return Err(MoveRejection::NotYourTurn { turn: to_move });
        }

        let applied = rules.apply(&session.position, request)?;
        Ok(self.build_delta(rules, session, applied, MoveOrigin::LocalOptimistic, None, at))
    }

    /// Decide what a remote move event means for the current session.
    pub fn accept_remote<R: RulesEngine + ?Sized>(
        &self,
        rules: &R,
        session: &GameSession,
        me: Side,
        event: &RemoteMove,
        at: DateTime<Utc>,
    ) -> RemoteOutcome {
        if event.mover == me {
            return RemoteOutcome::Echo {
                confirms: self.matching_pending(session, &event.fen),
            };
        }

        // Only a redelivery of that side's latest move is a duplicate; an
        // earlier match is a repetition and has to be played
        let latest = session.moves.iter().rev().find(|m| m.mover == event.mover);
        if let Some(mv) = latest {
            if san_body(&mv.san) == san_body(&event.san) && same_position(&mv.fen, &event.fen) {
                debug!(san = %event.san, index = mv.index, "Remote move already in history");
                return RemoteOutcome::Duplicate;
            }
        }

        let fault = |reason: String| {
            RemoteOutcome::Fault(ProtocolFault::Inapplicable {
                san: event.san.clone(),
                mover: event.mover,
                reason,
            })
        };

        if session.status == SessionStatus::Finished {
            return fault("game already finished".to_string());
        }

        match rules.side_to_move(&session.position) {
            Ok(side) if side == event.mover => {}
            Ok(side) => return fault(format!("{side} is to move")),
            Err(e) => return fault(e.to_string()),
        }

        let applied = match rules.apply_san(&session.position, &event.san) {
            Ok(applied) => applied,
            Err(e) => return fault(e.to_string()),
        };
        if !same_position(&applied.fen, &event.fen) {
            return fault(format!(
                "expected position {} but server reported {}",
                applied.fen, event.fen
            ));
        }

        let origin = if event.physical {
            MoveOrigin::PhysicalDevice
        } else {
            MoveOrigin::RemoteConfirmed
        };
        // The server only relays the opponent's reply once it accepted ours
        let confirms = self.pending;
        RemoteOutcome::Applied(self.build_delta(rules, session, applied, origin, confirms, at))
    }

    /// Record that `delta` was applied.
    pub fn commit(&mut self, delta: &MoveDelta) {
        match delta.record.origin {
            MoveOrigin::LocalOptimistic => {
                self.pending = Some(delta.record.index);
                self.phase = SyncPhase::AwaitingConfirmation;
            }
            MoveOrigin::RemoteConfirmed | MoveOrigin::PhysicalDevice => {
                self.pending = None;
                self.phase = SyncPhase::Synced;
            }
        }
    }

    /// The pending optimistic move was confirmed by the server. Returns its index.
    pub fn confirm(&mut self) -> Option<usize> {
        let index = self.pending.take()?;
        self.phase = SyncPhase::Synced;
        Some(index)
    }

    fn matching_pending(&self, session: &GameSession, fen: &str) -> Option<usize> {
        let index = self.pending?;
        let mv = session.moves.get(index.checked_sub(1)?)?;
        same_position(&mv.fen, fen).then_some(index)
    }

    fn build_delta<R: RulesEngine + ?Sized>(
        &self,
        rules: &R,
        session: &GameSession,
        applied: AppliedMove,
        origin: MoveOrigin,
        confirms: Option<usize>,
        at: DateTime<Utc>,
    ) -> MoveDelta {
        let record = Move {
            index: session.moves.len() + 1,
            mover: applied.mover,
            san: applied.san.clone(),
            fen: applied.fen.clone(),
            origin,
            recorded_at: at,
        };
        let (in_check, ending) = derive_ending(rules, session, &applied);
        MoveDelta {
            next_turn: applied.mover.opposite(),
            applied,
            record,
            in_check,
            ending,
            confirms,
        }
    }
}

/// Check flag and game ending after `applied`, including threefold repetition.
fn derive_ending<R: RulesEngine + ?Sized>(
    rules: &R,
    session: &GameSession,
    applied: &AppliedMove,
) -> (bool, Option<(GameResult, Termination)>) {
    let status = match rules.status(&applied.fen) {
        Ok(status) => status,
        Err(_) => return (false, None),
    };

    let ending = if status.checkmate {
        Some((GameResult::Winner(applied.mover), Termination::Checkmate))
    } else if status.stalemate {
        Some((GameResult::Draw, Termination::Stalemate))
    } else if status.insufficient_material {
        Some((GameResult::Draw, Termination::InsufficientMaterial))
    } else if status.fifty_move {
        Some((GameResult::Draw, Termination::FiftyMoveRule))
    } else {
        let key = position_key(&applied.fen);
        let seen = std::iter::once(session.start_position.as_str())
            .chain(session.moves.iter().map(|m| m.fen.as_str()))
            .filter(|fen| position_key(fen) == key)
            .count();
        (seen + 1 >= 3).then_some((GameResult::Draw, Termination::ThreefoldRepetition))
    };

    (status.check, ending)
}

/// SAN without check, mate or annotation suffixes.
fn san_body(san: &str) -> &str {
    san.trim().trim_end_matches(['+', '#', '!', '?'])
}
