//! Game Session Controller.
//!
//! `GameRoom` owns the session and reacts to one [`RoomEvent`] at a time,
//! answering with the [`Effect`]s the driver has to carry out. It never does
//! I/O itself and never reads the clock; `now` is passed in with each event.

use std::time::{Duration, Instant};

use chrono::Utc;
use serde::Serialize;
use tracing::{debug, error, info, warn};

use chess_core::pgn::{render_pgn, PgnHeaders};
use chess_core::rules::{same_position, STANDARD_START_FEN};
use chess_core::{GameResult, MoveRequest, RulesEngine, Side, Termination, UserId};

use crate::clock::{ClockReading, ClockSnapshot, ClockSynchronizer};
use crate::config::RoomTimings;
use crate::error::{MoveRejection, ProtocolFault};
use crate::health::{HealthMonitor, LinkStatus, TransportSignal};
use crate::perspective::{Perspective, SeatClocks};
use crate::protocol::{LiveEvent, MoveSubmission};
use crate::reconciler::{MoveDelta, MoveReconciler, RemoteOutcome, SyncPhase};
use crate::session::{
    GameSession, HistoryEntry, LoadedSession, Move, MoveOrigin, MoverRef, SessionSnapshot,
    SessionStatus,
};

/// Everything the room reacts to.
#[derive(Debug, Clone)]
pub enum RoomEvent {
    SnapshotLoaded { game_id: String, loaded: LoadedSession },
    SnapshotFailed { game_id: String, reason: String },
    LocalMove(MoveRequest),
    Live { game_id: String, event: LiveEvent },
    MalformedLive { game_id: String, fault: ProtocolFault },
    MoveSendFailed { game_id: String, reason: String },
    Transport(TransportSignal),
    HealthTick,
    RejoinDue { game_id: String },
    Leave,
}

/// Work the driver carries out on behalf of the room.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    LoadSnapshot { game_id: String },
    Join { game_id: String },
    Leave { game_id: String },
    ScheduleRejoin { game_id: String, after: Duration },
    SubmitMove(MoveSubmission),
    Notify(Notice),
}

/// User-facing notifications.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Notice {
    MoveRejected { reason: String },
    Fatal { reason: String },
    GameOver {
        result: GameResult,
        termination: Termination,
    },
    SnapshotFailed { reason: String },
    SendFailed { reason: String },
    Connection { status: LinkStatus },
    Rejoining { attempt: u32 },
}

/// Immutable picture of the room at one instant.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RoomView {
    pub game_id: Option<String>,
    pub status: Option<SessionStatus>,
    pub turn: Option<Side>,
    pub result: Option<GameResult>,
    pub termination: Option<Termination>,
    pub in_check: bool,
    pub position: Option<String>,
    pub moves: Vec<Move>,
    pub perspective: Option<Perspective>,
    pub clocks: Option<ClockReading>,
    pub seat_clocks: Option<SeatClocks>,
    pub connection: LinkStatus,
    pub retry_count: u32,
    pub sync: SyncPhase,
    pub is_my_turn: bool,
    pub last_move_origin: Option<MoveOrigin>,
    pub fatal: Option<String>,
}

pub struct GameRoom<R> {
    rules: R,
    local: UserId,
    timings: RoomTimings,
    game_id: Option<String>,
    joined: bool,
    session: Option<GameSession>,
    perspective: Option<Perspective>,
    clock: Option<ClockSynchronizer>,
    last_clock: Option<ClockSnapshot>,
    reconciler: MoveReconciler,
    health: HealthMonitor,
    fatal: Option<String>,
    /// A resync for a turn mismatch is already in flight
    turn_resync: bool,
}

impl<R: RulesEngine> GameRoom<R> {
    pub fn new(rules: R, local: UserId, timings: RoomTimings) -> Self {
        Self {
            rules,
            local,
            timings,
            game_id: None,
            joined: false,
            session: None,
            perspective: None,
            clock: None,
            last_clock: None,
            reconciler: MoveReconciler::new(),
            health: HealthMonitor::new(timings.staleness_threshold, timings.rejoin_delay),
            fatal: None,
            turn_resync: false,
        }
    }

    pub fn game_id(&self) -> Option<&str> {
        self.game_id.as_deref()
    }

    pub fn session(&self) -> Option<&GameSession> {
        self.session.as_ref()
    }

    pub fn perspective(&self) -> Option<&Perspective> {
        self.perspective.as_ref()
    }

    pub fn clock(&self) -> Option<&ClockSynchronizer> {
        self.clock.as_ref()
    }

    pub fn health(&self) -> &HealthMonitor {
        &self.health
    }

    pub fn reconciler(&self) -> &MoveReconciler {
        &self.reconciler
    }

    pub fn timings(&self) -> RoomTimings {
        self.timings
    }

    /// Start showing `game_id`. An open room for another game is left first.
    pub fn open(&mut self, game_id: &str) -> Vec<Effect> {
        let mut effects = Vec::new();
        if self.game_id.as_deref() == Some(game_id) {
            return effects;
        }
        if self.game_id.is_some() {
            effects.extend(self.teardown());
        }
        info!(game_id, "Opening game room");
        self.game_id = Some(game_id.to_string());
        effects.push(Effect::LoadSnapshot {
            game_id: game_id.to_string(),
        });
        effects
    }

    pub fn handle(&mut self, event: RoomEvent, now: Instant) -> Vec<Effect> {
        match event {
            RoomEvent::SnapshotLoaded { game_id, loaded } => {
                if !self.is_current(&game_id, "snapshot") {
                    return Vec::new();
                }
                self.on_snapshot(loaded, now)
            }
            RoomEvent::SnapshotFailed { game_id, reason } => {
                if !self.is_current(&game_id, "snapshot failure") {
                    return Vec::new();
                }
                warn!(game_id, %reason, "Snapshot load failed");
                vec![Effect::Notify(Notice::SnapshotFailed { reason })]
            }
            RoomEvent::LocalMove(request) => self.on_local_move(&request, now),
            RoomEvent::Live { game_id, event } => {
                if !self.is_current(&game_id, event.kind()) || self.session.is_none() {
                    return Vec::new();
                }
                self.on_live(event, now)
            }
            RoomEvent::MalformedLive { game_id, fault } => {
                if self.is_current(&game_id, "malformed frame") {
                    warn!(game_id, %fault, "Dropping live event");
                }
                Vec::new()
            }
            RoomEvent::MoveSendFailed { game_id, reason } => {
                if !self.is_current(&game_id, "send failure") {
                    return Vec::new();
                }
                warn!(game_id, %reason, "Move could not be sent, resyncing");
                vec![
                    Effect::Notify(Notice::SendFailed { reason }),
                    Effect::LoadSnapshot { game_id },
                ]
            }
            RoomEvent::Transport(signal) => {
                let before = self.health.state().status;
                self.health.on_transport(signal, now);
                let after = self.health.state().status;
                if before == after {
                    return Vec::new();
                }
                vec![Effect::Notify(Notice::Connection { status: after })]
            }
            RoomEvent::HealthTick => self.on_health_tick(now),
            RoomEvent::RejoinDue { game_id } => {
                if !self.is_current(&game_id, "rejoin") {
                    return Vec::new();
                }
                info!(game_id, "Rejoining live channel");
                self.joined = true;
                vec![
                    Effect::Join {
                        game_id: game_id.clone(),
                    },
                    Effect::LoadSnapshot { game_id },
                ]
            }
            RoomEvent::Leave => self.teardown(),
        }
    }

    fn is_current(&self, game_id: &str, what: &str) -> bool {
        let current = self.game_id.as_deref() == Some(game_id);
        if !current {
            debug!(game_id, what, "Discarding event for another session");
        }
        current
    }

    fn teardown(&mut self) -> Vec<Effect> {
        let mut effects = Vec::new();
        if let Some(game_id) = self.game_id.take() {
            info!(game_id, "Leaving game room");
            if self.joined {
                effects.push(Effect::Leave { game_id });
            }
        }
        self.joined = false;
        self.session = None;
        self.perspective = None;
        self.clock = None;
        self.last_clock = None;
        self.fatal = None;
        self.turn_resync = false;
        self.reconciler = MoveReconciler::new();
        self.health.disarm();
        effects
    }

    fn on_snapshot(&mut self, loaded: LoadedSession, now: Instant) -> Vec<Effect> {
        if self.fatal.is_some() {
            return Vec::new();
        }
        let LoadedSession { snapshot, history } = loaded;

        let perspective = match &self.perspective {
            Some(p) => p.clone(),
            None => match Perspective::resolve(&snapshot.players, self.local) {
                Ok(p) => p,
                Err(e) => {
                    let reason = e.to_string();
                    error!(game_id = %snapshot.game_id, %reason, "Cannot show this game");
                    self.fatal = Some(reason.clone());
                    self.health.disarm();
                    return vec![Effect::Notify(Notice::Fatal { reason })];
                }
            },
        };

        let session = match self.build_session(snapshot.clone(), &history) {
            Ok(session) => session,
            Err(reason) => {
                warn!(game_id = %snapshot.game_id, %reason, "Snapshot rejected");
                return vec![Effect::Notify(Notice::SnapshotFailed { reason })];
            }
        };

        let running = (session.status == SessionStatus::Active).then_some(session.turn);
        self.clock = Some(ClockSynchronizer::new(
            snapshot.white_time_left,
            snapshot.black_time_left,
            running,
            now,
        ));
        self.last_clock = None;
        self.turn_resync = false;
        self.reconciler.reset(session.moves.len());
        if session.status == SessionStatus::Active {
            self.health.arm(now);
        } else {
            self.health.disarm();
        }

        info!(
            game_id = %session.id,
            side = %perspective.my_side(),
            status = ?session.status,
            moves = session.moves.len(),
            "Session loaded"
        );
        self.perspective = Some(perspective);
        self.session = Some(session);

        let mut effects = Vec::new();
        if !self.joined {
            self.joined = true;
            effects.push(Effect::Join {
                game_id: snapshot.game_id,
            });
        }
        effects
    }

    fn build_session(
        &self,
        snapshot: SessionSnapshot,
        history: &[HistoryEntry],
    ) -> Result<GameSession, String> {
        let position = self
            .rules
            .normalize(&snapshot.position)
            .map_err(|e| e.to_string())?;
        let to_move = self.rules.side_to_move(&position).map_err(|e| e.to_string())?;
        let turn = snapshot.turn.unwrap_or(to_move);
        let start_position = match snapshot.start_position.as_deref() {
            Some(fen) => self.rules.normalize(fen).map_err(|e| e.to_string())?,
            // With no moves played the current position is where the game began
            None if history.is_empty() => position.clone(),
            None => STANDARD_START_FEN.to_string(),
        };
        let moves = self.replay_history(&snapshot, history, &start_position);

        if let Some(last) = moves.last() {
            if !same_position(&last.fen, &position) {
                warn!(
                    game_id = %snapshot.game_id,
                    history = %last.fen,
                    snapshot = %position,
                    "History does not end at the snapshot position"
                );
            }
        }

        let status = self.rules.status(&position).map_err(|e| e.to_string())?;
        let (result, termination) = if snapshot.status == SessionStatus::Finished {
            if status.checkmate {
                (Some(GameResult::Winner(to_move.opposite())), Some(Termination::Checkmate))
            } else if status.stalemate {
                (Some(GameResult::Draw), Some(Termination::Stalemate))
            } else {
                (None, None)
            }
        } else {
            (None, None)
        };

        Ok(GameSession {
            id: snapshot.game_id,
            players: snapshot.players,
            started_by: snapshot.started_by,
            category: snapshot.category,
            initial_time: snapshot.initial_time,
            start_position,
            position,
            status: snapshot.status,
            turn,
            result,
            termination,
            in_check: status.check,
            moves,
        })
    }

    /// Rebuild history as confirmed moves. Entries the rules engine cannot
    /// follow are kept as the server reported them.
    fn replay_history(
        &self,
        snapshot: &SessionSnapshot,
        history: &[HistoryEntry],
        start: &str,
    ) -> Vec<Move> {
        let at = Utc::now();
        let mut cursor = Some(start.to_string());
        let mut moves = Vec::with_capacity(history.len());

        for (i, entry) in history.iter().enumerate() {
            let reported = match &entry.mover {
                MoverRef::Side(side) => Some(*side),
                MoverRef::User(id) => snapshot.players.side_of(*id),
            };
            let replayed = cursor
                .as_deref()
                .and_then(|fen| self.rules.apply_san(fen, &entry.san).ok())
                .filter(|applied| same_position(&applied.fen, &entry.fen));

            let (mover, san) = match replayed {
                Some(applied) => {
                    cursor = Some(applied.fen);
                    (applied.mover, applied.san)
                }
                None => {
                    if cursor.take().is_some() {
                        warn!(index = i + 1, san = %entry.san, "History diverges from replay");
                    }
                    let parity = if i % 2 == 0 { Side::White } else { Side::Black };
                    (reported.unwrap_or(parity), entry.san.clone())
                }
            };

            moves.push(Move {
                index: i + 1,
                mover,
                san,
                fen: entry.fen.clone(),
                origin: MoveOrigin::RemoteConfirmed,
                recorded_at: at,
            });
        }
        moves
    }

    fn on_local_move(&mut self, request: &MoveRequest, now: Instant) -> Vec<Effect> {
        let (Some(session), Some(perspective)) = (&self.session, &self.perspective) else {
            return reject(MoveRejection::NoSession);
        };
        let me = perspective.my_side();

        let delta = match self
            .reconciler
            .propose_local(&self.rules, session, me, request, Utc::now())
        {
            Ok(delta) => delta,
            Err(rejection) => return reject(rejection),
        };

        let submission = MoveSubmission {
            game_id: session.id.clone(),
            from: delta.applied.from.clone(),
            to: delta.applied.to.clone(),
            promotion: delta
                .applied
                .promotion
                .map(|p| p.to_string())
                .unwrap_or_else(|| "q".to_string()),
            san: delta.applied.san.clone(),
            fen: delta.applied.fen.clone(),
            moved_by: me,
        };
        debug!(san = %submission.san, "Optimistic move applied");

        let mut effects = vec![Effect::SubmitMove(submission)];
        effects.extend(self.apply_delta(delta, now));
        effects
    }

    fn on_live(&mut self, event: LiveEvent, now: Instant) -> Vec<Effect> {
        self.health.record_event(now);
        let finished = self
            .session
            .as_ref()
            .is_some_and(|s| s.status == SessionStatus::Finished);

        match event {
            LiveEvent::MoveMade(remote) => {
                let (Some(session), Some(perspective)) = (&self.session, &self.perspective) else {
                    return Vec::new();
                };
                let outcome = self.reconciler.accept_remote(
                    &self.rules,
                    session,
                    perspective.my_side(),
                    &remote,
                    Utc::now(),
                );
                match outcome {
                    RemoteOutcome::Applied(delta) => {
                        if let Some(index) = delta.confirms {
                            self.mark_confirmed(index);
                        }
                        self.apply_delta(delta, now)
                    }
                    RemoteOutcome::Echo {
                        confirms: Some(index),
                    } => {
                        self.reconciler.confirm();
                        self.mark_confirmed(index);
                        Vec::new()
                    }
                    RemoteOutcome::Echo { confirms: None } => {
                        debug!(san = %remote.san, "Echo of own move");
                        Vec::new()
                    }
                    RemoteOutcome::Duplicate => Vec::new(),
                    RemoteOutcome::Fault(fault) => {
                        warn!(%fault, "Discarding remote move");
                        if fault.needs_resync() {
                            self.resync()
                        } else {
                            Vec::new()
                        }
                    }
                }
            }
            LiveEvent::ClockUpdate(snapshot) => {
                if finished {
                    return Vec::new();
                }
                if self.last_clock == Some(snapshot) {
                    debug!("Identical clock snapshot");
                    return Vec::new();
                }
                self.last_clock = Some(snapshot);
                if let Some(clock) = &mut self.clock {
                    clock.apply_snapshot(snapshot, now);
                }
                if let Some(session) = &mut self.session {
                    session.turn = snapshot.turn;
                }
                self.check_turn(snapshot.turn)
            }
            LiveEvent::TurnUpdate { turn } => {
                if finished {
                    return Vec::new();
                }
                if let Some(clock) = &mut self.clock {
                    clock.apply_turn(turn, now);
                }
                if let Some(session) = &mut self.session {
                    session.turn = turn;
                }
                self.check_turn(turn)
            }
            LiveEvent::Timeout { winner, reason } => {
                info!(%winner, reason = reason.as_deref().unwrap_or(""), "Game timed out");
                self.finish(GameResult::Winner(winner), Termination::Timeout, now)
            }
            LiveEvent::GameEnded { result, reason } => {
                info!(?result, reason = reason.as_deref().unwrap_or(""), "Game ended by server");
                self.finish(result, Termination::ServerDeclared, now)
            }
            LiveEvent::MoveAck => {
                if let Some(index) = self.reconciler.confirm() {
                    self.mark_confirmed(index);
                }
                Vec::new()
            }
            LiveEvent::MoveRefused { reason } => self.on_refused(reason),
            // Errors carry no move reference; one arriving while a move is
            // pending is taken as the answer to it
            LiveEvent::ServerError { message } => self.on_refused(message),
        }
    }

    /// The server turned down the pending optimistic move.
    fn on_refused(&mut self, reason: String) -> Vec<Effect> {
        let Some(index) = self.reconciler.pending() else {
            warn!(%reason, "Server error with no move pending");
            return Vec::new();
        };
        let Some(session) = &mut self.session else {
            return Vec::new();
        };
        warn!(index, %reason, "Server refused move, rolling back");

        let is_tail = session.moves.len() == index
            && session
                .last_move()
                .is_some_and(|m| m.origin == MoveOrigin::LocalOptimistic);
        if is_tail {
            if let Some(undone) = session.moves.pop() {
                session.position = session
                    .last_move()
                    .map(|m| m.fen.clone())
                    .unwrap_or_else(|| session.start_position.clone());
                session.turn = undone.mover;
                session.in_check = self
                    .rules
                    .status(&session.position)
                    .is_ok_and(|status| status.check);
            }
        }
        self.reconciler.reset(session.moves.len());

        let mut effects = vec![Effect::Notify(Notice::MoveRejected { reason })];
        effects.extend(self.resync());
        effects
    }

    /// Resync once when the server's turn cannot be reached from the local position.
    fn check_turn(&mut self, turn: Side) -> Vec<Effect> {
        if self.reconciler.pending().is_some() {
            return Vec::new();
        }
        let Some(session) = &self.session else {
            return Vec::new();
        };
        match self.rules.side_to_move(&session.position) {
            Ok(side) if side == turn => {
                self.turn_resync = false;
                Vec::new()
            }
            Ok(side) => {
                if self.turn_resync {
                    return Vec::new();
                }
                warn!(%turn, position_turn = %side, "Server turn disagrees with position, resyncing");
                self.turn_resync = true;
                self.resync()
            }
            Err(_) => Vec::new(),
        }
    }

    fn on_health_tick(&mut self, now: Instant) -> Vec<Effect> {
        let active = self
            .session
            .as_ref()
            .is_some_and(|s| s.status == SessionStatus::Active);
        let Some(game_id) = self.game_id.clone() else {
            return Vec::new();
        };
        let Some(plan) = self.health.check(now, active) else {
            return Vec::new();
        };

        self.joined = false;
        vec![
            Effect::Notify(Notice::Rejoining {
                attempt: plan.attempt,
            }),
            Effect::Leave {
                game_id: game_id.clone(),
            },
            Effect::ScheduleRejoin {
                game_id,
                after: plan.delay,
            },
        ]
    }

    fn apply_delta(&mut self, delta: MoveDelta, now: Instant) -> Vec<Effect> {
        let Some(session) = &mut self.session else {
            return Vec::new();
        };
        self.reconciler.commit(&delta);
        session.position = delta.record.fen.clone();
        session.turn = delta.next_turn;
        session.in_check = delta.in_check;
        session.moves.push(delta.record);

        match delta.ending {
            Some((result, termination)) => self.finish(result, termination, now),
            None => Vec::new(),
        }
    }

    fn finish(&mut self, result: GameResult, termination: Termination, now: Instant) -> Vec<Effect> {
        let Some(session) = &mut self.session else {
            return Vec::new();
        };
        if !session.finish(result, termination) {
            return Vec::new();
        }
        info!(game_id = %session.id, ?result, ?termination, "Game over");
        if let Some(clock) = &mut self.clock {
            clock.stop(now);
        }
        self.health.disarm();
        vec![Effect::Notify(Notice::GameOver {
            result,
            termination,
        })]
    }

    fn mark_confirmed(&mut self, index: usize) {
        let Some(session) = &mut self.session else {
            return;
        };
        if let Some(mv) = index.checked_sub(1).and_then(|i| session.moves.get_mut(i)) {
            if mv.origin == MoveOrigin::LocalOptimistic {
                debug!(index, san = %mv.san, "Optimistic move confirmed");
                mv.origin = MoveOrigin::RemoteConfirmed;
            }
        }
    }

    fn resync(&self) -> Vec<Effect> {
        match &self.game_id {
            Some(game_id) => vec![Effect::LoadSnapshot {
                game_id: game_id.clone(),
            }],
            None => Vec::new(),
        }
    }

    pub fn view(&self, now: Instant) -> RoomView {
        let session = self.session.as_ref();
        let clocks = self.clock.as_ref().map(|c| c.project(now));
        let seat_clocks = match (&self.perspective, &clocks) {
            (Some(p), Some(reading)) => Some(p.seat_clocks(reading)),
            _ => None,
        };
        let is_my_turn = match (session, &self.perspective) {
            (Some(s), Some(p)) => s.status == SessionStatus::Active && p.is_me(s.turn),
            _ => false,
        };
        let connection = self.health.state();

        RoomView {
            game_id: self.game_id.clone(),
            status: session.map(|s| s.status),
            turn: session.map(|s| s.turn),
            result: session.and_then(|s| s.result),
            termination: session.and_then(|s| s.termination),
            in_check: session.is_some_and(|s| s.in_check),
            position: session.map(|s| s.position.clone()),
            moves: session.map(|s| s.moves.clone()).unwrap_or_default(),
            perspective: self.perspective.clone(),
            clocks,
            seat_clocks,
            connection: connection.status,
            retry_count: connection.retry_count,
            sync: self.reconciler.phase(),
            is_my_turn,
            last_move_origin: session.and_then(|s| s.last_move()).map(|m| m.origin),
            fatal: self.fatal.clone(),
        }
    }

    /// Export the session history as PGN.
    pub fn pgn(&self) -> Option<String> {
        let session = self.session.as_ref()?;
        let headers = PgnHeaders {
            event: Some(format!("Game {}", session.id)),
            white: session.players.white.name.clone(),
            black: session.players.black.name.clone(),
            date: session
                .moves
                .first()
                .map(|m| m.recorded_at.format("%Y.%m.%d").to_string()),
            time_control: (session.initial_time > 0).then(|| session.initial_time.to_string()),
            start_fen: Some(session.start_position.clone()),
        };
        Some(render_pgn(&headers, &session.sans(), session.result))
    }
}

fn reject(rejection: MoveRejection) -> Vec<Effect> {
    debug!(%rejection, "Local move rejected");
    vec![Effect::Notify(Notice::MoveRejected {
        reason: rejection.to_string(),
    })]
}
