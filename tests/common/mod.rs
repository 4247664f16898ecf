#![allow(dead_code)]

use std::time::Instant;

use chess_core::rules::STANDARD_START_FEN;
use chess_core::{PlayMethod, PlayerDescriptor, Players, RulesEngine, ShakmatyRules, Side};
use game_room::config::RoomTimings;
use game_room::protocol::{LiveEvent, RemoteMove};
use game_room::session::{HistoryEntry, LoadedSession, MoverRef, SessionSnapshot, SessionStatus};
use game_room::{Effect, GameRoom, RoomEvent};

pub const GAME_ID: &str = "42";
pub const WHITE_ID: i64 = 1;
pub const BLACK_ID: i64 = 2;

pub fn players() -> Players {
    let seat = |id, name: &str, side, play_method| PlayerDescriptor {
        id,
        name: name.to_string(),
        rating: 1500,
        side,
        play_method,
    };
    Players {
        white: seat(WHITE_ID, "alice", Side::White, PlayMethod::Phone),
        black: seat(BLACK_ID, "bob", Side::Black, PlayMethod::PhysicalBoard),
    }
}

pub fn snapshot(status: SessionStatus, white: u32, black: u32) -> SessionSnapshot {
    SessionSnapshot {
        game_id: GAME_ID.to_string(),
        players: players(),
        started_by: Some("alice".to_string()),
        category: "friend".to_string(),
        initial_time: 600,
        white_time_left: white,
        black_time_left: black,
        status,
        turn: None,
        position: "startpos".to_string(),
        start_position: None,
    }
}

/// Snapshot positioned after `sans`, with the matching history.
pub fn loaded_after(sans: &[&str], white: u32, black: u32) -> LoadedSession {
    loaded_from(STANDARD_START_FEN, sans, white, black)
}

/// Like [`loaded_after`] for a game that began at `start`.
pub fn loaded_from(start: &str, sans: &[&str], white: u32, black: u32) -> LoadedSession {
    let rules = ShakmatyRules;
    let mut position = start.to_string();
    let mut history = Vec::new();
    for san in sans {
        let applied = rules.apply_san(&position, san).unwrap();
        history.push(HistoryEntry {
            mover: MoverRef::Side(applied.mover),
            san: applied.san.clone(),
            fen: applied.fen.clone(),
        });
        position = applied.fen;
    }
    let mut snap = snapshot(SessionStatus::Active, white, black);
    snap.position = position;
    if start != STANDARD_START_FEN {
        snap.start_position = Some(start.to_string());
    }
    LoadedSession {
        snapshot: snap,
        history,
    }
}

pub fn room(local: i64) -> GameRoom<ShakmatyRules> {
    GameRoom::new(ShakmatyRules, local, RoomTimings::default())
}

/// A room for `local` with an active game loaded at `now`.
pub fn active_room(local: i64, now: Instant) -> GameRoom<ShakmatyRules> {
    load(local, loaded_after(&[], 600, 600), now)
}

pub fn load(local: i64, loaded: LoadedSession, now: Instant) -> GameRoom<ShakmatyRules> {
    let mut room = room(local);
    room.open(GAME_ID);
    let effects = room.handle(
        RoomEvent::SnapshotLoaded {
            game_id: GAME_ID.to_string(),
            loaded,
        },
        now,
    );
    assert!(effects.contains(&Effect::Join {
        game_id: GAME_ID.to_string()
    }));
    room
}

pub fn live(event: LiveEvent) -> RoomEvent {
    RoomEvent::Live {
        game_id: GAME_ID.to_string(),
        event,
    }
}

/// The server's report of `san` played from `position`.
pub fn move_made(position: &str, san: &str) -> LiveEvent {
    let applied = ShakmatyRules.apply_san(position, san).unwrap();
    LiveEvent::MoveMade(RemoteMove {
        san: applied.san,
        fen: applied.fen,
        mover: applied.mover,
        physical: false,
    })
}

pub fn current_position(room: &GameRoom<ShakmatyRules>) -> String {
    room.session().unwrap().position.clone()
}

pub fn has_load(effects: &[Effect]) -> bool {
    effects
        .iter()
        .any(|e| matches!(e, Effect::LoadSnapshot { game_id } if game_id == GAME_ID))
}
