/// Clock interpolation and authoritative clock handling through the room.
mod common;

use std::time::{Duration, Instant};

use chess_core::{GameResult, ShakmatyRules, Side, Termination};
use common::*;
use game_room::clock::ClockSnapshot;
use game_room::protocol::{decode_event, LiveEvent};
use game_room::session::SessionStatus;
use game_room::{Effect, GameRoom, Notice, RoomEvent};
use serde_json::json;

fn secs(n: u64) -> Duration {
    Duration::from_secs(n)
}

#[test]
fn test_projection_between_server_ticks() {
    let t0 = Instant::now();
    let room = load(WHITE_ID, loaded_after(&[], 598, 600), t0);

    let reading = room.view(t0 + secs(2)).clocks.unwrap();
    assert_eq!((reading.white, reading.black), (596, 600));
    assert_eq!(reading.running, Some(Side::White));

    // The stored values stay authoritative
    let state = room.clock().unwrap().state();
    assert_eq!((state.white, state.black), (598, 600));
}

#[test]
fn test_clock_update_overwrites_exactly() {
    let t0 = Instant::now();
    let mut room = load(WHITE_ID, loaded_after(&[], 598, 600), t0);

    let snapshot = ClockSnapshot {
        white: 590,
        black: 601,
        turn: Side::Black,
    };
    room.handle(live(LiveEvent::ClockUpdate(snapshot)), t0 + secs(5));

    let reading = room.view(t0 + secs(5)).clocks.unwrap();
    assert_eq!((reading.white, reading.black), (590, 601));
    assert_eq!(reading.running, Some(Side::Black));
    assert_eq!(room.session().unwrap().turn, Side::Black);
}

#[test]
fn test_displayed_time_never_increases_without_snapshot() {
    let t0 = Instant::now();
    let mut room = load(WHITE_ID, loaded_after(&[], 300, 300), t0);
    let mut last = room.view(t0).clocks.unwrap();

    let mut check = |room: &GameRoom<ShakmatyRules>, at: Instant| {
        let now = room.view(at).clocks.unwrap();
        assert!(now.white <= last.white, "white went up at {at:?}");
        assert!(now.black <= last.black, "black went up at {at:?}");
        last = now;
    };

    check(&room, t0 + secs(3));
    room.handle(live(LiveEvent::TurnUpdate { turn: Side::Black }), t0 + Duration::from_millis(3_500));
    check(&room, t0 + Duration::from_millis(3_500));
    check(&room, t0 + secs(5));
    room.handle(live(LiveEvent::TurnUpdate { turn: Side::White }), t0 + secs(7));
    check(&room, t0 + secs(7));
    check(&room, t0 + secs(20));

    let reading = room.view(t0 + secs(20)).clocks.unwrap();
    assert_eq!(reading.white, 300 - 3 - 13);
    assert_eq!(reading.black, 300 - 3);
}

#[test]
fn test_turn_update_moves_running_flag_only() {
    let t0 = Instant::now();
    let mut room = load(BLACK_ID, loaded_after(&[], 400, 420), t0);

    room.handle(live(LiveEvent::TurnUpdate { turn: Side::Black }), t0);
    let view = room.view(t0);
    let reading = view.clocks.unwrap();
    assert_eq!(reading.running, Some(Side::Black));
    assert_eq!((reading.white, reading.black), (400, 420));

    let seats = view.seat_clocks.unwrap();
    assert!(seats.my_clock_running);
    assert!(!seats.opponent_clock_running);
    assert_eq!((seats.mine, seats.opponent), (420, 400));
}

#[test]
fn test_turn_update_keeps_authoritative_times() {
    let t0 = Instant::now();
    let mut room = load(WHITE_ID, loaded_after(&[], 598, 600), t0);

    room.handle(live(LiveEvent::TurnUpdate { turn: Side::Black }), t0 + secs(4));
    let state = *room.clock().unwrap().state();
    assert_eq!((state.white, state.black), (598, 600));
    assert_eq!(state.checkpoint, t0);
    assert_eq!(state.running, Some(Side::Black));

    let reading = room.view(t0 + secs(6)).clocks.unwrap();
    assert_eq!((reading.white, reading.black), (594, 598));
}

#[test]
fn test_rapid_turn_flips_lose_no_time() {
    let t0 = Instant::now();
    let mut room = load(WHITE_ID, loaded_after(&[], 598, 600), t0);

    let mut now = t0;
    let mut turn = Side::White;
    for _ in 0..10 {
        now += Duration::from_millis(1_900);
        turn = turn.opposite();
        room.handle(live(LiveEvent::TurnUpdate { turn }), now);
    }

    let state = room.clock().unwrap().state();
    assert_eq!((state.white, state.black), (598, 600));
    // 9.5 s each over 19 s of play
    let reading = room.view(now).clocks.unwrap();
    assert_eq!((reading.white, reading.black), (589, 591));
}

#[test]
fn test_malformed_clock_payload_leaves_clocks_untouched() {
    let t0 = Instant::now();
    let mut room = load(WHITE_ID, loaded_after(&[], 598, 600), t0);
    let before = *room.clock().unwrap().state();

    let payload = json!({ "whiteTimeLeft": "lots", "blackTimeLeft": 600, "currentTurn": "black" });
    let fault = decode_event("clockUpdate", &payload).unwrap_err();
    let effects = room.handle(
        RoomEvent::MalformedLive {
            game_id: GAME_ID.to_string(),
            fault,
        },
        t0 + secs(1),
    );

    assert!(effects.is_empty());
    assert_eq!(*room.clock().unwrap().state(), before);
}

#[test]
fn test_identical_clock_snapshots_deduplicated() {
    let t0 = Instant::now();
    let mut room = load(WHITE_ID, loaded_after(&[], 598, 600), t0);
    let snapshot = ClockSnapshot {
        white: 597,
        black: 600,
        turn: Side::White,
    };

    room.handle(live(LiveEvent::ClockUpdate(snapshot)), t0 + secs(1));
    room.handle(live(LiveEvent::ClockUpdate(snapshot)), t0 + secs(3));

    assert_eq!(room.clock().unwrap().state().checkpoint, t0 + secs(1));
    assert_eq!(room.view(t0 + secs(3)).clocks.unwrap().white, 595);
}

#[test]
fn test_local_zero_is_only_a_hint() {
    let t0 = Instant::now();
    let room = load(WHITE_ID, loaded_after(&[], 3, 600), t0);

    let view = room.view(t0 + secs(10));
    let reading = view.clocks.unwrap();
    assert_eq!(reading.white, 0);
    assert_eq!(reading.flag_hint, Some(Side::White));
    assert_eq!(view.status, Some(SessionStatus::Active));
}

#[test]
fn test_server_timeout_finishes_game() {
    let t0 = Instant::now();
    let mut room = load(WHITE_ID, loaded_after(&[], 3, 600), t0);

    let effects = room.handle(
        live(LiveEvent::Timeout {
            winner: Side::Black,
            reason: None,
        }),
        t0 + secs(4),
    );

    assert_eq!(
        effects,
        vec![Effect::Notify(Notice::GameOver {
            result: GameResult::Winner(Side::Black),
            termination: Termination::Timeout,
        })]
    );
    let view = room.view(t0 + secs(30));
    assert_eq!(view.status, Some(SessionStatus::Finished));
    assert_eq!(view.termination, Some(Termination::Timeout));
    assert_eq!(view.clocks.unwrap().running, None);

    // Clock ticks after the end are ignored
    room.handle(
        live(LiveEvent::ClockUpdate(ClockSnapshot {
            white: 100,
            black: 100,
            turn: Side::White,
        })),
        t0 + secs(31),
    );
    assert_eq!(room.view(t0 + secs(40)).clocks.unwrap().running, None);
}
