//! Two-sided countdown reconciled against server clock ticks.
//!
//! The server owns the clock. Between its ticks the running side is projected
//! locally for display; the projection is never written back.

use std::time::{Duration, Instant};

use serde::Serialize;

use chess_core::Side;

/// Authoritative clock values pushed by the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClockSnapshot {
    pub white: u32,
    pub black: u32,
    pub turn: Side,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClockState {
    pub white: u32,
    pub black: u32,
    pub running: Option<Side>,
    /// When the values above were last set by the server
    pub checkpoint: Instant,
}

impl ClockState {
    pub fn remaining(&self, side: Side) -> u32 {
        match side {
            Side::White => self.white,
            Side::Black => self.black,
        }
    }
}

/// Display values derived from [`ClockState`] at some instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ClockReading {
    pub white: u32,
    pub black: u32,
    pub running: Option<Side>,
    /// Side whose projected time reached zero. A hint only; the server decides timeouts.
    pub flag_hint: Option<Side>,
}

impl ClockReading {
    pub fn remaining(&self, side: Side) -> u32 {
        match side {
            Side::White => self.white,
            Side::Black => self.black,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ClockSynchronizer {
    state: ClockState,
    /// Local time used since the checkpoint by sides no longer running
    white_spent: Duration,
    black_spent: Duration,
    /// Start of the current side's run
    run_since: Instant,
}

impl ClockSynchronizer {
    pub fn new(white: u32, black: u32, running: Option<Side>, now: Instant) -> Self {
        Self {
            state: ClockState {
                white,
                black,
                running,
                checkpoint: now,
            },
            white_spent: Duration::ZERO,
            black_spent: Duration::ZERO,
            run_since: now,
        }
    }

    /// Last values set by the server. Turn flips only move the running flag.
    pub fn state(&self) -> &ClockState {
        &self.state
    }

    /// Overwrite both sides and the running flag exactly as the server sent them.
    pub fn apply_snapshot(&mut self, snapshot: ClockSnapshot, now: Instant) {
        self.state = ClockState {
            white: snapshot.white,
            black: snapshot.black,
            running: Some(snapshot.turn),
            checkpoint: now,
        };
        self.white_spent = Duration::ZERO;
        self.black_spent = Duration::ZERO;
        self.run_since = now;
    }

    /// Hand the running flag to `turn`. Remaining times are left alone; the
    /// previous runner's elapsed time is kept for display until the next snapshot.
    pub fn apply_turn(&mut self, turn: Side, now: Instant) {
        if self.state.running == Some(turn) {
            return;
        }
        self.settle(now);
        self.state.running = Some(turn);
    }

    pub fn stop(&mut self, now: Instant) {
        self.settle(now);
        self.state.running = None;
    }

    fn settle(&mut self, now: Instant) {
        let ran = now.saturating_duration_since(self.run_since);
        match self.state.running {
            Some(Side::White) => self.white_spent += ran,
            Some(Side::Black) => self.black_spent += ran,
            None => {}
        }
        self.run_since = now;
    }

    fn spent(&self, side: Side, now: Instant) -> Duration {
        let settled = match side {
            Side::White => self.white_spent,
            Side::Black => self.black_spent,
        };
        if self.state.running == Some(side) {
            settled + now.saturating_duration_since(self.run_since)
        } else {
            settled
        }
    }

    /// Project remaining times at `now`. Whole seconds are dropped only from the total spent.
    pub fn project(&self, now: Instant) -> ClockReading {
        let shown = |side: Side| {
            let spent = u32::try_from(self.spent(side, now).as_secs()).unwrap_or(u32::MAX);
            self.state.remaining(side).saturating_sub(spent)
        };
        let white = shown(Side::White);
        let black = shown(Side::Black);

        let flag_hint = self.state.running.filter(|side| match side {
            Side::White => white == 0,
            Side::Black => black == 0,
        });

        ClockReading {
            white,
            black,
            running: self.state.running,
            flag_hint,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_projection_only_moves_running_side() {
        let t0 = Instant::now();
        let clock = ClockSynchronizer::new(598, 600, Some(Side::White), t0);

        let reading = clock.project(t0 + Duration::from_millis(2_400));
        assert_eq!(reading.white, 596);
        assert_eq!(reading.black, 600);
        assert_eq!(clock.state().white, 598);
        assert_eq!(clock.state().black, 600);
    }

    #[test]
    fn test_projection_floors_at_zero_and_hints() {
        let t0 = Instant::now();
        let clock = ClockSynchronizer::new(3, 60, Some(Side::White), t0);

        let reading = clock.project(t0 + Duration::from_secs(10));
        assert_eq!(reading.white, 0);
        assert_eq!(reading.flag_hint, Some(Side::White));
        assert_eq!(reading.running, Some(Side::White));
    }

    #[test]
    fn test_snapshot_overwrites_exactly() {
        let t0 = Instant::now();
        let mut clock = ClockSynchronizer::new(598, 600, Some(Side::White), t0);
        let t1 = t0 + Duration::from_secs(5);

        clock.apply_snapshot(
            ClockSnapshot {
                white: 597,
                black: 600,
                turn: Side::Black,
            },
            t1,
        );
        let reading = clock.project(t1);
        assert_eq!((reading.white, reading.black), (597, 600));
        assert_eq!(reading.running, Some(Side::Black));
    }

    #[test]
    fn test_turn_flip_hands_over_running_flag() {
        let t0 = Instant::now();
        let mut clock = ClockSynchronizer::new(300, 300, Some(Side::White), t0);
        let t1 = t0 + Duration::from_secs(4);

        clock.apply_turn(Side::Black, t1);
        assert_eq!(clock.state().running, Some(Side::Black));
        assert_eq!((clock.state().white, clock.state().black), (300, 300));
        assert_eq!(clock.state().checkpoint, t0);

        let reading = clock.project(t1 + Duration::from_secs(2));
        assert_eq!(reading.white, 296);
        assert_eq!(reading.black, 298);
    }

    #[test]
    fn test_fast_flips_keep_subsecond_time() {
        let t0 = Instant::now();
        let mut clock = ClockSynchronizer::new(598, 600, Some(Side::White), t0);
        let step = Duration::from_millis(1_900);

        let mut now = t0;
        let mut turn = Side::White;
        for _ in 0..10 {
            now += step;
            turn = turn.opposite();
            clock.apply_turn(turn, now);
        }

        // 9.5 s used by each side over 19 s of play
        assert_eq!((clock.state().white, clock.state().black), (598, 600));
        let reading = clock.project(now);
        assert_eq!((reading.white, reading.black), (589, 591));
    }

    #[test]
    fn test_snapshot_clears_local_spend() {
        let t0 = Instant::now();
        let mut clock = ClockSynchronizer::new(300, 300, Some(Side::White), t0);
        clock.apply_turn(Side::Black, t0 + Duration::from_secs(5));

        let t1 = t0 + Duration::from_secs(6);
        clock.apply_snapshot(
            ClockSnapshot {
                white: 296,
                black: 299,
                turn: Side::Black,
            },
            t1,
        );
        let reading = clock.project(t1);
        assert_eq!((reading.white, reading.black), (296, 299));
    }

    #[test]
    fn test_repeated_turn_update_is_ignored() {
        let t0 = Instant::now();
        let mut clock = ClockSynchronizer::new(300, 300, Some(Side::White), t0);
        clock.apply_turn(Side::White, t0 + Duration::from_secs(3));
        assert_eq!(clock.state().checkpoint, t0);
        assert_eq!(clock.project(t0 + Duration::from_secs(5)).white, 295);
    }

    #[test]
    fn test_stopped_clock_does_not_move() {
        let t0 = Instant::now();
        let mut clock = ClockSynchronizer::new(100, 100, Some(Side::Black), t0);
        clock.stop(t0 + Duration::from_secs(4));
        let reading = clock.project(t0 + Duration::from_secs(30));
        assert_eq!((reading.white, reading.black), (100, 96));
        assert_eq!(reading.flag_hint, None);
    }
}
