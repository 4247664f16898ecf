//! Maps the raw color assignment onto "me" and "opponent".

use serde::Serialize;

use chess_core::{PlayerDescriptor, Players, Side, UserId};

use crate::clock::ClockReading;
use crate::error::RoomError;

/// How one client sees the game. Fixed for the lifetime of a session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Perspective {
    pub me: PlayerDescriptor,
    pub opponent: PlayerDescriptor,
    /// Color rendered at the bottom of the board
    pub orientation: Side,
}

/// Clock values relabeled for display.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SeatClocks {
    pub mine: u32,
    pub opponent: u32,
    pub my_clock_running: bool,
    pub opponent_clock_running: bool,
}

impl Perspective {
    /// Resolve the local player's seat. An identity matching neither player is fatal.
    pub fn resolve(players: &Players, local: UserId) -> Result<Self, RoomError> {
        let side = players
            .side_of(local)
            .ok_or(RoomError::NotAParticipant { user_id: local })?;
        Ok(Self {
            me: players.get(side).clone(),
            opponent: players.get(side.opposite()).clone(),
            orientation: side,
        })
    }

    pub fn my_side(&self) -> Side {
        self.me.side
    }

    pub fn opponent_side(&self) -> Side {
        self.opponent.side
    }

    pub fn is_me(&self, side: Side) -> bool {
        self.me.side == side
    }

    /// Player drawn at the top of the board.
    pub fn top(&self) -> &PlayerDescriptor {
        &self.opponent
    }

    pub fn bottom(&self) -> &PlayerDescriptor {
        &self.me
    }

    pub fn seat_clocks(&self, reading: &ClockReading) -> SeatClocks {
        SeatClocks {
            mine: reading.remaining(self.my_side()),
            opponent: reading.remaining(self.opponent_side()),
            my_clock_running: reading.running.is_some_and(|side| self.is_me(side)),
            opponent_clock_running: reading.running.is_some_and(|side| !self.is_me(side)),
        }
    }
}
