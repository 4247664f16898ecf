//! Client-side synchronization engine for a live two-player game.

pub mod clients;
pub mod clock;
pub mod config;
pub mod controller;
pub mod error;
pub mod health;
pub mod perspective;
pub mod protocol;
pub mod reconciler;
pub mod runner;
pub mod session;

pub use controller::{Effect, GameRoom, Notice, RoomEvent, RoomView};
pub use error::{MoveRejection, ProtocolFault, RoomError};
