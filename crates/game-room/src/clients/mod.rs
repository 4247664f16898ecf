pub mod api;
pub mod live;

pub use api::{HttpGameApi, SnapshotSource};
pub use live::{LiveChannel, LiveInput, WsLiveChannel};
