//! Client configuration from environment variables.

use std::env;
use std::time::Duration;

use chess_core::UserId;

use crate::error::RoomError;

pub const DEFAULT_STALENESS_THRESHOLD: Duration = Duration::from_secs(10);
pub const DEFAULT_REJOIN_DELAY: Duration = Duration::from_secs(1);
pub const DEFAULT_HEALTH_TICK: Duration = Duration::from_secs(1);

/// Fixed timings of the synchronization engine. Read once at startup.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RoomTimings {
    /// Longest tolerated gap between authoritative events while the game is active
    pub staleness_threshold: Duration,
    /// Pause between leaving and rejoining the live channel after a stale window
    pub rejoin_delay: Duration,
    /// How often the health monitor is consulted
    pub health_tick: Duration,
}

impl Default for RoomTimings {
    fn default() -> Self {
        Self {
            staleness_threshold: DEFAULT_STALENESS_THRESHOLD,
            rejoin_delay: DEFAULT_REJOIN_DELAY,
            health_tick: DEFAULT_HEALTH_TICK,
        }
    }
}

#[derive(Clone, Debug)]
pub struct RoomConfig {
    /// REST base URL, e.g. `http://localhost:3000/api`
    pub api_base_url: String,

    /// Websocket URL of the live game channel
    pub live_url: String,

    /// Bearer token sent with every request
    pub auth_token: Option<String>,

    /// Game to open
    pub game_id: String,

    /// Identity of the local player
    pub user_id: UserId,

    pub timings: RoomTimings,

    /// HTTP request timeout in seconds
    pub http_timeout_secs: u64,

    /// Wait between transport reconnect attempts
    pub reconnect_backoff: Duration,
}

impl RoomConfig {
    pub fn from_env() -> Result<Self, RoomError> {
        let api_base_url = env::var("API_BASE_URL")
            .unwrap_or_else(|_| "http://localhost:3000/api".to_string());

        let live_url = env::var("LIVE_URL").unwrap_or_else(|_| "ws://localhost:3000/game".to_string());

        let auth_token = env::var("AUTH_TOKEN").ok().filter(|t| !t.is_empty());

        let game_id = env::var("GAME_ID").map_err(|_| RoomError::Config("GAME_ID not set"))?;

        let user_id = env::var("USER_ID")
            .map_err(|_| RoomError::Config("USER_ID not set"))?
            .trim()
            .parse()
            .map_err(|_| RoomError::Config("USER_ID must be an integer"))?;

        let staleness_threshold = env::var("STALENESS_THRESHOLD_SECS")
            .ok()
            .and_then(|v| v.parse().ok())
            .map(Duration::from_secs)
            .unwrap_or(DEFAULT_STALENESS_THRESHOLD);

        let rejoin_delay = env::var("REJOIN_DELAY_MS")
            .ok()
            .and_then(|v| v.parse().ok())
            .map(Duration::from_millis)
            .unwrap_or(DEFAULT_REJOIN_DELAY);

        let health_tick = env::var("HEALTH_TICK_MS")
            .ok()
            .and_then(|v| v.parse().ok())
            .map(Duration::from_millis)
            .unwrap_or(DEFAULT_HEALTH_TICK);

        let http_timeout_secs = env::var("HTTP_TIMEOUT_SECS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(30);

        let reconnect_backoff = env::var("RECONNECT_BACKOFF_MS")
            .ok()
            .and_then(|v| v.parse().ok())
            .map(Duration::from_millis)
            .unwrap_or(Duration::from_secs(2));

        Ok(Self {
            api_base_url: api_base_url.trim_end_matches('/').to_string(),
            live_url,
            auth_token,
            game_id,
            user_id,
            timings: RoomTimings {
                staleness_threshold,
                rejoin_delay,
                health_tick,
            },
            http_timeout_secs,
            reconnect_backoff,
        })
    }
}
