//! Staleness detection for the live channel.

use std::time::{Duration, Instant};

use serde::Serialize;
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LinkStatus {
    Connecting,
    Connected,
    Disconnected,
}

/// Transport-level connectivity changes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportSignal {
    Connecting,
    Connected,
    Disconnected,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectionState {
    pub status: LinkStatus,
    pub last_event_at: Option<Instant>,
    pub retry_count: u32,
}

/// Instruction to cycle the live subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RejoinPlan {
    pub delay: Duration,
    pub attempt: u32,
}

#[derive(Debug, Clone)]
pub struct HealthMonitor {
    threshold: Duration,
    rejoin_delay: Duration,
    state: ConnectionState,
    /// Start of the current staleness window; moved forward by events and by each trip
    window_start: Option<Instant>,
}

impl HealthMonitor {
    pub fn new(threshold: Duration, rejoin_delay: Duration) -> Self {
        Self {
            threshold,
            rejoin_delay,
            state: ConnectionState {
                status: LinkStatus::Connecting,
                last_event_at: None,
                retry_count: 0,
            },
            window_start: None,
        }
    }

    pub fn state(&self) -> &ConnectionState {
        &self.state
    }

    /// Any authoritative event proves the channel alive.
    pub fn record_event(&mut self, now: Instant) {
        self.state.last_event_at = Some(now);
        self.state.retry_count = 0;
        self.window_start = Some(now);
        if self.state.status != LinkStatus::Connected {
            self.state.status = LinkStatus::Connected;
        }
    }

    /// Start watching from `now` without claiming the link is healthy.
    pub fn arm(&mut self, now: Instant) {
        self.window_start = Some(now);
    }

    pub fn disarm(&mut self) {
        self.window_start = None;
    }

    pub fn on_transport(&mut self, signal: TransportSignal, now: Instant) {
        let status = match signal {
            TransportSignal::Connecting => LinkStatus::Connecting,
            TransportSignal::Connected => LinkStatus::Connected,
            TransportSignal::Disconnected => LinkStatus::Disconnected,
        };
        if self.state.status != status {
            debug!(?status, "Transport status changed");
        }
        self.state.status = status;
        if signal == TransportSignal::Connected && self.window_start.is_some() {
            // A fresh connection gets a full window before it is judged stale
            self.window_start = Some(now);
        }
    }

    /// Consult the monitor. Returns a plan at most once per staleness window.
    pub fn check(&mut self, now: Instant, active: bool) -> Option<RejoinPlan> {
        if !active {
            return None;
        }
        let start = self.window_start?;
        if now.saturating_duration_since(start) <= self.threshold {
            return None;
        }

        self.window_start = Some(now);
        self.state.retry_count += 1;
        self.state.status = LinkStatus::Connecting;
        warn!(
            attempt = self.state.retry_count,
            threshold_ms = self.threshold.as_millis() as u64,
            "No authoritative event within threshold, cycling live channel"
        );
        Some(RejoinPlan {
            delay: self.rejoin_delay,
            attempt: self.state.retry_count,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn monitor() -> HealthMonitor {
        HealthMonitor::new(Duration::from_secs(10), Duration::from_secs(1))
    }

    #[test]
    fn test_trips_once_per_window() {
        let t0 = Instant::now();
        let mut health = monitor();
        health.record_event(t0);

        assert_eq!(health.check(t0 + Duration::from_secs(9), true), None);
        let plan = health.check(t0 + Duration::from_secs(11), true).unwrap();
        assert_eq!(plan.delay, Duration::from_secs(1));
        assert_eq!(plan.attempt, 1);

        // Further ticks within the new window stay quiet
        assert_eq!(health.check(t0 + Duration::from_secs(12), true), None);
        assert_eq!(health.check(t0 + Duration::from_secs(20), true), None);
        assert_eq!(health.state().status, LinkStatus::Connecting);
    }

    #[test]
    fn test_event_resets_timer() {
        let t0 = Instant::now();
        let mut health = monitor();
        health.record_event(t0);
        assert!(health.check(t0 + Duration::from_secs(11), true).is_some());

        health.record_event(t0 + Duration::from_secs(12));
        assert_eq!(health.state().retry_count, 0);
        assert_eq!(health.check(t0 + Duration::from_secs(21), true), None);
        assert!(health.check(t0 + Duration::from_secs(23), true).is_some());
    }

    #[test]
    fn test_inactive_session_never_trips() {
        let t0 = Instant::now();
        let mut health = monitor();
        health.record_event(t0);
        assert_eq!(health.check(t0 + Duration::from_secs(60), false), None);
    }

    #[test]
    fn test_unarmed_monitor_is_quiet() {
        let t0 = Instant::now();
        let mut health = monitor();
        assert_eq!(health.check(t0 + Duration::from_secs(60), true), None);
    }

    #[test]
    fn test_transport_signals_are_visible() {
        let t0 = Instant::now();
        let mut health = monitor();
        health.on_transport(TransportSignal::Disconnected, t0);
        assert_eq!(health.state().status, LinkStatus::Disconnected);
        health.on_transport(TransportSignal::Connected, t0);
        assert_eq!(health.state().status, LinkStatus::Connected);
    }
}
