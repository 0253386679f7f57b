//! Keepalive schedule and liveness deadline.

use std::time::Duration;

use tokio::time::{Instant, Interval, MissedTickBehavior, interval};

/// Drives outbound KEEPALIVE(R=1) frames and tracks peer liveness.
///
/// The deadline is checked on the tick, so detection latency is bounded
/// by one keepalive interval.
#[derive(Debug)]
pub struct KeepaliveTimer {
    ticker: Interval,
    max_lifetime: Duration,
    last_heard: Instant,
}

impl KeepaliveTimer {
    /// Create a timer with the given cadence and liveness deadline.
    #[must_use]
    pub fn new(cadence: Duration, max_lifetime: Duration) -> Self {
        let mut ticker = interval(cadence.max(Duration::from_millis(1)));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        Self { ticker, max_lifetime, last_heard: Instant::now() }
    }

    /// Wait for the next keepalive tick.
    pub async fn tick(&mut self) { self.ticker.tick().await; }

    /// Record that a KEEPALIVE arrived from the peer.
    pub fn record_heard(&mut self) { self.last_heard = Instant::now(); }

    /// Whether the peer has been silent past the liveness deadline.
    #[must_use]
    pub fn is_overdue(&self) -> bool { self.last_heard.elapsed() > self.max_lifetime }
}
