//! # Heartbeat Monitor
//!
//! Wall-clock liveness probing for an open connection. The monitor ticks
//! every `period` regardless of message traffic; each tick the reactor sends
//! a `ping` frame and treats a failed send as a lost connection.
//!
//! The monitor lives inside the open-connection state, so retiring the
//! connection drops its timer with it.

#![forbid(unsafe_code)]
#![warn(missing_docs, rust_2018_idioms, unused_qualifications)]

use std::time::Duration;
use tokio::time::{interval_at, Instant, Interval, MissedTickBehavior};

use crate::protocol::ControlFrame;

/// Shortest period the timer accepts; `interval_at` rejects a zero period.
pub const MIN_PERIOD: Duration = Duration::from_millis(1);
/// Longest period the timer accepts, keeping deadlines inside `Instant` range.
pub const MAX_PERIOD: Duration = Duration::from_secs(24 * 60 * 60);

/// Recurring ping timer for one connection.
#[derive(Debug)]
pub struct Heartbeat {
    interval: Interval,
    sent: u64,
}

impl Heartbeat {
    /// Starts the timer. The first probe is due one full `period` from now.
    /// The period is clamped to [`MIN_PERIOD`]..=[`MAX_PERIOD`].
    pub fn start(period: Duration) -> Self {
        let period = period.clamp(MIN_PERIOD, MAX_PERIOD);
        let mut interval = interval_at(Instant::now() + period, period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        Self { interval, sent: 0 }
    }

    /// Waits for the next probe to fall due. Cancel-safe.
    pub async fn due(&mut self) {
        self.interval.tick().await;
    }

    /// The frame to send for this probe, counting it.
    pub fn probe(&mut self) -> String {
        self.sent += 1;
        ControlFrame::Ping.to_frame()
    }

    /// Probes produced so far on this connection.
    pub fn sent(&self) -> u64 {
        self.sent
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::assert_elapsed;

    #[tokio::test(start_paused = true)]
    async fn ticks_on_wall_clock_period() {
        let started = Instant::now();
        let mut heartbeat = Heartbeat::start(Duration::from_secs(30));

        heartbeat.due().await;
        assert_elapsed(started, Duration::from_secs(30));
        heartbeat.due().await;
        assert_elapsed(started, Duration::from_secs(60));

        assert_eq!(heartbeat.probe(), r#"{"op":"ping"}"#);
        assert_eq!(heartbeat.sent(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn out_of_range_periods_are_clamped() {
        let started = Instant::now();
        let mut heartbeat = Heartbeat::start(Duration::ZERO);
        heartbeat.due().await;
        assert_elapsed(started, MIN_PERIOD);

        let started = Instant::now();
        let mut heartbeat = Heartbeat::start(Duration::MAX);
        heartbeat.due().await;
        assert_elapsed(started, MAX_PERIOD);
    }
}
