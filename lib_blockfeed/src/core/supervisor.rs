//! # Reconnection Supervisor
//!
//! The policy side of recovering from a lost connection, and the
//! operational state the feed reports to its callers.
//!
//! After an unexpected disconnect the supervisor allows up to
//! `max_attempts` reconnection attempts. Attempt `k` is preceded by a delay of
//! `base_delay * k`, so with the default 2 s base the waits are 2, 4, 6, 8 and
//! 10 seconds. The growth is linear in the attempt number. Once the bound is
//! used up the feed is declared degraded and nothing further is scheduled.
//! A successful open resets the count.

#![forbid(unsafe_code)]
#![warn(missing_docs, rust_2018_idioms, unused_qualifications)]

use std::time::Duration;

/// Operational states of the feed, as seen by callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeedState {
    /// No connection and nothing in flight.
    Idle,
    /// A caller-driven endpoint sweep is in progress.
    Connecting,
    /// A connection is open and its subscriptions have been replayed.
    Connected,
    /// The connection was lost; the supervisor is on reconnection attempt `attempt`.
    Reconnecting {
        /// 1-based attempt number.
        attempt: u32,
    },
    /// No live connection can be sustained; callers should use synthetic data.
    Degraded,
}

/// Reconnection limits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectPolicy {
    /// Multiplied by the attempt number to get the wait before that attempt.
    pub base_delay: Duration,
    /// Maximum reconnection attempts before degrading.
    pub max_attempts: u32,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_millis(2000),
            max_attempts: 5,
        }
    }
}

/// Counts reconnection attempts against a [`ReconnectPolicy`].
#[derive(Debug, Clone)]
pub struct Supervisor {
    policy: ReconnectPolicy,
    attempt_count: u32,
}

impl Supervisor {
    /// Creates a supervisor with no attempts used.
    pub fn new(policy: ReconnectPolicy) -> Self {
        Self { policy, attempt_count: 0 }
    }

    /// Attempts used since the last successful open.
    pub fn attempt_count(&self) -> u32 {
        self.attempt_count
    }

    /// The configured policy.
    pub fn policy(&self) -> ReconnectPolicy {
        self.policy
    }

    /// Called on every successful open.
    pub fn reset(&mut self) {
        self.attempt_count = 0;
    }

    /// Claims the next reconnection attempt.
    ///
    /// Returns the attempt number and the delay to wait before making it, or
    /// `None` when the bound is exhausted and the feed must degrade.
    pub fn next_attempt(&mut self) -> Option<(u32, Duration)> {
        if self.attempt_count >= self.policy.max_attempts {
            return None;
        }
        self.attempt_count += 1;
        Some((self.attempt_count, self.policy.base_delay.saturating_mul(self.attempt_count)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delays_grow_linearly_until_bound() {
        let mut supervisor = Supervisor::new(ReconnectPolicy::default());
        let delays: Vec<_> = std::iter::from_fn(|| supervisor.next_attempt()).collect();
        assert_eq!(
            delays,
            vec![
                (1, Duration::from_secs(2)),
                (2, Duration::from_secs(4)),
                (3, Duration::from_secs(6)),
                (4, Duration::from_secs(8)),
                (5, Duration::from_secs(10)),
            ]
        );
        assert_eq!(supervisor.next_attempt(), None);
        assert_eq!(supervisor.attempt_count(), 5);
    }

    #[test]
    fn reset_restores_full_budget() {
        let mut supervisor = Supervisor::new(ReconnectPolicy { base_delay: Duration::from_millis(500), max_attempts: 2 });
        supervisor.next_attempt();
        supervisor.next_attempt();
        assert_eq!(supervisor.next_attempt(), None);

        supervisor.reset();
        assert_eq!(supervisor.next_attempt(), Some((1, Duration::from_millis(500))));
    }

    #[test]
    fn zero_attempts_degrades_immediately() {
        let mut supervisor = Supervisor::new(ReconnectPolicy { base_delay: Duration::from_secs(1), max_attempts: 0 });
        assert_eq!(supervisor.next_attempt(), None);
    }

    #[test]
    fn huge_base_delay_saturates() {
        let mut supervisor = Supervisor::new(ReconnectPolicy { base_delay: Duration::from_millis(u64::MAX), max_attempts: 3 });
        supervisor.next_attempt();
        assert_eq!(supervisor.next_attempt(), Some((2, Duration::MAX)));
    }
}
