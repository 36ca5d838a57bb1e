use std::time::Duration as StdDuration;

use chrono::Duration;

/// Retry schedule for best-effort inventory releases.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Background attempts after the first failure. 0 disables retries.
    pub max_attempts: u32,
    pub initial_backoff: StdDuration,
    pub max_backoff: StdDuration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff: StdDuration::from_millis(200),
            max_backoff: StdDuration::from_secs(5),
        }
    }
}

impl RetryPolicy {
    pub fn disabled() -> Self {
        Self { max_attempts: 0, ..Self::default() }
    }
}

/// Reservation policy values, injected at construction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReservationPolicy {
    /// Maximum summed quantity of active reservations per ticket. Default 1000.
    pub capacity_limit: i64,
    /// How long a RESERVED hold lives before it may expire. Default 15 minutes.
    pub hold_window: Duration,
    /// Upper bound on every remote collaborator call. Default 3 seconds.
    pub remote_timeout: StdDuration,
    pub release_retry: RetryPolicy,
}

impl Default for ReservationPolicy {
    fn default() -> Self {
        Self {
            capacity_limit: 1000,
            hold_window: Duration::minutes(15),
            remote_timeout: StdDuration::from_secs(3),
            release_retry: RetryPolicy::default(),
        }
    }
}
