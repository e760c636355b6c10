//! Clock abstraction.
//!
//! The engine times everything through this trait so tests can drive time by
//! hand: reservation TTLs and the blocked-card retry window both compare
//! against it.

use std::time::Instant;

use chrono::{DateTime, Utc};

pub trait Clock: Send + Sync {
    /// Monotonic milliseconds since an arbitrary origin.
    fn now_ms(&self) -> u64;

    /// Wall-clock time for persisted timestamps.
    fn now_utc(&self) -> DateTime<Utc>;
}

/// Production clock: monotonic time anchored at construction, wall time from
/// the system.
pub struct SystemClock {
    origin: Instant,
}

impl SystemClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    fn now_ms(&self) -> u64 {
        self.origin.elapsed().as_millis() as u64
    }

    fn now_utc(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_system_clock_is_monotonic() {
        let clock = SystemClock::new();
        let a = clock.now_ms();
        let b = clock.now_ms();
        assert!(b >= a);
    }

    #[test]
    fn test_system_clock_wall_time_is_recent() {
        let clock = SystemClock::new();
        let delta = Utc::now() - clock.now_utc();
        assert!(delta.num_seconds().abs() < 5);
    }
}
