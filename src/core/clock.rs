//! Time source used for file versions, meeting windows and timestamps.

use std::sync::{Mutex, PoisonError};

use chrono::{DateTime, Duration, Utc};

/// Source of the current instant.
pub trait Clock: Send + Sync + 'static {
    fn now(&self) -> DateTime<Utc>;

    /// Current instant coarsened to whole Unix seconds.
    fn now_secs(&self) -> i64 {
        self.now().timestamp()
    }
}

/// Wall clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Clock that only moves when told to.
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    pub fn new(at: DateTime<Utc>) -> Self {
        Self { now: Mutex::new(at) }
    }

    /// Clock positioned at the given Unix timestamp (seconds).
    pub fn at_secs(secs: i64) -> Self {
        Self::new(DateTime::from_timestamp(secs, 0).unwrap_or_default())
    }

    pub fn set(&self, at: DateTime<Utc>) {
        *self.now.lock().unwrap_or_else(PoisonError::into_inner) = at;
    }

    pub fn set_secs(&self, secs: i64) {
        self.set(DateTime::from_timestamp(secs, 0).unwrap_or_default());
    }

    pub fn advance(&self, by: Duration) {
        let mut now = self.now.lock().unwrap_or_else(PoisonError::into_inner);
        *now += by;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_manual_clock_set_and_advance() {
        let clock = ManualClock::at_secs(1_000);
        assert_eq!(clock.now_secs(), 1_000);

        clock.advance(Duration::seconds(30));
        assert_eq!(clock.now_secs(), 1_030);

        clock.set_secs(5);
        assert_eq!(clock.now_secs(), 5);
    }

    #[test]
    fn test_now_secs_truncates_subsecond_part() {
        let at = DateTime::from_timestamp(42, 999_000_000).unwrap();
        let clock = ManualClock::new(at);
        assert_eq!(clock.now_secs(), 42);
    }

    #[test]
    fn test_system_clock_is_close_to_utc_now() {
        let delta = (SystemClock.now() - Utc::now()).num_seconds().abs();
        assert!(delta <= 1);
    }
}
