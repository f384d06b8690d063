//! Clock abstraction so lease expiry, retention cut-offs and high-water
//! marks can be tested without sleeping.

use std::fmt::Debug;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Duration, TimeZone, Utc};

/// A source of "now"
pub trait Clock: Send + Sync + Debug {
    fn now(&self) -> DateTime<Utc>;
}

/// Real system clock
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Fake clock for testing with controllable time
#[derive(Debug, Clone)]
pub struct FakeClock {
    current: Arc<Mutex<DateTime<Utc>>>,
}

impl FakeClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            current: Arc::new(Mutex::new(start)),
        }
    }

    /// Advance the clock by the given duration
    pub fn advance(&self, duration: Duration) {
        if let Ok(mut current) = self.current.lock() {
            *current += duration;
        }
    }

    /// Set the clock to a specific instant
    pub fn set(&self, instant: DateTime<Utc>) {
        if let Ok(mut current) = self.current.lock() {
            *current = instant;
        }
    }
}

impl Default for FakeClock {
    fn default() -> Self {
        let start = Utc
            .with_ymd_and_hms(2024, 1, 1, 0, 0, 0)
            .single()
            .unwrap_or_else(Utc::now);
        Self::new(start)
    }
}

impl Clock for FakeClock {
    fn now(&self) -> DateTime<Utc> {
        self.current.lock().map(|c| *c).unwrap_or_else(|p| *p.into_inner())
    }
}

/// `now` minus `hours`, or `None` when the result is out of range
pub fn hours_before(now: DateTime<Utc>, hours: i64) -> Option<DateTime<Utc>> {
    Duration::try_hours(hours).and_then(|span| now.checked_sub_signed(span))
}

/// `now` minus `days`, or `None` when the result is out of range
pub fn days_before(now: DateTime<Utc>, days: i64) -> Option<DateTime<Utc>> {
    Duration::try_days(days).and_then(|span| now.checked_sub_signed(span))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fake_clock_advances() {
        let clock = FakeClock::default();
        let start = clock.now();
        clock.advance(Duration::minutes(5));
        assert_eq!(clock.now() - start, Duration::minutes(5));
    }

    #[test]
    fn test_fake_clock_clones_share_time() {
        let clock = FakeClock::default();
        let other = clock.clone();
        other.advance(Duration::hours(1));
        assert_eq!(clock.now(), other.now());
    }

    #[test]
    fn test_cutoffs_reject_overflow() {
        let now = FakeClock::default().now();
        assert_eq!(hours_before(now, 48), Some(now - Duration::days(2)));
        assert_eq!(days_before(now, 30), Some(now - Duration::days(30)));
        assert_eq!(hours_before(now, i64::MAX), None);
        assert_eq!(days_before(now, i64::MAX / 2), None);
    }
}
