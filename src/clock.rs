//! Timestamps and id generation.

use chrono::{DateTime, Duration, SecondsFormat, Utc};
use std::sync::Mutex;

/// Hands out strictly increasing UTC timestamps.
///
/// Recent-page ordering sorts on the stored RFC 3339 strings, so two writes
/// in the same microsecond must still get distinct, ordered stamps.
#[derive(Debug, Default)]
pub struct MonotonicClock {
    last: Mutex<Option<DateTime<Utc>>>,
}

impl MonotonicClock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current time, bumped by one microsecond past the previous stamp if the
    /// wall clock has not advanced.
    pub fn now(&self) -> DateTime<Utc> {
        let mut last = self.last.lock().unwrap_or_else(|e| e.into_inner());
        let mut now = Utc::now();
        if let Some(prev) = *last {
            if now <= prev {
                now = prev + Duration::microseconds(1);
            }
        }
        *last = Some(now);
        now
    }

    /// `now()` formatted the way rows store it: fixed-width microseconds, `Z`.
    pub fn now_rfc3339(&self) -> String {
        self.now().to_rfc3339_opts(SecondsFormat::Micros, true)
    }
}

/// A fresh globally unique id.
pub fn new_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stamps_strictly_increase() {
        let clock = MonotonicClock::new();
        let stamps: Vec<String> = (0..1000).map(|_| clock.now_rfc3339()).collect();
        for pair in stamps.windows(2) {
            assert!(pair[0] < pair[1], "{} !< {}", pair[0], pair[1]);
        }
    }

    #[test]
    fn stamps_are_fixed_width_utc() {
        let stamp = MonotonicClock::new().now_rfc3339();
        assert!(stamp.ends_with('Z'));
        assert_eq!(stamp.len(), "2024-01-15T10:00:00.000000Z".len());
    }

    #[test]
    fn ids_are_unique() {
        assert_ne!(new_id(), new_id());
    }
}
