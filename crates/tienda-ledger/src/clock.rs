//! # Clock
//!
//! Every date and time an engine writes comes from an injected [`Clock`],
//! read as naive local wall-clock time. Nothing converts time zones.
//!
//! Times of day are stored as `HH:MM`, so they are truncated to the minute
//! when captured. A record returned by an engine reads back unchanged.

use std::fmt;
use std::sync::RwLock;

use chrono::{Duration, Local, NaiveDate, NaiveDateTime, NaiveTime, Timelike};

/// Source of "now" for the engines.
pub trait Clock: Send + Sync + fmt::Debug {
    fn now(&self) -> NaiveDateTime;

    fn today(&self) -> NaiveDate {
        self.now().date()
    }

    /// Time of day, truncated to the minute.
    fn time(&self) -> NaiveTime {
        minute_of(self.now())
    }
}

/// Time of day of `now` with seconds dropped.
pub fn minute_of(now: NaiveDateTime) -> NaiveTime {
    NaiveTime::from_hms_opt(now.hour(), now.minute(), 0).unwrap_or_default()
}

/// The machine's local wall clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> NaiveDateTime {
        Local::now().naive_local()
    }
}

/// A clock that only moves when told to.
///
/// ## Usage
/// ```rust
/// use chrono::NaiveDate;
/// use tienda_ledger::clock::{Clock, FixedClock};
///
/// let clock = FixedClock::at(NaiveDate::from_ymd_opt(2026, 3, 1).unwrap().and_hms_opt(9, 0, 0).unwrap());
/// clock.advance_days(30);
/// assert_eq!(clock.today(), NaiveDate::from_ymd_opt(2026, 3, 31).unwrap());
/// ```
#[derive(Debug)]
pub struct FixedClock {
    now: RwLock<NaiveDateTime>,
}

impl FixedClock {
    pub fn at(now: NaiveDateTime) -> Self {
        FixedClock {
            now: RwLock::new(now),
        }
    }

    pub fn set(&self, now: NaiveDateTime) {
        let mut guard = self.now.write().unwrap_or_else(|poisoned| poisoned.into_inner());
        *guard = now;
    }

    pub fn advance_days(&self, days: i64) {
        let mut guard = self.now.write().unwrap_or_else(|poisoned| poisoned.into_inner());
        *guard += Duration::days(days);
    }
}

impl Clock for FixedClock {
    fn now(&self) -> NaiveDateTime {
        *self.now.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_time_is_truncated_to_the_minute() {
        let at = NaiveDate::from_ymd_opt(2026, 3, 1)
            .unwrap()
            .and_hms_milli_opt(10, 15, 37, 250)
            .unwrap();
        let clock = FixedClock::at(at);
        assert_eq!(clock.time(), NaiveTime::from_hms_opt(10, 15, 0).unwrap());
        assert_eq!(clock.now(), at);
        assert_eq!(minute_of(at).format("%H:%M").to_string(), "10:15");
    }
}
