//! Injectable wall clock
//!
//! Date resolution and the in-progress-night check read "now" through a
//! [`Clock`], so every computation can be replayed at a fixed instant.

use chrono::{DateTime, Utc};

pub trait Clock {
    fn now(&self) -> DateTime<Utc>;
}

/// Reads the system clock
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Always returns the same instant
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FixedClock(pub DateTime<Utc>);

impl FixedClock {
    pub fn at_millis(timestamp_millis: i64) -> Option<Self> {
        DateTime::<Utc>::from_timestamp_millis(timestamp_millis).map(Self)
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fixed_clock() {
        let clock = FixedClock::at_millis(1_705_363_200_000).unwrap();
        assert_eq!(clock.now().timestamp_millis(), 1_705_363_200_000);
        assert_eq!(clock.now(), clock.now());
    }
}
