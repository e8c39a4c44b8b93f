//! Night window membership and local-time helpers
//!
//! [`is_night_hour`] is the only place that decides whether a clock hour is
//! inside the night window. The classifier, extender, resolver and debt
//! accumulator all go through it.

use crate::config::NightWindowConfig;
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, TimeZone, Timelike, Utc};

/// Returns true if `hour` lies inside `[start_hour, end_hour)`, wrapping past
/// midnight when `start_hour > end_hour`.
pub fn is_night_hour(hour: u32, start_hour: u32, end_hour: u32) -> bool {
    if start_hour > end_hour {
        hour >= start_hour || hour < end_hour
    } else {
        hour >= start_hour && hour < end_hour
    }
}

impl NightWindowConfig {
    pub fn contains(&self, hour: u32) -> bool {
        is_night_hour(hour, self.start_hour(), self.end_hour())
    }

    pub fn wraps_midnight(&self) -> bool {
        self.start_hour() > self.end_hour()
    }

    /// Whether the hour falls in the pre-midnight part `[start_hour, 23]`
    /// of a wrapping window
    pub fn is_pre_midnight(&self, hour: u32) -> bool {
        self.wraps_midnight() && hour >= self.start_hour() && hour <= 23
    }
}

/// Clock hour of an instant in the given zone
pub fn local_hour<Tz: TimeZone>(instant: &DateTime<Utc>, tz: &Tz) -> u32 {
    instant.with_timezone(tz).hour()
}

/// Calendar date of an instant in the given zone
pub fn local_date<Tz: TimeZone>(instant: &DateTime<Utc>, tz: &Tz) -> NaiveDate {
    instant.with_timezone(tz).date_naive()
}

/// Resolve a local wall-clock time to a UTC instant.
///
/// Ambiguous times pick the earlier instant; times skipped by a DST jump are
/// read as UTC so the result is always defined.
pub fn local_to_utc<Tz: TimeZone>(local: NaiveDateTime, tz: &Tz) -> DateTime<Utc> {
    match tz.from_local_datetime(&local).earliest() {
        Some(dt) => dt.with_timezone(&Utc),
        None => Utc.from_utc_datetime(&local),
    }
}

/// UTC instant of `hour:00` on `date` in the given zone
pub fn local_hour_on<Tz: TimeZone>(date: NaiveDate, hour: u32, tz: &Tz) -> DateTime<Utc> {
    let time = NaiveTime::from_hms_opt(hour.min(23), 0, 0).unwrap_or_default();
    local_to_utc(date.and_time(time), tz)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::FixedOffset;

    #[test]
    fn test_wrapping_window() {
        assert!(is_night_hour(23, 19, 6));
        assert!(!is_night_hour(6, 19, 6));
        assert!(is_night_hour(5, 19, 6));
        assert!(!is_night_hour(7, 19, 6));
        assert!(is_night_hour(19, 19, 6));
        assert!(is_night_hour(0, 19, 6));
        assert!(!is_night_hour(18, 19, 6));
    }

    #[test]
    fn test_same_day_window() {
        assert!(is_night_hour(1, 1, 10));
        assert!(is_night_hour(9, 1, 10));
        assert!(!is_night_hour(10, 1, 10));
        assert!(!is_night_hour(0, 1, 10));
        assert!(!is_night_hour(23, 1, 10));
    }

    #[test]
    fn test_empty_window() {
        for hour in 0..24 {
            assert!(!is_night_hour(hour, 4, 4));
        }
    }

    #[test]
    fn test_local_hour_respects_offset() {
        let tz = FixedOffset::east_opt(2 * 3600).unwrap();
        let instant = Utc.with_ymd_and_hms(2024, 1, 15, 22, 30, 0).unwrap();
        assert_eq!(local_hour(&instant, &tz), 0);
        assert_eq!(
            local_date(&instant, &tz),
            NaiveDate::from_ymd_opt(2024, 1, 16).unwrap()
        );
    }

    #[test]
    fn test_pre_midnight() {
        let window = NightWindowConfig::new(21, 6).unwrap();
        assert!(window.is_pre_midnight(23));
        assert!(window.is_pre_midnight(21));
        assert!(!window.is_pre_midnight(1));

        let same_day = NightWindowConfig::new(1, 10).unwrap();
        assert!(!same_day.is_pre_midnight(23));
    }
}
