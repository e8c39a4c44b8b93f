//! Sleep-date resolution
//!
//! Maps an episode to the calendar date of the night it belongs to. The
//! default is the local date of the episode's end. When the night window
//! wraps midnight and the whole episode sits in the pre-midnight part of the
//! window, the episode is attributed forward to the next day, the date the
//! user wakes up on.

use crate::config::NightWindowConfig;
use crate::night_window::{local_date, local_hour};
use chrono::{DateTime, Days, NaiveDate, TimeZone, Utc};

/// Resolve the canonical sleep date for an episode
pub fn resolve_sleep_date<Tz: TimeZone>(
    start: &DateTime<Utc>,
    end: &DateTime<Utc>,
    window: &NightWindowConfig,
    tz: &Tz,
) -> NaiveDate {
    let end_date = local_date(end, tz);

    if window.is_pre_midnight(local_hour(start, tz)) && window.is_pre_midnight(local_hour(end, tz)) {
        return next_day(end_date);
    }

    end_date
}

/// Sleep date of the night that `now` belongs to.
///
/// With a wrapping window, hours at or after the window start belong to the
/// night that resolves to tomorrow. Every other hour belongs to today's date.
pub fn current_night_date<Tz: TimeZone>(
    now: &DateTime<Utc>,
    window: &NightWindowConfig,
    tz: &Tz,
) -> NaiveDate {
    let today = local_date(now, tz);
    if window.is_pre_midnight(local_hour(now, tz)) {
        next_day(today)
    } else {
        today
    }
}

fn next_day(date: NaiveDate) -> NaiveDate {
    date.checked_add_days(Days::new(1)).unwrap_or(date)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::FixedOffset;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_pre_midnight_episode_moves_forward() {
        let window = NightWindowConfig::new(21, 6).unwrap();
        let start = Utc.with_ymd_and_hms(2024, 1, 1, 23, 30, 0).unwrap();
        let end = Utc.with_ymd_and_hms(2024, 1, 1, 23, 55, 0).unwrap();

        assert_eq!(resolve_sleep_date(&start, &end, &window, &Utc), date(2024, 1, 2));
    }

    #[test]
    fn test_midnight_crossing_uses_end_date() {
        let window = NightWindowConfig::new(21, 6).unwrap();
        let start = Utc.with_ymd_and_hms(2024, 1, 1, 23, 30, 0).unwrap();
        let end = Utc.with_ymd_and_hms(2024, 1, 2, 1, 0, 0).unwrap();

        assert_eq!(resolve_sleep_date(&start, &end, &window, &Utc), date(2024, 1, 2));
    }

    #[test]
    fn test_evening_start_outside_window_not_moved() {
        let window = NightWindowConfig::new(21, 6).unwrap();
        let start = Utc.with_ymd_and_hms(2024, 1, 1, 20, 0, 0).unwrap();
        let end = Utc.with_ymd_and_hms(2024, 1, 1, 22, 0, 0).unwrap();

        assert_eq!(resolve_sleep_date(&start, &end, &window, &Utc), date(2024, 1, 1));
    }

    #[test]
    fn test_same_day_window_never_moves() {
        let window = NightWindowConfig::new(1, 10).unwrap();
        let start = Utc.with_ymd_and_hms(2024, 1, 1, 22, 0, 0).unwrap();
        let end = Utc.with_ymd_and_hms(2024, 1, 1, 23, 50, 0).unwrap();

        assert_eq!(resolve_sleep_date(&start, &end, &window, &Utc), date(2024, 1, 1));
    }

    #[test]
    fn test_resolution_uses_local_time() {
        let window = NightWindowConfig::new(21, 6).unwrap();
        let tz = FixedOffset::west_opt(5 * 3600).unwrap();
        // 23:00-23:45 local on Jan 1, already Jan 2 in UTC
        let start = Utc.with_ymd_and_hms(2024, 1, 2, 4, 0, 0).unwrap();
        let end = Utc.with_ymd_and_hms(2024, 1, 2, 4, 45, 0).unwrap();

        assert_eq!(resolve_sleep_date(&start, &end, &window, &tz), date(2024, 1, 2));
    }

    #[test]
    fn test_current_night_date() {
        let window = NightWindowConfig::new(21, 6).unwrap();
        let evening = Utc.with_ymd_and_hms(2024, 1, 1, 22, 0, 0).unwrap();
        let early = Utc.with_ymd_and_hms(2024, 1, 2, 3, 0, 0).unwrap();
        let afternoon = Utc.with_ymd_and_hms(2024, 1, 2, 15, 0, 0).unwrap();

        assert_eq!(current_night_date(&evening, &window, &Utc), date(2024, 1, 2));
        assert_eq!(current_night_date(&early, &window, &Utc), date(2024, 1, 2));
        assert_eq!(current_night_date(&afternoon, &window, &Utc), date(2024, 1, 2));
    }
}
