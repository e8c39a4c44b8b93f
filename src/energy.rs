//! Wake-up time and daily energy points
//!
//! The wake-up time of a night is the latest end among the episodes that
//! start after the night begins and before the night end plus a grace window.
//! Energy points are fixed offsets from that wake-up time.

use crate::config::NightWindowConfig;
use crate::night_window::local_hour_on;
use crate::types::SleepEpisode;
use chrono::{DateTime, Days, Duration, NaiveDate, TimeZone, Utc};
use serde::{Deserialize, Serialize};

pub const MORNING_PEAK_HOURS: i64 = 3;
pub const AFTERNOON_DIP_HOURS: i64 = 8;
pub const EVENING_PEAK_HOURS: i64 = 11;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EnergyPointKind {
    WakeUp,
    MorningPeak,
    AfternoonDip,
    EveningPeak,
}

impl EnergyPointKind {
    fn offset_hours(self) -> i64 {
        match self {
            EnergyPointKind::WakeUp => 0,
            EnergyPointKind::MorningPeak => MORNING_PEAK_HOURS,
            EnergyPointKind::AfternoonDip => AFTERNOON_DIP_HOURS,
            EnergyPointKind::EveningPeak => EVENING_PEAK_HOURS,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnergyPoint {
    pub kind: EnergyPointKind,
    pub at: DateTime<Utc>,
}

/// Estimate when the user woke up on `date`.
///
/// With a wrapping window the night starts on the previous calendar day.
/// Falls back to the night-end hour when no episode qualifies.
pub fn wake_up_time<Tz: TimeZone>(
    date: NaiveDate,
    episodes: &[SleepEpisode],
    window: &NightWindowConfig,
    wake_up_window_hours: i64,
    tz: &Tz,
) -> DateTime<Utc> {
    let night_end = local_hour_on(date, window.end_hour(), tz);
    let start_date = if window.wraps_midnight() {
        date.checked_sub_days(Days::new(1)).unwrap_or(date)
    } else {
        date
    };
    let night_start = local_hour_on(start_date, window.start_hour(), tz);
    let search_end = night_end + Duration::hours(wake_up_window_hours);

    episodes
        .iter()
        .filter(|e| !e.is_deleted && e.start > night_start && e.start < search_end)
        .map(|e| e.end)
        .max()
        .unwrap_or(night_end)
}

/// Wake-up point followed by the morning peak, afternoon dip and evening peak
pub fn energy_points(wake_up: DateTime<Utc>) -> Vec<EnergyPoint> {
    [
        EnergyPointKind::WakeUp,
        EnergyPointKind::MorningPeak,
        EnergyPointKind::AfternoonDip,
        EnergyPointKind::EveningPeak,
    ]
    .into_iter()
    .map(|kind| EnergyPoint {
        kind,
        at: wake_up + Duration::hours(kind.offset_hours()),
    })
    .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::NewEpisode;
    use pretty_assertions::assert_eq;

    fn episode(id: i64, start: DateTime<Utc>, end: DateTime<Utc>) -> SleepEpisode {
        NewEpisode {
            start,
            end,
            duration_minutes: (end - start).num_minutes(),
            is_potential_sleep: true,
            sleep_date: end.date_naive(),
        }
        .into_episode(id)
    }

    #[test]
    fn test_latest_qualifying_end_wins() {
        let window = NightWindowConfig::new(22, 7).unwrap();
        let date = NaiveDate::from_ymd_opt(2024, 1, 15).unwrap();
        let episodes = vec![
            episode(
                1,
                Utc.with_ymd_and_hms(2024, 1, 14, 23, 0, 0).unwrap(),
                Utc.with_ymd_and_hms(2024, 1, 15, 6, 0, 0).unwrap(),
            ),
            episode(
                2,
                Utc.with_ymd_and_hms(2024, 1, 15, 6, 20, 0).unwrap(),
                Utc.with_ymd_and_hms(2024, 1, 15, 7, 40, 0).unwrap(),
            ),
            // starts after 07:00 + 3h, ignored
            episode(
                3,
                Utc.with_ymd_and_hms(2024, 1, 15, 13, 0, 0).unwrap(),
                Utc.with_ymd_and_hms(2024, 1, 15, 14, 0, 0).unwrap(),
            ),
        ];

        let wake = wake_up_time(date, &episodes, &window, 3, &Utc);
        assert_eq!(wake, Utc.with_ymd_and_hms(2024, 1, 15, 7, 40, 0).unwrap());
    }

    #[test]
    fn test_defaults_to_night_end() {
        let window = NightWindowConfig::new(1, 10).unwrap();
        let date = NaiveDate::from_ymd_opt(2024, 1, 15).unwrap();
        let wake = wake_up_time(date, &[], &window, 3, &Utc);
        assert_eq!(wake, Utc.with_ymd_and_hms(2024, 1, 15, 10, 0, 0).unwrap());
    }

    #[test]
    fn test_energy_point_offsets() {
        let wake = Utc.with_ymd_and_hms(2024, 1, 15, 7, 0, 0).unwrap();
        let points = energy_points(wake);
        let hours: Vec<i64> = points.iter().map(|p| (p.at - wake).num_hours()).collect();

        assert_eq!(hours, vec![0, 3, 8, 11]);
        assert_eq!(points[2].kind, EnergyPointKind::AfternoonDip);
    }
}
