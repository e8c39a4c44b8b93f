//! Initial sleep classification
//!
//! A candidate is sleep when it starts inside the night window and lasts at
//! least the minimum sleep duration.

use super::candidates::CandidateSet;
use crate::config::{AnalysisConfig, NightWindowConfig};
use crate::night_window::local_hour;
use crate::types::OffPeriod;
use chrono::TimeZone;

/// Wrap off-periods as candidates and label the initial sleep set
pub fn classify_candidates<Tz: TimeZone>(
    periods: Vec<OffPeriod>,
    window: &NightWindowConfig,
    config: &AnalysisConfig,
    tz: &Tz,
) -> CandidateSet {
    let mut set = CandidateSet::from_periods(periods);

    for index in 0..set.len() {
        let qualifies = set.get(index).is_some_and(|candidate| {
            window.contains(local_hour(&candidate.period.start, tz))
                && candidate.period.duration_minutes >= config.min_sleep_minutes
        });
        if qualifies {
            set.mark(index);
        }
    }

    set
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};

    fn period(hour: u32, minutes: i64) -> OffPeriod {
        let start = Utc.with_ymd_and_hms(2024, 1, 15, hour, 0, 0).unwrap();
        OffPeriod::new(start, start + Duration::minutes(minutes)).unwrap()
    }

    #[test]
    fn test_threshold_is_inclusive() {
        let window = NightWindowConfig::new(22, 6).unwrap();
        let config = AnalysisConfig::default();
        let set = classify_candidates(vec![period(23, 90), period(23, 89)], &window, &config, &Utc);

        assert!(set.is_sleep(0));
        assert!(!set.is_sleep(1));
    }

    #[test]
    fn test_start_outside_window_is_not_sleep() {
        let window = NightWindowConfig::new(22, 6).unwrap();
        let config = AnalysisConfig::default();
        let set = classify_candidates(vec![period(14, 300), period(6, 300), period(5, 300)], &window, &config, &Utc);

        assert!(!set.is_sleep(0));
        assert!(!set.is_sleep(1));
        assert!(set.is_sleep(2));
    }

    #[test]
    fn test_classification_uses_local_hour() {
        let window = NightWindowConfig::new(22, 6).unwrap();
        let config = AnalysisConfig::default();
        // 20:00 UTC is 23:00 at UTC+3
        let tz = chrono::FixedOffset::east_opt(3 * 3600).unwrap();
        let set = classify_candidates(vec![period(20, 120)], &window, &config, &tz);
        assert!(set.is_sleep(0));

        let set = classify_candidates(vec![period(20, 120)], &window, &config, &Utc);
        assert!(!set.is_sleep(0));
    }
}
