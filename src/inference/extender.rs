//! Cluster extension
//!
//! A confirmed episode pulls in the off-periods that follow it closely, so a
//! night interrupted by a quick phone check is still counted in full. Each
//! newly promoted candidate becomes an anchor itself, which lets a chain of
//! short gaps extend across the morning. The worklist visits every anchor at
//! most once and is bounded by `extension_iteration_cap`.

use super::candidates::CandidateSet;
use crate::config::{AnalysisConfig, NightWindowConfig};
use crate::night_window::local_hour;
use chrono::TimeZone;
use std::collections::VecDeque;
use tracing::{debug, warn};

/// Promote candidates that trail a confirmed episode. Returns the promoted indices
/// in promotion order.
pub fn extend_clusters<Tz: TimeZone>(
    set: &mut CandidateSet,
    window: &NightWindowConfig,
    config: &AnalysisConfig,
    tz: &Tz,
) -> Vec<usize> {
    let order = set.order_by_start();
    let mut rank = vec![0usize; set.len()];
    for (position, &index) in order.iter().enumerate() {
        rank[index] = position;
    }

    let mut worklist: VecDeque<usize> = order.iter().copied().filter(|&i| set.is_sleep(i)).collect();
    let mut promoted = Vec::new();
    let mut visited = 0usize;

    while let Some(anchor) = worklist.pop_front() {
        if visited >= config.extension_iteration_cap {
            warn!(
                cap = config.extension_iteration_cap,
                pending = worklist.len() + 1,
                "Extension iteration cap reached, stopping early"
            );
            break;
        }
        visited += 1;

        let Some(anchor_period) = set.get(anchor).map(|c| c.period) else {
            continue;
        };

        for &next in &order[rank[anchor] + 1..] {
            let Some(candidate) = set.get(next).copied() else {
                continue;
            };
            if anchor_period.gap_minutes_to(&candidate.period) > config.extend_gap_minutes {
                break;
            }
            if candidate.is_sleep {
                continue;
            }

            // In-window candidates already had their chance in the classifier
            let start_hour = local_hour(&candidate.period.start, tz);
            if candidate.period.duration_minutes > config.extend_min_minutes && !window.contains(start_hour) {
                set.mark(next);
                promoted.push(next);
                worklist.push_back(next);
            }
        }
    }

    debug!(anchors = visited, promoted = promoted.len(), "Cluster extension finished");
    promoted
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inference::classifier::classify_candidates;
    use crate::types::OffPeriod;
    use chrono::{Duration, Utc};

    fn period(day: u32, hour: u32, minute: u32, minutes: i64) -> OffPeriod {
        let start = Utc.with_ymd_and_hms(2024, 1, day, hour, minute, 0).unwrap();
        OffPeriod::new(start, start + Duration::minutes(minutes)).unwrap()
    }

    fn run(periods: Vec<OffPeriod>, config: &AnalysisConfig) -> (CandidateSet, Vec<usize>) {
        let window = NightWindowConfig::new(22, 6).unwrap();
        let mut set = classify_candidates(periods, &window, config, &Utc);
        let promoted = extend_clusters(&mut set, &window, config, &Utc);
        (set, promoted)
    }

    #[test]
    fn test_morning_tail_is_promoted() {
        // 01:00-05:00, then 06:10-07:10 after a 70 minute gap: too far
        let config = AnalysisConfig::default();
        let (set, promoted) = run(
            vec![period(2, 1, 0, 240), period(2, 6, 10, 60)],
            &config,
        );
        assert!(promoted.is_empty());
        assert_eq!(set.confirmed_count(), 1);

        // 01:00-05:50, then 06:10-07:10: gap 20, starts after the window, 60 > 30
        let (set, promoted) = run(
            vec![period(2, 1, 0, 290), period(2, 6, 10, 60)],
            &config,
        );
        assert_eq!(promoted, vec![1]);
        assert_eq!(set.confirmed_count(), 2);
    }

    #[test]
    fn test_chain_extends_through_promoted_anchors() {
        let config = AnalysisConfig::default();
        // anchor ends 05:50; 06:10-07:10 promoted; 07:30-08:15 promoted from it
        let (set, promoted) = run(
            vec![period(2, 1, 0, 290), period(2, 6, 10, 60), period(2, 7, 30, 45)],
            &config,
        );
        assert_eq!(promoted, vec![1, 2]);
        assert_eq!(set.confirmed_count(), 3);
    }

    #[test]
    fn test_short_or_in_window_candidates_skipped() {
        let config = AnalysisConfig::default();
        // 30 minutes is not strictly longer than the threshold
        let (_, promoted) = run(vec![period(2, 1, 0, 290), period(2, 6, 10, 30)], &config);
        assert!(promoted.is_empty());

        // in-window start, too short for the classifier: not promoted
        let (_, promoted) = run(vec![period(2, 1, 0, 60), period(2, 2, 10, 60), period(2, 3, 20, 200)], &config);
        assert!(promoted.is_empty());
    }

    #[test]
    fn test_gap_boundary() {
        let config = AnalysisConfig::default();
        // 01:00-05:40, next at 06:10: exactly 30 minutes
        let (_, promoted) = run(vec![period(2, 1, 0, 280), period(2, 6, 10, 60)], &config);
        assert_eq!(promoted, vec![1]);

        // 31 minutes is too far
        let (_, promoted) = run(vec![period(2, 1, 0, 279), period(2, 6, 10, 60)], &config);
        assert!(promoted.is_empty());
    }

    #[test]
    fn test_iteration_cap_stops_extension() {
        let config = AnalysisConfig {
            extension_iteration_cap: 1,
            ..AnalysisConfig::default()
        };
        let (set, promoted) = run(
            vec![period(2, 1, 0, 290), period(2, 6, 10, 60), period(2, 7, 30, 45)],
            &config,
        );
        // Only the initial anchor is visited
        assert_eq!(promoted, vec![1]);
        assert_eq!(set.confirmed_count(), 2);
    }
}
