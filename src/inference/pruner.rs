//! Same-night pruning
//!
//! Within a night, a short confirmed episode that sits well apart from a
//! longer one is usually a phone left face-down rather than sleep. Confirmed
//! candidates are grouped by sleep date and compared with their successor in
//! start order. All demotions are decided on the initial labels and applied
//! together afterwards, so the outcome does not depend on visit order.

use super::candidates::CandidateSet;
use super::resolver::resolve_sleep_date;
use crate::config::{AnalysisConfig, NightWindowConfig};
use chrono::{NaiveDate, TimeZone};
use std::collections::{BTreeMap, BTreeSet};

/// Demote short same-night episodes. Returns the demoted indices in ascending order.
pub fn prune_false_sleeps<Tz: TimeZone>(
    set: &mut CandidateSet,
    window: &NightWindowConfig,
    config: &AnalysisConfig,
    tz: &Tz,
) -> Vec<usize> {
    let mut nights: BTreeMap<NaiveDate, Vec<usize>> = BTreeMap::new();
    for index in set.order_by_start() {
        let Some(candidate) = set.get(index) else {
            continue;
        };
        if !candidate.is_sleep {
            continue;
        }
        let date = resolve_sleep_date(&candidate.period.start, &candidate.period.end, window, tz);
        nights.entry(date).or_default().push(index);
    }

    let mut demoted = BTreeSet::new();
    for indices in nights.values() {
        for pair in indices.windows(2) {
            let (Some(first), Some(second)) = (set.get(pair[0]), set.get(pair[1])) else {
                continue;
            };
            let (first, second) = (first.period, second.period);

            if first.gap_minutes_to(&second) <= config.prune_gap_minutes {
                continue;
            }

            // Equal durations are kept on both sides
            let shorter = if first.duration_minutes < second.duration_minutes {
                Some((pair[0], first.duration_minutes))
            } else if second.duration_minutes < first.duration_minutes {
                Some((pair[1], second.duration_minutes))
            } else {
                None
            };

            if let Some((index, minutes)) = shorter {
                if minutes < config.prune_protect_minutes {
                    demoted.insert(index);
                }
            }
        }
    }

    for &index in &demoted {
        set.demote(index);
    }

    demoted.into_iter().collect()
}
