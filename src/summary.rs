//! Per-night summaries for display

use crate::types::SleepEpisode;
use chrono::{Days, NaiveDate};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailySummary {
    pub sleep_date: NaiveDate,
    /// "Jan 14 - Jan 15" style label spanning the night
    pub label: String,
    pub total_minutes: i64,
    pub total_hours: f64,
    pub episodes: Vec<SleepEpisode>,
}

/// Label a night by the day it started and the day it ended
pub fn night_label(sleep_date: NaiveDate) -> String {
    let previous = sleep_date.checked_sub_days(Days::new(1)).unwrap_or(sleep_date);
    format!("{} - {}", previous.format("%b %-d"), sleep_date.format("%b %-d"))
}

/// Group non-deleted episodes by sleep date, newest night first
pub fn daily_summaries(episodes: &[SleepEpisode]) -> Vec<DailySummary> {
    let mut nights: BTreeMap<NaiveDate, Vec<SleepEpisode>> = BTreeMap::new();
    for episode in episodes.iter().filter(|e| !e.is_deleted) {
        nights.entry(episode.sleep_date).or_default().push(episode.clone());
    }

    nights
        .into_iter()
        .rev()
        .map(|(sleep_date, mut episodes)| {
            episodes.sort_by_key(|e| e.start);
            let total_minutes = episodes.iter().map(|e| e.duration_minutes).sum();
            DailySummary {
                sleep_date,
                label: night_label(sleep_date),
                total_minutes,
                total_hours: total_minutes as f64 / 60.0,
                episodes,
            }
        })
        .collect()
}
