//! Core types for the Sleepwave pipeline
//!
//! This module defines the data structures that flow through each stage of the
//! pipeline: raw screen events, off-periods, sleep candidates, and persisted
//! sleep episodes.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// Identifier assigned by the episode store
pub type EpisodeId = i64;

/// Screen state transition reported by the device
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScreenEventKind {
    #[serde(alias = "SCREEN_ON", alias = "on")]
    ScreenOn,
    #[serde(alias = "SCREEN_OFF", alias = "off")]
    ScreenOff,
}

/// A single screen on/off event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScreenEvent {
    /// Unix timestamp in milliseconds
    pub timestamp_millis: i64,
    /// Screen state after the event
    pub kind: ScreenEventKind,
}

impl ScreenEvent {
    pub fn on(timestamp_millis: i64) -> Self {
        Self {
            timestamp_millis,
            kind: ScreenEventKind::ScreenOn,
        }
    }

    pub fn off(timestamp_millis: i64) -> Self {
        Self {
            timestamp_millis,
            kind: ScreenEventKind::ScreenOff,
        }
    }

    /// Event time as a UTC instant, `None` if the timestamp is out of range
    pub fn instant(&self) -> Option<DateTime<Utc>> {
        DateTime::<Utc>::from_timestamp_millis(self.timestamp_millis)
    }
}

/// A closed interval of continuous screen-off time
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OffPeriod {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    /// Whole minutes between start and end (truncated)
    pub duration_minutes: i64,
}

impl OffPeriod {
    /// Build a period; returns `None` unless `end > start`.
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Option<Self> {
        if end <= start {
            return None;
        }
        Some(Self {
            start,
            end,
            duration_minutes: (end - start).num_minutes(),
        })
    }

    /// Whole minutes from the end of this period to the start of `later`
    pub fn gap_minutes_to(&self, later: &OffPeriod) -> i64 {
        (later.start - self.end).num_minutes()
    }
}

/// An off-period under classification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SleepCandidate {
    pub period: OffPeriod,
    pub is_sleep: bool,
}

impl SleepCandidate {
    pub fn new(period: OffPeriod) -> Self {
        Self {
            period,
            is_sleep: false,
        }
    }
}

/// A confirmed sleep interval owned by storage
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SleepEpisode {
    pub id: EpisodeId,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub duration_minutes: i64,
    pub is_potential_sleep: bool,
    /// The night this episode is attributed to
    pub sleep_date: NaiveDate,
    #[serde(default)]
    pub is_deleted: bool,
}

impl SleepEpisode {
    /// Inclusive overlap test, touching endpoints count as overlapping
    pub fn overlaps(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> bool {
        self.start <= end && start <= self.end
    }
}

/// Episode data before the store assigns an id
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewEpisode {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub duration_minutes: i64,
    pub is_potential_sleep: bool,
    pub sleep_date: NaiveDate,
}

impl NewEpisode {
    pub fn into_episode(self, id: EpisodeId) -> SleepEpisode {
        SleepEpisode {
            id,
            start: self.start,
            end: self.end,
            duration_minutes: self.duration_minutes,
            is_potential_sleep: self.is_potential_sleep,
            sleep_date: self.sleep_date,
            is_deleted: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_off_period_requires_positive_span() {
        let t = Utc.with_ymd_and_hms(2024, 1, 15, 23, 0, 0).unwrap();
        assert!(OffPeriod::new(t, t).is_none());
        assert!(OffPeriod::new(t, t - chrono::Duration::minutes(1)).is_none());

        let period = OffPeriod::new(t, t + chrono::Duration::seconds(5399)).unwrap();
        assert_eq!(period.duration_minutes, 89);
    }

    #[test]
    fn test_event_kind_aliases() {
        let event: ScreenEvent =
            serde_json::from_str(r#"{"timestamp_millis": 1000, "kind": "SCREEN_OFF"}"#).unwrap();
        assert_eq!(event.kind, ScreenEventKind::ScreenOff);

        let event: ScreenEvent =
            serde_json::from_str(r#"{"timestamp_millis": 1000, "kind": "screen_on"}"#).unwrap();
        assert_eq!(event.kind, ScreenEventKind::ScreenOn);
    }

    #[test]
    fn test_overlap_is_inclusive() {
        let start = Utc.with_ymd_and_hms(2024, 1, 15, 23, 0, 0).unwrap();
        let end = Utc.with_ymd_and_hms(2024, 1, 16, 7, 0, 0).unwrap();
        let episode = NewEpisode {
            start,
            end,
            duration_minutes: 480,
            is_potential_sleep: true,
            sleep_date: NaiveDate::from_ymd_opt(2024, 1, 16).unwrap(),
        }
        .into_episode(1);

        assert!(episode.overlaps(end, end + chrono::Duration::hours(1)));
        assert!(!episode.overlaps(
            end + chrono::Duration::minutes(1),
            end + chrono::Duration::hours(1)
        ));
    }
}
