//! Collaborator interfaces for storage and event sourcing
//!
//! The pipeline reaches persistence and the OS event log only through
//! [`SleepStore`] and [`ScreenEventSource`]. [`MemoryStore`] and
//! [`ScreenEventLog`] are the in-process implementations used by the CLI,
//! the FFI layer and the tests.

use crate::error::{SleepError, StoreError};
use crate::inference::events_between;
use crate::types::{EpisodeId, NewEpisode, ScreenEvent, SleepEpisode};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Persistent episode storage.
///
/// Inserts are append-only. Deletion is soft: episodes are flagged, never
/// removed, so re-analysis of the same events stays idempotent.
pub trait SleepStore {
    /// Exact start/end match, deleted episodes included
    fn episode_exists(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> Result<bool, StoreError>;

    fn insert_episode(&mut self, episode: NewEpisode) -> Result<EpisodeId, StoreError>;

    /// Episode with the latest end time
    fn latest_episode(&self, include_deleted: bool) -> Result<Option<SleepEpisode>, StoreError>;

    /// Non-deleted episode with the earliest sleep date
    fn earliest_episode(&self) -> Result<Option<SleepEpisode>, StoreError>;

    /// Non-deleted episodes whose sleep date lies in `[from, to]`, ordered by start
    fn episodes_between(&self, from: NaiveDate, to: NaiveDate) -> Result<Vec<SleepEpisode>, StoreError>;

    /// Non-deleted episodes attributed to `date`, ordered by start
    fn episodes_on_date(&self, date: NaiveDate) -> Result<Vec<SleepEpisode>, StoreError> {
        self.episodes_between(date, date)
    }

    /// Whether any non-deleted episode touches or overlaps `[start, end]`
    fn has_overlapping(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> Result<bool, StoreError>;

    fn soft_delete(&mut self, id: EpisodeId) -> Result<(), StoreError>;

    fn all_episodes(&self, include_deleted: bool) -> Result<Vec<SleepEpisode>, StoreError>;
}

/// In-memory episode store with JSON persistence
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MemoryStore {
    episodes: Vec<SleepEpisode>,
    next_id: EpisodeId,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.episodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.episodes.is_empty()
    }

    /// Serialize store state to JSON
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Deserialize store state from JSON
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        let mut store: MemoryStore = serde_json::from_str(json)?;
        let max_id = store.episodes.iter().map(|e| e.id).max().unwrap_or(0);
        store.next_id = store.next_id.max(max_id);
        Ok(store)
    }

    /// Load from a file, starting empty when it does not exist
    pub fn load(path: &Path) -> Result<Self, StoreError> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let json = std::fs::read_to_string(path)?;
        Ok(Self::from_json(&json)?)
    }

    pub fn save(&self, path: &Path) -> Result<(), StoreError> {
        std::fs::write(path, self.to_json()?)?;
        Ok(())
    }

    fn active(&self) -> impl Iterator<Item = &SleepEpisode> {
        self.episodes.iter().filter(|e| !e.is_deleted)
    }
}

impl SleepStore for MemoryStore {
    fn episode_exists(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> Result<bool, StoreError> {
        Ok(self.episodes.iter().any(|e| e.start == start && e.end == end))
    }

    fn insert_episode(&mut self, episode: NewEpisode) -> Result<EpisodeId, StoreError> {
        self.next_id += 1;
        let id = self.next_id;
        self.episodes.push(episode.into_episode(id));
        Ok(id)
    }

    fn latest_episode(&self, include_deleted: bool) -> Result<Option<SleepEpisode>, StoreError> {
        Ok(self
            .episodes
            .iter()
            .filter(|e| include_deleted || !e.is_deleted)
            .max_by_key(|e| e.end)
            .cloned())
    }

    fn earliest_episode(&self) -> Result<Option<SleepEpisode>, StoreError> {
        Ok(self.active().min_by_key(|e| (e.sleep_date, e.start)).cloned())
    }

    fn episodes_between(&self, from: NaiveDate, to: NaiveDate) -> Result<Vec<SleepEpisode>, StoreError> {
        let mut episodes: Vec<SleepEpisode> = self
            .active()
            .filter(|e| e.sleep_date >= from && e.sleep_date <= to)
            .cloned()
            .collect();
        episodes.sort_by_key(|e| e.start);
        Ok(episodes)
    }

    fn has_overlapping(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> Result<bool, StoreError> {
        Ok(self.active().any(|e| e.overlaps(start, end)))
    }

    fn soft_delete(&mut self, id: EpisodeId) -> Result<(), StoreError> {
        let episode = self
            .episodes
            .iter_mut()
            .find(|e| e.id == id)
            .ok_or(StoreError::NotFound(id))?;
        episode.is_deleted = true;
        Ok(())
    }

    fn all_episodes(&self, include_deleted: bool) -> Result<Vec<SleepEpisode>, StoreError> {
        let mut episodes: Vec<SleepEpisode> = self
            .episodes
            .iter()
            .filter(|e| include_deleted || !e.is_deleted)
            .cloned()
            .collect();
        episodes.sort_by_key(|e| e.start);
        Ok(episodes)
    }
}

/// Source of raw screen events.
///
/// Returns an empty list when nothing happened in the range.
pub trait ScreenEventSource {
    fn fetch_screen_events(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<ScreenEvent>, SleepError>;
}

/// Screen events held in memory, kept in timestamp order
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScreenEventLog {
    events: Vec<ScreenEvent>,
}

impl ScreenEventLog {
    pub fn new(mut events: Vec<ScreenEvent>) -> Self {
        events.sort_by_key(|e| e.timestamp_millis);
        Self { events }
    }

    /// Parse a JSON array of events
    pub fn parse_array(json: &str) -> Result<Self, SleepError> {
        let events: Vec<ScreenEvent> = serde_json::from_str(json)?;
        Ok(Self::new(events))
    }

    /// Parse NDJSON (newline-delimited JSON), one event per line
    pub fn parse_ndjson(ndjson: &str) -> Result<Self, SleepError> {
        let mut events = Vec::new();
        for (line_num, line) in ndjson.lines().enumerate() {
            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }
            match serde_json::from_str::<ScreenEvent>(trimmed) {
                Ok(event) => events.push(event),
                Err(e) => {
                    return Err(SleepError::ParseError(format!(
                        "Failed to parse line {}: {}",
                        line_num + 1,
                        e
                    )));
                }
            }
        }
        Ok(Self::new(events))
    }

    /// Accepts either a JSON array or NDJSON
    pub fn parse(input: &str) -> Result<Self, SleepError> {
        if input.trim_start().starts_with('[') {
            Self::parse_array(input)
        } else {
            Self::parse_ndjson(input)
        }
    }

    pub fn events(&self) -> &[ScreenEvent] {
        &self.events
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}

impl ScreenEventSource for ScreenEventLog {
    fn fetch_screen_events(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<ScreenEvent>, SleepError> {
        Ok(events_between(&self.events, start, end))
    }
}
