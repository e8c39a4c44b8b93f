//! Pipeline orchestration
//!
//! This module provides the public API for Sleepwave. The stateless functions
//! run inference over an event slice; [`SleepTracker`] wires the same passes
//! to a store, a settings source and a clock.

use crate::clock::{Clock, SystemClock};
use crate::config::{AnalysisConfig, NightWindowConfig, Settings, SettingsStore};
use crate::debt::{accumulate_debt, compute_sleep_debt, resolve_day_zero, SleepDebt};
use crate::energy::{energy_points, wake_up_time, EnergyPoint};
use crate::error::{SleepError, StoreError};
use crate::inference::{
    classify_candidates, current_night_date, extend_clusters, extract_off_periods, prune_false_sleeps,
    resolve_sleep_date,
};
use crate::manual::add_manual_episode;
use crate::store::{ScreenEventLog, ScreenEventSource, SleepStore};
use crate::summary::{daily_summaries, DailySummary};
use crate::types::{EpisodeId, NewEpisode, ScreenEvent, SleepEpisode};
use chrono::{DateTime, Duration, FixedOffset, NaiveDate, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard};
use tracing::{debug, info, info_span};
use uuid::Uuid;

/// Result of one pass over an event slice
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Inference {
    pub off_periods: usize,
    /// Candidates confirmed by the classifier
    pub classified: usize,
    pub demoted: usize,
    pub promoted: usize,
    /// Confirmed episodes in start order
    pub episodes: Vec<NewEpisode>,
}

/// Run the full inference over a chronological event slice.
///
/// Pipeline stages:
/// 1. Extractor - pair OFF/ON events into off-periods
/// 2. Classifier - label in-window periods long enough to be sleep
/// 3. Pruner - demote short episodes that sit apart from a longer one
/// 4. Extender - promote periods trailing a confirmed episode
/// 5. Resolver - attribute each episode to a sleep date
pub fn infer_sleep_episodes<Tz: TimeZone>(
    events: &[ScreenEvent],
    window: &NightWindowConfig,
    config: &AnalysisConfig,
    tz: &Tz,
) -> Inference {
    let periods = extract_off_periods(events);
    let off_periods = periods.len();

    let mut candidates = classify_candidates(periods, window, config, tz);
    let classified = candidates.confirmed_count();

    let demoted = prune_false_sleeps(&mut candidates, window, config, tz);
    for &index in &demoted {
        if let Some(candidate) = candidates.get(index) {
            debug!(start = %candidate.period.start, minutes = candidate.period.duration_minutes, "Pruned short episode");
        }
    }

    let promoted = extend_clusters(&mut candidates, window, config, tz);
    for &index in &promoted {
        if let Some(candidate) = candidates.get(index) {
            debug!(start = %candidate.period.start, minutes = candidate.period.duration_minutes, "Extended cluster");
        }
    }

    let episodes = candidates
        .confirmed_periods()
        .into_iter()
        .map(|period| NewEpisode {
            start: period.start,
            end: period.end,
            duration_minutes: period.duration_minutes,
            is_potential_sleep: true,
            sleep_date: resolve_sleep_date(&period.start, &period.end, window, tz),
        })
        .collect();

    Inference {
        off_periods,
        classified,
        demoted: demoted.len(),
        promoted: promoted.len(),
        episodes,
    }
}

/// Build a fixed zone from an offset east of UTC, in minutes
pub fn utc_offset(minutes: i32) -> Result<FixedOffset, SleepError> {
    minutes
        .checked_mul(60)
        .and_then(FixedOffset::east_opt)
        .ok_or_else(|| SleepError::ParseError(format!("Invalid UTC offset: {} minutes", minutes)))
}

fn settings_or_default(settings_json: Option<&str>) -> Result<Settings, SleepError> {
    match settings_json {
        Some(json) if !json.trim().is_empty() => Settings::from_json(json),
        _ => Ok(Settings::default()),
    }
}

/// Infer episodes from a JSON event list (array or NDJSON).
///
/// # Returns
/// JSON array of episodes, each with its resolved `sleep_date`
pub fn infer_episodes_json(
    events_json: &str,
    settings_json: Option<&str>,
    utc_offset_minutes: i32,
) -> Result<String, SleepError> {
    let settings = settings_or_default(settings_json)?;
    let tz = utc_offset(utc_offset_minutes)?;
    let log = ScreenEventLog::parse(events_json)?;

    let inference = infer_sleep_episodes(log.events(), &settings.night_window()?, &settings.analysis, &tz);
    Ok(serde_json::to_string(&inference.episodes)?)
}

/// Compute debt over a JSON episode list as of `now_millis`.
///
/// # Returns
/// JSON object of the debt, or `null` when the list is empty
pub fn sleep_debt_json(
    episodes_json: &str,
    settings_json: Option<&str>,
    now_millis: i64,
    utc_offset_minutes: i32,
) -> Result<String, SleepError> {
    let settings = settings_or_default(settings_json)?;
    let tz = utc_offset(utc_offset_minutes)?;
    let now = DateTime::<Utc>::from_timestamp_millis(now_millis)
        .ok_or_else(|| SleepError::ParseError(format!("Invalid timestamp: {}", now_millis)))?;
    let episodes: Vec<SleepEpisode> = serde_json::from_str(episodes_json)?;

    let debt = debt_over_episodes(&episodes, &now, &settings, &tz)?;
    Ok(serde_json::to_string(&debt)?)
}

fn debt_over_episodes<Tz: TimeZone>(
    episodes: &[SleepEpisode],
    now: &DateTime<Utc>,
    settings: &Settings,
    tz: &Tz,
) -> Result<Option<SleepDebt>, SleepError> {
    let active: Vec<SleepEpisode> = episodes.iter().filter(|e| !e.is_deleted).cloned().collect();
    let Some(earliest) = active.iter().map(|e| e.sleep_date).min() else {
        return Ok(None);
    };

    let window = settings.night_window()?;
    let (day_zero, excluded) = resolve_day_zero(now, &window, tz, |tonight| {
        active.iter().any(|e| e.sleep_date == tonight)
    });
    let mut debt = accumulate_debt(&active, day_zero, earliest, &settings.debt_config());
    debt.in_progress_night_excluded = excluded;
    Ok(Some(debt))
}

/// Summary of one tracker analysis run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisReport {
    pub run_id: Uuid,
    pub window_start: DateTime<Utc>,
    pub window_end: DateTime<Utc>,
    pub events: usize,
    pub off_periods: usize,
    pub confirmed: usize,
    pub demoted: usize,
    pub promoted: usize,
    /// Ids of newly stored episodes
    pub inserted: Vec<EpisodeId>,
    /// Confirmed episodes already present in the store
    pub skipped: usize,
}

/// Wake-up estimate and energy curve for a night
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnergyReport {
    pub night_date: NaiveDate,
    pub wake_up: DateTime<Utc>,
    pub points: Vec<EnergyPoint>,
}

/// Holds the in-progress flag for the duration of one analysis
struct AnalysisGuard<'a>(&'a AtomicBool);

impl<'a> AnalysisGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Result<Self, SleepError> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map_err(|_| SleepError::AnalysisInProgress)?;
        Ok(Self(flag))
    }
}

impl Drop for AnalysisGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Stateful tracker over a store and a settings source.
///
/// At most one analysis runs at a time; a concurrent call fails with
/// [`SleepError::AnalysisInProgress`].
pub struct SleepTracker<S, P, Tz: TimeZone> {
    store: Mutex<S>,
    settings: Mutex<P>,
    clock: Box<dyn Clock + Send + Sync>,
    tz: Tz,
    analyzing: AtomicBool,
}

impl<S, P, Tz> SleepTracker<S, P, Tz>
where
    S: SleepStore,
    P: SettingsStore,
    Tz: TimeZone,
{
    /// Create a tracker reading the system clock
    pub fn new(store: S, settings: P, tz: Tz) -> Self {
        Self::with_clock(store, settings, tz, SystemClock)
    }

    pub fn with_clock(store: S, settings: P, tz: Tz, clock: impl Clock + Send + Sync + 'static) -> Self {
        Self {
            store: Mutex::new(store),
            settings: Mutex::new(settings),
            clock: Box::new(clock),
            tz,
            analyzing: AtomicBool::new(false),
        }
    }

    pub fn into_parts(self) -> Result<(S, P), SleepError> {
        let store = self.store.into_inner().map_err(|_| StoreError::Poisoned)?;
        let settings = self.settings.into_inner().map_err(|_| StoreError::Poisoned)?;
        Ok((store, settings))
    }

    /// Run `f` against the store
    pub fn with_store<R>(&self, f: impl FnOnce(&S) -> R) -> Result<R, SleepError> {
        Ok(f(&*self.lock_store()?))
    }

    /// Swap in a new store, returning the previous one
    pub fn replace_store(&self, store: S) -> Result<S, SleepError> {
        Ok(std::mem::replace(&mut *self.lock_store()?, store))
    }

    /// Swap in new settings, returning the previous source
    pub fn replace_settings(&self, settings: P) -> Result<P, SleepError> {
        Ok(std::mem::replace(&mut *self.lock_settings()?, settings))
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    fn lock_store(&self) -> Result<MutexGuard<'_, S>, SleepError> {
        Ok(self.store.lock().map_err(|_| StoreError::Poisoned)?)
    }

    fn lock_settings(&self) -> Result<MutexGuard<'_, P>, SleepError> {
        Ok(self.settings.lock().map_err(|_| StoreError::Poisoned)?)
    }

    /// Current settings, read fresh from the settings source
    pub fn settings(&self) -> Result<Settings, SleepError> {
        self.lock_settings()?.settings()
    }

    /// Run inference over events since the last stored episode and persist the
    /// new episodes.
    ///
    /// Each episode is checked and inserted on its own, so a storage failure
    /// midway leaves earlier inserts in place and a re-run picks up the rest.
    pub fn analyze(&self, source: &dyn ScreenEventSource) -> Result<AnalysisReport, SleepError> {
        self.analyze_at(source, self.clock.now())
    }

    /// [`Self::analyze`] as of an explicit `now`
    pub fn analyze_at(
        &self,
        source: &dyn ScreenEventSource,
        now: DateTime<Utc>,
    ) -> Result<AnalysisReport, SleepError> {
        let _guard = AnalysisGuard::acquire(&self.analyzing)?;

        let run_id = Uuid::new_v4();
        let span = info_span!("analysis", %run_id);
        let _entered = span.enter();

        let settings = self.settings()?;
        let window = settings.night_window()?;

        let window_start = match self.lock_store()?.latest_episode(true)? {
            Some(latest) => latest.end,
            None => now - Duration::days(settings.analysis.analysis_window_days),
        };

        let events = source.fetch_screen_events(window_start, now)?;
        let inference = infer_sleep_episodes(&events, &window, &settings.analysis, &self.tz);

        let mut inserted = Vec::new();
        let mut skipped = 0;
        for episode in &inference.episodes {
            let mut store = self.lock_store()?;
            if store.episode_exists(episode.start, episode.end)? {
                debug!(start = %episode.start, end = %episode.end, "Episode already stored, skipping");
                skipped += 1;
                continue;
            }
            inserted.push(store.insert_episode(episode.clone())?);
        }

        info!(
            events = events.len(),
            off_periods = inference.off_periods,
            confirmed = inference.episodes.len(),
            inserted = inserted.len(),
            skipped,
            "Sleep analysis finished"
        );

        Ok(AnalysisReport {
            run_id,
            window_start,
            window_end: now,
            events: events.len(),
            off_periods: inference.off_periods,
            confirmed: inference.episodes.len(),
            demoted: inference.demoted,
            promoted: inference.promoted,
            inserted,
            skipped,
        })
    }

    /// Compute current debt and raise the stored worst-debt watermark if needed
    pub fn sleep_debt(&self) -> Result<Option<SleepDebt>, SleepError> {
        self.sleep_debt_at(self.clock.now())
    }

    pub fn sleep_debt_at(&self, now: DateTime<Utc>) -> Result<Option<SleepDebt>, SleepError> {
        let settings = self.settings()?;
        let window = settings.night_window()?;

        let debt = {
            let store = self.lock_store()?;
            compute_sleep_debt(&*store, &now, &window, &settings.debt_config(), &self.tz)?
        };

        if let Some(debt) = &debt {
            if -debt.debt > settings.max_sleep_debt {
                info!(max_sleep_debt = -debt.debt, "New worst sleep debt");
                self.lock_settings()?.update_max_sleep_debt(-debt.debt)?;
            }
        }

        Ok(debt)
    }

    /// Validate and store a user-entered episode
    pub fn add_episode(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> Result<EpisodeId, SleepError> {
        self.add_episode_at(start, end, self.clock.now())
    }

    pub fn add_episode_at(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<EpisodeId, SleepError> {
        let window = self.settings()?.night_window()?;
        let mut store = self.lock_store()?;
        add_manual_episode(&mut *store, start, end, now, &window, &self.tz)
    }

    /// Soft-delete an episode. It stays visible to duplicate detection.
    pub fn delete_episode(&self, id: EpisodeId) -> Result<(), SleepError> {
        self.lock_store()?.soft_delete(id)?;
        info!(id, "Sleep episode deleted");
        Ok(())
    }

    pub fn episodes(&self, include_deleted: bool) -> Result<Vec<SleepEpisode>, SleepError> {
        Ok(self.lock_store()?.all_episodes(include_deleted)?)
    }

    /// Per-night totals, newest night first
    pub fn daily_summaries(&self) -> Result<Vec<DailySummary>, SleepError> {
        let episodes = self.lock_store()?.all_episodes(false)?;
        Ok(daily_summaries(&episodes))
    }

    /// Wake-up time and energy points for the night `now` belongs to
    pub fn energy(&self) -> Result<EnergyReport, SleepError> {
        let settings = self.settings()?;
        let window = settings.night_window()?;
        let night_date = current_night_date(&self.clock.now(), &window, &self.tz);
        let episodes = self.lock_store()?.episodes_on_date(night_date)?;

        let wake_up = wake_up_time(
            night_date,
            &episodes,
            &window,
            settings.analysis.wake_up_window_hours,
            &self.tz,
        );

        Ok(EnergyReport {
            night_date,
            wake_up,
            points: energy_points(wake_up),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::FixedClock;
    use crate::store::MemoryStore;
    use pretty_assertions::assert_eq;
    use std::cell::RefCell;

    fn ms(day: u32, hour: u32, minute: u32) -> i64 {
        Utc.with_ymd_and_hms(2024, 1, day, hour, minute, 0)
            .unwrap()
            .timestamp_millis()
    }

    fn night_events() -> Vec<ScreenEvent> {
        vec![
            // 00:30 - 07:10 main sleep
            ScreenEvent::off(ms(15, 0, 30)),
            ScreenEvent::on(ms(15, 7, 10)),
            // 07:20 - 08:00 lingering in bed, after the window
            ScreenEvent::off(ms(15, 7, 20)),
            ScreenEvent::on(ms(15, 8, 0)),
            // afternoon nap is outside the window
            ScreenEvent::off(ms(15, 14, 0)),
            ScreenEvent::on(ms(15, 16, 0)),
        ]
    }

    fn settings() -> Settings {
        Settings {
            night_start_hour: 22,
            night_end_hour: 7,
            ..Settings::default()
        }
    }

    #[test]
    fn test_infer_sleep_episodes() {
        let s = settings();
        let inference = infer_sleep_episodes(&night_events(), &s.night_window().unwrap(), &s.analysis, &Utc);

        assert_eq!(inference.off_periods, 3);
        assert_eq!(inference.classified, 1);
        assert_eq!(inference.promoted, 1);
        assert_eq!(inference.episodes.len(), 2);
        assert_eq!(inference.episodes[0].duration_minutes, 400);
        assert_eq!(inference.episodes[1].duration_minutes, 40);
        assert!(inference
            .episodes
            .iter()
            .all(|e| e.sleep_date == NaiveDate::from_ymd_opt(2024, 1, 15).unwrap()));
    }

    #[test]
    fn test_tracker_analysis_is_idempotent() {
        let clock = FixedClock(Utc.with_ymd_and_hms(2024, 1, 15, 18, 0, 0).unwrap());
        let tracker = SleepTracker::with_clock(MemoryStore::new(), settings(), Utc, clock);
        let source = ScreenEventLog::new(night_events());

        let first = tracker.analyze(&source).unwrap();
        assert_eq!(first.inserted.len(), 2);
        assert_eq!(first.skipped, 0);

        let second = tracker.analyze(&source).unwrap();
        assert!(second.inserted.is_empty());
        assert_ne!(first.run_id, second.run_id);
        assert_eq!(tracker.episodes(true).unwrap().len(), 2);
    }

    #[test]
    fn test_deleted_episode_still_blocks_reinsert() {
        let clock = FixedClock(Utc.with_ymd_and_hms(2024, 1, 15, 18, 0, 0).unwrap());
        let tracker = SleepTracker::with_clock(MemoryStore::new(), settings(), Utc, clock);
        let source = ScreenEventLog::new(night_events());

        let first = tracker.analyze(&source).unwrap();
        tracker.delete_episode(first.inserted[0]).unwrap();

        let (store, _) = tracker.into_parts().unwrap();
        let window = settings().night_window().unwrap();
        let inference = infer_sleep_episodes(source.events(), &window, &settings().analysis, &Utc);
        for episode in &inference.episodes {
            assert!(store.episode_exists(episode.start, episode.end).unwrap());
        }
        assert_eq!(store.all_episodes(false).unwrap().len(), 1);
    }

    struct ReentrantSource<'a> {
        tracker: &'a SleepTracker<MemoryStore, Settings, Utc>,
        nested: RefCell<Option<bool>>,
    }

    impl ScreenEventSource for ReentrantSource<'_> {
        fn fetch_screen_events(
            &self,
            _start: DateTime<Utc>,
            _end: DateTime<Utc>,
        ) -> Result<Vec<ScreenEvent>, SleepError> {
            let nested = self.tracker.analyze(&ScreenEventLog::default());
            *self.nested.borrow_mut() = Some(matches!(nested, Err(SleepError::AnalysisInProgress)));
            Ok(Vec::new())
        }
    }

    #[test]
    fn test_concurrent_analysis_is_refused() {
        let clock = FixedClock(Utc.with_ymd_and_hms(2024, 1, 15, 18, 0, 0).unwrap());
        let tracker = SleepTracker::with_clock(MemoryStore::new(), settings(), Utc, clock);
        let source = ReentrantSource {
            tracker: &tracker,
            nested: RefCell::new(None),
        };

        assert!(tracker.analyze(&source).is_ok());
        assert_eq!(*source.nested.borrow(), Some(true));

        // The guard is released once the run ends
        assert!(tracker.analyze(&ScreenEventLog::default()).is_ok());
    }

    #[test]
    fn test_debt_updates_watermark() {
        let clock = FixedClock(Utc.with_ymd_and_hms(2024, 1, 15, 18, 0, 0).unwrap());
        let tracker = SleepTracker::with_clock(MemoryStore::new(), settings(), Utc, clock);
        assert!(tracker.sleep_debt().unwrap().is_none());

        tracker.analyze(&ScreenEventLog::new(night_events())).unwrap();
        let debt = tracker.sleep_debt().unwrap().unwrap();

        // 440 minutes against 480 needed
        assert!((debt.debt + 40.0 / 60.0).abs() < 1e-9);
        assert!((tracker.settings().unwrap().max_sleep_debt - 40.0 / 60.0).abs() < 1e-9);
    }

    #[test]
    fn test_energy_report() {
        let clock = FixedClock(Utc.with_ymd_and_hms(2024, 1, 15, 18, 0, 0).unwrap());
        let tracker = SleepTracker::with_clock(MemoryStore::new(), settings(), Utc, clock);
        tracker.analyze(&ScreenEventLog::new(night_events())).unwrap();

        let energy = tracker.energy().unwrap();
        assert_eq!(energy.night_date, NaiveDate::from_ymd_opt(2024, 1, 15).unwrap());
        assert_eq!(energy.wake_up, Utc.with_ymd_and_hms(2024, 1, 15, 8, 0, 0).unwrap());
        assert_eq!(energy.points.len(), 4);
    }

    #[test]
    fn test_json_entry_points() {
        let events = serde_json::to_string(&night_events()).unwrap();
        let settings_json = settings().to_json().unwrap();

        let episodes = infer_episodes_json(&events, Some(&settings_json), 0).unwrap();
        let parsed: Vec<NewEpisode> = serde_json::from_str(&episodes).unwrap();
        assert_eq!(parsed.len(), 2);

        let stored: Vec<SleepEpisode> = parsed
            .into_iter()
            .enumerate()
            .map(|(i, e)| e.into_episode(i as i64 + 1))
            .collect();
        let debt = sleep_debt_json(
            &serde_json::to_string(&stored).unwrap(),
            Some(&settings_json),
            ms(15, 18, 0),
            0,
        )
        .unwrap();
        let debt: Option<SleepDebt> = serde_json::from_str(&debt).unwrap();
        assert_eq!(debt.unwrap().days.len(), 1);

        assert_eq!(sleep_debt_json("[]", None, ms(15, 18, 0), 0).unwrap(), "null");
        assert!(infer_episodes_json("not json", None, 0).is_err());
        assert!(utc_offset(24 * 60).is_err());
    }
}
