//! Manual episode entry
//!
//! User-entered episodes pass the same storage as detected ones, after the
//! checks below. Checks run in a fixed order and the first failure wins.

use crate::config::NightWindowConfig;
use crate::error::{SleepError, ValidationError};
use crate::inference::resolve_sleep_date;
use crate::night_window::local_to_utc;
use crate::store::SleepStore;
use crate::types::{EpisodeId, NewEpisode};
use chrono::{DateTime, Duration, NaiveDate, NaiveTime, TimeZone, Utc};
use tracing::info;

/// Longest episode accepted from manual entry
pub const MAX_MANUAL_EPISODE_HOURS: i64 = 24;

/// Check a manual entry against the clock.
///
/// Equal start and end are accepted.
pub fn validate_manual_episode(
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    now: DateTime<Utc>,
) -> Result<(), ValidationError> {
    if start > now || end > now {
        return Err(ValidationError::FutureDateTime);
    }
    if end < start {
        return Err(ValidationError::EndBeforeStart);
    }
    if end - start > Duration::hours(MAX_MANUAL_EPISODE_HOURS) {
        return Err(ValidationError::TooLong);
    }
    Ok(())
}

/// Validate and store a manual episode, returning its id
pub fn add_manual_episode<S, Tz>(
    store: &mut S,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    now: DateTime<Utc>,
    window: &NightWindowConfig,
    tz: &Tz,
) -> Result<EpisodeId, SleepError>
where
    S: SleepStore + ?Sized,
    Tz: TimeZone,
{
    validate_manual_episode(start, end, now)?;
    if store.has_overlapping(start, end)? {
        return Err(ValidationError::Overlap.into());
    }

    let episode = NewEpisode {
        start,
        end,
        duration_minutes: (end - start).num_minutes(),
        is_potential_sleep: true,
        sleep_date: resolve_sleep_date(&start, &end, window, tz),
    };
    let sleep_date = episode.sleep_date;
    let id = store.insert_episode(episode)?;

    info!(id, %sleep_date, "Manual sleep episode added");
    Ok(id)
}

/// Combine a local date with an "HH:MM" clock time
pub fn parse_local_time<Tz: TimeZone>(
    date: NaiveDate,
    time: &str,
    tz: &Tz,
) -> Result<DateTime<Utc>, SleepError> {
    let time = NaiveTime::parse_from_str(time.trim(), "%H:%M")
        .map_err(|e| SleepError::ParseError(format!("Invalid time '{}': {}", time, e)))?;
    Ok(local_to_utc(date.and_time(time), tz))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use pretty_assertions::assert_eq;

    fn at(day: u32, hour: u32, minute: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, day, hour, minute, 0).unwrap()
    }

    #[test]
    fn test_validation_order_and_messages() {
        let now = at(15, 12, 0);

        let err = validate_manual_episode(at(15, 1, 0), at(15, 13, 0), now).unwrap_err();
        assert_eq!(err, ValidationError::FutureDateTime);
        assert_eq!(err.to_string(), "Cannot select future dates or times");

        let err = validate_manual_episode(at(15, 8, 0), at(15, 1, 0), now).unwrap_err();
        assert_eq!(err.to_string(), "End time cannot be before start time");

        let err = validate_manual_episode(at(13, 8, 0), at(14, 8, 1), now).unwrap_err();
        assert_eq!(err.to_string(), "Sleep period cannot be longer than 24 hours");

        assert!(validate_manual_episode(at(13, 8, 0), at(14, 8, 0), now).is_ok());
        assert!(validate_manual_episode(at(15, 8, 0), at(15, 8, 0), now).is_ok());
    }

    #[test]
    fn test_overlap_is_rejected() {
        let mut store = MemoryStore::new();
        let window = NightWindowConfig::new(22, 7).unwrap();
        let now = at(16, 12, 0);

        add_manual_episode(&mut store, at(14, 23, 0), at(15, 7, 0), now, &window, &Utc).unwrap();

        // Touching the previous end counts as overlap
        let err = add_manual_episode(&mut store, at(15, 7, 0), at(15, 9, 0), now, &window, &Utc).unwrap_err();
        assert!(matches!(err, SleepError::Validation(ValidationError::Overlap)));
        assert_eq!(err.to_string(), "Sleep period overlaps with existing period");

        let id = add_manual_episode(&mut store, at(15, 7, 1), at(15, 9, 0), now, &window, &Utc).unwrap();
        let stored = store.all_episodes(false).unwrap();
        assert_eq!(stored.len(), 2);
        let added = stored.iter().find(|e| e.id == id).unwrap();
        assert_eq!(added.duration_minutes, 119);
        assert!(added.is_potential_sleep);
        assert_eq!(added.sleep_date, NaiveDate::from_ymd_opt(2024, 1, 15).unwrap());
    }

    #[test]
    fn test_deleted_episode_does_not_block_entry() {
        let mut store = MemoryStore::new();
        let window = NightWindowConfig::default();
        let now = at(16, 12, 0);

        let id = add_manual_episode(&mut store, at(15, 1, 0), at(15, 7, 0), now, &window, &Utc).unwrap();
        store.soft_delete(id).unwrap();
        assert!(add_manual_episode(&mut store, at(15, 2, 0), at(15, 6, 0), now, &window, &Utc).is_ok());
    }

    #[test]
    fn test_parse_local_time() {
        let date = NaiveDate::from_ymd_opt(2024, 1, 15).unwrap();
        let tz = chrono::FixedOffset::east_opt(3600).unwrap();
        assert_eq!(parse_local_time(date, "07:30", &tz).unwrap(), at(15, 6, 30));
        assert!(parse_local_time(date, "7h30", &tz).is_err());
    }
}
