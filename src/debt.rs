//! Sleep debt accumulation
//!
//! Debt is an exponentially recency-weighted sum of nightly deficits:
//!
//! ```text
//! debt = Σ_{i=0}^{N-1} (sleep_hours(day_i) - needed_sleep_hours) * exp(-i / tau_days)
//! ```
//!
//! `day_0` is the most recent night, `i` counts backward. Negative debt means
//! the user is behind on sleep.

use crate::config::{DebtConfig, NightWindowConfig};
use crate::error::StoreError;
use crate::inference::current_night_date;
use crate::night_window::local_hour;
use crate::store::SleepStore;
use crate::types::SleepEpisode;
use chrono::{DateTime, Days, NaiveDate, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::debug;

/// One night's share of the debt
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DebtDay {
    pub date: NaiveDate,
    /// Short display label, e.g. "Jan 05"
    pub label: String,
    pub sleep_hours: f64,
    pub days_ago: u32,
    /// Weighted deficit added to the total
    pub contribution: f64,
}

/// Result of a debt computation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SleepDebt {
    /// Signed debt in hours (negative = behind on sleep)
    pub debt: f64,
    pub day_zero: NaiveDate,
    /// True when tonight was skipped because it is still in progress
    pub in_progress_night_excluded: bool,
    /// Contributing nights, most recent first
    pub days: Vec<DebtDay>,
}

impl SleepDebt {
    /// Debt rendered for display, see [`format_debt`]
    pub fn formatted(&self) -> String {
        format_debt(self.debt)
    }
}

/// Render debt with up to two decimals and an explicit `+` when positive
pub fn format_debt(debt: f64) -> String {
    let rounded = (debt * 100.0).round() / 100.0;
    let mut text = format!("{:.2}", rounded);
    if text.contains('.') {
        let trimmed = text.trim_end_matches('0').trim_end_matches('.').len();
        text.truncate(trimmed);
    }
    if text == "-0" {
        text = "0".to_string();
    }
    if rounded > 0.0 {
        format!("+{}", text)
    } else {
        text
    }
}

/// Pick day 0 for the accumulation.
///
/// While the current hour is inside the night window and tonight has no
/// episode yet, tonight is skipped and the previous night becomes day 0.
/// Returns the date and whether tonight was skipped.
pub fn resolve_day_zero<Tz: TimeZone>(
    now: &DateTime<Utc>,
    window: &NightWindowConfig,
    tz: &Tz,
    has_episode_tonight: impl FnOnce(NaiveDate) -> bool,
) -> (NaiveDate, bool) {
    let tonight = current_night_date(now, window, tz);
    if window.contains(local_hour(now, tz)) && !has_episode_tonight(tonight) {
        let previous = tonight.checked_sub_days(Days::new(1)).unwrap_or(tonight);
        return (previous, true);
    }
    (tonight, false)
}

/// Accumulate debt over the nights ending at `day_zero`.
///
/// `earliest` is the sleep date of the oldest stored episode; nights before
/// it are not counted. `episodes` may contain anything, only the nights in
/// range contribute.
pub fn accumulate_debt(
    episodes: &[SleepEpisode],
    day_zero: NaiveDate,
    earliest: NaiveDate,
    config: &DebtConfig,
) -> SleepDebt {
    let mut minutes_by_date: HashMap<NaiveDate, i64> = HashMap::new();
    for episode in episodes.iter().filter(|e| !e.is_deleted) {
        *minutes_by_date.entry(episode.sleep_date).or_default() += episode.duration_minutes;
    }

    let available = (day_zero - earliest).num_days() + 1;
    let nights = available.clamp(0, i64::from(config.window_days)) as u32;

    let mut debt = 0.0;
    let mut days = Vec::with_capacity(nights as usize);
    for days_ago in 0..nights {
        let Some(date) = day_zero.checked_sub_days(Days::new(u64::from(days_ago))) else {
            break;
        };
        let sleep_hours = minutes_by_date.get(&date).copied().unwrap_or(0) as f64 / 60.0;
        let contribution =
            (sleep_hours - config.needed_sleep_hours) * (-(f64::from(days_ago)) / config.tau_days).exp();
        debt += contribution;
        days.push(DebtDay {
            date,
            label: date.format("%b %d").to_string(),
            sleep_hours,
            days_ago,
            contribution,
        });
    }

    SleepDebt {
        debt,
        day_zero,
        in_progress_night_excluded: false,
        days,
    }
}

/// Compute debt from stored episodes. Returns `None` when nothing is stored.
pub fn compute_sleep_debt<S, Tz>(
    store: &S,
    now: &DateTime<Utc>,
    window: &NightWindowConfig,
    config: &DebtConfig,
    tz: &Tz,
) -> Result<Option<SleepDebt>, StoreError>
where
    S: SleepStore + ?Sized,
    Tz: TimeZone,
{
    let Some(earliest) = store.earliest_episode()? else {
        return Ok(None);
    };

    let mut lookup_error = None;
    let (day_zero, excluded) = resolve_day_zero(now, window, tz, |tonight| {
        match store.episodes_on_date(tonight) {
            Ok(episodes) => !episodes.is_empty(),
            Err(e) => {
                lookup_error = Some(e);
                false
            }
        }
    });
    if let Some(e) = lookup_error {
        return Err(e);
    }

    let window_start = day_zero
        .checked_sub_days(Days::new(u64::from(config.window_days)))
        .unwrap_or(day_zero);
    let episodes = store.episodes_between(window_start, day_zero)?;

    let mut debt = accumulate_debt(&episodes, day_zero, earliest.sleep_date, config);
    debt.in_progress_night_excluded = excluded;

    debug!(
        debt = debt.debt,
        day_zero = %day_zero,
        nights = debt.days.len(),
        in_progress_excluded = excluded,
        "Sleep debt computed"
    );

    Ok(Some(debt))
}
