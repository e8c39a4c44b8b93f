//! User settings and tunable thresholds
//!
//! Settings are persisted as JSON and validated when they cross into the
//! library. The core only ever sees a [`NightWindowConfig`] built through
//! [`NightWindowConfig::new`], so hours outside 0..=23 never reach it.

use crate::error::{ConfigError, SleepError};
use serde::{Deserialize, Serialize};
use std::path::Path;

pub const DEFAULT_NIGHT_START_HOUR: u32 = 1;
pub const DEFAULT_NIGHT_END_HOUR: u32 = 10;
pub const DEFAULT_NEEDED_SLEEP_HOURS: f64 = 8.0;
/// Time constant of the debt decay, in days
pub const DEFAULT_TAU_DAYS: f64 = 4.0;
pub const DEFAULT_DEBT_WINDOW_DAYS: u32 = 14;

/// Clock-hour range treated as plausible sleep time
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NightWindowConfig {
    start_hour: u32,
    end_hour: u32,
}

impl NightWindowConfig {
    pub fn new(start_hour: u32, end_hour: u32) -> Result<Self, ConfigError> {
        if start_hour > 23 {
            return Err(ConfigError::InvalidHour {
                field: "night_start_hour",
                value: start_hour,
            });
        }
        if end_hour > 23 {
            return Err(ConfigError::InvalidHour {
                field: "night_end_hour",
                value: end_hour,
            });
        }
        Ok(Self {
            start_hour,
            end_hour,
        })
    }

    pub fn start_hour(&self) -> u32 {
        self.start_hour
    }

    pub fn end_hour(&self) -> u32 {
        self.end_hour
    }
}

impl Default for NightWindowConfig {
    fn default() -> Self {
        Self {
            start_hour: DEFAULT_NIGHT_START_HOUR,
            end_hour: DEFAULT_NIGHT_END_HOUR,
        }
    }
}

/// Parameters of the debt decay model
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DebtConfig {
    pub needed_sleep_hours: f64,
    pub tau_days: f64,
    /// Upper bound on the number of nights accumulated
    pub window_days: u32,
}

impl Default for DebtConfig {
    fn default() -> Self {
        Self {
            needed_sleep_hours: DEFAULT_NEEDED_SLEEP_HOURS,
            tau_days: DEFAULT_TAU_DAYS,
            window_days: DEFAULT_DEBT_WINDOW_DAYS,
        }
    }
}

/// Thresholds used by the inference passes.
///
/// The pruning gap, the extension gap and the sleep threshold are tuned
/// independently and are kept as separate values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    /// Minimum in-window off-period length classified as sleep
    pub min_sleep_minutes: i64,
    /// Candidates further apart than this on the same night are compared
    pub prune_gap_minutes: i64,
    /// Candidates at least this long are never pruned
    pub prune_protect_minutes: i64,
    /// Maximum gap after a confirmed episode for extension
    pub extend_gap_minutes: i64,
    /// Extension requires a candidate strictly longer than this
    pub extend_min_minutes: i64,
    /// Look-back used when no episode has been stored yet
    pub analysis_window_days: i64,
    /// Bound on anchors visited by the extender
    pub extension_iteration_cap: usize,
    /// Hours past the night end still searched for a wake-up
    pub wake_up_window_hours: i64,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            min_sleep_minutes: 90,
            prune_gap_minutes: 15,
            prune_protect_minutes: 180,
            extend_gap_minutes: 30,
            extend_min_minutes: 30,
            analysis_window_days: 14,
            extension_iteration_cap: 10_000,
            wake_up_window_hours: 3,
        }
    }
}

impl AnalysisConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.min_sleep_minutes <= 0 {
            return Err(ConfigError::InvalidThreshold("min_sleep_minutes"));
        }
        if self.prune_gap_minutes < 0 {
            return Err(ConfigError::InvalidThreshold("prune_gap_minutes"));
        }
        if self.prune_protect_minutes <= 0 {
            return Err(ConfigError::InvalidThreshold("prune_protect_minutes"));
        }
        if self.extend_gap_minutes < 0 {
            return Err(ConfigError::InvalidThreshold("extend_gap_minutes"));
        }
        if self.extend_min_minutes < 0 {
            return Err(ConfigError::InvalidThreshold("extend_min_minutes"));
        }
        if self.analysis_window_days <= 0 {
            return Err(ConfigError::InvalidThreshold("analysis_window_days"));
        }
        if self.extension_iteration_cap == 0 {
            return Err(ConfigError::InvalidThreshold("extension_iteration_cap"));
        }
        if self.wake_up_window_hours < 0 {
            return Err(ConfigError::InvalidThreshold("wake_up_window_hours"));
        }
        Ok(())
    }
}

/// Persisted user settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub night_start_hour: u32,
    pub night_end_hour: u32,
    pub needed_sleep_hours: f64,
    pub tau_days: f64,
    pub debt_window_days: u32,
    /// Worst debt observed so far, stored as a positive number of hours
    pub max_sleep_debt: f64,
    pub analysis: AnalysisConfig,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            night_start_hour: DEFAULT_NIGHT_START_HOUR,
            night_end_hour: DEFAULT_NIGHT_END_HOUR,
            needed_sleep_hours: DEFAULT_NEEDED_SLEEP_HOURS,
            tau_days: DEFAULT_TAU_DAYS,
            debt_window_days: DEFAULT_DEBT_WINDOW_DAYS,
            max_sleep_debt: 0.0,
            analysis: AnalysisConfig::default(),
        }
    }
}

impl Settings {
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.night_window()?;
        if !(self.needed_sleep_hours > 0.0 && self.needed_sleep_hours <= 24.0) {
            return Err(ConfigError::InvalidNeededSleep(self.needed_sleep_hours));
        }
        if !(self.tau_days > 0.0 && self.tau_days.is_finite()) {
            return Err(ConfigError::InvalidTau(self.tau_days));
        }
        if self.debt_window_days == 0 {
            return Err(ConfigError::InvalidThreshold("debt_window_days"));
        }
        self.analysis.validate()
    }

    pub fn night_window(&self) -> Result<NightWindowConfig, ConfigError> {
        NightWindowConfig::new(self.night_start_hour, self.night_end_hour)
    }

    pub fn debt_config(&self) -> DebtConfig {
        DebtConfig {
            needed_sleep_hours: self.needed_sleep_hours,
            tau_days: self.tau_days,
            window_days: self.debt_window_days,
        }
    }

    /// Load and validate settings from JSON
    pub fn from_json(json: &str) -> Result<Self, SleepError> {
        let settings: Settings = serde_json::from_str(json)?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// Load settings from a file, falling back to defaults when it does not exist
    pub fn load(path: &Path) -> Result<Self, SleepError> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let json = std::fs::read_to_string(path).map_err(crate::error::StoreError::from)?;
        Self::from_json(&json)
    }

    pub fn save(&self, path: &Path) -> Result<(), SleepError> {
        std::fs::write(path, self.to_json()?).map_err(crate::error::StoreError::from)?;
        Ok(())
    }
}

/// Source of settings, read fresh on every run
pub trait SettingsStore {
    fn settings(&self) -> Result<Settings, SleepError>;

    /// Persist a new worst-debt watermark
    fn update_max_sleep_debt(&mut self, max_debt: f64) -> Result<(), SleepError>;
}

impl SettingsStore for Settings {
    fn settings(&self) -> Result<Settings, SleepError> {
        self.validate()?;
        Ok(self.clone())
    }

    fn update_max_sleep_debt(&mut self, max_debt: f64) -> Result<(), SleepError> {
        self.max_sleep_debt = max_debt;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let settings = Settings::default();
        assert!(settings.validate().is_ok());
        assert_eq!(settings.night_window().unwrap(), NightWindowConfig::new(1, 10).unwrap());
        assert_eq!(settings.analysis.min_sleep_minutes, 90);
        assert_eq!(settings.analysis.prune_gap_minutes, 15);
        assert_eq!(settings.analysis.extend_gap_minutes, 30);
    }

    #[test]
    fn test_out_of_range_hours_rejected() {
        assert_eq!(
            NightWindowConfig::new(24, 6),
            Err(ConfigError::InvalidHour {
                field: "night_start_hour",
                value: 24
            })
        );
        assert!(NightWindowConfig::new(22, 30).is_err());
        assert!(NightWindowConfig::new(23, 0).is_ok());
    }

    #[test]
    fn test_from_json_partial_uses_defaults() {
        let settings = Settings::from_json(r#"{"night_start_hour": 21, "night_end_hour": 6}"#).unwrap();
        assert_eq!(settings.night_start_hour, 21);
        assert_eq!(settings.needed_sleep_hours, DEFAULT_NEEDED_SLEEP_HOURS);
        assert_eq!(settings.analysis, AnalysisConfig::default());
    }

    #[test]
    fn test_from_json_rejects_invalid() {
        assert!(Settings::from_json(r#"{"night_end_hour": 25}"#).is_err());
        assert!(Settings::from_json(r#"{"tau_days": 0.0}"#).is_err());
        assert!(Settings::from_json(r#"{"needed_sleep_hours": -1.0}"#).is_err());
        assert!(Settings::from_json(r#"{"analysis": {"min_sleep_minutes": 0}}"#).is_err());
    }

    #[test]
    fn test_watermark_update() {
        let mut settings = Settings::default();
        settings.update_max_sleep_debt(3.5).unwrap();
        assert_eq!(settings.settings().unwrap().max_sleep_debt, 3.5);
    }
}
