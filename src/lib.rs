//! Sleepwave - On-device sleep inference from screen on/off events
//!
//! Sleepwave turns a phone's screen activity into sleep episodes through a
//! deterministic pipeline: off-period extraction → night-window classification
//! → false-sleep pruning → cluster extension → sleep-date resolution.
//!
//! ## Modules
//!
//! - **Inference**: Screen events into confirmed sleep episodes
//! - **Debt**: Exponentially decayed sleep debt over recent nights
//! - **Tracker**: Store-backed analysis runs, manual episodes, summaries and energy points

pub mod clock;
pub mod config;
pub mod debt;
pub mod energy;
pub mod error;
pub mod inference;
pub mod manual;
pub mod night_window;
pub mod pipeline;
pub mod store;
pub mod summary;
pub mod types;

// FFI bindings for C interop (always available for cdylib/staticlib builds)
pub mod ffi;

pub use config::{NightWindowConfig, Settings};
pub use debt::SleepDebt;
pub use error::{ConfigError, SleepError, StoreError, ValidationError};
pub use pipeline::{infer_sleep_episodes, AnalysisReport, SleepTracker};
pub use store::{MemoryStore, ScreenEventLog, ScreenEventSource, SleepStore};
pub use types::{ScreenEvent, ScreenEventKind, SleepEpisode};

/// Sleepwave version, reported by the CLI and the FFI
pub const SLEEPWAVE_VERSION: &str = env!("CARGO_PKG_VERSION");
