//! Sleep episode inference
//!
//! This module turns a raw screen on/off stream into confirmed sleep periods.
//!
//! Pipeline: Events → Extractor → Classifier → Pruner → Extender → Resolver

pub mod candidates;
pub mod classifier;
pub mod extender;
pub mod extractor;
pub mod pruner;
pub mod resolver;

pub use candidates::CandidateSet;
pub use classifier::classify_candidates;
pub use extender::extend_clusters;
pub use extractor::{events_between, extract_off_periods};
pub use pruner::prune_false_sleeps;
pub use resolver::{current_night_date, resolve_sleep_date};
