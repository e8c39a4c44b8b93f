//! Screen-off interval extraction
//!
//! Scans the event stream left to right, pairing the most recent unmatched
//! OFF with the next ON. The extractor never fails: unmatched or malformed
//! state is dropped.

use crate::types::{OffPeriod, ScreenEvent, ScreenEventKind};
use chrono::{DateTime, Utc};

/// Convert a chronological event stream into off-periods.
///
/// An OFF overwrites any earlier pending OFF. An ON without a pending OFF is
/// ignored. A trailing OFF with no following ON is dropped.
pub fn extract_off_periods(events: &[ScreenEvent]) -> Vec<OffPeriod> {
    let mut periods = Vec::new();
    let mut pending_off: Option<DateTime<Utc>> = None;

    for event in events {
        let Some(instant) = event.instant() else {
            continue;
        };

        match event.kind {
            ScreenEventKind::ScreenOff => pending_off = Some(instant),
            ScreenEventKind::ScreenOn => {
                // Zero-length pairs (ties) produce no period
                if let Some(off) = pending_off.take() {
                    if let Some(period) = OffPeriod::new(off, instant) {
                        periods.push(period);
                    }
                }
            }
        }
    }

    periods
}

/// Events with timestamps inside `[start, end]`, bounds included
pub fn events_between(events: &[ScreenEvent], start: DateTime<Utc>, end: DateTime<Utc>) -> Vec<ScreenEvent> {
    let (start_ms, end_ms) = (start.timestamp_millis(), end.timestamp_millis());
    events
        .iter()
        .filter(|e| e.timestamp_millis >= start_ms && e.timestamp_millis <= end_ms)
        .copied()
        .collect()
}
