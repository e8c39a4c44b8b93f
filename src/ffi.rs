//! FFI bindings for Sleepwave
//!
//! This module provides C-compatible functions for calling Sleepwave from other
//! languages. All functions use C strings (null-terminated) and return allocated
//! memory that must be freed by the caller using `sleepwave_free_string`.
//!
//! Timestamps cross the boundary as Unix milliseconds, the local zone as an
//! offset from UTC in minutes.

use std::cell::RefCell;
use std::ffi::{CStr, CString};
use std::os::raw::c_char;
use std::ptr;

use chrono::{DateTime, FixedOffset, Utc};

use crate::config::Settings;
use crate::pipeline::{infer_episodes_json, sleep_debt_json, utc_offset, SleepTracker};
use crate::store::{MemoryStore, ScreenEventLog};
use crate::SleepError;

// Thread-local storage for the last error message
thread_local! {
    static LAST_ERROR: RefCell<Option<CString>> = const { RefCell::new(None) };
}

fn set_last_error(msg: &str) {
    LAST_ERROR.with(|e| {
        *e.borrow_mut() = CString::new(msg).ok();
    });
}

fn clear_last_error() {
    LAST_ERROR.with(|e| {
        *e.borrow_mut() = None;
    });
}

/// Helper to convert C string to Rust string
unsafe fn cstr_to_string(ptr: *const c_char) -> Option<String> {
    if ptr.is_null() {
        return None;
    }
    CStr::from_ptr(ptr).to_str().ok().map(|s| s.to_string())
}

/// Helper to convert Rust string to C string (caller must free)
fn string_to_cstr(s: &str) -> *mut c_char {
    match CString::new(s) {
        Ok(cstr) => cstr.into_raw(),
        Err(_) => ptr::null_mut(),
    }
}

/// Report a string result through the C convention: pointer or NULL + last error
fn string_result(result: Result<String, SleepError>) -> *mut c_char {
    match result {
        Ok(json) => string_to_cstr(&json),
        Err(e) => {
            set_last_error(&e.to_string());
            ptr::null_mut()
        }
    }
}

fn instant(millis: i64) -> Result<DateTime<Utc>, SleepError> {
    DateTime::<Utc>::from_timestamp_millis(millis)
        .ok_or_else(|| SleepError::ParseError(format!("Invalid timestamp: {}", millis)))
}

// ============================================================================
// Stateless API
// ============================================================================

/// Infer sleep episodes from screen events.
///
/// # Safety
/// - `events_json` must be a valid null-terminated C string (JSON array or NDJSON).
/// - `settings_json` may be NULL to use default settings.
/// - Returns a newly allocated JSON array that must be freed with `sleepwave_free_string`.
/// - Returns NULL on error; call `sleepwave_last_error` to get the error message.
#[no_mangle]
pub unsafe extern "C" fn sleepwave_infer_episodes(
    events_json: *const c_char,
    settings_json: *const c_char,
    utc_offset_minutes: i32,
) -> *mut c_char {
    clear_last_error();

    let events = match cstr_to_string(events_json) {
        Some(s) => s,
        None => {
            set_last_error("Invalid events string pointer");
            return ptr::null_mut();
        }
    };
    let settings = cstr_to_string(settings_json);

    string_result(infer_episodes_json(&events, settings.as_deref(), utc_offset_minutes))
}

/// Compute sleep debt over a list of stored episodes.
///
/// # Safety
/// - `episodes_json` must be a valid null-terminated C string (JSON array).
/// - `settings_json` may be NULL to use default settings.
/// - Returns a newly allocated string that must be freed with `sleepwave_free_string`;
///   the JSON `null` means no episodes were given.
/// - Returns NULL on error; call `sleepwave_last_error` to get the error message.
#[no_mangle]
pub unsafe extern "C" fn sleepwave_sleep_debt(
    episodes_json: *const c_char,
    settings_json: *const c_char,
    now_millis: i64,
    utc_offset_minutes: i32,
) -> *mut c_char {
    clear_last_error();

    let episodes = match cstr_to_string(episodes_json) {
        Some(s) => s,
        None => {
            set_last_error("Invalid episodes string pointer");
            return ptr::null_mut();
        }
    };
    let settings = cstr_to_string(settings_json);

    string_result(sleep_debt_json(&episodes, settings.as_deref(), now_millis, utc_offset_minutes))
}

// ============================================================================
// Stateful Tracker API
// ============================================================================

/// Opaque handle to a SleepTracker with an in-memory store
pub struct SleepTrackerHandle {
    tracker: SleepTracker<MemoryStore, Settings, FixedOffset>,
}

/// `now_millis` as an instant; zero or negative reads the system clock
fn now_or_system(now_millis: i64) -> Result<DateTime<Utc>, SleepError> {
    if now_millis > 0 {
        instant(now_millis)
    } else {
        Ok(Utc::now())
    }
}

/// Create a tracker.
///
/// # Safety
/// - `settings_json` may be NULL to use default settings.
/// - Returns a pointer that must be freed with `sleepwave_tracker_free`.
/// - Returns NULL on error; call `sleepwave_last_error` to get the error message.
#[no_mangle]
pub unsafe extern "C" fn sleepwave_tracker_new(
    settings_json: *const c_char,
    utc_offset_minutes: i32,
) -> *mut SleepTrackerHandle {
    clear_last_error();

    let settings = match cstr_to_string(settings_json) {
        Some(json) => match Settings::from_json(&json) {
            Ok(settings) => settings,
            Err(e) => {
                set_last_error(&e.to_string());
                return ptr::null_mut();
            }
        },
        None => Settings::default(),
    };
    let tz = match utc_offset(utc_offset_minutes) {
        Ok(tz) => tz,
        Err(e) => {
            set_last_error(&e.to_string());
            return ptr::null_mut();
        }
    };

    let handle = Box::new(SleepTrackerHandle {
        tracker: SleepTracker::new(MemoryStore::new(), settings, tz),
    });
    Box::into_raw(handle)
}

/// Free a tracker.
///
/// # Safety
/// - `tracker` must be a valid pointer returned by `sleepwave_tracker_new`, or NULL.
/// - After calling this function, the pointer is invalid.
#[no_mangle]
pub unsafe extern "C" fn sleepwave_tracker_free(tracker: *mut SleepTrackerHandle) {
    if !tracker.is_null() {
        drop(Box::from_raw(tracker));
    }
}

/// Analyze screen events and store new episodes. Returns the run report as JSON.
///
/// `now_millis` is the current time; pass 0 to use the system clock.
///
/// # Safety
/// - `tracker` must be a valid pointer returned by `sleepwave_tracker_new`.
/// - `events_json` must be a valid null-terminated C string.
/// - Returns a newly allocated string that must be freed with `sleepwave_free_string`.
/// - Returns NULL on error; call `sleepwave_last_error` to get the error message.
#[no_mangle]
pub unsafe extern "C" fn sleepwave_tracker_analyze(
    tracker: *mut SleepTrackerHandle,
    events_json: *const c_char,
    now_millis: i64,
) -> *mut c_char {
    clear_last_error();

    if tracker.is_null() {
        set_last_error("Null tracker pointer");
        return ptr::null_mut();
    }
    let handle = &*tracker;

    let events = match cstr_to_string(events_json) {
        Some(s) => s,
        None => {
            set_last_error("Invalid events string pointer");
            return ptr::null_mut();
        }
    };

    string_result(
        ScreenEventLog::parse(&events)
            .and_then(|log| handle.tracker.analyze_at(&log, now_or_system(now_millis)?))
            .and_then(|report| Ok(serde_json::to_string(&report)?)),
    )
}

/// Current sleep debt as JSON (`null` when nothing is stored).
///
/// `now_millis` is the current time; pass 0 to use the system clock.
///
/// # Safety
/// - `tracker` must be a valid pointer returned by `sleepwave_tracker_new`.
/// - Returns a newly allocated string that must be freed with `sleepwave_free_string`.
/// - Returns NULL on error; call `sleepwave_last_error` to get the error message.
#[no_mangle]
pub unsafe extern "C" fn sleepwave_tracker_sleep_debt(
    tracker: *mut SleepTrackerHandle,
    now_millis: i64,
) -> *mut c_char {
    clear_last_error();

    if tracker.is_null() {
        set_last_error("Null tracker pointer");
        return ptr::null_mut();
    }
    let handle = &*tracker;

    string_result(
        now_or_system(now_millis)
            .and_then(|now| handle.tracker.sleep_debt_at(now))
            .and_then(|debt| Ok(serde_json::to_string(&debt)?)),
    )
}

/// Add a manual episode. Returns the new id, or -1 on error.
///
/// `now_millis` is the current time; pass 0 to use the system clock.
///
/// # Safety
/// - `tracker` must be a valid pointer returned by `sleepwave_tracker_new`.
/// - On error, call `sleepwave_last_error` to get the user-facing message.
#[no_mangle]
pub unsafe extern "C" fn sleepwave_tracker_add_episode(
    tracker: *mut SleepTrackerHandle,
    start_millis: i64,
    end_millis: i64,
    now_millis: i64,
) -> i64 {
    clear_last_error();

    if tracker.is_null() {
        set_last_error("Null tracker pointer");
        return -1;
    }
    let handle = &*tracker;

    let result = instant(start_millis)
        .and_then(|start| Ok((start, instant(end_millis)?)))
        .and_then(|(start, end)| handle.tracker.add_episode_at(start, end, now_or_system(now_millis)?));
    match result {
        Ok(id) => id,
        Err(e) => {
            set_last_error(&e.to_string());
            -1
        }
    }
}

/// Soft-delete an episode. Returns 0 on success, non-zero on error.
///
/// # Safety
/// - `tracker` must be a valid pointer returned by `sleepwave_tracker_new`.
#[no_mangle]
pub unsafe extern "C" fn sleepwave_tracker_delete_episode(tracker: *mut SleepTrackerHandle, id: i64) -> i32 {
    clear_last_error();

    if tracker.is_null() {
        set_last_error("Null tracker pointer");
        return -1;
    }
    let handle = &*tracker;

    match handle.tracker.delete_episode(id) {
        Ok(()) => 0,
        Err(e) => {
            set_last_error(&e.to_string());
            -1
        }
    }
}

/// Save the tracker's episode store to JSON.
///
/// # Safety
/// - `tracker` must be a valid pointer returned by `sleepwave_tracker_new`.
/// - Returns a newly allocated string that must be freed with `sleepwave_free_string`.
/// - Returns NULL on error; call `sleepwave_last_error` to get the error message.
#[no_mangle]
pub unsafe extern "C" fn sleepwave_tracker_save_store(tracker: *mut SleepTrackerHandle) -> *mut c_char {
    clear_last_error();

    if tracker.is_null() {
        set_last_error("Null tracker pointer");
        return ptr::null_mut();
    }
    let handle = &*tracker;

    string_result(
        handle
            .tracker
            .with_store(|store| store.to_json())
            .and_then(|json| Ok(json?)),
    )
}

/// Load the tracker's episode store from JSON.
///
/// # Safety
/// - `tracker` must be a valid pointer returned by `sleepwave_tracker_new`.
/// - `json` must be a valid null-terminated C string.
/// - Returns 0 on success, non-zero on error.
/// - On error, call `sleepwave_last_error` to get the error message.
#[no_mangle]
pub unsafe extern "C" fn sleepwave_tracker_load_store(
    tracker: *mut SleepTrackerHandle,
    json: *const c_char,
) -> i32 {
    clear_last_error();

    if tracker.is_null() {
        set_last_error("Null tracker pointer");
        return -1;
    }
    let handle = &*tracker;

    let json_str = match cstr_to_string(json) {
        Some(s) => s,
        None => {
            set_last_error("Invalid JSON string pointer");
            return -1;
        }
    };

    let result = MemoryStore::from_json(&json_str)
        .map_err(SleepError::from)
        .and_then(|store| handle.tracker.replace_store(store));
    match result {
        Ok(_) => 0,
        Err(e) => {
            set_last_error(&e.to_string());
            -1
        }
    }
}

/// Save the tracker's settings, including the worst-debt watermark, to JSON.
///
/// # Safety
/// - `tracker` must be a valid pointer returned by `sleepwave_tracker_new`.
/// - Returns a newly allocated string that must be freed with `sleepwave_free_string`.
/// - Returns NULL on error; call `sleepwave_last_error` to get the error message.
#[no_mangle]
pub unsafe extern "C" fn sleepwave_tracker_save_settings(tracker: *mut SleepTrackerHandle) -> *mut c_char {
    clear_last_error();

    if tracker.is_null() {
        set_last_error("Null tracker pointer");
        return ptr::null_mut();
    }
    let handle = &*tracker;

    string_result(
        handle
            .tracker
            .settings()
            .and_then(|settings| Ok(settings.to_json()?)),
    )
}

/// Replace the tracker's settings from JSON.
///
/// # Safety
/// - `tracker` must be a valid pointer returned by `sleepwave_tracker_new`.
/// - `json` must be a valid null-terminated C string.
/// - Returns 0 on success, non-zero on error.
/// - On error, call `sleepwave_last_error` to get the error message.
#[no_mangle]
pub unsafe extern "C" fn sleepwave_tracker_load_settings(
    tracker: *mut SleepTrackerHandle,
    json: *const c_char,
) -> i32 {
    clear_last_error();

    if tracker.is_null() {
        set_last_error("Null tracker pointer");
        return -1;
    }
    let handle = &*tracker;

    let json_str = match cstr_to_string(json) {
        Some(s) => s,
        None => {
            set_last_error("Invalid JSON string pointer");
            return -1;
        }
    };

    match Settings::from_json(&json_str).and_then(|settings| handle.tracker.replace_settings(settings)) {
        Ok(_) => 0,
        Err(e) => {
            set_last_error(&e.to_string());
            -1
        }
    }
}

// ============================================================================
// Memory Management
// ============================================================================

/// Free a string returned by Sleepwave functions.
///
/// # Safety
/// - `ptr` must be a valid pointer returned by a Sleepwave function, or NULL.
/// - After calling this function, the pointer is invalid.
#[no_mangle]
pub unsafe extern "C" fn sleepwave_free_string(ptr: *mut c_char) {
    if !ptr.is_null() {
        drop(CString::from_raw(ptr));
    }
}

// ============================================================================
// Error Handling
// ============================================================================

/// Get the last error message.
///
/// # Safety
/// - Returns a pointer to a thread-local error string.
/// - The returned pointer is valid until the next Sleepwave function call on this thread.
/// - Do NOT free the returned pointer.
/// - Returns NULL if no error occurred.
#[no_mangle]
pub unsafe extern "C" fn sleepwave_last_error() -> *const c_char {
    LAST_ERROR.with(|e| match &*e.borrow() {
        Some(cstr) => cstr.as_ptr(),
        None => ptr::null(),
    })
}

// ============================================================================
// Version Information
// ============================================================================

/// Get the Sleepwave library version.
///
/// # Safety
/// - Returns a pointer to a static string. Do NOT free.
#[no_mangle]
pub unsafe extern "C" fn sleepwave_version() -> *const c_char {
    static VERSION: &[u8] = concat!(env!("CARGO_PKG_VERSION"), "\0").as_bytes();
    VERSION.as_ptr() as *const c_char
}
