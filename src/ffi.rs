//! FFI bindings for MindPause
//!
//! C-compatible functions so a mobile host can run the escalation gate and
//! lock-payload coercion on device. All functions take null-terminated C
//! strings and return allocated memory that must be freed by the caller using
//! `mp_free_string`.

use std::cell::RefCell;
use std::ffi::{CStr, CString};
use std::os::raw::c_char;
use std::ptr;

use serde_json::Value;

use crate::escalation::{evaluate, EscalationState};
use crate::presentation::RiskBreakdown;
use crate::realtime::{LockCommand, LockSource, PushEvent};
use crate::types::DailySnapshot;

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

unsafe fn parse_snapshot(json: *const c_char) -> Option<DailySnapshot> {
    let Some(json_str) = cstr_to_string(json) else {
        set_last_error("Invalid JSON string pointer");
        return None;
    };
    match serde_json::from_str(&json_str) {
        Ok(snapshot) => Some(snapshot),
        Err(e) => {
            set_last_error(&format!("Invalid snapshot: {e}"));
            None
        }
    }
}

fn to_json_cstr<T: serde::Serialize>(value: &T) -> *mut c_char {
    match serde_json::to_string(value) {
        Ok(json) => string_to_cstr(&json),
        Err(e) => {
            set_last_error(&e.to_string());
            ptr::null_mut()
        }
    }
}

// ============================================================================
// Stateless API
// ============================================================================

/// Evaluate a daily snapshot and return `{level, title, body}` as JSON.
///
/// # Safety
/// - `snapshot_json` must be a valid null-terminated C string.
/// - Returns a newly allocated string that must be freed with `mp_free_string`.
/// - Returns NULL on error; call `mp_last_error` to get the error message.
#[no_mangle]
pub unsafe extern "C" fn mp_evaluate_snapshot(snapshot_json: *const c_char) -> *mut c_char {
    clear_last_error();

    match parse_snapshot(snapshot_json) {
        Some(snapshot) => to_json_cstr(&evaluate(&snapshot)),
        None => ptr::null_mut(),
    }
}

/// Chart figures for a daily snapshot as JSON.
///
/// # Safety
/// - `snapshot_json` must be a valid null-terminated C string.
/// - Returns a newly allocated string that must be freed with `mp_free_string`.
/// - Returns NULL on error; call `mp_last_error` to get the error message.
#[no_mangle]
pub unsafe extern "C" fn mp_risk_breakdown(snapshot_json: *const c_char) -> *mut c_char {
    clear_last_error();

    match parse_snapshot(snapshot_json) {
        Some(snapshot) => to_json_cstr(&RiskBreakdown::from_snapshot(&snapshot)),
        None => ptr::null_mut(),
    }
}

/// Coerce a `{locked: ...}` payload.
///
/// Returns 1 for locked, 0 for unlocked, -1 when the payload is not a lock
/// command (missing or invalid `locked`, bad JSON, NULL pointer).
///
/// # Safety
/// - `payload_json` must be a valid null-terminated C string or NULL.
#[no_mangle]
pub unsafe extern "C" fn mp_coerce_lock_payload(payload_json: *const c_char) -> i32 {
    clear_last_error();

    let Some(payload) = parse_value(payload_json) else {
        return -1;
    };
    lock_result(LockCommand::from_payload(&payload, LockSource::Host))
}

/// Coerce a push-notification data payload `{cmd: "lock_device", locked}`.
///
/// Same return values as `mp_coerce_lock_payload`; payloads with any other
/// `cmd` return -1.
///
/// # Safety
/// - `data_json` must be a valid null-terminated C string or NULL.
#[no_mangle]
pub unsafe extern "C" fn mp_lock_from_push_data(data_json: *const c_char) -> i32 {
    clear_last_error();

    let Some(data) = parse_value(data_json) else {
        return -1;
    };
    lock_result(PushEvent::Received(data).lock_command())
}

unsafe fn parse_value(json: *const c_char) -> Option<Value> {
    let Some(json_str) = cstr_to_string(json) else {
        set_last_error("Invalid JSON string pointer");
        return None;
    };
    match serde_json::from_str(&json_str) {
        Ok(value) => Some(value),
        Err(e) => {
            set_last_error(&e.to_string());
            None
        }
    }
}

fn lock_result(command: Option<LockCommand>) -> i32 {
    match command {
        Some(command) if command.locked => 1,
        Some(_) => 0,
        None => -1,
    }
}

// ============================================================================
// Stateful Escalation Gate API
// ============================================================================

/// Opaque handle to an escalation gate
pub struct EscalationHandle {
    state: EscalationState,
}

/// Create a new escalation gate.
///
/// # Safety
/// - Returns a pointer that must be freed with `mp_escalation_free`.
#[no_mangle]
pub unsafe extern "C" fn mp_escalation_new() -> *mut EscalationHandle {
    clear_last_error();
    Box::into_raw(Box::new(EscalationHandle {
        state: EscalationState::new(),
    }))
}

/// Free an escalation gate.
///
/// # Safety
/// - `handle` must be a pointer returned by `mp_escalation_new`, or NULL.
/// - After calling this function, the pointer is invalid.
#[no_mangle]
pub unsafe extern "C" fn mp_escalation_free(handle: *mut EscalationHandle) {
    if !handle.is_null() {
        drop(Box::from_raw(handle));
    }
}

/// Evaluate a snapshot against the gate.
///
/// Returns `{"notify": bool, "escalation": {level, title, body}}`. When
/// `notify` is true the gate has already recorded the new level.
///
/// # Safety
/// - `handle` must be a valid pointer returned by `mp_escalation_new`.
/// - `snapshot_json` must be a valid null-terminated C string.
/// - Returns a newly allocated string that must be freed with `mp_free_string`.
/// - Returns NULL on error; call `mp_last_error` to get the error message.
#[no_mangle]
pub unsafe extern "C" fn mp_escalation_observe(
    handle: *mut EscalationHandle,
    snapshot_json: *const c_char,
) -> *mut c_char {
    clear_last_error();

    if handle.is_null() {
        set_last_error("Null escalation handle");
        return ptr::null_mut();
    }
    let handle = &mut *handle;

    let Some(snapshot) = parse_snapshot(snapshot_json) else {
        return ptr::null_mut();
    };

    let escalation = evaluate(&snapshot);
    let notify = handle.state.observe(&snapshot.record_date, &escalation);

    to_json_cstr(&serde_json::json!({
        "notify": notify,
        "escalation": escalation,
    }))
}

/// Save the gate state to JSON.
///
/// # Safety
/// - `handle` must be a valid pointer returned by `mp_escalation_new`.
/// - Returns a newly allocated string that must be freed with `mp_free_string`.
#[no_mangle]
pub unsafe extern "C" fn mp_escalation_save(handle: *mut EscalationHandle) -> *mut c_char {
    clear_last_error();

    if handle.is_null() {
        set_last_error("Null escalation handle");
        return ptr::null_mut();
    }
    to_json_cstr(&(*handle).state)
}

/// Load gate state from JSON.
///
/// # Safety
/// - `handle` must be a valid pointer returned by `mp_escalation_new`.
/// - `json` must be a valid null-terminated C string.
/// - Returns 0 on success, -1 on error (see `mp_last_error`).
#[no_mangle]
pub unsafe extern "C" fn mp_escalation_load(
    handle: *mut EscalationHandle,
    json: *const c_char,
) -> i32 {
    clear_last_error();

    if handle.is_null() {
        set_last_error("Null escalation handle");
        return -1;
    }
    let Some(json_str) = cstr_to_string(json) else {
        set_last_error("Invalid JSON string pointer");
        return -1;
    };

    match serde_json::from_str::<EscalationState>(&json_str) {
        Ok(state) => {
            (*handle).state = state;
            0
        }
        Err(e) => {
            set_last_error(&e.to_string());
            -1
        }
    }
}

// ============================================================================
// Memory Management
// ============================================================================

/// Free a string returned by MindPause functions.
///
/// # Safety
/// - `ptr` must be a valid pointer returned by a MindPause function, or NULL.
/// - After calling this function, the pointer is invalid.
#[no_mangle]
pub unsafe extern "C" fn mp_free_string(ptr: *mut c_char) {
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
/// - The returned pointer is valid until the next MindPause call on this thread.
/// - Do NOT free the returned pointer.
/// - Returns NULL if no error occurred.
#[no_mangle]
pub unsafe extern "C" fn mp_last_error() -> *const c_char {
    LAST_ERROR.with(|e| match &*e.borrow() {
        Some(cstr) => cstr.as_ptr(),
        None => ptr::null(),
    })
}

/// Get the library version.
///
/// # Safety
/// - Returns a pointer to a static string. Do NOT free.
#[no_mangle]
pub unsafe extern "C" fn mp_version() -> *const c_char {
    static VERSION: &[u8] = concat!(env!("CARGO_PKG_VERSION"), "\0").as_bytes();
    VERSION.as_ptr() as *const c_char
}
