//! Fail points and the debug request surface.
//!
//! Fail points are armed process-wide so any component can trip on them;
//! the request handler below backs `/_admin/debug/failat`.

use std::collections::HashSet;
use std::sync::OnceLock;

use parking_lot::RwLock;

use vellumdb_core::Value;

use crate::cluster::{RequestMethod, ResponseCode};

fn points() -> &'static RwLock<HashSet<String>> {
    static POINTS: OnceLock<RwLock<HashSet<String>>> = OnceLock::new();
    POINTS.get_or_init(|| RwLock::new(HashSet::new()))
}

/// Arm a fail point.
pub fn add_failure_point(name: &str) {
    points().write().insert(name.to_string());
}

/// Disarm one fail point.
pub fn remove_failure_point(name: &str) {
    points().write().remove(name);
}

/// Disarm all fail points.
pub fn clear_failure_points() {
    points().write().clear();
}

/// Returns `true` if the named fail point is armed.
#[must_use]
pub fn failure_point_active(name: &str) -> bool {
    points().read().contains(name)
}

fn not_implemented() -> (ResponseCode, Value) {
    (
        ResponseCode::NotImplemented,
        Value::object([
            ("error", Value::Bool(true)),
            ("errorMessage", Value::from("ILLEGAL /_admin/debug/failat")),
            ("code", Value::Int(i64::from(ResponseCode::NotImplemented.as_u16()))),
        ]),
    )
}

/// Handle a request below `/_admin/debug`.
///
/// `suffixes` are the path segments after `/_admin/debug`. Supported forms:
/// `DELETE failat` (clear all), `DELETE failat/<name>` (disarm one),
/// `PUT failat/<name>` (arm one). Success answers `200` with body `true`;
/// every other verb or suffix answers `501`.
#[must_use]
pub fn handle_debug_request(method: RequestMethod, suffixes: &[&str]) -> (ResponseCode, Value) {
    if suffixes.is_empty() || suffixes.len() > 2 || suffixes[0] != "failat" {
        return not_implemented();
    }

    match method {
        RequestMethod::Delete => {
            if suffixes.len() == 1 {
                clear_failure_points();
            } else {
                remove_failure_point(suffixes[1]);
            }
        }
        RequestMethod::Put => {
            if suffixes.len() == 2 {
                add_failure_point(suffixes[1]);
            } else {
                return not_implemented();
            }
        }
        _ => return not_implemented(),
    }

    (ResponseCode::Ok, Value::Bool(true))
}
