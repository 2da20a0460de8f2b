use serde_json::json;

use lifeline_core::switch::Switch;

use crate::util::print_json;

/// Configuration already parsed by the time this runs; report it redacted
/// along with whether the state lock can be opened. Exits 1 when it cannot.
pub fn run(switch: &Switch) -> i32 {
    let (lock, usable) = match switch.lock().try_acquire() {
        Ok(Some(_)) => (json!("ok"), true),
        Ok(None) => (json!("held by another process"), true),
        Err(err) => (json!(format!("unavailable: {err}")), false),
    };
    let state = if switch.store().load().is_some() {
        "present"
    } else {
        "absent"
    };
    let code = print_json(&json!({
        "valid": true,
        "config": switch.config().summary(),
        "lock": lock,
        "state": state,
    }));
    if usable { code } else { 1 }
}
