use serde_json::json;

use lifeline_core::error::codes;
use lifeline_core::switch::Switch;

use crate::util::{print_json, report_error};

/// Current confirm link (and ack link while one is live), so the owner can
/// check in without waiting for mail.
pub fn run(switch: &Switch) -> i32 {
    match switch.snapshot() {
        Ok(Some(state)) => {
            let links = switch.links(&state);
            print_json(&json!({
                "confirm": links.confirm,
                "ack": links.ack,
            }))
        }
        Ok(None) => report_error(
            codes::NOT_INITIALISED,
            "no switch state yet; run `lifeline tick` first",
        ),
        Err(err) => report_error(codes::LOCK_UNAVAILABLE, &err.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use lifeline_core::notify::LogNotifier;

    use super::*;
    use crate::commands::testing::{T0, switch_in};

    #[test]
    fn links_need_initialised_state() {
        let dir = tempfile::tempdir().expect("tempdir");
        let switch = switch_in(dir.path());
        assert_eq!(run(&switch), 1);

        switch.tick(&LogNotifier, T0).expect("tick");
        assert_eq!(run(&switch), 0);
    }
}
