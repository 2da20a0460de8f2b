use lifeline_core::error::codes;
use lifeline_core::switch::Switch;

use crate::commands::status;
use crate::util::{print_json, report_error};

pub fn run(switch: &Switch, yes: bool, now: i64) -> i32 {
    if !yes {
        return report_error(
            codes::CONFIRMATION_REQUIRED,
            "reset clears missed cycles and any escalation; re-run with --yes",
        );
    }
    match switch.reset(now) {
        Ok(state) => print_json(&status::describe(&state, switch.config(), now)),
        Err(err) => report_error(err.code(), &err.to_string()),
    }
}
