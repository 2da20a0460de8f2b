use serde_json::{Value, json};

use lifeline_core::config::SwitchConfig;
use lifeline_core::error::codes;
use lifeline_core::state::SwitchState;
use lifeline_core::switch::Switch;

use crate::util::{optional_timestamp, print_json, report_error, timestamp};

pub fn run(switch: &Switch, now: i64) -> i32 {
    match switch.snapshot() {
        Ok(Some(state)) => print_json(&describe(&state, switch.config(), now)),
        Ok(None) => report_error(
            codes::NOT_INITIALISED,
            "no switch state yet; run `lifeline tick` first",
        ),
        Err(err) => report_error(codes::LOCK_UNAVAILABLE, &err.to_string()),
    }
}

/// Operator view of the state. Never includes token material.
pub fn describe(state: &SwitchState, config: &SwitchConfig, now: i64) -> Value {
    let ack = state.ack.as_ref().map(|ack| {
        json!({
            "sent_count": ack.sent_count,
            "max_reminds": config.ack.max_reminds,
            "acknowledged_at": optional_timestamp(ack.ack_at),
            "next_reminder_at": optional_timestamp(ack.next_at),
        })
    });
    json!({
        "phase": state.phase(now, &config.timing).as_str(),
        "cycle_start_at": timestamp(state.cycle_start_at),
        "next_check_at": timestamp(state.next_check_at),
        "deadline_at": timestamp(state.deadline_at),
        "escalates_after": timestamp(state.escalates_at(&config.timing)),
        "next_reminder_at": timestamp(state.next_reminder_at),
        "last_confirm_at": timestamp(state.last_confirm_at),
        "missed_cycles": state.missed_cycles,
        "missed_cycles_before_fire": config.timing.missed_cycles_before_fire,
        "escalated_at": optional_timestamp(state.escalated_sent_at),
        "ack": ack,
        "last_tick_at": timestamp(state.last_tick_at),
    })
}

#[cfg(test)]
mod tests {
    use lifeline_core::notify::LogNotifier;

    use super::*;
    use crate::commands::testing::{T0, switch_in};

    #[test]
    fn describe_reports_phase_without_tokens() {
        let dir = tempfile::tempdir().expect("tempdir");
        let switch = switch_in(dir.path());
        switch.tick(&LogNotifier, T0).expect("tick");
        let state = switch.store().load().expect("state");
        let token = state.confirm_token.clone().expect("token");

        let value = describe(&state, switch.config(), T0 + 310);
        assert_eq!(value["phase"], "window_open");
        assert_eq!(value["last_confirm_at"], Value::Null);
        assert_eq!(value["ack"], Value::Null);
        let rendered = value.to_string();
        assert!(!rendered.contains(&token.id));
        assert!(!rendered.contains(&token.sig));
    }

    #[test]
    fn escalated_state_shows_ack_progress() {
        let dir = tempfile::tempdir().expect("tempdir");
        let switch = switch_in(dir.path());
        switch.tick(&LogNotifier, T0).expect("init");
        switch.tick(&LogNotifier, T0 + 610).expect("escalate");
        let state = switch.store().load().expect("state");

        let value = describe(&state, switch.config(), T0 + 620);
        assert_eq!(value["phase"], "ack_pending");
        assert_eq!(value["missed_cycles"], 1);
        assert_eq!(value["ack"]["sent_count"], 0);
    }

    #[test]
    fn missing_state_is_an_error() {
        let dir = tempfile::tempdir().expect("tempdir");
        assert_eq!(run(&switch_in(dir.path()), T0), 1);
    }
}
