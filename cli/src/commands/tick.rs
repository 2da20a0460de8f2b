use serde_json::{Value, json};

use lifeline_core::engine::{Action, TickOutcome};
use lifeline_core::error::codes;
use lifeline_core::messages;
use lifeline_core::notify::{LogNotifier, Notifier, SendmailNotifier};
use lifeline_core::state::Phase;
use lifeline_core::switch::Switch;

use crate::util::{print_json, report_error};

/// One scheduled run. Exits non-zero when anything kept the state from
/// advancing, so the scheduler's own alerting sees it.
pub fn run(switch: &Switch, dry_run: bool, now: i64) -> i32 {
    if dry_run {
        return plan(switch, now);
    }

    let notifier = SendmailNotifier::new(switch.config().mail.clone());
    match switch.tick(&notifier, now) {
        Ok(report) => print_json(&summary(false, report.outcome, report.phase, &report.sent)),
        Err(err) => {
            tracing::error!(code = err.code(), error = %err, "tick failed");
            report_error(err.code(), &err.to_string())
        }
    }
}

/// Decide without delivering or saving; messages go to the log.
fn plan(switch: &Switch, now: i64) -> i32 {
    let decision = match switch.plan(now) {
        Ok(decision) => decision,
        Err(err) => return report_error(codes::LOCK_UNAVAILABLE, &err.to_string()),
    };
    for action in &decision.actions {
        let message = messages::compose(action, &decision.state, switch.config());
        if let Err(err) = LogNotifier.send(action.recipient(), &message.subject, &message.body) {
            return report_error(codes::DELIVERY_FAILED, &err.to_string());
        }
    }
    let phase = decision.state.phase(now, &switch.config().timing);
    print_json(&summary(true, decision.outcome, phase, &decision.actions))
}

fn summary(dry_run: bool, outcome: TickOutcome, phase: Phase, actions: &[Action]) -> Value {
    json!({
        "dry_run": dry_run,
        "outcome": outcome.as_str(),
        "phase": phase.as_str(),
        "sent": actions
            .iter()
            .map(|action| json!({
                "kind": action.kind(),
                "recipient": action.recipient(),
            }))
            .collect::<Vec<_>>(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::testing::{T0, switch_in};

    #[test]
    fn dry_run_leaves_no_state_behind() {
        let dir = tempfile::tempdir().expect("tempdir");
        let switch = switch_in(dir.path());
        assert_eq!(run(&switch, true, T0), 0);
        assert!(switch.store().load().is_none());
    }

    #[test]
    fn failed_delivery_exits_non_zero_without_advancing() {
        let dir = tempfile::tempdir().expect("tempdir");
        let switch = switch_in(dir.path());
        assert_eq!(run(&switch, false, T0), 0);
        let before = switch.store().load().expect("state");

        assert_eq!(run(&switch, false, T0 + 305), 1);
        assert_eq!(switch.store().load(), Some(before));
    }

    #[test]
    fn summary_lists_each_send() {
        let value = summary(
            false,
            TickOutcome::Evaluated,
            Phase::WindowOpen,
            &[Action::SendReminder {
                recipient: "owner@example.com".to_string(),
            }],
        );
        assert_eq!(value["outcome"], "evaluated");
        assert_eq!(value["phase"], "window_open");
        assert_eq!(value["sent"][0]["kind"], "reminder");
        assert_eq!(value["sent"][0]["recipient"], "owner@example.com");
    }
}
