use chrono::DateTime;

use crate::config::SwitchConfig;
use crate::engine::Action;
use crate::state::SwitchState;
use crate::token::Token;

/// What a link asks the gateway to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkAction {
    Confirm,
    Ack,
}

impl LinkAction {
    pub fn as_str(self) -> &'static str {
        match self {
            LinkAction::Confirm => "confirm",
            LinkAction::Ack => "ack",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "confirm" => Some(LinkAction::Confirm),
            "ack" => Some(LinkAction::Ack),
            _ => None,
        }
    }
}

/// `base_url?action&id=..&sig=..`
pub fn link(base_url: &str, action: LinkAction, token: &Token) -> String {
    format!(
        "{base_url}?{}&id={}&sig={}",
        action.as_str(),
        token.id,
        token.sig
    )
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub subject: String,
    pub body: String,
}

pub fn format_timestamp(ts: i64) -> String {
    DateTime::from_timestamp(ts, 0)
        .map(|dt| dt.format("%Y-%m-%d %H:%M UTC").to_string())
        .unwrap_or_else(|| ts.to_string())
}

/// Render the message for one action against the state that will be saved.
pub fn compose(action: &Action, state: &SwitchState, config: &SwitchConfig) -> Message {
    match action {
        Action::SendReminder { .. } => reminder(state, config),
        Action::SendEscalation { .. } => escalation(state, config),
        Action::SendAckReminder { .. } => Message {
            subject: format!("Reminder: {}", config.messages.escalation_subject),
            body: escalation(state, config).body,
        },
    }
}

fn reminder(state: &SwitchState, config: &SwitchConfig) -> Message {
    let mut body = String::from("Please confirm that you are OK.\n\n");
    if let Some(token) = &state.confirm_token {
        body.push_str("Open this link and press the confirm button:\n\n");
        body.push_str(&link(&config.base_url, LinkAction::Confirm, token));
        body.push_str("\n\n");
    }
    body.push_str(&format!(
        "Deadline: {}\n",
        format_timestamp(state.deadline_at)
    ));
    if state.missed_cycles > 0 {
        body.push_str(&format!(
            "Consecutive missed check-ins so far: {} of {} allowed.\n",
            state.missed_cycles, config.timing.missed_cycles_before_fire
        ));
    }
    Message {
        subject: "Lifeline: please confirm you are OK".to_string(),
        body,
    }
}

fn escalation(state: &SwitchState, config: &SwitchConfig) -> Message {
    let mut body = config.messages.escalation_body.trim_end().to_string();
    if let Some(token) = state.live_ack_token() {
        body.push_str("\n\nPlease let us know you received this message by opening:\n\n");
        body.push_str(&link(&config.base_url, LinkAction::Ack, token));
    }
    body.push('\n');
    Message {
        subject: config.messages.escalation_subject.clone(),
        body,
    }
}
