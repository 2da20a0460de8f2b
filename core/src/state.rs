use serde::{Deserialize, Serialize};

use crate::config::{CycleTiming, MAX_WINDOW_SECS};
use crate::token::Token;

/// Current on-disk schema. Files carrying a newer tag are not trusted.
pub const STATE_VERSION: u32 = 1;

/// The single persisted record of one switch. All timestamps are unix seconds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SwitchState {
    pub version: u32,
    pub cycle_start_at: i64,
    pub next_check_at: i64,
    pub deadline_at: i64,
    /// 0 means never confirmed.
    #[serde(default)]
    pub last_confirm_at: i64,
    pub next_reminder_at: i64,
    #[serde(default)]
    pub missed_cycles: u32,
    /// The `deadline_at` already counted as missed.
    #[serde(default)]
    pub missed_cycle_deadline: Option<i64>,
    #[serde(default)]
    pub confirm_token: Option<Token>,
    #[serde(default)]
    pub escalated_sent_at: Option<i64>,
    /// Present only after an escalation with acknowledgement enabled.
    #[serde(default)]
    pub ack: Option<AckState>,
    #[serde(default)]
    pub last_tick_at: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AckState {
    /// Retired once an acknowledgement has been recorded.
    #[serde(default)]
    pub token: Option<Token>,
    #[serde(default)]
    pub ack_at: Option<i64>,
    #[serde(default)]
    pub sent_count: u32,
    #[serde(default)]
    pub next_at: Option<i64>,
}

impl SwitchState {
    /// A brand-new record whose first cycle starts at `now`.
    pub fn initial(now: i64, timing: &CycleTiming, confirm_token: Token) -> Self {
        let mut state = Self {
            version: STATE_VERSION,
            cycle_start_at: 0,
            next_check_at: 0,
            deadline_at: 0,
            last_confirm_at: 0,
            next_reminder_at: 0,
            missed_cycles: 0,
            missed_cycle_deadline: None,
            confirm_token: Some(confirm_token),
            escalated_sent_at: None,
            ack: None,
            last_tick_at: now,
        };
        state.start_cycle(now, timing);
        state
    }

    /// Anchor a fresh window at `now`. Miss counters are left to the caller.
    pub fn start_cycle(&mut self, now: i64, timing: &CycleTiming) {
        self.cycle_start_at = now;
        self.next_check_at = now + timing.check_interval_secs;
        self.deadline_at = self.next_check_at + timing.confirm_window_secs;
        self.next_reminder_at = self.next_check_at;
    }

    /// `cycle_start_at < next_check_at < deadline_at`, all positive.
    pub fn window_is_ordered(&self) -> bool {
        self.cycle_start_at > 0
            && self.next_check_at > self.cycle_start_at
            && self.deadline_at > self.next_check_at
    }

    /// Ordered, no wider than any configurable window, and not anchored
    /// beyond `now + tolerance`. Anything else is a corrupt record.
    pub fn window_is_plausible(&self, now: i64, tolerance_secs: i64) -> bool {
        self.window_is_ordered()
            && self.deadline_at - self.cycle_start_at <= MAX_WINDOW_SECS
            && self.cycle_start_at <= now.saturating_add(tolerance_secs)
    }

    /// End of the grace period after `deadline_at`.
    pub fn escalates_at(&self, timing: &CycleTiming) -> i64 {
        self.deadline_at.saturating_add(timing.escalate_grace_secs)
    }

    pub fn confirmed_this_cycle(&self) -> bool {
        self.last_confirm_at > 0 && self.last_confirm_at >= self.next_check_at
    }

    pub fn clear_incident(&mut self) {
        self.escalated_sent_at = None;
        self.ack = None;
    }

    pub fn live_ack_token(&self) -> Option<&Token> {
        self.ack.as_ref().and_then(|ack| ack.token.as_ref())
    }

    pub fn phase(&self, now: i64, timing: &CycleTiming) -> Phase {
        if self.escalated_sent_at.is_some() {
            return match &self.ack {
                Some(ack) if ack.ack_at.is_some() => Phase::Acknowledged,
                Some(_) => Phase::AckPending,
                None => Phase::Escalated,
            };
        }
        if now < self.next_check_at {
            Phase::AwaitingWindow
        } else if now < self.deadline_at {
            Phase::WindowOpen
        } else if now < self.escalates_at(timing) {
            Phase::GracePeriod
        } else {
            Phase::Missed
        }
    }
}

/// Where the current incident stands, derived from state and clock.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    AwaitingWindow,
    WindowOpen,
    GracePeriod,
    /// Past grace and not yet processed by a tick.
    Missed,
    Escalated,
    AckPending,
    Acknowledged,
}

impl Phase {
    pub fn as_str(self) -> &'static str {
        match self {
            Phase::AwaitingWindow => "awaiting_window",
            Phase::WindowOpen => "window_open",
            Phase::GracePeriod => "grace_period",
            Phase::Missed => "missed",
            Phase::Escalated => "escalated",
            Phase::AckPending => "ack_pending",
            Phase::Acknowledged => "acknowledged",
        }
    }
}
