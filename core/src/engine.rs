//! Cycle state machine.
//!
//! [`CycleEngine::decide`] is called once per tick with the loaded state and
//! returns the next state plus the notifications that must be delivered
//! before that state may be persisted. The confirm and ack transitions are
//! driven by the gateway. None of these functions touch the filesystem.

use crate::config::SwitchConfig;
use crate::state::{AckState, SwitchState};
use crate::token::{Token, TokenAuthority};

/// A tick seeing a clock this far behind `last_tick_at` does nothing.
pub const CLOCK_SKEW_TOLERANCE_SECS: i64 = 60;

/// One notification to one recipient.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    SendReminder { recipient: String },
    SendEscalation { recipient: String },
    SendAckReminder { recipient: String },
}

impl Action {
    pub fn recipient(&self) -> &str {
        match self {
            Action::SendReminder { recipient }
            | Action::SendEscalation { recipient }
            | Action::SendAckReminder { recipient } => recipient,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Action::SendReminder { .. } => "reminder",
            Action::SendEscalation { .. } => "escalation",
            Action::SendAckReminder { .. } => "ack_reminder",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    Initialised,
    /// Clock went backwards; only `last_tick_at` moved.
    ClockSkew,
    Recovered,
    Evaluated,
}

impl TickOutcome {
    pub fn as_str(self) -> &'static str {
        match self {
            TickOutcome::Initialised => "initialised",
            TickOutcome::ClockSkew => "clock_skew",
            TickOutcome::Recovered => "recovered",
            TickOutcome::Evaluated => "evaluated",
        }
    }
}

#[derive(Debug, Clone)]
pub struct Decision {
    pub state: SwitchState,
    pub actions: Vec<Action>,
    pub outcome: TickOutcome,
}

/// Why a gateway transition was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum Rejection {
    #[error("presented token is not the live token")]
    NotCurrent,
    #[error("escalation already sent for this incident")]
    AlreadyEscalated,
}

pub struct CycleEngine<'a> {
    config: &'a SwitchConfig,
    tokens: &'a TokenAuthority,
}

impl<'a> CycleEngine<'a> {
    pub fn new(config: &'a SwitchConfig, tokens: &'a TokenAuthority) -> Self {
        Self { config, tokens }
    }

    pub fn decide(&self, state: Option<SwitchState>, now: i64) -> Decision {
        let Some(mut state) = state else {
            tracing::info!(now, "initialising switch state");
            return Decision {
                state: SwitchState::initial(now, &self.config.timing, self.tokens.issue()),
                actions: Vec::new(),
                outcome: TickOutcome::Initialised,
            };
        };

        if now < state.last_tick_at.saturating_sub(CLOCK_SKEW_TOLERANCE_SECS) {
            tracing::warn!(
                now,
                last_tick_at = state.last_tick_at,
                "clock moved backwards; skipping evaluation"
            );
            state.last_tick_at = now;
            return Decision {
                state,
                actions: Vec::new(),
                outcome: TickOutcome::ClockSkew,
            };
        }
        state.last_tick_at = now;

        let confirm_ok = state
            .confirm_token
            .as_ref()
            .is_some_and(|token| self.tokens.verify_token(token));
        if !confirm_ok {
            tracing::info!("confirm token missing or unverifiable; reissuing");
            state.confirm_token = Some(self.tokens.issue());
        }

        if !state.window_is_plausible(now, CLOCK_SKEW_TOLERANCE_SECS) {
            tracing::warn!(
                cycle_start_at = state.cycle_start_at,
                next_check_at = state.next_check_at,
                deadline_at = state.deadline_at,
                "cycle window inconsistent; starting a fresh cycle"
            );
            state.start_cycle(now, &self.config.timing);
            state.missed_cycles = 0;
            state.missed_cycle_deadline = None;
            state.clear_incident();
            return Decision {
                state,
                actions: Vec::new(),
                outcome: TickOutcome::Recovered,
            };
        }

        let mut actions = Vec::new();
        self.reminder_phase(&mut state, now, &mut actions);
        self.escalation_phase(&mut state, now, &mut actions);
        self.reconcile_ack_state(&mut state, now);
        self.ack_phase(&mut state, now, &mut actions);

        Decision {
            state,
            actions,
            outcome: TickOutcome::Evaluated,
        }
    }

    fn reminder_phase(&self, state: &mut SwitchState, now: i64, actions: &mut Vec<Action>) {
        if now < state.next_check_at || now >= state.deadline_at {
            return;
        }
        let due = state.next_reminder_at.max(state.next_check_at);
        if now < due {
            return;
        }
        actions.extend(
            self.config
                .self_recipients
                .iter()
                .map(|recipient| Action::SendReminder {
                    recipient: recipient.clone(),
                }),
        );
        state.next_reminder_at = now + self.config.timing.remind_every_secs;
    }

    fn escalation_phase(&self, state: &mut SwitchState, now: i64, actions: &mut Vec<Action>) {
        let timing = &self.config.timing;
        if now < state.escalates_at(timing) {
            return;
        }
        if state.escalated_sent_at.is_some() {
            return;
        }
        if state.confirmed_this_cycle() {
            // A confirmed window that has run out simply rolls over.
            state.start_cycle(now, timing);
            state.missed_cycles = 0;
            state.missed_cycle_deadline = None;
            return;
        }

        if state.missed_cycle_deadline != Some(state.deadline_at) {
            state.missed_cycles += 1;
            state.missed_cycle_deadline = Some(state.deadline_at);
            tracing::warn!(
                missed_cycles = state.missed_cycles,
                deadline_at = state.deadline_at,
                "check-in missed"
            );
        }

        if state.missed_cycles >= timing.missed_cycles_before_fire {
            state.ack = self.config.ack.enabled.then(|| self.fresh_ack_state(now));
            actions.extend(
                self.config
                    .escalation_recipients
                    .iter()
                    .map(|recipient| Action::SendEscalation {
                        recipient: recipient.clone(),
                    }),
            );
            state.escalated_sent_at = Some(now);
            tracing::error!(
                missed_cycles = state.missed_cycles,
                recipients = self.config.escalation_recipients.len(),
                "escalating"
            );
        } else {
            state.start_cycle(now, timing);
            state.missed_cycle_deadline = None;
            tracing::info!(
                missed_cycles = state.missed_cycles,
                next_check_at = state.next_check_at,
                "starting a new cycle after a miss"
            );
        }
    }

    /// Keep the ack sub-state present exactly when escalated with ack enabled.
    fn reconcile_ack_state(&self, state: &mut SwitchState, now: i64) {
        if state.escalated_sent_at.is_none() || !self.config.ack.enabled {
            state.ack = None;
            return;
        }
        if let Some(ack) = state.ack.as_mut() {
            let usable = ack
                .token
                .as_ref()
                .is_some_and(|token| self.tokens.verify_token(token));
            if ack.ack_at.is_none() && !usable {
                tracing::info!("ack token missing or unverifiable; reissuing");
                ack.token = Some(self.tokens.issue());
            }
        } else {
            let mut ack = self.fresh_ack_state(now);
            // The escalation went out without a link; remind right away.
            if ack.next_at.is_some() {
                ack.next_at = Some(now);
            }
            state.ack = Some(ack);
        }
    }

    fn ack_phase(&self, state: &mut SwitchState, now: i64, actions: &mut Vec<Action>) {
        let policy = &self.config.ack;
        let Some(ack) = state.ack.as_mut() else {
            return;
        };
        if ack.ack_at.is_some() {
            return;
        }

        if ack.sent_count >= policy.max_reminds {
            if ack.next_at.take().is_some() {
                tracing::info!(sent = ack.sent_count, "ack reminders exhausted");
            }
            return;
        }

        let Some(next_at) = ack.next_at else {
            return;
        };
        if now < next_at {
            return;
        }
        actions.extend(
            self.config
                .escalation_recipients
                .iter()
                .map(|recipient| Action::SendAckReminder {
                    recipient: recipient.clone(),
                }),
        );
        ack.sent_count += 1;
        ack.next_at = if ack.sent_count >= policy.max_reminds {
            tracing::info!(sent = ack.sent_count, "ack reminders exhausted");
            None
        } else {
            Some(now + policy.effective_remind_every())
        };
    }

    fn fresh_ack_state(&self, now: i64) -> AckState {
        let policy = &self.config.ack;
        AckState {
            token: Some(self.tokens.issue()),
            ack_at: None,
            sent_count: 0,
            next_at: (policy.max_reminds > 0).then(|| now + policy.effective_remind_every()),
        }
    }

    /// The owner proved they are alive. Fresh cycle, fresh token.
    pub fn apply_confirm(
        &self,
        state: &SwitchState,
        id: &str,
        sig: &str,
        now: i64,
    ) -> Result<SwitchState, Rejection> {
        let current = state
            .confirm_token
            .as_ref()
            .is_some_and(|token| token.matches(id, sig));
        if !current {
            return Err(Rejection::NotCurrent);
        }
        if state.escalated_sent_at.is_some() {
            return Err(Rejection::AlreadyEscalated);
        }

        let mut next = state.clone();
        next.last_confirm_at = now;
        next.missed_cycles = 0;
        next.missed_cycle_deadline = None;
        next.clear_incident();
        next.start_cycle(now, &self.config.timing);
        next.confirm_token = Some(self.fresh_token_unlike(state.confirm_token.as_ref()));
        Ok(next)
    }

    /// A contact acknowledged the escalation. The ack token is retired.
    pub fn apply_ack(
        &self,
        state: &SwitchState,
        id: &str,
        sig: &str,
        now: i64,
    ) -> Result<SwitchState, Rejection> {
        let current = state
            .live_ack_token()
            .is_some_and(|token| token.matches(id, sig));
        if !current {
            return Err(Rejection::NotCurrent);
        }

        let mut next = state.clone();
        if let Some(ack) = next.ack.as_mut() {
            ack.ack_at = Some(now);
            ack.next_at = None;
            ack.token = None;
        }
        Ok(next)
    }

    /// Out-of-band reset: clears misses and any incident, new cycle from `now`.
    pub fn reset(&self, state: Option<&SwitchState>, now: i64) -> SwitchState {
        let mut next = SwitchState::initial(
            now,
            &self.config.timing,
            self.fresh_token_unlike(state.and_then(|s| s.confirm_token.as_ref())),
        );
        if let Some(previous) = state {
            next.last_confirm_at = previous.last_confirm_at;
        }
        next
    }

    fn fresh_token_unlike(&self, previous: Option<&Token>) -> Token {
        loop {
            let token = self.tokens.issue();
            if previous.is_none_or(|old| old.id != token.id) {
                return token;
            }
        }
    }
}
