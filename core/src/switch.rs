use std::sync::Arc;

use crate::config::SwitchConfig;
use crate::engine::{Action, CycleEngine, Decision, TickOutcome};
use crate::error::{LockError, TickError};
use crate::lock::LockCoordinator;
use crate::messages::{self, LinkAction};
use crate::notify::Notifier;
use crate::state::{Phase, SwitchState};
use crate::store::StateStore;
use crate::token::TokenAuthority;

/// One deployed switch: its configuration, signing key, state file, and lock.
#[derive(Debug, Clone)]
pub struct Switch {
    config: Arc<SwitchConfig>,
    tokens: TokenAuthority,
    store: StateStore,
    lock: LockCoordinator,
}

#[derive(Debug, Clone)]
pub struct TickReport {
    pub outcome: TickOutcome,
    pub phase: Phase,
    pub sent: Vec<Action>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Links {
    pub confirm: Option<String>,
    pub ack: Option<String>,
}

impl Switch {
    pub fn new(config: Arc<SwitchConfig>) -> Self {
        Self {
            tokens: TokenAuthority::new(config.secret.clone()),
            store: StateStore::new(config.state_path()),
            lock: LockCoordinator::new(config.lock_path()),
            config,
        }
    }

    /// Same switch with its record kept elsewhere.
    #[cfg(test)]
    pub(crate) fn with_store(mut self, store: StateStore) -> Self {
        self.store = store;
        self
    }

    pub fn config(&self) -> &SwitchConfig {
        &self.config
    }

    pub fn tokens(&self) -> &TokenAuthority {
        &self.tokens
    }

    pub fn store(&self) -> &StateStore {
        &self.store
    }

    pub fn lock(&self) -> &LockCoordinator {
        &self.lock
    }

    pub fn engine(&self) -> CycleEngine<'_> {
        CycleEngine::new(&self.config, &self.tokens)
    }

    /// One scheduled run. Every notification is delivered before the new
    /// state is written; any failure leaves the stored state untouched so
    /// the next tick retries.
    pub fn tick(&self, notifier: &dyn Notifier, now: i64) -> Result<TickReport, TickError> {
        let _guard = self.lock.acquire()?;
        let decision = self.engine().decide(self.store.load(), now);

        for action in &decision.actions {
            let message = messages::compose(action, &decision.state, &self.config);
            if let Err(err) = notifier.send(action.recipient(), &message.subject, &message.body) {
                tracing::error!(
                    kind = action.kind(),
                    recipient = action.recipient(),
                    error = %err,
                    "delivery failed; state not advanced"
                );
                return Err(err.into());
            }
        }

        self.store.save(&decision.state)?;
        Ok(TickReport {
            outcome: decision.outcome,
            phase: decision.state.phase(now, &self.config.timing),
            sent: decision.actions,
        })
    }

    /// What the next tick would do, without sending or saving anything.
    pub fn plan(&self, now: i64) -> Result<Decision, LockError> {
        let _guard = self.lock.acquire()?;
        Ok(self.engine().decide(self.store.load(), now))
    }

    /// Operator reset of the current incident. Sends nothing.
    pub fn reset(&self, now: i64) -> Result<SwitchState, TickError> {
        let _guard = self.lock.acquire()?;
        let previous = self.store.load();
        let next = self.engine().reset(previous.as_ref(), now);
        self.store.save(&next)?;
        tracing::warn!(
            escalated = previous.as_ref().is_some_and(|s| s.escalated_sent_at.is_some()),
            "switch reset by operator"
        );
        Ok(next)
    }

    /// Consistent read of the stored state.
    pub fn snapshot(&self) -> Result<Option<SwitchState>, LockError> {
        let _guard = self.lock.acquire()?;
        Ok(self.store.load())
    }

    pub fn links(&self, state: &SwitchState) -> Links {
        Links {
            confirm: state
                .confirm_token
                .as_ref()
                .map(|token| messages::link(&self.config.base_url, LinkAction::Confirm, token)),
            ack: state
                .live_ack_token()
                .map(|token| messages::link(&self.config.base_url, LinkAction::Ack, token)),
        }
    }
}
