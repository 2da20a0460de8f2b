//! Authenticated handling of confirm and ack links.
//!
//! Each stage returns `Err(response)` to stop with that response or `Ok` to
//! continue. Anything that goes wrong before a *current* token has been
//! presented ends in the neutral response, so outsiders learn nothing about the
//! switch.

use std::sync::Arc;

use crate::engine::Rejection;
use crate::lock::LockGuard;
use crate::messages::LinkAction;
use crate::ratelimit::RateLimiter;
use crate::state::SwitchState;
use crate::switch::Switch;
use crate::token::log_prefix;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Head,
    Post,
    Other,
}

#[derive(Debug, Clone)]
pub struct GatewayRequest<'a> {
    pub action: Option<LinkAction>,
    pub id: &'a str,
    pub sig: &'a str,
    pub method: Method,
    /// Rate-limit identity, usually the client IP.
    pub client: &'a str,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GatewayResponse {
    /// Says nothing about whether the link meant anything.
    Neutral,
    /// Generic "link not valid", only when stealth is switched off.
    Invalid,
    /// Ask the holder to press the button (mail scanners only fetch).
    Prompt {
        action: LinkAction,
        id: String,
        sig: String,
    },
    Confirmed {
        next_check_at: i64,
        deadline_at: i64,
    },
    Acknowledged,
    /// Current confirm token, but the incident has already escalated.
    AlreadyEscalated,
    /// Unexpected failure after a current token was shown.
    Failure {
        code: String,
    },
}

type Stage<T> = Result<T, GatewayResponse>;

pub struct ConfirmationGateway {
    switch: Switch,
    limiter: Arc<dyn RateLimiter>,
}

impl ConfirmationGateway {
    pub fn new(switch: Switch, limiter: Arc<dyn RateLimiter>) -> Self {
        Self { switch, limiter }
    }

    pub fn switch(&self) -> &Switch {
        &self.switch
    }

    pub fn handle(&self, request: &GatewayRequest<'_>, now: i64) -> GatewayResponse {
        match self.run(request, now) {
            Ok(response) | Err(response) => response,
        }
    }

    fn run(&self, request: &GatewayRequest<'_>, now: i64) -> Stage<GatewayResponse> {
        self.admit(request, now)?;
        let action = self.authenticate(request)?;
        let _guard = self.lock()?;
        let state = self.load()?;
        self.require_current(action, &state, request)?;

        match request.method {
            Method::Get | Method::Head => Ok(GatewayResponse::Prompt {
                action,
                id: request.id.to_string(),
                sig: request.sig.to_string(),
            }),
            Method::Post => self.apply(action, &state, request, now),
            Method::Other => Err(GatewayResponse::Neutral),
        }
    }

    fn admit(&self, request: &GatewayRequest<'_>, now: i64) -> Stage<()> {
        if self.limiter.allow(request.client, now) {
            Ok(())
        } else {
            tracing::warn!(client = request.client, "gateway request rate limited");
            Err(GatewayResponse::Neutral)
        }
    }

    fn authenticate(&self, request: &GatewayRequest<'_>) -> Stage<LinkAction> {
        let Some(action) = request.action else {
            tracing::debug!(client = request.client, "gateway request without action");
            return Err(GatewayResponse::Neutral);
        };
        if !self.switch.tokens().verify(request.id, request.sig) {
            tracing::warn!(
                client = request.client,
                action = action.as_str(),
                "invalid token presented"
            );
            return Err(self.rejected());
        }
        Ok(action)
    }

    fn lock(&self) -> Stage<LockGuard> {
        self.switch.lock().acquire().map_err(|err| {
            tracing::error!(error = %err, "gateway could not take the state lock");
            GatewayResponse::Neutral
        })
    }

    fn load(&self) -> Stage<SwitchState> {
        self.switch.store().load().ok_or_else(|| {
            tracing::warn!("gateway request with no usable switch state");
            GatewayResponse::Neutral
        })
    }

    fn require_current(
        &self,
        action: LinkAction,
        state: &SwitchState,
        request: &GatewayRequest<'_>,
    ) -> Stage<()> {
        let live = match action {
            LinkAction::Confirm => state.confirm_token.as_ref(),
            LinkAction::Ack => state.live_ack_token(),
        };
        if live.is_some_and(|token| token.matches(request.id, request.sig)) {
            return Ok(());
        }
        tracing::info!(
            client = request.client,
            action = action.as_str(),
            token = log_prefix(request.id),
            "stale token presented"
        );
        Err(self.rejected())
    }

    fn apply(
        &self,
        action: LinkAction,
        state: &SwitchState,
        request: &GatewayRequest<'_>,
        now: i64,
    ) -> Stage<GatewayResponse> {
        let engine = self.switch.engine();
        let transition = match action {
            LinkAction::Confirm => engine.apply_confirm(state, request.id, request.sig, now),
            LinkAction::Ack => engine.apply_ack(state, request.id, request.sig, now),
        };
        let next = match transition {
            Ok(next) => next,
            Err(Rejection::AlreadyEscalated) => {
                tracing::warn!("confirmation arrived after escalation");
                return Ok(GatewayResponse::AlreadyEscalated);
            }
            Err(Rejection::NotCurrent) => return Err(self.rejected()),
        };

        if let Err(err) = self.switch.store().save(&next) {
            let code = uuid::Uuid::now_v7().simple().to_string();
            tracing::error!(
                code = %code,
                error = %err,
                action = action.as_str(),
                "failed to persist transition"
            );
            return Err(GatewayResponse::Failure { code });
        }

        match action {
            LinkAction::Confirm => {
                tracing::info!(next_check_at = next.next_check_at, "check-in confirmed");
                Ok(GatewayResponse::Confirmed {
                    next_check_at: next.next_check_at,
                    deadline_at: next.deadline_at,
                })
            }
            LinkAction::Ack => {
                tracing::info!("escalation acknowledged");
                Ok(GatewayResponse::Acknowledged)
            }
        }
    }

    fn rejected(&self) -> GatewayResponse {
        if self.switch.config().stealth {
            GatewayResponse::Neutral
        } else {
            GatewayResponse::Invalid
        }
    }
}
