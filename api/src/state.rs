use std::sync::Arc;

use lifeline_core::config::SwitchConfig;
use lifeline_core::gateway::ConfirmationGateway;
use lifeline_core::switch::Switch;

use crate::middleware::rate_limit::GovernorRateLimiter;
use crate::pages::PageStyle;

#[derive(Clone)]
pub struct AppState {
    /// `None` when configuration failed to load; every link then gets the
    /// neutral page.
    pub gateway: Option<Arc<ConfirmationGateway>>,
    pub page: Arc<PageStyle>,
    /// Rate-limit clients by proxy headers rather than the peer address.
    pub trust_forwarded: bool,
}

impl AppState {
    pub fn from_env() -> Self {
        match SwitchConfig::from_env() {
            Ok(config) => Self::from_config(config),
            Err(err) => {
                tracing::error!(error = %err, "invalid configuration; serving neutral pages only");
                Self::degraded()
            }
        }
    }

    pub fn from_config(config: SwitchConfig) -> Self {
        tracing::info!(config = %config.summary(), "gateway configured");
        let page = PageStyle::new(config.gateway_path());
        let limiter = Arc::new(GovernorRateLimiter::new(&config.rate_limit));
        let trust_forwarded = config.rate_limit.trust_forwarded;
        let switch = Switch::new(Arc::new(config));
        Self {
            gateway: Some(Arc::new(ConfirmationGateway::new(switch, limiter))),
            page: Arc::new(page),
            trust_forwarded,
        }
    }

    pub fn degraded() -> Self {
        Self {
            gateway: None,
            page: Arc::new(PageStyle::default()),
            trust_forwarded: false,
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use std::collections::HashMap;
    use std::path::Path;

    use lifeline_core::config::{
        BASE_URL_ENV, ESCALATION_RECIPIENTS_ENV, SECRET_ENV, SELF_RECIPIENTS_ENV, STATE_DIR_ENV,
        SwitchConfig,
    };

    pub(crate) fn test_config(state_dir: &Path) -> SwitchConfig {
        let env = HashMap::from([
            (STATE_DIR_ENV, state_dir.display().to_string()),
            (SECRET_ENV, "0123456789abcdef0123456789abcdef".to_string()),
            (BASE_URL_ENV, "https://lifeline.example/check".to_string()),
            (SELF_RECIPIENTS_ENV, "owner@example.com".to_string()),
            (ESCALATION_RECIPIENTS_ENV, "friend@example.com".to_string()),
        ]);
        SwitchConfig::from_lookup(|key| env.get(key).cloned()).expect("test config should load")
    }
}
