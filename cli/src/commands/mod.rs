pub mod check_config;
pub mod links;
pub mod reset;
pub mod status;
pub mod tick;

#[cfg(test)]
pub(crate) mod testing {
    use std::collections::HashMap;
    use std::path::Path;
    use std::sync::Arc;

    use lifeline_core::config::{
        BASE_URL_ENV, CHECK_INTERVAL_ENV, CONFIRM_WINDOW_ENV, ESCALATE_GRACE_ENV,
        ESCALATION_RECIPIENTS_ENV, REMIND_EVERY_ENV, SECRET_ENV, SELF_RECIPIENTS_ENV, SENDMAIL_ENV,
        STATE_DIR_ENV, SwitchConfig,
    };
    use lifeline_core::switch::Switch;

    pub(crate) const T0: i64 = 1_700_000_000;

    /// 300s interval, 240s window, 60s grace and reminder spacing. Mail
    /// delivery always fails.
    pub(crate) fn switch_in(state_dir: &Path) -> Switch {
        let env = HashMap::from([
            (STATE_DIR_ENV, state_dir.display().to_string()),
            (SECRET_ENV, "0123456789abcdef0123456789abcdef".to_string()),
            (BASE_URL_ENV, "https://lifeline.example/check".to_string()),
            (SELF_RECIPIENTS_ENV, "owner@example.com".to_string()),
            (ESCALATION_RECIPIENTS_ENV, "friend@example.com".to_string()),
            (CHECK_INTERVAL_ENV, "300".to_string()),
            (CONFIRM_WINDOW_ENV, "240".to_string()),
            (REMIND_EVERY_ENV, "60".to_string()),
            (ESCALATE_GRACE_ENV, "60".to_string()),
            (SENDMAIL_ENV, "/nonexistent/lifeline-sendmail".to_string()),
        ]);
        let config = SwitchConfig::from_lookup(|key| env.get(key).cloned())
            .expect("test config should load");
        Switch::new(Arc::new(config))
    }
}
