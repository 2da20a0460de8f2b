//! Strongly typed switch configuration, validated once at startup.
//!
//! Every entrypoint (tick CLI, HTTP gateway) builds one [`SwitchConfig`] from
//! `LIFELINE_*` environment variables and passes it around explicitly. Nothing
//! reads the environment after that point.

use std::path::{Path, PathBuf};

use crate::error::ConfigError;
use crate::token::SecretKey;

pub const STATE_DIR_ENV: &str = "LIFELINE_STATE_DIR";
pub const SECRET_ENV: &str = "LIFELINE_SECRET";
pub const SECRET_FILE_ENV: &str = "LIFELINE_SECRET_FILE";
pub const BASE_URL_ENV: &str = "LIFELINE_BASE_URL";
pub const SELF_RECIPIENTS_ENV: &str = "LIFELINE_SELF_RECIPIENTS";
pub const ESCALATION_RECIPIENTS_ENV: &str = "LIFELINE_ESCALATION_RECIPIENTS";
pub const CHECK_INTERVAL_ENV: &str = "LIFELINE_CHECK_INTERVAL_SECS";
pub const CONFIRM_WINDOW_ENV: &str = "LIFELINE_CONFIRM_WINDOW_SECS";
pub const REMIND_EVERY_ENV: &str = "LIFELINE_REMIND_EVERY_SECS";
pub const ESCALATE_GRACE_ENV: &str = "LIFELINE_ESCALATE_GRACE_SECS";
pub const MISSED_CYCLES_ENV: &str = "LIFELINE_MISSED_CYCLES_BEFORE_FIRE";
pub const ACK_ENABLED_ENV: &str = "LIFELINE_ACK_ENABLED";
pub const ACK_REMIND_EVERY_ENV: &str = "LIFELINE_ACK_REMIND_EVERY_SECS";
pub const ACK_MAX_REMINDS_ENV: &str = "LIFELINE_ACK_MAX_REMINDS";
pub const STEALTH_ENV: &str = "LIFELINE_STEALTH";
pub const ESCALATION_SUBJECT_ENV: &str = "LIFELINE_ESCALATION_SUBJECT";
pub const ESCALATION_BODY_FILE_ENV: &str = "LIFELINE_ESCALATION_BODY_FILE";
pub const SENDMAIL_ENV: &str = "LIFELINE_SENDMAIL";
pub const MAIL_FROM_ENV: &str = "LIFELINE_MAIL_FROM";
pub const RATE_LIMIT_PER_MINUTE_ENV: &str = "LIFELINE_RATE_LIMIT_PER_MINUTE";
pub const RATE_LIMIT_BURST_ENV: &str = "LIFELINE_RATE_LIMIT_BURST";
pub const TRUST_FORWARDED_ENV: &str = "LIFELINE_TRUST_FORWARDED_FOR";

const MIN_PERIOD_SECS: i64 = 60;
const MAX_PERIOD_SECS: i64 = 365 * 24 * 3600;
/// Widest `cycle_start_at..deadline_at` any valid configuration produces.
pub const MAX_WINDOW_SECS: i64 = 2 * MAX_PERIOD_SECS;
/// Ack reminders are never scheduled closer together than this.
pub const ACK_REMIND_FLOOR_SECS: i64 = 60;

const DEFAULT_CHECK_INTERVAL_SECS: i64 = 7 * 24 * 3600;
const DEFAULT_CONFIRM_WINDOW_SECS: i64 = 2 * 24 * 3600;
const DEFAULT_REMIND_EVERY_SECS: i64 = 6 * 3600;
const DEFAULT_ESCALATE_GRACE_SECS: i64 = 3600;
const DEFAULT_ACK_REMIND_EVERY_SECS: i64 = 24 * 3600;
const DEFAULT_ACK_MAX_REMINDS: u32 = 3;
const DEFAULT_SENDMAIL: &str = "/usr/sbin/sendmail -t -i";
const DEFAULT_RATE_LIMIT_PER_MINUTE: u32 = 10;
const DEFAULT_RATE_LIMIT_BURST: u32 = 5;

pub const DEFAULT_ESCALATION_SUBJECT: &str = "Lifeline: no check-in received";
pub const DEFAULT_ESCALATION_BODY: &str = "\
You are receiving this message because you were named as a contact in a
Lifeline check-in switch. Its owner has not confirmed they are OK for the
configured number of check-in cycles.

Please try to reach them.";

/// Timing of one cycle. `next_check_at = start + check_interval`,
/// `deadline_at = next_check_at + confirm_window`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CycleTiming {
    pub check_interval_secs: i64,
    pub confirm_window_secs: i64,
    pub remind_every_secs: i64,
    pub escalate_grace_secs: i64,
    pub missed_cycles_before_fire: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AckPolicy {
    pub enabled: bool,
    pub remind_every_secs: i64,
    pub max_reminds: u32,
}

impl AckPolicy {
    /// Reminder spacing with the floor applied.
    pub fn effective_remind_every(&self) -> i64 {
        self.remind_every_secs.max(ACK_REMIND_FLOOR_SECS)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageTemplates {
    pub escalation_subject: String,
    pub escalation_body: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MailSettings {
    pub sendmail_command: Vec<String>,
    pub from: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitSettings {
    pub per_minute: u32,
    pub burst: u32,
    /// Key clients by `X-Forwarded-For`/`X-Real-IP`. Only safe behind a
    /// reverse proxy that overwrites those headers; otherwise the peer
    /// address is used.
    pub trust_forwarded: bool,
}

#[derive(Debug, Clone)]
pub struct SwitchConfig {
    pub state_dir: PathBuf,
    pub secret: SecretKey,
    pub base_url: String,
    pub self_recipients: Vec<String>,
    pub escalation_recipients: Vec<String>,
    pub timing: CycleTiming,
    pub ack: AckPolicy,
    /// When true, invalid or stale links get the same neutral page as
    /// everything else. When false they get a generic "link not valid" page.
    pub stealth: bool,
    pub messages: MessageTemplates,
    pub mail: MailSettings,
    pub rate_limit: RateLimitSettings,
}

impl SwitchConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary key lookup. Blank values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| {
            lookup(key)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };

        let state_dir = PathBuf::from(
            get(STATE_DIR_ENV).ok_or(ConfigError::Missing { var: STATE_DIR_ENV })?,
        );

        let secret_raw = match (get(SECRET_ENV), get(SECRET_FILE_ENV)) {
            (Some(secret), _) => secret,
            (None, Some(path)) => read_file(SECRET_FILE_ENV, Path::new(&path))?
                .trim()
                .to_string(),
            (None, None) => return Err(ConfigError::Missing { var: SECRET_ENV }),
        };
        let secret = SecretKey::new(secret_raw.into_bytes())?;

        let base_url = parse_base_url(
            &get(BASE_URL_ENV).ok_or(ConfigError::Missing { var: BASE_URL_ENV })?,
        )?;

        let self_recipients = parse_recipients(SELF_RECIPIENTS_ENV, get(SELF_RECIPIENTS_ENV))?;
        let escalation_recipients =
            parse_recipients(ESCALATION_RECIPIENTS_ENV, get(ESCALATION_RECIPIENTS_ENV))?;

        let timing = CycleTiming {
            check_interval_secs: parse_secs(
                CHECK_INTERVAL_ENV,
                get(CHECK_INTERVAL_ENV),
                DEFAULT_CHECK_INTERVAL_SECS,
                MIN_PERIOD_SECS,
            )?,
            confirm_window_secs: parse_secs(
                CONFIRM_WINDOW_ENV,
                get(CONFIRM_WINDOW_ENV),
                DEFAULT_CONFIRM_WINDOW_SECS,
                MIN_PERIOD_SECS,
            )?,
            remind_every_secs: parse_secs(
                REMIND_EVERY_ENV,
                get(REMIND_EVERY_ENV),
                DEFAULT_REMIND_EVERY_SECS,
                MIN_PERIOD_SECS,
            )?,
            escalate_grace_secs: parse_secs(
                ESCALATE_GRACE_ENV,
                get(ESCALATE_GRACE_ENV),
                DEFAULT_ESCALATE_GRACE_SECS,
                0,
            )?,
            missed_cycles_before_fire: parse_count(
                MISSED_CYCLES_ENV,
                get(MISSED_CYCLES_ENV),
                1,
                1,
                100,
            )?,
        };

        let ack = AckPolicy {
            enabled: parse_bool(ACK_ENABLED_ENV, get(ACK_ENABLED_ENV), true)?,
            remind_every_secs: parse_secs(
                ACK_REMIND_EVERY_ENV,
                get(ACK_REMIND_EVERY_ENV),
                DEFAULT_ACK_REMIND_EVERY_SECS,
                0,
            )?
            .max(ACK_REMIND_FLOOR_SECS),
            max_reminds: parse_count(
                ACK_MAX_REMINDS_ENV,
                get(ACK_MAX_REMINDS_ENV),
                DEFAULT_ACK_MAX_REMINDS,
                0,
                100,
            )?,
        };

        let escalation_body = match get(ESCALATION_BODY_FILE_ENV) {
            Some(path) => {
                let body = read_file(ESCALATION_BODY_FILE_ENV, Path::new(&path))?;
                if body.trim().is_empty() {
                    return Err(ConfigError::Invalid {
                        var: ESCALATION_BODY_FILE_ENV,
                        reason: "file is empty".to_string(),
                    });
                }
                body
            }
            None => DEFAULT_ESCALATION_BODY.to_string(),
        };
        let messages = MessageTemplates {
            escalation_subject: get(ESCALATION_SUBJECT_ENV)
                .unwrap_or_else(|| DEFAULT_ESCALATION_SUBJECT.to_string()),
            escalation_body,
        };

        let mail = MailSettings {
            sendmail_command: get(SENDMAIL_ENV)
                .unwrap_or_else(|| DEFAULT_SENDMAIL.to_string())
                .split_whitespace()
                .map(str::to_string)
                .collect(),
            from: get(MAIL_FROM_ENV),
        };

        let rate_limit = RateLimitSettings {
            per_minute: parse_count(
                RATE_LIMIT_PER_MINUTE_ENV,
                get(RATE_LIMIT_PER_MINUTE_ENV),
                DEFAULT_RATE_LIMIT_PER_MINUTE,
                1,
                10_000,
            )?,
            burst: parse_count(
                RATE_LIMIT_BURST_ENV,
                get(RATE_LIMIT_BURST_ENV),
                DEFAULT_RATE_LIMIT_BURST,
                1,
                10_000,
            )?,
            trust_forwarded: parse_bool(TRUST_FORWARDED_ENV, get(TRUST_FORWARDED_ENV), true)?,
        };

        Ok(Self {
            state_dir,
            secret,
            base_url,
            self_recipients,
            escalation_recipients,
            timing,
            ack,
            stealth: parse_bool(STEALTH_ENV, get(STEALTH_ENV), true)?,
            messages,
            mail,
            rate_limit,
        })
    }

    pub fn state_path(&self) -> PathBuf {
        self.state_dir.join("state.json")
    }

    pub fn lock_path(&self) -> PathBuf {
        self.state_dir.join("state.lock")
    }

    /// Path component of `base_url`, where the gateway is mounted.
    pub fn gateway_path(&self) -> String {
        url::Url::parse(&self.base_url)
            .map(|url| url.path().to_string())
            .unwrap_or_else(|_| "/".to_string())
    }

    /// Redacted view for `check-config` output and startup logs.
    pub fn summary(&self) -> serde_json::Value {
        serde_json::json!({
            "state_dir": self.state_dir.display().to_string(),
            "base_url": self.base_url,
            "self_recipients": self.self_recipients,
            "escalation_recipients": self.escalation_recipients,
            "check_interval_secs": self.timing.check_interval_secs,
            "confirm_window_secs": self.timing.confirm_window_secs,
            "remind_every_secs": self.timing.remind_every_secs,
            "escalate_grace_secs": self.timing.escalate_grace_secs,
            "missed_cycles_before_fire": self.timing.missed_cycles_before_fire,
            "ack_enabled": self.ack.enabled,
            "ack_remind_every_secs": self.ack.effective_remind_every(),
            "ack_max_reminds": self.ack.max_reminds,
            "stealth": self.stealth,
            "sendmail_command": self.mail.sendmail_command.join(" "),
            "rate_limit_per_minute": self.rate_limit.per_minute,
            "rate_limit_burst": self.rate_limit.burst,
            "trust_forwarded_for": self.rate_limit.trust_forwarded,
        })
    }
}

fn read_file(var: &'static str, path: &Path) -> Result<String, ConfigError> {
    std::fs::read_to_string(path).map_err(|source| ConfigError::File {
        var,
        path: path.to_path_buf(),
        source,
    })
}

fn parse_base_url(raw: &str) -> Result<String, ConfigError> {
    let invalid = |reason: &str| ConfigError::Invalid {
        var: BASE_URL_ENV,
        reason: reason.to_string(),
    };
    let url = url::Url::parse(raw).map_err(|err| invalid(&err.to_string()))?;
    if url.scheme() != "http" && url.scheme() != "https" {
        return Err(invalid("scheme must be http or https"));
    }
    if url.query().is_some() || url.fragment().is_some() {
        return Err(invalid("must not carry a query string or fragment"));
    }
    if url.path() == "/health" {
        return Err(invalid("path /health is reserved"));
    }
    Ok(raw.to_string())
}

fn parse_recipients(var: &'static str, raw: Option<String>) -> Result<Vec<String>, ConfigError> {
    let raw = raw.ok_or(ConfigError::Missing { var })?;
    let recipients: Vec<String> = raw
        .split(',')
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
        .collect();
    if recipients.is_empty() {
        return Err(ConfigError::Missing { var });
    }
    if let Some(bad) = recipients
        .iter()
        .find(|r| !r.contains('@') || r.chars().any(|c| c.is_whitespace() || c.is_control()))
    {
        return Err(ConfigError::Invalid {
            var,
            reason: format!("'{bad}' is not a mail address"),
        });
    }
    Ok(recipients)
}

fn parse_secs(
    var: &'static str,
    raw: Option<String>,
    default: i64,
    min: i64,
) -> Result<i64, ConfigError> {
    let Some(raw) = raw else {
        return Ok(default);
    };
    let value: i64 = raw.parse().map_err(|_| ConfigError::Invalid {
        var,
        reason: format!("'{raw}' is not a whole number of seconds"),
    })?;
    if !(min..=MAX_PERIOD_SECS).contains(&value) {
        return Err(ConfigError::Invalid {
            var,
            reason: format!("must be between {min} and {MAX_PERIOD_SECS} seconds"),
        });
    }
    Ok(value)
}

fn parse_count(
    var: &'static str,
    raw: Option<String>,
    default: u32,
    min: u32,
    max: u32,
) -> Result<u32, ConfigError> {
    let Some(raw) = raw else {
        return Ok(default);
    };
    let value: u32 = raw.parse().map_err(|_| ConfigError::Invalid {
        var,
        reason: format!("'{raw}' is not a whole number"),
    })?;
    if !(min..=max).contains(&value) {
        return Err(ConfigError::Invalid {
            var,
            reason: format!("must be between {min} and {max}"),
        });
    }
    Ok(value)
}

fn parse_bool(var: &'static str, raw: Option<String>, default: bool) -> Result<bool, ConfigError> {
    let Some(raw) = raw else {
        return Ok(default);
    };
    match raw.to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::Invalid {
            var,
            reason: format!("'{raw}' is not a boolean"),
        }),
    }
}

/// Short-period configuration used across the crate's tests.
#[cfg(test)]
pub(crate) fn test_config(state_dir: &Path) -> SwitchConfig {
    SwitchConfig {
        state_dir: state_dir.to_path_buf(),
        secret: SecretKey::new(b"0123456789abcdef0123456789abcdef".to_vec())
            .expect("test secret is long enough"),
        base_url: "https://lifeline.example/check".to_string(),
        self_recipients: vec!["owner@example.com".to_string()],
        escalation_recipients: vec![
            "friend@example.com".to_string(),
            "sibling@example.com".to_string(),
        ],
        timing: CycleTiming {
            check_interval_secs: 300,
            confirm_window_secs: 240,
            remind_every_secs: 60,
            escalate_grace_secs: 60,
            missed_cycles_before_fire: 1,
        },
        ack: AckPolicy {
            enabled: true,
            remind_every_secs: 120,
            max_reminds: 2,
        },
        stealth: true,
        messages: MessageTemplates {
            escalation_subject: DEFAULT_ESCALATION_SUBJECT.to_string(),
            escalation_body: DEFAULT_ESCALATION_BODY.to_string(),
        },
        mail: MailSettings {
            sendmail_command: vec!["/usr/sbin/sendmail".to_string(), "-t".to_string()],
            from: None,
        },
        rate_limit: RateLimitSettings {
            per_minute: 10,
            burst: 5,
            trust_forwarded: true,
        },
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn base_env() -> HashMap<&'static str, String> {
        HashMap::from([
            (STATE_DIR_ENV, "/var/lib/lifeline".to_string()),
            (SECRET_ENV, "a-very-long-secret-value".to_string()),
            (BASE_URL_ENV, "https://lifeline.example/check".to_string()),
            (SELF_RECIPIENTS_ENV, "me@example.com".to_string()),
            (
                ESCALATION_RECIPIENTS_ENV,
                "a@example.com, b@example.com".to_string(),
            ),
        ])
    }

    fn build(env: &HashMap<&'static str, String>) -> Result<SwitchConfig, ConfigError> {
        SwitchConfig::from_lookup(|key| env.get(key).cloned())
    }

    #[test]
    fn minimal_env_uses_defaults() {
        let config = build(&base_env()).expect("minimal config should load");
        assert_eq!(config.timing.check_interval_secs, DEFAULT_CHECK_INTERVAL_SECS);
        assert_eq!(config.timing.missed_cycles_before_fire, 1);
        assert_eq!(config.escalation_recipients, vec!["a@example.com", "b@example.com"]);
        assert!(config.ack.enabled);
        assert!(config.stealth);
        assert_eq!(config.mail.sendmail_command[0], "/usr/sbin/sendmail");
        assert_eq!(config.state_path(), PathBuf::from("/var/lib/lifeline/state.json"));
    }

    #[test]
    fn short_secret_is_rejected() {
        let mut env = base_env();
        env.insert(SECRET_ENV, "too-short".to_string());
        let err = build(&env).expect_err("short secret must fail");
        assert!(matches!(err, ConfigError::SecretTooShort { min: 16, len: 9 }));
    }

    #[test]
    fn missing_secret_is_reported_by_name() {
        let mut env = base_env();
        env.remove(SECRET_ENV);
        let err = build(&env).expect_err("missing secret must fail");
        assert_eq!(err.to_string(), "LIFELINE_SECRET must be set");
    }

    #[test]
    fn secret_can_come_from_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("secret");
        std::fs::write(&path, "file-backed-secret-material\n").expect("write secret");
        let mut env = base_env();
        env.remove(SECRET_ENV);
        env.insert(SECRET_FILE_ENV, path.display().to_string());
        build(&env).expect("secret file should be accepted");
    }

    #[test]
    fn timing_bounds_are_enforced() {
        let mut env = base_env();
        env.insert(CHECK_INTERVAL_ENV, "59".to_string());
        assert!(matches!(
            build(&env),
            Err(ConfigError::Invalid { var: CHECK_INTERVAL_ENV, .. })
        ));

        let mut env = base_env();
        env.insert(REMIND_EVERY_ENV, "soon".to_string());
        assert!(matches!(
            build(&env),
            Err(ConfigError::Invalid { var: REMIND_EVERY_ENV, .. })
        ));

        let mut env = base_env();
        env.insert(MISSED_CYCLES_ENV, "0".to_string());
        assert!(matches!(
            build(&env),
            Err(ConfigError::Invalid { var: MISSED_CYCLES_ENV, .. })
        ));
    }

    #[test]
    fn ack_interval_is_floor_clamped() {
        let mut env = base_env();
        env.insert(ACK_REMIND_EVERY_ENV, "5".to_string());
        let config = build(&env).expect("small ack interval is clamped, not rejected");
        assert_eq!(config.ack.remind_every_secs, ACK_REMIND_FLOOR_SECS);
    }

    #[test]
    fn base_url_with_query_is_rejected() {
        let mut env = base_env();
        env.insert(BASE_URL_ENV, "https://lifeline.example/?x=1".to_string());
        assert!(matches!(
            build(&env),
            Err(ConfigError::Invalid { var: BASE_URL_ENV, .. })
        ));

        let mut env = base_env();
        env.insert(BASE_URL_ENV, "ftp://lifeline.example/".to_string());
        assert!(build(&env).is_err());
    }

    #[test]
    fn gateway_is_mounted_at_base_url_path() {
        assert_eq!(build(&base_env()).expect("config").gateway_path(), "/check");

        let mut env = base_env();
        env.insert(BASE_URL_ENV, "https://lifeline.example".to_string());
        assert_eq!(build(&env).expect("config").gateway_path(), "/");
    }

    #[test]
    fn recipients_must_look_like_addresses() {
        let mut env = base_env();
        env.insert(ESCALATION_RECIPIENTS_ENV, "a@example.com, nobody".to_string());
        assert!(matches!(
            build(&env),
            Err(ConfigError::Invalid { var: ESCALATION_RECIPIENTS_ENV, .. })
        ));

        let mut env = base_env();
        env.insert(SELF_RECIPIENTS_ENV, " , ".to_string());
        assert!(matches!(
            build(&env),
            Err(ConfigError::Missing { var: SELF_RECIPIENTS_ENV })
        ));
    }

    #[test]
    fn stealth_flag_parses_booleans() {
        let mut env = base_env();
        env.insert(STEALTH_ENV, "off".to_string());
        assert!(!build(&env).expect("config").stealth);

        env.insert(STEALTH_ENV, "maybe".to_string());
        assert!(build(&env).is_err());
    }

    #[test]
    fn forwarded_headers_are_trusted_unless_disabled() {
        let mut env = base_env();
        assert!(build(&env).expect("config").rate_limit.trust_forwarded);

        env.insert(TRUST_FORWARDED_ENV, "false".to_string());
        assert!(!build(&env).expect("config").rate_limit.trust_forwarded);
    }

    #[test]
    fn summary_never_contains_secret() {
        let config = build(&base_env()).expect("config");
        let summary = config.summary().to_string();
        assert!(!summary.contains("a-very-long-secret-value"));
    }
}
