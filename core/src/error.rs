use std::path::PathBuf;

/// Configuration could not be built. Fatal at startup for every entrypoint.
///
/// Messages name the offending variable but never echo secret material.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{var} must be set")]
    Missing { var: &'static str },
    #[error("{var} is invalid: {reason}")]
    Invalid { var: &'static str, reason: String },
    #[error("secret must be at least {min} bytes, got {len}")]
    SecretTooShort { min: usize, len: usize },
    #[error("failed to read {var} from {}: {source}", path.display())]
    File {
        var: &'static str,
        path: PathBuf,
        source: std::io::Error,
    },
}

/// Persisting the switch state failed. Never swallowed by callers.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("failed to serialize switch state: {0}")]
    Serialize(#[from] serde_json::Error),
    #[error("failed to write {}: {source}", path.display())]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to replace {}: {source}", path.display())]
    Rename {
        path: PathBuf,
        source: std::io::Error,
    },
}

#[derive(Debug, thiserror::Error)]
#[error("failed to acquire state lock {}: {source}", path.display())]
pub struct LockError {
    pub path: PathBuf,
    #[source]
    pub source: std::io::Error,
}

/// A notification could not be handed to the transport.
#[derive(Debug, thiserror::Error)]
pub enum DeliveryError {
    #[error("failed to spawn mail command `{command}`: {source}")]
    Spawn {
        command: String,
        source: std::io::Error,
    },
    #[error("failed to write message to mail command: {0}")]
    Pipe(std::io::Error),
    #[error("mail command exited with {status} for {recipient}")]
    Exit { recipient: String, status: String },
    #[error("delivery to {recipient} rejected: {reason}")]
    Rejected { recipient: String, reason: String },
}

/// Failure of a whole tick. Nothing was persisted when this is returned.
#[derive(Debug, thiserror::Error)]
pub enum TickError {
    #[error(transparent)]
    Lock(#[from] LockError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Delivery(#[from] DeliveryError),
}

/// Machine-readable codes surfaced by the CLI's JSON error output.
pub mod codes {
    pub const CONFIG_INVALID: &str = "config_invalid";
    pub const LOCK_UNAVAILABLE: &str = "lock_unavailable";
    pub const STATE_WRITE_FAILED: &str = "state_write_failed";
    pub const DELIVERY_FAILED: &str = "delivery_failed";
    pub const NOT_INITIALISED: &str = "not_initialised";
    pub const CONFIRMATION_REQUIRED: &str = "confirmation_required";
}

impl TickError {
    pub fn code(&self) -> &'static str {
        match self {
            TickError::Lock(_) => codes::LOCK_UNAVAILABLE,
            TickError::Store(_) => codes::STATE_WRITE_FAILED,
            TickError::Delivery(_) => codes::DELIVERY_FAILED,
        }
    }
}
