use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::error::StoreError;
use crate::state::{STATE_VERSION, SwitchState};

/// JSON file holding the one [`SwitchState`] record.
///
/// Callers are expected to hold the [`crate::lock::LockCoordinator`] lock
/// around every load-decide-save sequence.
#[derive(Debug, Clone)]
pub struct StateStore {
    path: PathBuf,
}

impl StateStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// `None` means the switch needs initialising: the file is missing,
    /// unreadable, corrupt, or written by a newer schema.
    pub fn load(&self) -> Option<SwitchState> {
        let content = match fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return None,
            Err(err) => {
                tracing::warn!(path = %self.path.display(), error = %err, "state file unreadable");
                return None;
            }
        };
        let state: SwitchState = match serde_json::from_str(&content) {
            Ok(state) => state,
            Err(err) => {
                tracing::warn!(path = %self.path.display(), error = %err, "state file corrupt");
                return None;
            }
        };
        if state.version > STATE_VERSION {
            tracing::warn!(
                path = %self.path.display(),
                version = state.version,
                supported = STATE_VERSION,
                "state file written by a newer schema"
            );
            return None;
        }
        Some(state)
    }

    /// Write to a temp file beside the target, fsync, then rename over it, so
    /// a reader sees either the old record or the new one.
    pub fn save(&self, state: &SwitchState) -> Result<(), StoreError> {
        let serialized = serde_json::to_vec_pretty(state)?;
        let parent = self
            .path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        let write_err = |source| StoreError::Write {
            path: self.path.clone(),
            source,
        };

        fs::create_dir_all(parent).map_err(write_err)?;
        let mut temp = tempfile::NamedTempFile::new_in(parent).map_err(write_err)?;
        temp.write_all(&serialized).map_err(write_err)?;
        temp.as_file().sync_all().map_err(write_err)?;
        temp.persist(&self.path).map_err(|err| StoreError::Rename {
            path: self.path.clone(),
            source: err.error,
        })?;
        Ok(())
    }
}
