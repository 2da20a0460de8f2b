use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};

use fs2::FileExt;

use crate::error::LockError;

/// Exclusive advisory lock shared by the tick and the gateway.
///
/// The lock file is never deleted; its presence carries no meaning.
#[derive(Debug, Clone)]
pub struct LockCoordinator {
    path: PathBuf,
}

/// Holds the lock until dropped.
#[derive(Debug)]
pub struct LockGuard {
    file: File,
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        if let Err(err) = FileExt::unlock(&self.file) {
            tracing::debug!(error = %err, "explicit unlock failed; released on close");
        }
    }
}

impl LockCoordinator {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Block until the exclusive lock is held.
    pub fn acquire(&self) -> Result<LockGuard, LockError> {
        let file = self.open()?;
        FileExt::lock_exclusive(&file).map_err(|source| self.error(source))?;
        Ok(LockGuard { file })
    }

    /// `Ok(None)` when another holder has the lock right now.
    pub fn try_acquire(&self) -> Result<Option<LockGuard>, LockError> {
        let file = self.open()?;
        match FileExt::try_lock_exclusive(&file) {
            Ok(()) => Ok(Some(LockGuard { file })),
            Err(err) if err.kind() == std::io::ErrorKind::WouldBlock => Ok(None),
            Err(err) if err.raw_os_error() == fs2::lock_contended_error().raw_os_error() => {
                Ok(None)
            }
            Err(err) => Err(self.error(err)),
        }
    }

    fn open(&self) -> Result<File, LockError> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|source| self.error(source))?;
        }
        OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .truncate(false)
            .open(&self.path)
            .map_err(|source| self.error(source))
    }

    fn error(&self, source: std::io::Error) -> LockError {
        LockError {
            path: self.path.clone(),
            source,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use super::*;

    #[test]
    fn second_holder_is_excluded_until_release() {
        let dir = tempfile::tempdir().expect("tempdir");
        let lock = LockCoordinator::new(dir.path().join("state.lock"));

        let guard = lock.acquire().expect("first acquire");
        assert!(lock.try_acquire().expect("try").is_none());
        drop(guard);
        assert!(lock.try_acquire().expect("try").is_some());
    }

    #[test]
    fn unopenable_lock_path_is_an_error() {
        let dir = tempfile::tempdir().expect("tempdir");
        let blocker = dir.path().join("file");
        std::fs::write(&blocker, b"x").expect("write");
        let lock = LockCoordinator::new(blocker.join("state.lock"));
        assert!(lock.acquire().is_err());
    }

    #[test]
    fn critical_sections_never_overlap() {
        let dir = tempfile::tempdir().expect("tempdir");
        let lock = LockCoordinator::new(dir.path().join("state.lock"));
        let inside = Arc::new(AtomicUsize::new(0));
        let overlaps = Arc::new(AtomicUsize::new(0));

        let handles: Vec<_> = (0..4)
            .map(|_| {
                let lock = lock.clone();
                let inside = inside.clone();
                let overlaps = overlaps.clone();
                std::thread::spawn(move || {
                    for _ in 0..10 {
                        let _guard = lock.acquire().expect("acquire");
                        if inside.fetch_add(1, Ordering::SeqCst) != 0 {
                            overlaps.fetch_add(1, Ordering::SeqCst);
                        }
                        std::thread::sleep(Duration::from_millis(1));
                        inside.fetch_sub(1, Ordering::SeqCst);
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().expect("thread");
        }
        assert_eq!(overlaps.load(Ordering::SeqCst), 0);
    }
}
