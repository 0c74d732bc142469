//! core::cleanup
//!
//! Forced removal of a directory tree.
//!
//! Used before a fresh clone. Files can stay locked or read-only for a short
//! while after the process that held them exits, so removal is retried with
//! an escalating delay and gives up loudly after the last attempt.

use std::fs;
use std::path::{Path, PathBuf};
use std::thread;
use std::time::Duration;

use thiserror::Error;
use tracing::{debug, warn};

/// Delays between removal attempts.
pub const RETRY_SCHEDULE: [Duration; 4] = [
    Duration::from_millis(10),
    Duration::from_millis(100),
    Duration::from_millis(1000),
    Duration::from_millis(5000),
];

/// Errors from directory removal.
#[derive(Debug, Error)]
pub enum CleanupError {
    /// Entries remained after every retry.
    #[error("could not remove '{path}' after {attempts} attempts: {last_error}")]
    Timeout {
        path: PathBuf,
        attempts: usize,
        last_error: String,
    },
}

/// Remove `path` and everything below it, clearing read-only flags first.
///
/// A missing path is not an error.
///
/// # Errors
///
/// Returns [`CleanupError::Timeout`] if the tree still exists after the
/// whole [`RETRY_SCHEDULE`] has elapsed.
pub fn remove_dir_forcefully(path: &Path) -> Result<(), CleanupError> {
    remove_dir_with_schedule(path, &RETRY_SCHEDULE)
}

/// [`remove_dir_forcefully`] with an explicit retry schedule.
pub fn remove_dir_with_schedule(path: &Path, schedule: &[Duration]) -> Result<(), CleanupError> {
    let mut last_error = String::new();

    for attempt in 0..=schedule.len() {
        if !path.exists() {
            return Ok(());
        }
        if attempt > 0 {
            let delay = schedule[attempt - 1];
            debug!(path = %path.display(), ?delay, "directory still present, retrying removal");
            thread::sleep(delay);
        }

        clear_readonly(path);
        match fs::remove_dir_all(path) {
            Ok(()) => return Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "failed to remove directory");
                last_error = e.to_string();
            }
        }
    }

    if !path.exists() {
        return Ok(());
    }

    Err(CleanupError::Timeout {
        path: path.to_path_buf(),
        attempts: schedule.len() + 1,
        last_error,
    })
}

/// Best-effort recursive clear of read-only permissions.
#[allow(clippy::permissions_set_readonly_false)]
fn clear_readonly(path: &Path) {
    let Ok(meta) = fs::symlink_metadata(path) else {
        return;
    };

    if meta.file_type().is_symlink() {
        return;
    }

    if meta.is_dir() {
        if let Ok(entries) = fs::read_dir(path) {
            for entry in entries.flatten() {
                clear_readonly(&entry.path());
            }
        }
    }

    let mut perms = meta.permissions();
    if perms.readonly() {
        perms.set_readonly(false);
        let _ = fs::set_permissions(path, perms);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn missing_path_is_ok() {
        let temp = TempDir::new().unwrap();
        assert!(remove_dir_forcefully(&temp.path().join("absent")).is_ok());
    }

    #[test]
    fn removes_nested_tree() {
        let temp = TempDir::new().unwrap();
        let root = temp.path().join("repo");
        fs::create_dir_all(root.join("a/b/c")).unwrap();
        fs::write(root.join("a/b/c/file.txt"), "x").unwrap();

        remove_dir_forcefully(&root).unwrap();
        assert!(!root.exists());
    }

    #[test]
    fn removes_read_only_files() {
        let temp = TempDir::new().unwrap();
        let root = temp.path().join("repo");
        fs::create_dir_all(root.join(".git/objects")).unwrap();
        let file = root.join(".git/objects/pack");
        fs::write(&file, "data").unwrap();

        let mut perms = fs::metadata(&file).unwrap().permissions();
        perms.set_readonly(true);
        fs::set_permissions(&file, perms).unwrap();

        remove_dir_with_schedule(&root, &[Duration::from_millis(1)]).unwrap();
        assert!(!root.exists());
    }
}
