use anyhow::{Context, Result};
use rand::distributions::Alphanumeric;
use rand::{Rng, thread_rng};
use std::path::{Path, PathBuf};
use std::time::Duration;

const REMOVE_ATTEMPTS: u32 = 4;
const REMOVE_BACKOFF: Duration = Duration::from_millis(50);

/// Throwaway browser profile (`--user-data-dir`), deleted when dropped.
#[derive(Debug)]
pub(crate) struct ProfileDir {
    path: PathBuf,
}

impl ProfileDir {
    /// Creates `<root>/design-shot-<timestamp>-<suffix>`.
    pub(crate) fn create_in(root: &Path) -> Result<Self> {
        std::fs::create_dir_all(root)
            .with_context(|| format!("Failed to create {}", root.display()))?;
        let suffix: String = thread_rng()
            .sample_iter(&Alphanumeric)
            .take(8)
            .map(char::from)
            .collect();
        let stamp = chrono::Local::now().format("%Y%m%d-%H%M%S");
        let path = root.join(format!("design-shot-{stamp}-{suffix}"));
        std::fs::create_dir(&path)
            .with_context(|| format!("Failed to create profile {}", path.display()))?;
        Ok(Self { path })
    }

    pub(crate) fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for ProfileDir {
    fn drop(&mut self) {
        // the killed browser can hold files open briefly
        for attempt in 1..=REMOVE_ATTEMPTS {
            match std::fs::remove_dir_all(&self.path) {
                Ok(()) => return,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => return,
                Err(e) if attempt == REMOVE_ATTEMPTS => {
                    log::warn!("failed to remove profile {}: {e}", self.path.display());
                }
                Err(_) => std::thread::sleep(REMOVE_BACKOFF),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn profile_is_removed_on_drop() {
        let root = tempfile::tempdir().unwrap();
        let profile = ProfileDir::create_in(root.path()).unwrap();
        let path = profile.path().to_path_buf();
        assert!(path.is_dir());
        assert!(
            path.file_name()
                .unwrap()
                .to_string_lossy()
                .starts_with("design-shot-")
        );
        drop(profile);
        assert!(!path.exists());
    }
}
