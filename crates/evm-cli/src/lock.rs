//! Single-instance guard for scheduled `get-events` runs.

use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use fs2::FileExt;

pub const DEFAULT_LOCKFILE: &str = "evm.lock";

pub fn default_lockfile() -> PathBuf {
    std::env::temp_dir().join(DEFAULT_LOCKFILE)
}

/// Exclusive advisory lock held until drop.
#[derive(Debug)]
pub struct RunLock {
    file: File,
    path: PathBuf,
}

impl RunLock {
    pub fn acquire(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("failed to create lock dir {}", parent.display()))?;
        }

        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .truncate(false)
            .open(path)
            .with_context(|| format!("failed to open lockfile {}", path.display()))?;

        match FileExt::try_lock_exclusive(&file) {
            Ok(()) => Ok(Self {
                file,
                path: path.to_path_buf(),
            }),
            Err(err) if err.kind() == fs2::lock_contended_error().kind() => {
                bail!(
                    "LOCKED: another get-events run holds {}",
                    path.display()
                )
            }
            Err(err) => Err(err)
                .with_context(|| format!("failed to lock {}", path.display())),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for RunLock {
    fn drop(&mut self) {
        let _ = FileExt::unlock(&self.file);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_holder_is_refused_until_release() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("evm.lock");

        let held = RunLock::acquire(&path).unwrap();
        assert_eq!(held.path(), path.as_path());

        let err = RunLock::acquire(&path).unwrap_err();
        assert!(err.to_string().starts_with("LOCKED"), "{err}");

        drop(held);
        assert!(RunLock::acquire(&path).is_ok());
    }
}
