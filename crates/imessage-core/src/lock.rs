//! One live session per user.

use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use fs2::FileExt;
use tracing::{debug, info};

use crate::{Error, Result};

const LOCK_FILE: &str = ".imessage-tui.lock";

/// Exclusive advisory lock on a file, held until dropped.
///
/// The operating system releases the lock if the process dies, so a stale
/// lock file never blocks a later session.
#[derive(Debug)]
pub struct SingleInstanceLock {
    file: File,
    path: PathBuf,
}

impl SingleInstanceLock {
    /// `~/.imessage-tui.lock` for the current user.
    #[must_use]
    pub fn default_path() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(std::env::temp_dir)
            .join(LOCK_FILE)
    }

    /// Takes the lock without waiting and records this process id in it.
    ///
    /// # Errors
    ///
    /// Returns [`Error::LockHeld`] if another holder has it, or an I/O
    /// error if the file cannot be created or locked.
    pub fn acquire(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)?;
        }

        let mut file = open(&path)?;
        if let Err(err) = file.try_lock_exclusive() {
            if err.raw_os_error() != fs2::lock_contended_error().raw_os_error() {
                return Err(err.into());
            }
            let holder = read_pid(&mut file);
            debug!(path = %path.display(), ?holder, "Lock already held");
            return Err(Error::LockHeld { path, holder });
        }

        file.set_len(0)?;
        file.seek(SeekFrom::Start(0))?;
        write!(file, "{}", std::process::id())?;
        file.sync_all()?;

        info!(path = %path.display(), "Acquired instance lock");
        Ok(Self { file, path })
    }

    /// Path of the lock file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for SingleInstanceLock {
    fn drop(&mut self) {
        if let Err(err) = FileExt::unlock(&self.file) {
            debug!(error = %err, "Failed to release instance lock");
        }
    }
}

#[cfg(unix)]
fn open(path: &Path) -> std::io::Result<File> {
    use std::os::unix::fs::OpenOptionsExt;
    OpenOptions::new()
        .read(true)
        .write(true)
        .create(true)
        .truncate(false)
        .mode(0o600)
        .open(path)
}

#[cfg(not(unix))]
fn open(path: &Path) -> std::io::Result<File> {
    OpenOptions::new()
        .read(true)
        .write(true)
        .create(true)
        .truncate(false)
        .open(path)
}

fn read_pid(file: &mut File) -> Option<u32> {
    let mut contents = String::new();
    file.read_to_string(&mut contents).ok()?;
    contents.trim().parse().ok()
}
