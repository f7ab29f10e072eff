//! File lock ensuring only one tabsync command touches the workbook at a time.

use anyhow::{Context, Result};
use fs2::FileExt;
use std::fs::{self, File};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tabsync_core::store::ScriptLock;

const POLL_INTERVAL: Duration = Duration::from_millis(10);

pub struct FileLock {
    file: File,
    held: bool,
}

fn lock_path() -> Result<PathBuf> {
    let runtime_dir = dirs::runtime_dir()
        .or_else(dirs::cache_dir)
        .ok_or_else(|| anyhow::anyhow!("Could not determine runtime directory"))?;

    let dir = runtime_dir.join("tabsync");
    fs::create_dir_all(&dir)?;

    Ok(dir.join("sync.lock"))
}

impl FileLock {
    /// Open the lock file shared by every tabsync command.
    pub fn open() -> Result<Self> {
        Self::at(&lock_path()?)
    }

    pub fn at(path: &Path) -> Result<Self> {
        let file = File::create(path)
            .with_context(|| format!("Failed to create lock file at {}", path.display()))?;
        Ok(FileLock { file, held: false })
    }
}

impl ScriptLock for FileLock {
    fn try_lock(&mut self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;

        loop {
            if FileExt::try_lock_exclusive(&self.file).is_ok() {
                self.held = true;
                return true;
            }
            if Instant::now() >= deadline {
                return false;
            }
            std::thread::sleep(POLL_INTERVAL);
        }
    }

    fn release(&mut self) {
        if !self.held {
            return;
        }
        if let Err(e) = FileExt::unlock(&self.file) {
            tracing::warn!("Failed to release sync lock: {}", e);
        }
        self.held = false;
    }
}
