pub mod calendar;
pub mod overview;
pub mod state;

use std::path::PathBuf;

use anyhow::{Context, Result};
use chrono::NaiveDate;
use tabsync_core::lock::with_script_lock;
use tabsync_core::memory::{MemoryWorkbook, StaticSession};
use tabsync_core::{SyncConfig, SyncError, SyncResult, WindowOrchestrator};

use crate::lock::FileLock;
use crate::{config, workbook};

/// Everything a command needs, loaded once per invocation.
pub struct CommandContext {
    pub cfg: config::Config,
    pub workbook_path: PathBuf,
    pub workbook: MemoryWorkbook,
    pub sync_config: SyncConfig,
    pub session: StaticSession,
}

impl CommandContext {
    pub fn load() -> Result<Self> {
        let cfg = config::load_config()?;

        let workbook_path = config::expand_path(&cfg.workbook);
        let mut workbook = workbook::load(&workbook_path)?;
        if let Some(url) = &cfg.url {
            workbook.url = Some(url.clone());
        }

        let sync_config = match &cfg.sync_config {
            Some(path) => {
                let path = config::expand_path(path);
                SyncConfig::load(&path)
                    .with_context(|| format!("Failed to load sync config at {}", path.display()))?
            }
            None => SyncConfig::from_workbook(&mut workbook)
                .context("Failed to load sync config from workbook")?,
        };

        let session = StaticSession(cfg.identity());

        Ok(CommandContext {
            cfg,
            workbook_path,
            workbook,
            sync_config,
            session,
        })
    }

    pub fn orchestrator(&mut self, today: NaiveDate) -> WindowOrchestrator<'_, MemoryWorkbook, StaticSession> {
        WindowOrchestrator::new(&mut self.workbook, &self.sync_config, &self.session, today)
    }

    /// Run `f` under the sync lock, then save the workbook.
    ///
    /// The workbook is saved even when `f` fails so that the rows synced
    /// before the failure keep their event ids.
    pub fn run_locked<T>(&mut self, f: impl FnOnce(&mut Self) -> SyncResult<T>) -> Result<T> {
        let mut lock = FileLock::open()?;
        let timeout = self.cfg.lock_timeout();

        let result = with_script_lock(&mut lock, timeout, || f(self));

        let saved = match result {
            Err(SyncError::SyncInProgress) => Ok(()),
            _ => workbook::save(&self.workbook_path, &self.workbook),
        };

        let value = result?;
        saved?;
        Ok(value)
    }
}
