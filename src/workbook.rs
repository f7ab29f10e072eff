//! Workbooks persisted as JSON files.

use anyhow::{Context, Result};
use std::fs;
use std::path::Path;
use tabsync_core::memory::MemoryWorkbook;

pub fn load(path: &Path) -> Result<MemoryWorkbook> {
    let contents = fs::read_to_string(path)
        .with_context(|| format!("Failed to read workbook at {}", path.display()))?;

    serde_json::from_str(&contents)
        .with_context(|| format!("Failed to parse workbook at {}", path.display()))
}

/// Write the workbook through a temporary file so a crash never leaves a
/// truncated workbook behind.
pub fn save(path: &Path, workbook: &MemoryWorkbook) -> Result<()> {
    let contents = serde_json::to_string_pretty(workbook).context("Failed to serialize workbook")?;

    let tmp = path.with_extension("json.tmp");
    fs::write(&tmp, contents)
        .with_context(|| format!("Failed to write workbook at {}", tmp.display()))?;
    fs::rename(&tmp, path)
        .with_context(|| format!("Failed to replace workbook at {}", path.display()))?;

    Ok(())
}
