use anyhow::{Context, Result};
use chrono::NaiveDate;
use tabsync_core::dates;
use tabsync_core::lock::with_script_lock;
use tabsync_core::store::{ScriptLock, Workbook};
use tabsync_core::{DaySync, SyncedRecord};

use super::CommandContext;
use crate::lock::FileLock;

pub fn show(day: NaiveDate) -> Result<()> {
    let mut ctx = CommandContext::load()?;
    let mut lock = FileLock::open()?;

    let (name, states) = read_states(&mut ctx, &mut lock, day)?;

    if states.is_empty() {
        println!("No synced rows in {}", name);
        return Ok(());
    }

    println!("{}", name);
    for record in states {
        println!("  row {}", record.identity.row + 1);
        for (calendar, event_id) in record.state.iter() {
            println!("    {}: {}", calendar, event_id);
        }
    }
    Ok(())
}

/// Read the sync states of `day` under the sync lock. Nothing is saved.
fn read_states<L: ScriptLock>(
    ctx: &mut CommandContext,
    lock: &mut L,
    day: NaiveDate,
) -> Result<(String, Vec<SyncedRecord>)> {
    let name = dates::day_sheet_name(day, &ctx.sync_config.window.sheet_name_format)
        .map_err(anyhow::Error::msg)?;
    let sheet = ctx
        .workbook
        .sheet_mut(&name)
        .with_context(|| format!("Could not find sheet {}", name))?;

    let states = with_script_lock(lock, ctx.cfg.lock_timeout(), || {
        DaySync::new(sheet, &ctx.sync_config.day_sheet, day, &ctx.session).all_sync_state()
    })?;

    Ok((name, states))
}
