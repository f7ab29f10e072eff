use anyhow::Result;
use chrono::NaiveDate;

use super::CommandContext;

pub fn append(today: NaiveDate) -> Result<()> {
    let mut ctx = CommandContext::load()?;
    ctx.run_locked(|ctx| ctx.orchestrator(today).append_overview())?;

    println!(
        "Appended the two weeks from {} to {}",
        first_day(&ctx, today),
        ctx.sync_config.overview.sheet_name
    );
    Ok(())
}

pub fn clear(today: NaiveDate) -> Result<()> {
    let mut ctx = CommandContext::load()?;
    ctx.run_locked(|ctx| ctx.orchestrator(today).clear_overview())?;

    println!("Cleared {}", ctx.sync_config.overview.sheet_name);
    Ok(())
}

pub fn sync(today: NaiveDate) -> Result<()> {
    let mut ctx = CommandContext::load()?;
    ctx.run_locked(|ctx| ctx.orchestrator(today).sync_overview())?;

    println!(
        "Rebuilt {} from the two weeks from {}",
        ctx.sync_config.overview.sheet_name,
        first_day(&ctx, today)
    );
    Ok(())
}

fn first_day(ctx: &CommandContext, today: NaiveDate) -> String {
    let week_start = ctx.sync_config.window.week_start;
    tabsync_core::dates::format_day(tabsync_core::dates::start_of_week(today, week_start))
}
