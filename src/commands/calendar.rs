use anyhow::Result;
use chrono::NaiveDate;
use tabsync_core::ics::IcsCalendarService;

use super::CommandContext;
use crate::config;

pub fn sync(today: NaiveDate) -> Result<()> {
    let mut ctx = CommandContext::load()?;
    let mut service = IcsCalendarService::new(config::expand_path(&ctx.cfg.calendar_dir));

    let synced = ctx.run_locked(|ctx| ctx.orchestrator(today).sync_calendars(&mut service))?;

    let events: usize = synced.iter().map(|record| record.state.len()).sum();
    println!(
        "Synced {} rows to {} calendar events in {}",
        synced.len(),
        events,
        service.root().display()
    );
    Ok(())
}
