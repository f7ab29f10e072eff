//! The rolling two-week window over day sheets.

use chrono::{Duration, NaiveDate, Weekday};

use crate::config::SyncConfig;
use crate::dates;
use crate::day_sync::{DaySync, SyncedRecord};
use crate::error::{SyncError, SyncResult};
use crate::overview::OverviewMaterializer;
use crate::store::{CalendarService, Session, Workbook};

pub const WINDOW_DAYS: i64 = 14;

/// The days of the window containing `today`.
pub fn window(today: NaiveDate, week_start: Weekday) -> Vec<NaiveDate> {
    let first = dates::start_of_week(today, week_start);
    (0..WINDOW_DAYS).map(|i| first + Duration::days(i)).collect()
}

pub struct WindowOrchestrator<'a, W: Workbook, U: Session> {
    workbook: &'a mut W,
    config: &'a SyncConfig,
    session: &'a U,
    today: NaiveDate,
}

impl<'a, W: Workbook, U: Session> WindowOrchestrator<'a, W, U> {
    pub fn new(workbook: &'a mut W, config: &'a SyncConfig, session: &'a U, today: NaiveDate) -> Self {
        WindowOrchestrator {
            workbook,
            config,
            session,
            today,
        }
    }

    /// Days of the window paired with the name of their sheet. Days without a
    /// sheet are left out.
    pub fn day_sheets(&mut self) -> SyncResult<Vec<(NaiveDate, String)>> {
        let window_config = &self.config.window;
        let mut resolved = Vec::new();

        for day in window(self.today, window_config.week_start) {
            let name = dates::day_sheet_name(day, &window_config.sheet_name_format)
                .map_err(SyncError::Config)?;

            if self.workbook.sheet_mut(&name).is_none() {
                tracing::warn!("Sheet {} not found", name);
                continue;
            }
            resolved.push((day, name));
        }

        Ok(resolved)
    }

    /// Append a block for every day of the window to the overview.
    pub fn append_overview(&mut self) -> SyncResult<()> {
        let (config, session) = (self.config, self.session);
        self.overview_sheet()?;

        for (day, name) in self.day_sheets()? {
            let sheet = self.sheet(&name)?;
            let records = DaySync::new(sheet, &config.day_sheet, day, session).source_records()?;

            let overview = self.overview_sheet()?;
            OverviewMaterializer::new(overview, &config.overview).append(day, &records)?;
        }

        Ok(())
    }

    pub fn clear_overview(&mut self) -> SyncResult<()> {
        let config = self.config;
        let overview = self.overview_sheet()?;
        OverviewMaterializer::new(overview, &config.overview).clear()
    }

    /// Rebuild the overview from scratch.
    pub fn sync_overview(&mut self) -> SyncResult<()> {
        self.clear_overview()?;
        self.append_overview()
    }

    /// Reconcile the calendars with every day of the window.
    pub fn sync_calendars<C: CalendarService>(
        &mut self,
        service: &mut C,
    ) -> SyncResult<Vec<SyncedRecord>> {
        let (config, session) = (self.config, self.session);
        let base_url = self.workbook.url();
        let mut synced = Vec::new();

        for (day, name) in self.day_sheets()? {
            let sheet = self.sheet(&name)?;
            let day_synced = DaySync::new(sheet, &config.day_sheet, day, session)
                .sync_calendar(service, base_url.as_deref())?;

            tracing::info!("Synced {} events of sheet {}", day_synced.len(), name);
            synced.extend(day_synced);
        }

        Ok(synced)
    }

    fn overview_sheet(&mut self) -> SyncResult<&mut W::Sheet> {
        let config = self.config;
        self.sheet(&config.overview.sheet_name)
    }

    fn sheet(&mut self, name: &str) -> SyncResult<&mut W::Sheet> {
        self.workbook
            .sheet_mut(name)
            .ok_or_else(|| SyncError::Lookup(format!("Could not find sheet {}", name)))
    }
}
