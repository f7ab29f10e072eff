//! Reconciliation of one day sheet against its destination calendars.
//!
//! Every read and write of the day's rows happens while the rows are
//! protected so that only the syncing identity can edit them.

use std::collections::BTreeMap;

use chrono::NaiveDate;

use crate::cell::CellValue;
use crate::config::DaySheetConfig;
use crate::error::{SyncError, SyncResult};
use crate::parser::SourceRecordParser;
use crate::reconcile::{ExternalEventReconciler, resolve_destination};
use crate::record::{RowIdentity, SourceRecord, SyncState};
use crate::store::{CalendarService, Protection, Session, Sheet};
use crate::target::{self, Destination};

/// The sync state persisted for one row.
#[derive(Debug, Clone, PartialEq)]
pub struct SyncedRecord {
    pub identity: RowIdentity,
    pub state: SyncState,
}

pub struct DaySync<'a, S: Sheet, U: Session> {
    sheet: &'a mut S,
    config: &'a DaySheetConfig,
    day: NaiveDate,
    session: &'a U,
}

impl<'a, S: Sheet, U: Session> DaySync<'a, S, U> {
    pub fn new(sheet: &'a mut S, config: &'a DaySheetConfig, day: NaiveDate, session: &'a U) -> Self {
        DaySync {
            sheet,
            config,
            day,
            session,
        }
    }

    /// First and last zero-based row of the day's records.
    pub fn row_range(&self) -> SyncResult<(usize, usize)> {
        let schema = &self.config.schema;
        let y_start = schema.y_start;
        let max_rows = self.sheet.max_rows();

        let y_end = match schema.y_end {
            Some(y_end) => y_end,
            None => self.sheet.last_row().checked_sub(1).ok_or_else(|| {
                SyncError::Consistency(format!("Sheet {} is empty", self.sheet.name()))
            })?,
        };

        if y_end < y_start {
            return Err(SyncError::Consistency(format!(
                "Sheet {}: yEnd={} is smaller than yStart={}",
                self.sheet.name(),
                y_end,
                y_start
            )));
        }

        if y_end >= max_rows {
            return Err(SyncError::Consistency(format!(
                "Sheet {}: yEnd={} is outside of the sheet's {} rows",
                self.sheet.name(),
                y_end,
                max_rows
            )));
        }

        Ok((y_start, y_end))
    }

    /// Run `f` over the day's rows while they are protected.
    ///
    /// The protection is removed whatever `f` returns. An error from `f` wins
    /// over an error removing the protection.
    pub fn with_protected_range<T>(
        &mut self,
        f: impl FnOnce(&mut S, usize, usize) -> SyncResult<T>,
    ) -> SyncResult<T> {
        let (y_start, y_end) = self.row_range()?;

        let protection = self.sheet.protect(Protection {
            rows: y_end + 1,
            editors: vec![self.session.effective_user()],
            domain_edit: false,
        })?;
        tracing::debug!("Protected rows 1-{} of sheet {}", y_end + 1, self.sheet.name());

        let result = f(&mut *self.sheet, y_start, y_end);
        let released = self.sheet.remove_protection(protection);

        let value = result?;
        released?;
        Ok(value)
    }

    /// Records of the day, parsed under protection.
    pub fn source_records(&mut self) -> SyncResult<Vec<SourceRecord>> {
        let config = self.config;
        let day = self.day;

        self.with_protected_range(|sheet, y_start, y_end| {
            parse_records(sheet, config, day, y_start, y_end)
        })
    }

    /// Every sync state persisted in the day's rows.
    pub fn all_sync_state(&mut self) -> SyncResult<Vec<SyncedRecord>> {
        let x_state = self.config.schema.x_calendar_sync_data;

        self.with_protected_range(|sheet, y_start, y_end| {
            let sheet_id = sheet.sheet_id();
            let rows = sheet.values(y_start, y_end)?;

            let mut states = Vec::new();
            for (offset, row) in rows.iter().enumerate() {
                let Some(content) = row.get(x_state).and_then(CellValue::as_text) else {
                    continue;
                };

                let y = y_start + offset;
                let state = SyncState::decode(&content)
                    .map_err(|e| SyncError::invalid_row(sheet.name(), y, e.to_string()))?;

                states.push(SyncedRecord {
                    identity: RowIdentity {
                        sheet_id,
                        row: y,
                        offset,
                    },
                    state,
                });
            }
            Ok(states)
        })
    }

    /// Create or update the external events of every record of the day and
    /// persist their ids in the rows.
    pub fn sync_calendar<C: CalendarService>(
        &mut self,
        service: &mut C,
        base_url: Option<&str>,
    ) -> SyncResult<Vec<SyncedRecord>> {
        let config = self.config;
        let day = self.day;

        let destinations = config
            .destinations
            .iter()
            .map(|name| Ok((name.clone(), resolve_destination(&*service, name)?)))
            .collect::<SyncResult<BTreeMap<String, Destination>>>()?;

        self.with_protected_range(|sheet, y_start, y_end| {
            let records = parse_records(sheet, config, day, y_start, y_end)?;
            tracing::info!(
                "Syncing {} events of sheet {} to calendars",
                records.len(),
                sheet.name()
            );

            let mut reconciler = ExternalEventReconciler::new(service);
            let mut synced = Vec::with_capacity(records.len());

            for record in records {
                let Some(names) = config.destinations_for(&record.group) else {
                    tracing::warn!(
                        "[sheet={}, row={}] Unrecognized event group '{}': event will be skipped",
                        sheet.name(),
                        record.identity.row + 1,
                        record.group
                    );
                    continue;
                };

                let mut fresh = SyncState::new();
                for name in names {
                    let destination = destinations.get(name).ok_or_else(|| {
                        SyncError::Config(format!(
                            "Group '{}' routes to unknown calendar '{}'",
                            record.group, name
                        ))
                    })?;

                    let spec = target::compute(&record, destination, base_url)?;
                    let id = reconciler.reconcile(&spec)?;
                    fresh.insert(name.as_str(), id);
                }

                let state = record.sync_state.clone().unwrap_or_default().merge(fresh);
                sheet.set_value(
                    record.identity.row,
                    config.schema.x_calendar_sync_data,
                    CellValue::Text(state.encode()),
                )?;

                synced.push(SyncedRecord {
                    identity: record.identity,
                    state,
                });
            }

            Ok(synced)
        })
    }
}

fn parse_records<S: Sheet>(
    sheet: &S,
    config: &DaySheetConfig,
    day: NaiveDate,
    y_start: usize,
    y_end: usize,
) -> SyncResult<Vec<SourceRecord>> {
    let rows = sheet.values(y_start, y_end)?;
    let parser = SourceRecordParser::new(
        sheet.name(),
        sheet.sheet_id(),
        day,
        &config.schema,
        &config.attributes,
    );
    parser.records(&rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SyncConfig;
    use crate::config::tests::SAMPLE_JSON;
    use crate::memory::{MemoryCalendarService, MemorySheet, StaticSession};
    use crate::parser::tests::row;
    use crate::store::EventTiming;

    fn config() -> DaySheetConfig {
        SyncConfig::from_json(SAMPLE_JSON).unwrap().day_sheet
    }

    fn day() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 3, 10).unwrap()
    }

    fn session() -> StaticSession {
        StaticSession("owner@example.com".into())
    }

    fn header() -> Vec<CellValue> {
        ["Start", "End", "Group", "Name", "Location", "Sync", "State", "Notes", "Agenda"]
            .into_iter()
            .map(CellValue::text)
            .collect()
    }

    fn sheet(rows: Vec<Vec<CellValue>>) -> MemorySheet {
        let mut all = vec![header()];
        all.extend(rows);
        MemorySheet::with_rows("3/10 Mon", 7, all)
    }

    fn state_cell(sheet: &MemorySheet, y: usize) -> CellValue {
        sheet.cell(y, 6)
    }

    #[test]
    fn test_standup_creates_event_and_persists_state() {
        let config = config();
        let session = session();
        let mut service = MemoryCalendarService::with_calendars(&["Team", "Personal"]);
        let mut sheet = sheet(vec![row("09:00", "09:15", "work", "Standup", true)]);

        let synced = DaySync::new(&mut sheet, &config, day(), &session)
            .sync_calendar(&mut service, None)
            .unwrap();

        assert_eq!(synced.len(), 1);
        let id = synced[0].state.get("Team").unwrap().to_string();

        let team = service.calendars_by_name("Team").unwrap().remove(0);
        let event = service.event(&team, &id).unwrap();
        assert_eq!(event.title, "Standup");
        assert!(matches!(event.timing, EventTiming::Timed { .. }));
        assert_eq!(
            event.description.as_deref(),
            Some("# SOURCE\n#gid=7&range=2:2")
        );

        assert_eq!(state_cell(&sheet, 1), CellValue::Text(format!(r#"{{"Team":"{}"}}"#, id)));
        assert!(sheet.protections.is_empty(), "protection must be released");
    }

    #[test]
    fn test_rerun_writes_nothing_to_the_calendar() {
        let config = config();
        let session = session();
        let mut service = MemoryCalendarService::with_calendars(&["Team", "Personal"]);
        let mut sheet = sheet(vec![row("09:00", "09:15", "work", "Standup", true)]);

        let first = DaySync::new(&mut sheet, &config, day(), &session)
            .sync_calendar(&mut service, None)
            .unwrap();
        let writes = service.mutations().len();

        let second = DaySync::new(&mut sheet, &config, day(), &session)
            .sync_calendar(&mut service, None)
            .unwrap();

        assert_eq!(first, second);
        assert_eq!(service.mutations().len(), writes, "re-run must not write");
        assert_eq!(service.created_count(), 1);
    }

    #[test]
    fn test_all_day_record_fans_out_to_every_destination() {
        let config = config();
        let session = session();
        let mut service = MemoryCalendarService::with_calendars(&["Team", "Personal"]);
        let mut sheet = sheet(vec![row("", "", "home", "Offsite", true)]);

        let synced = DaySync::new(&mut sheet, &config, day(), &session)
            .sync_calendar(&mut service, None)
            .unwrap();

        let state = &synced[0].state;
        assert_eq!(state.len(), 2);

        for name in ["Team", "Personal"] {
            let events = service.events_named(name);
            assert_eq!(events.len(), 1, "one event in {}", name);
            assert_eq!(
                events[0].timing,
                EventTiming::AllDay {
                    start: day(),
                    end: day()
                }
            );
            assert_eq!(state.get(name), Some(events[0].id.as_str()));
        }
    }

    #[test]
    fn test_unchecked_and_unknown_group_rows_are_skipped() {
        let config = config();
        let session = session();
        let mut service = MemoryCalendarService::with_calendars(&["Team", "Personal"]);
        let mut sheet = sheet(vec![
            row("09:00", "10:00", "work", "Draft", false),
            row("09:00", "10:00", "gym", "Squats", true),
        ]);

        let synced = DaySync::new(&mut sheet, &config, day(), &session)
            .sync_calendar(&mut service, None)
            .unwrap();

        assert!(synced.is_empty());
        assert_eq!(service.created_count(), 0);
        assert_eq!(state_cell(&sheet, 1), CellValue::Empty);
        assert_eq!(state_cell(&sheet, 2), CellValue::Empty);
    }

    #[test]
    fn test_prior_state_entries_are_kept() {
        let config = config();
        let session = session();
        let mut service = MemoryCalendarService::with_calendars(&["Team", "Personal"]);

        let mut standup = row("09:00", "09:15", "work", "Standup", true);
        standup[6] = CellValue::text(r#"{"Archive":"a-1"}"#);
        let mut sheet = sheet(vec![standup]);

        let synced = DaySync::new(&mut sheet, &config, day(), &session)
            .sync_calendar(&mut service, None)
            .unwrap();

        let state = &synced[0].state;
        assert_eq!(state.get("Archive"), Some("a-1"));
        assert!(state.get("Team").is_some());
    }

    #[test]
    fn test_missing_calendar_fails_before_touching_rows() {
        let config = config();
        let session = session();
        let mut service = MemoryCalendarService::with_calendars(&["Team"]);
        let mut sheet = sheet(vec![row("09:00", "09:15", "work", "Standup", true)]);

        let err = DaySync::new(&mut sheet, &config, day(), &session)
            .sync_calendar(&mut service, None)
            .unwrap_err();

        assert!(matches!(err, SyncError::Lookup(_)), "got {:?}", err);
        assert_eq!(service.created_count(), 0);
        assert_eq!(state_cell(&sheet, 1), CellValue::Empty);
    }

    #[test]
    fn test_protection_is_held_during_and_released_on_error() {
        let config = config();
        let session = session();
        let mut service = MemoryCalendarService::with_calendars(&["Team", "Personal"]);
        let mut sheet = sheet(vec![
            row("09:00", "09:15", "work", "Standup", true),
            row("later", "10:00", "work", "Broken", true),
        ]);

        let mut day_sync = DaySync::new(&mut sheet, &config, day(), &session);
        day_sync
            .with_protected_range(|sheet, y_start, y_end| {
                assert_eq!((y_start, y_end), (1, 2));
                assert_eq!(sheet.protections.len(), 1);
                let (_, protection) = &sheet.protections[0];
                assert_eq!(protection.rows, 3);
                assert_eq!(protection.editors, vec!["owner@example.com".to_string()]);
                assert!(!protection.domain_edit);
                Ok(())
            })
            .unwrap();

        let err = day_sync.sync_calendar(&mut service, None).unwrap_err();
        assert!(matches!(err, SyncError::InvalidRow { row: 3, .. }), "got {:?}", err);
        assert!(sheet.protections.is_empty(), "protection must be released on error");
    }

    #[test]
    fn test_dangling_event_id_is_a_lookup_error() {
        let config = config();
        let session = session();
        let mut service = MemoryCalendarService::with_calendars(&["Team", "Personal"]);
        let mut sheet = sheet(vec![row("09:00", "09:15", "work", "Standup", true)]);

        let synced = DaySync::new(&mut sheet, &config, day(), &session)
            .sync_calendar(&mut service, None)
            .unwrap();
        let id = synced[0].state.get("Team").unwrap().to_string();
        let team = service.calendars_by_name("Team").unwrap().remove(0);
        service.remove_event(&team, &id);
        let persisted = state_cell(&sheet, 1);

        let err = DaySync::new(&mut sheet, &config, day(), &session)
            .sync_calendar(&mut service, None)
            .unwrap_err();

        assert!(matches!(err, SyncError::Lookup(_)), "got {:?}", err);
        assert_eq!(service.created_count(), 1, "event must not be recreated");
        assert_eq!(state_cell(&sheet, 1), persisted);
        assert!(sheet.protections.is_empty(), "protection must be released on error");
    }

    #[test]
    fn test_row_range_bounds() {
        let mut config = config();
        let session = session();
        let mut sheet = sheet(vec![row("", "", "work", "Only", true)]);

        config.schema.y_end = Some(5);
        let err = DaySync::new(&mut sheet, &config, day(), &session)
            .source_records()
            .unwrap_err();
        assert!(matches!(err, SyncError::Consistency(_)), "got {:?}", err);

        config.schema.y_end = None;
        config.schema.y_start = 3;
        let err = DaySync::new(&mut sheet, &config, day(), &session)
            .source_records()
            .unwrap_err();
        assert!(matches!(err, SyncError::Consistency(_)), "got {:?}", err);
        assert!(sheet.protections.is_empty());
    }

    #[test]
    fn test_all_sync_state_reads_persisted_rows() {
        let config = config();
        let session = session();
        let mut first = row("", "", "work", "A", true);
        first[6] = CellValue::text(r#"{"Team":"evt-1"}"#);
        let second = row("", "", "work", "B", true);
        let mut sheet = sheet(vec![first, second]);

        let states = DaySync::new(&mut sheet, &config, day(), &session)
            .all_sync_state()
            .unwrap();

        assert_eq!(states.len(), 1);
        assert_eq!(states[0].identity.row, 1);
        assert_eq!(states[0].state.get("Team"), Some("evt-1"));
    }
}
