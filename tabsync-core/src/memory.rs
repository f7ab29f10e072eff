//! In-memory implementations of the service traits.
//!
//! Used by the test suite and by front ends that keep a workbook in a local
//! file. The workbook types serialize, so a whole workbook can be saved and
//! loaded as JSON.

use std::time::Duration;

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use crate::cell::CellValue;
use crate::error::{SyncError, SyncResult};
use crate::store::{
    CalendarId, CalendarService, EventMutation, EventTiming, ExternalEvent, Protection,
    ProtectionId, ScriptLock, Session, Sheet, Workbook,
};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MemoryRow {
    pub cells: Vec<CellValue>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub height: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub background: Option<String>,
}

/// A merged block of `count` cells in column `x`, starting at row `y`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Merge {
    pub y: usize,
    pub x: usize,
    pub count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemorySheet {
    pub name: String,
    pub sheet_id: u64,
    pub max_columns: usize,
    #[serde(default)]
    pub rows: Vec<MemoryRow>,
    #[serde(default)]
    pub merges: Vec<Merge>,
    #[serde(default)]
    pub protections: Vec<(ProtectionId, Protection)>,
    #[serde(default)]
    next_protection_id: u64,
}

impl MemorySheet {
    pub fn new(name: &str, sheet_id: u64, max_columns: usize) -> Self {
        MemorySheet {
            name: name.to_string(),
            sheet_id,
            max_columns,
            rows: Vec::new(),
            merges: Vec::new(),
            protections: Vec::new(),
            next_protection_id: 1,
        }
    }

    /// Build a sheet from row values; the column count is the widest row.
    pub fn with_rows(name: &str, sheet_id: u64, rows: Vec<Vec<CellValue>>) -> Self {
        let max_columns = rows.iter().map(Vec::len).max().unwrap_or(0);
        let mut sheet = MemorySheet::new(name, sheet_id, max_columns);
        sheet.rows = rows
            .into_iter()
            .map(|cells| MemoryRow {
                cells,
                ..MemoryRow::default()
            })
            .collect();
        sheet
    }

    pub fn cell(&self, y: usize, x: usize) -> CellValue {
        self.rows
            .get(y)
            .and_then(|row| row.cells.get(x))
            .cloned()
            .unwrap_or_default()
    }

    pub fn row(&self, y: usize) -> Option<&MemoryRow> {
        self.rows.get(y)
    }

    fn padded(&self, row: &MemoryRow) -> Vec<CellValue> {
        let mut cells = row.cells.clone();
        cells.resize(self.max_columns.max(cells.len()), CellValue::Empty);
        cells
    }

    fn check_row(&self, y: usize) -> SyncResult<()> {
        if y >= self.rows.len() {
            return Err(SyncError::Store(format!(
                "Row {} is out of bounds for sheet {} with {} rows",
                y + 1,
                self.name,
                self.rows.len()
            )));
        }
        Ok(())
    }
}

impl Sheet for MemorySheet {
    fn name(&self) -> &str {
        &self.name
    }

    fn sheet_id(&self) -> u64 {
        self.sheet_id
    }

    fn max_rows(&self) -> usize {
        self.rows.len()
    }

    fn max_columns(&self) -> usize {
        self.max_columns
    }

    fn last_row(&self) -> usize {
        self.rows
            .iter()
            .rposition(|row| row.cells.iter().any(|cell| !cell.is_blank()))
            .map_or(0, |y| y + 1)
    }

    fn values(&self, y_start: usize, y_end: usize) -> SyncResult<Vec<Vec<CellValue>>> {
        if y_start > y_end {
            return Err(SyncError::Store(format!(
                "Invalid range: rows {}-{}",
                y_start + 1,
                y_end + 1
            )));
        }
        self.check_row(y_end)?;

        Ok(self.rows[y_start..=y_end]
            .iter()
            .map(|row| self.padded(row))
            .collect())
    }

    fn set_value(&mut self, y: usize, x: usize, value: CellValue) -> SyncResult<()> {
        self.check_row(y)?;

        let cells = &mut self.rows[y].cells;
        if cells.len() <= x {
            cells.resize(x + 1, CellValue::Empty);
        }
        cells[x] = value;
        self.max_columns = self.max_columns.max(x + 1);
        Ok(())
    }

    fn set_values(&mut self, y: usize, rows: Vec<Vec<CellValue>>) -> SyncResult<()> {
        if rows.is_empty() {
            return Ok(());
        }
        self.check_row(y + rows.len() - 1)?;

        for (offset, cells) in rows.into_iter().enumerate() {
            self.max_columns = self.max_columns.max(cells.len());
            self.rows[y + offset].cells = cells;
        }
        Ok(())
    }

    fn insert_rows_after(&mut self, after: usize, count: usize) -> SyncResult<()> {
        if after > self.rows.len() {
            return Err(SyncError::Store(format!(
                "Cannot insert after row {} of sheet {} with {} rows",
                after,
                self.name,
                self.rows.len()
            )));
        }

        for _ in 0..count {
            self.rows.insert(after, MemoryRow::default());
        }

        for merge in &mut self.merges {
            if merge.y >= after {
                merge.y += count;
            }
        }
        Ok(())
    }

    fn delete_rows(&mut self, y: usize, count: usize) -> SyncResult<()> {
        if count == 0 {
            return Ok(());
        }
        self.check_row(y + count - 1)?;

        self.rows.drain(y..y + count);

        let end = y + count;
        self.merges.retain(|m| m.y + m.count <= y || m.y >= end);
        for merge in &mut self.merges {
            if merge.y >= end {
                merge.y -= count;
            }
        }
        Ok(())
    }

    fn set_row_height(&mut self, y: usize, height: u32) -> SyncResult<()> {
        self.check_row(y)?;
        self.rows[y].height = Some(height);
        Ok(())
    }

    fn set_row_background(&mut self, y: usize, color: &str) -> SyncResult<()> {
        self.check_row(y)?;
        self.rows[y].background = Some(color.to_string());
        Ok(())
    }

    fn merge_column(&mut self, y: usize, x: usize, count: usize) -> SyncResult<()> {
        if count == 0 {
            return Ok(());
        }
        self.check_row(y + count - 1)?;
        self.merges.push(Merge { y, x, count });
        Ok(())
    }

    fn protect(&mut self, protection: Protection) -> SyncResult<ProtectionId> {
        let id = ProtectionId(self.next_protection_id);
        self.next_protection_id += 1;
        self.protections.push((id, protection));
        Ok(id)
    }

    fn remove_protection(&mut self, id: ProtectionId) -> SyncResult<()> {
        let before = self.protections.len();
        self.protections.retain(|(p, _)| *p != id);

        if self.protections.len() == before {
            return Err(SyncError::Store(format!(
                "No protection {} on sheet {}",
                id.0, self.name
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MemoryWorkbook {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default)]
    pub sheets: Vec<MemorySheet>,
}

impl MemoryWorkbook {
    pub fn new() -> Self {
        MemoryWorkbook::default()
    }

    pub fn add_sheet(&mut self, sheet: MemorySheet) {
        self.sheets.push(sheet);
    }

    pub fn sheet(&self, name: &str) -> Option<&MemorySheet> {
        self.sheets.iter().find(|s| s.name == name)
    }
}

impl Workbook for MemoryWorkbook {
    type Sheet = MemorySheet;

    fn url(&self) -> Option<String> {
        self.url.clone()
    }

    fn sheet_mut(&mut self, name: &str) -> Option<&mut MemorySheet> {
        self.sheets.iter_mut().find(|s| s.name == name)
    }
}

#[derive(Debug, Clone)]
struct MemoryCalendar {
    id: CalendarId,
    name: String,
    events: Vec<ExternalEvent>,
}

/// Calendar service keeping events in memory and logging every write.
#[derive(Debug, Clone, Default)]
pub struct MemoryCalendarService {
    calendars: Vec<MemoryCalendar>,
    mutations: Vec<(CalendarId, String, EventMutation)>,
    created: usize,
    next_event_id: u64,
}

impl MemoryCalendarService {
    pub fn with_calendars(names: &[&str]) -> Self {
        let mut service = MemoryCalendarService::default();
        for name in names {
            service.add_calendar(name);
        }
        service
    }

    pub fn add_calendar(&mut self, name: &str) -> CalendarId {
        let id = CalendarId(format!("cal-{}", self.calendars.len() + 1));
        self.calendars.push(MemoryCalendar {
            id: id.clone(),
            name: name.to_string(),
            events: Vec::new(),
        });
        id
    }

    pub fn event(&self, calendar: &CalendarId, id: &str) -> Option<ExternalEvent> {
        self.calendar(calendar)
            .ok()
            .and_then(|c| c.events.iter().find(|e| e.id == id).cloned())
    }

    /// Events of the first calendar called `name`.
    pub fn events_named(&self, name: &str) -> Vec<ExternalEvent> {
        self.calendars
            .iter()
            .find(|c| c.name == name)
            .map(|c| c.events.clone())
            .unwrap_or_default()
    }

    /// Every write applied to existing events, in order.
    pub fn mutations(&self) -> &[(CalendarId, String, EventMutation)] {
        &self.mutations
    }

    pub fn created_count(&self) -> usize {
        self.created
    }

    /// Drop an event behind the engine's back.
    pub fn remove_event(&mut self, calendar: &CalendarId, id: &str) {
        if let Ok(c) = self.calendar_mut(calendar) {
            c.events.retain(|e| e.id != id);
        }
    }

    fn calendar(&self, id: &CalendarId) -> SyncResult<&MemoryCalendar> {
        self.calendars
            .iter()
            .find(|c| &c.id == id)
            .ok_or_else(|| SyncError::Lookup(format!("Unknown calendar {}", id.0)))
    }

    fn calendar_mut(&mut self, id: &CalendarId) -> SyncResult<&mut MemoryCalendar> {
        self.calendars
            .iter_mut()
            .find(|c| &c.id == id)
            .ok_or_else(|| SyncError::Lookup(format!("Unknown calendar {}", id.0)))
    }
}

impl CalendarService for MemoryCalendarService {
    fn calendars_by_name(&self, name: &str) -> SyncResult<Vec<CalendarId>> {
        Ok(self
            .calendars
            .iter()
            .filter(|c| c.name == name)
            .map(|c| c.id.clone())
            .collect())
    }

    fn create_event(
        &mut self,
        calendar: &CalendarId,
        title: &str,
        start: NaiveDateTime,
        end: NaiveDateTime,
    ) -> SyncResult<ExternalEvent> {
        self.next_event_id += 1;
        let event = ExternalEvent {
            id: format!("evt-{}", self.next_event_id),
            title: title.to_string(),
            timing: EventTiming::Timed { start, end },
            location: None,
            description: None,
            tags: Vec::new(),
        };

        self.calendar_mut(calendar)?.events.push(event.clone());
        self.created += 1;
        Ok(event)
    }

    fn event_by_id(&self, calendar: &CalendarId, id: &str) -> SyncResult<Option<ExternalEvent>> {
        Ok(self
            .calendar(calendar)?
            .events
            .iter()
            .find(|e| e.id == id)
            .cloned())
    }

    fn apply(&mut self, calendar: &CalendarId, id: &str, mutation: EventMutation) -> SyncResult<()> {
        let event = self
            .calendar_mut(calendar)?
            .events
            .iter_mut()
            .find(|e| e.id == id)
            .ok_or_else(|| SyncError::Lookup(format!("Unknown event {}", id)))?;

        event.apply(&mutation);
        self.mutations.push((calendar.clone(), id.to_string(), mutation));
        Ok(())
    }
}

/// A session acting as a fixed identity.
#[derive(Debug, Clone)]
pub struct StaticSession(pub String);

impl Session for StaticSession {
    fn effective_user(&self) -> String {
        self.0.clone()
    }
}

/// Lock held in memory. `held_elsewhere` simulates another process owning it.
#[derive(Debug, Clone, Default)]
pub struct MemoryLock {
    pub held_elsewhere: bool,
    pub held: bool,
    pub releases: usize,
}

impl ScriptLock for MemoryLock {
    fn try_lock(&mut self, _timeout: Duration) -> bool {
        if self.held_elsewhere || self.held {
            return false;
        }
        self.held = true;
        true
    }

    fn release(&mut self) {
        self.held = false;
        self.releases += 1;
    }
}
