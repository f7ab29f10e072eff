//! Capability traits for the services the engine talks to.
//!
//! The engine never sees a concrete spreadsheet or calendar. It only needs
//! the handful of operations below, which keeps it testable against the
//! in-memory implementations in [`crate::memory`].

use std::time::Duration;

use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

use crate::cell::CellValue;
use crate::error::SyncResult;

/// Edit protection over the first `rows` rows of a sheet.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Protection {
    pub rows: usize,
    /// The only identities allowed to edit while the protection holds.
    pub editors: Vec<String>,
    pub domain_edit: bool,
}

/// Opaque handle returned by [`Sheet::protect`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ProtectionId(pub u64);

/// A single sheet. Rows (y) and columns (x) are zero-based.
pub trait Sheet {
    fn name(&self) -> &str;

    fn sheet_id(&self) -> u64;

    /// Number of rows in the sheet, including blank ones.
    fn max_rows(&self) -> usize;

    fn max_columns(&self) -> usize;

    /// Number of rows up to and including the last one holding content.
    /// An unchecked checkbox or a `0` is content.
    fn last_row(&self) -> usize;

    /// Values of rows `y_start..=y_end`, each padded to `max_columns`.
    fn values(&self, y_start: usize, y_end: usize) -> SyncResult<Vec<Vec<CellValue>>>;

    fn set_value(&mut self, y: usize, x: usize, value: CellValue) -> SyncResult<()>;

    /// Write a block of rows starting at row `y`, column 0.
    fn set_values(&mut self, y: usize, rows: Vec<Vec<CellValue>>) -> SyncResult<()>;

    /// Insert `count` blank rows after the first `after` rows.
    fn insert_rows_after(&mut self, after: usize, count: usize) -> SyncResult<()>;

    fn delete_rows(&mut self, y: usize, count: usize) -> SyncResult<()>;

    fn set_row_height(&mut self, y: usize, height: u32) -> SyncResult<()>;

    /// Set the background of a whole row and drop any data validation on it.
    fn set_row_background(&mut self, y: usize, color: &str) -> SyncResult<()>;

    /// Merge `count` cells of column `x` starting at row `y`.
    fn merge_column(&mut self, y: usize, x: usize, count: usize) -> SyncResult<()>;

    fn protect(&mut self, protection: Protection) -> SyncResult<ProtectionId>;

    fn remove_protection(&mut self, id: ProtectionId) -> SyncResult<()>;
}

/// A collection of named sheets.
pub trait Workbook {
    type Sheet: Sheet;

    /// Base URL of the workbook, used to build absolute back-links.
    fn url(&self) -> Option<String>;

    fn sheet_mut(&mut self, name: &str) -> Option<&mut Self::Sheet>;
}

/// Handle of a calendar as known to the [`CalendarService`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CalendarId(pub String);

/// When an event happens. All-day ranges are inclusive of both dates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum EventTiming {
    AllDay { start: NaiveDate, end: NaiveDate },
    Timed { start: NaiveDateTime, end: NaiveDateTime },
}

/// An event as stored by the calendar service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExternalEvent {
    pub id: String,
    pub title: String,
    pub timing: EventTiming,
    pub location: Option<String>,
    pub description: Option<String>,
    /// Opaque key/value tags owned by whoever wrote them.
    pub tags: Vec<(String, String)>,
}

impl ExternalEvent {
    pub fn tag(&self, key: &str) -> Option<&str> {
        self.tags
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn set_tag(&mut self, key: &str, value: &str) {
        match self.tags.iter_mut().find(|(k, _)| k == key) {
            Some(entry) => entry.1 = value.to_string(),
            None => self.tags.push((key.to_string(), value.to_string())),
        }
    }

    /// Apply a single mutation in place.
    pub fn apply(&mut self, mutation: &EventMutation) {
        match mutation {
            EventMutation::SetTitle(title) => self.title = title.clone(),
            EventMutation::SetAllDayDate(date) => {
                self.timing = EventTiming::AllDay {
                    start: *date,
                    end: *date,
                }
            }
            EventMutation::SetAllDayDates(start, end) => {
                self.timing = EventTiming::AllDay {
                    start: *start,
                    end: *end,
                }
            }
            EventMutation::SetTime(start, end) => {
                self.timing = EventTiming::Timed {
                    start: *start,
                    end: *end,
                }
            }
            EventMutation::SetLocation(location) => self.location = Some(location.clone()),
            EventMutation::SetDescription(description) => {
                self.description = Some(description.clone())
            }
            EventMutation::SetTag(key, value) => self.set_tag(key, value),
        }
    }
}

/// A single write against an existing external event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum EventMutation {
    SetTitle(String),
    SetAllDayDate(NaiveDate),
    SetAllDayDates(NaiveDate, NaiveDate),
    SetTime(NaiveDateTime, NaiveDateTime),
    SetLocation(String),
    SetDescription(String),
    SetTag(String, String),
}

pub trait CalendarService {
    /// All calendars whose display name is exactly `name`.
    fn calendars_by_name(&self, name: &str) -> SyncResult<Vec<CalendarId>>;

    fn create_event(
        &mut self,
        calendar: &CalendarId,
        title: &str,
        start: NaiveDateTime,
        end: NaiveDateTime,
    ) -> SyncResult<ExternalEvent>;

    /// `None` when no event with that id exists in the calendar.
    fn event_by_id(&self, calendar: &CalendarId, id: &str) -> SyncResult<Option<ExternalEvent>>;

    fn apply(&mut self, calendar: &CalendarId, id: &str, mutation: EventMutation) -> SyncResult<()>;
}

/// The identity the engine acts as.
pub trait Session {
    fn effective_user(&self) -> String;
}

/// Process-wide exclusive lock.
pub trait ScriptLock {
    /// Try to take the lock, waiting at most `timeout`.
    fn try_lock(&mut self, timeout: Duration) -> bool;

    fn release(&mut self);
}
