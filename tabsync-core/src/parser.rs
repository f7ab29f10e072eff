//! Turns day sheet rows into [`SourceRecord`]s.

use std::fmt;

use chrono::NaiveDate;

use crate::cell::CellValue;
use crate::config::{AttributeColumns, DaySheetSchema};
use crate::dates;
use crate::error::{SyncError, SyncResult};
use crate::record::{RowIdentity, SourceRecord, SyncState};

/// Why a row was left out of this run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    SyncDisabled,
    MissingGroup,
    MissingName,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::SyncDisabled => write!(f, "Sync is not enabled for event"),
            SkipReason::MissingGroup => write!(f, "Event group missing"),
            SkipReason::MissingName => write!(f, "Event name missing"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ParsedRow {
    Record(SourceRecord),
    Skipped { row: usize, reason: SkipReason },
}

pub struct SourceRecordParser<'a> {
    sheet_name: &'a str,
    sheet_id: u64,
    day: NaiveDate,
    schema: &'a DaySheetSchema,
    attributes: &'a AttributeColumns,
}

impl<'a> SourceRecordParser<'a> {
    pub fn new(
        sheet_name: &'a str,
        sheet_id: u64,
        day: NaiveDate,
        schema: &'a DaySheetSchema,
        attributes: &'a AttributeColumns,
    ) -> Self {
        SourceRecordParser {
            sheet_name,
            sheet_id,
            day,
            schema,
            attributes,
        }
    }

    /// Lazily parse `rows`, the values of the range starting at `schema.y_start`.
    pub fn parse<'r>(
        &'r self,
        rows: &'r [Vec<CellValue>],
    ) -> impl Iterator<Item = SyncResult<ParsedRow>> + 'r {
        rows.iter()
            .enumerate()
            .map(move |(offset, row)| self.parse_row(row, offset))
    }

    /// Parse `rows`, logging skips and keeping only the records.
    pub fn records(&self, rows: &[Vec<CellValue>]) -> SyncResult<Vec<SourceRecord>> {
        self.parse(rows)
            .filter_map(|parsed| match parsed {
                Ok(ParsedRow::Record(record)) => Some(Ok(record)),
                Ok(ParsedRow::Skipped { .. }) => None,
                Err(e) => Some(Err(e)),
            })
            .collect()
    }

    fn parse_row(&self, row: &[CellValue], offset: usize) -> SyncResult<ParsedRow> {
        let schema = self.schema;
        let y = schema.y_start + offset;
        let cell = |x: usize| row.get(x).unwrap_or(&CellValue::Empty);

        let skip = |reason: SkipReason| {
            tracing::warn!(
                "[sheet={}, row={}] {}: event will be skipped",
                self.sheet_name,
                y + 1,
                reason
            );
            Ok(ParsedRow::Skipped { row: y, reason })
        };

        if !cell(schema.x_should_sync).is_checked() {
            return skip(SkipReason::SyncDisabled);
        }

        let Some(group) = cell(schema.x_event_group).as_text() else {
            return skip(SkipReason::MissingGroup);
        };

        let Some(name) = cell(schema.x_event_name).as_text() else {
            return skip(SkipReason::MissingName);
        };

        let invalid = |message: String| SyncError::invalid_row(self.sheet_name, y, message);

        let start_time = dates::parse_optional_time(cell(schema.x_start_time)).map_err(invalid)?;
        let end_time = dates::parse_optional_time(cell(schema.x_end_time)).map_err(invalid)?;

        if start_time.is_some() != end_time.is_some() {
            return Err(invalid(format!(
                "startTime={:?} and endTime={:?} must either both be empty or present",
                start_time, end_time
            )));
        }

        let end_day = match schema.x_end_date {
            Some(x) => dates::parse_optional_date(cell(x)).map_err(invalid)?,
            None => None,
        };

        if end_day.is_some_and(|end| end < self.day) {
            return Err(invalid(format!(
                "End date {} is before the sheet's day {}",
                dates::format_day(end_day.unwrap_or(self.day)),
                dates::format_day(self.day)
            )));
        }

        let attributes = self
            .attributes
            .iter()
            .map(|(label, x)| (label.to_string(), cell(x).clone()))
            .filter(|(_, value)| value.is_truthy())
            .collect();

        let sync_state = match cell(schema.x_calendar_sync_data).as_text() {
            Some(content) => Some(
                SyncState::decode(&content)
                    .map_err(|e| SyncError::invalid_row(self.sheet_name, y, e.to_string()))?,
            ),
            None => None,
        };

        Ok(ParsedRow::Record(SourceRecord {
            day: self.day,
            end_day,
            start_time,
            end_time,
            group,
            name,
            location: cell(schema.x_location).as_text(),
            attributes,
            identity: RowIdentity {
                sheet_id: self.sheet_id,
                row: y,
                offset,
            },
            sync_state,
        }))
    }
}
