//! The overview sheet: a read-only projection of the window's records,
//! one block of rows per day.

use chrono::{NaiveDate, NaiveTime};

use crate::cell::CellValue;
use crate::config::OverviewConfig;
use crate::dates;
use crate::error::{SyncError, SyncResult};
use crate::record::SourceRecord;
use crate::store::Sheet;

/// Height of the row separating two days.
pub const DELIMITER_ROW_HEIGHT: u32 = 8;

pub const DELIMITER_BACKGROUND: &str = "#cccccc";

pub struct OverviewMaterializer<'a, S: Sheet> {
    sheet: &'a mut S,
    config: &'a OverviewConfig,
}

impl<'a, S: Sheet> OverviewMaterializer<'a, S> {
    pub fn new(sheet: &'a mut S, config: &'a OverviewConfig) -> Self {
        OverviewMaterializer { sheet, config }
    }

    /// Delete every row below the header.
    pub fn clear(&mut self) -> SyncResult<()> {
        let schema = &self.config.schema;
        let name = self.sheet.name().to_string();
        tracing::info!("[sheet={}] Clearing sheet", name);

        let Some(last) = self.sheet.max_rows().checked_sub(1) else {
            tracing::info!("[sheet={}] Nothing to do to clear sheet", name);
            return Ok(());
        };
        let y_end = schema.y_end.map_or(last, |y_end| y_end.min(last));

        if y_end < schema.y_start {
            tracing::info!("[sheet={}] Nothing to do to clear sheet", name);
            return Ok(());
        }

        tracing::info!(
            "[sheet={}] Deleting rows {}-{}",
            name,
            schema.y_start + 1,
            y_end + 1
        );
        self.sheet.delete_rows(schema.y_start, y_end - schema.y_start + 1)
    }

    /// Append the records of `day` after the last row, preceded by a
    /// delimiter row.
    pub fn append(&mut self, day: NaiveDate, records: &[SourceRecord]) -> SyncResult<()> {
        let schema = &self.config.schema;
        let name = self.sheet.name().to_string();

        if records.is_empty() {
            tracing::warn!("[sheet={}] No events to sync", name);
            return Ok(());
        }

        tracing::info!(
            "[sheet={}] Adding {} events for {}",
            name,
            records.len(),
            dates::format_day(day)
        );

        if let Some(stray) = records.iter().find(|r| r.day != day) {
            return Err(SyncError::Consistency(format!(
                "[sheet={}] Source event '{}' is on {} instead of {}",
                name,
                stray.name,
                dates::format_day(stray.day),
                dates::format_day(day)
            )));
        }

        let old_rows = self.sheet.max_rows();
        if old_rows < schema.y_start {
            return Err(SyncError::Consistency(format!(
                "[sheet={}] Sheet has {} rows, fewer than yStart={}",
                name, old_rows, schema.y_start
            )));
        }

        self.sheet.insert_rows_after(old_rows, records.len() + 1)?;

        let delimiter = old_rows;
        self.sheet.set_row_height(delimiter, DELIMITER_ROW_HEIGHT)?;
        self.sheet.set_row_background(delimiter, DELIMITER_BACKGROUND)?;

        let width = self.width();
        let mut rows: Vec<Vec<CellValue>> = records.iter().map(|r| self.row(r, width)).collect();
        if let Some(first) = rows.first_mut() {
            first[schema.x_start_date] = CellValue::Timestamp(dates::start_of_day(day));
        }

        let first_row = delimiter + 1;
        self.sheet.set_values(first_row, rows)?;
        self.sheet.merge_column(first_row, schema.x_start_date, records.len())
    }

    fn width(&self) -> usize {
        let schema = &self.config.schema;
        [
            schema.x_start_date,
            schema.x_start_time,
            schema.x_end_time,
            schema.x_event_group,
            schema.x_event_name,
            schema.x_location,
        ]
        .into_iter()
        .chain(self.config.attributes.iter().map(|(_, x)| x))
        .map(|x| x + 1)
        .fold(self.sheet.max_columns(), usize::max)
    }

    fn row(&self, record: &SourceRecord, width: usize) -> Vec<CellValue> {
        let schema = &self.config.schema;
        let mut row = vec![CellValue::Empty; width];

        let at = |time: Option<NaiveTime>| {
            CellValue::from(time.map(|t| dates::date_with_time(record.day, t)))
        };
        row[schema.x_start_time] = at(record.start_time);
        row[schema.x_end_time] = at(record.end_time);
        row[schema.x_event_group] = CellValue::text(&record.group);
        row[schema.x_event_name] = CellValue::Text(hyperlink(
            &record.identity.relative_link(),
            &record.name,
        ));
        row[schema.x_location] = CellValue::from(record.location.clone());

        for (label, x) in self.config.attributes.iter() {
            if let Some(value) = record.attribute(label) {
                row[x] = value.clone();
            }
        }

        row
    }
}

/// A `HYPERLINK` formula showing `label` and pointing at `url`.
pub fn hyperlink(url: &str, label: &str) -> String {
    format!(
        "=HYPERLINK(\"{}\", \"{}\")",
        url.replace('"', "\"\""),
        label.replace('"', "\"\"")
    )
}
