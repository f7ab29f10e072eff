//! Projection of a source record onto one destination calendar.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use crate::dates;
use crate::error::{SyncError, SyncResult};
use crate::record::SourceRecord;
use crate::store::CalendarId;

/// Label of the synthetic attribute linking back to the source row.
pub const SOURCE_ATTRIBUTE: &str = "SOURCE";

/// A destination calendar resolved to its service handle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Destination {
    pub name: String,
    pub calendar: CalendarId,
}

/// The event a record should produce in one destination.
#[derive(Debug, Clone, PartialEq)]
pub struct TargetEventSpec {
    pub title: String,
    pub start: NaiveDateTime,
    pub end: NaiveDateTime,
    pub all_day: bool,
    pub location: Option<String>,
    pub description: Option<String>,
    pub destination: Destination,
    pub known_external_id: Option<String>,
}

/// The part of a spec recorded on the external event for change detection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventSnapshot {
    pub title: String,
    pub start: NaiveDateTime,
    pub end: NaiveDateTime,
    pub all_day: bool,
    pub location: Option<String>,
    pub description: Option<String>,
}

impl TargetEventSpec {
    pub fn snapshot(&self) -> EventSnapshot {
        EventSnapshot {
            title: self.title.clone(),
            start: self.start,
            end: self.end,
            all_day: self.all_day,
            location: self.location.clone(),
            description: self.description.clone(),
        }
    }
}

/// Render labelled values as `# label` headings followed by the value.
pub fn make_description<'a>(fields: impl IntoIterator<Item = (&'a str, String)>) -> String {
    fields
        .into_iter()
        .map(|(label, value)| format!("# {}\n{}", label, value))
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// Compute the event `record` should produce in `destination`.
///
/// `base_url` is the workbook URL used for the back-link; without one the
/// link is the bare row fragment.
pub fn compute(
    record: &SourceRecord,
    destination: &Destination,
    base_url: Option<&str>,
) -> SyncResult<TargetEventSpec> {
    let (start, end, all_day) = match (record.start_time, record.end_time) {
        (None, None) => (
            dates::start_of_day(record.day),
            dates::end_of_day(record.last_day()),
            true,
        ),
        (Some(start_time), Some(end_time)) => (
            dates::date_with_time(record.day, start_time),
            dates::date_with_time(record.last_day(), end_time),
            false,
        ),
        (start_time, end_time) => {
            return Err(SyncError::Config(format!(
                "startTime={:?} and endTime={:?} must either both be empty or present",
                start_time, end_time
            )));
        }
    };

    let source_link = record.identity.link(base_url);
    let fields = record
        .attributes
        .iter()
        .map(|(label, value)| (label.as_str(), value.to_string()))
        .chain(std::iter::once((SOURCE_ATTRIBUTE, source_link)));

    Ok(TargetEventSpec {
        title: record.name.clone(),
        start,
        end,
        all_day,
        location: record.location.clone().filter(|l| !l.is_empty()),
        description: Some(make_description(fields)),
        destination: destination.clone(),
        known_external_id: record
            .sync_state
            .as_ref()
            .and_then(|state| state.get(&destination.name))
            .map(String::from),
    })
}
