//! Date helpers for day sheets and calendar events.

use std::fmt::Write;

use chrono::{DateTime, Datelike, Duration, NaiveDate, NaiveDateTime, NaiveTime, Weekday};

use crate::cell::CellValue;

/// Formats tried, in order, for text cells holding a full date and time.
const DATE_TIME_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M",
    "%Y/%m/%d %H:%M:%S",
    "%Y/%m/%d %H:%M",
];

/// Formats tried, in order, for text cells holding only a time of day.
const TIME_FORMATS: &[&str] = &["%H:%M:%S", "%H:%M", "%I:%M:%S %p", "%I:%M %p", "%I:%M%p"];

/// Parse an optional date/time cell.
///
/// Falsy cells yield `None`. A value that is present but not a date/time is an
/// error: malformed input must stop the sync rather than be dropped.
pub fn parse_optional_date_time(value: &CellValue) -> Result<Option<NaiveDateTime>, String> {
    if !value.is_truthy() {
        return Ok(None);
    }

    match value {
        CellValue::Timestamp(ts) => Ok(Some(*ts)),
        // Numbers are epoch milliseconds
        CellValue::Number(ms) => DateTime::from_timestamp_millis(*ms as i64)
            .map(|dt| Some(dt.naive_utc()))
            .ok_or_else(|| format!("Error parsing date from input '{}'", value)),
        CellValue::Text(s) => parse_date_time_text(s.trim())
            .map(Some)
            .ok_or_else(|| format!("Error parsing date from input '{}'", s)),
        CellValue::Boolean(_) | CellValue::Empty => {
            Err(format!("Error parsing date from input '{}'", value))
        }
    }
}

/// Parse an optional cell down to its time of day.
pub fn parse_optional_time(value: &CellValue) -> Result<Option<NaiveTime>, String> {
    Ok(parse_optional_date_time(value)?.map(|dt| dt.time()))
}

fn parse_date_time_text(s: &str) -> Option<NaiveDateTime> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.naive_local());
    }

    if let Some(dt) = DATE_TIME_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(s, fmt).ok())
    {
        return Some(dt);
    }

    if let Some(date) = ["%Y-%m-%d", "%Y/%m/%d"]
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(s, fmt).ok())
    {
        return Some(start_of_day(date));
    }

    // A bare time is anchored on the epoch day; only its time is ever used
    TIME_FORMATS
        .iter()
        .find_map(|fmt| NaiveTime::parse_from_str(s, fmt).ok())
        .map(|time| NaiveDate::default().and_time(time))
}

/// Parse an optional cell holding a calendar date.
pub fn parse_optional_date(value: &CellValue) -> Result<Option<NaiveDate>, String> {
    Ok(parse_optional_date_time(value)?.map(|dt| dt.date()))
}

pub fn start_of_day(date: NaiveDate) -> NaiveDateTime {
    date.and_time(NaiveTime::MIN)
}

/// Last representable millisecond of the day.
pub fn end_of_day(date: NaiveDate) -> NaiveDateTime {
    date.and_time(NaiveTime::from_hms_milli_opt(23, 59, 59, 999).unwrap_or(NaiveTime::MIN))
}

pub fn date_with_time(date: NaiveDate, time: NaiveTime) -> NaiveDateTime {
    date.and_time(time)
}

/// First day of the week containing `date`.
pub fn start_of_week(date: NaiveDate, week_start: Weekday) -> NaiveDate {
    let offset = (7 + date.weekday().num_days_from_monday() - week_start.num_days_from_monday()) % 7;
    date - Duration::days(i64::from(offset))
}

/// Name of the sheet holding `date`, rendered with a `chrono` format string.
pub fn day_sheet_name(date: NaiveDate, format: &str) -> Result<String, String> {
    let mut name = String::new();
    write!(name, "{}", date.format(format))
        .map_err(|_| format!("Invalid sheet name format '{}'", format))?;
    Ok(name)
}

/// Format a day for log messages.
pub fn format_day(date: NaiveDate) -> String {
    date.format("%Y/%m/%d").to_string()
}
