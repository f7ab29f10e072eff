//! Calendar service over a directory of `.ics` files.
//!
//! Layout: one subdirectory per calendar, named after the calendar, holding
//! one `<event id>.ics` file per event.
//!
//! ```text
//! calendars/
//!   Team/
//!     0b7c...e1.ics
//!   Personal/
//! ```

use std::path::{Path, PathBuf};

use chrono::{Duration, NaiveDateTime};
use icalendar::{
    Calendar, CalendarDateTime, Component, DatePerhapsTime, EventLike, Property, ValueType,
    parser::{read_calendar, unfold},
};

use crate::error::{SyncError, SyncResult};
use crate::store::{CalendarId, CalendarService, EventMutation, EventTiming, ExternalEvent};

/// Property carrying one tag as `key=hex(value)`.
const TAG_PROPERTY: &str = "X-TABSYNC-TAG";

pub struct IcsCalendarService {
    root: PathBuf,
}

impl IcsCalendarService {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        IcsCalendarService { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Create the directory of calendar `name` if it does not exist yet.
    pub fn create_calendar(&self, name: &str) -> SyncResult<CalendarId> {
        if name.is_empty() || name.contains(['/', '\\']) || name.starts_with('.') {
            return Err(SyncError::InvalidInput(format!(
                "Invalid calendar name '{}'",
                name
            )));
        }
        std::fs::create_dir_all(self.root.join(name))?;
        Ok(CalendarId(name.to_string()))
    }

    /// Every event of a calendar, sorted by id.
    pub fn events(&self, calendar: &CalendarId) -> SyncResult<Vec<ExternalEvent>> {
        let mut events = Vec::new();

        for entry in std::fs::read_dir(self.calendar_dir(calendar))? {
            let path = entry?.path();
            if path.extension().is_some_and(|ext| ext == "ics") {
                events.push(read_event(&path)?);
            }
        }

        events.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(events)
    }

    fn calendar_dir(&self, calendar: &CalendarId) -> PathBuf {
        self.root.join(&calendar.0)
    }

    fn event_path(&self, calendar: &CalendarId, id: &str) -> Option<PathBuf> {
        if id.is_empty() || id.contains(['/', '\\']) || id.starts_with('.') {
            return None;
        }
        Some(self.calendar_dir(calendar).join(format!("{}.ics", id)))
    }
}

impl CalendarService for IcsCalendarService {
    fn calendars_by_name(&self, name: &str) -> SyncResult<Vec<CalendarId>> {
        if name.is_empty() || name.contains(['/', '\\']) {
            return Ok(Vec::new());
        }

        if self.root.join(name).is_dir() {
            Ok(vec![CalendarId(name.to_string())])
        } else {
            Ok(Vec::new())
        }
    }

    fn create_event(
        &mut self,
        calendar: &CalendarId,
        title: &str,
        start: NaiveDateTime,
        end: NaiveDateTime,
    ) -> SyncResult<ExternalEvent> {
        let event = ExternalEvent {
            id: uuid::Uuid::new_v4().to_string(),
            title: title.to_string(),
            timing: EventTiming::Timed { start, end },
            location: None,
            description: None,
            tags: Vec::new(),
        };

        let path = self
            .event_path(calendar, &event.id)
            .ok_or_else(|| SyncError::Store(format!("Invalid event id {}", event.id)))?;
        write_event(&path, &event)?;

        tracing::debug!("Wrote {}", path.display());
        Ok(event)
    }

    fn event_by_id(&self, calendar: &CalendarId, id: &str) -> SyncResult<Option<ExternalEvent>> {
        match self.event_path(calendar, id) {
            Some(path) if path.is_file() => read_event(&path).map(Some),
            _ => Ok(None),
        }
    }

    fn apply(&mut self, calendar: &CalendarId, id: &str, mutation: EventMutation) -> SyncResult<()> {
        let path = self
            .event_path(calendar, id)
            .filter(|p| p.is_file())
            .ok_or_else(|| SyncError::Lookup(format!("No event {} in calendar {}", id, calendar.0)))?;

        let mut event = read_event(&path)?;
        event.apply(&mutation);
        write_event(&path, &event)
    }
}

fn write_event(path: &Path, event: &ExternalEvent) -> SyncResult<()> {
    std::fs::write(path, generate_ics(event))?;
    Ok(())
}

fn read_event(path: &Path) -> SyncResult<ExternalEvent> {
    let content = std::fs::read_to_string(path)?;
    parse_ics(&content)
        .ok_or_else(|| SyncError::Store(format!("Invalid calendar file {}", path.display())))
}

/// Render an event as a single-event calendar.
pub fn generate_ics(event: &ExternalEvent) -> String {
    let mut cal = Calendar::new();

    let mut ics_event = icalendar::Event::new();
    ics_event.uid(&event.id);
    ics_event.summary(&event.title);

    match event.timing {
        EventTiming::AllDay { start, end } => {
            // DTEND of an all-day event is exclusive
            add_date_property(&mut ics_event, "DTSTART", start);
            add_date_property(&mut ics_event, "DTEND", end + Duration::days(1));
        }
        EventTiming::Timed { start, end } => {
            ics_event.add_property("DTSTART", start.format("%Y%m%dT%H%M%S").to_string());
            ics_event.add_property("DTEND", end.format("%Y%m%dT%H%M%S").to_string());
        }
    }

    if let Some(ref location) = event.location {
        ics_event.location(location);
    }

    if let Some(ref description) = event.description {
        ics_event.description(description);
    }

    for (key, value) in &event.tags {
        let prop = Property::new(TAG_PROPERTY, format!("{}={}", key, hex::encode(value)));
        ics_event.append_multi_property(prop);
    }

    cal.push(ics_event.done());
    let cal = cal.done();

    cal.to_string()
        .lines()
        .filter(|line| *line != "CALSCALE:GREGORIAN")
        .map(|line| {
            if line.starts_with("PRODID:") {
                "PRODID:TABSYNC"
            } else {
                line
            }
        })
        .fold(String::new(), |mut out, line| {
            out.push_str(line);
            out.push_str("\r\n");
            out
        })
}

/// Parse the first event of an `.ics` document.
pub fn parse_ics(content: &str) -> Option<ExternalEvent> {
    let unfolded = unfold(content);
    let calendar = read_calendar(&unfolded).ok()?;
    let vevent = calendar.components.iter().find(|c| c.name == "VEVENT")?;

    let text = |name: &str| vevent.find_prop(name).map(|p| unescape(p.val.as_ref()));

    let id = vevent.find_prop("UID")?.val.to_string();
    let start = DatePerhapsTime::try_from(vevent.find_prop("DTSTART")?).ok()?;
    let end = DatePerhapsTime::try_from(vevent.find_prop("DTEND")?).ok()?;

    let timing = match (start, end) {
        (DatePerhapsTime::Date(start), DatePerhapsTime::Date(end)) => EventTiming::AllDay {
            start,
            end: (end - Duration::days(1)).max(start),
        },
        (DatePerhapsTime::DateTime(start), DatePerhapsTime::DateTime(end)) => EventTiming::Timed {
            start: naive(start),
            end: naive(end),
        },
        _ => return None,
    };

    let tags = vevent
        .properties
        .iter()
        .filter(|p| p.name == TAG_PROPERTY)
        .filter_map(|p| {
            let (key, value) = p.val.as_ref().split_once('=')?;
            let value = String::from_utf8(hex::decode(value).ok()?).ok()?;
            Some((key.to_string(), value))
        })
        .collect();

    Some(ExternalEvent {
        id,
        title: text("SUMMARY").unwrap_or_default(),
        timing,
        location: text("LOCATION"),
        description: text("DESCRIPTION"),
        tags,
    })
}

fn add_date_property(ics_event: &mut icalendar::Event, name: &str, date: chrono::NaiveDate) {
    let mut prop = Property::new(name, date.format("%Y%m%d").to_string());
    prop.append_parameter(ValueType::Date);
    ics_event.append_property(prop);
}

fn naive(dt: CalendarDateTime) -> NaiveDateTime {
    match dt {
        CalendarDateTime::Utc(dt) => dt.naive_utc(),
        CalendarDateTime::Floating(naive) => naive,
        CalendarDateTime::WithTimezone { date_time, .. } => date_time,
    }
}

/// Undo RFC 5545 TEXT escaping.
fn unescape(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let mut chars = value.chars();

    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') | Some('N') => out.push('\n'),
            Some(other) => out.push(other),
            None => out.push('\\'),
        }
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn at(d: u32, h: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2025, 3, d)
            .unwrap()
            .and_hms_opt(h, 0, 0)
            .unwrap()
    }

    #[test]
    fn test_calendar_lookup_by_directory() {
        let dir = tempfile::tempdir().unwrap();
        let service = IcsCalendarService::new(dir.path());
        service.create_calendar("Team").unwrap();

        assert_eq!(
            service.calendars_by_name("Team").unwrap(),
            vec![CalendarId("Team".into())]
        );
        assert!(service.calendars_by_name("Personal").unwrap().is_empty());
        assert!(service.calendars_by_name("../Team").unwrap().is_empty());
    }

    #[test]
    fn test_create_calendar_rejects_path_names() {
        let dir = tempfile::tempdir().unwrap();
        let service = IcsCalendarService::new(dir.path());

        for name in ["", "../Team", "a/b", ".hidden"] {
            let err = service.create_calendar(name).unwrap_err();
            assert!(matches!(err, SyncError::InvalidInput(_)), "{:?} gave {:?}", name, err);
        }
        assert!(!dir.path().join("a").exists());
    }

    #[test]
    fn test_create_then_update_event_file() {
        let dir = tempfile::tempdir().unwrap();
        let mut service = IcsCalendarService::new(dir.path());
        let team = service.create_calendar("Team").unwrap();

        let created = service.create_event(&team, "placeholder", at(10, 9), at(10, 10)).unwrap();
        assert!(dir.path().join("Team").join(format!("{}.ics", created.id)).is_file());

        for mutation in [
            EventMutation::SetTitle("Standup, daily".into()),
            EventMutation::SetTime(at(10, 9), at(10, 10)),
            EventMutation::SetLocation("Room 1".into()),
            EventMutation::SetDescription("# Notes\nBring notes\n\n# SOURCE\n#gid=7&range=2:2".into()),
            EventMutation::SetTag("event_data".into(), r#"{"title":"Standup; daily"}"#.into()),
        ] {
            service.apply(&team, &created.id, mutation).unwrap();
        }

        let event = service.event_by_id(&team, &created.id).unwrap().unwrap();
        assert_eq!(event.title, "Standup, daily");
        assert_eq!(
            event.timing,
            EventTiming::Timed {
                start: at(10, 9),
                end: at(10, 10)
            }
        );
        assert_eq!(event.location.as_deref(), Some("Room 1"));
        assert_eq!(
            event.description.as_deref(),
            Some("# Notes\nBring notes\n\n# SOURCE\n#gid=7&range=2:2")
        );
        assert_eq!(event.tag("event_data"), Some(r#"{"title":"Standup; daily"}"#));
    }

    #[test]
    fn test_all_day_dates_are_inclusive() {
        let dir = tempfile::tempdir().unwrap();
        let mut service = IcsCalendarService::new(dir.path());
        let team = service.create_calendar("Team").unwrap();
        let created = service.create_event(&team, "Offsite", at(10, 9), at(10, 10)).unwrap();

        let first = NaiveDate::from_ymd_opt(2025, 3, 10).unwrap();
        let last = NaiveDate::from_ymd_opt(2025, 3, 12).unwrap();
        service
            .apply(&team, &created.id, EventMutation::SetAllDayDates(first, last))
            .unwrap();

        let content =
            std::fs::read_to_string(dir.path().join("Team").join(format!("{}.ics", created.id)))
                .unwrap();
        assert!(content.contains("20250313"), "DTEND is exclusive:\n{}", content);

        let event = service.event_by_id(&team, &created.id).unwrap().unwrap();
        assert_eq!(event.timing, EventTiming::AllDay { start: first, end: last });

        service
            .apply(&team, &created.id, EventMutation::SetAllDayDate(first))
            .unwrap();
        let event = service.event_by_id(&team, &created.id).unwrap().unwrap();
        assert_eq!(event.timing, EventTiming::AllDay { start: first, end: first });
    }

    #[test]
    fn test_unknown_event() {
        let dir = tempfile::tempdir().unwrap();
        let mut service = IcsCalendarService::new(dir.path());
        let team = service.create_calendar("Team").unwrap();

        assert_eq!(service.event_by_id(&team, "missing").unwrap(), None);
        assert_eq!(service.event_by_id(&team, "../escape").unwrap(), None);
        assert!(matches!(
            service.apply(&team, "missing", EventMutation::SetTitle("x".into())),
            Err(SyncError::Lookup(_))
        ));
    }

    #[test]
    fn test_events_lists_calendar() {
        let dir = tempfile::tempdir().unwrap();
        let mut service = IcsCalendarService::new(dir.path());
        let team = service.create_calendar("Team").unwrap();

        service.create_event(&team, "a", at(10, 9), at(10, 10)).unwrap();
        service.create_event(&team, "b", at(11, 9), at(11, 10)).unwrap();

        let events = service.events(&team).unwrap();
        assert_eq!(events.len(), 2);
    }

    #[test]
    fn test_unescape() {
        assert_eq!(unescape(r"a\, b\; c\nd\\e"), "a, b; c\nd\\e");
        assert_eq!(unescape("plain"), "plain");
    }
}
