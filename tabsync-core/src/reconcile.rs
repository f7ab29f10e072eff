//! Create-or-update of external calendar events with change detection.
//!
//! Every event written by the reconciler carries a snapshot of the spec it was
//! last synced from, stored in a tag. A spec equal to that snapshot means the
//! event is already up to date and nothing is written.

use chrono::{Duration, Local};

use crate::error::{SyncError, SyncResult};
use crate::store::{CalendarService, EventMutation, ExternalEvent};
use crate::target::{Destination, EventSnapshot, TargetEventSpec};

/// Tag key holding the serialized [`EventSnapshot`].
pub const TAG_KEY_EVENT_DATA: &str = "event_data";

/// Resolve a destination calendar name to the single calendar carrying it.
pub fn resolve_destination<C: CalendarService>(
    service: &C,
    name: &str,
) -> SyncResult<Destination> {
    let mut calendars = service.calendars_by_name(name)?;

    if calendars.len() != 1 {
        return Err(SyncError::Lookup(format!(
            "Error getting calendar by name={}: expected 1 calendar but {} found",
            name,
            calendars.len()
        )));
    }

    Ok(Destination {
        name: name.to_string(),
        calendar: calendars.remove(0),
    })
}

pub struct ExternalEventReconciler<'a, C: CalendarService> {
    service: &'a mut C,
}

impl<'a, C: CalendarService> ExternalEventReconciler<'a, C> {
    pub fn new(service: &'a mut C) -> Self {
        ExternalEventReconciler { service }
    }

    /// Make the external event match `spec` and return its id.
    ///
    /// A stored id that no longer resolves is an error: recreating the event
    /// silently could leave a duplicate behind.
    pub fn reconcile(&mut self, spec: &TargetEventSpec) -> SyncResult<String> {
        let calendar = &spec.destination.calendar;

        let event = match &spec.known_external_id {
            Some(id) => self.service.event_by_id(calendar, id)?.ok_or_else(|| {
                SyncError::Lookup(format!(
                    "Error getting calendar event by id={} in calendar {}",
                    id, spec.destination.name
                ))
            })?,
            None => self.create_placeholder(spec)?,
        };

        let snapshot = spec.snapshot();

        if last_synced_snapshot(&event).as_ref() == Some(&snapshot) {
            tracing::info!("No updates required for event id={}. Skipping...", event.id);
            return Ok(event.id);
        }

        for mutation in mutations_for(&snapshot)? {
            self.service.apply(calendar, &event.id, mutation)?;
        }

        tracing::info!("Created / updated calendar event id={}", event.id);

        Ok(event.id)
    }

    fn create_placeholder(&mut self, spec: &TargetEventSpec) -> SyncResult<ExternalEvent> {
        let correlation_id = uuid::Uuid::new_v4().to_string();
        let now = Local::now().naive_local();

        let event = self.service.create_event(
            &spec.destination.calendar,
            &correlation_id,
            now,
            now + Duration::hours(1),
        )?;

        tracing::info!(
            "Created new calendar event {{title={}, id={}}}",
            event.title,
            event.id
        );

        Ok(event)
    }
}

/// The snapshot recorded on `event`, if it has a readable one.
pub fn last_synced_snapshot(event: &ExternalEvent) -> Option<EventSnapshot> {
    let raw = event.tag(TAG_KEY_EVENT_DATA)?;

    match serde_json::from_str(raw) {
        Ok(snapshot) => Some(snapshot),
        Err(e) => {
            tracing::warn!("Ignoring unreadable snapshot on event id={}: {}", event.id, e);
            None
        }
    }
}

/// The writes bringing an event in line with `snapshot`, tag last.
///
/// Empty locations and descriptions are never written, so text curated by
/// hand on the calendar side is left alone.
pub fn mutations_for(snapshot: &EventSnapshot) -> SyncResult<Vec<EventMutation>> {
    let mut mutations = vec![EventMutation::SetTitle(snapshot.title.clone())];

    let (start, end) = (snapshot.start, snapshot.end);
    mutations.push(if !snapshot.all_day {
        EventMutation::SetTime(start, end)
    } else if start.date() == end.date() {
        EventMutation::SetAllDayDate(start.date())
    } else {
        EventMutation::SetAllDayDates(start.date(), end.date())
    });

    if let Some(location) = snapshot.location.as_ref().filter(|l| !l.is_empty()) {
        mutations.push(EventMutation::SetLocation(location.clone()));
    }

    if let Some(description) = snapshot.description.as_ref().filter(|d| !d.is_empty()) {
        mutations.push(EventMutation::SetDescription(description.clone()));
    }

    let encoded =
        serde_json::to_string(snapshot).map_err(|e| SyncError::Serialization(e.to_string()))?;
    mutations.push(EventMutation::SetTag(TAG_KEY_EVENT_DATA.to_string(), encoded));

    Ok(mutations)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryCalendarService;
    use crate::store::EventTiming;
    use chrono::{NaiveDate, NaiveDateTime};

    fn at(h: u32, m: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2025, 3, 10)
            .unwrap()
            .and_hms_opt(h, m, 0)
            .unwrap()
    }

    fn spec(service: &MemoryCalendarService) -> TargetEventSpec {
        TargetEventSpec {
            title: "Standup".into(),
            start: at(9, 0),
            end: at(9, 15),
            all_day: false,
            location: None,
            description: Some("# SOURCE\n#gid=1&range=2:2".into()),
            destination: resolve_destination(service, "Team").unwrap(),
            known_external_id: None,
        }
    }

    #[test]
    fn test_creates_and_fills_new_event() {
        let mut service = MemoryCalendarService::with_calendars(&["Team"]);
        let spec = spec(&service);

        let id = ExternalEventReconciler::new(&mut service).reconcile(&spec).unwrap();

        let event = service.event(&spec.destination.calendar, &id).unwrap();
        assert_eq!(event.title, "Standup");
        assert_eq!(
            event.timing,
            EventTiming::Timed {
                start: at(9, 0),
                end: at(9, 15)
            }
        );
        assert_eq!(event.location, None);
        assert_eq!(last_synced_snapshot(&event), Some(spec.snapshot()));
    }

    #[test]
    fn test_unchanged_spec_writes_nothing() {
        let mut service = MemoryCalendarService::with_calendars(&["Team"]);
        let mut spec = spec(&service);

        let id = ExternalEventReconciler::new(&mut service).reconcile(&spec).unwrap();
        let writes_after_first = service.mutations().len();

        spec.known_external_id = Some(id.clone());
        let again = ExternalEventReconciler::new(&mut service).reconcile(&spec).unwrap();

        assert_eq!(again, id);
        assert_eq!(service.mutations().len(), writes_after_first, "re-run must not write");
        assert_eq!(service.created_count(), 1);
    }

    #[test]
    fn test_changed_spec_updates_existing_event() {
        let mut service = MemoryCalendarService::with_calendars(&["Team"]);
        let mut spec = spec(&service);

        let id = ExternalEventReconciler::new(&mut service).reconcile(&spec).unwrap();

        spec.known_external_id = Some(id.clone());
        spec.title = "Standup (moved)".into();
        let again = ExternalEventReconciler::new(&mut service).reconcile(&spec).unwrap();

        assert_eq!(again, id);
        let event = service.event(&spec.destination.calendar, &id).unwrap();
        assert_eq!(event.title, "Standup (moved)");
        assert_eq!(service.created_count(), 1);
    }

    #[test]
    fn test_dangling_id_is_fatal() {
        let mut service = MemoryCalendarService::with_calendars(&["Team"]);
        let mut spec = spec(&service);
        spec.known_external_id = Some("gone".into());

        let err = ExternalEventReconciler::new(&mut service)
            .reconcile(&spec)
            .unwrap_err();
        assert!(matches!(err, SyncError::Lookup(_)), "got {:?}", err);
        assert_eq!(service.created_count(), 0, "must not recreate");
    }

    #[test]
    fn test_empty_location_keeps_curated_value() {
        let mut service = MemoryCalendarService::with_calendars(&["Team"]);
        let mut spec = spec(&service);

        let id = ExternalEventReconciler::new(&mut service).reconcile(&spec).unwrap();
        let calendar = spec.destination.calendar.clone();
        service
            .apply(&calendar, &id, EventMutation::SetLocation("Room by hand".into()))
            .unwrap();

        spec.known_external_id = Some(id.clone());
        spec.title = "Renamed".into();
        ExternalEventReconciler::new(&mut service).reconcile(&spec).unwrap();

        let event = service.event(&calendar, &id).unwrap();
        assert_eq!(event.location.as_deref(), Some("Room by hand"));
    }

    #[test]
    fn test_all_day_mutation_forms() {
        let day = NaiveDate::from_ymd_opt(2025, 3, 10).unwrap();
        let mut snapshot = EventSnapshot {
            title: "Offsite".into(),
            start: crate::dates::start_of_day(day),
            end: crate::dates::end_of_day(day),
            all_day: true,
            location: Some(String::new()),
            description: None,
        };

        let mutations = mutations_for(&snapshot).unwrap();
        assert_eq!(mutations[1], EventMutation::SetAllDayDate(day));
        assert_eq!(mutations.len(), 3, "title, date and tag only: {:?}", mutations);

        let last = NaiveDate::from_ymd_opt(2025, 3, 12).unwrap();
        snapshot.end = crate::dates::end_of_day(last);
        let mutations = mutations_for(&snapshot).unwrap();
        assert_eq!(mutations[1], EventMutation::SetAllDayDates(day, last));
    }

    #[test]
    fn test_destination_must_be_unique() {
        let service = MemoryCalendarService::with_calendars(&["Team", "Team"]);
        assert!(matches!(
            resolve_destination(&service, "Team"),
            Err(SyncError::Lookup(_))
        ));
        assert!(matches!(
            resolve_destination(&service, "Missing"),
            Err(SyncError::Lookup(_))
        ));
    }
}
