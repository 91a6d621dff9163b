use std::sync::Arc;

use chrono::{Duration, NaiveDate};

use crate::models::{AppointmentType, SchedulingError, TimePreference, TimeSlot};
use crate::services::calendar::CalendarStore;

/// At most this many slots go into one offer.
pub const MAX_OFFERED_SLOTS: usize = 5;

/// "ASAP" and re-offer scans give up after this many days.
pub const FORWARD_SCAN_DAYS: i64 = 14;

/// Turns a date, an appointment type, and an optional coarse preference into
/// concrete open slots against the calendar. Read-only; the authoritative
/// overlap check stays in `CalendarStore::commit`.
pub struct AvailabilityResolver {
    calendar: Arc<CalendarStore>,
}

impl AvailabilityResolver {
    pub fn new(calendar: Arc<CalendarStore>) -> Self {
        Self { calendar }
    }

    /// The full tagged grid for one day: contiguous slots of the type's
    /// duration, aligned to opening time, no overlap and no gaps. A slot is
    /// unavailable when it intersects any confirmed booking. Empty when the
    /// clinic is closed that day.
    pub fn slot_grid(
        &self,
        date: NaiveDate,
        appointment_type: AppointmentType,
    ) -> Result<Vec<TimeSlot>, SchedulingError> {
        let hours = match self.calendar.working_hours().for_date(date) {
            Some(h) => h,
            None => return Ok(vec![]),
        };

        let booked = self.calendar.bookings_on(date)?;
        let duration = Duration::minutes(appointment_type.duration_minutes());

        let mut slots = Vec::new();
        let mut start = hours.open;
        loop {
            let end = start + duration;
            if end <= start || end > hours.close {
                break;
            }

            let available = !booked
                .iter()
                .any(|b| start < b.end && b.start < end);

            slots.push(TimeSlot { date, start, end, available });
            start = end;
        }

        Ok(slots)
    }

    /// Open slots to offer for a day: available cells of the grid, filtered
    /// to the preferred time-of-day band when one is given. A band that
    /// matches nothing falls back to the unfiltered set — we widen before
    /// returning zero options while any exist. Capped at the first
    /// `MAX_OFFERED_SLOTS` in chronological order.
    pub fn find_slots(
        &self,
        date: NaiveDate,
        appointment_type: AppointmentType,
        preference: Option<TimePreference>,
    ) -> Result<Vec<TimeSlot>, SchedulingError> {
        let open: Vec<TimeSlot> = self
            .slot_grid(date, appointment_type)?
            .into_iter()
            .filter(|s| s.available)
            .collect();

        let mut chosen: Vec<TimeSlot> = match preference {
            Some(pref) => {
                let in_band: Vec<TimeSlot> = open
                    .iter()
                    .copied()
                    .filter(|s| pref.contains(s.start))
                    .collect();
                if in_band.is_empty() {
                    tracing::debug!(date = %date, band = pref.as_str(), "no slots in preferred band, widening");
                    open
                } else {
                    in_band
                }
            }
            None => open,
        };

        chosen.truncate(MAX_OFFERED_SLOTS);
        Ok(chosen)
    }

    /// Bounded day-by-day forward scan for the first day with at least one
    /// open slot, skipping closed weekdays. Powers "ASAP" requests and
    /// re-offers after a rejection.
    pub fn first_available(
        &self,
        from: NaiveDate,
        appointment_type: AppointmentType,
        preference: Option<TimePreference>,
    ) -> Result<Option<(NaiveDate, Vec<TimeSlot>)>, SchedulingError> {
        for offset in 0..FORWARD_SCAN_DAYS {
            let date = from + Duration::days(offset);
            if self.calendar.working_hours().for_date(date).is_none() {
                continue;
            }
            let slots = self.find_slots(date, appointment_type, preference)?;
            if !slots.is_empty() {
                return Ok(Some((date, slots)));
            }
        }
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;
    use crate::models::{Booking, BookingStatus, Patient, WorkingHours};
    use crate::services::calendar::slot_end;
    use chrono::{NaiveTime, Utc};
    use std::sync::Mutex;
    use uuid::Uuid;

    fn resolver() -> AvailabilityResolver {
        let conn = db::init_db(":memory:").unwrap();
        let store = CalendarStore::new(Arc::new(Mutex::new(conn)), WorkingHours::default());
        AvailabilityResolver::new(Arc::new(store))
    }

    fn d(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    fn t(s: &str) -> NaiveTime {
        NaiveTime::parse_from_str(s, "%H:%M").unwrap()
    }

    fn book(resolver: &AvailabilityResolver, date: &str, start: &str, ty: AppointmentType) {
        let now = Utc::now().naive_utc();
        let start = t(start);
        resolver
            .calendar
            .commit(Booking {
                id: Uuid::new_v4(),
                appointment_type: ty,
                date: d(date),
                start,
                end: slot_end(start, ty),
                patient: Patient {
                    name: "Ada Lovelace".into(),
                    email: "ada@example.com".into(),
                    phone: "555-0100".into(),
                },
                reason: None,
                status: BookingStatus::Confirmed,
                confirmation_code: format!("C{}", start.format("%H%M")),
                created_at: now,
                updated_at: now,
            })
            .unwrap();
    }

    // 2030-06-17 is a Monday, 2030-06-16 a Sunday.

    #[test]
    fn test_full_grid_on_empty_monday() {
        let resolver = resolver();
        let slots = resolver
            .slot_grid(d("2030-06-17"), AppointmentType::General)
            .unwrap();

        // 09:00-17:00 in 30-minute steps: 16 slots, all open
        assert_eq!(slots.len(), 16);
        assert!(slots.iter().all(|s| s.available));
        assert_eq!(slots[0].start, t("09:00"));
        assert_eq!(slots[1].start, t("09:30"));
        assert_eq!(slots[15].start, t("16:30"));
        assert_eq!(slots[15].end, t("17:00"));
    }

    #[test]
    fn test_grid_steps_by_duration() {
        let resolver = resolver();
        let slots = resolver
            .slot_grid(d("2030-06-17"), AppointmentType::Specialist)
            .unwrap();

        // 60-minute slots: 09:00..17:00 -> 8 slots, no gaps
        assert_eq!(slots.len(), 8);
        assert_eq!(slots[0].start, t("09:00"));
        assert_eq!(slots[0].end, t("10:00"));
        assert_eq!(slots[7].start, t("16:00"));

        // 45-minute physicals don't fit evenly: last slot must still end
        // inside hours
        let slots = resolver
            .slot_grid(d("2030-06-17"), AppointmentType::Physical)
            .unwrap();
        assert_eq!(slots.len(), 10);
        assert!(slots.last().unwrap().end <= t("17:00"));
    }

    #[test]
    fn test_closed_day_is_empty() {
        let resolver = resolver();
        let slots = resolver
            .slot_grid(d("2030-06-16"), AppointmentType::General)
            .unwrap();
        assert!(slots.is_empty());
    }

    #[test]
    fn test_booked_interval_marks_slots_unavailable() {
        let resolver = resolver();
        book(&resolver, "2030-06-17", "14:00", AppointmentType::General);

        let slots = resolver
            .slot_grid(d("2030-06-17"), AppointmentType::General)
            .unwrap();
        let at_1400 = slots.iter().find(|s| s.start == t("14:00")).unwrap();
        assert!(!at_1400.available);
        assert_eq!(slots.iter().filter(|s| !s.available).count(), 1);

        // A 60-minute booking shadows two 30-minute cells
        book(&resolver, "2030-06-17", "09:00", AppointmentType::Specialist);
        let slots = resolver
            .slot_grid(d("2030-06-17"), AppointmentType::General)
            .unwrap();
        assert!(!slots[0].available);
        assert!(!slots[1].available);
        assert!(slots[2].available);
    }

    #[test]
    fn test_find_slots_caps_at_five() {
        let resolver = resolver();
        let slots = resolver
            .find_slots(d("2030-06-17"), AppointmentType::General, None)
            .unwrap();
        assert_eq!(slots.len(), MAX_OFFERED_SLOTS);
        assert_eq!(slots[0].start, t("09:00"));
        assert_eq!(slots[4].start, t("11:00"));
    }

    #[test]
    fn test_find_slots_band_filter() {
        let resolver = resolver();
        let slots = resolver
            .find_slots(
                d("2030-06-17"),
                AppointmentType::General,
                Some(TimePreference::Afternoon),
            )
            .unwrap();
        assert_eq!(slots.len(), MAX_OFFERED_SLOTS);
        assert!(slots.iter().all(|s| s.start >= t("12:00")));
    }

    #[test]
    fn test_find_slots_widens_when_band_empty() {
        let resolver = resolver();
        // Saturday closes at 13:00, so the afternoon band is empty; morning
        // slots must still be offered. 2030-06-22 is a Saturday.
        let slots = resolver
            .find_slots(
                d("2030-06-22"),
                AppointmentType::General,
                Some(TimePreference::Afternoon),
            )
            .unwrap();
        assert!(!slots.is_empty());
        assert!(slots.iter().all(|s| s.start < t("12:00")));
    }

    #[test]
    fn test_find_slots_empty_when_day_fully_booked() {
        let resolver = resolver();
        // Saturday 09:00-13:00 holds four 60-minute slots; book them all
        for start in ["09:00", "10:00", "11:00", "12:00"] {
            book(&resolver, "2030-06-22", start, AppointmentType::Specialist);
        }
        let slots = resolver
            .find_slots(d("2030-06-22"), AppointmentType::Specialist, None)
            .unwrap();
        assert!(slots.is_empty());
    }

    #[test]
    fn test_first_available_skips_closed_and_full_days() {
        let resolver = resolver();
        // Fill the whole Saturday
        for start in ["09:00", "10:00", "11:00", "12:00"] {
            book(&resolver, "2030-06-22", start, AppointmentType::Specialist);
        }
        // Scan starting Saturday: Sunday is closed, so Monday wins
        let (date, slots) = resolver
            .first_available(d("2030-06-22"), AppointmentType::Specialist, None)
            .unwrap()
            .unwrap();
        assert_eq!(date, d("2030-06-24"));
        assert!(!slots.is_empty());
    }

    #[test]
    fn test_first_available_bounded() {
        let conn = db::init_db(":memory:").unwrap();
        // A schedule that is closed every day
        let hours = WorkingHours::from_json("{}").unwrap();
        let store = CalendarStore::new(Arc::new(Mutex::new(conn)), hours);
        let resolver = AvailabilityResolver::new(Arc::new(store));

        let result = resolver
            .first_available(d("2030-06-17"), AppointmentType::General, None)
            .unwrap();
        assert!(result.is_none());
    }
}
