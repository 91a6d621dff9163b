use std::sync::{Arc, Mutex};

use chrono::{Duration, NaiveDate, Utc};
use rusqlite::Connection;
use uuid::Uuid;

use crate::db::queries;
use crate::models::{Booking, BookingStatus, SchedulingError, WorkingHours};

/// Owns the clinic's single logical schedule: the static working-hours table
/// and every booking ever committed. All mutation funnels through `commit`
/// and `cancel`; the connection mutex makes commit's read-check-write
/// indivisible across sessions, which is what keeps the no-double-booking
/// invariant under concurrent attempts.
pub struct CalendarStore {
    db: Arc<Mutex<Connection>>,
    hours: WorkingHours,
}

impl CalendarStore {
    pub fn new(db: Arc<Mutex<Connection>>, hours: WorkingHours) -> Self {
        Self { db, hours }
    }

    pub fn working_hours(&self) -> &WorkingHours {
        &self.hours
    }

    /// Confirmed bookings for a date, ordered by start time.
    pub fn bookings_on(&self, date: NaiveDate) -> Result<Vec<Booking>, SchedulingError> {
        let conn = self.lock_db()?;
        queries::confirmed_on_date(&conn, date)
            .map_err(|e| SchedulingError::ServiceUnavailable(e.to_string()))
    }

    pub fn get(&self, id: Uuid) -> Result<Option<Booking>, SchedulingError> {
        let conn = self.lock_db()?;
        queries::get_booking(&conn, id)
            .map_err(|e| SchedulingError::ServiceUnavailable(e.to_string()))
    }

    pub fn find_by_code(&self, code: &str) -> Result<Option<Booking>, SchedulingError> {
        let conn = self.lock_db()?;
        queries::find_confirmed_by_code(&conn, code)
            .map_err(|e| SchedulingError::ServiceUnavailable(e.to_string()))
    }

    pub fn code_in_use(&self, code: &str) -> Result<bool, SchedulingError> {
        let conn = self.lock_db()?;
        queries::code_in_use(&conn, code)
            .map_err(|e| SchedulingError::ServiceUnavailable(e.to_string()))
    }

    /// Validate and write a candidate booking. The overlap re-check and the
    /// insert happen under one lock acquisition; a candidate that lost the
    /// race to another session gets `Conflict`, never a silent double-book.
    pub fn commit(&self, candidate: Booking) -> Result<Booking, SchedulingError> {
        let conn = self.lock_db()?;

        let today = Utc::now().date_naive();
        if candidate.date < today {
            return Err(SchedulingError::InvalidSlot(format!(
                "{} is in the past",
                candidate.date
            )));
        }

        // A slot never crosses midnight; a wrapped end means the start time
        // itself was nonsense.
        if candidate.end <= candidate.start {
            return Err(SchedulingError::InvalidSlot(format!(
                "{} is not a valid start time for a {}-minute appointment",
                candidate.start.format("%H:%M"),
                candidate.appointment_type.duration_minutes(),
            )));
        }

        if !self
            .hours
            .fits(candidate.date, candidate.start, candidate.end)
        {
            return Err(SchedulingError::InvalidSlot(format!(
                "{} {} falls outside working hours ({})",
                candidate.date,
                candidate.start.format("%H:%M"),
                self.hours.to_human_readable(),
            )));
        }

        let existing = queries::confirmed_on_date(&conn, candidate.date)
            .map_err(|e| SchedulingError::ServiceUnavailable(e.to_string()))?;
        for booked in &existing {
            // Overlap: candidate starts before booked ends AND booked starts
            // before candidate ends.
            if candidate.start < booked.end && booked.start < candidate.end {
                tracing::warn!(
                    date = %candidate.date,
                    start = %candidate.start,
                    against = %booked.start,
                    "booking conflict"
                );
                return Err(SchedulingError::Conflict);
            }
        }

        queries::insert_booking(&conn, &candidate)
            .map_err(|e| SchedulingError::ServiceUnavailable(e.to_string()))?;

        tracing::info!(id = %candidate.id, date = %candidate.date, start = %candidate.start, "booking committed");
        Ok(candidate)
    }

    /// Flip a confirmed booking to cancelled; the interval becomes free
    /// again. Cancelling an unknown or already-cancelled booking is
    /// `NotFound`.
    pub fn cancel(&self, id: Uuid) -> Result<Booking, SchedulingError> {
        let conn = self.lock_db()?;

        let booking = queries::get_booking(&conn, id)
            .map_err(|e| SchedulingError::ServiceUnavailable(e.to_string()))?
            .ok_or(SchedulingError::NotFound)?;

        if booking.status != BookingStatus::Confirmed {
            return Err(SchedulingError::NotFound);
        }

        let now = Utc::now().naive_utc();
        queries::set_status(&conn, id, BookingStatus::Cancelled, now)
            .map_err(|e| SchedulingError::ServiceUnavailable(e.to_string()))?;

        tracing::info!(id = %id, "booking cancelled");
        Ok(Booking {
            status: BookingStatus::Cancelled,
            updated_at: now,
            ..booking
        })
    }

    fn lock_db(&self) -> Result<std::sync::MutexGuard<'_, Connection>, SchedulingError> {
        self.db
            .lock()
            .map_err(|_| SchedulingError::ServiceUnavailable("storage lock poisoned".into()))
    }
}

/// iCalendar export for a confirmed booking, served by the calendar handler.
pub fn generate_ics(booking: &Booking, clinic_name: &str) -> String {
    let start = booking.date.and_time(booking.start);
    let end = booking.date.and_time(booking.end);
    let dtstart = start.format("%Y%m%dT%H%M%S").to_string();
    let dtend = end.format("%Y%m%dT%H%M%S").to_string();
    let dtstamp = booking.created_at.format("%Y%m%dT%H%M%S").to_string();
    let uid = format!("{}@frontdesk", booking.id);

    let summary = format!("{} at {}", booking.appointment_type.label(), clinic_name);
    let description = booking.reason.as_deref().unwrap_or("No additional notes");

    format!(
        "BEGIN:VCALENDAR\r\n\
         VERSION:2.0\r\n\
         PRODID:-//Frontdesk//Scheduling Agent//EN\r\n\
         BEGIN:VEVENT\r\n\
         UID:{uid}\r\n\
         DTSTAMP:{dtstamp}\r\n\
         DTSTART:{dtstart}\r\n\
         DTEND:{dtend}\r\n\
         SUMMARY:{summary}\r\n\
         DESCRIPTION:{description}\r\n\
         END:VEVENT\r\n\
         END:VCALENDAR\r\n"
    )
}

/// End of a booking interval: start plus the type's fixed duration.
pub fn slot_end(
    start: chrono::NaiveTime,
    appointment_type: crate::models::AppointmentType,
) -> chrono::NaiveTime {
    start + Duration::minutes(appointment_type.duration_minutes())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;
    use crate::models::{AppointmentType, Patient};
    use chrono::{NaiveDate, NaiveTime};

    fn store() -> CalendarStore {
        let conn = db::init_db(":memory:").unwrap();
        CalendarStore::new(Arc::new(Mutex::new(conn)), WorkingHours::default())
    }

    fn d(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    fn t(s: &str) -> NaiveTime {
        NaiveTime::parse_from_str(s, "%H:%M").unwrap()
    }

    fn candidate(date: &str, start: &str, ty: AppointmentType, code: &str) -> Booking {
        let now = Utc::now().naive_utc();
        let start = t(start);
        Booking {
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
            status: crate::models::BookingStatus::Confirmed,
            confirmation_code: code.into(),
            created_at: now,
            updated_at: now,
        }
    }

    // 2030-06-17 is a Monday.

    #[test]
    fn test_commit_then_conflict() {
        let store = store();
        store
            .commit(candidate("2030-06-17", "14:00", AppointmentType::General, "AAAAAA"))
            .unwrap();

        let err = store
            .commit(candidate("2030-06-17", "14:00", AppointmentType::General, "BBBBBB"))
            .unwrap_err();
        assert_eq!(err, SchedulingError::Conflict);

        // Partial overlap also conflicts
        let err = store
            .commit(candidate("2030-06-17", "13:45", AppointmentType::General, "CCCCCC"))
            .unwrap_err();
        assert_eq!(err, SchedulingError::Conflict);

        // Adjacent is fine
        store
            .commit(candidate("2030-06-17", "13:30", AppointmentType::General, "DDDDDD"))
            .unwrap();
    }

    #[test]
    fn test_commit_rejects_outside_hours() {
        let store = store();
        let err = store
            .commit(candidate("2030-06-17", "18:00", AppointmentType::General, "AAAAAA"))
            .unwrap_err();
        assert!(matches!(err, SchedulingError::InvalidSlot(_)));

        // Sunday is closed
        let err = store
            .commit(candidate("2030-06-16", "10:00", AppointmentType::General, "AAAAAA"))
            .unwrap_err();
        assert!(matches!(err, SchedulingError::InvalidSlot(_)));

        // 16:45 + 30min crosses the 17:00 close
        let err = store
            .commit(candidate("2030-06-17", "16:45", AppointmentType::General, "AAAAAA"))
            .unwrap_err();
        assert!(matches!(err, SchedulingError::InvalidSlot(_)));
    }

    #[test]
    fn test_commit_rejects_past_date() {
        let store = store();
        let err = store
            .commit(candidate("2020-06-15", "10:00", AppointmentType::General, "AAAAAA"))
            .unwrap_err();
        assert!(matches!(err, SchedulingError::InvalidSlot(_)));
    }

    #[test]
    fn test_cancel_frees_interval_and_is_not_repeatable() {
        let store = store();
        let booked = store
            .commit(candidate("2030-06-17", "10:00", AppointmentType::General, "AAAAAA"))
            .unwrap();

        let cancelled = store.cancel(booked.id).unwrap();
        assert_eq!(cancelled.status, crate::models::BookingStatus::Cancelled);

        // The interval is free again
        store
            .commit(candidate("2030-06-17", "10:00", AppointmentType::General, "BBBBBB"))
            .unwrap();

        // Re-cancelling the first booking is NotFound
        assert_eq!(store.cancel(booked.id).unwrap_err(), SchedulingError::NotFound);
        assert_eq!(store.cancel(Uuid::new_v4()).unwrap_err(), SchedulingError::NotFound);
    }

    #[test]
    fn test_concurrent_commits_one_winner() {
        let store = Arc::new(store());
        let mut handles = vec![];
        for i in 0..8 {
            let store = Arc::clone(&store);
            handles.push(std::thread::spawn(move || {
                store.commit(candidate(
                    "2030-06-17",
                    "11:00",
                    AppointmentType::General,
                    &format!("CODE{i:02}"),
                ))
            }));
        }

        let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        let wins = results.iter().filter(|r| r.is_ok()).count();
        let conflicts = results
            .iter()
            .filter(|r| matches!(r, Err(SchedulingError::Conflict)))
            .count();
        assert_eq!(wins, 1);
        assert_eq!(conflicts, 7);
    }

    #[test]
    fn test_generate_ics() {
        let booking = candidate("2030-06-17", "14:00", AppointmentType::General, "AAAAAA");
        let ics = generate_ics(&booking, "HealthCare Plus Clinic");
        assert!(ics.contains("DTSTART:20300617T140000"));
        assert!(ics.contains("DTEND:20300617T143000"));
        assert!(ics.contains("SUMMARY:general consultation at HealthCare Plus Clinic"));
        assert!(ics.contains(&format!("UID:{}@frontdesk", booking.id)));
    }
}
