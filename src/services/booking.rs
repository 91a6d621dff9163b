use std::sync::Arc;

use chrono::{Duration, NaiveDate, NaiveTime, Utc};
use uuid::Uuid;

use crate::models::{
    AppointmentType, Booking, BookingStatus, CollectField, Patient, SchedulingError,
};
use crate::services::calendar::{slot_end, CalendarStore};

/// How far ahead a booking may be placed.
pub const DEFAULT_HORIZON_DAYS: i64 = 90;

/// Confirmation codes avoid lookalike characters (0/O, 1/I/L).
const CODE_CHARSET: &[u8] = b"ABCDEFGHJKMNPQRSTUVWXYZ23456789";
const CODE_LEN: usize = 6;

#[derive(Debug, Clone)]
pub struct BookingRequest {
    pub appointment_type: AppointmentType,
    pub date: NaiveDate,
    pub start: NaiveTime,
    pub patient: Patient,
    pub reason: Option<String>,
}

/// Validates and commits bookings. Validation is fail-fast in a fixed order:
/// patient data, then the date window, then working-hours fit, and finally
/// the calendar's authoritative overlap check inside `commit`.
pub struct BookingManager {
    calendar: Arc<CalendarStore>,
    horizon_days: i64,
}

impl BookingManager {
    pub fn new(calendar: Arc<CalendarStore>) -> Self {
        Self { calendar, horizon_days: DEFAULT_HORIZON_DAYS }
    }

    pub fn with_horizon(calendar: Arc<CalendarStore>, horizon_days: i64) -> Self {
        Self { calendar, horizon_days }
    }

    pub fn book(&self, request: BookingRequest) -> Result<Booking, SchedulingError> {
        validate_patient(&request.patient)?;

        let today = Utc::now().date_naive();
        if request.date < today {
            return Err(SchedulingError::InvalidSlot(format!(
                "{} is in the past",
                request.date
            )));
        }
        if request.date > today + Duration::days(self.horizon_days) {
            return Err(SchedulingError::InvalidSlot(format!(
                "{} is more than {} days out",
                request.date, self.horizon_days
            )));
        }

        let end = slot_end(request.start, request.appointment_type);
        if end <= request.start
            || !self.calendar.working_hours().fits(request.date, request.start, end)
        {
            return Err(SchedulingError::InvalidSlot(format!(
                "a {}-minute {} starting {} does not fit within working hours ({})",
                request.appointment_type.duration_minutes(),
                request.appointment_type.label(),
                request.start.format("%H:%M"),
                self.calendar.working_hours().to_human_readable(),
            )));
        }

        let confirmation_code = self.generate_confirmation_code()?;
        let now = Utc::now().naive_utc();

        self.calendar.commit(Booking {
            id: Uuid::new_v4(),
            appointment_type: request.appointment_type,
            date: request.date,
            start: request.start,
            end,
            patient: request.patient,
            reason: request.reason,
            status: BookingStatus::Confirmed,
            confirmation_code,
            created_at: now,
            updated_at: now,
        })
    }

    pub fn cancel(&self, id: Uuid) -> Result<Booking, SchedulingError> {
        self.calendar.cancel(id)
    }

    pub fn cancel_by_code(&self, code: &str) -> Result<Booking, SchedulingError> {
        let booking = self
            .calendar
            .find_by_code(code.trim())?
            .ok_or(SchedulingError::NotFound)?;
        self.calendar.cancel(booking.id)
    }

    /// Short human-readable code, re-rolled until it collides with no live
    /// booking. Entropy comes from v4 uuids, which the crate already carries
    /// for booking ids.
    fn generate_confirmation_code(&self) -> Result<String, SchedulingError> {
        loop {
            let bytes = *Uuid::new_v4().as_bytes();
            let code: String = bytes
                .iter()
                .take(CODE_LEN)
                .map(|b| CODE_CHARSET[*b as usize % CODE_CHARSET.len()] as char)
                .collect();
            if !self.calendar.code_in_use(&code)? {
                return Ok(code);
            }
        }
    }
}

fn validate_patient(patient: &Patient) -> Result<(), SchedulingError> {
    if patient.name.trim().is_empty() {
        return Err(SchedulingError::Validation {
            field: CollectField::Name,
            message: "name must not be empty".into(),
        });
    }
    if patient.phone.trim().is_empty() {
        return Err(SchedulingError::Validation {
            field: CollectField::Phone,
            message: "phone number must not be empty".into(),
        });
    }
    if patient.email.trim().is_empty() {
        return Err(SchedulingError::Validation {
            field: CollectField::Email,
            message: "email must not be empty".into(),
        });
    }
    if !is_well_formed_email(patient.email.trim()) {
        return Err(SchedulingError::Validation {
            field: CollectField::Email,
            message: format!("'{}' does not look like an email address", patient.email.trim()),
        });
    }
    Ok(())
}

/// Structural check only: one `@`, a non-empty local part, a dotted domain,
/// no whitespace.
pub fn is_well_formed_email(s: &str) -> bool {
    if s.chars().any(|c| c.is_whitespace()) {
        return false;
    }
    let mut parts = s.split('@');
    match (parts.next(), parts.next(), parts.next()) {
        (Some(local), Some(domain), None) => {
            !local.is_empty()
                && domain.contains('.')
                && !domain.starts_with('.')
                && !domain.ends_with('.')
        }
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;
    use crate::models::WorkingHours;
    use std::sync::Mutex;

    // A generous horizon so the fixed 2030 test dates stay bookable; the
    // default horizon is exercised separately in test_date_window.
    fn manager() -> BookingManager {
        let conn = db::init_db(":memory:").unwrap();
        let store = CalendarStore::new(Arc::new(Mutex::new(conn)), WorkingHours::default());
        BookingManager::with_horizon(Arc::new(store), 36500)
    }

    fn d(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    fn t(s: &str) -> NaiveTime {
        NaiveTime::parse_from_str(s, "%H:%M").unwrap()
    }

    fn request(date: &str, start: &str) -> BookingRequest {
        BookingRequest {
            appointment_type: AppointmentType::General,
            date: d(date),
            start: t(start),
            patient: Patient {
                name: "Ada Lovelace".into(),
                email: "ada@example.com".into(),
                phone: "555-0100".into(),
            },
            reason: Some("annual checkup".into()),
        }
    }

    // 2030-06-17 is a Monday.

    #[test]
    fn test_successful_booking_has_code_and_id() {
        let manager = manager();
        let booking = manager.book(request("2030-06-17", "13:30")).unwrap();
        assert_eq!(booking.status, BookingStatus::Confirmed);
        assert_eq!(booking.end, t("14:00"));
        assert_eq!(booking.confirmation_code.len(), CODE_LEN);
        assert!(booking
            .confirmation_code
            .bytes()
            .all(|b| CODE_CHARSET.contains(&b)));
    }

    #[test]
    fn test_validation_order_patient_first() {
        let manager = manager();

        // Even with a hopeless date, the empty name is reported first
        let mut req = request("2020-01-01", "13:30");
        req.patient.name = "  ".into();
        let err = manager.book(req).unwrap_err();
        assert!(matches!(
            err,
            SchedulingError::Validation { field: CollectField::Name, .. }
        ));

        let mut req = request("2030-06-17", "13:30");
        req.patient.phone = "".into();
        let err = manager.book(req).unwrap_err();
        assert!(matches!(
            err,
            SchedulingError::Validation { field: CollectField::Phone, .. }
        ));

        let mut req = request("2030-06-17", "13:30");
        req.patient.email = "not-an-email".into();
        let err = manager.book(req).unwrap_err();
        assert!(matches!(
            err,
            SchedulingError::Validation { field: CollectField::Email, .. }
        ));
    }

    #[test]
    fn test_date_window() {
        let conn = db::init_db(":memory:").unwrap();
        let store = CalendarStore::new(Arc::new(Mutex::new(conn)), WorkingHours::default());
        let manager = BookingManager::new(Arc::new(store));

        let err = manager.book(request("2020-01-06", "13:30")).unwrap_err();
        assert!(matches!(err, SchedulingError::InvalidSlot(_)));

        // Far beyond the default 90-day horizon
        let err = manager.book(request("2099-06-15", "13:30")).unwrap_err();
        assert!(matches!(err, SchedulingError::InvalidSlot(_)));
    }

    #[test]
    fn test_end_must_not_cross_close() {
        let manager = manager();
        // 16:45 + 30 minutes crosses the 17:00 close
        let err = manager.book(request("2030-06-17", "16:45")).unwrap_err();
        assert!(matches!(err, SchedulingError::InvalidSlot(_)));
    }

    #[test]
    fn test_conflict_on_taken_slot() {
        let manager = manager();
        manager.book(request("2030-06-17", "14:00")).unwrap();

        let err = manager.book(request("2030-06-17", "14:00")).unwrap_err();
        assert_eq!(err, SchedulingError::Conflict);

        // The 13:30 neighbour is untouched
        manager.book(request("2030-06-17", "13:30")).unwrap();
    }

    #[test]
    fn test_cancel_by_code_then_not_found() {
        let manager = manager();
        let booking = manager.book(request("2030-06-17", "10:00")).unwrap();

        let cancelled = manager.cancel_by_code(&booking.confirmation_code).unwrap();
        assert_eq!(cancelled.id, booking.id);

        let err = manager.cancel_by_code(&booking.confirmation_code).unwrap_err();
        assert_eq!(err, SchedulingError::NotFound);
    }

    #[test]
    fn test_email_shapes() {
        assert!(is_well_formed_email("ada@example.com"));
        assert!(is_well_formed_email("a.b+c@sub.example.co"));
        assert!(!is_well_formed_email("ada"));
        assert!(!is_well_formed_email("ada@"));
        assert!(!is_well_formed_email("@example.com"));
        assert!(!is_well_formed_email("ada@example"));
        assert!(!is_well_formed_email("ada@.com"));
        assert!(!is_well_formed_email("ada lovelace@example.com"));
        assert!(!is_well_formed_email("ada@ex@ample.com"));
    }
}
