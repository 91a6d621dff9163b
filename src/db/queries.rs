use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use rusqlite::{params, Connection, Row};
use uuid::Uuid;

use crate::models::{AppointmentType, Booking, BookingStatus, Patient};

const DATE_FMT: &str = "%Y-%m-%d";
const TIME_FMT: &str = "%H:%M";
const STAMP_FMT: &str = "%Y-%m-%d %H:%M:%S";

pub fn insert_booking(conn: &Connection, booking: &Booking) -> anyhow::Result<()> {
    conn.execute(
        "INSERT INTO bookings (id, appointment_type, date, start_time, end_time,
                               patient_name, patient_email, patient_phone, reason,
                               status, confirmation_code, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)",
        params![
            booking.id.to_string(),
            booking.appointment_type.as_str(),
            booking.date.format(DATE_FMT).to_string(),
            booking.start.format(TIME_FMT).to_string(),
            booking.end.format(TIME_FMT).to_string(),
            booking.patient.name,
            booking.patient.email,
            booking.patient.phone,
            booking.reason,
            booking.status.as_str(),
            booking.confirmation_code,
            booking.created_at.format(STAMP_FMT).to_string(),
            booking.updated_at.format(STAMP_FMT).to_string(),
        ],
    )?;
    Ok(())
}

/// Confirmed bookings for one calendar date, ordered by start time.
pub fn confirmed_on_date(conn: &Connection, date: NaiveDate) -> anyhow::Result<Vec<Booking>> {
    let mut stmt = conn.prepare(
        "SELECT id, appointment_type, date, start_time, end_time,
                patient_name, patient_email, patient_phone, reason,
                status, confirmation_code, created_at, updated_at
         FROM bookings
         WHERE date = ?1 AND status = 'confirmed'
         ORDER BY start_time ASC",
    )?;

    let rows = stmt.query_map(params![date.format(DATE_FMT).to_string()], |row| {
        Ok(parse_booking_row(row))
    })?;

    let mut bookings = vec![];
    for row in rows {
        bookings.push(row??);
    }
    Ok(bookings)
}

pub fn get_booking(conn: &Connection, id: Uuid) -> anyhow::Result<Option<Booking>> {
    let mut stmt = conn.prepare(
        "SELECT id, appointment_type, date, start_time, end_time,
                patient_name, patient_email, patient_phone, reason,
                status, confirmation_code, created_at, updated_at
         FROM bookings WHERE id = ?1",
    )?;

    let result = stmt.query_row(params![id.to_string()], |row| Ok(parse_booking_row(row)));
    match result {
        Ok(booking) => Ok(Some(booking?)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

/// Look up the confirmed booking carrying a confirmation code, if any.
pub fn find_confirmed_by_code(conn: &Connection, code: &str) -> anyhow::Result<Option<Booking>> {
    let mut stmt = conn.prepare(
        "SELECT id, appointment_type, date, start_time, end_time,
                patient_name, patient_email, patient_phone, reason,
                status, confirmation_code, created_at, updated_at
         FROM bookings WHERE confirmation_code = ?1 AND status = 'confirmed'",
    )?;

    let result = stmt.query_row(params![code], |row| Ok(parse_booking_row(row)));
    match result {
        Ok(booking) => Ok(Some(booking?)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

pub fn code_in_use(conn: &Connection, code: &str) -> anyhow::Result<bool> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM bookings WHERE confirmation_code = ?1 AND status = 'confirmed'",
        params![code],
        |row| row.get(0),
    )?;
    Ok(count > 0)
}

/// Soft-delete: rows are never removed, only flipped to cancelled.
pub fn set_status(
    conn: &Connection,
    id: Uuid,
    status: BookingStatus,
    now: NaiveDateTime,
) -> anyhow::Result<usize> {
    let updated = conn.execute(
        "UPDATE bookings SET status = ?2, updated_at = ?3 WHERE id = ?1",
        params![
            id.to_string(),
            status.as_str(),
            now.format(STAMP_FMT).to_string()
        ],
    )?;
    Ok(updated)
}

fn parse_booking_row(row: &Row) -> anyhow::Result<Booking> {
    let id_str: String = row.get(0)?;
    let type_str: String = row.get(1)?;
    let date_str: String = row.get(2)?;
    let start_str: String = row.get(3)?;
    let end_str: String = row.get(4)?;
    let status_str: String = row.get(9)?;
    let created_str: String = row.get(11)?;
    let updated_str: String = row.get(12)?;

    Ok(Booking {
        id: Uuid::parse_str(&id_str)?,
        appointment_type: AppointmentType::parse_loose(&type_str)
            .ok_or_else(|| anyhow::anyhow!("unknown appointment type in row: {type_str}"))?,
        date: NaiveDate::parse_from_str(&date_str, DATE_FMT)?,
        start: NaiveTime::parse_from_str(&start_str, TIME_FMT)?,
        end: NaiveTime::parse_from_str(&end_str, TIME_FMT)?,
        patient: Patient {
            name: row.get(5)?,
            email: row.get(6)?,
            phone: row.get(7)?,
        },
        reason: row.get(8)?,
        status: BookingStatus::parse(&status_str),
        confirmation_code: row.get(10)?,
        created_at: NaiveDateTime::parse_from_str(&created_str, STAMP_FMT)?,
        updated_at: NaiveDateTime::parse_from_str(&updated_str, STAMP_FMT)?,
    })
}
