use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::Json;
use chrono::{NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::errors::AppError;
use crate::models::{AppointmentType, Patient, TimeSlot};
use crate::services::booking::BookingRequest;
use crate::state::AppState;

// ── Availability ──

#[derive(Deserialize)]
pub struct AvailabilityQuery {
    pub date: String,
    pub appointment_type: String,
}

#[derive(Serialize)]
pub struct AvailabilityResponse {
    pub date: String,
    pub available_slots: Vec<SlotView>,
}

#[derive(Serialize)]
pub struct SlotView {
    pub start_time: String,
    pub end_time: String,
    pub available: bool,
}

impl From<TimeSlot> for SlotView {
    fn from(s: TimeSlot) -> Self {
        Self {
            start_time: s.start.format("%H:%M").to_string(),
            end_time: s.end.format("%H:%M").to_string(),
            available: s.available,
        }
    }
}

/// GET /api/schedule/availability — the full tagged grid for one day.
pub async fn get_availability(
    State(state): State<Arc<AppState>>,
    Query(query): Query<AvailabilityQuery>,
) -> Result<Json<AvailabilityResponse>, AppError> {
    let appointment_type = parse_type(&query.appointment_type)?;
    let date = parse_date(&query.date)?;

    if date < Utc::now().date_naive() {
        return Err(AppError::BadRequest(
            "cannot check availability for past dates".into(),
        ));
    }

    let slots = state.resolver.slot_grid(date, appointment_type)?;

    Ok(Json(AvailabilityResponse {
        date: query.date,
        available_slots: slots.into_iter().map(SlotView::from).collect(),
    }))
}

// ── Booking ──

#[derive(Deserialize)]
pub struct BookRequestBody {
    pub appointment_type: AppointmentType,
    pub date: String,
    pub start_time: String,
    pub patient: PatientBody,
    #[serde(default)]
    pub reason: Option<String>,
}

#[derive(Deserialize)]
pub struct PatientBody {
    pub name: String,
    pub email: String,
    pub phone: String,
}

#[derive(Serialize)]
pub struct BookResponse {
    pub booking_id: Uuid,
    pub status: String,
    pub confirmation_code: String,
    pub details: serde_json::Value,
}

/// POST /api/schedule/book — direct booking, same validation path as the
/// conversational flow.
pub async fn book(
    State(state): State<Arc<AppState>>,
    Json(body): Json<BookRequestBody>,
) -> Result<Json<BookResponse>, AppError> {
    let date = parse_date(&body.date)?;
    let start = parse_time(&body.start_time)?;

    let booking = state.bookings.book(BookingRequest {
        appointment_type: body.appointment_type,
        date,
        start,
        patient: Patient {
            name: body.patient.name,
            email: body.patient.email,
            phone: body.patient.phone,
        },
        reason: body.reason,
    })?;

    Ok(Json(BookResponse {
        booking_id: booking.id,
        status: booking.status.as_str().to_string(),
        confirmation_code: booking.confirmation_code.clone(),
        details: serde_json::json!({
            "appointment_type": booking.appointment_type.as_str(),
            "date": booking.date.format("%Y-%m-%d").to_string(),
            "start_time": booking.start.format("%H:%M").to_string(),
            "end_time": booking.end.format("%H:%M").to_string(),
            "patient": {
                "name": booking.patient.name,
                "email": booking.patient.email,
                "phone": booking.patient.phone,
            },
            "reason": booking.reason,
        }),
    }))
}

#[derive(Serialize)]
pub struct CancelResponse {
    pub booking_id: Uuid,
    pub status: String,
}

/// POST /api/schedule/bookings/:id/cancel — soft-delete; the interval opens
/// up again.
pub async fn cancel(
    State(state): State<Arc<AppState>>,
    Path(booking_id): Path<Uuid>,
) -> Result<Json<CancelResponse>, AppError> {
    let cancelled = state.bookings.cancel(booking_id)?;
    Ok(Json(CancelResponse {
        booking_id: cancelled.id,
        status: cancelled.status.as_str().to_string(),
    }))
}

// ── Parsing helpers ──

fn parse_type(raw: &str) -> Result<AppointmentType, AppError> {
    AppointmentType::parse_loose(raw).ok_or_else(|| {
        AppError::BadRequest(format!(
            "invalid appointment type '{raw}'; expected one of: general, followup, physical, specialist"
        ))
    })
}

fn parse_date(raw: &str) -> Result<NaiveDate, AppError> {
    NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d")
        .map_err(|_| AppError::BadRequest(format!("invalid date '{raw}'; expected YYYY-MM-DD")))
}

fn parse_time(raw: &str) -> Result<NaiveTime, AppError> {
    NaiveTime::parse_from_str(raw.trim(), "%H:%M")
        .map_err(|_| AppError::BadRequest(format!("invalid time '{raw}'; expected HH:MM")))
}
