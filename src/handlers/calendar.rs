use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use uuid::Uuid;

use crate::models::BookingStatus;
use crate::services::calendar::generate_ics;
use crate::state::AppState;

/// GET /calendar/:booking_id — iCalendar file for a confirmed booking.
pub async fn download_ics(
    State(state): State<Arc<AppState>>,
    Path(raw_id): Path<String>,
) -> Response {
    // Strip .ics suffix if present
    let raw_id = raw_id.strip_suffix(".ics").unwrap_or(&raw_id);
    let booking_id = match Uuid::parse_str(raw_id) {
        Ok(id) => id,
        Err(_) => return (StatusCode::BAD_REQUEST, "Invalid booking id").into_response(),
    };

    let booking = match state.calendar.get(booking_id) {
        Ok(Some(b)) if b.status == BookingStatus::Confirmed => b,
        Ok(_) => return (StatusCode::NOT_FOUND, "Booking not found").into_response(),
        Err(e) => {
            tracing::error!(error = %e, "failed to load booking for .ics");
            return (StatusCode::INTERNAL_SERVER_ERROR, "Internal error").into_response();
        }
    };

    let ics = generate_ics(&booking, &state.config.clinic_name);
    let filename = format!("appointment-{booking_id}.ics");

    (
        [
            (header::CONTENT_TYPE, "text/calendar; charset=utf-8".to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{filename}\""),
            ),
        ],
        ics,
    )
        .into_response()
}
