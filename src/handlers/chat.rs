use std::sync::Arc;

use axum::extract::State;
use axum::Json;
use serde::{Deserialize, Serialize};

use crate::errors::AppError;
use crate::models::Booking;
use crate::services::conversation;
use crate::state::AppState;

#[derive(Deserialize)]
pub struct ChatRequest {
    pub message: String,
    #[serde(default)]
    pub session_id: Option<String>,
}

#[derive(Serialize)]
pub struct ChatResponse {
    pub reply: String,
    pub session_id: String,
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub booking: Option<BookingSummary>,
}

/// Wire-facing view of a committed booking, attached to the turn that
/// created it.
#[derive(Serialize)]
pub struct BookingSummary {
    pub booking_id: uuid::Uuid,
    pub confirmation_code: String,
    pub appointment_type: String,
    pub date: String,
    pub start_time: String,
    pub end_time: String,
    pub patient_name: String,
}

impl From<Booking> for BookingSummary {
    fn from(b: Booking) -> Self {
        Self {
            booking_id: b.id,
            confirmation_code: b.confirmation_code,
            appointment_type: b.appointment_type.as_str().to_string(),
            date: b.date.format("%Y-%m-%d").to_string(),
            start_time: b.start.format("%H:%M").to_string(),
            end_time: b.end.format("%H:%M").to_string(),
            patient_name: b.patient.name,
        }
    }
}

pub async fn chat(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<ChatRequest>,
) -> Result<Json<ChatResponse>, AppError> {
    let message = payload.message.trim().to_string();
    if message.is_empty() {
        return Err(AppError::BadRequest("message must not be empty".into()));
    }

    let outcome = conversation::process_message(&state, payload.session_id, &message).await;

    Ok(Json(ChatResponse {
        reply: outcome.reply,
        session_id: outcome.session_id,
        status: "success".to_string(),
        booking: outcome.booking.map(BookingSummary::from),
    }))
}
