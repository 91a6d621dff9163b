use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum AppointmentType {
    #[serde(alias = "consultation", alias = "general_consultation", alias = "checkup")]
    General,
    #[serde(alias = "follow_up", alias = "follow-up", alias = "returning")]
    Followup,
    #[serde(alias = "physical_exam", alias = "exam", alias = "examination")]
    Physical,
    #[serde(alias = "special", alias = "specialty_consultation")]
    Specialist,
}

impl AppointmentType {
    pub fn duration_minutes(&self) -> i64 {
        match self {
            AppointmentType::General => 30,
            AppointmentType::Followup => 15,
            AppointmentType::Physical => 45,
            AppointmentType::Specialist => 60,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            AppointmentType::General => "general",
            AppointmentType::Followup => "followup",
            AppointmentType::Physical => "physical",
            AppointmentType::Specialist => "specialist",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            AppointmentType::General => "general consultation",
            AppointmentType::Followup => "follow-up",
            AppointmentType::Physical => "physical exam",
            AppointmentType::Specialist => "specialist consultation",
        }
    }

    pub fn all() -> [AppointmentType; 4] {
        [
            AppointmentType::General,
            AppointmentType::Followup,
            AppointmentType::Physical,
            AppointmentType::Specialist,
        ]
    }

    /// Parse the loose names an LLM (or a query string) tends to produce.
    /// The general-consultation keywords go last: "specialty consultation"
    /// must hit the more specific buckets first.
    pub fn parse_loose(s: &str) -> Option<Self> {
        let s = s.trim().to_lowercase();
        let keywords: [(&[&str], AppointmentType); 4] = [
            (&["follow"], AppointmentType::Followup),
            (&["physical", "exam"], AppointmentType::Physical),
            (&["special", "complex"], AppointmentType::Specialist),
            (
                &["general", "consult", "checkup", "check-up", "routine"],
                AppointmentType::General,
            ),
        ];
        for (words, ty) in keywords {
            if words.iter().any(|w| s.contains(w)) {
                return Some(ty);
            }
        }
        None
    }
}

impl std::fmt::Display for AppointmentType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Patient {
    pub name: String,
    pub email: String,
    pub phone: String,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum BookingStatus {
    Confirmed,
    Cancelled,
}

impl BookingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BookingStatus::Confirmed => "confirmed",
            BookingStatus::Cancelled => "cancelled",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "cancelled" => BookingStatus::Cancelled,
            _ => BookingStatus::Confirmed,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Booking {
    pub id: Uuid,
    pub appointment_type: AppointmentType,
    pub date: NaiveDate,
    pub start: NaiveTime,
    pub end: NaiveTime,
    pub patient: Patient,
    pub reason: Option<String>,
    pub status: BookingStatus,
    pub confirmation_code: String,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

impl Booking {
    /// One-line human summary, used in chat replies and owner-facing logs.
    pub fn summary(&self) -> String {
        format!(
            "{} on {} at {} ({} min), confirmation code {}",
            self.appointment_type.label(),
            self.date.format("%A, %B %-d"),
            self.start.format("%H:%M"),
            self.appointment_type.duration_minutes(),
            self.confirmation_code,
        )
    }
}

/// Field of patient data the conversation collects, in the fixed asking order.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum CollectField {
    Name,
    Phone,
    Email,
    Reason,
}

impl CollectField {
    pub fn as_str(&self) -> &'static str {
        match self {
            CollectField::Name => "name",
            CollectField::Phone => "phone",
            CollectField::Email => "email",
            CollectField::Reason => "reason",
        }
    }
}

impl std::fmt::Display for CollectField {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, thiserror::Error, PartialEq)]
pub enum SchedulingError {
    #[error("invalid {field}: {message}")]
    Validation { field: CollectField, message: String },

    #[error("invalid slot: {0}")]
    InvalidSlot(String),

    #[error("the requested time slot is no longer available")]
    Conflict,

    #[error("booking not found")]
    NotFound,

    #[error("scheduling storage unavailable: {0}")]
    ServiceUnavailable(String),
}
