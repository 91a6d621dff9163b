use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::appointment::{AppointmentType, CollectField};
use crate::models::slot::{TimePreference, TimeSlot};

/// Phase of the booking dialogue. `Booked` is terminal for the appointment;
/// the session itself may loop back into a fresh flow.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Greeting,
    NeedsAssessment,
    SlotOffering,
    Collecting(CollectField),
    Confirming,
    Booked,
}

impl Phase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::Greeting => "greeting",
            Phase::NeedsAssessment => "needs_assessment",
            Phase::SlotOffering => "slot_offering",
            Phase::Collecting(CollectField::Name) => "collecting_name",
            Phase::Collecting(CollectField::Phone) => "collecting_phone",
            Phase::Collecting(CollectField::Email) => "collecting_email",
            Phase::Collecting(CollectField::Reason) => "collecting_reason",
            Phase::Confirming => "confirming",
            Phase::Booked => "booked",
        }
    }
}

/// What the session is currently trying to accomplish.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PendingIntent {
    Booking,
    Faq,
    Reschedule,
    Cancel,
    None,
}

/// Slot-values accumulated across turns. Fields survive the FAQ detour and
/// are only wiped by `restart` or a completed flow.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CollectedFields {
    pub appointment_type: Option<AppointmentType>,
    pub date: Option<NaiveDate>,
    pub asap: bool,
    pub time_preference: Option<TimePreference>,
    pub name: Option<String>,
    pub phone: Option<String>,
    pub email: Option<String>,
    pub reason: Option<String>,
}

impl CollectedFields {
    /// Next patient field to ask for, in the fixed order
    /// name -> phone -> email -> reason.
    pub fn next_missing(&self) -> Option<CollectField> {
        if self.name.is_none() {
            Some(CollectField::Name)
        } else if self.phone.is_none() {
            Some(CollectField::Phone)
        } else if self.email.is_none() {
            Some(CollectField::Email)
        } else if self.reason.is_none() {
            Some(CollectField::Reason)
        } else {
            None
        }
    }

    /// Needs assessment is done once we know what kind of appointment and
    /// roughly when.
    pub fn needs_met(&self) -> bool {
        self.appointment_type.is_some() && (self.date.is_some() || self.asap)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionMessage {
    pub role: String,
    pub content: String,
}

/// Reference to the session's most recent confirmed booking, kept so that
/// cancel/reschedule turns can resolve "my appointment" without a code.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BookingRef {
    pub id: Uuid,
    pub confirmation_code: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationSession {
    pub id: String,
    pub phase: Phase,
    /// Depth-1 interrupt: the phase to restore after an FAQ detour. Only the
    /// most recent flow is remembered, never a stack.
    pub resume_phase: Option<Phase>,
    pub pending_intent: PendingIntent,
    pub collected: CollectedFields,
    /// Most recent offer only; replaced wholesale on every re-offer.
    pub offered_slots: Vec<TimeSlot>,
    pub chosen_slot: Option<TimeSlot>,
    pub last_booking: Option<BookingRef>,
    pub messages: Vec<SessionMessage>,
    pub last_activity: NaiveDateTime,
}

impl ConversationSession {
    pub fn new(id: String, now: NaiveDateTime) -> Self {
        Self {
            id,
            phase: Phase::Greeting,
            resume_phase: None,
            pending_intent: PendingIntent::None,
            collected: CollectedFields::default(),
            offered_slots: Vec::new(),
            chosen_slot: None,
            last_booking: None,
            messages: Vec::new(),
            last_activity: now,
        }
    }

    pub fn push_message(&mut self, role: &str, content: &str) {
        self.messages.push(SessionMessage {
            role: role.to_string(),
            content: content.to_string(),
        });
    }

    /// Reset the booking flow but keep the session (and its last booking)
    /// alive. Used by `restart` and after a cancellation.
    pub fn reset_flow(&mut self) {
        self.phase = Phase::NeedsAssessment;
        self.resume_phase = None;
        self.pending_intent = PendingIntent::None;
        self.collected = CollectedFields::default();
        self.offered_slots.clear();
        self.chosen_slot = None;
    }
}
