use serde::{Deserialize, Serialize};

/// Per-turn intent classified by the language model.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Intent {
    AskFaq,
    ProvideDetail,
    SelectSlot,
    RejectSlots,
    Confirm,
    Restart,
    CancelRequest,
    Ambiguous,
}

impl Intent {
    pub fn as_str(&self) -> &'static str {
        match self {
            Intent::AskFaq => "ask_faq",
            Intent::ProvideDetail => "provide_detail",
            Intent::SelectSlot => "select_slot",
            Intent::RejectSlots => "reject_slots",
            Intent::Confirm => "confirm",
            Intent::Restart => "restart",
            Intent::CancelRequest => "cancel_request",
            Intent::Ambiguous => "ambiguous",
        }
    }
}

/// Everything the language model extracted from one utterance. All fields
/// are untrusted: dates, times, and contact details are re-validated before
/// they reach the calendar.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractedTurn {
    pub intent: Intent,
    #[serde(default)]
    pub appointment_type: Option<String>,
    /// Concrete date the model resolved ("tomorrow" etc. are its job),
    /// YYYY-MM-DD.
    #[serde(default)]
    pub date: Option<String>,
    /// Exact start time the patient named, HH:MM.
    #[serde(default)]
    pub time: Option<String>,
    /// "morning" | "afternoon" | "evening" | "asap".
    #[serde(default)]
    pub time_preference: Option<String>,
    /// 1-based position when the patient picks an offered slot by ordinal
    /// ("the second one").
    #[serde(default)]
    pub slot_ordinal: Option<usize>,
    #[serde(default)]
    pub patient_name: Option<String>,
    #[serde(default)]
    pub patient_email: Option<String>,
    #[serde(default)]
    pub patient_phone: Option<String>,
    #[serde(default)]
    pub reason: Option<String>,
    #[serde(default)]
    pub confirmation_code: Option<String>,
    /// The model's conversational reply, used when the state machine has no
    /// deterministic text of its own for the turn.
    pub message_to_patient: String,
}
