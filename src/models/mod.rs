pub mod appointment;
pub mod intent;
pub mod session;
pub mod slot;
pub mod working_hours;

pub use appointment::{
    AppointmentType, Booking, BookingStatus, CollectField, Patient, SchedulingError,
};
pub use intent::{ExtractedTurn, Intent};
pub use session::{
    BookingRef, CollectedFields, ConversationSession, PendingIntent, Phase, SessionMessage,
};
pub use slot::{TimePreference, TimeSlot};
pub use working_hours::{DayHours, WorkingHours};
