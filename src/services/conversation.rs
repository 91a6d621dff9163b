use std::sync::Arc;

use chrono::{Datelike, Duration, NaiveDate, NaiveTime, Utc};

use crate::models::{
    AppointmentType, Booking, CollectField, ExtractedTurn, Intent, PendingIntent, Phase,
    SchedulingError, TimePreference, TimeSlot,
};
use crate::services::ai::classify::classify_turn;
use crate::services::booking::BookingRequest;
use crate::state::AppState;

/// Fixed reply for collaborator failures. The session is never advanced or
/// corrupted by a failed external call.
const DEGRADED_REPLY: &str = "I'm sorry, I'm having technical trouble on my end right now. \
     Nothing has been lost - please try again in a moment, or call our front desk directly.";

const OFFLINE_REPLY: &str = "I'm sorry, our scheduling system is briefly unavailable, so I \
     can't touch the calendar right now. Please try again shortly or call the front desk to \
     book offline.";

pub struct TurnOutcome {
    pub session_id: String,
    pub reply: String,
    pub booking: Option<Booking>,
}

/// One conversational turn: locate the session, classify the utterance,
/// drive the phase machine, and fold the result back into the session.
/// Turns on the same session serialize on its lock; different sessions run
/// in parallel.
pub async fn process_message(
    state: &Arc<AppState>,
    session_id: Option<String>,
    message: &str,
) -> TurnOutcome {
    let (id, handle) = state.sessions.get_or_create(session_id);
    let mut session = handle.lock().await;

    let context = clinic_context(state, &session);
    let turn = match classify_turn(state.llm.as_ref(), &session, message, &context).await {
        Ok(turn) => turn,
        Err(e) => {
            tracing::error!(session = %id, error = %e, "language model call failed");
            session.push_message("user", message);
            session.push_message("assistant", DEGRADED_REPLY);
            return TurnOutcome {
                session_id: id,
                reply: DEGRADED_REPLY.to_string(),
                booking: None,
            };
        }
    };

    tracing::info!(
        session = %id,
        intent = turn.intent.as_str(),
        phase = session.phase.as_str(),
        "processing turn"
    );

    session.push_message("user", message);
    let (reply, booking) = handle_turn(state, &mut session, &turn, message).await;
    session.push_message("assistant", &reply);
    session.last_activity = Utc::now().naive_utc();
    state.sessions.touch(&id);

    TurnOutcome { session_id: id, reply, booking }
}

/// Everything the classifier needs to resolve relative dates and slot
/// references on its own.
fn clinic_context(state: &AppState, session: &crate::models::ConversationSession) -> String {
    let today = Utc::now().date_naive();
    let mut context = format!(
        "Clinic: {}. Today is {} ({}).\nWorking hours: {}.\nAppointment types: {}.",
        state.config.clinic_name,
        today,
        today.weekday(),
        state.calendar.working_hours().to_human_readable(),
        AppointmentType::all()
            .iter()
            .map(|t| format!("{} ({} min)", t.as_str(), t.duration_minutes()))
            .collect::<Vec<_>>()
            .join(", "),
    );
    if !session.offered_slots.is_empty() {
        let offered = session
            .offered_slots
            .iter()
            .enumerate()
            .map(|(i, s)| format!("{}. {} {}", i + 1, s.date, s.label()))
            .collect::<Vec<_>>()
            .join("\n");
        context.push_str(&format!("\nSlots currently offered to the patient:\n{offered}"));
    }
    context
}

async fn handle_turn(
    state: &Arc<AppState>,
    session: &mut crate::models::ConversationSession,
    turn: &ExtractedTurn,
    message: &str,
) -> (String, Option<Booking>) {
    match (session.phase, turn.intent) {
        // FAQ side-channel: reachable from anywhere, always returns to the
        // phase it interrupted.
        (_, Intent::AskFaq) => (faq_detour(state, session, message).await, None),

        (phase, Intent::Restart) if phase != Phase::Booked => {
            session.reset_flow();
            session.pending_intent = PendingIntent::Booking;
            (
                reply_or(turn, "No problem, let's start fresh. What kind of appointment do you need, and when would suit you?"),
                None,
            )
        }

        (_, Intent::CancelRequest) => (cancel_flow(state, session, turn), None),

        (Phase::Greeting | Phase::NeedsAssessment, _) => (needs_assessment(state, session, turn), None),

        (Phase::SlotOffering, Intent::SelectSlot) => (select_slot(session, turn), None),
        (Phase::SlotOffering, Intent::RejectSlots) => (offer_further_out(state, session), None),
        (Phase::SlotOffering, _) => {
            // Changed preferences re-query; anything vague re-offers.
            if let Some(problem) = absorb(session, turn, state.config.booking_horizon_days) {
                return (problem, None);
            }
            if turn.intent == Intent::Ambiguous {
                (reply_or(turn, &format_offer(&session.offered_slots)), None)
            } else {
                (offer_slots(state, session, ""), None)
            }
        }

        (Phase::Collecting(field), _) => (
            collecting(session, turn, field, state.config.booking_horizon_days),
            None,
        ),

        (Phase::Confirming, Intent::Confirm) => book_confirmed(state, session),
        (Phase::Confirming, Intent::RejectSlots) => {
            session.chosen_slot = None;
            (offer_slots(state, session, "Of course, let's look at other times. "), None)
        }
        (Phase::Confirming, _) => {
            // Corrections are folded in, then the full restatement is
            // repeated; nothing books without an explicit confirm.
            if let Some(problem) = absorb(session, turn, state.config.booking_horizon_days) {
                return (problem, None);
            }
            (restate_confirmation(session), None)
        }

        (Phase::Booked, _) => {
            if turn.appointment_type.is_some()
                || turn.date.is_some()
                || turn.time_preference.is_some()
            {
                start_new_flow(session);
                (needs_assessment(state, session, turn), None)
            } else {
                (reply_or(turn, "Is there anything else I can help you with?"), None)
            }
        }
    }
}

// ── Phase handlers ──

fn needs_assessment(
    state: &Arc<AppState>,
    session: &mut crate::models::ConversationSession,
    turn: &ExtractedTurn,
) -> String {
    if session.phase == Phase::Greeting {
        session.phase = Phase::NeedsAssessment;
        session.pending_intent = PendingIntent::Booking;
    }

    if let Some(problem) = absorb(session, turn, state.config.booking_horizon_days) {
        return problem;
    }

    // Vague input never advances the flow; re-ask instead of guessing.
    if turn.intent == Intent::Ambiguous {
        return reply_or(
            turn,
            "Could you give me a bit more detail - for example an exact day, or 'morning'/'afternoon'?",
        );
    }

    if !session.collected.needs_met() {
        let missing = if session.collected.appointment_type.is_none() {
            "what kind of appointment you need (general consultation, follow-up, physical exam, or specialist)"
        } else {
            "when you'd like to come in - a date, or just 'as soon as possible'"
        };
        return reply_or(turn, &format!("Happy to help! Could you tell me {missing}?"));
    }

    offer_slots(state, session, "")
}

/// Query the resolver and move to `SlotOffering`, or explain why we cannot.
fn offer_slots(
    state: &Arc<AppState>,
    session: &mut crate::models::ConversationSession,
    prefix: &str,
) -> String {
    let ty = match session.collected.appointment_type {
        Some(ty) => ty,
        None => {
            session.phase = Phase::NeedsAssessment;
            return "What kind of appointment do you need?".to_string();
        }
    };
    let pref = session.collected.time_preference;
    let today = Utc::now().date_naive();

    let found = if let Some(date) = session.collected.date.filter(|_| !session.collected.asap) {
        match state.resolver.find_slots(date, ty, pref) {
            Ok(slots) if !slots.is_empty() => Ok(Some((date, slots))),
            // The requested day has nothing open: escalate to the forward
            // scan rather than dead-ending.
            Ok(_) => state.resolver.first_available(date + Duration::days(1), ty, pref),
            Err(e) => Err(e),
        }
    } else {
        state.resolver.first_available(today, ty, pref)
    };

    match found {
        Ok(Some((date, slots))) => {
            let full_day_note = session
                .collected
                .date
                .filter(|d| *d != date && !session.collected.asap)
                .map(|d| format!("I'm sorry, {} is fully booked. ", d.format("%A, %B %-d")))
                .unwrap_or_default();
            session.collected.date = Some(date);
            session.offered_slots = slots;
            session.chosen_slot = None;
            session.phase = Phase::SlotOffering;
            format!("{prefix}{full_day_note}{}", format_offer(&session.offered_slots))
        }
        Ok(None) => {
            session.offered_slots.clear();
            session.phase = Phase::NeedsAssessment;
            format!(
                "{prefix}I'm sorry - I couldn't find any openings in the next two weeks for a {}. \
                 Would a different appointment type work, or shall I have our staff reach out?",
                ty.label()
            )
        }
        Err(SchedulingError::ServiceUnavailable(_)) => OFFLINE_REPLY.to_string(),
        Err(e) => {
            tracing::error!(error = %e, "availability lookup failed");
            OFFLINE_REPLY.to_string()
        }
    }
}

fn select_slot(session: &mut crate::models::ConversationSession, turn: &ExtractedTurn) -> String {
    let chosen = turn
        .slot_ordinal
        .and_then(|n| n.checked_sub(1))
        .and_then(|i| session.offered_slots.get(i).copied())
        .or_else(|| {
            turn.time
                .as_deref()
                .and_then(|t| NaiveTime::parse_from_str(t.trim(), "%H:%M").ok())
                .and_then(|t| session.offered_slots.iter().find(|s| s.start == t).copied())
        });

    match chosen {
        Some(slot) => {
            session.chosen_slot = Some(slot);
            session.collected.date = Some(slot.date);
            advance_collection(session, &format!(
                "{} on {} it is. ",
                slot.label(),
                slot.date.format("%A, %B %-d")
            ))
        }
        None => format!(
            "I'm sorry, I couldn't match that to one of the times I offered. {}",
            format_offer(&session.offered_slots)
        ),
    }
}

/// A rejected offer advances the search window; this can repeat until the
/// scan comes up dry.
fn offer_further_out(
    state: &Arc<AppState>,
    session: &mut crate::models::ConversationSession,
) -> String {
    let after = session
        .offered_slots
        .last()
        .map(|s| s.date)
        .or(session.collected.date)
        .unwrap_or_else(|| Utc::now().date_naive());

    session.collected.date = None;
    session.collected.asap = true;

    let ty = match session.collected.appointment_type {
        Some(ty) => ty,
        None => {
            session.phase = Phase::NeedsAssessment;
            return "What kind of appointment do you need?".to_string();
        }
    };

    match state.resolver.first_available(
        after + Duration::days(1),
        ty,
        session.collected.time_preference,
    ) {
        Ok(Some((date, slots))) => {
            session.collected.date = Some(date);
            session.collected.asap = false;
            session.offered_slots = slots;
            format!("No trouble. {}", format_offer(&session.offered_slots))
        }
        Ok(None) => format!(
            "I'm sorry - I don't see anything further out within the next two weeks after {}. \
             Would another appointment type or time of day work?",
            after.format("%B %-d")
        ),
        Err(_) => OFFLINE_REPLY.to_string(),
    }
}

fn collecting(
    session: &mut crate::models::ConversationSession,
    turn: &ExtractedTurn,
    field: CollectField,
    horizon_days: i64,
) -> String {
    if let Some(problem) = absorb(session, turn, horizon_days) {
        return problem;
    }

    // Still missing the field we asked for: ask again rather than moving on.
    let still_missing = match field {
        CollectField::Name => session.collected.name.is_none(),
        CollectField::Phone => session.collected.phone.is_none(),
        CollectField::Email => session.collected.email.is_none(),
        CollectField::Reason => session.collected.reason.is_none(),
    };
    if still_missing {
        return prompt_for(field).to_string();
    }

    advance_collection(session, "Thanks! ")
}

/// Move to the next missing patient field, or to confirmation once the set
/// is complete.
fn advance_collection(
    session: &mut crate::models::ConversationSession,
    prefix: &str,
) -> String {
    match session.collected.next_missing() {
        Some(next) => {
            session.phase = Phase::Collecting(next);
            format!("{prefix}{}", prompt_for(next))
        }
        None => {
            session.phase = Phase::Confirming;
            format!("{prefix}{}", restate_confirmation(session))
        }
    }
}

fn book_confirmed(
    state: &Arc<AppState>,
    session: &mut crate::models::ConversationSession,
) -> (String, Option<Booking>) {
    let slot = match session.chosen_slot {
        Some(slot) => slot,
        None => return (offer_slots(state, session, "Let's pick a time first. "), None),
    };
    let collected = &session.collected;
    let request = BookingRequest {
        appointment_type: collected.appointment_type.unwrap_or(AppointmentType::General),
        date: slot.date,
        start: slot.start,
        patient: crate::models::Patient {
            name: collected.name.clone().unwrap_or_default(),
            email: collected.email.clone().unwrap_or_default(),
            phone: collected.phone.clone().unwrap_or_default(),
        },
        reason: collected.reason.clone(),
    };

    match state.bookings.book(request) {
        Ok(booking) => {
            session.phase = Phase::Booked;
            session.pending_intent = PendingIntent::None;
            session.last_booking = Some(crate::models::BookingRef {
                id: booking.id,
                confirmation_code: booking.confirmation_code.clone(),
            });
            session.offered_slots.clear();
            let reply = format!(
                "You're all set! {} for {}. We'll see you then - keep your confirmation code handy.",
                booking.summary(),
                booking.patient.name,
            );
            (reply, Some(booking))
        }
        // Someone else took the slot between offer and confirm: apologize
        // and return to offering, never to Booked.
        Err(SchedulingError::Conflict) => {
            session.chosen_slot = None;
            let reply = offer_slots(
                state,
                session,
                "I'm so sorry - that time was just taken by another patient. ",
            );
            (reply, None)
        }
        Err(SchedulingError::Validation { field, message }) => {
            match field {
                CollectField::Name => session.collected.name = None,
                CollectField::Phone => session.collected.phone = None,
                CollectField::Email => session.collected.email = None,
                CollectField::Reason => session.collected.reason = None,
            }
            session.phase = Phase::Collecting(field);
            (format!("Sorry, {message}. {}", prompt_for(field)), None)
        }
        Err(SchedulingError::InvalidSlot(message)) => {
            session.chosen_slot = None;
            let reply = offer_slots(state, session, &format!("I'm sorry - {message}. "));
            (reply, None)
        }
        Err(SchedulingError::ServiceUnavailable(_)) => (OFFLINE_REPLY.to_string(), None),
        Err(SchedulingError::NotFound) => (OFFLINE_REPLY.to_string(), None),
    }
}

fn cancel_flow(
    state: &Arc<AppState>,
    session: &mut crate::models::ConversationSession,
    turn: &ExtractedTurn,
) -> String {
    let code = turn
        .confirmation_code
        .clone()
        .or_else(|| session.last_booking.as_ref().map(|b| b.confirmation_code.clone()));

    let code = match code {
        Some(code) => code,
        None => {
            return "I can help with that - what's the confirmation code from your booking?"
                .to_string()
        }
    };

    match state.bookings.cancel_by_code(&code) {
        Ok(cancelled) => {
            session.last_booking = None;
            start_new_flow(session);
            // A cancel that arrives with new scheduling details is a
            // reschedule: cancel-then-book, not an atomic move.
            let _ = absorb(session, turn, state.config.booking_horizon_days);
            if turn.date.is_some() || turn.time_preference.is_some() {
                session.pending_intent = PendingIntent::Reschedule;
                session.collected.appointment_type = session
                    .collected
                    .appointment_type
                    .or(Some(cancelled.appointment_type));
                let offer = offer_slots(state, session, "");
                format!(
                    "Done - I've cancelled your {}. {}",
                    cancelled.summary(),
                    offer
                )
            } else {
                session.pending_intent = PendingIntent::Cancel;
                format!(
                    "Done - I've cancelled your {}. Would you like to book a new time?",
                    cancelled.summary()
                )
            }
        }
        Err(SchedulingError::NotFound) => format!(
            "I couldn't find an active booking with the code {code}. Could you double-check it?"
        ),
        Err(SchedulingError::ServiceUnavailable(_)) => OFFLINE_REPLY.to_string(),
        Err(e) => {
            tracing::error!(error = %e, "cancellation failed");
            OFFLINE_REPLY.to_string()
        }
    }
}

async fn faq_detour(
    state: &Arc<AppState>,
    session: &mut crate::models::ConversationSession,
    question: &str,
) -> String {
    // Depth-1 interrupt: remember only the phase we're detouring from, then
    // restore it no matter how the lookup went.
    session.resume_phase = Some(session.phase);
    let previous_intent = session.pending_intent;
    session.pending_intent = PendingIntent::Faq;

    let answer = state.faq.answer(question).await;

    let interrupted = session.resume_phase.take().unwrap_or(session.phase);
    session.phase = interrupted;
    session.pending_intent = previous_intent;

    match answer {
        Ok(Some(text)) => join_reply(&text, resume_prompt(interrupted)),
        Ok(None) => join_reply(
            "I don't have that information on hand, but I can have our staff follow up with you.",
            resume_prompt(interrupted),
        ),
        Err(e) => {
            tracing::error!(error = %e, "FAQ retrieval failed");
            DEGRADED_REPLY.to_string()
        }
    }
}

// ── Helpers ──

/// Fold the turn's extracted fields into the session, validating as we go.
/// Returns a corrective reply when an extracted value has to be rejected.
fn absorb(
    session: &mut crate::models::ConversationSession,
    turn: &ExtractedTurn,
    horizon_days: i64,
) -> Option<String> {
    let collected = &mut session.collected;

    if let Some(ty) = turn
        .appointment_type
        .as_deref()
        .and_then(AppointmentType::parse_loose)
    {
        collected.appointment_type = Some(ty);
    }

    if let Some(pref) = turn.time_preference.as_deref() {
        if pref.eq_ignore_ascii_case("asap") {
            collected.asap = true;
        } else if let Some(p) = TimePreference::parse(pref) {
            collected.time_preference = Some(p);
        }
    }

    if let Some(name) = non_empty(&turn.patient_name) {
        collected.name = Some(name);
    }
    if let Some(phone) = non_empty(&turn.patient_phone) {
        collected.phone = Some(phone);
    }
    if let Some(reason) = non_empty(&turn.reason) {
        collected.reason = Some(reason);
    }
    if let Some(email) = non_empty(&turn.patient_email) {
        if crate::services::booking::is_well_formed_email(&email) {
            collected.email = Some(email);
        } else {
            return Some(format!(
                "Hmm, '{email}' doesn't look like a valid email address. Could you spell it out again?"
            ));
        }
    }

    // Extracted dates are untrusted: reject anything in the past or absurdly
    // far out instead of storing it.
    if let Some(raw) = turn.date.as_deref() {
        match NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d") {
            Ok(date) => {
                let today = Utc::now().date_naive();
                if date < today {
                    return Some(
                        "That date has already passed - could you give me a day from today onward?"
                            .to_string(),
                    );
                }
                if date > today + Duration::days(horizon_days) {
                    return Some(format!(
                        "We can only book up to {horizon_days} days ahead. Could you pick an earlier date?"
                    ));
                }
                collected.date = Some(date);
                collected.asap = false;
            }
            Err(_) => {
                tracing::debug!(raw, "discarding unparseable extracted date");
            }
        }
    }

    None
}

fn start_new_flow(session: &mut crate::models::ConversationSession) {
    // Contact details usually carry over to the next booking; the rest is
    // flow state.
    let name = session.collected.name.take();
    let phone = session.collected.phone.take();
    let email = session.collected.email.take();
    session.reset_flow();
    session.collected.name = name;
    session.collected.phone = phone;
    session.collected.email = email;
    session.pending_intent = PendingIntent::Booking;
}

fn format_offer(slots: &[TimeSlot]) -> String {
    if slots.is_empty() {
        return "I have no open times to offer right now.".to_string();
    }
    let date = slots[0].date;
    let lines = slots
        .iter()
        .enumerate()
        .map(|(i, s)| format!("{}. {}", i + 1, s.label()))
        .collect::<Vec<_>>()
        .join("\n");
    format!(
        "Here's what we have on {}:\n{lines}\nWould any of these work for you?",
        date.format("%A, %B %-d")
    )
}

fn restate_confirmation(session: &crate::models::ConversationSession) -> String {
    let collected = &session.collected;
    let slot = match session.chosen_slot {
        Some(slot) => slot,
        None => return "Let's pick a time first - which slot would you like?".to_string(),
    };
    let ty = collected
        .appointment_type
        .unwrap_or(AppointmentType::General);
    format!(
        "Let me confirm: a {} on {} from {}.\n\
         Name: {}\nPhone: {}\nEmail: {}\nReason: {}\n\
         Shall I book it?",
        ty.label(),
        slot.date.format("%A, %B %-d"),
        slot.label(),
        collected.name.as_deref().unwrap_or("-"),
        collected.phone.as_deref().unwrap_or("-"),
        collected.email.as_deref().unwrap_or("-"),
        collected.reason.as_deref().unwrap_or("-"),
    )
}

fn prompt_for(field: CollectField) -> &'static str {
    match field {
        CollectField::Name => "May I have your full name?",
        CollectField::Phone => "What's the best phone number to reach you?",
        CollectField::Email => "And your email address?",
        CollectField::Reason => "Briefly, what's the reason for your visit?",
    }
}

/// What to say after an FAQ detour so the interrupted flow picks right back
/// up.
fn resume_prompt(phase: Phase) -> &'static str {
    match phase {
        Phase::Collecting(field) => match field {
            CollectField::Name => "Now, back to your booking - may I have your full name?",
            CollectField::Phone => {
                "Now, back to your booking - what's the best phone number to reach you?"
            }
            CollectField::Email => "Now, back to your booking - what's your email address?",
            CollectField::Reason => {
                "Now, back to your booking - briefly, what's the reason for your visit?"
            }
        },
        Phase::SlotOffering => "Would any of the times I offered work for you?",
        Phase::Confirming => "And shall I go ahead with the appointment we discussed?",
        Phase::NeedsAssessment => {
            "Now, what kind of appointment do you need, and when would suit you?"
        }
        Phase::Greeting | Phase::Booked => "Is there anything else I can help you with?",
    }
}

fn join_reply(answer: &str, resume: &str) -> String {
    if resume.is_empty() {
        answer.to_string()
    } else {
        format!("{answer}\n\n{resume}")
    }
}

fn reply_or(turn: &ExtractedTurn, fallback: &str) -> String {
    let reply = turn.message_to_patient.trim();
    if reply.is_empty() {
        fallback.to_string()
    } else {
        reply.to_string()
    }
}

fn non_empty(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}
