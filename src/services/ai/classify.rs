use crate::models::{ConversationSession, ExtractedTurn, Intent};
use crate::services::ai::{LlmProvider, Message};

const SYSTEM_PROMPT: &str = r#"You are the intent extraction engine for a clinic's appointment assistant. Analyze the patient's latest message in the context of the conversation.

Return ONLY valid JSON (no markdown, no explanation) with this exact structure:
{
  "intent": "ask_faq|provide_detail|select_slot|reject_slots|confirm|restart|cancel_request|ambiguous",
  "appointment_type": "general|followup|physical|specialist or null",
  "date": "resolved date like 2025-01-15 or null",
  "time": "exact start time like 14:00 or null",
  "time_preference": "morning|afternoon|evening|asap or null",
  "slot_ordinal": 2,
  "patient_name": "extracted name or null",
  "patient_email": "extracted email or null",
  "patient_phone": "extracted phone or null",
  "reason": "reason for the visit or null",
  "confirmation_code": "booking code the patient mentioned or null",
  "message_to_patient": "Your friendly reply to the patient"
}

Intent rules:
- "ask_faq": the patient asks about the clinic itself (hours, location, insurance, parking, services) rather than the booking in progress
- "provide_detail": the patient supplies booking information (appointment type, symptoms, dates, name, phone, email, reason)
- "select_slot": the patient picks one of the offered time slots, by position ("the second one" -> slot_ordinal 2) or by exact start time
- "reject_slots": none of the offered slots work for the patient
- "confirm": the patient explicitly agrees to book the restated appointment (yes / that's right / book it)
- "restart": the patient wants to start the booking over
- "cancel_request": the patient wants to cancel an existing booking
- "ambiguous": the message is too vague to act on ("around 3", "sometime next week" with no date)

Date rules:
- Resolve relative expressions ("tomorrow", "next Tuesday") to a concrete YYYY-MM-DD date using the current date in the context below.
- "as soon as possible" and similar urgency means time_preference "asap".
- Never invent a date the patient did not imply; use null and let the assistant ask.

For message_to_patient: be warm and professional, keep it short, and never mention tools, JSON, or internal state.
"#;

/// Ask the language model to classify one utterance. The session's recent
/// turns ride along as context; the reply is parsed defensively because
/// models wrap JSON in prose or fences more often than not.
pub async fn classify_turn(
    llm: &dyn LlmProvider,
    session: &ConversationSession,
    latest_message: &str,
    clinic_context: &str,
) -> anyhow::Result<ExtractedTurn> {
    // Last few turns are enough context for slot references like
    // "the second one".
    let mut messages: Vec<Message> = session
        .messages
        .iter()
        .rev()
        .take(8)
        .rev()
        .map(|m| Message { role: m.role.clone(), content: m.content.clone() })
        .collect();

    messages.push(Message {
        role: "user".to_string(),
        content: latest_message.to_string(),
    });

    let system = format!("{SYSTEM_PROMPT}\nContext:\n{clinic_context}");

    let response = llm.chat(&system, &messages).await?;

    Ok(parse_turn_response(&response))
}

fn parse_turn_response(response: &str) -> ExtractedTurn {
    if let Ok(turn) = serde_json::from_str::<ExtractedTurn>(response) {
        return turn;
    }

    // Strip markdown code fences
    let cleaned = response
        .trim()
        .strip_prefix("```json")
        .or_else(|| response.trim().strip_prefix("```"))
        .unwrap_or(response.trim());
    let cleaned = cleaned.strip_suffix("```").unwrap_or(cleaned).trim();

    if let Ok(turn) = serde_json::from_str::<ExtractedTurn>(cleaned) {
        return turn;
    }

    // Try to find a JSON object embedded in prose
    if let (Some(start), Some(end)) = (cleaned.find('{'), cleaned.rfind('}')) {
        if start < end {
            if let Ok(turn) = serde_json::from_str::<ExtractedTurn>(&cleaned[start..=end]) {
                return turn;
            }
        }
    }

    // Fallback: treat the whole response as an ambiguous reply
    tracing::warn!("failed to parse LLM response as turn JSON, using fallback");
    ExtractedTurn {
        intent: Intent::Ambiguous,
        appointment_type: None,
        date: None,
        time: None,
        time_preference: None,
        slot_ordinal: None,
        patient_name: None,
        patient_email: None,
        patient_phone: None,
        reason: None,
        confirmation_code: None,
        message_to_patient: response.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_valid_json() {
        let json = r#"{"intent":"provide_detail","appointment_type":"general","date":"2030-06-17","time":null,"time_preference":"morning","slot_ordinal":null,"patient_name":null,"patient_email":null,"patient_phone":null,"reason":"checkup","confirmation_code":null,"message_to_patient":"Let me check Monday morning for you."}"#;
        let turn = parse_turn_response(json);
        assert_eq!(turn.intent, Intent::ProvideDetail);
        assert_eq!(turn.appointment_type.as_deref(), Some("general"));
        assert_eq!(turn.date.as_deref(), Some("2030-06-17"));
    }

    #[test]
    fn test_parse_markdown_fenced_json() {
        let json = "```json\n{\"intent\":\"confirm\",\"message_to_patient\":\"Booking it now!\"}\n```";
        let turn = parse_turn_response(json);
        assert_eq!(turn.intent, Intent::Confirm);
        assert_eq!(turn.message_to_patient, "Booking it now!");
    }

    #[test]
    fn test_parse_json_embedded_in_prose() {
        let raw = "Sure! Here is the result: {\"intent\":\"select_slot\",\"slot_ordinal\":2,\"message_to_patient\":\"The second slot it is.\"} Hope that helps.";
        let turn = parse_turn_response(raw);
        assert_eq!(turn.intent, Intent::SelectSlot);
        assert_eq!(turn.slot_ordinal, Some(2));
    }

    #[test]
    fn test_parse_fallback_is_ambiguous() {
        let raw = "I can't produce JSON right now";
        let turn = parse_turn_response(raw);
        assert_eq!(turn.intent, Intent::Ambiguous);
        assert_eq!(turn.message_to_patient, raw);
    }

    #[test]
    fn test_missing_optional_fields_default() {
        let json = r#"{"intent":"reject_slots","message_to_patient":"Let me look further out."}"#;
        let turn = parse_turn_response(json);
        assert_eq!(turn.intent, Intent::RejectSlots);
        assert!(turn.date.is_none());
        assert!(turn.slot_ordinal.is_none());
    }
}
