//! Prompt text for the concierge, translation, review replies, and ID checks.

use crate::booking::model::TherapistRef;

/// System prompt for the booking concierge.
///
/// The model is handed the candidate therapists and must answer with a JSON
/// object so the reply can be parsed without a second call.
pub fn concierge_system_prompt(candidates: &[TherapistRef], when: Option<&str>) -> String {
    let mut prompt = String::from(
        "\
You are the booking concierge of a wellness marketplace (massage, body care, relaxation).
Listen to what the user wants and suggest up to three therapists from the list below.
Only recommend therapists that appear in the list, using their exact id.

Respond with ONLY a JSON object, no prose around it:
{\"message\": \"<one or two friendly sentences>\", \"recommendations\": [{\"therapist_id\": \"<id>\", \"reason\": \"<why they fit>\"}]}
If nothing fits, return an empty recommendations array and ask a follow-up question in message.
",
    );

    if let Some(when) = when {
        prompt.push_str(&format!("\nThe user wants to book for: {when}\n"));
    }

    prompt.push_str("\nTherapists:\n");
    if candidates.is_empty() {
        prompt.push_str("(none available)\n");
    }
    for t in candidates {
        prompt.push_str(&format!("- id={} name={}", t.id, t.name));
        if !t.specialties.is_empty() {
            prompt.push_str(&format!(" specialties={}", t.specialties.join(", ")));
        }
        if let Some(rating) = t.rating {
            prompt.push_str(&format!(" rating={rating:.1}"));
        }
        prompt.push('\n');
    }
    prompt
}

pub fn translation_prompt(target_language: &str) -> String {
    format!(
        "Translate the user's message into {target_language}. \
Output only the translation, keeping names and numbers unchanged."
    )
}

/// Prompt for drafting a therapist's public reply to a review.
pub fn review_response_prompt(rating: u8, therapist_name: Option<&str>) -> String {
    let signer = therapist_name.unwrap_or("the therapist");
    let tone = if rating <= 2 {
        "Apologize sincerely, acknowledge the specific problem, and say how it will be addressed."
    } else {
        "Thank the guest warmly and mention something specific from their review."
    };
    format!(
        "You draft short public replies to customer reviews on behalf of {signer}. \
The review has {rating} out of 5 stars. {tone} \
Keep it under 80 words, polite, and do not promise refunds. Output only the reply text."
    )
}

pub fn id_verification_prompt() -> &'static str {
    "\
You check identity documents for a home-visit wellness service.
Look at the attached image of an ID document (driver's license, passport, residence card, or My Number card).
Respond with ONLY a JSON object:
{\"name\": \"<full name or null>\", \"birthdate\": \"<YYYY-MM-DD or null>\", \"is_valid\": <true|false>, \"reason\": \"<short explanation>\"}
is_valid is true only when the image clearly shows an official ID with a readable name and birthdate."
}
