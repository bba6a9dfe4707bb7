//! Booking concierge: therapist suggestions, translation, review replies.

use std::sync::{Arc, LazyLock};

use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::prompts::{concierge_system_prompt, review_response_prompt, translation_prompt};
use crate::booking::model::{Recommendation, TherapistRef};
use crate::error::LlmError;
use crate::llm::{ChatMessage, CompletionRequest, LlmProvider, response_cost};

static CODE_FENCE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)```(?:json)?\s*(.*?)```").expect("valid fence regex"));

/// What the concierge said back.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConciergeReply {
    pub message: String,
    #[serde(default)]
    pub recommendations: Vec<Recommendation>,
}

#[derive(Debug, Deserialize)]
struct RawReply {
    #[serde(default)]
    message: String,
    #[serde(default)]
    recommendations: Vec<RawRecommendation>,
}

#[derive(Debug, Deserialize)]
struct RawRecommendation {
    #[serde(alias = "therapistId", alias = "id")]
    therapist_id: String,
    #[serde(default)]
    reason: String,
}

/// A review a therapist wants to answer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReviewInput {
    /// 1-5 stars.
    pub rating: u8,
    pub comment: String,
    #[serde(default)]
    pub therapist_name: Option<String>,
}

pub struct Concierge {
    llm: Arc<dyn LlmProvider>,
}

impl Concierge {
    pub fn new(llm: Arc<dyn LlmProvider>) -> Self {
        Self { llm }
    }

    async fn ask(&self, request: CompletionRequest, purpose: &str) -> Result<String, LlmError> {
        let response = self.llm.complete(request).await?;
        debug!(
            purpose,
            model = self.llm.model_name(),
            cost_usd = %response_cost(self.llm.as_ref(), &response),
            "Concierge call finished"
        );
        Ok(response.content)
    }

    /// Suggest therapists for a free-text request.
    ///
    /// The reply is passed through as-is; ids are not checked against
    /// `candidates` here.
    pub async fn recommend(
        &self,
        input: &str,
        when: Option<&str>,
        candidates: &[TherapistRef],
    ) -> Result<ConciergeReply, LlmError> {
        let request = CompletionRequest::new(vec![
            ChatMessage::system(concierge_system_prompt(candidates, when)),
            ChatMessage::user(input),
        ])
        .with_max_tokens(1024)
        .with_temperature(0.4);

        let text = self.ask(request, "recommend").await?;
        Ok(parse_reply(&text))
    }

    /// Translate `text` into `target_language`.
    pub async fn translate(&self, text: &str, target_language: &str) -> Result<String, LlmError> {
        if text.trim().is_empty() {
            return Ok(String::new());
        }
        let request = CompletionRequest::new(vec![
            ChatMessage::system(translation_prompt(target_language)),
            ChatMessage::user(text),
        ])
        .with_temperature(0.0);
        Ok(self.ask(request, "translate").await?.trim().to_string())
    }

    /// Draft a public reply to a customer review.
    pub async fn draft_review_response(&self, review: &ReviewInput) -> Result<String, LlmError> {
        let rating = review.rating.clamp(1, 5);
        let request = CompletionRequest::new(vec![
            ChatMessage::system(review_response_prompt(
                rating,
                review.therapist_name.as_deref(),
            )),
            ChatMessage::user(&review.comment),
        ])
        .with_max_tokens(400)
        .with_temperature(0.7);
        Ok(self.ask(request, "review_response").await?.trim().to_string())
    }
}

/// Pull the JSON object out of a model reply that may be fenced or wrapped
/// in prose.
pub(crate) fn extract_json_object(text: &str) -> String {
    let trimmed = text.trim();
    if trimmed.starts_with('{') {
        return trimmed.to_string();
    }
    if let Some(caps) = CODE_FENCE.captures(trimmed) {
        let inner = caps[1].trim();
        if inner.starts_with('{') {
            return inner.to_string();
        }
    }
    if let (Some(start), Some(end)) = (trimmed.find('{'), trimmed.rfind('}'))
        && end > start
    {
        return trimmed[start..=end].to_string();
    }
    trimmed.to_string()
}

/// Parse a concierge reply. Text that is not the expected JSON becomes a
/// plain message with no recommendations.
fn parse_reply(text: &str) -> ConciergeReply {
    let json = extract_json_object(text);
    match serde_json::from_str::<RawReply>(&json) {
        Ok(raw) => ConciergeReply {
            message: raw.message,
            recommendations: raw
                .recommendations
                .into_iter()
                .filter(|r| !r.therapist_id.trim().is_empty())
                .map(|r| Recommendation {
                    therapist_id: r.therapist_id,
                    reason: r.reason,
                })
                .collect(),
        },
        Err(e) => {
            warn!(error = %e, "Concierge reply was not JSON; showing it as text");
            ConciergeReply {
                message: text.trim().to_string(),
                recommendations: Vec::new(),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::Role;
    use crate::llm::stub::StubLlm;

    #[test]
    fn fenced_json_is_unwrapped() {
        let reply = parse_reply(
            "Here you go:\n```json\n{\"message\":\"Try Aoi\",\"recommendations\":[{\"therapistId\":\"t1\",\"reason\":\"deep tissue\"}]}\n```",
        );
        assert_eq!(reply.message, "Try Aoi");
        assert_eq!(
            reply.recommendations,
            vec![Recommendation {
                therapist_id: "t1".into(),
                reason: "deep tissue".into()
            }]
        );
    }

    #[test]
    fn prose_reply_falls_back_to_message() {
        let reply = parse_reply("Could you tell me which area you are in?");
        assert_eq!(reply.message, "Could you tell me which area you are in?");
        assert!(reply.recommendations.is_empty());
    }

    #[test]
    fn blank_ids_are_dropped() {
        let reply = parse_reply(
            r#"{"message":"ok","recommendations":[{"therapist_id":" "},{"therapist_id":"t2"}]}"#,
        );
        assert_eq!(reply.recommendations.len(), 1);
        assert_eq!(reply.recommendations[0].therapist_id, "t2");
        assert!(reply.recommendations[0].reason.is_empty());
    }

    #[test]
    fn embedded_object_is_found() {
        assert_eq!(extract_json_object("sure {\"a\":1} done"), "{\"a\":1}");
    }

    #[tokio::test]
    async fn recommend_sends_candidates_in_system_prompt() {
        let llm = Arc::new(StubLlm::replying(&[
            r#"{"message":"Aoi is great for stiff shoulders","recommendations":[{"therapist_id":"t1","reason":"shoulders"}]}"#,
        ]));
        let concierge = Concierge::new(llm.clone());
        let reply = concierge
            .recommend(
                "My shoulders are stiff",
                Some("tomorrow evening"),
                &[TherapistRef::new("t1", "Aoi")],
            )
            .await
            .unwrap();
        assert_eq!(reply.recommendations[0].therapist_id, "t1");

        let request = llm.last_request().unwrap();
        assert_eq!(request.messages[0].role, Role::System);
        assert!(request.messages[0].content.contains("id=t1 name=Aoi"));
        assert_eq!(request.messages[1].content, "My shoulders are stiff");
    }

    #[tokio::test]
    async fn translate_skips_blank_text() {
        let llm = Arc::new(StubLlm::replying(&["  Hello  "]));
        let concierge = Concierge::new(llm.clone());
        assert_eq!(concierge.translate("   ", "English").await.unwrap(), "");
        assert!(llm.last_request().is_none());
        assert_eq!(concierge.translate("こんにちは", "English").await.unwrap(), "Hello");
    }

    #[tokio::test]
    async fn review_reply_is_trimmed() {
        let llm = Arc::new(StubLlm::replying(&["\nThank you for visiting!\n"]));
        let concierge = Concierge::new(llm.clone());
        let reply = concierge
            .draft_review_response(&ReviewInput {
                rating: 9,
                comment: "Loved it".into(),
                therapist_name: Some("Aoi".into()),
            })
            .await
            .unwrap();
        assert_eq!(reply, "Thank you for visiting!");
        let request = llm.last_request().unwrap();
        assert!(request.messages[0].content.contains("5 out of 5"));
    }

    #[tokio::test]
    async fn llm_failure_propagates() {
        let concierge = Concierge::new(Arc::new(StubLlm::failing()));
        assert!(concierge.recommend("hi", None, &[]).await.is_err());
    }
}
