//! Concierge chat, the first step of AI-assisted booking.

use serde::Serialize;
use tracing::warn;

use crate::ai::{Concierge, ConciergeReply};
use crate::api::{BookingApi, TherapistQuery};
use crate::booking::model::{BookingData, BookingPatch, Recommendation, TherapistRef};
use crate::booking::state::StepKind;
use crate::error::ValidationError;
use crate::llm::Role;

use super::{FetchState, StepView};

const FALLBACK_REPLY: &str = "Sorry, the concierge is unavailable right now. Please try again.";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChatTurn {
    pub role: Role,
    pub text: String,
}

#[derive(Debug, Clone, Default)]
pub struct ChatStep {
    transcript: Vec<ChatTurn>,
    candidates: FetchState<Vec<TherapistRef>>,
    recommendations: Vec<Recommendation>,
    when: Option<String>,
}

impl ChatStep {
    pub fn for_data(data: &BookingData) -> Self {
        Self {
            recommendations: data.recommendations.clone(),
            ..Default::default()
        }
    }

    /// Preferred date/time to pass along with every request.
    pub fn set_when(&mut self, when: Option<String>) {
        self.when = when.filter(|w| !w.trim().is_empty());
    }

    /// Fetch the therapists the concierge may choose from.
    pub async fn load(&mut self, api: &dyn BookingApi) {
        self.candidates = FetchState::Loading;
        let result = api.list_therapists(&TherapistQuery::default()).await;
        self.candidates = FetchState::settle(result, "concierge candidates", |t| t.is_empty());
    }

    pub fn candidates(&self) -> &FetchState<Vec<TherapistRef>> {
        &self.candidates
    }

    pub fn transcript(&self) -> &[ChatTurn] {
        &self.transcript
    }

    pub fn recommendations(&self) -> &[Recommendation] {
        &self.recommendations
    }

    /// Send one message. A failed call leaves an apology in the transcript
    /// and keeps earlier recommendations.
    pub async fn send(
        &mut self,
        concierge: &Concierge,
        input: &str,
    ) -> Result<&ChatTurn, ValidationError> {
        let input = input.trim();
        if input.is_empty() {
            return Err(ValidationError::EmptyMessage);
        }
        self.transcript.push(ChatTurn {
            role: Role::User,
            text: input.to_string(),
        });

        let candidates = self.candidates.ready().map(Vec::as_slice).unwrap_or(&[]);
        let text = match concierge
            .recommend(input, self.when.as_deref(), candidates)
            .await
        {
            Ok(ConciergeReply {
                message,
                recommendations,
            }) => {
                if !recommendations.is_empty() {
                    self.recommendations = recommendations;
                }
                message
            }
            Err(e) => {
                warn!(error = %e, "Concierge request failed");
                FALLBACK_REPLY.to_string()
            }
        };

        self.transcript.push(ChatTurn {
            role: Role::Assistant,
            text,
        });
        Ok(&self.transcript[self.transcript.len() - 1])
    }
}

impl StepView for ChatStep {
    fn kind(&self) -> StepKind {
        StepKind::Chat
    }

    fn confirm(&self, _data: &BookingData) -> Result<BookingPatch, ValidationError> {
        if self.recommendations.is_empty() {
            return Err(ValidationError::NoRecommendation);
        }
        Ok(BookingPatch {
            recommendations: Some(self.recommendations.clone()),
            ..Default::default()
        })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::api::fake::FakeBookingApi;
    use crate::booking::model::BookingPattern;
    use crate::llm::stub::StubLlm;

    #[tokio::test]
    async fn latest_recommendations_are_confirmed() {
        let api = FakeBookingApi::with_catalog();
        let llm = Arc::new(StubLlm::replying(&[
            r#"{"message":"Where are you?","recommendations":[]}"#,
            r#"{"message":"Try Ren","recommendations":[{"therapist_id":"t2","reason":"evenings"}]}"#,
        ]));
        let concierge = Concierge::new(llm.clone());
        let data = BookingData::new(BookingPattern::AiRecommend);

        let mut step = ChatStep::for_data(&data);
        step.load(&api).await;
        step.set_when(Some("2025-05-25 19:00".into()));

        assert_eq!(
            step.send(&concierge, "  ").await.unwrap_err(),
            ValidationError::EmptyMessage
        );

        step.send(&concierge, "I need a massage").await.unwrap();
        assert_eq!(step.confirm(&data), Err(ValidationError::NoRecommendation));

        let reply = step.send(&concierge, "Ebisu, after work").await.unwrap();
        assert_eq!(reply.text, "Try Ren");
        assert_eq!(step.transcript().len(), 4);

        let patch = step.confirm(&data).unwrap();
        assert_eq!(patch.recommendations.unwrap()[0].therapist_id, "t2");

        let prompt = &llm.last_request().unwrap().messages[0].content;
        assert!(prompt.contains("id=t2 name=Ren"));
        assert!(prompt.contains("2025-05-25 19:00"));
    }

    #[tokio::test]
    async fn failure_keeps_chat_going() {
        let concierge = Concierge::new(Arc::new(StubLlm::failing()));
        let mut step = ChatStep::default();
        let reply = step.send(&concierge, "hello").await.unwrap();
        assert_eq!(reply.role, Role::Assistant);
        assert_eq!(reply.text, FALLBACK_REPLY);
    }
}
