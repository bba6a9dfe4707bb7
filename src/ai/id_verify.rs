//! ID-document checks for the KYC gate.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::info;

use super::concierge::extract_json_object;
use super::prompts::id_verification_prompt;
use crate::error::LlmError;
use crate::llm::{ChatMessage, CompletionRequest, ImageContent, LlmProvider};

/// An uploaded ID document image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdImage {
    pub media_type: String,
    pub bytes: Vec<u8>,
}

/// Result of an ID check, as reported by the model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdVerification {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub birthdate: Option<String>,
    #[serde(alias = "isValid")]
    pub is_valid: bool,
    #[serde(default)]
    pub reason: String,
}

pub struct IdVerifier {
    llm: Arc<dyn LlmProvider>,
}

impl IdVerifier {
    pub fn new(llm: Arc<dyn LlmProvider>) -> Self {
        Self { llm }
    }

    /// Ask the model to read the document. No local checks are applied to
    /// the answer.
    pub async fn verify(&self, image: &IdImage) -> Result<IdVerification, LlmError> {
        let request = CompletionRequest::new(vec![
            ChatMessage::system(id_verification_prompt()),
            ChatMessage::user("Please check this ID document.")
                .with_image(ImageContent::from_bytes(&image.media_type, &image.bytes)),
        ])
        .with_max_tokens(512)
        .with_temperature(0.0);

        let response = self.llm.complete(request).await?;
        let json = extract_json_object(&response.content);
        let verification: IdVerification =
            serde_json::from_str(&json).map_err(|e| LlmError::InvalidResponse {
                provider: self.llm.model_name().to_string(),
                reason: format!("ID check reply was not the expected JSON: {e}"),
            })?;
        info!(is_valid = verification.is_valid, "ID document checked");
        Ok(verification)
    }
}
