//! Identity verification shown while the KYC gate is pending.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;

use crate::ai::{IdImage, IdVerification, IdVerifier};
use crate::booking::model::{BookingData, BookingPatch};
use crate::booking::state::StepKind;
use crate::error::{LlmError, ValidationError};

use super::StepView;

#[derive(Debug, Clone, Default)]
pub struct KycStep {
    image: Option<IdImage>,
    result: Option<IdVerification>,
}

impl KycStep {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn attach(&mut self, media_type: &str, bytes: Vec<u8>) {
        self.image = Some(IdImage {
            media_type: media_type.to_string(),
            bytes,
        });
        self.result = None;
    }

    /// Attach a `data:<mime>;base64,<payload>` URL as produced by a file input.
    pub fn attach_data_url(&mut self, url: &str) -> Result<(), ValidationError> {
        let (header, payload) = url
            .strip_prefix("data:")
            .and_then(|rest| rest.split_once(','))
            .ok_or(ValidationError::KycImageMissing)?;
        let media_type = header
            .strip_suffix(";base64")
            .filter(|m| m.starts_with("image/"))
            .ok_or(ValidationError::KycImageMissing)?;
        let bytes = STANDARD
            .decode(payload.trim())
            .map_err(|_| ValidationError::KycImageMissing)?;
        if bytes.is_empty() {
            return Err(ValidationError::KycImageMissing);
        }
        self.attach(media_type, bytes);
        Ok(())
    }

    pub fn has_image(&self) -> bool {
        self.image.is_some()
    }

    /// Run the check. The result is kept for display whatever it says.
    pub async fn verify(&mut self, verifier: &IdVerifier) -> Result<&IdVerification, KycError> {
        let image = self.image.as_ref().ok_or(ValidationError::KycImageMissing)?;
        let result = verifier.verify(image).await?;
        Ok(self.result.insert(result))
    }

    pub fn result(&self) -> Option<&IdVerification> {
        self.result.as_ref()
    }
}

/// Why a KYC attempt could not produce a result.
#[derive(Debug, thiserror::Error)]
pub enum KycError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    Llm(#[from] LlmError),
}

impl StepView for KycStep {
    fn kind(&self) -> StepKind {
        StepKind::Kyc
    }

    /// KYC writes nothing; it only has to have passed.
    fn confirm(&self, _data: &BookingData) -> Result<BookingPatch, ValidationError> {
        match &self.result {
            None => Err(ValidationError::KycImageMissing),
            Some(r) if !r.is_valid => Err(ValidationError::KycRejected(r.reason.clone())),
            Some(_) => Ok(BookingPatch::default()),
        }
    }
}
