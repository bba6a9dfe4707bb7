//! Anthropic Messages API client.

use std::time::Duration;

use async_trait::async_trait;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use tracing::{debug, info, warn};

use super::provider::{
    ChatMessage, CompletionRequest, CompletionResponse, FinishReason, LlmProvider, Role,
};
use crate::config::LlmSettings;
use crate::error::LlmError;

const PROVIDER: &str = "anthropic";
const API_VERSION: &str = "2023-06-01";
const DEFAULT_MAX_TOKENS: u32 = 1024;

/// Maximum number of retries for transient errors.
const MAX_RETRIES: u32 = 3;

/// Initial backoff delay for retries.
const INITIAL_BACKOFF_MS: u64 = 500;

fn is_retryable_status(status: u16) -> bool {
    matches!(status, 408 | 500 | 502 | 503 | 504 | 529)
}

pub struct AnthropicProvider {
    model: String,
    api_key: SecretString,
    base_url: String,
    http: reqwest::Client,
    backoff: Duration,
}

impl AnthropicProvider {
    pub fn new(settings: &LlmSettings) -> Self {
        info!(model = %settings.model, "Using Anthropic");
        Self {
            model: settings.model.clone(),
            api_key: settings.api_key.clone(),
            base_url: settings.base_url.trim_end_matches('/').to_string(),
            http: reqwest::Client::new(),
            backoff: Duration::from_millis(INITIAL_BACKOFF_MS),
        }
    }

    /// Override the initial retry backoff.
    pub fn with_backoff(mut self, backoff: Duration) -> Self {
        self.backoff = backoff;
        self
    }

    fn build_body(&self, request: &CompletionRequest) -> serde_json::Value {
        let system = request
            .messages
            .iter()
            .filter(|m| m.role == Role::System)
            .map(|m| m.content.as_str())
            .collect::<Vec<_>>()
            .join("\n\n");

        let messages: Vec<serde_json::Value> = request
            .messages
            .iter()
            .filter(|m| m.role != Role::System)
            .map(convert_message)
            .collect();

        let mut body = serde_json::json!({
            "model": self.model,
            "max_tokens": request.max_tokens.unwrap_or(DEFAULT_MAX_TOKENS),
            "messages": messages,
        });
        if !system.is_empty() {
            body["system"] = serde_json::json!(system);
        }
        if let Some(temperature) = request.temperature {
            body["temperature"] = serde_json::json!(temperature);
        }
        body
    }
}

fn convert_message(msg: &ChatMessage) -> serde_json::Value {
    let role = match msg.role {
        Role::Assistant => "assistant",
        Role::User | Role::System => "user",
    };
    if msg.images.is_empty() {
        return serde_json::json!({ "role": role, "content": msg.content });
    }

    let mut blocks: Vec<serde_json::Value> = msg
        .images
        .iter()
        .map(|image| {
            serde_json::json!({
                "type": "image",
                "source": {
                    "type": "base64",
                    "media_type": image.media_type,
                    "data": image.data,
                },
            })
        })
        .collect();
    blocks.push(serde_json::json!({ "type": "text", "text": msg.content }));
    serde_json::json!({ "role": role, "content": blocks })
}

#[derive(Debug, Deserialize)]
struct MessagesResponse {
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    content: Vec<ContentBlock>,
    #[serde(default)]
    stop_reason: Option<String>,
    #[serde(default)]
    usage: Usage,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ContentBlock {
    Text {
        text: String,
    },
    #[serde(other)]
    Other,
}

#[derive(Debug, Default, Deserialize)]
struct Usage {
    #[serde(default)]
    input_tokens: u32,
    #[serde(default)]
    output_tokens: u32,
}

impl From<MessagesResponse> for CompletionResponse {
    fn from(resp: MessagesResponse) -> Self {
        let content = resp
            .content
            .into_iter()
            .filter_map(|block| match block {
                ContentBlock::Text { text } => Some(text),
                ContentBlock::Other => None,
            })
            .collect::<Vec<_>>()
            .join("");
        let finish_reason = match resp.stop_reason.as_deref() {
            Some("end_turn") | Some("stop_sequence") => FinishReason::Stop,
            Some("max_tokens") => FinishReason::Length,
            _ => FinishReason::Unknown,
        };
        Self {
            content,
            input_tokens: resp.usage.input_tokens,
            output_tokens: resp.usage.output_tokens,
            finish_reason,
            response_id: resp.id,
        }
    }
}

#[async_trait]
impl LlmProvider for AnthropicProvider {
    fn model_name(&self) -> &str {
        &self.model
    }

    fn cost_per_token(&self) -> (Decimal, Decimal) {
        if self.model.contains("haiku") {
            (dec!(0.0000008), dec!(0.000004))
        } else if self.model.contains("opus") {
            (dec!(0.000015), dec!(0.000075))
        } else {
            (dec!(0.000003), dec!(0.000015))
        }
    }

    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, LlmError> {
        let url = format!("{}/v1/messages", self.base_url);
        let body = self.build_body(&request);

        let mut last_error = None;
        for attempt in 0..=MAX_RETRIES {
            if attempt > 0 {
                let backoff = self.backoff * 2u32.pow(attempt - 1);
                warn!(attempt, backoff_ms = backoff.as_millis() as u64, "Retrying Anthropic request");
                tokio::time::sleep(backoff).await;
            }

            let response = match self
                .http
                .post(&url)
                .header("x-api-key", self.api_key.expose_secret())
                .header("anthropic-version", API_VERSION)
                .json(&body)
                .send()
                .await
            {
                Ok(r) => r,
                Err(e) => {
                    debug!(attempt, error = %e, "Anthropic network error");
                    last_error = Some(LlmError::RequestFailed {
                        provider: PROVIDER.to_string(),
                        reason: e.to_string(),
                    });
                    continue;
                }
            };

            let status = response.status().as_u16();
            if status == 429 {
                let retry_after = response
                    .headers()
                    .get("retry-after")
                    .and_then(|v| v.to_str().ok())
                    .and_then(|s| s.parse::<u64>().ok())
                    .map(Duration::from_secs);
                return Err(LlmError::RateLimited {
                    provider: PROVIDER.to_string(),
                    retry_after,
                });
            }

            if is_retryable_status(status) && attempt < MAX_RETRIES {
                let message = response.text().await.unwrap_or_default();
                debug!(attempt, status, "Anthropic transient error");
                last_error = Some(LlmError::Api {
                    provider: PROVIDER.to_string(),
                    status,
                    message,
                });
                continue;
            }

            if !response.status().is_success() {
                let message = response.text().await.unwrap_or_default();
                return Err(LlmError::Api {
                    provider: PROVIDER.to_string(),
                    status,
                    message,
                });
            }

            let parsed: MessagesResponse =
                response
                    .json()
                    .await
                    .map_err(|e| LlmError::InvalidResponse {
                        provider: PROVIDER.to_string(),
                        reason: e.to_string(),
                    })?;
            let completion = CompletionResponse::from(parsed);
            debug!(
                input_tokens = completion.input_tokens,
                output_tokens = completion.output_tokens,
                "Anthropic completion"
            );
            return Ok(completion);
        }

        Err(last_error.unwrap_or_else(|| LlmError::InvalidResponse {
            provider: PROVIDER.to_string(),
            reason: "max retries exceeded".to_string(),
        }))
    }
}
