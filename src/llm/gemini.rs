//! Google Gemini client for the [`GenerativeModel`] seam.
//!
//! Thin wrapper over the Generative Language REST API. Blocked prompts and
//! empty candidates are reported as [`Completion`] variants rather than
//! errors so the synthesizer can degrade per chunk.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, error};

use super::{Completion, GenerativeModel};
use crate::error::LlmError;

const GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta/models";

#[derive(Debug, Clone)]
pub struct GeminiClient {
    client: Client,
    api_key: String,
    model: String,
    base_url: String,
}

#[derive(Debug, Serialize)]
struct GeminiRequest {
    contents: Vec<GeminiContent>,
}

#[derive(Debug, Serialize)]
struct GeminiContent {
    parts: Vec<GeminiPart>,
}

#[derive(Debug, Serialize)]
struct GeminiPart {
    text: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiResponse {
    #[serde(default)]
    candidates: Vec<GeminiCandidate>,
    #[serde(default)]
    prompt_feedback: Option<GeminiPromptFeedback>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiCandidate {
    #[serde(default)]
    content: Option<GeminiResponseContent>,
}

#[derive(Debug, Deserialize)]
struct GeminiResponseContent {
    #[serde(default)]
    parts: Vec<GeminiResponsePart>,
}

#[derive(Debug, Deserialize)]
struct GeminiResponsePart {
    #[serde(default)]
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiPromptFeedback {
    #[serde(default)]
    block_reason: Option<String>,
    #[serde(default)]
    block_reason_message: Option<String>,
}

impl GeminiClient {
    pub fn new(api_key: &str, model: &str, timeout: Duration) -> Result<Self, LlmError> {
        if api_key.trim().is_empty() {
            return Err(LlmError::Authentication);
        }

        let client = Client::builder().timeout(timeout).build()?;

        Ok(Self {
            client,
            api_key: api_key.to_string(),
            model: model.to_string(),
            base_url: GEMINI_BASE_URL.to_string(),
        })
    }

    #[cfg(test)]
    fn with_base_url(mut self, base_url: &str) -> Self {
        self.base_url = base_url.to_string();
        self
    }
}

#[async_trait]
impl GenerativeModel for GeminiClient {
    async fn complete(&self, parts: &[String]) -> Result<Completion, LlmError> {
        let request_body = GeminiRequest {
            contents: vec![GeminiContent {
                parts: parts
                    .iter()
                    .map(|text| GeminiPart { text: text.clone() })
                    .collect(),
            }],
        };

        let url = format!(
            "{}/{}:generateContent?key={}",
            self.base_url, self.model, self.api_key
        );
        debug!(model = %self.model, parts = parts.len(), "sending model request");

        let response = self.client.post(&url).json(&request_body).send().await?;

        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            error!(%status, "model API call failed");
            return Err(LlmError::Api {
                status: status.as_u16(),
                body: body.chars().take(200).collect(),
            });
        }

        let parsed: GeminiResponse = serde_json::from_str(&body)?;

        let text: String = parsed
            .candidates
            .first()
            .and_then(|c| c.content.as_ref())
            .map(|content| {
                content
                    .parts
                    .iter()
                    .filter_map(|p| p.text.as_deref())
                    .collect()
            })
            .unwrap_or_default();

        if text.trim().is_empty() {
            if let Some(feedback) = parsed.prompt_feedback {
                if let Some(reason) = feedback.block_reason {
                    let message = feedback
                        .block_reason_message
                        .unwrap_or_else(|| reason.clone());
                    return Ok(Completion::Blocked(message));
                }
            }
            return Ok(Completion::Empty);
        }

        Ok(Completion::Text(text.trim().to_string()))
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_empty_api_key() {
        let client = GeminiClient::new("", "gemini-2.0-flash-lite", Duration::from_secs(5));
        assert!(matches!(client.err(), Some(LlmError::Authentication)));
    }

    #[test]
    fn parses_text_response() {
        let body = r#"{
            "candidates": [
                {"content": {"parts": [{"text": "Hello "}, {"text": "world"}]}}
            ]
        }"#;
        let parsed: GeminiResponse = serde_json::from_str(body).unwrap();
        let text: String = parsed.candidates[0]
            .content
            .as_ref()
            .unwrap()
            .parts
            .iter()
            .filter_map(|p| p.text.as_deref())
            .collect::<String>();
        assert_eq!(text, "Hello world");
    }

    #[test]
    fn parses_blocked_feedback() {
        let body = r#"{
            "candidates": [],
            "promptFeedback": {"blockReason": "SAFETY", "blockReasonMessage": "blocked for safety"}
        }"#;
        let parsed: GeminiResponse = serde_json::from_str(body).unwrap();
        let feedback = parsed.prompt_feedback.unwrap();
        assert_eq!(feedback.block_reason.as_deref(), Some("SAFETY"));
        assert_eq!(
            feedback.block_reason_message.as_deref(),
            Some("blocked for safety")
        );
    }

    #[test]
    fn base_url_override_keeps_model() {
        let client = GeminiClient::new("key", "gemini-2.0-flash-lite", Duration::from_secs(5))
            .unwrap()
            .with_base_url("http://localhost:9999");
        assert_eq!(client.model_name(), "gemini-2.0-flash-lite");
        assert_eq!(client.base_url, "http://localhost:9999");
    }
}
