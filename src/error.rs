//! Error types for the portal assistant pipeline.
//!
//! Upstream failures are kept in distinct categories so callers can tell a
//! dead session apart from a flaky network or a malformed payload. Model-call
//! failures are contained per chunk inside the synthesizer and only surface
//! here when the whole call fails.

use thiserror::Error;

/// Umbrella error for the pipeline.
#[derive(Error, Debug)]
pub enum AssistantError {
    #[error("portal error: {0}")]
    Portal(#[from] PortalError),

    #[error("model error: {0}")]
    Llm(#[from] LlmError),
}

/// Errors raised by the upstream portal fetch layer.
#[derive(Error, Debug)]
pub enum PortalError {
    /// 401/403/419 or a redirect to the login page. The session must be
    /// re-synced by the caller; no automatic retry.
    #[error("portal session invalid or expired (HTTP {status}); re-sync required")]
    Auth { status: u16 },

    #[error("portal request failed with HTTP {status}: {body}")]
    Http { status: u16, body: String },

    #[error("network error communicating with the portal: {0}")]
    Network(#[from] reqwest::Error),

    #[error("failed to decode portal response: {0}")]
    Decode(#[from] serde_json::Error),
}

/// Errors raised by the generative model client.
#[derive(Error, Debug)]
pub enum LlmError {
    #[error("model API key not configured")]
    Authentication,

    #[error("network error contacting the model API: {0}")]
    Http(#[from] reqwest::Error),

    #[error("model API error (HTTP {status}): {body}")]
    Api { status: u16, body: String },

    #[error("failed to decode model response: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("invalid model response: {0}")]
    InvalidResponse(String),
}

pub type Result<T> = std::result::Result<T, AssistantError>;
