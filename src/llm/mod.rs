//! Generative model seam.
//!
//! The pipeline never talks to a vendor API directly; everything goes through
//! [`GenerativeModel`] so tests can script completions and the classifier,
//! router and synthesizer stay vendor-agnostic.

pub mod gemini;

use async_trait::async_trait;

use crate::error::LlmError;

pub use gemini::GeminiClient;

/// Outcome of one model call.
///
/// `Blocked` and `Empty` are ordinary outcomes, not errors: the synthesizer
/// turns them into per-chunk sentinels instead of aborting the pipeline.
#[derive(Debug, Clone, PartialEq)]
pub enum Completion {
    Text(String),
    /// Content generation was refused; carries the stated reason if any.
    Blocked(String),
    Empty,
}

/// A generative text model invoked with an ordered list of prompt parts.
#[async_trait]
pub trait GenerativeModel: Send + Sync {
    async fn complete(&self, parts: &[String]) -> Result<Completion, LlmError>;

    /// Model identifier for logging.
    fn model_name(&self) -> &str;
}

/// Strip markdown code fences that models like to wrap JSON replies in.
pub fn strip_code_fences(text: &str) -> &str {
    let mut t = text.trim();
    if let Some(rest) = t.strip_prefix("```json") {
        t = rest;
    } else if let Some(rest) = t.strip_prefix("```") {
        t = rest;
    }
    if let Some(rest) = t.strip_suffix("```") {
        t = rest;
    }
    t.trim()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_json_fences() {
        assert_eq!(
            strip_code_fences("```json\n{\"type\":\"general_listing\"}\n```"),
            "{\"type\":\"general_listing\"}"
        );
        assert_eq!(strip_code_fences("```\nplain\n```"), "plain");
        assert_eq!(strip_code_fences("  no fences  "), "no fences");
    }
}
