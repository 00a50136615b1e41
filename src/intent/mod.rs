//! Question classification.
//!
//! [`QueryIntent`] is a closed set: the model can only classify a question
//! into these shapes, and anything malformed degrades to the safest broad
//! intent rather than erroring. Classification runs as an ordered cascade —
//! lexical override, then generative classification, with a regex fallback
//! the orchestrator applies once a resource path is known.

pub mod patterns;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::LlmError;
use crate::llm::{strip_code_fences, Completion, GenerativeModel};
use crate::registry::ACHIEVEMENTS_PATH;

/// A named entity mentioned in a comparison question.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityRef {
    pub name: String,
    /// Declared entity type ("student", "faculty", ...), if the user gave one.
    #[serde(default, rename = "type")]
    pub kind: Option<String>,
}

/// The classified purpose of a question. Exactly one variant per question.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum QueryIntent {
    /// Details about one specific, named item (person, event, record).
    #[serde(rename = "specific_entity_details")]
    SpecificEntity { value: String },

    /// A listing constrained by a category such as a department name.
    #[serde(rename = "list_by_category")]
    ListByCategory {
        category_type: String,
        value: String,
    },

    /// A broad listing, optionally narrowed by free search keywords.
    #[serde(rename = "general_listing")]
    GeneralListing {
        #[serde(default, rename = "value")]
        keywords: Option<String>,
    },

    /// Needs the logged-in user's own context to resolve.
    #[serde(rename = "user_context_dependent_query")]
    UserContextDependent { sub_type: String },

    /// Relationship/commonality question across 2-3 named entities.
    #[serde(rename = "multi_entity_comparison")]
    MultiEntityComparison { entities: Vec<EntityRef> },
}

impl QueryIntent {
    /// The safe default when classification fails or disagrees with schema.
    pub fn general() -> Self {
        QueryIntent::GeneralListing { keywords: None }
    }
}

/// Classification result: the intent plus an optional resource path pinned
/// by the lexical override (which bypasses the rest of the cascade).
#[derive(Debug, Clone, PartialEq)]
pub struct Classification {
    pub intent: QueryIntent,
    pub pinned_path: Option<&'static str>,
}

impl Classification {
    fn of(intent: QueryIntent) -> Self {
        Self {
            intent,
            pinned_path: None,
        }
    }
}

/// Classify a question. Never fails: a dead model call or malformed reply
/// yields `GeneralListing { None }`.
pub async fn classify(
    question: &str,
    llm: &dyn GenerativeModel,
    fuzzy_threshold: u8,
) -> Classification {
    // Step 1: possessive-phrase override pins the achievements resource.
    if let Some(phrase) = patterns::achievement_phrase_match(question, fuzzy_threshold) {
        debug!(%phrase, "lexical override pinned the achievements resource");
        return Classification {
            intent: QueryIntent::general(),
            pinned_path: Some(ACHIEVEMENTS_PATH),
        };
    }

    // Step 2: generative classification.
    let prompt = classification_prompt(question);
    match llm.complete(&prompt).await {
        Ok(Completion::Text(text)) => Classification::of(parse_intent_reply(&text)),
        Ok(other) => {
            warn!(?other, "classifier model returned no text");
            Classification::of(QueryIntent::general())
        }
        Err(err) => {
            warn!(error = %err, "classifier model call failed");
            Classification::of(QueryIntent::general())
        }
    }
}

/// Parse the model's JSON reply into an intent, degrading on any mismatch.
pub fn parse_intent_reply(reply: &str) -> QueryIntent {
    let cleaned = strip_code_fences(reply);

    let parsed: Result<QueryIntent, _> = serde_json::from_str(cleaned);
    let intent = match parsed {
        Ok(intent) => intent,
        Err(err) => {
            debug!(error = %err, "intent reply did not match schema, degrading");
            return QueryIntent::general();
        }
    };

    // Post-validation: required sub-fields must be usable.
    match &intent {
        QueryIntent::SpecificEntity { value } if value.trim().is_empty() => QueryIntent::general(),
        QueryIntent::ListByCategory {
            category_type,
            value,
        } if category_type.trim().is_empty() || value.trim().is_empty() => QueryIntent::general(),
        QueryIntent::UserContextDependent { sub_type } if sub_type.trim().is_empty() => {
            QueryIntent::general()
        }
        QueryIntent::MultiEntityComparison { entities }
            if entities.is_empty() || entities.iter().any(|e| e.name.trim().is_empty()) =>
        {
            QueryIntent::general()
        }
        QueryIntent::GeneralListing { keywords } => QueryIntent::GeneralListing {
            keywords: keywords
                .as_deref()
                .map(str::trim)
                .filter(|k| !k.is_empty())
                .map(str::to_string),
        },
        _ => intent,
    }
}

fn classification_prompt(question: &str) -> Vec<String> {
    vec![
        "Analyze the user's question and determine its query type, extracting a key value \
         where applicable."
            .to_string(),
        r#"The query types are:
1. "specific_entity_details" — the question asks about a single, specific, named item (a person by full name / roll number / registration number, or an event by its name). Respond: {"type": "specific_entity_details", "value": "THE_EXTRACTED_NAME_OR_ID"}
2. "list_by_category" — the question asks for a list filtered by a category (department name, event category, organizer, location). Respond: {"type": "list_by_category", "category_type": "department_name" (or "event_category", "organizer", "location"), "value": "THE_CATEGORY_VALUE"}
3. "general_listing" — a broad listing request; extract loose search keywords if any. Respond: {"type": "general_listing", "value": "KEYWORDS_OR_NULL"}
4. "user_context_dependent_query" — the question needs the logged-in user's own context (e.g. "faculties teaching me", "my teachers"). Respond: {"type": "user_context_dependent_query", "sub_type": "faculty_for_my_courses", "value": null}
5. "multi_entity_comparison" — the question asks about a relationship or commonality between two or more named entities. Respond: {"type": "multi_entity_comparison", "entities": [{"name": "ENTITY1", "type": "student"|"faculty"|null}, ...], "value": null}"#
            .to_string(),
        "Rules: prioritize specific_entity_details whenever a clear entity name or id is \
         present, even with typos. Use list_by_category only for category-based listings. \
         Use general_listing for broad requests with no specific entity or category."
            .to_string(),
        format!("User's Question: \"{question}\""),
        "Respond with ONLY the JSON object:".to_string(),
    ]
}

/// Convenience for callers that only need the reply text of a model call.
pub(crate) async fn text_completion(
    llm: &dyn GenerativeModel,
    parts: &[String],
) -> Result<Option<String>, LlmError> {
    match llm.complete(parts).await? {
        Completion::Text(text) => Ok(Some(text)),
        _ => Ok(None),
    }
}
