//! Chunked answer synthesis.
//!
//! Aggregated record sets can exceed any single prompt, so evidence is
//! serialized and packed into character-budgeted chunks, each chunk is
//! answered independently with an intent-specific template, and the usable
//! per-chunk answers are merged — by string-set union for category listings,
//! by a final synthesis model call otherwise.

use std::collections::BTreeSet;
use std::time::Duration;

use serde_json::Value;
use tracing::{debug, warn};

use crate::intent::QueryIntent;
use crate::llm::{Completion, GenerativeModel};
use crate::portal::normalize::NormalizedRecord;

/// Per-chunk reply meaning "this slice holds nothing relevant". Must be
/// spelled out in the chunk prompts so the model can emit it verbatim.
pub const NO_MATCH_SENTINEL: &str = "NO_MATCHING_RECORDS_IN_CHUNK";

/// Separator between partial answers in the synthesis prompt.
const PIECE_DELIMITER: &str = "\n\n==== NEXT PIECE OF INFORMATION ====\n\n";

const NONE_FOUND_MESSAGE: &str =
    "I looked through the available records but could not find any entries matching your question.";
const NO_INFO_MESSAGE: &str =
    "I could not find any information to answer your question from the available data.";
const RETRIEVAL_FAILURE_MESSAGE: &str =
    "I retrieved the data but ran into repeated errors while analyzing it. Please try again in a \
     moment.";

/// Outcome of answering one chunk.
#[derive(Debug, Clone, PartialEq)]
enum ChunkAnswer {
    Text(String),
    NoMatch,
    Blocked,
    Empty,
    Error,
}

impl ChunkAnswer {
    fn usable_text(&self) -> Option<&str> {
        match self {
            ChunkAnswer::Text(text) => Some(text),
            _ => None,
        }
    }
}

/// Greedily pack serialized records into chunks within `budget` characters.
/// A record bigger than the whole budget gets a chunk to itself rather than
/// being dropped.
pub fn pack_chunks(records: &[NormalizedRecord], budget: usize) -> Vec<Vec<NormalizedRecord>> {
    let mut chunks: Vec<Vec<NormalizedRecord>> = Vec::new();
    let mut current: Vec<NormalizedRecord> = Vec::new();
    let mut current_len = 0usize;

    for record in records {
        let len = Value::Object(record.clone()).to_string().len();
        if !current.is_empty() && current_len + len > budget {
            chunks.push(std::mem::take(&mut current));
            current_len = 0;
        }
        current.push(record.clone());
        current_len += len;
    }
    if !current.is_empty() {
        chunks.push(current);
    }
    chunks
}

/// Turns records plus a question into one final natural-language answer.
pub struct Synthesizer<'a> {
    llm: &'a dyn GenerativeModel,
    chunk_char_budget: usize,
    chunk_delay: Duration,
}

impl<'a> Synthesizer<'a> {
    pub fn new(llm: &'a dyn GenerativeModel, chunk_char_budget: usize, chunk_delay: Duration) -> Self {
        Self {
            llm,
            chunk_char_budget,
            chunk_delay,
        }
    }

    /// Answer `question` over `records`. Infallible by contract: every model
    /// failure mode collapses into one of the fixed fallback messages.
    pub async fn answer(
        &self,
        records: &[NormalizedRecord],
        question: &str,
        intent: Option<&QueryIntent>,
    ) -> String {
        let mut chunks = pack_chunks(records, self.chunk_char_budget);
        if chunks.is_empty() {
            // Let the model say "nothing found" in its own words over an
            // explicitly empty evidence block.
            chunks.push(Vec::new());
        }
        let total = chunks.len();
        debug!(records = records.len(), chunks = total, "synthesizing answer");

        let specific_entity = matches!(intent, Some(QueryIntent::SpecificEntity { .. }));
        let mut partials: Vec<ChunkAnswer> = Vec::new();

        for (index, chunk) in chunks.iter().enumerate() {
            if index > 0 && !self.chunk_delay.is_zero() {
                tokio::time::sleep(self.chunk_delay).await;
            }

            let answer = self.answer_chunk(chunk, question, intent, index, total).await;

            // A confident hit for a specific entity makes later chunks moot.
            if specific_entity {
                if let ChunkAnswer::Text(text) = &answer {
                    let lowered = text.to_lowercase();
                    if text.len() > 20
                        && !lowered.contains("not found")
                        && !lowered.contains("not available")
                    {
                        debug!(chunk = index + 1, "early exit on confident entity answer");
                        return text.clone();
                    }
                }
            }

            partials.push(answer);
        }

        self.aggregate(partials, question, intent).await
    }

    async fn answer_chunk(
        &self,
        chunk: &[NormalizedRecord],
        question: &str,
        intent: Option<&QueryIntent>,
        index: usize,
        total: usize,
    ) -> ChunkAnswer {
        let evidence = serialize_chunk(chunk);
        let prompt = chunk_prompt(&evidence, question, intent, index, total);

        match self.llm.complete(&prompt).await {
            Ok(Completion::Text(text)) => {
                if text.to_uppercase().contains(NO_MATCH_SENTINEL) {
                    ChunkAnswer::NoMatch
                } else {
                    ChunkAnswer::Text(text.trim().to_string())
                }
            }
            Ok(Completion::Blocked(reason)) => {
                warn!(chunk = index + 1, %reason, "chunk answer blocked");
                ChunkAnswer::Blocked
            }
            Ok(Completion::Empty) => ChunkAnswer::Empty,
            Err(err) => {
                warn!(chunk = index + 1, error = %err, "chunk model call failed");
                ChunkAnswer::Error
            }
        }
    }

    async fn aggregate(
        &self,
        partials: Vec<ChunkAnswer>,
        question: &str,
        intent: Option<&QueryIntent>,
    ) -> String {
        // Every chunk failing is a retrieval problem, not an empty result,
        // whatever the intent.
        if partials.iter().all(|p| matches!(p, ChunkAnswer::Error)) {
            return RETRIEVAL_FAILURE_MESSAGE.to_string();
        }

        // Category listings merge by item-set union instead of prose fusion.
        if let Some(QueryIntent::ListByCategory { category_type, .. }) = intent {
            if category_type == "department_name" {
                return aggregate_name_union(&partials);
            }
        }

        if partials
            .iter()
            .all(|p| matches!(p, ChunkAnswer::NoMatch | ChunkAnswer::Empty | ChunkAnswer::Blocked))
        {
            return NONE_FOUND_MESSAGE.to_string();
        }

        let usable: Vec<&str> = partials.iter().filter_map(ChunkAnswer::usable_text).collect();
        match usable.len() {
            0 => NO_INFO_MESSAGE.to_string(),
            1 => usable[0].to_string(),
            _ => self.synthesize(&usable, question).await,
        }
    }

    /// Fuse multiple partial answers into one reply; on model failure fall
    /// back to plain concatenation so no partial is lost.
    async fn synthesize(&self, partials: &[&str], question: &str) -> String {
        let joined = partials.join(PIECE_DELIMITER);
        let prompt = vec![
            "You are an assistant for a college information portal. The user asked one \
             question, and the relevant data was analyzed in several pieces. Below are the \
             partial answers derived from each piece."
                .to_string(),
            "Combine them into a single, coherent, non-repetitive answer. Merge overlapping \
             lists, keep every distinct fact, and do not mention that the data arrived in \
             pieces."
                .to_string(),
            format!("User's Question: \"{question}\""),
            format!("Partial Answers:\n{joined}"),
            "Combined Answer:".to_string(),
        ];

        match self.llm.complete(&prompt).await {
            Ok(Completion::Text(text)) => text.trim().to_string(),
            other => {
                if let Err(err) = &other {
                    warn!(error = %err, "synthesis call failed, concatenating partials");
                } else {
                    warn!("synthesis call returned no text, concatenating partials");
                }
                partials.join("\n\n")
            }
        }
    }
}

/// Union of newline/comma separated items across usable chunk answers,
/// sorted for a stable listing.
fn aggregate_name_union(partials: &[ChunkAnswer]) -> String {
    let mut names: BTreeSet<String> = BTreeSet::new();
    for partial in partials {
        let Some(text) = partial.usable_text() else {
            continue;
        };
        for line in text.split('\n') {
            for item in line.split(',') {
                let item = item.trim().trim_start_matches(['-', '*', ' ']).trim();
                if !item.is_empty() {
                    names.insert(item.to_string());
                }
            }
        }
    }
    if names.is_empty() {
        NONE_FOUND_MESSAGE.to_string()
    } else {
        names.into_iter().collect::<Vec<_>>().join("\n")
    }
}

fn serialize_chunk(chunk: &[NormalizedRecord]) -> String {
    let values: Vec<Value> = chunk.iter().cloned().map(Value::Object).collect();
    Value::Array(values).to_string()
}

fn chunk_prompt(
    evidence: &str,
    question: &str,
    intent: Option<&QueryIntent>,
    index: usize,
    total: usize,
) -> Vec<String> {
    let position = format!("This is part {} of {} of the data.", index + 1, total);
    match intent {
        Some(QueryIntent::ListByCategory { value, .. }) => vec![
            "You are an assistant for a college information portal. From the JSON records \
             below, list the names of every entry that belongs to the requested category."
                .to_string(),
            format!(
                "If no record in this part matches, respond with exactly \
                 \"{NO_MATCH_SENTINEL}\" and nothing else. Otherwise respond with one name \
                 per line and no commentary."
            ),
            format!("Requested category: \"{value}\""),
            position,
            format!("User's Question: \"{question}\""),
            format!("JSON Records:\n{evidence}"),
        ],
        Some(QueryIntent::MultiEntityComparison { .. }) => vec![
            "You are an assistant for a college information portal. The JSON records below \
             contain profiles fetched for the entities the user asked about; records carry \
             \"_profile_for_\" markers naming which entity each belongs to."
                .to_string(),
            "Answer the user's comparison question using only these records. State what the \
             entities have in common and how they differ, and say plainly when a profile \
             could not be retrieved."
                .to_string(),
            position,
            format!("User's Question: \"{question}\""),
            format!("JSON Records:\n{evidence}"),
        ],
        Some(QueryIntent::SpecificEntity { value }) => vec![
            "You are an assistant for a college information portal. Answer the user's \
             question about the specific entity below using only the JSON records provided."
                .to_string(),
            "If this part of the data contains no record for the entity, say so briefly \
             (e.g., \"not found in this data\"). Do not invent details."
                .to_string(),
            format!("Entity of interest: \"{value}\""),
            position,
            format!("User's Question: \"{question}\""),
            format!("JSON Records:\n{evidence}"),
        ],
        _ => vec![
            "You are an assistant for a college information portal. Answer the user's \
             question using only the JSON records below. Be concise and factual; if the \
             records do not contain the answer, say so."
                .to_string(),
            position,
            format!("User's Question: \"{question}\""),
            format!("JSON Records:\n{evidence}"),
        ],
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::LlmError;
    use async_trait::async_trait;
    use serde_json::json;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    /// Model stub that replays a fixed list of completions.
    struct ScriptedModel {
        replies: Mutex<VecDeque<Result<Completion, LlmError>>>,
        calls: Mutex<Vec<String>>,
    }

    impl ScriptedModel {
        fn new(replies: Vec<Result<Completion, LlmError>>) -> Self {
            Self {
                replies: Mutex::new(replies.into()),
                calls: Mutex::new(Vec::new()),
            }
        }

        fn call_count(&self) -> usize {
            self.calls.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl GenerativeModel for ScriptedModel {
        async fn complete(&self, parts: &[String]) -> Result<Completion, LlmError> {
            self.calls.lock().unwrap().push(parts.join("\n"));
            self.replies
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or(Ok(Completion::Empty))
        }

        fn model_name(&self) -> &str {
            "scripted"
        }
    }

    fn record(name: &str, pad: usize) -> NormalizedRecord {
        let mut r = NormalizedRecord::new();
        r.insert("name".to_string(), json!(name));
        if pad > 0 {
            r.insert("pad".to_string(), json!("x".repeat(pad)));
        }
        r
    }

    fn synthesizer(model: &ScriptedModel) -> Synthesizer<'_> {
        Synthesizer::new(model, 28_000, Duration::ZERO)
    }

    #[test]
    fn packing_respects_budget_and_keeps_order() {
        let records: Vec<_> = (0..6).map(|i| record(&format!("r{i}"), 90)).collect();
        let chunks = pack_chunks(&records, 300);
        assert!(chunks.len() > 1);
        let flattened: Vec<_> = chunks.iter().flatten().cloned().collect();
        assert_eq!(flattened, records);
        for chunk in &chunks {
            assert!(!chunk.is_empty());
        }
    }

    #[test]
    fn oversized_record_gets_own_chunk() {
        let records = vec![record("small", 0), record("huge", 1_000), record("tail", 0)];
        let chunks = pack_chunks(&records, 100);
        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[1].len(), 1);
    }

    #[tokio::test]
    async fn single_usable_chunk_returned_verbatim() {
        let model = ScriptedModel::new(vec![Ok(Completion::Text(
            "Asha K is a fourth-semester student.".to_string(),
        ))]);
        let answer = synthesizer(&model)
            .answer(&[record("Asha K", 0)], "who is Asha K?", None)
            .await;
        assert_eq!(answer, "Asha K is a fourth-semester student.");
        assert_eq!(model.call_count(), 1);
    }

    #[tokio::test]
    async fn multiple_chunks_trigger_synthesis_call() {
        let records: Vec<_> = (0..4).map(|i| record(&format!("r{i}"), 90)).collect();
        let model = ScriptedModel::new(vec![
            Ok(Completion::Text("part one".to_string())),
            Ok(Completion::Text("part two".to_string())),
            Ok(Completion::Text("part three".to_string())),
            Ok(Completion::Text("combined answer".to_string())),
        ]);
        let synth = Synthesizer::new(&model, 200, Duration::ZERO);
        let answer = synth.answer(&records, "list everything", None).await;
        assert_eq!(answer, "combined answer");
        assert!(model.call_count() >= 3);
        let last_call = model.calls.lock().unwrap().last().cloned().unwrap();
        assert!(last_call.contains("NEXT PIECE OF INFORMATION"));
    }

    #[tokio::test]
    async fn failed_synthesis_concatenates_partials() {
        let records: Vec<_> = (0..4).map(|i| record(&format!("r{i}"), 90)).collect();
        let model = ScriptedModel::new(vec![
            Ok(Completion::Text("part one".to_string())),
            Ok(Completion::Text("part two".to_string())),
            Ok(Completion::Empty),
        ]);
        let synth = Synthesizer::new(&model, 250, Duration::ZERO);
        let answer = synth.answer(&records, "list everything", None).await;
        assert!(answer.contains("part one"));
        assert!(answer.contains("part two"));
    }

    #[tokio::test]
    async fn specific_entity_exits_early_on_confident_hit() {
        let records: Vec<_> = (0..6).map(|i| record(&format!("r{i}"), 90)).collect();
        let model = ScriptedModel::new(vec![Ok(Completion::Text(
            "Asha K studies in the Physics department.".to_string(),
        ))]);
        let intent = QueryIntent::SpecificEntity {
            value: "Asha K".to_string(),
        };
        let synth = Synthesizer::new(&model, 200, Duration::ZERO);
        let answer = synth.answer(&records, "who is Asha K?", Some(&intent)).await;
        assert_eq!(answer, "Asha K studies in the Physics department.");
        assert_eq!(model.call_count(), 1);
    }

    #[tokio::test]
    async fn not_found_text_does_not_trigger_early_exit() {
        let records: Vec<_> = (0..4).map(|i| record(&format!("r{i}"), 90)).collect();
        let model = ScriptedModel::new(vec![
            Ok(Completion::Text("The requested student was not found in this data.".to_string())),
            Ok(Completion::Text("Asha K studies Physics and is in semester 4.".to_string())),
        ]);
        let intent = QueryIntent::SpecificEntity {
            value: "Asha K".to_string(),
        };
        let synth = Synthesizer::new(&model, 250, Duration::ZERO);
        let answer = synth.answer(&records, "who is Asha K?", Some(&intent)).await;
        assert_eq!(answer, "Asha K studies Physics and is in semester 4.");
    }

    #[tokio::test]
    async fn category_listing_unions_and_sorts_names() {
        let records: Vec<_> = (0..4).map(|i| record(&format!("r{i}"), 90)).collect();
        let model = ScriptedModel::new(vec![
            Ok(Completion::Text("Ravi\nAsha K".to_string())),
            Ok(Completion::Text("Asha K, Meera".to_string())),
        ]);
        let intent = QueryIntent::ListByCategory {
            category_type: "department_name".to_string(),
            value: "Physics".to_string(),
        };
        let synth = Synthesizer::new(&model, 250, Duration::ZERO);
        let answer = synth.answer(&records, "students in Physics", Some(&intent)).await;
        assert_eq!(answer, "Asha K\nMeera\nRavi");
    }

    #[tokio::test]
    async fn all_sentinel_chunks_yield_none_found() {
        let records: Vec<_> = (0..4).map(|i| record(&format!("r{i}"), 90)).collect();
        let model = ScriptedModel::new(vec![
            Ok(Completion::Text(NO_MATCH_SENTINEL.to_string())),
            Ok(Completion::Text(format!("  {NO_MATCH_SENTINEL}  "))),
        ]);
        let intent = QueryIntent::ListByCategory {
            category_type: "department_name".to_string(),
            value: "Alchemy".to_string(),
        };
        let synth = Synthesizer::new(&model, 250, Duration::ZERO);
        let answer = synth.answer(&records, "students in Alchemy", Some(&intent)).await;
        assert_eq!(answer, NONE_FOUND_MESSAGE);
    }

    #[tokio::test]
    async fn category_mixed_chunks_union_only_usable_answers() {
        // Three chunks: a sentinel, a usable listing, and a failed call.
        let records: Vec<_> = (0..6).map(|i| record(&format!("r{i}"), 90)).collect();
        let model = ScriptedModel::new(vec![
            Ok(Completion::Text(NO_MATCH_SENTINEL.to_string())),
            Ok(Completion::Text("Bob\nAlice".to_string())),
            Err(LlmError::Api {
                status: 500,
                body: "boom".to_string(),
            }),
        ]);
        let intent = QueryIntent::ListByCategory {
            category_type: "department_name".to_string(),
            value: "Physics".to_string(),
        };
        let synth = Synthesizer::new(&model, 250, Duration::ZERO);
        let answer = synth.answer(&records, "students in Physics", Some(&intent)).await;
        assert_eq!(answer, "Alice\nBob");
    }

    #[tokio::test]
    async fn category_all_error_chunks_yield_retrieval_failure() {
        let records: Vec<_> = (0..4).map(|i| record(&format!("r{i}"), 90)).collect();
        let model = ScriptedModel::new(vec![
            Err(LlmError::Api {
                status: 500,
                body: "boom".to_string(),
            }),
            Err(LlmError::Api {
                status: 500,
                body: "boom".to_string(),
            }),
        ]);
        let intent = QueryIntent::ListByCategory {
            category_type: "department_name".to_string(),
            value: "Physics".to_string(),
        };
        let synth = Synthesizer::new(&model, 250, Duration::ZERO);
        let answer = synth.answer(&records, "students in Physics", Some(&intent)).await;
        assert_eq!(answer, RETRIEVAL_FAILURE_MESSAGE);
    }

    #[tokio::test]
    async fn all_error_chunks_yield_retrieval_failure() {
        let records: Vec<_> = (0..4).map(|i| record(&format!("r{i}"), 90)).collect();
        let model = ScriptedModel::new(vec![
            Err(LlmError::Api {
                status: 500,
                body: "boom".to_string(),
            }),
            Err(LlmError::Api {
                status: 500,
                body: "boom".to_string(),
            }),
        ]);
        let synth = Synthesizer::new(&model, 250, Duration::ZERO);
        let answer = synth.answer(&records, "list everything", None).await;
        assert_eq!(answer, RETRIEVAL_FAILURE_MESSAGE);
    }

    #[tokio::test]
    async fn empty_record_set_still_asks_the_model_once() {
        let model = ScriptedModel::new(vec![Ok(Completion::Text(
            "No matching records were found.".to_string(),
        ))]);
        let answer = synthesizer(&model).answer(&[], "anything?", None).await;
        assert_eq!(answer, "No matching records were found.");
        assert_eq!(model.call_count(), 1);
    }
}
