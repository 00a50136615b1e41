//! End-to-end question pipeline.
//!
//! [`Assistant::ask`] wires the stages together: classify, pick a resource,
//! build the request, retrieve and aggregate pages, normalize, synthesize.
//! Two intents take dedicated flows before the standard retrieval path —
//! questions about the logged-in user's own teachers, and comparisons across
//! several named entities.

use async_trait::async_trait;
use serde::Serialize;
use serde_json::{json, Value};
use tracing::{debug, info, warn};

use crate::answer::Synthesizer;
use crate::config::AssistantConfig;
use crate::error::{PortalError, Result};
use crate::intent::{self, patterns, Classification, EntityRef, QueryIntent};
use crate::llm::GenerativeModel;
use crate::portal::normalize::{collect_records, record_id, NormalizedRecord};
use crate::portal::paginate::{fetch_aggregated, FetchOutcome, FetchRequest};
use crate::portal::PortalFetch;
use crate::refcache::DepartmentCache;
use crate::registry::{ResourceRegistry, FACULTIES_PATH, FACULTY_MAPPINGS_PATH, STUDENTS_PATH};
use crate::router;

/// Most entities a comparison question will fetch profiles for.
const MAX_COMPARISON_ENTITIES: usize = 3;

const NO_RESOURCE_MESSAGE: &str =
    "I could not determine which part of the portal holds the answer to that question. Try \
     rephrasing it or naming the kind of record you are after.";
const NO_USER_CONTEXT_MESSAGE: &str =
    "I can only answer questions about your own courses when your student profile is available \
     in this session.";
const CONTEXT_LOOKUP_FAILED_MESSAGE: &str =
    "I could not load the data needed to answer that question about your courses. Please try \
     again in a moment.";
const COMPARISON_FAILED_MESSAGE: &str =
    "I could not retrieve profiles for any of the entities you asked about, so I cannot compare \
     them.";

/// Final result of one question.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AssistantReply {
    pub answer: String,
    /// Portal path (with query) the evidence came from, when a fetch happened.
    pub data_source: Option<String>,
}

impl AssistantReply {
    fn without_source(answer: impl Into<String>) -> Self {
        Self {
            answer: answer.into(),
            data_source: None,
        }
    }
}

/// The logged-in student, as far as the pipeline needs to know them.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StudentProfile {
    pub id: i64,
    pub department_id: i64,
    pub department_name: String,
    pub semester: i64,
}

/// Source of the current user's identity. Deployments plug in whatever
/// session mechanism they have; tests script it.
#[async_trait]
pub trait UserContext: Send + Sync {
    async fn student_profile(&self) -> std::result::Result<Option<StudentProfile>, PortalError>;
}

/// The assembled question-answering pipeline.
pub struct Assistant {
    llm: Box<dyn GenerativeModel>,
    portal: Box<dyn PortalFetch>,
    user_ctx: Option<Box<dyn UserContext>>,
    registry: ResourceRegistry,
    cache: DepartmentCache,
    cfg: AssistantConfig,
}

impl Assistant {
    pub fn new(
        llm: Box<dyn GenerativeModel>,
        portal: Box<dyn PortalFetch>,
        cfg: AssistantConfig,
    ) -> Self {
        let cache = DepartmentCache::new(cfg.cache_ttl);
        Self {
            llm,
            portal,
            user_ctx: None,
            registry: ResourceRegistry::builtin(),
            cache,
            cfg,
        }
    }

    pub fn with_user_context(mut self, user_ctx: Box<dyn UserContext>) -> Self {
        self.user_ctx = Some(user_ctx);
        self
    }

    /// Answer `question`.
    ///
    /// `explicit_path` bypasses classification and resource selection and
    /// queries that path directly. `item_id` narrows the retrieved records to
    /// the one with that id before synthesis.
    pub async fn ask(
        &self,
        question: &str,
        explicit_path: Option<&str>,
        item_id: Option<i64>,
    ) -> Result<AssistantReply> {
        info!(model = self.llm.model_name(), "question received");

        let classification = match explicit_path {
            Some(path) => {
                debug!(%path, "explicit path given, skipping classification");
                Classification {
                    intent: QueryIntent::general(),
                    pinned_path: None,
                }
            }
            None => intent::classify(question, self.llm.as_ref(), self.cfg.fuzzy_threshold).await,
        };
        debug!(intent = ?classification.intent, "question classified");

        // Dedicated flows that never go through resource selection.
        if explicit_path.is_none() {
            match &classification.intent {
                QueryIntent::UserContextDependent { sub_type } => {
                    if sub_type == "faculty_for_my_courses" {
                        return Ok(self.answer_my_faculties(question).await);
                    }
                    warn!(%sub_type, "unsupported user-context sub-type, treating as listing");
                }
                QueryIntent::MultiEntityComparison { entities } => {
                    return Ok(self.answer_comparison(question, entities).await);
                }
                _ => {}
            }
        }

        // Resolve the resource path: explicit > lexically pinned > selected.
        let path = match explicit_path {
            Some(path) => path.to_string(),
            None => match classification.pinned_path {
                Some(pinned) => pinned.to_string(),
                None => {
                    match router::select_resource(question, &self.registry, self.llm.as_ref())
                        .await
                    {
                        Some(path) => path,
                        None => return Ok(AssistantReply::without_source(NO_RESOURCE_MESSAGE)),
                    }
                }
            },
        };

        // Regex fallback: a broad intent with a recognizable entity phrase
        // becomes a targeted search. A lexically pinned question already has
        // its resource and keeps the full listing.
        let mut intent = classification.intent;
        if explicit_path.is_none()
            && classification.pinned_path.is_none()
            && intent == QueryIntent::general()
        {
            if let Some(entity) = patterns::entity_from_patterns(question) {
                debug!(%entity, "pattern fallback upgraded intent to entity search");
                intent = QueryIntent::SpecificEntity { value: entity };
            }
        }

        let request = match explicit_path {
            Some(path) => router::route_explicit(path, &self.registry, &self.cfg.limits),
            None => {
                router::route(
                    &intent,
                    &path,
                    &self.cache,
                    self.portal.as_ref(),
                    &self.cfg.limits,
                )
                .await
            }
        };
        let data_source = request.path_with_params();

        let mut records = self.fetch_records(&request).await?;
        if let Some(wanted) = item_id {
            records.retain(|record| record_id(record) == Some(wanted));
            if records.is_empty() {
                return Ok(AssistantReply {
                    answer: format!("No data found for item ID {wanted} at this resource."),
                    data_source: Some(data_source),
                });
            }
        }

        let answer = self
            .synthesizer()
            .answer(&records, question, Some(&intent))
            .await;
        Ok(AssistantReply {
            answer,
            data_source: Some(data_source),
        })
    }

    /// "Which faculties teach me?" — needs the asking student's department
    /// and semester, then post-filters the course-faculty mappings to them.
    async fn answer_my_faculties(&self, question: &str) -> AssistantReply {
        let profile = match &self.user_ctx {
            Some(ctx) => match ctx.student_profile().await {
                Ok(Some(profile)) => profile,
                Ok(None) => return AssistantReply::without_source(NO_USER_CONTEXT_MESSAGE),
                Err(err) => {
                    warn!(error = %err, "student profile lookup failed");
                    return AssistantReply::without_source(CONTEXT_LOOKUP_FAILED_MESSAGE);
                }
            },
            None => return AssistantReply::without_source(NO_USER_CONTEXT_MESSAGE),
        };

        let request =
            router::route_explicit(FACULTY_MAPPINGS_PATH, &self.registry, &self.cfg.limits);
        let data_source = request.path_with_params();

        let records = match self.fetch_records(&request).await {
            Ok(records) => records,
            Err(err) => {
                warn!(error = %err, "faculty mapping fetch failed");
                return AssistantReply::without_source(CONTEXT_LOOKUP_FAILED_MESSAGE);
            }
        };

        let relevant: Vec<NormalizedRecord> = records
            .into_iter()
            .filter(|record| mapping_matches_student(record, &profile))
            .collect();
        debug!(count = relevant.len(), "mappings matched the student's cohort");

        if relevant.is_empty() {
            return AssistantReply {
                answer: format!(
                    "I could not find any course-faculty assignments for semester {} of the {} \
                     department.",
                    profile.semester, profile.department_name
                ),
                data_source: Some(data_source),
            };
        }

        let answer = self.synthesizer().answer(&relevant, question, None).await;
        AssistantReply {
            answer,
            data_source: Some(data_source),
        }
    }

    /// Fetch a profile per named entity and let the model compare them.
    async fn answer_comparison(&self, question: &str, entities: &[EntityRef]) -> AssistantReply {
        let entities = &entities[..entities.len().min(MAX_COMPARISON_ENTITIES)];

        let mut records: Vec<NormalizedRecord> = Vec::new();
        let mut sources: Vec<String> = Vec::new();
        let mut any_profile = false;

        for entity in entities {
            let path = match entity.kind.as_deref() {
                Some("faculty") => FACULTIES_PATH,
                _ => STUDENTS_PATH,
            };
            let request = FetchRequest {
                path: path.to_string(),
                query_params: vec![("search".to_string(), entity.name.clone())],
                fetch_all_pages: false,
            };
            sources.push(request.path_with_params());

            match self.fetch_records(&request).await {
                Ok(found) if !found.is_empty() => {
                    any_profile = true;
                    for mut record in found {
                        annotate_profile(&mut record, entity, path);
                        records.push(record);
                    }
                }
                Ok(_) => {
                    debug!(entity = %entity.name, "no profile found");
                    records.push(missing_profile(entity, "no matching record was found"));
                }
                Err(err) => {
                    warn!(entity = %entity.name, error = %err, "profile fetch failed");
                    records.push(missing_profile(entity, "the lookup failed"));
                }
            }
        }

        if !any_profile {
            return AssistantReply {
                answer: COMPARISON_FAILED_MESSAGE.to_string(),
                data_source: Some(sources.join(", ")),
            };
        }

        let intent = QueryIntent::MultiEntityComparison {
            entities: entities.to_vec(),
        };
        let answer = self
            .synthesizer()
            .answer(&records, question, Some(&intent))
            .await;
        AssistantReply {
            answer,
            data_source: Some(sources.join(", ")),
        }
    }

    async fn fetch_records(&self, request: &FetchRequest) -> Result<Vec<NormalizedRecord>> {
        match fetch_aggregated(self.portal.as_ref(), request, &self.cfg.limits).await? {
            FetchOutcome::Structured(envelope) => Ok(collect_records(&envelope)),
            FetchOutcome::Raw(_) => {
                warn!(path = %request.path, "non-JSON response, no records to analyze");
                Ok(Vec::new())
            }
            FetchOutcome::Empty => Ok(Vec::new()),
        }
    }

    fn synthesizer(&self) -> Synthesizer<'_> {
        Synthesizer::new(
            self.llm.as_ref(),
            self.cfg.chunk_char_budget,
            self.cfg.chunk_delay,
        )
    }
}

/// A mapping applies to the student when its department list names their
/// department and its semester matches theirs.
fn mapping_matches_student(record: &NormalizedRecord, profile: &StudentProfile) -> bool {
    let department_matches = match record.get("student_department_id") {
        Some(Value::Array(ids)) => ids.iter().any(|v| id_equals(v, profile.department_id)),
        Some(value) => id_equals(value, profile.department_id),
        None => false,
    };
    let semester_matches = record
        .get("student_semester")
        .map(|v| id_equals(v, profile.semester))
        .unwrap_or(false);
    department_matches && semester_matches
}

fn id_equals(value: &Value, wanted: i64) -> bool {
    match value {
        Value::Number(n) => n.as_i64() == Some(wanted),
        Value::String(s) => s.trim().parse::<i64>().ok() == Some(wanted),
        _ => false,
    }
}

fn annotate_profile(record: &mut NormalizedRecord, entity: &EntityRef, path: &str) {
    record.insert("_profile_for_".to_string(), json!(entity.name));
    record.insert("_profile_type_".to_string(), json!(path));
}

fn missing_profile(entity: &EntityRef, reason: &str) -> NormalizedRecord {
    let mut record = NormalizedRecord::new();
    record.insert("_profile_for_".to_string(), json!(entity.name));
    record.insert("_error_".to_string(), json!(reason));
    record
}
