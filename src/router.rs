//! Intent × registry → concrete portal request.
//!
//! Two halves: model-driven selection of the resource path (where "no
//! suitable resource" is a first-class outcome, not an error), and the
//! per-resource parameter policy that turns an intent into search terms,
//! base64-encoded column filters, and pagination settings.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use serde_json::{json, Value};
use tracing::{debug, warn};

use crate::intent::{text_completion, QueryIntent};
use crate::llm::GenerativeModel;
use crate::portal::paginate::{FetchRequest, PageLimits};
use crate::portal::PortalFetch;
use crate::refcache::DepartmentCache;
use crate::registry::{
    ResourceRegistry, ACHIEVEMENTS_PATH, EVENTS_PATH, FACULTY_MAPPINGS_PATH, PERIODICALS_PATH,
    STUDENTS_PATH,
};

/// Sentinel the path-selection prompt reserves for "nothing fits".
const NO_PATH_FOUND: &str = "NO_PATH_FOUND";

/// Ask the model to pick exactly one resource path for the question.
/// `None` means no suitable resource exists; the pipeline reports that to
/// the user without making any portal call.
pub async fn select_resource(
    question: &str,
    registry: &ResourceRegistry,
    llm: &dyn GenerativeModel,
) -> Option<String> {
    let prompt = vec![
        "Select the single most appropriate API endpoint path from the list below to answer \
         the user's question."
            .to_string(),
        format!(
            "Respond with ONLY the path string (e.g., \"{STUDENTS_PATH}\"). If no listed \
             endpoint can answer the question, respond with \"{NO_PATH_FOUND}\"."
        ),
        "If the question uses possessive terms like \"my\" (e.g., \"my feedback\", \"my \
         details\"), prioritize endpoints whose descriptions cover personal data for the \
         logged-in user. Match keywords from the question against the descriptions and data \
         hints."
            .to_string(),
        format!("Available API Endpoints:\n{}", registry.format_for_prompt()),
        format!("User's Question: \"{question}\""),
        "Selected API Path:".to_string(),
    ];

    let reply = match text_completion(llm, &prompt).await {
        Ok(Some(text)) => text.trim().trim_matches('"').to_string(),
        Ok(None) => return None,
        Err(err) => {
            warn!(error = %err, "path selection model call failed");
            return None;
        }
    };

    if reply == NO_PATH_FOUND {
        return None;
    }
    if registry.contains(&reply) {
        debug!(path = %reply, "model selected resource path");
        Some(reply)
    } else {
        warn!(reply = %reply, "model returned a path outside the registry");
        None
    }
}

/// Build the request for `path` according to the classified intent.
///
/// Department listings resolve the department name through the reference
/// cache; resolution failure degrades to an unfiltered listing rather than
/// failing the question.
pub async fn route(
    intent: &QueryIntent,
    path: &str,
    cache: &DepartmentCache,
    portal: &dyn PortalFetch,
    limits: &PageLimits,
) -> FetchRequest {
    let mut params: Vec<(String, String)> = Vec::new();
    let fetch_all_pages;

    match intent {
        QueryIntent::SpecificEntity { value } => {
            // Some endpoints only honor `search` when a filters parameter is
            // present, even an all-empty one.
            if path == EVENTS_PATH {
                params.push(("filters".to_string(), encode_filters(&empty_event_filters())));
            }
            params.push(("search".to_string(), value.clone()));
            fetch_all_pages = false;
        }

        QueryIntent::ListByCategory {
            category_type,
            value,
        } if path == STUDENTS_PATH && category_type == "department_name" => {
            match cache.resolve(value, portal, limits).await {
                Some(department_id) => {
                    debug!(department = %value, id = department_id, "department filter applied");
                    params.push((
                        "filters".to_string(),
                        encode_filters(&student_department_filters(department_id)),
                    ));
                }
                None => {
                    warn!(department = %value, "department did not resolve, listing unfiltered");
                }
            }
            params.push(("perPage".to_string(), limits.per_page.to_string()));
            fetch_all_pages = true;
        }

        QueryIntent::ListByCategory { value, .. } => {
            params.push(("search".to_string(), value.clone()));
            params.push(("perPage".to_string(), limits.per_page.to_string()));
            fetch_all_pages = true;
        }

        QueryIntent::GeneralListing { keywords } => {
            if let Some(keywords) = keywords {
                params.push(("search".to_string(), keywords.clone()));
            }
            params.push(("perPage".to_string(), limits.per_page.to_string()));
            fetch_all_pages = true;
        }

        _ => {
            params.push(("perPage".to_string(), limits.per_page.to_string()));
            fetch_all_pages = true;
        }
    }

    apply_default_filters(path, &mut params);

    FetchRequest {
        path: path.to_string(),
        query_params: params,
        fetch_all_pages,
    }
}

/// Request for an explicitly supplied path.
///
/// A path that already carries a query string is trusted and passed through
/// unmodified on a single page. A bare known path gets the standard listing
/// treatment.
pub fn route_explicit(path: &str, registry: &ResourceRegistry, limits: &PageLimits) -> FetchRequest {
    if path.contains('?') {
        return FetchRequest::single_page(path);
    }
    if registry.contains(path) {
        let mut params = vec![("perPage".to_string(), limits.per_page.to_string())];
        apply_default_filters(path, &mut params);
        return FetchRequest {
            path: path.to_string(),
            query_params: params,
            fetch_all_pages: true,
        };
    }
    FetchRequest::single_page(path)
}

/// Heavy-payload resources only page correctly when a filters parameter is
/// present; give them their empty placeholder when nothing set one.
fn apply_default_filters(path: &str, params: &mut Vec<(String, String)>) {
    if params.iter().any(|(k, _)| k == "filters") {
        return;
    }
    let defaults = match path {
        ACHIEVEMENTS_PATH | FACULTY_MAPPINGS_PATH => json!([{"DateTime:created_at": [null, null]}]),
        PERIODICALS_PATH => json!([
            {"Select:periodical": ""},
            {"Select:semester": ""},
            {"Select:status": ""}
        ]),
        _ => return,
    };
    params.push(("filters".to_string(), encode_filters(&defaults)));
}

/// Per-column filter array for the students resource with the department
/// slot bound to a resolved id.
pub fn student_department_filters(department_id: i64) -> Value {
    json!([
        {"Text:name": ""},
        {"resource:student-statuses:student_statuses": ""},
        {"Text:enroll_no": ""},
        {"Text:roll_no": ""},
        {"Text:email": ""},
        {"Select:batch": ""},
        {"Select:degree_level": ""},
        {"resource:departments:department": department_id},
        {"resource:branch-masters:branch_masters": ""}
    ])
}

/// All-empty per-column filter array for the events resource.
pub fn empty_event_filters() -> Value {
    json!([
        {"Text:event_code": ""},
        {"Text:event_name": ""},
        {"Text:organizer": ""},
        {"Text:web_url": ""},
        {"Select:status": ""},
        {"Date:start_date": [null, null]},
        {"Date:end_date": [null, null]},
        {"Text:location": ""},
        {"Text:competition_name": ""},
        {"Select:rewards_eligible": ""},
        {"Number:participation_rewards": [null, null]},
        {"DateTime:created_at": [null, null]},
        {"DateTime:updated_at": [null, null]}
    ])
}

/// JSON-serialize then base64-encode a filter structure, the form the portal
/// expects in its single `filters` query parameter.
pub fn encode_filters(filters: &Value) -> String {
    BASE64.encode(filters.to_string().as_bytes())
}

#[cfg(test)]
pub fn decode_filters(encoded: &str) -> Value {
    let bytes = BASE64.decode(encoded).expect("valid base64");
    serde_json::from_slice(&bytes).expect("valid JSON filters")
}
