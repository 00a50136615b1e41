//! Bounded multi-page retrieval and aggregation.
//!
//! Walks a paginated listing page by page, strictly in upstream order, until
//! the portal stops offering a `next_page_url` or the hard page cap is hit.
//! The result keeps the first page's envelope with its result array replaced
//! by the union of all fetched pages and the pagination pointer cleared, so
//! downstream code sees one logical response.

use serde_json::{json, Value};
use tracing::{debug, warn};
use url::Url;

use super::{FetchPayload, PortalFetch};
use crate::error::PortalError;

/// Safety limits for one paginated fetch.
#[derive(Debug, Clone, Copy)]
pub struct PageLimits {
    /// Hard cap on pages fetched, regardless of upstream hints.
    pub max_pages: usize,
    /// Page size requested on listing queries, re-applied across pages.
    pub per_page: u32,
}

impl Default for PageLimits {
    fn default() -> Self {
        // 5 * 150 = 750 records worst case.
        Self {
            max_pages: 5,
            per_page: 150,
        }
    }
}

/// A fully specified portal request.
#[derive(Debug, Clone, PartialEq)]
pub struct FetchRequest {
    pub path: String,
    pub query_params: Vec<(String, String)>,
    pub fetch_all_pages: bool,
}

impl FetchRequest {
    pub fn single_page(path: &str) -> Self {
        Self {
            path: path.to_string(),
            query_params: Vec::new(),
            fetch_all_pages: false,
        }
    }

    pub fn param(&self, key: &str) -> Option<&str> {
        self.query_params
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Path plus encoded query string, the form handed to [`PortalFetch`].
    pub fn path_with_params(&self) -> String {
        if self.query_params.is_empty() {
            return self.path.clone();
        }
        let query = url::form_urlencoded::Serializer::new(String::new())
            .extend_pairs(self.query_params.iter().map(|(k, v)| (k.as_str(), v.as_str())))
            .finish();
        format!("{}?{}", self.path, query)
    }
}

/// Result of a (possibly multi-page) fetch.
#[derive(Debug, Clone)]
pub enum FetchOutcome {
    /// JSON envelope; multi-page responses are merged into the first page.
    Structured(Value),
    /// The first page was not JSON; raw body returned as-is.
    Raw(String),
    /// Nothing usable came back.
    Empty,
}

/// Fetch `request`, following `next_page_url` pointers up to the page cap.
pub async fn fetch_aggregated(
    portal: &dyn PortalFetch,
    request: &FetchRequest,
    limits: &PageLimits,
) -> Result<FetchOutcome, PortalError> {
    let desired_per_page = request.param("perPage").map(str::to_string);

    let mut current = Some(request.path_with_params());
    let mut first_envelope: Option<Value> = None;
    let mut aggregated: Vec<Value> = Vec::new();
    let mut pages = 0usize;

    while let Some(path) = current.take() {
        if pages >= limits.max_pages {
            warn!(
                path = %request.path,
                max_pages = limits.max_pages,
                "page cap reached, truncating pagination"
            );
            break;
        }
        pages += 1;

        let page = match portal.fetch(&path).await? {
            FetchPayload::Json(value) => value,
            FetchPayload::Text(text) => {
                if pages == 1 {
                    return Ok(FetchOutcome::Raw(text));
                }
                warn!(page = pages, "non-JSON page mid-pagination, stopping");
                break;
            }
        };

        aggregated.extend(page_items(&page).iter().cloned());

        if request.fetch_all_pages {
            if let Some(next) = page.get("next_page_url").and_then(Value::as_str) {
                current = next_page_path(next, desired_per_page.as_deref());
            }
        }

        if first_envelope.is_none() {
            first_envelope = Some(page);
        }
    }

    let Some(mut envelope) = first_envelope else {
        return Ok(FetchOutcome::Empty);
    };

    if let Some(object) = envelope.as_object_mut() {
        debug!(pages, records = aggregated.len(), "aggregated paginated response");
        let key = if object.get("resources").map_or(false, Value::is_array) {
            "resources"
        } else if object.get("data").map_or(false, Value::is_array) {
            "data"
        } else {
            "resources"
        };
        object.insert(key.to_string(), Value::Array(aggregated));
        object.insert("next_page_url".to_string(), Value::Null);
        if let Some(meta) = object.get_mut("meta").and_then(Value::as_object_mut) {
            let current_page = meta.get("last_page").cloned().unwrap_or(json!(pages));
            meta.insert("current_page".to_string(), current_page);
        }
    }

    Ok(FetchOutcome::Structured(envelope))
}

/// Extract the result array from a page, trying both known container keys.
fn page_items(page: &Value) -> &[Value] {
    if let Some(items) = page.get("resources").and_then(Value::as_array) {
        return items;
    }
    if let Some(items) = page.get("data").and_then(Value::as_array) {
        return items;
    }
    &[]
}

/// Rebuild a relative path from an upstream `next_page_url`.
///
/// The upstream's query parameters are trusted verbatim except `perPage`,
/// which is forced back to the originally requested page size.
fn next_page_path(next_url: &str, desired_per_page: Option<&str>) -> Option<String> {
    let parsed = Url::parse(next_url).ok()?;
    let mut pairs: Vec<(String, String)> = parsed
        .query_pairs()
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();

    if let Some(per_page) = desired_per_page {
        if let Some(slot) = pairs.iter_mut().find(|(k, _)| k == "perPage") {
            slot.1 = per_page.to_string();
        } else {
            pairs.push(("perPage".to_string(), per_page.to_string()));
        }
    }

    let mut path = parsed.path().to_string();
    if !pairs.is_empty() {
        let query = url::form_urlencoded::Serializer::new(String::new())
            .extend_pairs(pairs.iter().map(|(k, v)| (k.as_str(), v.as_str())))
            .finish();
        path.push('?');
        path.push_str(&query);
    }
    Some(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use serde_json::json;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    /// Scripted fetcher: pops one payload per call, records requested paths.
    struct ScriptedPortal {
        responses: Mutex<VecDeque<FetchPayload>>,
        calls: Mutex<Vec<String>>,
    }

    impl ScriptedPortal {
        fn new(responses: Vec<FetchPayload>) -> Self {
            Self {
                responses: Mutex::new(responses.into()),
                calls: Mutex::new(Vec::new()),
            }
        }

        fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl PortalFetch for ScriptedPortal {
        async fn fetch(&self, path: &str) -> Result<FetchPayload, PortalError> {
            self.calls.lock().unwrap().push(path.to_string());
            self.responses
                .lock()
                .unwrap()
                .pop_front()
                .ok_or(PortalError::Http {
                    status: 500,
                    body: "script exhausted".to_string(),
                })
        }
    }

    fn page(ids: &[i64], next: Option<&str>) -> FetchPayload {
        let items: Vec<Value> = ids.iter().map(|id| json!({"id": id})).collect();
        FetchPayload::Json(json!({
            "resources": items,
            "next_page_url": next,
            "meta": {"current_page": 1, "last_page": 3}
        }))
    }

    fn listing_request(fetch_all: bool) -> FetchRequest {
        FetchRequest {
            path: "/nova-api/students".to_string(),
            query_params: vec![("perPage".to_string(), "2".to_string())],
            fetch_all_pages: fetch_all,
        }
    }

    #[tokio::test]
    async fn merges_pages_in_order_and_clears_pointer() {
        let portal = ScriptedPortal::new(vec![
            page(&[1, 2], Some("https://portal.test/nova-api/students?page=2&perPage=50")),
            page(&[3, 4], Some("https://portal.test/nova-api/students?page=3")),
            page(&[5], None),
        ]);

        let outcome = fetch_aggregated(&portal, &listing_request(true), &PageLimits::default())
            .await
            .unwrap();

        let FetchOutcome::Structured(envelope) = outcome else {
            panic!("expected structured outcome");
        };
        let ids: Vec<i64> = envelope["resources"]
            .as_array()
            .unwrap()
            .iter()
            .map(|r| r["id"].as_i64().unwrap())
            .collect();
        assert_eq!(ids, vec![1, 2, 3, 4, 5]);
        assert!(envelope["next_page_url"].is_null());
        assert_eq!(envelope["meta"]["current_page"], json!(3));

        // The requested perPage is forced back onto every next-page URL.
        let calls = portal.calls();
        assert_eq!(calls.len(), 3);
        assert!(calls[1].contains("perPage=2"), "got {}", calls[1]);
        assert!(calls[2].contains("perPage=2"), "got {}", calls[2]);
    }

    #[tokio::test]
    async fn single_page_request_ignores_next_hints() {
        let portal = ScriptedPortal::new(vec![page(&[1, 2], Some("https://p.test/x?page=2"))]);

        let outcome = fetch_aggregated(&portal, &listing_request(false), &PageLimits::default())
            .await
            .unwrap();

        let FetchOutcome::Structured(envelope) = outcome else {
            panic!("expected structured outcome");
        };
        assert_eq!(envelope["resources"].as_array().unwrap().len(), 2);
        assert_eq!(portal.calls().len(), 1);
    }

    #[tokio::test]
    async fn respects_hard_page_cap() {
        // Every page advertises a next page; only max_pages are fetched.
        let pages: Vec<FetchPayload> = (0..10)
            .map(|i| page(&[i * 2, i * 2 + 1], Some("https://p.test/x?page=next")))
            .collect();
        let portal = ScriptedPortal::new(pages);

        let limits = PageLimits {
            max_pages: 3,
            per_page: 2,
        };
        let outcome = fetch_aggregated(&portal, &listing_request(true), &limits)
            .await
            .unwrap();

        let FetchOutcome::Structured(envelope) = outcome else {
            panic!("expected structured outcome");
        };
        assert_eq!(envelope["resources"].as_array().unwrap().len(), 6);
        assert_eq!(portal.calls().len(), 3);
    }

    #[tokio::test]
    async fn raw_text_on_first_page_is_returned_verbatim() {
        let portal =
            ScriptedPortal::new(vec![FetchPayload::Text("<html>maintenance</html>".into())]);

        let outcome = fetch_aggregated(&portal, &listing_request(true), &PageLimits::default())
            .await
            .unwrap();

        match outcome {
            FetchOutcome::Raw(text) => assert!(text.contains("maintenance")),
            other => panic!("expected raw outcome, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn failed_page_aborts_whole_fetch() {
        let portal = ScriptedPortal::new(vec![
            page(&[1], Some("https://p.test/x?page=2")),
            // Script exhausted -> second page errors.
        ]);

        let result =
            fetch_aggregated(&portal, &listing_request(true), &PageLimits::default()).await;
        assert!(result.is_err());
    }

    #[test]
    fn data_container_key_is_supported() {
        let envelope = json!({"data": [{"id": 1}], "next_page_url": null});
        assert_eq!(page_items(&envelope).len(), 1);
    }

    #[test]
    fn path_with_params_encodes_query() {
        let request = FetchRequest {
            path: "/nova-api/students".to_string(),
            query_params: vec![("search".to_string(), "John Doe".to_string())],
            fetch_all_pages: false,
        };
        assert_eq!(
            request.path_with_params(),
            "/nova-api/students?search=John+Doe"
        );
    }
}
