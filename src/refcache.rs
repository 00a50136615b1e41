//! TTL cache of department name → id mappings.
//!
//! The department list changes rarely but is needed on every
//! department-filtered listing, so the whole list is cached for a fixed TTL
//! and refreshed from the portal on expiry. Resolution never fails the
//! caller: a refresh error serves the stale snapshot if one exists, and a
//! name that is absent simply resolves to `None`.
//!
//! The refresh runs outside the lock. Two tasks that both observe an expired
//! snapshot will both refetch and the last writer wins; both fetch the same
//! list, so the duplicate call is the only cost.

use std::sync::RwLock;
use std::time::{Duration, Instant};

use serde_json::Value;
use tracing::{debug, warn};

use crate::portal::normalize::{collect_records, record_id};
use crate::portal::paginate::{fetch_aggregated, FetchOutcome, FetchRequest, PageLimits};
use crate::portal::PortalFetch;
use crate::registry::DEPARTMENTS_PATH;

/// One cached reference entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefEntry {
    pub id: i64,
    pub name: String,
}

#[derive(Debug)]
struct CacheState {
    entries: Vec<RefEntry>,
    refreshed_at: Instant,
}

/// Department lookup cache with time-based expiry.
#[derive(Debug)]
pub struct DepartmentCache {
    ttl: Duration,
    inner: RwLock<Option<CacheState>>,
}

impl DepartmentCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            inner: RwLock::new(None),
        }
    }

    /// Resolve a department name to its id, case-insensitively on the
    /// trimmed name. Refreshes the cached list first if the TTL has lapsed.
    pub async fn resolve(
        &self,
        name: &str,
        portal: &dyn PortalFetch,
        limits: &PageLimits,
    ) -> Option<i64> {
        if let Some(entries) = self.fresh_entries() {
            return lookup(&entries, name);
        }

        match self.refetch(portal, limits).await {
            Ok(entries) => {
                debug!(count = entries.len(), "department cache refreshed");
                let found = lookup(&entries, name);
                let mut guard = self.inner.write().unwrap_or_else(|e| e.into_inner());
                *guard = Some(CacheState {
                    entries,
                    refreshed_at: Instant::now(),
                });
                found
            }
            Err(err) => {
                warn!(error = %err, "department cache refresh failed, serving stale data");
                let guard = self.inner.read().unwrap_or_else(|e| e.into_inner());
                guard
                    .as_ref()
                    .and_then(|state| lookup(&state.entries, name))
            }
        }
    }

    fn fresh_entries(&self) -> Option<Vec<RefEntry>> {
        let guard = self.inner.read().unwrap_or_else(|e| e.into_inner());
        let state = guard.as_ref()?;
        if state.refreshed_at.elapsed() < self.ttl {
            Some(state.entries.clone())
        } else {
            None
        }
    }

    async fn refetch(
        &self,
        portal: &dyn PortalFetch,
        limits: &PageLimits,
    ) -> Result<Vec<RefEntry>, crate::error::PortalError> {
        let request = FetchRequest {
            path: DEPARTMENTS_PATH.to_string(),
            query_params: Vec::new(),
            fetch_all_pages: true,
        };
        let envelope = match fetch_aggregated(portal, &request, limits).await? {
            FetchOutcome::Structured(envelope) => envelope,
            _ => return Ok(Vec::new()),
        };

        let entries = collect_records(&envelope)
            .iter()
            .filter_map(|record| {
                let id = record_id(record)?;
                let name = record
                    .get("name")
                    .or_else(|| record.get("title"))
                    .and_then(Value::as_str)?;
                Some(RefEntry {
                    id,
                    name: name.to_string(),
                })
            })
            .collect();
        Ok(entries)
    }
}

fn lookup(entries: &[RefEntry], name: &str) -> Option<i64> {
    let wanted = name.trim().to_lowercase();
    entries
        .iter()
        .find(|entry| entry.name.trim().to_lowercase() == wanted)
        .map(|entry| entry.id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::PortalError;
    use crate::portal::FetchPayload;
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Counts fetches; serves departments until told to fail.
    struct CountingPortal {
        calls: AtomicUsize,
        fail_after: usize,
    }

    impl CountingPortal {
        fn new(fail_after: usize) -> Self {
            Self {
                calls: AtomicUsize::new(0),
                fail_after,
            }
        }
    }

    #[async_trait]
    impl PortalFetch for CountingPortal {
        async fn fetch(&self, _path: &str) -> Result<FetchPayload, PortalError> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            if n >= self.fail_after {
                return Err(PortalError::Http {
                    status: 503,
                    body: "unavailable".to_string(),
                });
            }
            Ok(FetchPayload::Json(json!({
                "resources": [
                    {"id": {"value": 3}, "fields": [{"attribute": "name", "value": "Physics"}]},
                    {"id": {"value": 9}, "fields": [{"attribute": "name", "value": " Chemistry "}]}
                ],
                "next_page_url": null
            })))
        }
    }

    #[tokio::test]
    async fn resolves_case_insensitively() {
        let cache = DepartmentCache::new(Duration::from_secs(3600));
        let portal = CountingPortal::new(usize::MAX);
        assert_eq!(
            cache.resolve("physics", &portal, &PageLimits::default()).await,
            Some(3)
        );
        assert_eq!(
            cache.resolve("CHEMISTRY", &portal, &PageLimits::default()).await,
            Some(9)
        );
        assert_eq!(
            cache.resolve("Alchemy", &portal, &PageLimits::default()).await,
            None
        );
    }

    #[tokio::test]
    async fn second_resolve_uses_cache() {
        let cache = DepartmentCache::new(Duration::from_secs(3600));
        let portal = CountingPortal::new(usize::MAX);
        cache.resolve("Physics", &portal, &PageLimits::default()).await;
        cache.resolve("Chemistry", &portal, &PageLimits::default()).await;
        assert_eq!(portal.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn zero_ttl_refetches_every_time() {
        let cache = DepartmentCache::new(Duration::ZERO);
        let portal = CountingPortal::new(usize::MAX);
        cache.resolve("Physics", &portal, &PageLimits::default()).await;
        cache.resolve("Physics", &portal, &PageLimits::default()).await;
        assert_eq!(portal.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn refresh_failure_serves_stale_entries() {
        let cache = DepartmentCache::new(Duration::ZERO);
        let portal = CountingPortal::new(1);
        assert_eq!(
            cache.resolve("Physics", &portal, &PageLimits::default()).await,
            Some(3)
        );
        // expired and the refetch now fails; stale snapshot still answers
        assert_eq!(
            cache.resolve("Physics", &portal, &PageLimits::default()).await,
            Some(3)
        );
    }

    #[tokio::test]
    async fn refresh_failure_without_snapshot_yields_none() {
        let cache = DepartmentCache::new(Duration::from_secs(3600));
        let portal = CountingPortal::new(0);
        assert_eq!(
            cache.resolve("Physics", &portal, &PageLimits::default()).await,
            None
        );
    }
}
