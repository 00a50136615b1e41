//! Upstream portal access.
//!
//! [`PortalFetch`] is the authenticated-fetch capability the rest of the
//! pipeline depends on: given a path (with query string) it returns either a
//! decoded JSON page or raw text. [`paginate`] walks multi-page listings on
//! top of it and [`normalize`] flattens the portal's resource items into
//! uniform records.

pub mod client;
pub mod normalize;
pub mod paginate;

use async_trait::async_trait;
use serde_json::Value;

use crate::error::PortalError;

pub use client::HttpPortalClient;

/// One upstream response, decoded if the server said it was JSON.
#[derive(Debug, Clone)]
pub enum FetchPayload {
    Json(Value),
    Text(String),
}

/// Authenticated fetch capability against the portal.
///
/// `path_and_query` is relative to the portal base URL unless it is already
/// absolute. Session bootstrap is the caller's problem; implementations only
/// carry the credentials they were handed.
#[async_trait]
pub trait PortalFetch: Send + Sync {
    async fn fetch(&self, path_and_query: &str) -> Result<FetchPayload, PortalError>;
}
