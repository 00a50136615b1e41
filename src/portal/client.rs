//! HTTP implementation of [`PortalFetch`].
//!
//! Carries the session cookies handed to it by configuration and maps the
//! portal's failure modes onto the [`PortalError`] taxonomy. 401/403/419 and
//! redirects onto the login page both mean the session is dead and the caller
//! must re-sync.

use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;
use tracing::{debug, warn};

use super::{FetchPayload, PortalFetch};
use crate::config::AssistantConfig;
use crate::error::PortalError;

const JSON_ACCEPT: &str = "application/json, text/plain, */*";

pub struct HttpPortalClient {
    http: Client,
    base_url: String,
    cookie_header: String,
    xsrf_token: String,
}

impl HttpPortalClient {
    pub fn new(config: &AssistantConfig) -> Result<Self, PortalError> {
        let http = Client::builder().timeout(config.http_timeout).build()?;

        let mut cookie_parts = Vec::new();
        if let Some(forward_auth) = &config.forward_auth_cookie {
            cookie_parts.push(format!("app_forward_auth={forward_auth}"));
        }
        cookie_parts.push(format!("XSRF-TOKEN={}", config.xsrf_token));
        cookie_parts.push(format!("portal_session={}", config.session_cookie));

        Ok(Self {
            http,
            base_url: config.portal_base_url.trim_end_matches('/').to_string(),
            cookie_header: cookie_parts.join("; "),
            xsrf_token: config.xsrf_token.clone(),
        })
    }
}

#[async_trait]
impl PortalFetch for HttpPortalClient {
    async fn fetch(&self, path_and_query: &str) -> Result<FetchPayload, PortalError> {
        let url = if path_and_query.starts_with("http") {
            path_and_query.to_string()
        } else {
            format!("{}{}", self.base_url, path_and_query)
        };

        debug!(path = %path_and_query, "portal fetch");

        let response = self
            .http
            .get(&url)
            .header("Accept", JSON_ACCEPT)
            .header("Referer", format!("{}/", self.base_url))
            .header("Cookie", &self.cookie_header)
            .header("X-XSRF-TOKEN", &self.xsrf_token)
            .header("X-Requested-With", "XMLHttpRequest")
            .send()
            .await?;

        // A dead session bounces us to the login page instead of failing.
        let final_path = response.url().path().to_lowercase();
        if final_path.contains("login") || final_path.contains("sign-in") {
            warn!(url = %response.url(), "portal redirected to login");
            return Err(PortalError::Auth { status: 401 });
        }

        let status = response.status();
        if !status.is_success() {
            let code = status.as_u16();
            let body = response.text().await.unwrap_or_default();
            if matches!(code, 401 | 403 | 419) {
                return Err(PortalError::Auth { status: code });
            }
            return Err(PortalError::Http {
                status: code,
                body: body.chars().take(200).collect(),
            });
        }

        let content_type = response
            .headers()
            .get("content-type")
            .and_then(|v| v.to_str().ok())
            .unwrap_or("")
            .to_lowercase();
        let body = response.text().await?;

        if content_type.contains("application/json") {
            let value: Value = serde_json::from_str(&body)?;
            Ok(FetchPayload::Json(value))
        } else {
            Ok(FetchPayload::Text(body))
        }
    }
}
