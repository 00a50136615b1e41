//! Assistant configuration.
//!
//! Everything tunable lives here: portal endpoint and session material, model
//! selection, and the pipeline's pagination/chunking/caching knobs.
//! `from_env` layers environment variables over the defaults; call
//! `dotenvy::dotenv().ok()` before it if a `.env` file should be honored.

use std::time::Duration;

use crate::portal::paginate::PageLimits;

/// Default per-chunk character budget for serialized evidence.
pub const DEFAULT_CHUNK_CHAR_BUDGET: usize = 28_000;

/// Default delay between sequential chunk model calls.
pub const DEFAULT_CHUNK_DELAY: Duration = Duration::from_secs(4);

/// Default TTL for the department reference cache.
pub const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(3600);

/// Default similarity threshold (0-100) for the possessive-phrase override.
pub const DEFAULT_FUZZY_THRESHOLD: u8 = 90;

#[derive(Debug, Clone)]
pub struct AssistantConfig {
    /// Base URL of the portal, without a trailing slash.
    pub portal_base_url: String,
    /// Value of the portal session cookie.
    pub session_cookie: String,
    /// Value of the XSRF token cookie; echoed as a header on JSON requests.
    pub xsrf_token: String,
    /// Optional forward-auth cookie some deployments sit behind.
    pub forward_auth_cookie: Option<String>,

    /// API key for the generative model.
    pub gemini_api_key: String,
    /// Model identifier, e.g. `gemini-2.0-flash-lite`.
    pub gemini_model: String,
    /// Timeout applied to both portal and model HTTP calls.
    pub http_timeout: Duration,

    pub chunk_char_budget: usize,
    pub chunk_delay: Duration,
    pub limits: PageLimits,
    pub cache_ttl: Duration,
    pub fuzzy_threshold: u8,
}

impl Default for AssistantConfig {
    fn default() -> Self {
        Self {
            portal_base_url: "https://bip.bitsathy.ac.in".to_string(),
            session_cookie: String::new(),
            xsrf_token: String::new(),
            forward_auth_cookie: None,
            gemini_api_key: String::new(),
            gemini_model: "gemini-2.0-flash-lite".to_string(),
            http_timeout: Duration::from_secs(60),
            chunk_char_budget: DEFAULT_CHUNK_CHAR_BUDGET,
            chunk_delay: DEFAULT_CHUNK_DELAY,
            limits: PageLimits::default(),
            cache_ttl: DEFAULT_CACHE_TTL,
            fuzzy_threshold: DEFAULT_FUZZY_THRESHOLD,
        }
    }
}

impl AssistantConfig {
    /// Build a config from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        let mut cfg = Self::default();

        if let Ok(url) = std::env::var("PORTAL_BASE_URL") {
            cfg.portal_base_url = url.trim_end_matches('/').to_string();
        }
        if let Ok(v) = std::env::var("PORTAL_SESSION_COOKIE") {
            cfg.session_cookie = v;
        }
        if let Ok(v) = std::env::var("PORTAL_XSRF_TOKEN") {
            cfg.xsrf_token = v;
        }
        if let Ok(v) = std::env::var("PORTAL_FORWARD_AUTH_COOKIE") {
            cfg.forward_auth_cookie = Some(v);
        }
        if let Ok(v) = std::env::var("GEMINI_API_KEY") {
            cfg.gemini_api_key = v;
        }
        if let Ok(v) = std::env::var("GEMINI_MODEL") {
            cfg.gemini_model = v;
        }
        if let Some(secs) = read_u64("ASSISTANT_HTTP_TIMEOUT_SECS") {
            cfg.http_timeout = Duration::from_secs(secs);
        }
        if let Some(n) = read_u64("ASSISTANT_CHUNK_CHAR_BUDGET") {
            cfg.chunk_char_budget = n as usize;
        }
        if let Some(secs) = read_u64("ASSISTANT_CHUNK_DELAY_SECS") {
            cfg.chunk_delay = Duration::from_secs(secs);
        }
        if let Some(n) = read_u64("ASSISTANT_MAX_PAGES") {
            cfg.limits.max_pages = n as usize;
        }
        if let Some(n) = read_u64("ASSISTANT_PER_PAGE") {
            cfg.limits.per_page = n as u32;
        }
        if let Some(secs) = read_u64("ASSISTANT_CACHE_TTL_SECS") {
            cfg.cache_ttl = Duration::from_secs(secs);
        }
        if let Some(n) = read_u64("ASSISTANT_FUZZY_THRESHOLD") {
            cfg.fuzzy_threshold = n.min(100) as u8;
        }

        cfg
    }
}

fn read_u64(key: &str) -> Option<u64> {
    std::env::var(key).ok().and_then(|v| v.trim().parse().ok())
}
