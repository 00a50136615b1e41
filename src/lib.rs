//! Conversational assistant for a resource-oriented college data portal.
//!
//! A question flows through a fixed pipeline: intent classification (lexical
//! override, generative classifier, regex fallback), resource selection
//! against a static registry, request construction with encoded column
//! filters, bounded multi-page retrieval, record normalization, and chunked
//! answer synthesis through a generative model.
//!
//! [`pipeline::Assistant`] is the assembled pipeline; the seams it is built
//! from ([`llm::GenerativeModel`], [`portal::PortalFetch`],
//! [`pipeline::UserContext`]) are traits so every stage is testable without
//! a live portal or model.

pub mod answer;
pub mod config;
pub mod error;
pub mod intent;
pub mod llm;
pub mod pipeline;
pub mod portal;
pub mod refcache;
pub mod registry;
pub mod router;

pub use config::AssistantConfig;
pub use error::{AssistantError, Result};
pub use pipeline::{Assistant, AssistantReply, StudentProfile, UserContext};
