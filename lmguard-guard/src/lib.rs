//! Agentic review of borderline messages.
//!
//! The [`AgenticGuard`] embeds the message, consults the [`SemanticCache`]
//! for a near-duplicate decision and otherwise asks an [`Arbiter`] under a
//! hard timeout. Every failure on this path resolves to
//! [`GuardDecision::fallback`](lmguard_core_models::GuardDecision::fallback).

pub mod agent;
pub mod arbiter;
pub mod cache;
pub mod embed;
pub mod errors;

pub use agent::{AgenticGuard, DEFAULT_ARBITER_TIMEOUT};
pub use arbiter::{
    parse_decision, Arbiter, ArbiterRequest, HttpArbiter, MockArbiter, UnavailableArbiter,
};
pub use cache::{CacheConfig, CacheKey, SemanticCache};
pub use embed::{EmbeddingProvider, HashingEmbedder, OpenAiEmbedder};
pub use errors::{ArbiterError, CacheError, EmbeddingError};
