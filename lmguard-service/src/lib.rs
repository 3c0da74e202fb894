//! LMGuard service: the orchestrator that runs every chat message through
//! scan, policy, agentic review and action application, plus the thin
//! collaborators (audit, metrics, review queue) and the HTTP surface.

pub mod applier;
pub mod audit;
pub mod config;
pub mod errors;
pub mod http;
pub mod metrics;
pub mod pipeline;
pub mod review;

pub use applier::{
    ActionApplier, Applied, PENDING_REVIEW_MESSAGE, REDACTION_PLACEHOLDER, REFUSAL_MESSAGE,
};
pub use audit::{AuditFanout, AuditSink, InMemoryAuditLog, JsonlAuditLog, StudentHasher};
pub use config::{EmbeddingBackend, ServiceConfig};
pub use errors::{ConfigError, PipelineError};
pub use http::{router, AppState};
pub use metrics::{InMemoryMetrics, MetricsSink, NoopMetrics};
pub use pipeline::GuardPipeline;
pub use review::{InMemoryReviewQueue, ReviewQueue, ReviewTicket};
