//! Shared data model for the LMGuard decision pipeline.
//!
//! Every stage of the pipeline (scanners, policy engine, agentic guard,
//! action applier) speaks in the types defined here. The fail-safe
//! property is carried by [`Outcome`] and [`Provenance`]: each stage
//! produces an explicit outcome, there is no "no opinion" value that
//! could default to allow by omission.

pub mod api;
pub mod audit;
pub mod errors;
pub mod finding;
pub mod message;
pub mod outcome;
pub mod redaction;
pub mod validate;

pub use api::{ChatRequest, ChatResponse};
pub use audit::{AuditRecord, FindingSummary, StageLatencies};
pub use errors::ModelError;
pub use finding::{Category, Finding, Severity, Span};
pub use message::{Message, Role};
pub use outcome::{
    Confidence, DecisionSource, GuardDecision, Outcome, PolicyAction, PolicyVerdict, Provenance,
};
pub use redaction::{mask_spans, REDACTION_PLACEHOLDER};
pub use validate::InvariantCheck;
