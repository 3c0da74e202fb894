use lmguard_core_models::ModelError;
use lmguard_guard::{ArbiterError, CacheError, EmbeddingError};
use lmguard_policy::PolicyConfigError;
use thiserror::Error;

/// The only failure a chat request can surface. Every subsystem failure
/// past validation is absorbed into a conservative decision instead.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum PipelineError {
    #[error("invalid request: {0}")]
    InvalidRequest(#[from] ModelError),
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{var}: {reason}")]
    Invalid { var: &'static str, reason: String },
    #[error(transparent)]
    Policy(#[from] PolicyConfigError),
    #[error("semantic cache: {0}")]
    Cache(#[from] CacheError),
    #[error("arbiter: {0}")]
    Arbiter(#[from] ArbiterError),
    #[error("embedding provider: {0}")]
    Embedding(#[from] EmbeddingError),
    #[error("audit log: {0}")]
    Audit(#[from] std::io::Error),
}

impl ConfigError {
    pub fn invalid(var: &'static str, reason: impl Into<String>) -> Self {
        ConfigError::Invalid {
            var,
            reason: reason.into(),
        }
    }
}
