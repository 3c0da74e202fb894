use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum CacheError {
    #[error("embedding dimension mismatch: expected {expected}, got {got}")]
    DimensionMismatch { expected: usize, got: usize },
    #[error("embedding contains non-finite values")]
    NonFinite,
    #[error("invalid cache configuration: {0}")]
    InvalidConfig(String),
}

#[derive(Debug, Error, Clone, PartialEq)]
pub enum EmbeddingError {
    #[error("embedding transport failure: {0}")]
    Transport(String),
    #[error("embedding response malformed: {0}")]
    Malformed(String),
    #[error("no embeddable content")]
    Empty,
    #[error("embedding timed out")]
    Timeout,
}

#[derive(Debug, Error, Clone, PartialEq)]
pub enum ArbiterError {
    #[error("arbiter unavailable: {0}")]
    Unavailable(String),
    #[error("arbiter transport failure: {0}")]
    Transport(String),
    #[error("arbiter returned http {0}")]
    Status(u16),
    #[error("arbiter response unparseable: {0}")]
    Unparseable(String),
}
