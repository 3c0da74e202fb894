use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ModelError {
    #[error("missing field: {0}")]
    Missing(&'static str),
    #[error("invariant violated: {0}")]
    Invariant(&'static str),
    #[error("span {start}..{end} is not valid for content of length {len}")]
    InvalidSpan { start: usize, end: usize, len: usize },
}
