use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ScannerError {
    #[error("scanner unavailable: {0}")]
    Unavailable(String),
    #[error("scanner internal error: {0}")]
    Internal(String),
}
