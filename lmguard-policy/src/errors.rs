use std::path::PathBuf;

use lmguard_core_models::Category;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PolicyConfigError {
    #[error("policy file {path} unreadable: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("policy document malformed: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("policy names category `{0}` more than once")]
    DuplicateCategory(Category),
    #[error("severity_threshold {value} for `{category}` is outside 0..=100")]
    InvalidThreshold { category: Category, value: i64 },
    #[error("policy store has no backing file to reload from")]
    NoSource,
}
