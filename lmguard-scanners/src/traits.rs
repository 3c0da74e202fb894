use lmguard_core_models::{Category, Finding, Message};

use crate::errors::ScannerError;

pub trait Scanner: Send + Sync {
    fn name(&self) -> &'static str;

    /// Category used for every finding this scanner emits, including the
    /// synthetic one produced when the scanner fails.
    fn category(&self) -> Category;

    fn scan(&self, message: &Message, context: &[Message]) -> Result<Vec<Finding>, ScannerError>;
}
