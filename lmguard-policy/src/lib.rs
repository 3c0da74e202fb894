//! Policy interpretation of scanner findings.
//!
//! [`PolicyEngine::evaluate`] is a pure function of `(findings, rules)`.
//! Rules come from a JSON policy document and are served to requests as
//! immutable [`PolicySnapshot`]s through a [`PolicyStore`], which swaps the
//! whole snapshot on reload.

pub mod engine;
pub mod errors;
pub mod rules;
pub mod store;

pub use engine::{PolicyEngine, NO_FINDINGS_REASON};
pub use errors::PolicyConfigError;
pub use rules::{PolicyDocument, PolicyRule, PolicyRules};
pub use store::{PolicySnapshot, PolicyStore};
