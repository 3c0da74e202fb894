//! Independent content detectors and the suite that runs them.
//!
//! Scanners are pure functions of `(message, context)`. A scanner that
//! cannot evaluate content reports an error, and the suite converts it into
//! a maximum-severity finding in that scanner's category, so a broken
//! detector blocks instead of letting unscanned content through.

pub mod dishonesty;
pub mod errors;
pub mod injection;
pub mod patterns;
pub mod pii;
pub mod suite;
pub mod toxicity;
pub mod traits;

pub use dishonesty::DishonestyScanner;
pub use errors::ScannerError;
pub use injection::InjectionScanner;
pub use pii::PiiScanner;
pub use suite::{ScanReport, ScannerSuite};
pub use toxicity::ToxicityScanner;
pub use traits::Scanner;
