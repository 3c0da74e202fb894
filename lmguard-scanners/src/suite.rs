use std::collections::BTreeMap;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use lmguard_core_models::{Category, Finding, Message, Severity, Span};
use tracing::{debug, warn};

use crate::errors::ScannerError;
use crate::traits::Scanner;
use crate::{DishonestyScanner, InjectionScanner, PiiScanner, ToxicityScanner};

/// Findings aggregated across every scanner, plus the names of scanners that
/// failed and were replaced by fail-closed findings.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ScanReport {
    pub findings: Vec<Finding>,
    pub failures: Vec<&'static str>,
}

#[derive(Clone, Default)]
pub struct ScannerSuite {
    scanners: Vec<Arc<dyn Scanner>>,
}

impl ScannerSuite {
    pub fn new() -> Self {
        Self::default()
    }

    /// PII, academic dishonesty, injection, toxicity.
    pub fn standard() -> Self {
        Self::new()
            .with_scanner(Arc::new(PiiScanner))
            .with_scanner(Arc::new(DishonestyScanner))
            .with_scanner(Arc::new(InjectionScanner))
            .with_scanner(Arc::new(ToxicityScanner))
    }

    pub fn with_scanner(mut self, scanner: Arc<dyn Scanner>) -> Self {
        self.scanners.push(scanner);
        self
    }

    pub fn len(&self) -> usize {
        self.scanners.len()
    }

    pub fn is_empty(&self) -> bool {
        self.scanners.is_empty()
    }

    /// Runs every scanner against `message` and aggregates the findings by
    /// `(category, span)`, keeping the higher severity on collision. The
    /// returned findings are ordered by that key.
    pub fn scan(&self, message: &Message, context: &[Message]) -> ScanReport {
        let mut merged: BTreeMap<(Category, Option<Span>), Finding> = BTreeMap::new();
        let mut failures = Vec::new();

        for scanner in &self.scanners {
            let name = scanner.name();
            let outcome = panic::catch_unwind(AssertUnwindSafe(|| scanner.scan(message, context)))
                .unwrap_or_else(|_| Err(ScannerError::Internal("scanner panicked".into())));
            let findings = match outcome {
                Ok(findings) => findings,
                Err(err) => {
                    warn!(scanner = name, error = %err, "scanner failed, emitting fail-closed finding");
                    failures.push(name);
                    vec![failure_finding(scanner.category(), name)]
                }
            };
            debug!(scanner = name, count = findings.len(), "scanner finished");
            for finding in findings {
                let finding = sanitize_span(finding, &message.content, name);
                match merged.get(&finding.key()) {
                    Some(existing) if existing.severity >= finding.severity => {}
                    _ => {
                        merged.insert(finding.key(), finding);
                    }
                }
            }
        }

        ScanReport {
            findings: merged.into_values().collect(),
            failures,
        }
    }
}

fn failure_finding(category: Category, name: &str) -> Finding {
    Finding::new(category, Severity::MAX, format!("scanner_failure:{name}"))
}

// A span that does not address the scanned content is demoted to a
// category-level finding, which the applier treats as unredactable.
fn sanitize_span(mut finding: Finding, content: &str, scanner: &str) -> Finding {
    if let Some(span) = finding.span {
        if let Err(err) = span.check(content) {
            warn!(scanner, error = %err, "dropping invalid finding span");
            finding.span = None;
        }
    }
    finding
}
