use std::collections::BTreeSet;

use lmguard_core_models::{Category, Finding, Message, Severity};
use once_cell::sync::Lazy;

use crate::errors::ScannerError;
use crate::patterns::{compile, rules, RuleSet};
use crate::traits::Scanner;

const PER_KEYWORD_SEVERITY: u32 = 30;

static TOXIC_RULES: Lazy<RuleSet> = Lazy::new(|| {
    compile(&[(
        "toxic_keyword",
        r"(?i)\b(?:hate|kill|die|stupid|idiot|dumb|attack|violent)\b",
        PER_KEYWORD_SEVERITY,
    )])
});

/// Whole-word keyword toxicity heuristic. Severity grows with the number of
/// distinct keywords present.
#[derive(Clone, Copy, Debug, Default)]
pub struct ToxicityScanner;

impl Scanner for ToxicityScanner {
    fn name(&self) -> &'static str {
        "toxicity"
    }

    fn category(&self) -> Category {
        Category::Toxicity
    }

    fn scan(&self, message: &Message, _context: &[Message]) -> Result<Vec<Finding>, ScannerError> {
        let mut findings = Vec::new();
        for rule in rules(&TOXIC_RULES, self.name())? {
            let distinct: BTreeSet<String> = rule
                .regex
                .find_iter(&message.content)
                .map(|hit| hit.as_str().to_lowercase())
                .collect();
            if distinct.is_empty() {
                continue;
            }
            findings.push(Finding::new(
                Category::Toxicity,
                Severity::new(rule.severity * distinct.len() as u32),
                format!("{}:{}", rule.label, distinct.len()),
            ));
        }
        Ok(findings)
    }
}
