use lmguard_core_models::{Category, Finding, Message, Severity};
use once_cell::sync::Lazy;

use crate::errors::ScannerError;
use crate::patterns::{compile, rules, RuleSet};
use crate::traits::Scanner;

static PII_RULES: Lazy<RuleSet> = Lazy::new(|| {
    compile(&[
        (
            "email",
            r"\b[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}\b",
            80,
        ),
        ("payment_card", r"\b(?:\d[ -]?){15}\d\b", 80),
        ("ssn", r"\b\d{3}-\d{2}-\d{4}\b", 90),
        ("phone", r"\b\d{3}[-.\s]?\d{3}[-.\s]?\d{4}\b", 80),
        ("phone", r"\(\d{3}\)\s?\d{3}[-.\s]?\d{4}\b", 80),
    ])
});

/// Regex PII detector. Emits one spanned finding per match.
#[derive(Clone, Copy, Debug, Default)]
pub struct PiiScanner;

impl Scanner for PiiScanner {
    fn name(&self) -> &'static str {
        "pii"
    }

    fn category(&self) -> Category {
        Category::Pii
    }

    fn scan(&self, message: &Message, _context: &[Message]) -> Result<Vec<Finding>, ScannerError> {
        let text = message.content.as_str();
        let mut findings = Vec::new();
        for rule in rules(&PII_RULES, self.name())? {
            for hit in rule.regex.find_iter(text) {
                findings.push(
                    Finding::new(Category::Pii, Severity::new(rule.severity), rule.label)
                        .with_span(hit.start(), hit.end()),
                );
            }
        }
        Ok(findings)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scan(text: &str) -> Vec<Finding> {
        PiiScanner.scan(&Message::user(text), &[]).unwrap()
    }

    #[test]
    fn detects_email_with_span() {
        let text = "mail me at jane.doe@example.edu please";
        let findings = scan(text);
        assert_eq!(findings.len(), 1);
        let span = findings[0].span.unwrap();
        assert_eq!(&text[span.start..span.end], "jane.doe@example.edu");
        assert_eq!(findings[0].detail, "email");
        assert_eq!(findings[0].severity.value(), 80);
    }

    #[test]
    fn detects_sixteen_digit_card() {
        let text = "my card is 4111 1111 1111 1111 ok";
        let findings = scan(text);
        let card = findings
            .iter()
            .find(|f| f.detail == "payment_card")
            .expect("card finding");
        let span = card.span.unwrap();
        assert_eq!(&text[span.start..span.end], "4111 1111 1111 1111");
        assert!(findings.iter().all(|f| f.detail != "phone"));
    }

    #[test]
    fn detects_phone_formats() {
        assert_eq!(scan("call 555-123-4567")[0].detail, "phone");
        assert_eq!(scan("call (555) 123-4567")[0].detail, "phone");
        assert_eq!(scan("call 5551234567")[0].detail, "phone");
    }

    #[test]
    fn ssn_outranks_phone() {
        let findings = scan("ssn 123-45-6789");
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].detail, "ssn");
        assert_eq!(findings[0].severity.value(), 90);
    }

    #[test]
    fn detail_never_contains_matched_text() {
        let findings = scan("jane@example.com");
        assert!(!findings[0].detail.contains("jane"));
    }

    #[test]
    fn clean_text_has_no_findings() {
        assert!(scan("What is the derivative of x squared?").is_empty());
    }
}
