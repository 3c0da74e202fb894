use lmguard_core_models::{Category, Finding, Message, Severity};
use once_cell::sync::Lazy;

use crate::errors::ScannerError;
use crate::patterns::{compile, rules, RuleSet};
use crate::traits::Scanner;

const EXTRA_PHRASE_BONUS: u32 = 10;
const MAX_SEVERITY: u32 = 95;

static DISHONESTY_RULES: Lazy<RuleSet> = Lazy::new(|| {
    compile(&[
        ("do my homework", r"(?i)\bdo\s+my\s+homework\b", 70),
        ("write my essay", r"(?i)\bwrite\s+my\s+essay\b", 70),
        (
            "complete this assignment",
            r"(?i)\bcomplete\s+this\s+assignment\b",
            70,
        ),
        ("answer key", r"(?i)\banswer\s+key\b", 70),
        ("solve this for me", r"(?i)\bsolve\s+this\s+for\s+me\b", 55),
        ("give me the answer", r"(?i)\bgive\s+me\s+the\s+answers?\b", 55),
        ("cheat sheet", r"(?i)\bcheat\s+sheet\b", 55),
    ])
});

/// Keyword heuristics for homework outsourcing. Emits a single
/// category-level finding: the strongest phrase sets the base severity and
/// every further distinct phrase adds a fixed bonus.
#[derive(Clone, Copy, Debug, Default)]
pub struct DishonestyScanner;

impl Scanner for DishonestyScanner {
    fn name(&self) -> &'static str {
        "academic_dishonesty"
    }

    fn category(&self) -> Category {
        Category::AcademicDishonesty
    }

    fn scan(&self, message: &Message, _context: &[Message]) -> Result<Vec<Finding>, ScannerError> {
        let matched: Vec<_> = rules(&DISHONESTY_RULES, self.name())?
            .iter()
            .filter(|rule| rule.regex.is_match(&message.content))
            .collect();
        let Some(base) = matched.iter().map(|rule| rule.severity).max() else {
            return Ok(Vec::new());
        };
        let bonus = (matched.len() as u32 - 1) * EXTRA_PHRASE_BONUS;
        let severity = (base + bonus).min(MAX_SEVERITY);
        let labels: Vec<&str> = matched.iter().map(|rule| rule.label).collect();
        Ok(vec![Finding::new(
            Category::AcademicDishonesty,
            Severity::new(severity),
            format!("homework_outsourcing:{}", labels.join(",")),
        )])
    }
}
