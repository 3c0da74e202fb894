use regex::Regex;

use crate::errors::ScannerError;

/// A compiled detection rule: label, regex, severity.
pub struct Rule {
    pub label: &'static str,
    pub regex: Regex,
    pub severity: u32,
}

pub type RuleSet = Result<Vec<Rule>, String>;

pub fn compile(table: &[(&'static str, &'static str, u32)]) -> RuleSet {
    table
        .iter()
        .map(|(label, pattern, severity)| {
            Regex::new(pattern)
                .map(|regex| Rule {
                    label,
                    regex,
                    severity: *severity,
                })
                .map_err(|err| format!("{label}: {err}"))
        })
        .collect()
}

pub fn rules<'a>(set: &'a RuleSet, scanner: &str) -> Result<&'a [Rule], ScannerError> {
    set.as_deref()
        .map_err(|err| ScannerError::Unavailable(format!("{scanner} patterns: {err}")))
}
