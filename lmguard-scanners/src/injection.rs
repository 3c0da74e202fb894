use lmguard_core_models::{Category, Finding, Message, Severity};
use once_cell::sync::Lazy;

use crate::errors::ScannerError;
use crate::patterns::{compile, rules, Rule, RuleSet};
use crate::traits::Scanner;

/// Number of user turns (latest included) joined for split-payload checks.
const MULTI_TURN_WINDOW: usize = 3;
const MULTI_TURN_SEVERITY: u32 = 70;

static INJECTION_RULES: Lazy<RuleSet> = Lazy::new(|| {
    compile(&[
        (
            "ignore_instructions",
            r"(?i)\b(?:ignore|disregard)\s+(?:all\s+)?(?:previous|above|prior)\s+(?:instructions|prompts?)\b",
            95,
        ),
        ("system_spoof", r#"(?i)\bsystem\s*:\s*""#, 90),
        ("role_override", r"(?i)\byou\s+are\s+(?:now|no\s+longer)\b", 85),
        ("developer_mode", r"(?i)\bdeveloper\s+mode\b", 85),
        ("new_instructions", r"(?i)\bnew\s+instructions?\b", 75),
    ])
});

/// Prompt-injection detector.
///
/// The latest message is matched pattern by pattern. Prior user turns are
/// used as context: the last few user turns are joined and re-checked, and a
/// pattern that only appears across a turn boundary is reported without a
/// span at reduced severity.
#[derive(Clone, Copy, Debug, Default)]
pub struct InjectionScanner;

impl InjectionScanner {
    fn recent_user_turns<'a>(message: &'a Message, context: &'a [Message]) -> Vec<&'a str> {
        let mut turns: Vec<&str> = context
            .iter()
            .filter(|m| m.is_user())
            .rev()
            .take(MULTI_TURN_WINDOW - 1)
            .map(|m| m.content.as_str())
            .collect();
        turns.reverse();
        turns.push(message.content.as_str());
        turns
    }

    fn split_across_turns(rule: &Rule, turns: &[&str]) -> bool {
        if turns.len() < 2 {
            return false;
        }
        let joined = turns.join("\n");
        rule.regex.is_match(&joined) && !turns.iter().any(|turn| rule.regex.is_match(turn))
    }
}

impl Scanner for InjectionScanner {
    fn name(&self) -> &'static str {
        "injection"
    }

    fn category(&self) -> Category {
        Category::Injection
    }

    fn scan(&self, message: &Message, context: &[Message]) -> Result<Vec<Finding>, ScannerError> {
        let rules = rules(&INJECTION_RULES, self.name())?;
        let turns = Self::recent_user_turns(message, context);
        let mut findings = Vec::new();
        for rule in rules {
            for hit in rule.regex.find_iter(&message.content) {
                findings.push(
                    Finding::new(Category::Injection, Severity::new(rule.severity), rule.label)
                        .with_span(hit.start(), hit.end()),
                );
            }
            if Self::split_across_turns(rule, &turns) {
                findings.push(Finding::new(
                    Category::Injection,
                    Severity::new(MULTI_TURN_SEVERITY),
                    format!("multi_turn_split:{}", rule.label),
                ));
            }
        }
        Ok(findings)
    }
}
