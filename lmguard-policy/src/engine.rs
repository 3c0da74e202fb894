use std::cmp::Reverse;

use lmguard_core_models::{Finding, PolicyAction, PolicyVerdict};

use crate::rules::{PolicyRule, PolicyRules};

pub const NO_FINDINGS_REASON: &str = "no policy-relevant findings";

const MISSING_RULE_SUFFIX: &str = " [no rule]";

struct Active<'a> {
    finding: &'a Finding,
    action: PolicyAction,
    missing_rule: bool,
}

/// Maps aggregated findings onto configured rules.
#[derive(Clone, Copy, Debug, Default)]
pub struct PolicyEngine;

impl PolicyEngine {
    /// A finding is active when its severity meets its category's threshold.
    /// The verdict takes the dominant active action (block > borderline >
    /// redact > allow); categories without a rule block at any severity.
    /// Pure: identical inputs always produce an identical verdict.
    pub fn evaluate(findings: &[Finding], rules: &PolicyRules) -> PolicyVerdict {
        let active: Vec<Active<'_>> = findings
            .iter()
            .filter_map(|finding| {
                let (rule, missing_rule) = match rules.get(finding.category) {
                    Some(rule) => (rule.clone(), false),
                    None => (PolicyRule::missing(finding.category), true),
                };
                rule.is_active_for(finding.severity).then_some(Active {
                    finding,
                    action: rule.action,
                    missing_rule,
                })
            })
            .collect();

        let Some(action) = active
            .iter()
            .map(|a| a.action)
            .reduce(PolicyAction::dominant)
        else {
            return PolicyVerdict {
                action: PolicyAction::Allow,
                reason: NO_FINDINGS_REASON.to_string(),
                triggering_findings: Vec::new(),
                redactions: Vec::new(),
            };
        };

        let mut triggering: Vec<&Active<'_>> =
            active.iter().filter(|a| a.action == action).collect();
        triggering.sort_by_key(|a| (Reverse(a.finding.severity), a.finding.key()));

        let reason = triggering
            .iter()
            .map(|a| {
                let suffix = if a.missing_rule { MISSING_RULE_SUFFIX } else { "" };
                format!("{}({}){}", a.finding.category, a.finding.severity, suffix)
            })
            .collect::<Vec<_>>()
            .join(", ");

        let mut redactions: Vec<Finding> = active
            .iter()
            .filter(|a| a.action == PolicyAction::Redact)
            .map(|a| a.finding.clone())
            .collect();
        redactions.sort_by_key(Finding::key);

        PolicyVerdict {
            action,
            reason,
            triggering_findings: triggering.into_iter().map(|a| a.finding.clone()).collect(),
            redactions,
        }
    }
}
