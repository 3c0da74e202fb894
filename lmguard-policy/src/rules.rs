use std::collections::BTreeMap;
use std::path::Path;

use lmguard_core_models::{Category, PolicyAction, Severity};
use serde::{Deserialize, Serialize};

use crate::errors::PolicyConfigError;

/// On-disk shape of a policy file.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct PolicyDocument {
    pub version: u32,
    pub rules: Vec<RuleEntry>,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct RuleEntry {
    pub category: Category,
    pub action: PolicyAction,
    pub severity_threshold: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub explanation: Option<String>,
}

#[derive(Clone, Debug, Serialize, PartialEq, Eq)]
pub struct PolicyRule {
    pub category: Category,
    pub action: PolicyAction,
    pub severity_threshold: Severity,
    pub explanation: Option<String>,
}

impl PolicyRule {
    pub fn new(category: Category, action: PolicyAction, severity_threshold: u32) -> Self {
        Self {
            category,
            action,
            severity_threshold: Severity::new(severity_threshold),
            explanation: None,
        }
    }

    /// Rule applied to categories the policy does not mention: every finding
    /// is active and blocks.
    pub fn missing(category: Category) -> Self {
        Self::new(category, PolicyAction::Block, 0)
    }

    pub fn is_active_for(&self, severity: Severity) -> bool {
        severity >= self.severity_threshold
    }
}

/// Validated category -> rule mapping.
#[derive(Clone, Debug, Default, Serialize, PartialEq, Eq)]
pub struct PolicyRules(BTreeMap<Category, PolicyRule>);

impl PolicyRules {
    pub fn new(rules: impl IntoIterator<Item = PolicyRule>) -> Result<Self, PolicyConfigError> {
        let mut map = BTreeMap::new();
        for rule in rules {
            let category = rule.category;
            if map.insert(category, rule).is_some() {
                return Err(PolicyConfigError::DuplicateCategory(category));
            }
        }
        Ok(Self(map))
    }

    pub fn get(&self, category: Category) -> Option<&PolicyRule> {
        self.0.get(&category)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &PolicyRule> {
        self.0.values()
    }
}

impl PolicyDocument {
    pub fn from_json(raw: &str) -> Result<Self, PolicyConfigError> {
        Ok(serde_json::from_str(raw)?)
    }

    pub fn load(path: &Path) -> Result<Self, PolicyConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| PolicyConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json(&raw)
    }

    pub fn into_rules(self) -> Result<PolicyRules, PolicyConfigError> {
        let mut rules = Vec::with_capacity(self.rules.len());
        for entry in self.rules {
            if !(0..=100).contains(&entry.severity_threshold) {
                return Err(PolicyConfigError::InvalidThreshold {
                    category: entry.category,
                    value: entry.severity_threshold,
                });
            }
            rules.push(PolicyRule {
                category: entry.category,
                action: entry.action,
                severity_threshold: Severity::new(entry.severity_threshold as u32),
                explanation: entry.explanation,
            });
        }
        PolicyRules::new(rules)
    }
}
