use std::fmt::{self, Display, Formatter};

use serde::{Deserialize, Deserializer, Serialize};

use crate::Finding;

/// Preliminary action chosen by the policy engine.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum PolicyAction {
    Allow,
    Redact,
    Borderline,
    Block,
}

impl PolicyAction {
    /// Dominance rank: block > borderline > redact > allow.
    pub fn rank(self) -> u8 {
        match self {
            PolicyAction::Allow => 0,
            PolicyAction::Redact => 1,
            PolicyAction::Borderline => 2,
            PolicyAction::Block => 3,
        }
    }

    pub fn dominant(self, other: PolicyAction) -> PolicyAction {
        if other.rank() > self.rank() {
            other
        } else {
            self
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            PolicyAction::Allow => "allow",
            PolicyAction::Redact => "redact",
            PolicyAction::Borderline => "borderline",
            PolicyAction::Block => "block",
        }
    }
}

impl Display for PolicyAction {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Terminal action applied to a message.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    Allow,
    Redact,
    Block,
    RewriteReview,
}

impl Outcome {
    pub fn as_str(self) -> &'static str {
        match self {
            Outcome::Allow => "allow",
            Outcome::Redact => "redact",
            Outcome::Block => "block",
            Outcome::RewriteReview => "rewrite_review",
        }
    }

    pub fn parse(raw: &str) -> Option<Outcome> {
        match raw.trim() {
            "allow" => Some(Outcome::Allow),
            "redact" => Some(Outcome::Redact),
            "block" => Some(Outcome::Block),
            "rewrite_review" => Some(Outcome::RewriteReview),
            _ => None,
        }
    }

    /// Outcome for a non-borderline policy action. `Borderline` has no
    /// terminal meaning on its own and maps to `Block` if it ever reaches here.
    pub fn from_policy(action: PolicyAction) -> Outcome {
        match action {
            PolicyAction::Allow => Outcome::Allow,
            PolicyAction::Redact => Outcome::Redact,
            PolicyAction::Block | PolicyAction::Borderline => Outcome::Block,
        }
    }
}

impl Display for Outcome {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which stage produced the terminal outcome.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Provenance {
    Policy,
    Cache,
    Agent,
    Fallback,
}

impl Provenance {
    pub fn as_str(self) -> &'static str {
        match self {
            Provenance::Policy => "policy",
            Provenance::Cache => "cache",
            Provenance::Agent => "agent",
            Provenance::Fallback => "fallback",
        }
    }
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum DecisionSource {
    CacheHit,
    Agent,
    Fallback,
}

impl From<DecisionSource> for Provenance {
    fn from(source: DecisionSource) -> Self {
        match source {
            DecisionSource::CacheHit => Provenance::Cache,
            DecisionSource::Agent => Provenance::Agent,
            DecisionSource::Fallback => Provenance::Fallback,
        }
    }
}

/// Confidence in `[0.0, 1.0]`. NaN maps to 0.0, infinities to the nearest bound.
#[derive(Clone, Copy, Debug, Serialize, PartialEq, PartialOrd)]
#[serde(transparent)]
pub struct Confidence(f64);

impl Confidence {
    pub const ZERO: Confidence = Confidence(0.0);
    pub const FULL: Confidence = Confidence(1.0);

    pub fn new(value: f64) -> Self {
        if value.is_nan() {
            tracing::warn!("confidence: NaN clamped to 0.0");
            return Self(0.0);
        }
        Self(value.clamp(0.0, 1.0))
    }

    pub fn value(self) -> f64 {
        self.0
    }
}

impl<'de> Deserialize<'de> for Confidence {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        Ok(Confidence::new(f64::deserialize(deserializer)?))
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct GuardDecision {
    pub action: Outcome,
    pub confidence: Confidence,
    pub source: DecisionSource,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub explanation: Option<String>,
}

impl GuardDecision {
    pub fn fallback() -> Self {
        Self {
            action: Outcome::Block,
            confidence: Confidence::ZERO,
            source: DecisionSource::Fallback,
            explanation: None,
        }
    }

    pub fn with_source(mut self, source: DecisionSource) -> Self {
        self.source = source;
        self
    }

    pub fn provenance(&self) -> Provenance {
        self.source.into()
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct PolicyVerdict {
    pub action: PolicyAction,
    pub reason: String,
    /// Active findings that determined `action`, highest severity first.
    pub triggering_findings: Vec<Finding>,
    /// Every active finding whose rule asked for redaction.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub redactions: Vec<Finding>,
}

impl PolicyVerdict {
    pub fn is_borderline(&self) -> bool {
        self.action == PolicyAction::Borderline
    }
}
