use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::{Category, Finding, Outcome, Provenance, Severity};

/// Category and severity of a finding, without span or detail.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct FindingSummary {
    pub category: Category,
    pub severity: Severity,
}

impl From<&Finding> for FindingSummary {
    fn from(finding: &Finding) -> Self {
        Self {
            category: finding.category,
            severity: finding.severity,
        }
    }
}

#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct StageLatencies {
    pub scan_ms: u64,
    pub policy_ms: u64,
    pub agent_ms: u64,
    pub apply_ms: u64,
    pub total_ms: u64,
}

/// One record per completed request. Carries the hashed student id and the
/// decision summary only: no message content, no raw identifiers.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct AuditRecord {
    pub request_id: Uuid,
    pub hashed_student_id: String,
    pub action: Outcome,
    pub provenance: Provenance,
    pub reason: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f64>,
    #[serde(default)]
    pub findings: Vec<FindingSummary>,
    #[serde(default)]
    pub latencies: StageLatencies,
    #[serde(with = "time::serde::rfc3339")]
    pub timestamp: OffsetDateTime,
}
