use std::sync::Arc;
use std::time::Instant;

use lmguard_core_models::{
    AuditRecord, ChatRequest, ChatResponse, DecisionSource, Finding, FindingSummary, Outcome,
    PolicyVerdict, Provenance, StageLatencies,
};
use lmguard_guard::AgenticGuard;
use lmguard_policy::{PolicyConfigError, PolicyEngine, PolicySnapshot, PolicyStore};
use lmguard_scanners::ScannerSuite;
use time::OffsetDateTime;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::applier::ActionApplier;
use crate::audit::{AuditSink, InMemoryAuditLog, StudentHasher};
use crate::config::DEFAULT_HASH_SALT;
use crate::errors::PipelineError;
use crate::metrics::{
    MetricsSink, NoopMetrics, AGENT_CALLS_TOTAL, AGENT_FAILURES_TOTAL, CACHE_HITS_TOTAL,
    DECISIONS_TOTAL, SCANNER_FAILURES_TOTAL, STAGE_LATENCY_MS,
};
use crate::review::{InMemoryReviewQueue, ReviewQueue, ReviewTicket};

/// Sequences scan, policy, agentic review and application for one request.
///
/// Shared state is limited to the policy store and the guard's semantic
/// cache; everything else is per request.
pub struct GuardPipeline {
    scanners: ScannerSuite,
    policy: Arc<PolicyStore>,
    guard: AgenticGuard,
    applier: ActionApplier,
    reviews: Arc<dyn ReviewQueue>,
    audit: Arc<dyn AuditSink>,
    metrics: Arc<dyn MetricsSink>,
    hasher: StudentHasher,
}

struct Resolution {
    outcome: Outcome,
    provenance: Provenance,
    confidence: Option<f64>,
}

impl GuardPipeline {
    pub fn new(policy: Arc<PolicyStore>, guard: AgenticGuard) -> Self {
        Self {
            scanners: ScannerSuite::standard(),
            policy,
            guard,
            applier: ActionApplier,
            reviews: Arc::new(InMemoryReviewQueue::default()),
            audit: Arc::new(InMemoryAuditLog::default()),
            metrics: Arc::new(NoopMetrics),
            hasher: StudentHasher::new(DEFAULT_HASH_SALT),
        }
    }

    pub fn with_scanners(mut self, scanners: ScannerSuite) -> Self {
        self.scanners = scanners;
        self
    }

    pub fn with_reviews(mut self, reviews: Arc<dyn ReviewQueue>) -> Self {
        self.reviews = reviews;
        self
    }

    pub fn with_audit(mut self, audit: Arc<dyn AuditSink>) -> Self {
        self.audit = audit;
        self
    }

    pub fn with_metrics(mut self, metrics: Arc<dyn MetricsSink>) -> Self {
        self.metrics = metrics;
        self
    }

    pub fn with_hasher(mut self, hasher: StudentHasher) -> Self {
        self.hasher = hasher;
        self
    }

    pub fn guard(&self) -> &AgenticGuard {
        &self.guard
    }

    pub fn policy(&self) -> Arc<PolicySnapshot> {
        self.policy.snapshot()
    }

    pub fn reload_policy(&self) -> Result<Arc<PolicySnapshot>, PolicyConfigError> {
        self.policy.reload()
    }

    /// Only malformed input fails. Every other problem ends in a
    /// conservative outcome.
    pub async fn handle(&self, request: ChatRequest) -> Result<ChatResponse, PipelineError> {
        let started = Instant::now();
        request.validate()?;
        let (message, context) = request.split_latest()?;
        let request_id = Uuid::now_v7();
        let mut latencies = StageLatencies::default();

        let stage = Instant::now();
        let report = self.scanners.scan(message, context);
        latencies.scan_ms = elapsed_ms(stage);
        for scanner in report.failures.iter().copied() {
            self.metrics
                .counter(SCANNER_FAILURES_TOTAL, &[("scanner", scanner)]);
        }

        let stage = Instant::now();
        let snapshot = self.policy.snapshot();
        let verdict = PolicyEngine::evaluate(&report.findings, &snapshot.rules);
        latencies.policy_ms = elapsed_ms(stage);
        debug!(
            %request_id,
            action = %verdict.action,
            policy_version = snapshot.version,
            findings = report.findings.len(),
            "policy verdict"
        );

        let resolution = if verdict.is_borderline() {
            let stage = Instant::now();
            let decision = self.guard.decide(message, context, &verdict).await;
            latencies.agent_ms = elapsed_ms(stage);
            self.record_agent_metrics(decision.source);
            Resolution {
                outcome: decision.action,
                provenance: decision.provenance(),
                confidence: Some(decision.confidence.value()),
            }
        } else {
            Resolution {
                outcome: Outcome::from_policy(verdict.action),
                provenance: Provenance::Policy,
                confidence: None,
            }
        };

        let stage = Instant::now();
        let outcome = carry_over_redactions(resolution.outcome, &verdict);
        let applied = self
            .applier
            .apply(outcome, message, redaction_targets(&verdict));
        latencies.apply_ms = elapsed_ms(stage);

        let hashed_student_id = self.hasher.hash(request.student_id.as_deref());
        if applied.action == Outcome::RewriteReview {
            self.reviews.submit(ReviewTicket::new(
                hashed_student_id.clone(),
                verdict.reason.clone(),
                message.content.clone(),
            ));
        }

        latencies.total_ms = elapsed_ms(started);
        self.record_decision(&applied.action, resolution.provenance, &latencies);
        self.audit.record(&AuditRecord {
            request_id,
            hashed_student_id,
            action: applied.action,
            provenance: resolution.provenance,
            reason: verdict.reason.clone(),
            confidence: resolution.confidence,
            findings: report.findings.iter().map(FindingSummary::from).collect(),
            latencies,
            timestamp: OffsetDateTime::now_utc(),
        });
        info!(
            %request_id,
            action = %applied.action,
            provenance = resolution.provenance.as_str(),
            "request decided"
        );

        Ok(ChatResponse {
            action: applied.action,
            output: applied.output,
            policy_reason: verdict.reason,
            agent_confidence: resolution.confidence,
        })
    }

    fn record_agent_metrics(&self, source: DecisionSource) {
        match source {
            DecisionSource::CacheHit => self.metrics.counter(CACHE_HITS_TOTAL, &[]),
            DecisionSource::Agent => self.metrics.counter(AGENT_CALLS_TOTAL, &[]),
            DecisionSource::Fallback => {
                self.metrics.counter(AGENT_CALLS_TOTAL, &[]);
                self.metrics.counter(AGENT_FAILURES_TOTAL, &[]);
            }
        }
    }

    fn record_decision(&self, action: &Outcome, provenance: Provenance, latencies: &StageLatencies) {
        self.metrics.counter(
            DECISIONS_TOTAL,
            &[("action", action.as_str()), ("provenance", provenance.as_str())],
        );
        for (stage, value) in [
            ("scan", latencies.scan_ms),
            ("policy", latencies.policy_ms),
            ("agent", latencies.agent_ms),
            ("apply", latencies.apply_ms),
            ("total", latencies.total_ms),
        ] {
            self.metrics
                .observe_ms(STAGE_LATENCY_MS, &[("stage", stage)], value);
        }
    }
}

/// An allow must not release content whose rule demanded redaction.
fn carry_over_redactions(outcome: Outcome, verdict: &PolicyVerdict) -> Outcome {
    if outcome == Outcome::Allow && !verdict.redactions.is_empty() {
        warn!("allow over redact findings, escalating to redact");
        return Outcome::Redact;
    }
    outcome
}

fn redaction_targets(verdict: &PolicyVerdict) -> &[Finding] {
    if verdict.redactions.is_empty() {
        &verdict.triggering_findings
    } else {
        &verdict.redactions
    }
}

fn elapsed_ms(since: Instant) -> u64 {
    since.elapsed().as_millis() as u64
}
