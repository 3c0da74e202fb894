use std::io::Write;

use lmguard_core_models::{Category, Finding, PolicyAction, Severity};
use lmguard_policy::{
    PolicyConfigError, PolicyEngine, PolicyRule, PolicyRules, PolicySnapshot, PolicyStore,
    NO_FINDINGS_REASON,
};

fn standard_rules() -> PolicyRules {
    PolicyRules::new([
        PolicyRule::new(Category::Pii, PolicyAction::Redact, 50),
        PolicyRule::new(Category::Injection, PolicyAction::Block, 90),
        PolicyRule::new(Category::AcademicDishonesty, PolicyAction::Borderline, 70),
        PolicyRule::new(Category::Toxicity, PolicyAction::Block, 60),
    ])
    .unwrap()
}

fn finding(category: Category, severity: u32) -> Finding {
    Finding::new(category, Severity::new(severity), "test")
}

#[test]
fn no_findings_allows() {
    let verdict = PolicyEngine::evaluate(&[], &standard_rules());
    assert_eq!(verdict.action, PolicyAction::Allow);
    assert_eq!(verdict.reason, NO_FINDINGS_REASON);
    assert!(verdict.triggering_findings.is_empty());
}

#[test]
fn below_threshold_findings_are_ignored() {
    let findings = vec![
        finding(Category::Injection, 75),
        finding(Category::Toxicity, 30),
    ];
    let verdict = PolicyEngine::evaluate(&findings, &standard_rules());
    assert_eq!(verdict.action, PolicyAction::Allow);
    assert_eq!(verdict.reason, NO_FINDINGS_REASON);
}

#[test]
fn threshold_is_inclusive() {
    let verdict = PolicyEngine::evaluate(
        &[finding(Category::AcademicDishonesty, 70)],
        &standard_rules(),
    );
    assert_eq!(verdict.action, PolicyAction::Borderline);
    assert_eq!(verdict.reason, "academic_dishonesty(70)");

    let verdict = PolicyEngine::evaluate(
        &[finding(Category::AcademicDishonesty, 69)],
        &standard_rules(),
    );
    assert_eq!(verdict.action, PolicyAction::Allow);
}

#[test]
fn block_dominates_everything_else() {
    let findings = vec![
        finding(Category::Pii, 80).with_span(0, 4),
        finding(Category::AcademicDishonesty, 90),
        finding(Category::Injection, 95).with_span(5, 10),
    ];
    let verdict = PolicyEngine::evaluate(&findings, &standard_rules());
    assert_eq!(verdict.action, PolicyAction::Block);
    assert_eq!(verdict.reason, "injection(95)");
    assert_eq!(verdict.triggering_findings.len(), 1);
    assert_eq!(verdict.redactions.len(), 1);
    assert_eq!(verdict.redactions[0].category, Category::Pii);
}

#[test]
fn borderline_dominates_redact_and_records_redactions() {
    let findings = vec![
        finding(Category::Pii, 80).with_span(0, 4),
        finding(Category::AcademicDishonesty, 70),
    ];
    let verdict = PolicyEngine::evaluate(&findings, &standard_rules());
    assert_eq!(verdict.action, PolicyAction::Borderline);
    assert_eq!(verdict.redactions.len(), 1);
}

#[test]
fn missing_category_blocks_at_any_severity() {
    let rules = PolicyRules::new([PolicyRule::new(Category::Pii, PolicyAction::Redact, 50)]).unwrap();
    let verdict = PolicyEngine::evaluate(&[finding(Category::Toxicity, 1)], &rules);
    assert_eq!(verdict.action, PolicyAction::Block);
    assert_eq!(verdict.reason, "toxicity(1) [no rule]");

    let verdict = PolicyEngine::evaluate(&[finding(Category::Injection, 0)], &PolicyRules::default());
    assert_eq!(verdict.action, PolicyAction::Block);
}

#[test]
fn reason_is_ordered_by_descending_severity_then_key() {
    let findings = vec![
        finding(Category::Toxicity, 60),
        finding(Category::Injection, 95).with_span(10, 20),
        finding(Category::Injection, 95).with_span(0, 5),
        finding(Category::Toxicity, 90).with_span(3, 4),
    ];
    let verdict = PolicyEngine::evaluate(&findings, &standard_rules());
    assert_eq!(
        verdict.reason,
        "injection(95), injection(95), toxicity(90), toxicity(60)"
    );
    assert_eq!(verdict.triggering_findings[0].span.unwrap().start, 0);
    assert_eq!(verdict.triggering_findings[1].span.unwrap().start, 10);
}

#[test]
fn evaluation_is_deterministic_regardless_of_input_order() {
    let mut findings = vec![
        finding(Category::Pii, 80).with_span(0, 4),
        finding(Category::Pii, 90).with_span(8, 12),
        finding(Category::Toxicity, 10),
    ];
    let rules = standard_rules();
    let first = PolicyEngine::evaluate(&findings, &rules);
    assert_eq!(first, PolicyEngine::evaluate(&findings, &rules));
    findings.reverse();
    assert_eq!(first, PolicyEngine::evaluate(&findings, &rules));
    assert_eq!(first.reason, "pii(90), pii(80)");
}

fn write_policy(file: &mut tempfile::NamedTempFile, body: &str) {
    file.as_file_mut().set_len(0).unwrap();
    let mut handle = file.reopen().unwrap();
    handle.write_all(body.as_bytes()).unwrap();
    handle.flush().unwrap();
}

const V1: &str = r#"{"version": 1, "rules": [
    {"category": "pii", "action": "redact", "severity_threshold": 50}
]}"#;

const V2: &str = r#"{"version": 2, "rules": [
    {"category": "pii", "action": "block", "severity_threshold": 50}
]}"#;

#[test]
fn reload_swaps_the_snapshot_atomically() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    write_policy(&mut file, V1);
    let store = PolicyStore::from_file(file.path()).unwrap();
    let held = store.snapshot();
    assert_eq!(held.version, 1);

    write_policy(&mut file, V2);
    let fresh = store.reload().unwrap();
    assert_eq!(fresh.version, 2);
    assert_eq!(store.snapshot().version, 2);
    assert_ne!(held.digest, fresh.digest);
    // A request that already took a snapshot keeps evaluating against it.
    assert_eq!(
        held.rules.get(Category::Pii).unwrap().action,
        PolicyAction::Redact
    );
}

#[test]
fn failed_reload_keeps_previous_snapshot() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    write_policy(&mut file, V1);
    let store = PolicyStore::from_file(file.path()).unwrap();

    write_policy(&mut file, "{ not json");
    assert!(matches!(store.reload(), Err(PolicyConfigError::Parse(_))));
    assert_eq!(store.snapshot().version, 1);

    write_policy(
        &mut file,
        r#"{"version": 3, "rules": [
            {"category": "pii", "action": "redact", "severity_threshold": 50},
            {"category": "pii", "action": "block", "severity_threshold": 50}
        ]}"#,
    );
    assert!(matches!(
        store.reload(),
        Err(PolicyConfigError::DuplicateCategory(Category::Pii))
    ));
    assert_eq!(store.snapshot().version, 1);
}

#[test]
fn missing_file_refuses_to_start() {
    let dir = tempfile::tempdir().unwrap();
    let err = PolicyStore::from_file(dir.path().join("absent.json")).err().unwrap();
    assert!(matches!(err, PolicyConfigError::Io { .. }));
}

#[test]
fn in_memory_store_cannot_reload() {
    let store = PolicyStore::new(PolicySnapshot::new(1, standard_rules()).unwrap());
    assert!(matches!(store.reload(), Err(PolicyConfigError::NoSource)));
}

#[test]
fn shipped_policy_file_is_valid() {
    let path = std::path::Path::new(env!("CARGO_MANIFEST_DIR")).join("../config/policy.json");
    let store = PolicyStore::from_file(path).unwrap();
    assert_eq!(store.snapshot().rules.len(), 4);
}
