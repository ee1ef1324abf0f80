//! Integration tests for the full detection pipeline.
//!
//! These tests run the built-in detectors against the testdata fixtures and
//! check the exact findings each one produces.
#![cfg(feature = "tree-sitter")]

use std::path::PathBuf;

use wirecheck::detect::EvidenceRole;
use wirecheck::{AnalysisReport, Baseline, Config, RuleId, Runner, Severity};

fn testdata_path() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("testdata")
}

fn scan() -> AnalysisReport {
    Runner::new(Config::default())
        .scan_path(&testdata_path())
        .expect("scan should succeed")
}

/// Rule ids reported for one fixture, in report order.
fn rules_for(report: &AnalysisReport, file: &str) -> Vec<RuleId> {
    report
        .findings
        .iter()
        .filter(|f| f.site.path == file)
        .map(|f| f.rule_id.clone())
        .collect()
}

#[test]
fn test_all_fixtures_load() {
    let report = scan();
    assert_eq!(report.units_analyzed, 6);
    assert!(report.diagnostics.is_empty(), "{:?}", report.diagnostics);
}

#[test]
fn test_cors_wildcard_credentials_fixture() {
    let report = scan();
    assert_eq!(
        rules_for(&report, "go-cors-wildcard-credentials.go"),
        vec![RuleId::WILDCARD_CREDENTIALS]
    );
    let finding = report
        .findings
        .iter()
        .find(|f| f.site.path == "go-cors-wildcard-credentials.go")
        .unwrap();
    assert_eq!((finding.site.line, finding.site.column), (6, 15));
    assert_eq!(finding.severity, Severity::High);
    assert_eq!(finding.excerpt, "_ = cors.New(cors.Options{");
}

#[test]
fn test_readall_with_max_bytes_fixture() {
    let report = scan();
    assert!(rules_for(&report, "go-readall-body-maxbytes.go").is_empty());
}

#[test]
fn test_readall_in_round_trip_fixture() {
    let report = scan();
    assert_eq!(
        rules_for(&report, "go-readall-body-roundtrip.go"),
        vec![RuleId::UNBOUNDED_BODY_READ]
    );
    let finding = report
        .findings
        .iter()
        .find(|f| f.site.path == "go-readall-body-roundtrip.go")
        .unwrap();
    assert_eq!(finding.site.line, 11);
    assert_eq!(finding.severity, Severity::Medium);
}

#[test]
fn test_reflected_origin_fixture() {
    let report = scan();
    assert_eq!(
        rules_for(&report, "go-reflect-cors.go"),
        vec![RuleId::REFLECTED_HEADER]
    );
    let finding = report
        .findings
        .iter()
        .find(|f| f.site.path == "go-reflect-cors.go")
        .unwrap();
    assert_eq!(finding.site.line, 7);
    assert!(finding
        .evidence
        .iter()
        .any(|e| e.role == EvidenceRole::Source && e.position.line == 7));
}

#[test]
fn test_allow_listed_reflection_fixture() {
    let report = scan();
    assert!(rules_for(&report, "go-reflect-cors-allowlist.go").is_empty());
}

#[test]
fn test_conditional_limit_fixture() {
    let report = scan();
    assert_eq!(
        rules_for(&report, "go-readall-body-conditional-limit.go"),
        vec![RuleId::UNBOUNDED_BODY_READ]
    );
}

#[test]
fn test_summary_counts() {
    let report = scan();
    assert_eq!(report.summary[&RuleId::WILDCARD_CREDENTIALS], 1);
    assert_eq!(report.summary[&RuleId::UNBOUNDED_BODY_READ], 2);
    assert_eq!(report.summary[&RuleId::REFLECTED_HEADER], 1);
    assert!(report.exceeds(Severity::High));
}

#[test]
fn test_runs_are_byte_identical() {
    let first = serde_json::to_string(&scan().findings).unwrap();
    let second = serde_json::to_string(&scan().findings).unwrap();
    assert_eq!(first, second);
}

#[test]
fn test_baseline_suppresses_known_findings() {
    let report = scan();
    let baseline = Baseline::from_findings(&report.findings);
    assert!(baseline.apply(report.findings.clone()).is_empty());
}
