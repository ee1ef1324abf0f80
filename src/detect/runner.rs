//! Detection runner that orchestrates all detectors over all units.

use std::any::Any;
use std::collections::BTreeMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use rayon::prelude::*;
use thiserror::Error;

use crate::analysis::{FactExtractor, KnownApis, SourceUnit};
use crate::config::{Config, ConfigError};
use crate::discover::{self, LoadedUnits};
use crate::flow::FlowResolver;
use crate::report::AnalysisReport;

use super::registry::{builtin_detectors, render_message, Candidate, DetectorSpec, MatchInput};
use super::{Diagnostic, Evidence, Finding, RuleId, Site};

/// Shared flag for stopping a run between units.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// A run that produced no report.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AnalysisError {
    #[error("analysis cancelled")]
    Cancelled,
    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// Findings and diagnostics for a single unit.
#[derive(Debug, Clone, Default)]
pub struct UnitOutcome {
    pub findings: Vec<Finding>,
    pub diagnostics: Vec<Diagnostic>,
}

/// Lifecycle of one detector on one unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DetectorState {
    Idle,
    Matching,
    Reporting,
}

/// Executes the registered detectors against a set of units.
pub struct Runner {
    config: Config,
    apis: KnownApis,
    detectors: Vec<DetectorSpec>,
    cancel: CancellationToken,
}

impl Runner {
    /// Create a runner with the built-in detectors.
    pub fn new(config: Config) -> Self {
        let apis = KnownApis::with_overrides(&config.known_apis);
        Self {
            config,
            apis,
            detectors: builtin_detectors(),
            cancel: CancellationToken::new(),
        }
    }

    /// Replace the detector set.
    pub fn with_detectors(mut self, mut detectors: Vec<DetectorSpec>) -> Self {
        detectors.sort_by(|a, b| a.rule.cmp(&b.rule));
        self.detectors = detectors;
        self
    }

    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn apis(&self) -> &KnownApis {
        &self.apis
    }

    pub fn detectors(&self) -> &[DetectorSpec] {
        &self.detectors
    }

    /// Rules that will run under the current config.
    pub fn enabled_rules(&self) -> Vec<RuleId> {
        self.detectors
            .iter()
            .filter(|d| self.config.is_rule_enabled(&d.rule))
            .map(|d| d.rule.clone())
            .collect()
    }

    /// Run every enabled detector on one unit.
    ///
    /// A detector that fails leaves a diagnostic and contributes nothing;
    /// the others still run.
    pub fn analyze_unit(&self, unit: &SourceUnit) -> UnitOutcome {
        let extracted = catch_unwind(AssertUnwindSafe(|| FactExtractor::new(&self.apis).extract(unit)));
        let facts = match extracted {
            Ok(facts) => facts,
            Err(payload) => {
                let message = format!("fact extraction failed: {}", panic_message(&*payload));
                tracing::warn!(path = unit.path(), "{}", message);
                return UnitOutcome {
                    findings: Vec::new(),
                    diagnostics: vec![Diagnostic::parse_skipped(unit.path(), message)],
                };
            }
        };
        let resolver = FlowResolver::new(unit, &facts, &self.apis, self.config.taint_depth);
        let input = MatchInput {
            unit,
            facts: &facts,
            resolver: &resolver,
            config: &self.config,
        };

        let mut merged: BTreeMap<(RuleId, Site), Finding> = BTreeMap::new();
        let mut diagnostics = Vec::new();
        for detector in &self.detectors {
            if !self.config.is_rule_enabled(&detector.rule) || !detector.applies_to(&facts) {
                continue;
            }
            match self.run_detector(detector, &input) {
                Ok(findings) => {
                    for finding in findings {
                        let key = (finding.rule_id.clone(), finding.site.clone());
                        match merged.get_mut(&key) {
                            Some(existing) => existing.merge_evidence(finding),
                            None => {
                                merged.insert(key, finding);
                            }
                        }
                    }
                }
                Err(message) => {
                    tracing::warn!(
                        path = unit.path(),
                        rule = %detector.rule,
                        "detector degraded: {}",
                        message
                    );
                    diagnostics.push(Diagnostic::detector_fault(
                        unit.path(),
                        detector.rule.clone(),
                        message,
                    ));
                }
            }
        }

        let mut findings: Vec<Finding> = merged.into_values().collect();
        findings.sort();
        tracing::debug!(path = unit.path(), findings = findings.len(), "unit analyzed");
        UnitOutcome {
            findings,
            diagnostics,
        }
    }

    fn run_detector(
        &self,
        detector: &DetectorSpec,
        input: &MatchInput<'_>,
    ) -> Result<Vec<Finding>, String> {
        let mut state = DetectorState::Idle;
        let mut advance = |next: DetectorState| {
            tracing::trace!(rule = %detector.rule, from = ?state, to = ?next, "detector state");
            state = next;
        };

        advance(DetectorState::Matching);
        let matched = catch_unwind(AssertUnwindSafe(|| (detector.predicate)(input)));
        let candidates = match matched {
            Ok(Ok(candidates)) => candidates,
            Ok(Err(e)) => {
                advance(DetectorState::Idle);
                return Err(e.to_string());
            }
            Err(payload) => {
                advance(DetectorState::Idle);
                return Err(format!("panicked: {}", panic_message(&*payload)));
            }
        };

        advance(DetectorState::Reporting);
        let findings = candidates
            .into_iter()
            .map(|c| self.to_finding(detector, input.unit, c))
            .collect();
        advance(DetectorState::Idle);
        Ok(findings)
    }

    fn to_finding(&self, detector: &DetectorSpec, unit: &SourceUnit, candidate: Candidate) -> Finding {
        let site = Site::of(unit, candidate.site);
        let excerpt = unit.line_text(site.line);
        let evidence = candidate
            .evidence
            .iter()
            .map(|&(node, role)| Evidence::new(unit, node, role))
            .collect();
        Finding::new(
            detector.rule.clone(),
            self.config.severity_for(&detector.rule, detector.severity),
            detector.title,
            site,
            render_message(detector.message_template, &candidate.vars),
            excerpt,
            evidence,
        )
    }

    /// Analyze units in parallel and merge the results.
    pub fn run(&self, units: &[SourceUnit]) -> Result<AnalysisReport, AnalysisError> {
        self.run_with(units, Vec::new())
    }

    /// Analyze loaded units, carrying their load diagnostics into the report.
    pub fn run_loaded(&self, loaded: LoadedUnits) -> Result<AnalysisReport, AnalysisError> {
        self.run_with(&loaded.units, loaded.diagnostics)
    }

    /// Discover, load and analyze everything under `root`.
    pub fn scan_path(&self, root: &Path) -> anyhow::Result<AnalysisReport> {
        self.config.validate()?;
        let loaded = discover::load_units(root, &self.config)?;
        Ok(self.run_loaded(loaded)?)
    }

    fn run_with(
        &self,
        units: &[SourceUnit],
        mut diagnostics: Vec<Diagnostic>,
    ) -> Result<AnalysisReport, AnalysisError> {
        self.config.validate()?;
        let outcomes = units
            .par_iter()
            .map(|unit| {
                if self.cancel.is_cancelled() {
                    return Err(AnalysisError::Cancelled);
                }
                Ok(self.analyze_unit(unit))
            })
            .collect::<Result<Vec<_>, _>>()?;
        if self.cancel.is_cancelled() {
            return Err(AnalysisError::Cancelled);
        }

        let mut findings = Vec::new();
        for outcome in outcomes {
            findings.extend(outcome.findings);
            diagnostics.extend(outcome.diagnostics);
        }
        Ok(AnalysisReport::new(
            self.enabled_rules(),
            findings,
            diagnostics,
            units.len(),
        ))
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string())
}

#[cfg(all(test, feature = "tree-sitter"))]
mod tests {
    use super::*;
    use crate::analysis::{FactKind, GoAdapter, SyntaxAdapter};
    use crate::analysis::Pattern;
    use crate::detect::registry::{DetectorError, Predicate};
    use crate::detect::{DiagnosticKind, EvidenceRole, Severity};

    const REFLECT: &str = r#"package main

import "net/http"

func handler(w http.ResponseWriter, r *http.Request) {
	w.Header().Set("Access-Control-Allow-Origin", r.Header.Get("Origin"))
}
"#;

    fn unit(path: &str, source: &str) -> SourceUnit {
        GoAdapter::new().normalize(path, source.as_bytes()).unwrap()
    }

    fn custom(rule: &'static str, predicate: Predicate) -> DetectorSpec {
        DetectorSpec {
            rule: RuleId::from_static(rule),
            severity: Severity::Low,
            title: "custom",
            description: "custom",
            subscribes: &[FactKind::Call],
            predicate,
            message_template: "custom {what}",
        }
    }

    #[test]
    fn test_panicking_detector_is_isolated() {
        let mut detectors = builtin_detectors();
        detectors.push(custom("boom", |_| panic!("exploded")));
        let runner = Runner::new(Config::default()).with_detectors(detectors);
        let outcome = runner.analyze_unit(&unit("a.go", REFLECT));
        assert_eq!(outcome.findings.len(), 1);
        assert_eq!(outcome.findings[0].rule_id, RuleId::REFLECTED_HEADER);
        assert_eq!(outcome.diagnostics.len(), 1);
        assert_eq!(outcome.diagnostics[0].kind, DiagnosticKind::DetectorFault);
        assert_eq!(outcome.diagnostics[0].rule, Some(RuleId::from_static("boom")));
        assert!(outcome.diagnostics[0].message.contains("exploded"));
    }

    #[test]
    fn test_erroring_detector_is_isolated() {
        let runner = Runner::new(Config::default())
            .with_detectors(vec![custom("fails", |_| Err(DetectorError("no".to_string())))]);
        let outcome = runner.analyze_unit(&unit("a.go", REFLECT));
        assert!(outcome.findings.is_empty());
        assert_eq!(outcome.diagnostics[0].message, "no");
    }

    #[test]
    fn test_duplicate_candidates_merge() {
        let runner = Runner::new(Config::default()).with_detectors(vec![custom("twice", |input| {
            let call = input
                .facts
                .calls_matching(|p| matches!(p, Pattern::HeaderSet { .. }))
                .next()
                .ok_or_else(|| DetectorError("no header set".to_string()))?;
            Ok(vec![
                Candidate::new(call.site)
                    .evidence(call.site, EvidenceRole::HeaderSet)
                    .var("what", "one"),
                Candidate::new(call.site)
                    .evidence(call.site, EvidenceRole::HeaderSet)
                    .evidence(call.args[0].node, EvidenceRole::Source),
            ])
        })]);
        let outcome = runner.analyze_unit(&unit("a.go", REFLECT));
        assert_eq!(outcome.findings.len(), 1);
        assert_eq!(outcome.findings[0].evidence.len(), 2);
        assert_eq!(outcome.findings[0].message, "custom one");
        assert_eq!(outcome.findings[0].severity, Severity::Low);
    }

    #[test]
    fn test_severity_override_and_rule_filter() {
        let mut config = Config::default();
        config
            .severity_overrides
            .insert("reflected-header".to_string(), Severity::Critical);
        let outcome = Runner::new(config).analyze_unit(&unit("a.go", REFLECT));
        assert_eq!(outcome.findings[0].severity, Severity::Critical);
        assert_eq!(
            outcome.findings[0].excerpt,
            r#"w.Header().Set("Access-Control-Allow-Origin", r.Header.Get("Origin"))"#
        );

        let config = Config {
            enabled_rules: vec!["wildcard-credentials".to_string()],
            ..Default::default()
        };
        let runner = Runner::new(config);
        assert!(runner.analyze_unit(&unit("a.go", REFLECT)).findings.is_empty());
        assert_eq!(runner.enabled_rules(), vec![RuleId::WILDCARD_CREDENTIALS]);
    }

    #[test]
    fn test_run_merges_and_sorts() {
        let units = vec![unit("b.go", REFLECT), unit("a.go", REFLECT)];
        let report = Runner::new(Config::default()).run(&units).unwrap();
        assert_eq!(report.units_analyzed, 2);
        let paths: Vec<&str> = report.findings.iter().map(|f| f.site.path.as_str()).collect();
        assert_eq!(paths, vec!["a.go", "b.go"]);
        assert_eq!(report.summary[&RuleId::REFLECTED_HEADER], 2);
        assert_eq!(report.summary[&RuleId::UNBOUNDED_BODY_READ], 0);
    }

    #[test]
    fn test_cancelled_run_has_no_report() {
        let token = CancellationToken::new();
        let runner = Runner::new(Config::default()).with_cancellation(token.clone());
        token.cancel();
        assert_eq!(
            runner.run(&[unit("a.go", REFLECT)]).unwrap_err(),
            AnalysisError::Cancelled
        );
        // An empty run is still cancelled.
        assert_eq!(runner.run(&[]).unwrap_err(), AnalysisError::Cancelled);
    }

    #[test]
    fn test_invalid_config_rejected() {
        let config = Config {
            taint_depth: 0,
            ..Default::default()
        };
        assert_eq!(
            Runner::new(config).run(&[]).unwrap_err(),
            AnalysisError::Config(ConfigError::ZeroTaintDepth)
        );
    }
}
