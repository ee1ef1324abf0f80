//! The result of an analysis run.
//!
//! Rendering is left to callers; the report serializes to JSON as-is.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::config::Config;
use crate::detect::{Diagnostic, Finding, RuleId, Severity};

/// Findings and diagnostics for a whole run, in stable order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisReport {
    /// Ordered by path, line, column, rule.
    pub findings: Vec<Finding>,
    /// Finding count for every enabled rule, zero counts included.
    pub summary: BTreeMap<RuleId, usize>,
    pub diagnostics: Vec<Diagnostic>,
    pub units_analyzed: usize,
}

impl AnalysisReport {
    /// Build a report, sorting and deduplicating what the units produced.
    pub fn new(
        rules: impl IntoIterator<Item = RuleId>,
        mut findings: Vec<Finding>,
        mut diagnostics: Vec<Diagnostic>,
        units_analyzed: usize,
    ) -> Self {
        findings.sort();
        findings.dedup();
        diagnostics.sort();
        diagnostics.dedup();

        let mut summary: BTreeMap<RuleId, usize> = rules.into_iter().map(|r| (r, 0)).collect();
        for finding in &findings {
            *summary.entry(finding.rule_id.clone()).or_insert(0) += 1;
        }
        Self {
            findings,
            summary,
            diagnostics,
            units_analyzed,
        }
    }

    /// Whether any finding is at or above `threshold`.
    pub fn exceeds(&self, threshold: Severity) -> bool {
        self.findings.iter().any(|f| f.severity >= threshold)
    }

    /// Whether the run should fail under `config.fail_on`. Without a
    /// threshold a run never fails.
    pub fn fails(&self, config: &Config) -> bool {
        config.fail_on.map(|t| self.exceeds(t)).unwrap_or(false)
    }

    /// Drop findings below `min`. Summary counts follow the remaining findings.
    pub fn filter_min_severity(&mut self, min: Severity) {
        self.findings.retain(|f| f.severity >= min);
        self.recount();
    }

    /// Replace the findings, e.g. after applying a baseline.
    pub fn retain_findings(&mut self, keep: impl FnMut(&Finding) -> bool) {
        self.findings.retain(keep);
        self.recount();
    }

    fn recount(&mut self) {
        for count in self.summary.values_mut() {
            *count = 0;
        }
        for finding in &self.findings {
            *self.summary.entry(finding.rule_id.clone()).or_insert(0) += 1;
        }
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detect::Site;

    fn finding(rule: RuleId, severity: Severity, path: &str, line: usize) -> Finding {
        Finding::new(
            rule,
            severity,
            "title",
            Site {
                path: path.to_string(),
                line,
                column: 1,
            },
            "message",
            "excerpt",
            Vec::new(),
        )
    }

    fn rules() -> Vec<RuleId> {
        vec![
            RuleId::REFLECTED_HEADER,
            RuleId::UNBOUNDED_BODY_READ,
            RuleId::WILDCARD_CREDENTIALS,
        ]
    }

    #[test]
    fn test_report_orders_and_counts() {
        let report = AnalysisReport::new(
            rules(),
            vec![
                finding(RuleId::REFLECTED_HEADER, Severity::High, "b.go", 3),
                finding(RuleId::UNBOUNDED_BODY_READ, Severity::Medium, "a.go", 9),
                finding(RuleId::REFLECTED_HEADER, Severity::High, "a.go", 2),
                finding(RuleId::REFLECTED_HEADER, Severity::High, "a.go", 2),
            ],
            vec![
                Diagnostic::parse_skipped("z.go", "syntax error at 1:1"),
                Diagnostic::parse_skipped("c.go", "syntax error at 2:1"),
            ],
            3,
        );
        let order: Vec<(&str, usize)> = report
            .findings
            .iter()
            .map(|f| (f.site.path.as_str(), f.site.line))
            .collect();
        assert_eq!(order, vec![("a.go", 2), ("a.go", 9), ("b.go", 3)]);
        assert_eq!(report.summary[&RuleId::REFLECTED_HEADER], 2);
        assert_eq!(report.summary[&RuleId::WILDCARD_CREDENTIALS], 0);
        assert_eq!(report.diagnostics[0].path, "c.go");
    }

    #[test]
    fn test_exceeds_and_filter() {
        let mut report = AnalysisReport::new(
            rules(),
            vec![
                finding(RuleId::REFLECTED_HEADER, Severity::High, "a.go", 1),
                finding(RuleId::UNBOUNDED_BODY_READ, Severity::Medium, "a.go", 2),
            ],
            Vec::new(),
            1,
        );
        assert!(report.exceeds(Severity::High));
        assert!(!report.exceeds(Severity::Critical));

        let mut config = Config::default();
        assert!(!report.fails(&config));
        config.fail_on = Some(Severity::Critical);
        assert!(!report.fails(&config));
        config.fail_on = Some(Severity::Medium);
        assert!(report.fails(&config));

        report.filter_min_severity(Severity::High);
        assert_eq!(report.findings.len(), 1);
        assert_eq!(report.summary[&RuleId::UNBOUNDED_BODY_READ], 0);
        assert_eq!(report.summary.len(), 3);
    }

    #[test]
    fn test_json_shape() {
        let report = AnalysisReport::new(
            rules(),
            vec![finding(RuleId::WILDCARD_CREDENTIALS, Severity::High, "a.go", 6)],
            Vec::new(),
            1,
        );
        let value: serde_json::Value = serde_json::from_str(&report.to_json().unwrap()).unwrap();
        assert_eq!(value["findings"][0]["rule_id"], "wildcard-credentials");
        assert_eq!(value["findings"][0]["severity"], "high");
        assert_eq!(value["findings"][0]["id"], "wildcard-credentials:a.go:6:1");
        assert_eq!(value["summary"]["wildcard-credentials"], 1);
        assert_eq!(value["units_analyzed"], 1);
    }
}
