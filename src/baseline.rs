//! Accepted findings, matched by fingerprint.
//!
//! A baseline records findings a project has chosen to live with. Matching
//! uses [`Finding::fingerprint`], which ignores line numbers, so unrelated
//! edits above a finding do not resurface it. Reading and writing the
//! baseline file is up to the caller.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::detect::{Finding, RuleId};

pub const BASELINE_VERSION: u32 = 1;

/// Human-readable record of a baselined finding.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct BaselineEntry {
    pub fingerprint: String,
    pub rule_id: RuleId,
    pub path: String,
    pub excerpt: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Baseline {
    pub version: u32,
    /// Sorted and deduplicated.
    pub fingerprints: Vec<String>,
    #[serde(default)]
    pub entries: Vec<BaselineEntry>,
}

impl Default for Baseline {
    fn default() -> Self {
        Self {
            version: BASELINE_VERSION,
            fingerprints: Vec::new(),
            entries: Vec::new(),
        }
    }
}

impl Baseline {
    pub fn from_findings<'a>(findings: impl IntoIterator<Item = &'a Finding>) -> Self {
        let entries: BTreeSet<BaselineEntry> = findings
            .into_iter()
            .map(|f| BaselineEntry {
                fingerprint: f.fingerprint(),
                rule_id: f.rule_id.clone(),
                path: f.site.path.clone(),
                excerpt: f.excerpt.clone(),
            })
            .collect();
        let fingerprints: BTreeSet<String> = entries.iter().map(|e| e.fingerprint.clone()).collect();
        Self {
            version: BASELINE_VERSION,
            fingerprints: fingerprints.into_iter().collect(),
            entries: entries.into_iter().collect(),
        }
    }

    pub fn contains(&self, finding: &Finding) -> bool {
        self.fingerprints
            .binary_search(&finding.fingerprint())
            .is_ok()
    }

    /// Drop findings already in the baseline.
    pub fn apply(&self, findings: Vec<Finding>) -> Vec<Finding> {
        findings.into_iter().filter(|f| !self.contains(f)).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.fingerprints.is_empty()
    }

    pub fn len(&self) -> usize {
        self.fingerprints.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detect::{Severity, Site};

    fn finding(rule: RuleId, path: &str, line: usize, excerpt: &str) -> Finding {
        Finding::new(
            rule,
            Severity::Medium,
            "title",
            Site {
                path: path.to_string(),
                line,
                column: 2,
            },
            "message",
            excerpt,
            Vec::new(),
        )
    }

    #[test]
    fn test_apply_survives_line_moves() {
        let old = vec![
            finding(RuleId::UNBOUNDED_BODY_READ, "a.go", 10, "io.ReadAll(r.Body)"),
            finding(RuleId::UNBOUNDED_BODY_READ, "a.go", 20, "io.ReadAll(r.Body)"),
        ];
        let baseline = Baseline::from_findings(&old);
        // Same rule, path and excerpt collapse into one fingerprint.
        assert_eq!(baseline.len(), 1);

        let current = vec![
            finding(RuleId::UNBOUNDED_BODY_READ, "a.go", 14, "io.ReadAll(r.Body)"),
            finding(RuleId::UNBOUNDED_BODY_READ, "b.go", 14, "io.ReadAll(r.Body)"),
        ];
        let remaining = baseline.apply(current);
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].site.path, "b.go");
    }

    #[test]
    fn test_fingerprints_sorted_and_serialized() {
        let findings = vec![
            finding(RuleId::REFLECTED_HEADER, "z.go", 1, "w.Header().Set(a, b)"),
            finding(RuleId::WILDCARD_CREDENTIALS, "a.go", 1, "cors.New(opts)"),
        ];
        let baseline = Baseline::from_findings(&findings);
        let mut sorted = baseline.fingerprints.clone();
        sorted.sort();
        assert_eq!(baseline.fingerprints, sorted);
        assert_eq!(baseline.entries.len(), 2);

        let json = serde_json::to_string(&baseline).unwrap();
        let back: Baseline = serde_json::from_str(&json).unwrap();
        assert_eq!(back, baseline);
        assert!(findings.iter().all(|f| back.contains(f)));
    }

    #[test]
    fn test_empty_baseline_keeps_everything() {
        let baseline = Baseline::default();
        assert!(baseline.is_empty());
        let kept = baseline.apply(vec![finding(RuleId::REFLECTED_HEADER, "a.go", 1, "x")]);
        assert_eq!(kept.len(), 1);
    }
}
