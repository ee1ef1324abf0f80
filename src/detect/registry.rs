//! Detector descriptors and the built-in set.

use std::collections::BTreeMap;

use thiserror::Error;

use crate::analysis::{FactKind, NodeId, SourceUnit, UnitFacts};
use crate::config::Config;
use crate::flow::FlowResolver;

use super::{body_read, reflected_header, wildcard_credentials, EvidenceRole, RuleId, Severity};

/// A detector gave up on a unit.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{0}")]
pub struct DetectorError(pub String);

/// Everything a predicate may look at for one unit.
pub struct MatchInput<'a> {
    pub unit: &'a SourceUnit,
    pub facts: &'a UnitFacts,
    pub resolver: &'a FlowResolver<'a>,
    pub config: &'a Config,
}

/// One match produced by a predicate, before it becomes a finding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate {
    pub site: NodeId,
    pub evidence: Vec<(NodeId, EvidenceRole)>,
    /// Values for the message template's `{placeholders}`.
    pub vars: BTreeMap<&'static str, String>,
}

impl Candidate {
    pub fn new(site: NodeId) -> Self {
        Self {
            site,
            evidence: Vec::new(),
            vars: BTreeMap::new(),
        }
    }

    pub fn evidence(mut self, node: NodeId, role: EvidenceRole) -> Self {
        self.evidence.push((node, role));
        self
    }

    pub fn var(mut self, name: &'static str, value: impl Into<String>) -> Self {
        self.vars.insert(name, value.into());
        self
    }
}

/// Pure matching function of a detector.
pub type Predicate = fn(&MatchInput<'_>) -> Result<Vec<Candidate>, DetectorError>;

/// A registered detector.
#[derive(Clone)]
pub struct DetectorSpec {
    pub rule: RuleId,
    pub severity: Severity,
    pub title: &'static str,
    pub description: &'static str,
    /// Fact kinds the predicate reads; a unit with none of them is skipped.
    pub subscribes: &'static [FactKind],
    pub predicate: Predicate,
    /// Message with `{name}` placeholders filled from [`Candidate::vars`].
    pub message_template: &'static str,
}

impl std::fmt::Debug for DetectorSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DetectorSpec")
            .field("rule", &self.rule)
            .field("severity", &self.severity)
            .field("subscribes", &self.subscribes)
            .finish()
    }
}

impl DetectorSpec {
    /// Whether the unit has any fact this detector reads.
    pub fn applies_to(&self, facts: &UnitFacts) -> bool {
        self.subscribes.is_empty() || self.subscribes.iter().any(|k| facts.has(*k))
    }
}

/// The built-in detectors, in rule-id order.
pub fn builtin_detectors() -> Vec<DetectorSpec> {
    let mut detectors = vec![
        wildcard_credentials::detector(),
        body_read::detector(),
        reflected_header::detector(),
    ];
    detectors.sort_by(|a, b| a.rule.cmp(&b.rule));
    detectors
}

/// Fill `{name}` placeholders. Unknown placeholders are left as written.
pub fn render_message(template: &str, vars: &BTreeMap<&'static str, String>) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(start) = rest.find('{') {
        out.push_str(&rest[..start]);
        let after = &rest[start + 1..];
        match after.find('}') {
            Some(end) => {
                let name = &after[..end];
                match vars.get(name) {
                    Some(value) => out.push_str(value),
                    None => {
                        out.push('{');
                        out.push_str(name);
                        out.push('}');
                    }
                }
                rest = &after[end + 1..];
            }
            None => {
                out.push_str(&rest[start..]);
                rest = "";
            }
        }
    }
    out.push_str(rest);
    out
}
