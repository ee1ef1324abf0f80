//! Core types for detection results.

use std::borrow::Cow;
use std::cmp::Ordering;
use std::hash::{Hash, Hasher};

use serde::{Deserialize, Serialize};

use crate::analysis::{NodeId, Position, SourceUnit};

/// Longest excerpt kept on a finding, in characters.
pub const MAX_EXCERPT_CHARS: usize = 240;

/// Severity levels for findings, lowest first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    /// Numeric rank, 0 for `info` up to 4 for `critical`.
    pub fn rank(self) -> u8 {
        self as u8
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Severity::Info => "info",
            Severity::Low => "low",
            Severity::Medium => "medium",
            Severity::High => "high",
            Severity::Critical => "critical",
        }
    }
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for Severity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "info" => Ok(Severity::Info),
            "low" => Ok(Severity::Low),
            "medium" => Ok(Severity::Medium),
            "high" => Ok(Severity::High),
            "critical" => Ok(Severity::Critical),
            _ => Err(format!("unknown severity: {}", s)),
        }
    }
}

/// Identifier of a detector, e.g. `wildcard-credentials`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RuleId(Cow<'static, str>);

impl RuleId {
    pub const WILDCARD_CREDENTIALS: RuleId = RuleId(Cow::Borrowed("wildcard-credentials"));
    pub const UNBOUNDED_BODY_READ: RuleId = RuleId(Cow::Borrowed("unbounded-body-read"));
    pub const REFLECTED_HEADER: RuleId = RuleId(Cow::Borrowed("reflected-header"));

    pub const fn from_static(id: &'static str) -> Self {
        RuleId(Cow::Borrowed(id))
    }

    pub fn new(id: impl Into<String>) -> Self {
        RuleId(Cow::Owned(id.into()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for RuleId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Where a finding is reported.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Site {
    /// Unit path, relative and `/`-separated.
    pub path: String,
    pub line: usize,
    pub column: usize,
}

impl Site {
    pub fn of(unit: &SourceUnit, node: NodeId) -> Self {
        let position = unit.span(node).position();
        Self {
            path: unit.path().to_string(),
            line: position.line,
            column: position.column,
        }
    }
}

impl std::fmt::Display for Site {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}:{}", self.path, self.line, self.column)
    }
}

/// What a piece of evidence shows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EvidenceRole {
    /// CORS options construct.
    Construct,
    /// Field allowing every origin.
    WildcardOrigin,
    /// Field enabling credentials.
    Credentials,
    /// Call the options are passed to.
    Constructor,
    /// Body-reading call.
    BodyRead,
    /// The body value read.
    Body,
    /// A size limiter that does not guard the read.
    UnguardedLimiter,
    /// Header set receiving the value.
    HeaderSet,
    /// Variable carrying the value.
    Carrier,
    /// Request-header read the value comes from.
    Source,
}

/// A node supporting a finding.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Evidence {
    pub node: NodeId,
    pub role: EvidenceRole,
    pub position: Position,
}

impl Evidence {
    pub fn new(unit: &SourceUnit, node: NodeId, role: EvidenceRole) -> Self {
        Self {
            node,
            role,
            position: unit.span(node).position(),
        }
    }
}

/// A single detected issue.
///
/// Two findings are equal when they share a rule and a site; everything else
/// is payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Finding {
    /// `{rule_id}:{path}:{line}:{column}`.
    pub id: String,
    pub rule_id: RuleId,
    pub severity: Severity,
    pub title: String,
    pub site: Site,
    pub message: String,
    /// Trimmed source line at the site.
    pub excerpt: String,
    /// Supporting nodes, ordered by position then role.
    pub evidence: Vec<Evidence>,
}

impl Finding {
    pub fn new(
        rule_id: RuleId,
        severity: Severity,
        title: impl Into<String>,
        site: Site,
        message: impl Into<String>,
        excerpt: &str,
        mut evidence: Vec<Evidence>,
    ) -> Self {
        sort_evidence(&mut evidence);
        evidence.dedup();
        Self {
            id: format!("{}:{}", rule_id, site),
            rule_id,
            severity,
            title: title.into(),
            site,
            message: message.into(),
            excerpt: truncate_excerpt(excerpt),
            evidence,
        }
    }

    /// Line-independent identity: blake3 of rule, path and excerpt.
    pub fn fingerprint(&self) -> String {
        let mut hasher = blake3::Hasher::new();
        hasher.update(self.rule_id.as_str().as_bytes());
        hasher.update(b"\n");
        hasher.update(self.site.path.as_bytes());
        hasher.update(b"\n");
        hasher.update(self.excerpt.as_bytes());
        hasher.finalize().to_hex().to_string()
    }

    /// Fold another finding's evidence into this one.
    pub fn merge_evidence(&mut self, other: Finding) {
        for e in other.evidence {
            if !self.evidence.contains(&e) {
                self.evidence.push(e);
            }
        }
        sort_evidence(&mut self.evidence);
    }

    /// Output order: path, line, column, rule.
    pub fn sort_key(&self) -> (&str, usize, usize, &str) {
        (
            &self.site.path,
            self.site.line,
            self.site.column,
            self.rule_id.as_str(),
        )
    }
}

impl PartialEq for Finding {
    fn eq(&self, other: &Self) -> bool {
        self.rule_id == other.rule_id && self.site == other.site
    }
}

impl Eq for Finding {}

impl Hash for Finding {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.rule_id.hash(state);
        self.site.hash(state);
    }
}

impl PartialOrd for Finding {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Finding {
    fn cmp(&self, other: &Self) -> Ordering {
        self.sort_key().cmp(&other.sort_key())
    }
}

fn sort_evidence(evidence: &mut [Evidence]) {
    evidence.sort_by(|a, b| {
        (a.position, a.role, a.node).cmp(&(b.position, b.role, b.node))
    });
}

fn truncate_excerpt(line: &str) -> String {
    let trimmed = line.trim();
    match trimmed.char_indices().nth(MAX_EXCERPT_CHARS) {
        Some((cut, _)) => trimmed[..cut].to_string(),
        None => trimmed.to_string(),
    }
}

/// Why a diagnostic was recorded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiagnosticKind {
    /// The unit could not be normalized and was left out.
    ParseSkipped,
    /// A detector failed on a unit; its results for that unit are missing.
    DetectorFault,
}

/// A non-finding event worth reporting.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Diagnostic {
    pub path: String,
    pub kind: DiagnosticKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rule: Option<RuleId>,
    pub message: String,
}

impl Diagnostic {
    pub fn parse_skipped(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            kind: DiagnosticKind::ParseSkipped,
            rule: None,
            message: message.into(),
        }
    }

    pub fn detector_fault(
        path: impl Into<String>,
        rule: RuleId,
        message: impl Into<String>,
    ) -> Self {
        Self {
            path: path.into(),
            kind: DiagnosticKind::DetectorFault,
            rule: Some(rule),
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn finding(rule: RuleId, line: usize, excerpt: &str) -> Finding {
        Finding::new(
            rule,
            Severity::High,
            "title",
            Site {
                path: "a/main.go".to_string(),
                line,
                column: 2,
            },
            "message",
            excerpt,
            Vec::new(),
        )
    }

    #[test]
    fn test_severity_order_and_parse() {
        assert!(Severity::Info < Severity::Low);
        assert!(Severity::High < Severity::Critical);
        assert_eq!("HIGH".parse::<Severity>().unwrap(), Severity::High);
        assert!("error".parse::<Severity>().is_err());
        assert_eq!(Severity::Medium.to_string(), "medium");
        assert_eq!(Severity::Critical.rank(), 4);
    }

    #[test]
    fn test_finding_identity() {
        let a = finding(RuleId::REFLECTED_HEADER, 7, "w.Header().Set(x)");
        let b = finding(RuleId::REFLECTED_HEADER, 7, "different payload");
        let c = finding(RuleId::WILDCARD_CREDENTIALS, 7, "w.Header().Set(x)");
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(a.id, "reflected-header:a/main.go:7:2");
    }

    #[test]
    fn test_fingerprint_ignores_line() {
        let a = finding(RuleId::UNBOUNDED_BODY_READ, 7, "  io.ReadAll(r.Body)  ");
        let b = finding(RuleId::UNBOUNDED_BODY_READ, 19, "io.ReadAll(r.Body)");
        assert_eq!(a.fingerprint(), b.fingerprint());
        assert_eq!(a.fingerprint().len(), 64);
        let c = finding(RuleId::REFLECTED_HEADER, 7, "io.ReadAll(r.Body)");
        assert_ne!(a.fingerprint(), c.fingerprint());
    }

    #[test]
    fn test_excerpt_truncated() {
        let long = "x".repeat(500);
        let f = finding(RuleId::new("custom"), 1, &long);
        assert_eq!(f.excerpt.chars().count(), MAX_EXCERPT_CHARS);
    }

    #[test]
    fn test_rule_id_serializes_as_string() {
        let json = serde_json::to_string(&RuleId::WILDCARD_CREDENTIALS).unwrap();
        assert_eq!(json, "\"wildcard-credentials\"");
        assert_eq!(RuleId::new("wildcard-credentials"), RuleId::WILDCARD_CREDENTIALS);
    }
}
