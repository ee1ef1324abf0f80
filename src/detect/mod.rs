//! Detection rules that consume extracted facts.
//!
//! Each detector is a [`DetectorSpec`]: the fact kinds it reads, a pure
//! predicate over a unit's facts and flow queries, and a message template.
//! The [`Runner`] drives every enabled detector over every unit and merges
//! the results into an ordered report.

mod body_read;
mod reflected_header;
mod registry;
mod runner;
mod types;
mod wildcard_credentials;

pub use registry::{
    builtin_detectors, render_message, Candidate, DetectorError, DetectorSpec, MatchInput,
    Predicate,
};
pub use runner::{AnalysisError, CancellationToken, Runner, UnitOutcome};
pub use types::{
    Diagnostic, DiagnosticKind, Evidence, EvidenceRole, Finding, RuleId, Severity, Site,
    MAX_EXCERPT_CHARS,
};
