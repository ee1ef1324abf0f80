//! Wirecheck - static analysis for unsafe HTTP handling in Go services.
//!
//! Wirecheck parses source files into a small language-independent tree,
//! extracts facts about calls, constructions, definitions and control flow,
//! and runs detectors over those facts:
//!
//! - `wildcard-credentials`: CORS options allowing every origin together
//!   with credentials
//! - `unbounded-body-read`: bodies read to the end with no size limit
//!   applied before the read on every path
//! - `reflected-header`: request header values echoed into
//!   `Access-Control-Allow-Origin` without an allow-list check
//!
//! # Architecture
//!
//! - `analysis`: front-ends, the node model and fact extraction
//! - `flow`: value resolution, dominance and taint queries over facts
//! - `detect`: detectors, findings and the parallel runner
//! - `config`: YAML run configuration
//! - `discover`: file discovery and loading
//! - `report` / `baseline`: run output and accepted findings
//!
//! # Example
//!
//! ```no_run
//! use std::path::Path;
//! use wirecheck::{Config, Runner};
//!
//! let report = Runner::new(Config::default()).scan_path(Path::new("."))?;
//! for finding in &report.findings {
//!     println!("{} {} {}", finding.site, finding.rule_id, finding.message);
//! }
//! # Ok::<(), anyhow::Error>(())
//! ```

pub mod analysis;
pub mod baseline;
pub mod config;
pub mod detect;
pub mod discover;
pub mod flow;
pub mod report;

#[cfg(feature = "tree-sitter")]
pub use analysis::GoAdapter;
pub use analysis::{adapter_for_extension, KnownApis, SourceUnit, SyntaxAdapter, UnitBuilder};
pub use baseline::Baseline;
pub use config::{Config, ConfigError};
pub use detect::{
    AnalysisError, CancellationToken, Diagnostic, DiagnosticKind, Finding, RuleId, Runner,
    Severity,
};
pub use discover::{collect_candidate_files, load_units, LoadedUnits};
pub use flow::FlowResolver;
pub use report::AnalysisReport;
