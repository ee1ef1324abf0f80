//! Core traits for syntax front-ends.

use thiserror::Error;

use super::SourceUnit;

/// Why a file could not be turned into a [`SourceUnit`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NormalizeError {
    #[error("source is not valid UTF-8")]
    InvalidUtf8,
    #[error("syntax error at {line}:{column}")]
    Syntax { line: usize, column: usize },
    #[error("parser failure: {0}")]
    Parser(String),
    #[error("malformed syntax tree: {0}")]
    MalformedTree(String),
    #[error("no front-end for {0:?}")]
    Unsupported(String),
    #[error("file is {size} bytes, limit is {limit}")]
    TooLarge { size: u64, limit: u64 },
    #[error("file looks binary")]
    Binary,
    #[error("read failed: {0}")]
    Io(String),
}

/// Language-specific front-end.
///
/// A front-end parses one file and lowers it into the normalized node model.
/// Implementations must be pure: the same bytes always produce the same unit.
///
/// # Thread Safety
///
/// Note: tree_sitter::Parser is not Sync, so implementations should
/// create parsers as needed.
pub trait SyntaxAdapter: Send + Sync {
    /// Returns the language identifier (e.g., "go").
    fn language_id(&self) -> &'static str;

    /// Returns file extensions this front-end handles (without dot).
    fn file_extensions(&self) -> &'static [&'static str];

    /// Parse and normalize a file. `path` is stored on the unit verbatim.
    fn normalize(&self, path: &str, source: &[u8]) -> Result<SourceUnit, NormalizeError>;

    /// Check if this front-end handles the given file extension.
    fn handles_extension(&self, ext: &str) -> bool {
        self.file_extensions().contains(&ext)
    }
}
