//! Language-specific front-end implementations.

#[cfg(feature = "tree-sitter")]
mod go;

#[cfg(feature = "tree-sitter")]
pub use go::GoAdapter;

use super::SyntaxAdapter;
#[cfg(feature = "tree-sitter")]
use once_cell::sync::OnceCell;

/// Static storage for the Go front-end.
#[cfg(feature = "tree-sitter")]
static GO_ADAPTER: OnceCell<GoAdapter> = OnceCell::new();

/// Get the front-end for the given file extension (without dot).
///
/// Returns None if no front-end handles the extension.
pub fn adapter_for_extension(ext: &str) -> Option<&'static dyn SyntaxAdapter> {
    match ext {
        #[cfg(feature = "tree-sitter")]
        "go" => Some(GO_ADAPTER.get_or_init(GoAdapter::new) as &'static dyn SyntaxAdapter),
        _ => None,
    }
}

/// Every extension some front-end handles.
pub fn registered_extensions() -> &'static [&'static str] {
    #[cfg(feature = "tree-sitter")]
    {
        GO_ADAPTER.get_or_init(GoAdapter::new).file_extensions()
    }
    #[cfg(not(feature = "tree-sitter"))]
    {
        &[]
    }
}
