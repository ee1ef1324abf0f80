//! Finding and loading source files under a root directory.

use std::fs;
use std::path::{Path, PathBuf};

use walkdir::WalkDir;

use crate::analysis::{adapter_for_extension, registered_extensions, NormalizeError, SourceUnit};
use crate::config::Config;
use crate::detect::Diagnostic;

/// Units that normalized, plus a diagnostic for every file that did not.
#[derive(Debug, Clone, Default)]
pub struct LoadedUnits {
    pub units: Vec<SourceUnit>,
    pub diagnostics: Vec<Diagnostic>,
}

/// Collect files some front-end handles, in path order.
pub fn collect_candidate_files(root: &Path, config: &Config) -> anyhow::Result<Vec<PathBuf>> {
    let extensions = registered_extensions();
    let mut files = Vec::new();

    let walker = WalkDir::new(root)
        .follow_links(false)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| {
            // The root itself is always entered, whatever its name.
            if e.depth() == 0 || !e.file_type().is_dir() {
                return true;
            }
            let name = e.file_name().to_string_lossy();
            !config.ignore_dirs.iter().any(|d| name == d.as_str())
        });
    for entry in walker {
        let entry = entry?;
        if !entry.file_type().is_file() {
            continue;
        }
        let path = entry.path();
        let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("");
        if !extensions.contains(&ext) {
            continue;
        }
        // Skip test files unless explicitly included
        if !config.include_tests {
            let name = path.file_name().and_then(|n| n.to_str()).unwrap_or("");
            if name.ends_with("_test.go") {
                continue;
            }
        }
        if config.is_path_excluded(&relative_path(root, path)) {
            continue;
        }
        if files.len() >= config.max_files {
            tracing::warn!(limit = config.max_files, "file limit reached, remaining files skipped");
            break;
        }
        files.push(path.to_path_buf());
    }

    Ok(files)
}

/// Read and normalize every candidate file under `root`.
///
/// Per-file failures never abort the load; they become `ParseSkipped`
/// diagnostics.
pub fn load_units(root: &Path, config: &Config) -> anyhow::Result<LoadedUnits> {
    let mut loaded = LoadedUnits::default();
    for path in collect_candidate_files(root, config)? {
        let rel_path = relative_path(root, &path).to_string_lossy().replace('\\', "/");
        match load_unit(&path, &rel_path, config) {
            Ok(unit) => loaded.units.push(unit),
            Err(e) => {
                tracing::warn!(path = %rel_path, "skipping unit: {}", e);
                loaded.diagnostics.push(Diagnostic::parse_skipped(rel_path, e.to_string()));
            }
        }
    }
    tracing::debug!(
        units = loaded.units.len(),
        skipped = loaded.diagnostics.len(),
        "units loaded"
    );
    Ok(loaded)
}

fn load_unit(path: &Path, display: &str, config: &Config) -> Result<SourceUnit, NormalizeError> {
    let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("");
    let adapter = adapter_for_extension(ext).ok_or_else(|| NormalizeError::Unsupported(ext.to_string()))?;

    let size = fs::metadata(path)
        .map_err(|e| NormalizeError::Io(e.to_string()))?
        .len();
    if size > config.max_file_bytes {
        return Err(NormalizeError::TooLarge {
            size,
            limit: config.max_file_bytes,
        });
    }
    let bytes = fs::read(path).map_err(|e| NormalizeError::Io(e.to_string()))?;
    if bytes.contains(&0) {
        return Err(NormalizeError::Binary);
    }
    adapter.normalize(display, &bytes)
}

fn relative_path(root: &Path, path: &Path) -> PathBuf {
    path.strip_prefix(root).unwrap_or(path).to_path_buf()
}
