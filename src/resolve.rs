use chrono::{DateTime, Local};
use std::path::{Path, PathBuf};

use crate::error::PlanError;
use crate::model::FileSnapshot;
use crate::path::PathDescriptor;

/// A matched input with the stat captured at resolution time.
#[derive(Debug, Clone)]
pub struct ResolvedPath {
    pub descriptor: PathDescriptor,
    pub snapshot: FileSnapshot,
}

/// Outcome of resolving every input pattern.
#[derive(Debug, Default)]
pub struct Resolution {
    pub paths: Vec<ResolvedPath>,
    /// Non-fatal problems: unmatched patterns and entries dropped after matching.
    pub warnings: Vec<String>,
}

/// Expand `patterns` against `cwd` and stat every match.
///
/// Pattern order is preserved and matches within a pattern keep glob order.
/// A malformed pattern aborts; everything else degrades to a warning.
#[tracing::instrument(skip(patterns), fields(patterns = patterns.len()))]
pub fn resolve_patterns(patterns: &[String], cwd: &Path) -> Result<Resolution, PlanError> {
    #[cfg(feature = "parallel")]
    let per_pattern: Vec<Resolution> = {
        use rayon::prelude::*;
        patterns
            .par_iter()
            .map(|pattern| resolve_pattern(pattern, cwd))
            .collect::<Result<_, _>>()?
    };
    #[cfg(not(feature = "parallel"))]
    let per_pattern: Vec<Resolution> = patterns
        .iter()
        .map(|pattern| resolve_pattern(pattern, cwd))
        .collect::<Result<_, _>>()?;

    let mut resolution = Resolution::default();
    for part in per_pattern {
        resolution.paths.extend(part.paths);
        resolution.warnings.extend(part.warnings);
    }
    Ok(resolution)
}

fn anchored_pattern(pattern: &str, cwd: &Path) -> String {
    if Path::new(pattern).is_absolute() {
        pattern.to_string()
    } else {
        let escaped = glob::Pattern::escape(&cwd.to_string_lossy());
        Path::new(&escaped).join(pattern).to_string_lossy().into_owned()
    }
}

fn resolve_pattern(pattern: &str, cwd: &Path) -> Result<Resolution, PlanError> {
    let anchored = anchored_pattern(pattern, cwd);
    let entries = glob::glob(&anchored).map_err(|source| PlanError::Pattern {
        pattern: pattern.to_string(),
        source,
    })?;

    let mut resolution = Resolution::default();
    let mut matches: Vec<PathBuf> = Vec::new();
    for entry in entries {
        match entry {
            Ok(path) => matches.push(path),
            Err(err) => {
                tracing::debug!(%pattern, error = %err, "unreadable glob entry");
                resolution.warnings.push(err.to_string());
            }
        }
    }
    if matches.is_empty() && resolution.warnings.is_empty() {
        tracing::debug!(%pattern, "pattern matched nothing");
        resolution
            .warnings
            .push(format!("{pattern} does not match any existing files"));
        return Ok(resolution);
    }

    #[cfg(feature = "parallel")]
    let stats: Vec<Result<ResolvedPath, String>> = {
        use rayon::prelude::*;
        matches.par_iter().map(|path| stat(path, cwd)).collect()
    };
    #[cfg(not(feature = "parallel"))]
    let stats: Vec<Result<ResolvedPath, String>> = matches.iter().map(|path| stat(path, cwd)).collect();

    for result in stats {
        match result {
            Ok(resolved) => resolution.paths.push(resolved),
            Err(warning) => {
                tracing::debug!(%warning, "dropping matched entry");
                resolution.warnings.push(warning);
            }
        }
    }
    tracing::debug!(%pattern, matched = resolution.paths.len(), "pattern resolved");
    Ok(resolution)
}

fn stat(path: &Path, cwd: &Path) -> Result<ResolvedPath, String> {
    let metadata = std::fs::metadata(path).map_err(|e| format!("{}: {e}", path.display()))?;
    let modified = metadata
        .modified()
        .map_err(|e| format!("{}: {e}", path.display()))?;
    let descriptor = PathDescriptor::new(path, cwd).map_err(|e| format!("{}: {e}", path.display()))?;
    Ok(ResolvedPath {
        descriptor,
        snapshot: FileSnapshot {
            size: metadata.len(),
            modified: DateTime::<Local>::from(modified),
            is_dir: metadata.is_dir(),
        },
    })
}
