//! Glob pattern matching utilities for path filtering

use crate::error::ConfigError;
use globset::{Glob, GlobSet, GlobSetBuilder};

/// Compile exclude patterns into a single matcher; a bad pattern is a config error
pub fn compile_patterns(patterns: &[String]) -> Result<GlobSet, ConfigError> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        let glob = Glob::new(pattern).map_err(|e| ConfigError::InvalidValue {
            key: "indexing.exclude_patterns".to_string(),
            reason: format!("invalid glob '{}': {}", pattern, e),
        })?;
        builder.add(glob);
    }
    builder.build().map_err(|e| ConfigError::InvalidValue {
        key: "indexing.exclude_patterns".to_string(),
        reason: e.to_string(),
    })
}

/// Check a repository-relative path against compiled patterns
///
/// Patterns are tried against the whole path and against every suffix that
/// starts at a path component, so `node_modules/**` also excludes
/// `web/node_modules/x.js`.
///
/// # Examples
///
/// ```
/// use delta_indexer::glob_utils::{compile_patterns, matches_any};
///
/// let set = compile_patterns(&["node_modules/**".to_string(), "*.lock".to_string()]).unwrap();
/// assert!(matches_any("web/node_modules/react/index.js", &set));
/// assert!(matches_any("Cargo.lock", &set));
/// assert!(!matches_any("src/main.rs", &set));
/// ```
pub fn matches_any(path: &str, set: &GlobSet) -> bool {
    if set.is_empty() {
        return false;
    }

    let path = path.trim_start_matches('/');
    if set.is_match(path) {
        return true;
    }

    let parts: Vec<&str> = path.split('/').collect();
    (1..parts.len()).any(|i| set.is_match(parts[i..].join("/")))
}
