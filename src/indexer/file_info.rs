//! Working-tree file loading for indexing

use crate::error::{IndexerError, Result};
use std::fs;
use std::path::{Path, PathBuf};

/// A text file read from the working tree, ready for chunking
#[derive(Debug, Clone)]
pub struct FileInfo {
    pub path: PathBuf,
    pub relative_path: String,
    pub content: String,
}

/// Why a file was left out of the index
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    Missing,
    TooLarge { size: u64, max: usize },
    Binary,
    NotUtf8,
}

impl std::fmt::Display for SkipReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SkipReason::Missing => write!(f, "file no longer exists"),
            SkipReason::TooLarge { size, max } => {
                write!(f, "file size exceeds maximum: {} > {}", size, max)
            }
            SkipReason::Binary => write!(f, "file is binary"),
            SkipReason::NotUtf8 => write!(f, "file is not valid UTF-8"),
        }
    }
}

/// Outcome of loading one file
#[derive(Debug, Clone)]
pub enum FileLoad {
    Loaded(FileInfo),
    Skipped(SkipReason),
}

impl FileInfo {
    /// Read `relative_path` under `root`, skipping files that should not be indexed
    pub fn load(root: &Path, relative_path: &str, max_file_size: usize) -> Result<FileLoad> {
        let path = root.join(relative_path);

        let metadata = match fs::metadata(&path) {
            Ok(metadata) => metadata,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Ok(FileLoad::Skipped(SkipReason::Missing));
            }
            Err(e) => return Err(IndexerError::Io(e)),
        };

        if metadata.len() > max_file_size as u64 {
            return Ok(FileLoad::Skipped(SkipReason::TooLarge {
                size: metadata.len(),
                max: max_file_size,
            }));
        }

        let bytes = fs::read(&path)?;
        if !is_text(&bytes) {
            return Ok(FileLoad::Skipped(SkipReason::Binary));
        }

        let content = match String::from_utf8(bytes) {
            Ok(content) => content,
            Err(_) => return Ok(FileLoad::Skipped(SkipReason::NotUtf8)),
        };

        Ok(FileLoad::Loaded(FileInfo {
            path,
            relative_path: relative_path.to_string(),
            content,
        }))
    }
}

/// Simple heuristic: NUL bytes or more than 30% control bytes means binary
pub fn is_text(content: &[u8]) -> bool {
    if content.is_empty() {
        return true;
    }
    if content.contains(&0) {
        return false;
    }

    let non_printable = content
        .iter()
        .filter(|&&b| b < 0x20 && b != b'\n' && b != b'\r' && b != b'\t')
        .count();

    (non_printable as f64 / content.len() as f64) < 0.3
}
