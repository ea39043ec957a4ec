use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

/// A line-bounded slice of a file, the unit of indexing and search
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CodeChunk {
    /// Stable UUIDv5 derived from the organization and a branch-salted chunk hash
    pub id: String,
    pub organization_id: String,
    pub project_id: String,
    /// Path relative to the repository root
    pub file_path: String,
    pub content: String,
    /// First line of the chunk (1-based, inclusive)
    pub start_line: usize,
    /// Last line of the chunk (1-based, inclusive)
    pub end_line: usize,
    pub chunk_hash: String,
    pub git_branch: String,
    pub is_base_branch: bool,
    /// Git blob hash of the file the chunk was cut from
    pub file_hash: String,
}

/// What goes into a chunk hash
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ChunkHashMode {
    /// Path, line range, content length and content
    #[default]
    Content,
    /// Path and line range only, for servers holding manifests built that way
    Location,
}

/// Size and overlap limits for line-based chunking
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkerConfig {
    /// Advisory ceiling on characters per chunk
    #[serde(default = "default_max_chunk_chars")]
    pub max_chunk_chars: usize,
    /// Hard floor on characters per chunk
    #[serde(default = "default_min_chunk_chars")]
    pub min_chunk_chars: usize,
    /// Lines repeated at the start of the following chunk
    #[serde(default = "default_overlap_lines")]
    pub overlap_lines: usize,
    #[serde(default)]
    pub hash_mode: ChunkHashMode,
}

fn default_max_chunk_chars() -> usize {
    1000
}

fn default_min_chunk_chars() -> usize {
    50
}

fn default_overlap_lines() -> usize {
    2
}

impl Default for ChunkerConfig {
    fn default() -> Self {
        Self {
            max_chunk_chars: default_max_chunk_chars(),
            min_chunk_chars: default_min_chunk_chars(),
            overlap_lines: default_overlap_lines(),
            hash_mode: ChunkHashMode::default(),
        }
    }
}

/// One line of `git ls-files -s`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LsFilesEntry {
    pub mode: String,
    pub hash: String,
    pub stage: String,
    pub path: String,
}

/// Paths that differ between the current branch and the base branch
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GitDiff {
    pub added: Vec<String>,
    pub modified: Vec<String>,
    pub deleted: Vec<String>,
}

impl GitDiff {
    /// Added and modified paths, deduplicated and sorted
    pub fn changed_paths(&self) -> Vec<String> {
        let mut paths: Vec<String> = self
            .added
            .iter()
            .chain(self.modified.iter())
            .cloned()
            .collect();
        paths.sort();
        paths.dedup();
        paths
    }

    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.modified.is_empty() && self.deleted.is_empty()
    }
}

/// A file the scanner decided needs indexing
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScannedFile {
    pub file_path: String,
    pub file_hash: String,
    pub branch: String,
}

/// Everything one scan produced
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScanOutcome {
    pub branch: Option<String>,
    pub base_branch: Option<String>,
    pub is_base_branch: bool,
    pub is_detached: bool,
    pub files: Vec<ScannedFile>,
    /// Paths removed relative to the base branch; reported, never chunked
    pub deleted: Vec<String>,
}

impl ScanOutcome {
    pub fn detached() -> Self {
        Self {
            is_detached: true,
            ..Self::default()
        }
    }
}

/// Server-side record of one indexed file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ManifestFileEntry {
    pub file_path: String,
    pub file_hash: String,
    #[serde(default)]
    pub chunk_hashes: Vec<String>,
    #[serde(default)]
    pub indexed_at: Option<DateTime<Utc>>,
}

/// Server's per-branch record of indexed files; read-only on the client
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerManifest {
    pub organization_id: String,
    pub project_id: String,
    pub git_branch: String,
    #[serde(default)]
    pub files: Vec<ManifestFileEntry>,
}

impl ServerManifest {
    /// True when the server already holds this exact file revision
    pub fn has_file_hash(&self, file_path: &str, file_hash: &str) -> bool {
        self.files
            .iter()
            .any(|f| f.file_path == file_path && f.file_hash == file_hash)
    }

    pub fn total_chunks(&self) -> usize {
        self.files.iter().map(|f| f.chunk_hashes.len()).sum()
    }
}

/// Branch-preferenced search request sent to the server
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchRequest {
    pub query: String,
    pub organization_id: String,
    pub project_id: String,
    pub prefer_branch: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fallback_branch: Option<String>,
    #[serde(default)]
    pub exclude_files: Vec<String>,
    pub limit: usize,
}

/// A single search hit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchResult {
    pub file_path: String,
    pub content: String,
    pub start_line: usize,
    pub end_line: usize,
    pub score: f32,
    #[serde(default)]
    pub git_branch: Option<String>,
    /// Whether the hit came from the preferred branch's delta index
    #[serde(default)]
    pub from_preferred_branch: bool,
}

/// Chunk metadata sent alongside an uploaded file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChunkDescriptor {
    pub id: String,
    pub chunk_hash: String,
    pub start_line: usize,
    pub end_line: usize,
}

impl From<&CodeChunk> for ChunkDescriptor {
    fn from(chunk: &CodeChunk) -> Self {
        Self {
            id: chunk.id.clone(),
            chunk_hash: chunk.chunk_hash.clone(),
            start_line: chunk.start_line,
            end_line: chunk.end_line,
        }
    }
}

/// Parameters for one `upsert-by-file` upload
#[derive(Debug, Clone)]
pub struct UpsertFileParams {
    pub organization_id: String,
    pub project_id: String,
    pub file_path: String,
    pub file_hash: String,
    pub git_branch: String,
    pub is_base_branch: bool,
    pub content: String,
    pub chunks: Vec<ChunkDescriptor>,
}

/// Files to drop from a branch's index
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeleteFilesRequest {
    pub organization_id: String,
    pub project_id: String,
    pub git_branch: String,
    pub file_paths: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileChangeKind {
    Created,
    Changed,
    Deleted,
}

/// A working-tree file event; transient, never persisted
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileChangeEvent {
    #[serde(rename = "type")]
    pub kind: FileChangeKind,
    pub file_path: String,
    pub timestamp: DateTime<Utc>,
}

impl FileChangeEvent {
    pub fn new(kind: FileChangeKind, file_path: impl Into<String>) -> Self {
        Self {
            kind,
            file_path: file_path.into(),
            timestamp: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum IndexerStatus {
    #[default]
    Idle,
    Scanning,
    Watching,
    Error,
}

/// Observable state of the orchestrator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct IndexerState {
    pub status: IndexerStatus,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub git_branch: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_sync_time: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_files: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_chunks: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub manifest: Option<ServerManifest>,
}

/// Per-session indexing parameters
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexingConfig {
    pub organization_id: String,
    pub project_id: String,
    /// Skip files the server manifest already holds at the same hash
    pub fetch_manifest: bool,
}

/// Summary of one indexing pass
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IndexReport {
    pub branch: Option<String>,
    pub files_scanned: usize,
    pub files_uploaded: usize,
    pub files_skipped: usize,
    pub chunks_uploaded: usize,
    pub files_deleted: usize,
    pub errors: Vec<String>,
}

/// Search input as accepted from callers outside the crate
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct SearchQuery {
    pub query: String,
    #[serde(default = "default_limit")]
    pub limit: usize,
}

fn default_limit() -> usize {
    10
}

impl SearchQuery {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            limit: default_limit(),
        }
    }

    /// Parse and validate a JSON search query, rejecting malformed shapes
    pub fn from_json(raw: &str) -> Result<Self, ValidationError> {
        let parsed: SearchQuery = serde_json::from_str(raw)
            .map_err(|e| ValidationError::MalformedRequest(e.to_string()))?;
        parsed.validate()?;
        Ok(parsed)
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.query.trim().is_empty() {
            return Err(ValidationError::Empty("query".to_string()));
        }
        if self.limit == 0 {
            return Err(ValidationError::MalformedRequest(
                "limit must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }
}
