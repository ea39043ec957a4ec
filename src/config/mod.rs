/// Configuration system for delta-indexer
///
/// Supports loading from multiple sources with priority:
/// CLI args > Environment variables > Config file > Defaults
use crate::error::{ConfigError, IndexerError};
use crate::types::ChunkerConfig;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// Remote index service configuration
    #[serde(default)]
    pub api: ApiConfig,

    /// Chunk size limits
    #[serde(default)]
    pub chunker: ChunkerConfig,

    /// Branch resolution and git watching
    #[serde(default)]
    pub git: GitConfig,

    /// Indexing configuration
    #[serde(default)]
    pub indexing: IndexingSettings,
}

/// Remote index service configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    /// Used only when the auth token does not name an API URL
    #[serde(default)]
    pub base_url: Option<String>,

    /// Per-attempt request timeout in seconds
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Extra attempts after a 5xx response
    #[serde(default = "default_retries")]
    pub retries: u32,

    /// Lower bound of the randomized retry delay
    #[serde(default = "default_backoff_min_ms")]
    pub backoff_min_ms: u64,

    /// Upper bound of the randomized retry delay
    #[serde(default = "default_backoff_max_ms")]
    pub backoff_max_ms: u64,
}

/// Branch resolution and git watching
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GitConfig {
    /// Explicit base branch; wins over anything git reports
    #[serde(default)]
    pub base_branch: Option<String>,

    /// Branches probed, in order, when origin/HEAD is not set
    #[serde(default = "default_base_branch_candidates")]
    pub base_branch_candidates: Vec<String>,

    /// Quiet period after a git-internal write before state is re-read
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,
}

/// Indexing configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexingSettings {
    /// Maximum file size to index (in bytes)
    #[serde(default = "default_max_file_size")]
    pub max_file_size: usize,

    /// Glob patterns excluded from every scan
    #[serde(default = "default_exclude_patterns")]
    pub exclude_patterns: Vec<String>,

    /// Consult the server manifest before uploading
    #[serde(default = "default_fetch_manifest")]
    pub fetch_manifest: bool,
}

// Default value functions
fn default_timeout_secs() -> u64 {
    30
}

fn default_retries() -> u32 {
    3
}

fn default_backoff_min_ms() -> u64 {
    200
}

fn default_backoff_max_ms() -> u64 {
    2000
}

/// Fallback order used when the remote does not advertise a default branch
pub fn default_base_branch_candidates() -> Vec<String> {
    ["main", "master", "develop", "development"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

fn default_debounce_ms() -> u64 {
    300
}

fn default_max_file_size() -> usize {
    1_048_576 // 1 MB
}

fn default_exclude_patterns() -> Vec<String> {
    vec![
        "node_modules/**".to_string(),
        "target/**".to_string(),
        "dist/**".to_string(),
        "build/**".to_string(),
        "*.lock".to_string(),
        "*.min.js".to_string(),
    ]
}

fn default_fetch_manifest() -> bool {
    true
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: None,
            timeout_secs: default_timeout_secs(),
            retries: default_retries(),
            backoff_min_ms: default_backoff_min_ms(),
            backoff_max_ms: default_backoff_max_ms(),
        }
    }
}

impl Default for GitConfig {
    fn default() -> Self {
        Self {
            base_branch: None,
            base_branch_candidates: default_base_branch_candidates(),
            debounce_ms: default_debounce_ms(),
        }
    }
}

impl Default for IndexingSettings {
    fn default() -> Self {
        Self {
            max_file_size: default_max_file_size(),
            exclude_patterns: default_exclude_patterns(),
            fetch_manifest: default_fetch_manifest(),
        }
    }
}

impl ApiConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl GitConfig {
    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }
}

impl Config {
    /// Load configuration from file
    pub fn from_file(path: &Path) -> Result<Self, IndexerError> {
        if !path.exists() {
            return Err(ConfigError::FileNotFound(path.display().to_string()).into());
        }

        let content = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::LoadFailed(format!("Failed to read config file: {}", e)))?;

        let config: Config = toml::from_str(&content)
            .map_err(|e| ConfigError::ParseFailed(format!("Invalid TOML: {}", e)))?;

        config.validate()?;
        Ok(config)
    }

    /// Load configuration from default location or create default
    pub fn load_or_default() -> Result<Self, IndexerError> {
        let config_path = crate::paths::PlatformPaths::default_config_path();

        if config_path.exists() {
            tracing::info!("Loading config from: {}", config_path.display());
            Self::from_file(&config_path)
        } else {
            tracing::info!("No config file found, using defaults");
            Ok(Self::default())
        }
    }

    /// Save configuration to file
    pub fn save(&self, path: &Path) -> Result<(), IndexerError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                ConfigError::SaveFailed(format!("Failed to create config directory: {}", e))
            })?;
        }

        let content = toml::to_string_pretty(self)
            .map_err(|e| ConfigError::SaveFailed(format!("Failed to serialize config: {}", e)))?;

        std::fs::write(path, content)
            .map_err(|e| ConfigError::SaveFailed(format!("Failed to write config file: {}", e)))?;

        tracing::info!("Saved config to: {}", path.display());
        Ok(())
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<(), IndexerError> {
        if self.chunker.min_chunk_chars == 0 {
            return Err(invalid("chunker.min_chunk_chars", "must be greater than 0"));
        }

        if self.chunker.min_chunk_chars > self.chunker.max_chunk_chars {
            return Err(invalid(
                "chunker.min_chunk_chars",
                &format!(
                    "must not exceed max_chunk_chars ({} > {})",
                    self.chunker.min_chunk_chars, self.chunker.max_chunk_chars
                ),
            ));
        }

        if self.api.timeout_secs == 0 {
            return Err(invalid("api.timeout_secs", "must be greater than 0"));
        }

        if self.api.retries > 10 {
            return Err(invalid(
                "api.retries",
                &format!("must be at most 10, got {}", self.api.retries),
            ));
        }

        if self.api.backoff_min_ms > self.api.backoff_max_ms {
            return Err(invalid(
                "api.backoff_min_ms",
                "must not exceed api.backoff_max_ms",
            ));
        }

        if let Some(url) = &self.api.base_url
            && !(url.starts_with("http://") || url.starts_with("https://"))
        {
            return Err(invalid(
                "api.base_url",
                &format!("must be an http(s) URL, got '{}'", url),
            ));
        }

        if let Some(branch) = &self.git.base_branch
            && branch.trim().is_empty()
        {
            return Err(invalid("git.base_branch", "must not be empty when set"));
        }

        if self.indexing.max_file_size == 0 {
            return Err(invalid("indexing.max_file_size", "must be greater than 0"));
        }

        crate::glob_utils::compile_patterns(&self.indexing.exclude_patterns)?;

        Ok(())
    }

    /// Apply environment variable overrides
    pub fn apply_env_overrides(&mut self) {
        if let Ok(url) = std::env::var("DELTA_INDEXER_API_URL") {
            self.api.base_url = Some(url);
        }

        if let Ok(timeout) = std::env::var("DELTA_INDEXER_TIMEOUT_SECS")
            && let Ok(secs) = timeout.parse()
        {
            self.api.timeout_secs = secs;
        }

        if let Ok(retries) = std::env::var("DELTA_INDEXER_RETRIES")
            && let Ok(count) = retries.parse()
        {
            self.api.retries = count;
        }

        if let Ok(branch) = std::env::var("DELTA_INDEXER_BASE_BRANCH") {
            self.git.base_branch = Some(branch);
        }

        if let Ok(max) = std::env::var("DELTA_INDEXER_MAX_CHUNK_CHARS")
            && let Ok(chars) = max.parse()
        {
            self.chunker.max_chunk_chars = chars;
        }

        if let Ok(min) = std::env::var("DELTA_INDEXER_MIN_CHUNK_CHARS")
            && let Ok(chars) = min.parse()
        {
            self.chunker.min_chunk_chars = chars;
        }
    }

    /// Create a new Config with defaults and environment overrides
    pub fn new() -> Result<Self, IndexerError> {
        let mut config = Self::load_or_default()?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }
}

fn invalid(key: &str, reason: &str) -> IndexerError {
    ConfigError::InvalidValue {
        key: key.to_string(),
        reason: reason.to_string(),
    }
    .into()
}

#[cfg(test)]
mod tests;
