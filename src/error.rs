/// Centralized error types for delta-indexer using thiserror
///
/// Provides domain-specific error types for better error handling and user-facing messages.
use thiserror::Error;

/// Main error type for the indexing engine
#[derive(Error, Debug)]
pub enum IndexerError {
    #[error("Git error: {0}")]
    Git(#[from] GitError),

    #[error("API error: {0}")]
    Api(#[from] ApiError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("Watcher error: {0}")]
    Watch(#[from] WatchError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Other(String),
}

/// Errors raised while running or parsing the `git` executable
#[derive(Error, Debug)]
pub enum GitError {
    #[error("Git repository not found at: {0}")]
    RepoNotFound(String),

    #[error("Failed to spawn git: {0}")]
    Spawn(String),

    #[error("`git {command}` failed: {stderr}")]
    CommandFailed { command: String, stderr: String },

    #[error("Failed to parse git output: {0}")]
    Parse(String),

    #[error("No index entry for path: {0}")]
    PathNotTracked(String),
}

/// Errors related to the remote index service
#[derive(Error, Debug)]
pub enum ApiError {
    #[error("HTTP {status}: {body}")]
    Http { status: u16, body: String },

    #[error("Request timed out after {0} ms")]
    Timeout(u64),

    #[error("Request was cancelled")]
    Cancelled,

    #[error("Transport failure: {0}")]
    Transport(String),

    #[error("Failed to decode response: {0}")]
    Decode(String),

    #[error("No API base URL available from token or configuration")]
    MissingBaseUrl,

    #[error("Authentication failed: {0}")]
    Auth(String),
}

/// Errors related to configuration
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to load configuration file: {0}")]
    LoadFailed(String),

    #[error("Failed to parse configuration: {0}")]
    ParseFailed(String),

    #[error("Invalid configuration value for '{key}': {reason}")]
    InvalidValue { key: String, reason: String },

    #[error("Failed to save configuration: {0}")]
    SaveFailed(String),

    #[error("Configuration file not found: {0}")]
    FileNotFound(String),
}

/// Errors related to input validation
#[derive(Error, Debug)]
pub enum ValidationError {
    #[error("Malformed request: {0}")]
    MalformedRequest(String),

    #[error("Empty {0}")]
    Empty(String),
}

/// Errors related to filesystem watching of git internals
#[derive(Error, Debug)]
pub enum WatchError {
    #[error("Failed to initialize watcher: {0}")]
    InitFailed(String),

    #[error("Failed to watch '{path}': {reason}")]
    WatchFailed { path: String, reason: String },
}

impl From<anyhow::Error> for IndexerError {
    fn from(err: anyhow::Error) -> Self {
        IndexerError::Other(format!("{:#}", err))
    }
}

impl ApiError {
    /// Only server-side failures (5xx) are worth another attempt
    pub fn is_server_error(&self) -> bool {
        matches!(self, ApiError::Http { status, .. } if (500..600).contains(status))
    }
}

impl IndexerError {
    /// Create a new error from a string message
    pub fn other(msg: impl Into<String>) -> Self {
        IndexerError::Other(msg.into())
    }

    /// Convert to a user-facing error string suitable for the indexer state
    pub fn to_user_string(&self) -> String {
        format!("{}", self)
    }

    /// Check if this is a user error (validation, bad config) vs system error
    pub fn is_user_error(&self) -> bool {
        matches!(
            self,
            IndexerError::Validation(_) | IndexerError::Config(ConfigError::InvalidValue { .. })
        )
    }

    /// Whether the service could not be reached or kept failing server-side,
    /// as opposed to rejecting this particular request
    pub fn is_network_failure(&self) -> bool {
        match self {
            IndexerError::Api(api) => {
                api.is_server_error()
                    || matches!(api, ApiError::Transport(_) | ApiError::Timeout(_))
            }
            _ => false,
        }
    }
}

/// Result alias used throughout the library
pub type Result<T> = std::result::Result<T, IndexerError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = IndexerError::Validation(ValidationError::Empty("query".to_string()));
        assert_eq!(err.to_string(), "Validation error: Empty query");
    }

    #[test]
    fn test_error_from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: IndexerError = io_err.into();
        assert!(matches!(err, IndexerError::Io(_)));
    }

    #[test]
    fn test_error_from_anyhow() {
        let anyhow_err = anyhow::anyhow!("test error");
        let err: IndexerError = anyhow_err.into();
        assert!(matches!(err, IndexerError::Other(_)));
    }

    #[test]
    fn test_is_user_error() {
        let user_err = IndexerError::Validation(ValidationError::Empty("query".to_string()));
        assert!(user_err.is_user_error());

        let system_err =
            IndexerError::Io(std::io::Error::new(std::io::ErrorKind::NotFound, "test"));
        assert!(!system_err.is_user_error());
    }

    #[test]
    fn test_network_failures() {
        let server = IndexerError::Api(ApiError::Http {
            status: 503,
            body: "unavailable".to_string(),
        });
        assert!(server.is_network_failure());
        assert!(IndexerError::Api(ApiError::Timeout(1000)).is_network_failure());
        assert!(IndexerError::Api(ApiError::Transport("reset".to_string())).is_network_failure());

        let rejected = IndexerError::Api(ApiError::Http {
            status: 422,
            body: "rejected".to_string(),
        });
        assert!(!rejected.is_network_failure());
        assert!(!IndexerError::Api(ApiError::Decode("eof".to_string())).is_network_failure());
        assert!(!IndexerError::Git(GitError::PathNotTracked("a.rs".to_string())).is_network_failure());
    }

    #[test]
    fn test_timeout_is_distinct_from_http() {
        let err = ApiError::Timeout(30_000);
        assert_eq!(err.to_string(), "Request timed out after 30000 ms");
        assert!(!err.is_server_error());
    }

    #[test]
    fn test_git_command_failed_display() {
        let err = GitError::CommandFailed {
            command: "ls-files -s".to_string(),
            stderr: "fatal: not a git repository".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "`git ls-files -s` failed: fatal: not a git repository"
        );
    }

    #[test]
    fn test_config_error_invalid_value() {
        let err = ConfigError::InvalidValue {
            key: "api.retries".to_string(),
            reason: "must be at most 10".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Invalid configuration value for 'api.retries': must be at most 10"
        );
    }

    #[test]
    fn test_error_chain() {
        let api_err = ApiError::Http {
            status: 500,
            body: "boom".to_string(),
        };
        let err: IndexerError = api_err.into();
        assert!(matches!(err, IndexerError::Api(_)));
        assert_eq!(err.to_string(), "API error: HTTP 500: boom");
    }
}
