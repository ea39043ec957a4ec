use super::*;
use crate::types::ChunkHashMode;
use tempfile::TempDir;

#[test]
fn test_default_config() {
    let config = Config::default();
    assert_eq!(config.api.timeout_secs, 30);
    assert_eq!(config.api.retries, 3);
    assert!(config.api.base_url.is_none());
    assert_eq!(config.chunker.max_chunk_chars, 1000);
    assert_eq!(
        config.git.base_branch_candidates,
        vec!["main", "master", "develop", "development"]
    );
    assert_eq!(config.git.debounce(), Duration::from_millis(300));
    assert!(config.indexing.fetch_manifest);
}

#[test]
fn test_validate_valid_config() {
    let config = Config::default();
    assert!(config.validate().is_ok());
}

#[test]
fn test_validate_min_above_max() {
    let mut config = Config::default();
    config.chunker.min_chunk_chars = 2000;
    assert!(config.validate().is_err());
}

#[test]
fn test_validate_zero_min_chunk() {
    let mut config = Config::default();
    config.chunker.min_chunk_chars = 0;
    assert!(config.validate().is_err());
}

#[test]
fn test_validate_zero_timeout() {
    let mut config = Config::default();
    config.api.timeout_secs = 0;
    assert!(config.validate().is_err());
}

#[test]
fn test_validate_backoff_bounds() {
    let mut config = Config::default();
    config.api.backoff_min_ms = 5000;
    assert!(config.validate().is_err());
}

#[test]
fn test_validate_bad_base_url() {
    let mut config = Config::default();
    config.api.base_url = Some("ftp://example.com".to_string());
    assert!(config.validate().is_err());

    config.api.base_url = Some("https://index.example.com".to_string());
    assert!(config.validate().is_ok());
}

#[test]
fn test_validate_bad_exclude_pattern() {
    let mut config = Config::default();
    config.indexing.exclude_patterns.push("src/[".to_string());
    let err = config.validate().unwrap_err();
    assert!(err.is_user_error());
}

#[test]
fn test_from_file_partial_sections() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("config.toml");
    std::fs::write(
        &path,
        r#"
[api]
retries = 5

[chunker]
max_chunk_chars = 800
hash_mode = "location"

[git]
base_branch = "trunk"
"#,
    )
    .unwrap();

    let config = Config::from_file(&path).unwrap();
    assert_eq!(config.api.retries, 5);
    assert_eq!(config.api.timeout_secs, 30);
    assert_eq!(config.chunker.max_chunk_chars, 800);
    assert_eq!(config.chunker.hash_mode, ChunkHashMode::Location);
    assert_eq!(config.git.base_branch.as_deref(), Some("trunk"));
    assert_eq!(config.indexing.max_file_size, 1_048_576);
}

#[test]
fn test_from_file_missing() {
    let dir = TempDir::new().unwrap();
    let result = Config::from_file(&dir.path().join("nope.toml"));
    assert!(matches!(
        result,
        Err(IndexerError::Config(ConfigError::FileNotFound(_)))
    ));
}

#[test]
fn test_from_file_invalid_toml() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("config.toml");
    std::fs::write(&path, "[api\nretries = ").unwrap();

    let result = Config::from_file(&path);
    assert!(matches!(
        result,
        Err(IndexerError::Config(ConfigError::ParseFailed(_)))
    ));
}

#[test]
fn test_save_and_reload() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("nested").join("config.toml");

    let mut config = Config::default();
    config.git.base_branch = Some("develop".to_string());
    config.api.base_url = Some("https://index.example.com".to_string());
    config.save(&path).unwrap();

    let loaded = Config::from_file(&path).unwrap();
    assert_eq!(loaded.git.base_branch.as_deref(), Some("develop"));
    assert_eq!(
        loaded.api.base_url.as_deref(),
        Some("https://index.example.com")
    );
}
