//! # delta-indexer - Branch-Aware Delta Indexing for Remote Code Search
//!
//! Decides which files of a git working tree a remote search index needs,
//! cuts them into overlapping line-based chunks with stable identifiers, and
//! uploads only what the server does not already hold.
//!
//! ## Overview
//!
//! The base branch (usually `main`) is indexed in full. Every other branch is
//! indexed as a delta: only files added or modified relative to the base
//! branch are uploaded, and files deleted on the branch are reported so search
//! can hide them. Searches prefer the current branch's delta and fall back to
//! the base branch.
//!
//! ## Key Features
//!
//! - **Delta Scans**: `git ls-files -s` on the base branch, `git diff --name-status` elsewhere
//! - **Line-Based Chunking**: language-agnostic, size-bounded, with overlap between chunks
//! - **Stable Chunk IDs**: UUIDv5 per organization, salted by branch, for idempotent upserts
//! - **Manifest Reconciliation**: files whose git hash the server already has are skipped
//! - **Git State Watching**: branch switches and commits trigger a debounced rescan
//! - **Retrying Client**: per-attempt deadlines, cancellation, randomized backoff on 5xx
//!
//! ## Architecture
//!
//! ```text
//!  GitStateWatcher ──► Scanner ──► Chunker ──► ApiClient ──► index service
//!        ▲                                         │
//!        │                 Indexer ◄── manifest ───┘
//!        └──── rescan ────────┘
//! ```
//!
//! ## Modules
//!
//! - [`client`]: the [`Indexer`] orchestrator and its state machine
//! - [`git`]: git subprocess runner, scanner and git state watcher
//! - [`indexer`]: line-based chunking and working-tree file loading
//! - [`api`]: remote index service client and retry helper
//! - [`auth`]: tokens, token cache and provider seam
//! - [`config`]: configuration management with environment variable support
//! - [`types`]: chunk, manifest, search and state types
//! - [`error`]: error types and result aliases
//! - [`paths`]: platform configuration paths
//! - [`glob_utils`]: exclude-pattern matching
//!
//! ## Usage Example
//!
//! ```no_run
//! use delta_indexer::auth::{AuthToken, StaticTokenProvider};
//! use delta_indexer::config::Config;
//! use delta_indexer::types::IndexingConfig;
//! use delta_indexer::Indexer;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let tokens = Arc::new(StaticTokenProvider::new(AuthToken::new("secret")));
//!     let indexer = Indexer::open(".", Config::new()?, tokens).await?;
//!
//!     let report = indexer
//!         .start_indexing(IndexingConfig {
//!             organization_id: "acme".to_string(),
//!             project_id: "web".to_string(),
//!             fetch_manifest: true,
//!         })
//!         .await?;
//!     println!("{:?}", report);
//!
//!     Ok(())
//! }
//! ```

/// Remote index service client with timeout and retry
pub mod api;

/// Auth tokens and token providers
pub mod auth;

/// Indexing orchestrator
pub mod client;

/// Configuration management with environment variable overrides
pub mod config;

/// Error types and utilities
pub mod error;

/// Git subprocess runner, branch-aware scanner and git state watcher
pub mod git;

/// Glob pattern matching for excluded paths
pub mod glob_utils;

/// Line-based chunking and file loading
pub mod indexer;

/// Platform-specific configuration paths
pub mod paths;

/// Chunk, manifest, search and indexer state types
pub mod types;

pub use client::Indexer;
pub use error::{IndexerError, Result};
