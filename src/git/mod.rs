//! Git integration: subprocess runner, branch-aware scanning and watching of
//! git-internal files for branch switches and commits.

/// `git` subprocess wrapper and output parsers
pub mod runner;
/// Full and delta scans of the working tree
pub mod scanner;
/// Reacts to branch switches and commits
pub mod watcher;

#[cfg(test)]
pub(crate) mod testing;

pub use runner::{GitCommandRunner, GitCommands};
pub use scanner::Scanner;
pub use watcher::{GitSnapshot, GitStateEvent, GitStateWatcher, RescanTrigger};
