//! Line-based chunking and working-tree file loading
//!
//! Chunking is deliberately language-agnostic: files are cut on line
//! boundaries by size, with a few lines of overlap between neighbours.

mod chunker;
mod file_info;

pub use chunker::{ChunkContext, CodeChunker, chunk_file, chunk_hash, chunk_id};
pub use file_info::{FileInfo, FileLoad, SkipReason, is_text};
