use crate::types::{ChunkHashMode, ChunkerConfig, CodeChunk};
use sha2::{Digest, Sha256};
use uuid::Uuid;

/// Identity of the file being chunked
#[derive(Debug, Clone, Copy)]
pub struct ChunkContext<'a> {
    pub file_path: &'a str,
    pub file_hash: &'a str,
    pub organization_id: &'a str,
    pub project_id: &'a str,
    pub git_branch: &'a str,
    pub is_base_branch: bool,
}

/// Line-based chunker; never parses the language it is given
#[derive(Debug, Clone, Default)]
pub struct CodeChunker {
    config: ChunkerConfig,
}

impl CodeChunker {
    pub fn new(config: ChunkerConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ChunkerConfig {
        &self.config
    }

    /// Chunk a file into overlapping, line-aligned chunks
    pub fn chunk_file(&self, ctx: &ChunkContext<'_>, content: &str) -> Vec<CodeChunk> {
        chunk_file(ctx, content, &self.config)
    }
}

/// Split `content` into chunks of whole lines.
///
/// A chunk is closed when the next line would push it past `max_chunk_chars`
/// and it already holds at least `min_chunk_chars`; below the floor lines keep
/// accumulating regardless of the ceiling. Each new chunk starts with the last
/// `overlap_lines` lines of the previous one. A trailing remainder under the
/// floor is dropped, so a file shorter than `min_chunk_chars` yields nothing.
pub fn chunk_file(ctx: &ChunkContext<'_>, content: &str, config: &ChunkerConfig) -> Vec<CodeChunk> {
    let lines: Vec<&str> = content.lines().collect();
    let mut chunks = Vec::new();

    let mut buffer: Vec<&str> = Vec::new();
    let mut buffer_chars = 0usize;
    let mut start_line = 1usize;

    for (idx, line) in lines.iter().enumerate() {
        let line_chars = line_weight(line);

        if !buffer.is_empty()
            && buffer_chars + line_chars > config.max_chunk_chars
            && buffer_chars >= config.min_chunk_chars
        {
            // Buffer holds lines start_line..=idx (1-based)
            chunks.push(build_chunk(ctx, config, &buffer, start_line, idx));

            let seeded = config.overlap_lines.min(buffer.len());
            buffer.drain(..buffer.len() - seeded);
            buffer_chars = buffer.iter().map(|l| line_weight(l)).sum();
            start_line = idx + 1 - seeded;
        }

        buffer.push(line);
        buffer_chars += line_chars;
    }

    if !buffer.is_empty() && buffer_chars >= config.min_chunk_chars {
        chunks.push(build_chunk(ctx, config, &buffer, start_line, lines.len()));
    }

    chunks
}

/// Characters a line contributes, counting its separator
fn line_weight(line: &str) -> usize {
    line.chars().count() + 1
}

fn build_chunk(
    ctx: &ChunkContext<'_>,
    config: &ChunkerConfig,
    lines: &[&str],
    start_line: usize,
    end_line: usize,
) -> CodeChunk {
    let content = lines.join("\n");
    let chunk_hash = chunk_hash(
        config.hash_mode,
        ctx.file_path,
        start_line,
        end_line,
        &content,
    );
    let id = chunk_id(ctx.organization_id, ctx.git_branch, &chunk_hash);

    CodeChunk {
        id,
        organization_id: ctx.organization_id.to_string(),
        project_id: ctx.project_id.to_string(),
        file_path: ctx.file_path.to_string(),
        content,
        start_line,
        end_line,
        chunk_hash,
        git_branch: ctx.git_branch.to_string(),
        is_base_branch: ctx.is_base_branch,
        file_hash: ctx.file_hash.to_string(),
    }
}

/// Hash identifying a chunk's location (and, in `Content` mode, its text)
pub fn chunk_hash(
    mode: ChunkHashMode,
    file_path: &str,
    start_line: usize,
    end_line: usize,
    content: &str,
) -> String {
    let key = match mode {
        ChunkHashMode::Content => format!(
            "{}:{}:{}:{}:{}",
            file_path,
            start_line,
            end_line,
            content.len(),
            content
        ),
        ChunkHashMode::Location => format!("{}:{}:{}", file_path, start_line, end_line),
    };
    sha256_hex(key.as_bytes())
}

/// UUIDv5 of the branch-salted chunk hash within the organization's namespace
pub fn chunk_id(organization_id: &str, git_branch: &str, chunk_hash: &str) -> String {
    let namespace = Uuid::parse_str(organization_id)
        .unwrap_or_else(|_| Uuid::new_v5(&Uuid::NAMESPACE_OID, organization_id.as_bytes()));
    let salted = sha256_hex(format!("{}:{}", git_branch, chunk_hash).as_bytes());
    Uuid::new_v5(&namespace, salted.as_bytes()).to_string()
}

fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx<'a>(file_path: &'a str, branch: &'a str) -> ChunkContext<'a> {
        ChunkContext {
            file_path,
            file_hash: "blobhash",
            organization_id: "org-1",
            project_id: "proj-1",
            git_branch: branch,
            is_base_branch: branch == "main",
        }
    }

    fn config(max: usize, min: usize, overlap: usize) -> ChunkerConfig {
        ChunkerConfig {
            max_chunk_chars: max,
            min_chunk_chars: min,
            overlap_lines: overlap,
            hash_mode: ChunkHashMode::Content,
        }
    }

    /// Lines of exactly `width` characters, each tagged with its line number
    fn fixed_width_lines(count: usize, width: usize) -> String {
        (1..=count)
            .map(|i| {
                let tag = format!("L{} ", i);
                format!("{}{}", tag, "x".repeat(width - tag.len()))
            })
            .collect::<Vec<_>>()
            .join("\n")
    }

    #[test]
    fn test_short_file_single_chunk() {
        let content = (1..=10).map(|i| format!("l{}", i)).collect::<Vec<_>>().join("\n");
        assert!(content.len() <= 50);

        let chunks = chunk_file(&ctx("a.ts", "main"), &content, &config(1000, 10, 2));

        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].start_line, 1);
        assert_eq!(chunks[0].end_line, 10);
        assert_eq!(chunks[0].content, content);
    }

    #[test]
    fn test_two_chunks_overlap_by_two_lines() {
        // 299 chars + separator = 300 per line; three lines fill a 1000 ceiling
        let content = fixed_width_lines(4, 299);

        let chunks = chunk_file(&ctx("a.ts", "main"), &content, &config(1000, 10, 2));

        assert_eq!(chunks.len(), 2);
        assert_eq!((chunks[0].start_line, chunks[0].end_line), (1, 3));
        assert_eq!(chunks[1].start_line, chunks[0].end_line - 1);
        assert_eq!(chunks[1].end_line, 4);
    }

    #[test]
    fn test_file_below_floor_yields_no_chunks() {
        let chunks = chunk_file(&ctx("tiny.rs", "main"), "fn a() {}", &config(1000, 50, 2));
        assert!(chunks.is_empty());

        let chunks = chunk_file(&ctx("empty.rs", "main"), "", &config(1000, 1, 2));
        assert!(chunks.is_empty());
    }

    #[test]
    fn test_short_trailing_remainder_is_dropped() {
        // Four 100-weight lines then one 5-weight line; overlap 0 leaves a 5-char tail
        let mut content = fixed_width_lines(4, 99);
        content.push_str("\nend!");

        let chunks = chunk_file(&ctx("a.rs", "main"), &content, &config(400, 50, 0));

        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].end_line, 4);
    }

    #[test]
    fn test_floor_overrides_ceiling() {
        // A single line longer than the ceiling still becomes a chunk
        let content = "y".repeat(500);

        let chunks = chunk_file(&ctx("long.rs", "main"), &content, &config(100, 50, 1));

        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].content.len(), 500);
    }

    #[test]
    fn test_chunks_respect_floor_and_whole_lines() {
        let content = (1..=200)
            .map(|i| format!("let value_{} = compute({}) * {};", i, i, i % 7))
            .collect::<Vec<_>>()
            .join("\n");
        let source_lines: Vec<&str> = content.lines().collect();
        let cfg = config(300, 80, 3);

        let chunks = chunk_file(&ctx("src/big.rs", "main"), &content, &cfg);
        assert!(chunks.len() > 5);

        for chunk in &chunks {
            let weight: usize = chunk.content.lines().map(line_weight).sum();
            assert!(weight >= cfg.min_chunk_chars);

            let chunk_lines: Vec<&str> = chunk.content.lines().collect();
            assert_eq!(chunk_lines.len(), chunk.end_line - chunk.start_line + 1);
            assert_eq!(
                chunk_lines.as_slice(),
                &source_lines[chunk.start_line - 1..chunk.end_line]
            );
        }

        for pair in chunks.windows(2) {
            let (prev, next) = (&pair[0], &pair[1]);
            if prev.end_line - prev.start_line + 1 >= cfg.overlap_lines {
                assert!(next.start_line <= prev.end_line);
                assert!(prev.end_line - next.start_line < cfg.overlap_lines);
            }
        }
    }

    #[test]
    fn test_crlf_content_keeps_whole_lines() {
        let content = "alpha line one\r\nbeta line two\r\ngamma line three\r\n";

        let chunks = chunk_file(&ctx("win.txt", "main"), content, &config(1000, 10, 1));

        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].end_line, 3);
        assert!(!chunks[0].content.contains('\r'));
    }

    #[test]
    fn test_ids_are_idempotent() {
        let content = fixed_width_lines(12, 120);
        let cfg = config(500, 50, 2);

        let first = chunk_file(&ctx("src/a.rs", "feature"), &content, &cfg);
        let second = chunk_file(&ctx("src/a.rs", "feature"), &content, &cfg);

        assert_eq!(first, second);
        assert_eq!(
            chunk_id("org-1", "feature", &first[0].chunk_hash),
            first[0].id
        );
    }

    #[test]
    fn test_branch_isolation() {
        let content = fixed_width_lines(5, 40);
        let cfg = config(1000, 10, 2);

        let main = chunk_file(&ctx("src/a.rs", "main"), &content, &cfg);
        let feature = chunk_file(&ctx("src/a.rs", "feature/login"), &content, &cfg);

        assert_eq!(main[0].chunk_hash, feature[0].chunk_hash);
        assert_ne!(main[0].id, feature[0].id);
        assert!(main[0].is_base_branch);
        assert!(!feature[0].is_base_branch);
    }

    #[test]
    fn test_organization_namespaces_ids() {
        let hash = chunk_hash(ChunkHashMode::Location, "a.rs", 1, 10, "");

        assert_ne!(chunk_id("org-a", "main", &hash), chunk_id("org-b", "main", &hash));

        let uuid_org = "6f1c2c1e-8b1a-4a53-9a8e-2f0b7a0d5c11";
        let id = chunk_id(uuid_org, "main", &hash);
        assert!(Uuid::parse_str(&id).is_ok());
    }

    #[test]
    fn test_hash_modes() {
        let before = chunk_hash(ChunkHashMode::Content, "a.rs", 1, 3, "one\ntwo\nthree");
        let after = chunk_hash(ChunkHashMode::Content, "a.rs", 1, 3, "one\n2\nthree");
        assert_ne!(before, after);

        let before = chunk_hash(ChunkHashMode::Location, "a.rs", 1, 3, "one\ntwo\nthree");
        let after = chunk_hash(ChunkHashMode::Location, "a.rs", 1, 3, "one\n2\nthree");
        assert_eq!(before, after);
        assert_eq!(before.len(), 64);
    }

    #[test]
    fn test_code_chunker_uses_its_config() {
        let chunker = CodeChunker::new(config(1000, 5, 0));
        let chunks = chunker.chunk_file(&ctx("a.rs", "main"), "fn main() {}\n");

        assert_eq!(chunker.config().min_chunk_chars, 5);
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].file_hash, "blobhash");
        assert_eq!(chunks[0].project_id, "proj-1");
    }
}
