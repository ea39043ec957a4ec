use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use delta_indexer::Indexer;
use delta_indexer::auth::{AuthToken, StaticTokenProvider, TokenProvider};
use delta_indexer::config::Config;
use delta_indexer::git::{GitCommandRunner, GitCommands, Scanner};
use delta_indexer::glob_utils::compile_patterns;
use delta_indexer::indexer::{ChunkContext, CodeChunker, FileInfo, FileLoad};
use delta_indexer::types::{IndexingConfig, SearchQuery};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

const LONG_VERSION: &str = concat!(
    env!("CARGO_PKG_VERSION"),
    " (",
    env!("GIT_COMMIT_HASH"),
    ", built ",
    env!("BUILD_TIMESTAMP"),
    ")"
);

/// Branch-aware delta indexer for remote code search
#[derive(Parser, Debug)]
#[command(name = "delta-indexer", version, long_version = LONG_VERSION)]
#[command(about = "Index a git working tree into a remote code search service", long_about = None)]
struct Args {
    /// Repository to operate on
    #[arg(short, long, default_value = ".")]
    repo: PathBuf,

    /// Configuration file (default: <config dir>/delta-indexer/config.toml)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Bearer token for the index service
    #[arg(long, env = "DELTA_INDEXER_TOKEN", hide_env_values = true)]
    token: Option<String>,

    /// Index service base URL, used when the token does not name one
    #[arg(long)]
    api_url: Option<String>,

    /// Base branch, overriding origin/HEAD detection
    #[arg(long)]
    base_branch: Option<String>,

    /// Enable debug logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Index the current branch, then keep watching for branch switches and commits
    Index {
        #[arg(long)]
        org: String,
        #[arg(long)]
        project: String,
        /// Upload every file even if the server already has it
        #[arg(long)]
        no_manifest: bool,
        /// Exit after the first pass instead of watching
        #[arg(long)]
        once: bool,
    },
    /// List the files the current branch would index, without uploading
    Scan,
    /// Search the index, preferring the current branch
    Search {
        /// Query text
        query: Option<String>,
        /// Full request as JSON, e.g. '{"query":"parse config","limit":5}'
        #[arg(long, conflicts_with = "query")]
        request: Option<String>,
        #[arg(long)]
        org: String,
        #[arg(long)]
        project: String,
        #[arg(long, default_value_t = 10)]
        limit: usize,
    },
    /// Print the chunks one file would be split into
    Chunk {
        /// File path relative to the repository root
        file: String,
        #[arg(long, default_value = "local")]
        org: String,
        #[arg(long, default_value = "local")]
        project: String,
        /// Print chunks as JSON
        #[arg(long)]
        json: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(args.verbose);

    let config = load_config(&args)?;

    match &args.command {
        Command::Index {
            org,
            project,
            no_manifest,
            once,
        } => {
            let session = IndexingConfig {
                organization_id: org.clone(),
                project_id: project.clone(),
                fetch_manifest: config.indexing.fetch_manifest && !no_manifest,
            };
            run_index(&args, config, session, *once).await
        }
        Command::Scan => run_scan(&args, &config).await,
        Command::Search {
            query,
            request,
            org,
            project,
            limit,
        } => {
            let query = match (request, query) {
                (Some(raw), _) => SearchQuery::from_json(raw)?,
                (None, Some(text)) => SearchQuery {
                    query: text.clone(),
                    limit: *limit,
                },
                (None, None) => bail!("Provide a query or --request"),
            };
            let session = IndexingConfig {
                organization_id: org.clone(),
                project_id: project.clone(),
                fetch_manifest: false,
            };
            run_search(&args, config, query, session).await
        }
        Command::Chunk {
            file,
            org,
            project,
            json,
        } => run_chunk(&args, &config, file, org, project, *json).await,
    }
}

fn init_logging(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

/// Defaults, then file, then environment, then command line
fn load_config(args: &Args) -> Result<Config> {
    let mut config = match &args.config {
        Some(path) => Config::from_file(path)
            .with_context(|| format!("Failed to load config from {}", path.display()))?,
        None => Config::load_or_default()?,
    };
    config.apply_env_overrides();

    if let Some(url) = &args.api_url {
        config.api.base_url = Some(url.clone());
    }
    if let Some(branch) = &args.base_branch {
        config.git.base_branch = Some(branch.clone());
    }

    config.validate()?;
    Ok(config)
}

fn token_provider(args: &Args) -> Result<Arc<dyn TokenProvider>> {
    let Some(token) = &args.token else {
        bail!("No token given; pass --token or set DELTA_INDEXER_TOKEN");
    };
    Ok(Arc::new(StaticTokenProvider::new(AuthToken::new(token.clone()))))
}

async fn run_index(args: &Args, config: Config, session: IndexingConfig, once: bool) -> Result<()> {
    let indexer = Indexer::open(&args.repo, config, token_provider(args)?).await?;

    let mut states = indexer.subscribe_state();
    tokio::spawn(async move {
        while states.changed().await.is_ok() {
            let state = states.borrow_and_update().clone();
            match &state.error {
                Some(error) => tracing::error!("{:?}: {} ({})", state.status, state.message, error),
                None => tracing::info!("{:?}: {}", state.status, state.message),
            }
        }
    });

    let report = indexer.start_indexing(session).await?;
    println!(
        "Branch {}: {} scanned, {} uploaded ({} chunks), {} unchanged, {} deleted",
        report.branch.as_deref().unwrap_or("(detached)"),
        report.files_scanned,
        report.files_uploaded,
        report.chunks_uploaded,
        report.files_skipped,
        report.files_deleted
    );
    for error in &report.errors {
        eprintln!("  failed: {}", error);
    }

    if !once {
        tracing::info!("Watching for branch switches and commits, Ctrl-C to stop");
        tokio::signal::ctrl_c().await?;
    }
    indexer.stop().await;
    Ok(())
}

async fn run_scan(args: &Args, config: &Config) -> Result<()> {
    let git = Arc::new(GitCommandRunner::discover(&args.repo).await?);
    let exclude = compile_patterns(&config.indexing.exclude_patterns)?;
    let scanner = Scanner::new(git, &config.git, exclude);

    let outcome = scanner.scan().await?;
    if outcome.is_detached {
        println!("HEAD is detached; nothing to index");
        return Ok(());
    }

    println!(
        "Branch {} ({} scan against {})",
        outcome.branch.as_deref().unwrap_or_default(),
        if outcome.is_base_branch { "full" } else { "delta" },
        outcome.base_branch.as_deref().unwrap_or_default()
    );
    for file in &outcome.files {
        println!("  {} {}", file.file_hash, file.file_path);
    }
    for path in &outcome.deleted {
        println!("  deleted {}", path);
    }
    Ok(())
}

async fn run_search(
    args: &Args,
    config: Config,
    query: SearchQuery,
    session: IndexingConfig,
) -> Result<()> {
    let indexer = Indexer::open(&args.repo, config, token_provider(args)?).await?;
    let results = indexer.search(&query, &session).await?;

    if results.is_empty() {
        println!("No results");
    }
    for result in results {
        println!(
            "{}:{}-{} (score {:.3}{})",
            result.file_path,
            result.start_line,
            result.end_line,
            result.score,
            if result.from_preferred_branch {
                ", current branch"
            } else {
                ""
            }
        );
    }
    Ok(())
}

async fn run_chunk(
    args: &Args,
    config: &Config,
    file: &str,
    org: &str,
    project: &str,
    json: bool,
) -> Result<()> {
    let git = Arc::new(GitCommandRunner::discover(&args.repo).await?);
    let scanner = Scanner::new(
        git.clone(),
        &config.git,
        compile_patterns(&config.indexing.exclude_patterns)?,
    );
    let info = match FileInfo::load(git.repo_root(), file, config.indexing.max_file_size)? {
        FileLoad::Loaded(info) => info,
        FileLoad::Skipped(reason) => bail!("{} not indexable: {}", file, reason),
    };

    let file_hash = git.hash_object(file).await?;
    let branch = git.current_branch().await?.unwrap_or_else(|| "HEAD".to_string());
    let is_base_branch = scanner.is_base_branch(&branch).await?;
    let chunker = CodeChunker::new(config.chunker.clone());
    let chunks = chunker.chunk_file(
        &ChunkContext {
            file_path: file,
            file_hash: &file_hash,
            organization_id: org,
            project_id: project,
            git_branch: &branch,
            is_base_branch,
        },
        &info.content,
    );

    if json {
        println!("{}", serde_json::to_string_pretty(&chunks)?);
        return Ok(());
    }

    println!("{} chunks for {} on {}", chunks.len(), file, branch);
    for chunk in &chunks {
        println!(
            "  lines {:>5}-{:<5} {} {}",
            chunk.start_line,
            chunk.end_line,
            chunk.id,
            &chunk.chunk_hash[..12]
        );
    }
    Ok(())
}
