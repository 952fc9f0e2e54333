use std::process;
use std::sync::Arc;

use tracing_subscriber::{filter::LevelFilter, fmt};

use folio_app::cli::{Cli, Commands, ProcessArgs, StatusArgs};
use folio_app::config::{self, AppConfig};
use folio_app::error::AppError;
use folio_app::paths::AppPaths;
use folio_app::pipeline::chunk::ChunkingLimits;
use folio_app::pipeline::embed::EmbeddingBatcher;
use folio_app::providers::{UnconfiguredChat, UnconfiguredEmbedding, UnconfiguredLayout};
use folio_app::server::{self, AppState};
use folio_app::services::ingest::layout_rate_limiter;
use folio_app::services::progress::DEFAULT_PROGRESS_CAPACITY;
use folio_app::services::{
    ChatService, CitationResolver, ContextService, IngestService, RetrievalEngine,
    spawn_progress_writer,
};
use folio_app::stores::{BlobStore, DocumentStore, FsBlobStore, MemoryDocumentStore};

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    let log_level = determine_log_level(&cli);
    init_tracing(log_level);

    if let Err(err) = run(cli).await {
        eprintln!("{err}");
        process::exit(1);
    }
}

fn init_tracing(level: LevelFilter) {
    let subscriber = fmt().with_max_level(level).with_target(false).finish();

    if tracing::subscriber::set_global_default(subscriber).is_err() {
        tracing::warn!("Tracing subscriber already set; skipping re-initialization.");
    }
}

async fn run(cli: Cli) -> Result<(), AppError> {
    match cli.command {
        Some(Commands::Serve(_)) => {
            let config = config::load()?;
            let wiring = build_wiring(&config)?;
            server::serve(config, wiring.state).await?;
        }
        Some(Commands::Process(args)) => {
            run_process(args).await?;
        }
        Some(Commands::Status(args)) => {
            run_status(args).await?;
        }
        None => {
            Cli::print_help();
        }
    }

    Ok(())
}

async fn run_process(args: ProcessArgs) -> Result<(), AppError> {
    let config = config::load()?;
    let wiring = build_wiring(&config)?;
    wiring.state.contexts.get_context(&args.context_id).await?;
    wiring.ingest.process_file(&args.file_id).await?;
    println!("processed {}", args.file_id);
    Ok(())
}

async fn run_status(args: StatusArgs) -> Result<(), AppError> {
    let config = config::load()?;
    let wiring = build_wiring(&config)?;
    let view = wiring.state.contexts.get_context(&args.context_id).await?;
    println!("{}", serde_json::to_string_pretty(&view)?);
    Ok(())
}

struct Wiring {
    state: AppState,
    ingest: Arc<IngestService>,
}

/// Assemble stores and services from configuration. Providers default to
/// the unconfigured stubs; calls that reach them fail with a provider
/// error until real backends are wired in.
fn build_wiring(config: &AppConfig) -> Result<Wiring, AppError> {
    let paths = AppPaths::new(&config.storage.path)?;
    let blobs: Arc<dyn BlobStore> = Arc::new(FsBlobStore::builder().paths(paths).build());
    let docs: Arc<dyn DocumentStore> = Arc::new(MemoryDocumentStore::new());

    let limits = ChunkingLimits {
        window: config.chunking.window,
        overlap: config.chunking.overlap,
        sentence_lookahead: config.chunking.sentence_lookahead,
    };
    limits.validate()?;

    let batcher = EmbeddingBatcher::builder()
        .provider(Arc::new(UnconfiguredEmbedding))
        .dim(config.embedding.dim)
        .concurrency(config.embedding.concurrency)
        .build();

    let (progress, _writer) = spawn_progress_writer(docs.clone(), DEFAULT_PROGRESS_CAPACITY);

    let ingest = Arc::new(
        IngestService::builder()
            .docs(docs.clone())
            .blobs(blobs.clone())
            .layout(Arc::new(UnconfiguredLayout))
            .batcher(batcher.clone())
            .limiter(layout_rate_limiter(config.extraction.requests_per_second))
            .progress(progress)
            .limits(limits)
            .page_concurrency(config.extraction.concurrency)
            .build(),
    );
    let contexts = Arc::new(
        ContextService::builder()
            .docs(docs.clone())
            .blobs(blobs.clone())
            .ingest(ingest.clone())
            .build(),
    );
    let retrieval = Arc::new(
        RetrievalEngine::builder()
            .docs(docs.clone())
            .batcher(Arc::new(batcher))
            .default_top_k(config.retrieval.top_k)
            .build(),
    );
    let chat = Arc::new(
        ChatService::builder()
            .docs(docs.clone())
            .retrieval(retrieval)
            .provider(Arc::new(UnconfiguredChat))
            .build(),
    );
    let citations = Arc::new(CitationResolver::builder().docs(docs).blobs(blobs).build());

    Ok(Wiring {
        state: AppState {
            contexts,
            chat,
            citations,
        },
        ingest,
    })
}

fn determine_log_level(cli: &Cli) -> LevelFilter {
    match cli.command.as_ref() {
        Some(Commands::Serve(_)) => match cli.verbose {
            0 => LevelFilter::INFO,
            1 => LevelFilter::DEBUG,
            _ => LevelFilter::TRACE,
        },
        Some(Commands::Process(_)) => match cli.verbose {
            0 => LevelFilter::INFO,
            1 => LevelFilter::DEBUG,
            _ => LevelFilter::TRACE,
        },
        Some(Commands::Status(_)) => match cli.verbose {
            0 => LevelFilter::OFF,
            1 => LevelFilter::INFO,
            2 => LevelFilter::DEBUG,
            _ => LevelFilter::TRACE,
        },
        None => match cli.verbose {
            0 => LevelFilter::OFF,
            1 => LevelFilter::INFO,
            2 => LevelFilter::DEBUG,
            _ => LevelFilter::TRACE,
        },
    }
}
