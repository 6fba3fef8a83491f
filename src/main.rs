use std::path::Path;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use sqlx::postgres::PgPoolOptions;

use schema_crawler::config::Config;
use schema_crawler::crawler::WebCrawler;
use schema_crawler::external::{ChatCompletion, Embedder, EmbeddingEngine, LlmClient, VectorDb};
use schema_crawler::rag::RagPipeline;
use schema_crawler::schema_mapper::SchemaMapper;
use schema_crawler::server::{self, AppState};
use schema_crawler::storage::StorageManager;

#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "Crawl web pages, map them to Schema.org, and answer questions over the results",
    long_about = None
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Start the HTTP API server
    Serve,
    /// Verify configuration and connectivity to external services
    Check,
    /// Crawl a single URL and print the stored result
    Crawl {
        url: String,
        /// Recrawl even when the URL is already stored
        #[arg(long)]
        force_refresh: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    ensure_env_file(Path::new("."))?;
    dotenvy::dotenv().ok();

    let config = Config::from_env()?;
    init_tracing(&config.log_level);

    match cli.command.unwrap_or(Command::Serve) {
        Command::Serve => {
            let state = build_state(&config).await?;
            server::serve(state, &config.api.bind_addr()).await
        }
        Command::Check => run_check(&config).await,
        Command::Crawl { url, force_refresh } => {
            let state = build_state(&config).await?;
            let report = server::run_crawl(&state, &url, force_refresh)
                .await
                .map_err(anyhow::Error::from)?;
            println!("{}", serde_json::to_string_pretty(&report)?);
            Ok(())
        }
    }
}

fn init_tracing(log_level: &str) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

/// When .env is missing but a template exists, create it and refuse to start
/// so the operator fills in their keys first.
fn ensure_env_file(dir: &Path) -> Result<()> {
    let env_file = dir.join(".env");
    if env_file.exists() {
        return Ok(());
    }

    let template = dir.join(".env.example");
    if !template.exists() {
        // No template either; the process environment has to carry the config
        return Ok(());
    }

    std::fs::copy(&template, &env_file).context("Failed to create .env from .env.example")?;
    bail!(".env was missing and has been created from .env.example; fill in your API keys and run again")
}

/// Wire up every component the server and the one-shot commands share
async fn build_state(config: &Config) -> Result<AppState> {
    let llm = Arc::new(LlmClient::new(config.llm.clone())?);
    tracing::info!(provider = %llm.provider(), "LLM client ready");

    let embedder: Arc<dyn Embedder> = Arc::new(EmbeddingEngine::new(config.embedding.clone()).await?);
    tracing::info!(dimension = embedder.dimension(), "Embedding model loaded");

    let storage = Arc::new(
        StorageManager::connect(
            config.postgres.clone(),
            config.qdrant.clone(),
            Arc::clone(&embedder),
        )
        .await?,
    );
    let mapper = Arc::new(SchemaMapper::new(llm.clone(), Arc::clone(&embedder)).await?);
    let crawler = Arc::new(WebCrawler::new(&config.crawler)?);
    let rag = Arc::new(RagPipeline::new(llm, storage.clone(), 5));

    Ok(AppState {
        crawler,
        mapper,
        storage,
        rag,
    })
}

/// Setup self-test: report the state of every external dependency and fail
/// when any required one is unreachable.
async fn run_check(config: &Config) -> Result<()> {
    println!("Running setup checks...");
    let mut failures = 0;

    match LlmClient::new(config.llm.clone()) {
        Ok(client) => println!("llm: ok ({})", client.provider()),
        Err(e) => {
            println!("llm: FAILED ({})", e);
            failures += 1;
        }
    }

    match PgPoolOptions::new()
        .max_connections(1)
        .connect(&config.postgres.connection_url())
        .await
    {
        Ok(pool) => match sqlx::query("SELECT 1").execute(&pool).await {
            Ok(_) => println!("postgres: ok"),
            Err(e) => {
                println!("postgres: FAILED ({})", e);
                failures += 1;
            }
        },
        Err(e) => {
            println!("postgres: FAILED ({})", e);
            failures += 1;
        }
    }

    match VectorDb::connect(config.qdrant.clone()).await {
        Ok(db) => match db.list_collection_names().await {
            Ok(names) => println!("qdrant: ok ({} collections)", names.len()),
            Err(e) => {
                println!("qdrant: FAILED ({})", e);
                failures += 1;
            }
        },
        Err(e) => {
            println!("qdrant: FAILED ({})", e);
            failures += 1;
        }
    }

    match EmbeddingEngine::new(config.embedding.clone()).await {
        Ok(engine) => match engine.embed("connectivity check").await {
            Ok(vector) => println!("embeddings: ok ({} dimensions)", vector.len()),
            Err(e) => {
                println!("embeddings: FAILED ({})", e);
                failures += 1;
            }
        },
        Err(e) => {
            println!("embeddings: FAILED ({})", e);
            failures += 1;
        }
    }

    if failures > 0 {
        bail!("{} check(s) failed", failures);
    }
    println!("All checks passed.");
    Ok(())
}
