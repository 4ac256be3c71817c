//! # Page Index RAG CLI (`pidx`)
//!
//! Thin command-line surface over the [`RagService`] pipeline.
//!
//! ```bash
//! pidx init                                # create an empty snapshot
//! pidx ingest --name manual ./manual.txt   # segment, chunk, and index
//! pidx query "钾 在 哪一页" --top-k 3       # answer with citations
//! pidx status                              # snapshot counts
//! ```
//!
//! All commands accept `--config` pointing to a TOML file; see
//! `config/pidx.example.toml`.

use std::collections::HashMap;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use page_index_rag::config::load_config;
use page_index_rag::models::{IngestRequest, QueryRequest};
use page_index_rag::store::SnapshotStore;
use page_index_rag::RagService;

/// Page Index RAG: ingest documents into page-indexed chunks and answer
/// queries with cited evidence.
#[derive(Parser)]
#[command(
    name = "pidx",
    about = "Page-indexed retrieval-augmented generation with hybrid rank fusion",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./pidx.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create an empty snapshot file if none exists. Idempotent.
    Init,

    /// Ingest a document from a file or explicit pages.
    Ingest {
        /// Display name of the document.
        #[arg(long)]
        name: String,

        /// Document id; re-ingesting an existing id replaces its pages
        /// and chunks. Generated when omitted.
        #[arg(long)]
        doc_id: Option<String>,

        /// Version tag stored with the document.
        #[arg(long, default_value = "v1")]
        version: String,

        /// Free-form metadata as a JSON object.
        #[arg(long)]
        metadata: Option<String>,

        /// Explicit page text; may be repeated. Preferred over FILE.
        #[arg(long = "page")]
        pages: Vec<String>,

        /// File whose content is segmented into pages.
        file: Option<PathBuf>,
    },

    /// Answer a query against the indexed corpus.
    Query {
        /// Query text.
        query: String,

        /// Maximum citations returned.
        #[arg(long, default_value_t = 10)]
        top_k: usize,

        /// Include the pipeline debug block in the response.
        #[arg(long)]
        debug: bool,
    },

    /// Show document/page/chunk counts and the last-updated timestamp.
    Status,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = if cli.config.exists() {
        load_config(&cli.config)?
    } else {
        page_index_rag::Config::default()
    };

    match cli.command {
        Commands::Init => {
            let store = SnapshotStore::new(config.store.path.clone());
            // Verifies an existing snapshot still parses; creates an
            // empty one otherwise.
            let snapshot = store.load()?;
            store.save(&snapshot)?;
            println!("snapshot ready at {}", config.store.path.display());
        }
        Commands::Ingest {
            name,
            doc_id,
            version,
            metadata,
            pages,
            file,
        } => {
            let content = match &file {
                Some(path) => Some(
                    std::fs::read_to_string(path)
                        .with_context(|| format!("failed to read {}", path.display()))?,
                ),
                None => None,
            };
            let metadata: HashMap<String, serde_json::Value> = match metadata {
                Some(raw) => serde_json::from_str(&raw).context("metadata must be a JSON object")?,
                None => HashMap::new(),
            };

            let service = RagService::from_config(config)?;
            let response = service
                .ingest(IngestRequest {
                    doc_id,
                    doc_name: name,
                    content,
                    pages: (!pages.is_empty()).then_some(pages),
                    metadata,
                    version,
                })
                .await?;
            println!("{}", serde_json::to_string_pretty(&response)?);
        }
        Commands::Query {
            query,
            top_k,
            debug,
        } => {
            let service = RagService::from_config(config)?;
            let response = service
                .query(QueryRequest {
                    query,
                    top_k,
                    with_debug: debug,
                })
                .await?;
            println!("{}", serde_json::to_string_pretty(&response)?);
        }
        Commands::Status => {
            let service = RagService::from_config(config)?;
            let response = service.status()?;
            println!("{}", serde_json::to_string_pretty(&response)?);
        }
    }

    Ok(())
}
