//! Policy RAG server binary
//!
//! Run with: cargo run -p policy-rag --bin policy-rag-server -- --ingest-on-start

use clap::Parser;
use policy_rag::{
    config::RagConfig,
    server::{state::AppState, RagServer},
    types::IngestRequest,
};
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(name = "policy-rag-server", version, about = "Policy document retrieval server")]
struct Args {
    /// TOML configuration file
    #[arg(short, long, env = "POLICY_RAG_CONFIG")]
    config: Option<PathBuf>,

    /// Override the bind host
    #[arg(long)]
    host: Option<String>,

    /// Override the bind port
    #[arg(short, long)]
    port: Option<u16>,

    /// Ingest the documents directory before serving
    #[arg(long, env = "INGEST_ON_START")]
    ingest_on_start: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "policy_rag=info,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Args::parse();

    let mut config = RagConfig::load(args.config.as_deref())?;
    if let Some(host) = args.host {
        config.server.host = host;
    }
    if let Some(port) = args.port {
        config.server.port = port;
    }
    config.validate()?;

    tracing::info!("Configuration loaded");
    tracing::info!("  - Embedding provider: {:?}", config.embeddings.provider);
    tracing::info!("  - Embedding model: {}", config.embeddings.model);
    tracing::info!("  - Chunk size: {} (overlap {})", config.chunking.chunk_size, config.chunking.chunk_overlap);
    tracing::info!("  - Index: {}", config.index_file().display());
    tracing::info!("  - Documents: {}", config.documents.path.display());

    let state = AppState::new(config).await?;

    if args.ingest_on_start {
        let config = state.config();
        let options = IngestRequest::default().to_options(&config.chunking)?;
        match state.engine().ingest_directory(&config.documents.path, options).await {
            Ok(summary) => tracing::info!(
                "Startup ingest: {} added, {} updated, {} unchanged, {} removed, {} failed",
                summary.documents_added,
                summary.documents_updated,
                summary.documents_unchanged,
                summary.documents_removed,
                summary.failed.len()
            ),
            Err(e) => tracing::warn!("Startup ingest failed: {}", e),
        }
    }

    let server = RagServer::from_state(state);

    println!("\nServer starting...");
    println!("  API: http://{}", server.address());
    println!("  Health: http://{}/health", server.address());
    println!("  API Info: http://{}/api/info", server.address());
    println!("\nPress Ctrl+C to stop\n");

    server.start().await?;

    Ok(())
}
