// Codeflow - Main Entry Point
//
// Wires configuration, logging, the quota store, the completion client and
// the rate limiter into the orchestrator, then serves MCP over HTTP.

use anyhow::{bail, Context, Result};
use clap::Parser;
use codeflow::config::Config;
use codeflow::generation::{GeminiClient, GenerationAdapter, SamplingConfig};
use codeflow::quota::{InMemoryQuotaStore, QuotaGate, QuotaStore, SupabaseQuotaStore};
use codeflow::rate_limit::RateLimiter;
use codeflow::{logging, mcp, metrics, metrics_server, Orchestrator};
use std::sync::Arc;
use tracing::{error, info, warn};

/// Codeflow: code-to-flowchart MCP server
#[derive(Parser, Debug)]
#[command(name = "codeflow")]
#[command(author = "Codeflow Contributors")]
#[command(version)]
#[command(about = "MCP server that turns source code into interactive flowcharts", long_about = None)]
struct Args {
    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Port for the MCP listener (overrides CODEFLOW_PORT)
    #[arg(short, long)]
    port: Option<u16>,

    /// Address to bind (overrides CODEFLOW_BIND_ADDR)
    #[arg(long)]
    bind: Option<String>,

    /// Serve Prometheus metrics on this port
    #[arg(long)]
    metrics_port: Option<u16>,

    /// Print the effective configuration and exit
    #[arg(long)]
    check_config: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let mut config = Config::default().apply_env_overrides();
    if let Some(port) = args.port {
        config.server.port = port;
    }
    if let Some(bind) = args.bind {
        config.server.bind_addr = bind;
    }
    if let Some(port) = args.metrics_port {
        config.metrics.enabled = true;
        config.metrics.port = port;
    }
    config.validate().context("Invalid configuration")?;

    if args.check_config {
        println!("{:#?}", config);
        return Ok(());
    }

    logging::init(&config.logging, args.verbose)?;

    info!("Codeflow v{} starting...", env!("CARGO_PKG_VERSION"));

    let orchestrator = Arc::new(build_orchestrator(&config)?);
    let _sweeper = orchestrator.limiter().spawn_sweeper();

    metrics::init().context("Failed to initialize metrics")?;
    if config.metrics.enabled {
        let bind = config.server.bind_addr.clone();
        let port = config.metrics.port;
        tokio::spawn(async move {
            if let Err(e) = metrics_server::start_metrics_server(&bind, port).await {
                error!("Metrics server stopped: {:#}", e);
            }
        });
    }

    let addr = config.server.socket_addr()?;
    let app = mcp::router(orchestrator, &config.server.mcp_path);
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;

    info!("MCP endpoint listening on http://{}{}", addr, config.server.mcp_path);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("MCP server error")?;

    info!("Shut down");
    Ok(())
}

fn build_orchestrator(config: &Config) -> Result<Orchestrator> {
    let store: Arc<dyn QuotaStore> = if config.quota_store.is_configured() {
        info!(
            "Quota store: {} (table {})",
            config.quota_store.url, config.quota_store.table
        );
        Arc::new(
            SupabaseQuotaStore::new(&config.quota_store)
                .context("Failed to create quota store client")?,
        )
    } else {
        warn!("SUPABASE_URL/SUPABASE_KEY not set; using an empty in-memory quota store, every call will be reported as not subscribed");
        Arc::new(InMemoryQuotaStore::new())
    };

    if config.generation.api_key.is_empty() {
        bail!("GEMINI_API_KEY must be set");
    }
    let client = GeminiClient::new(&config.generation)
        .context("Failed to create completion client")?;
    info!("Generation model: {}", config.generation.model);

    let limiter = RateLimiter::new(config.rate_limit.clone());
    if !config.rate_limit.enabled {
        warn!("Rate limiting is disabled");
    }

    Ok(Orchestrator::new(
        limiter,
        Arc::new(QuotaGate::new(store)),
        Arc::new(GenerationAdapter::new(
            Arc::new(client),
            SamplingConfig::from(&config.generation),
        )),
        config.timeouts.clone(),
    ))
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
