//! ChainPipe CLI: runs the block ingestion pipeline.
//!
//! # Commands
//! ```text
//! chainpipe run          [--config <path>] [--console]
//! chainpipe check-config [--config <path>]
//! chainpipe info
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use chainpipe_core::{
    App, ChainClient, CheckpointStore, Codec, EventTypeFilter, Processor, ProducerBuilder,
    StreamingClient, TopicRouter, TxMessageFilter,
};
use chainpipe_cosmos::{CometRpcClient, ProtoCodec, RpcClientConfig};
use chainpipe_kafka::{ConsoleProducer, KafkaStreamingClient};
use chainpipe_storage::InMemoryStorage;

mod config;
mod logging;

use config::AppConfig;

#[derive(Parser)]
#[command(
    name = "chainpipe",
    about = "Stream CometBFT/Cosmos blocks and events into Kafka",
    long_about = "
ChainPipe: follows a CometBFT chain height by height, decodes allowlisted
transaction messages and typed events, and publishes them to Kafka keyed by
block height. Progress is checkpointed per stream.

ENVIRONMENT VARIABLES:
  CHAINPIPE_CONFIG           Path to the configuration file
  CHAINPIPE_DATABASE_URL     PostgreSQL URL for checkpoints
  CHAINPIPE_KAFKA_SEEDS      Comma-separated broker list
  CHAINPIPE_KAFKA_USER       SASL user
  CHAINPIPE_KAFKA_PASSWORD   SASL password
  CHAINPIPE_CHAIN_RPC        CometBFT RPC URL
  CHAINPIPE_LOG_LEVEL        Log level
  RUST_LOG                   Full tracing filter (overrides log settings)
",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the transactions and events streams until interrupted
    Run {
        /// Configuration file (default: search ./config.yaml, ./config/, ../config/, ../../config/)
        #[arg(short, long, env = "CHAINPIPE_CONFIG")]
        config: Option<PathBuf>,
        /// Print records instead of sending them to Kafka
        #[arg(long)]
        console: bool,
    },

    /// Load and validate the configuration, then exit
    #[command(name = "check-config")]
    CheckConfig {
        #[arg(short, long, env = "CHAINPIPE_CONFIG")]
        config: Option<PathBuf>,
    },

    /// Show build and capability info
    Info,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Run { config, console } => cmd_run(config, console).await,
        Commands::CheckConfig { config } => cmd_check_config(config),
        Commands::Info => cmd_info(),
    }
}

// ─── Command implementations ─────────────────────────────────────────────────

async fn cmd_run(path: Option<PathBuf>, console: bool) -> Result<()> {
    let (config, used) = AppConfig::load(path.as_deref())?;
    logging::init_tracing(&config.log);
    info!(config = %used.display(), "configuration loaded");

    let console = console || !cfg!(feature = "kafka");
    if console {
        config.validate_pipeline()?;
    } else {
        config.validate()?;
    }

    let client: Arc<dyn ChainClient> = Arc::new(
        CometRpcClient::new(
            &config.chain.rpc,
            RpcClientConfig {
                request_timeout: config.chain.timeout(),
            },
        )
        .context("failed to create chain RPC client")?,
    );
    let codec: Arc<dyn Codec> = Arc::new(ProtoCodec::new());
    let streaming = streaming_client(&config, console)?;
    let store = checkpoint_store(&config).await?;

    let processor = Arc::new(Processor::new(
        streaming.clone(),
        codec,
        EventTypeFilter::new(config.filter_event.types.iter().cloned()),
        TxMessageFilter::new(config.filter_transaction.types.iter().cloned()),
    ));

    let transactions = ProducerBuilder::from_config(config.producer.transactions.clone())
        .build_transactions(client.clone(), processor.clone(), store.clone());
    let events = ProducerBuilder::from_config(config.producer.events.clone())
        .build_events(client, processor, store);
    let app = App::new(transactions, events);

    let token = CancellationToken::new();
    tokio::spawn(cancel_on_signal(token.clone()));

    info!(rpc = %config.chain.rpc, console, "starting ingestion");
    let result = app.run(token).await;

    if let Err(e) = streaming.close().await {
        warn!(error = %e, "failed to close streaming client");
    }

    let summary = result.context("ingestion stopped")?;
    info!(
        transactions_next = summary.transactions.next_height,
        transactions_processed = summary.transactions.processed,
        events_next = summary.events.next_height,
        events_processed = summary.events.processed,
        "shutdown complete"
    );
    Ok(())
}

fn cmd_check_config(path: Option<PathBuf>) -> Result<()> {
    let (config, used) = AppConfig::load(path.as_deref())?;
    config.validate()?;

    let router = TopicRouter::from_routes(&config.kafka_topic_router);
    println!("Configuration OK: {}", used.display());
    println!("  chain rpc:          {}", config.chain.rpc);
    println!("  kafka seeds:        {}", config.kafka.seeds.join(", "));
    println!("  routed types:       {}", router.len());
    println!("  allowed events:     {}", config.filter_event.types.len());
    println!("  allowed tx msgs:    {}", config.filter_transaction.types.len());
    println!(
        "  checkpoints:        {}",
        if config.database.url.is_empty() { "in-memory" } else { "postgres" }
    );
    Ok(())
}

fn cmd_info() -> Result<()> {
    let mark = |enabled: bool| if enabled { "✓" } else { "✗" };
    println!("ChainPipe v{}", env!("CARGO_PKG_VERSION"));
    println!();
    println!("Capabilities:");
    println!("  ✓ CometBFT JSON-RPC client   (reqwest)");
    println!("  ✓ Cosmos SDK tx decoding     (prost)");
    println!("  ✓ Typed event decoding       (JSON attributes)");
    println!("  ✓ Console producer");
    println!("  {} Kafka producer             (librdkafka, feature=kafka)", mark(cfg!(feature = "kafka")));
    println!("  {} PostgreSQL checkpoints     (sqlx, feature=postgres)", mark(cfg!(feature = "postgres")));
    Ok(())
}

// ─── Wiring ──────────────────────────────────────────────────────────────────

fn streaming_client(config: &AppConfig, console: bool) -> Result<Arc<dyn StreamingClient>> {
    let router = TopicRouter::from_routes(&config.kafka_topic_router);
    if console {
        let client = KafkaStreamingClient::new(ConsoleProducer::new(), router).with_config(&config.kafka);
        return Ok(Arc::new(client));
    }
    kafka_client(config, router)
}

#[cfg(feature = "kafka")]
fn kafka_client(config: &AppConfig, router: TopicRouter) -> Result<Arc<dyn StreamingClient>> {
    let producer = chainpipe_kafka::RdKafkaProducer::new(&config.kafka)
        .context("failed to create kafka producer")?;
    Ok(Arc::new(
        KafkaStreamingClient::new(producer, router).with_config(&config.kafka),
    ))
}

#[cfg(not(feature = "kafka"))]
fn kafka_client(config: &AppConfig, router: TopicRouter) -> Result<Arc<dyn StreamingClient>> {
    warn!("built without the `kafka` feature, printing records instead");
    Ok(Arc::new(
        KafkaStreamingClient::new(ConsoleProducer::new(), router).with_config(&config.kafka),
    ))
}

#[cfg(feature = "postgres")]
async fn checkpoint_store(config: &AppConfig) -> Result<Arc<dyn CheckpointStore>> {
    if config.database.url.is_empty() {
        warn!("database.url not set, checkpoints are kept in memory");
        return Ok(Arc::new(InMemoryStorage::new()));
    }
    let storage = chainpipe_storage::PostgresStorage::connect(&config.database.url)
        .await
        .context("failed to connect to checkpoint database")?;
    Ok(Arc::new(storage))
}

#[cfg(not(feature = "postgres"))]
async fn checkpoint_store(config: &AppConfig) -> Result<Arc<dyn CheckpointStore>> {
    if !config.database.url.is_empty() {
        warn!("built without the `postgres` feature, ignoring database.url");
    }
    Ok(Arc::new(InMemoryStorage::new()))
}

/// Cancel `token` on SIGINT or SIGTERM.
async fn cancel_on_signal(token: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "cannot listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "cannot listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("received ctrl-c, shutting down"),
        _ = terminate => info!("received SIGTERM, shutting down"),
        _ = token.cancelled() => return,
    }
    token.cancel();
}
