//! Hopper - event ingestion and transformation pipeline
//!
//! Stdin mode: reads one JSON envelope per line from standard input, runs
//! the full parse → transform → fan-out pipeline, and prints each event's
//! TSV line to stdout.
//!
//! ```bash
//! hopper --schema schemas.json < events.jsonl
//! hopper --schema schemas.json --metadata metadata.json --reload-interval 60s
//! ```

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::Utc;
use clap::Parser as ClapParser;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use hopper_config::{DynamicMetadataLoader, DynamicSchemaLoader, FileFetcher, LoaderConfig};
use hopper_processor::{PoolConfig, ProcessorPool, ResultPipe, StdinPipe};
use hopper_protocol::{JsonLineParser, NoopStats, RawRecord, StatsLogger};
use hopper_transform::{
    EventMetadataLoader, GeoLookup, NoopGeo, SchemaTransformer, StaticMetadataLoader,
};
use hopper_writer::{Multee, Sink, StdoutSink};

/// Hopper - event ingestion and transformation pipeline
#[derive(ClapParser, Debug)]
#[command(name = "hopper")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Path to the schema document (JSON array of event schemas)
    #[arg(short, long)]
    schema: PathBuf,

    /// Path to the event metadata document
    #[arg(short, long)]
    metadata: Option<PathBuf>,

    /// How often to re-read the config documents
    #[arg(long, default_value = "300s", value_parser = humantime::parse_duration)]
    reload_interval: Duration,

    /// Parse workers
    #[arg(long, default_value_t = 4)]
    converters: usize,

    /// Format workers
    #[arg(long, default_value_t = 8)]
    transformers: usize,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(&cli.log_level)?;
    run(cli).await
}

async fn run(cli: Cli) -> Result<()> {
    let stats: Arc<dyn StatsLogger> = Arc::new(NoopStats);
    let geo: Arc<dyn GeoLookup> = Arc::new(NoopGeo);

    let loader_config = LoaderConfig {
        reload_interval: cli.reload_interval,
        retry_delay: Duration::from_secs(2),
    };

    // Initial config load is the one fatal failure mode.
    let schemas = Arc::new(
        DynamicSchemaLoader::new(
            Arc::new(FileFetcher::new(&cli.schema)),
            loader_config.clone(),
            geo,
            None,
            Arc::clone(&stats),
        )
        .await
        .with_context(|| format!("loading schemas from {}", cli.schema.display()))?,
    );

    let metadata: Arc<dyn EventMetadataLoader> = match &cli.metadata {
        Some(path) => Arc::new(
            DynamicMetadataLoader::new(
                Arc::new(FileFetcher::new(path)),
                loader_config,
                Arc::clone(&stats),
            )
            .await
            .with_context(|| format!("loading event metadata from {}", path.display()))?,
        ),
        None => Arc::new(StaticMetadataLoader::default()),
    };

    let transformer = Arc::new(SchemaTransformer::new(
        schemas.clone(),
        metadata,
        Arc::clone(&stats),
    ));

    let multee = Arc::new(Multee::new());
    let stdout_sink: Arc<dyn Sink> = Arc::new(StdoutSink::new());
    multee.add("stdout", stdout_sink).await;

    let mut pool = ProcessorPool::new(
        PoolConfig {
            converters: cli.converters,
            transformers: cli.transformers,
            ..Default::default()
        },
        Arc::new(JsonLineParser::new()),
        transformer,
        multee,
        stats,
    );
    pool.start();

    let mut pipe = StdinPipe::new();
    while let Some(result) = pipe.next().await {
        if let Some(error) = result.error {
            tracing::error!(error = %error, "stdin read error");
            break;
        }
        let record = RawRecord::new(result.data, Utc::now());
        if pool.submit(record).await.is_err() {
            break;
        }
    }
    pipe.close();

    pool.close().await;
    schemas.close();
    tracing::info!("pipeline drained; exiting");
    Ok(())
}

/// Initialize the tracing subscriber for logging
fn init_logging(level: &str) -> Result<()> {
    let filter = EnvFilter::try_new(level)
        .or_else(|_| EnvFilter::try_new("info"))
        .map_err(|e| anyhow::anyhow!("invalid log level: {}", e))?;

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(true).with_writer(std::io::stderr))
        .with(filter)
        .init();

    Ok(())
}
