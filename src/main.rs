//! Harvest CLI
//!
//! Runs one harvest cycle for the source described in a settings file,
//! against in-memory tracking and catalogue stores.

use std::path::PathBuf;
use std::process;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tracing::{info, warn};
use tracing_subscriber::{fmt, EnvFilter};

use opendata_harvester::client::HttpFetcher;
use opendata_harvester::config::{HarvesterConfig, Settings};
use opendata_harvester::executor::HarvesterExecutor;
use opendata_harvester::harvest::memory::{MemoryCatalog, MemoryTrackingStore};
use opendata_harvester::harvest::pipeline::HarvestPipeline;
use opendata_harvester::harvest::sources::source_for;
use opendata_harvester::harvest::traits::{HarvestJob, SourceInfo};

#[derive(Parser, Debug)]
#[command(name = "harvest", version, about = "Harvest an open-data source into the catalogue")]
struct Cli {
    /// Path to the TOML settings file
    #[arg(short, long)]
    settings: PathBuf,

    /// Enable debug logging
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    if let Err(e) = run(cli).await {
        eprintln!("Error: {:#}", e);
        process::exit(1);
    }
}

fn init_logging(verbose: bool) {
    let level = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("opendata_harvester={},harvest={}", level, level)));
    fmt().with_env_filter(filter).with_target(false).init();
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    info!("Harvest v{} starting", env!("CARGO_PKG_VERSION"));

    let settings = Settings::load(&cli.settings)
        .with_context(|| format!("loading settings from {}", cli.settings.display()))?;
    let config = HarvesterConfig::parse(settings.source.config.as_deref())
        .context("invalid harvester configuration")?;

    let fetcher = Arc::new(HttpFetcher::new(&settings.http.user_agent)?);
    let source = source_for(settings.source.kind, fetcher, settings.http.dataset_limit);
    let pipeline = HarvestPipeline::new(source, MemoryTrackingStore::new(), MemoryCatalog::new());

    let job = HarvestJob::new(SourceInfo {
        id: settings.source.id.clone(),
        name: settings.source.name.clone(),
        url: settings.source.url.clone(),
        config,
        owner_org: settings.source.owner_org.clone(),
    });

    let report = HarvesterExecutor::new(1).execute(&pipeline, &job).await?;
    let stats = &report.stats;
    println!(
        "{}: {} queued, {} added, {} updated, {} deleted, {} unchanged, {} failed",
        settings.source.name,
        report.queued,
        stats.added,
        stats.updated,
        stats.deleted,
        stats.unchanged,
        stats.failed
    );
    if report.is_partial() {
        warn!("Harvest finished with {} failed items", report.failures.len());
    }
    Ok(())
}
