//! Vitals Pipeline - scheduled refresh entrypoint

use anyhow::Result;
use clap::Parser;
use std::sync::Arc;
use tracing::info;
use vitals_common::logging::{init_logging, LogConfig, LogLevel};
use vitals_pipeline::config::PublishConfig;
use vitals_pipeline::notify::{CacheInvalidator, CloudFrontInvalidator, RecordingInvalidator};
use vitals_pipeline::pipeline::Pipeline;
use vitals_pipeline::regions;
use vitals_pipeline::storage::{S3Store, StorageConfig};

#[derive(Parser, Debug)]
#[command(name = "vitals-pipeline")]
#[command(author, version, about = "Refresh state public-health statistics")]
struct Cli {
    /// Fetch and parse everything but write nothing
    #[arg(long)]
    debug: bool,

    /// Republish even when source timestamps are unchanged
    #[arg(long)]
    force_refresh: bool,

    /// Regions to refresh (by slug); all regions when omitted
    #[arg(short, long)]
    region: Vec<String>,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut log_config = LogConfig::from_env()?;
    if cli.verbose {
        log_config.level = LogLevel::Debug;
    }
    init_logging(&log_config)?;

    let publish = PublishConfig::from_env()?;
    let storage = StorageConfig::from_env()?;
    let store = Arc::new(S3Store::new(storage));

    let invalidator: Arc<dyn CacheInvalidator> = match &publish.distribution_id {
        Some(distribution_id) => {
            let aws_config = aws_config::load_defaults(aws_config::BehaviorVersion::latest()).await;
            Arc::new(CloudFrontInvalidator::new(
                aws_sdk_cloudfront::Client::new(&aws_config),
                distribution_id.clone(),
            ))
        },
        None => {
            info!("No CloudFront distribution configured; invalidations are recorded only");
            Arc::new(RecordingInvalidator::new())
        },
    };

    let pipeline = Pipeline::builder()
        .store(store)
        .invalidator(invalidator)
        .publish(publish)
        .debug(cli.debug)
        .force_refresh(cli.force_refresh)
        .build()?;

    let mut selected = regions::all();
    if !cli.region.is_empty() {
        selected.retain(|r| cli.region.iter().any(|s| s == r.slug));
        if selected.is_empty() {
            anyhow::bail!("no known region matches {:?}", cli.region);
        }
    }

    let summary = pipeline.run(&selected).await?;
    info!(
        regions = summary.regions_run,
        updated = summary.regions_updated,
        "Refresh complete"
    );
    Ok(())
}
