use std::sync::Arc;

use clap::Parser;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use tide_tracker_service::calibrate::Calibrator;
use tide_tracker_service::config::Config;
use tide_tracker_service::fetcher::TideTableFetcher;
use tide_tracker_service::pipeline::{CycleOutcome, ReconcilePipeline};
use tide_tracker_service::scheduler;
use tide_tracker_service::store::SeriesStore;

#[derive(Parser)]
#[command(name = "tide-tracker-service")]
#[command(about = "Tracks the Lagoa dos Patos level from the pilots' tide table", long_about = None)]
struct Cli {
    /// Run a single reconciliation cycle and exit
    #[arg(long)]
    once: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing with environment filter support
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,tide_tracker_service=debug")),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(true)
                .with_thread_ids(true)
                .with_line_number(true),
        )
        .init();

    // Load environment variables
    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    let config = Config::from_env()?;
    info!("Starting tide tracker service with config: {:?}", config);

    let fetcher = TideTableFetcher::new(config.tide_table_url.clone());
    let store = SeriesStore::new(config.data_path.clone());
    let calibrator = Calibrator::new(config.calibration_offset_m);
    let pipeline = Arc::new(ReconcilePipeline::new(fetcher, store, calibrator));

    if cli.once {
        match pipeline.run_cycle().await? {
            CycleOutcome::Merged {
                fetched,
                inserted,
                updated,
                total,
            } => info!(
                "Cycle done: {} rows fetched, {} inserted, {} updated, {} in series",
                fetched, inserted, updated, total
            ),
            CycleOutcome::NoData => info!("Cycle ended without data; series left untouched"),
        }
        return Ok(());
    }

    info!("Starting fetch scheduler");
    scheduler::start_fetch_scheduler(pipeline, config.fetch_interval_minutes).await;

    Ok(())
}
