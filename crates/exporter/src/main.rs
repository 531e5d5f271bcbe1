//! FinOps exporter - cloud database cost metrics and rightsizing advisor
//!
//! Publishes current and forecast monthly costs of every managed database
//! instance and cache cluster across member accounts as Prometheus gauges,
//! and posts weekly rightsizing recommendations to a chat webhook.

use anyhow::{Context, Result};
use clap::Parser;
use exporter_lib::{
    catalog::CatalogHandle,
    collector::ExportDirectory,
    health::HealthRegistry,
    observability::{ExporterMetrics, StructuredLogger},
    pipeline::{load_catalogs, ChatNotifier, Pipeline},
};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

mod api;
mod config;
mod mattermost;
mod scheduler;

const EXPORTER_VERSION: &str = env!("CARGO_PKG_VERSION");

#[derive(Parser, Debug)]
#[command(name = "finops-exporter", version, about = "Cloud database cost exporter")]
struct Args {
    /// File listing the member account ids, one per line
    account_file: PathBuf,

    /// Optional configuration file (FINOPS_* environment variables override it)
    #[arg(short, long, env = "FINOPS_CONFIG")]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(fmt::layer().json())
        .init();

    let args = Args::parse();
    info!("Starting finops-exporter");

    let config = config::ExporterConfig::load(args.config.as_deref())?;
    let accounts = config::read_account_ids(&args.account_file)?;
    info!(
        accounts = accounts.len(),
        export_dir = %config.export_dir.display(),
        "Exporter configured"
    );

    let health_registry = HealthRegistry::new();

    let metrics = ExporterMetrics::new();
    let logger = StructuredLogger::new("finops-exporter");
    logger.log_startup(EXPORTER_VERSION, accounts.len(), config.discount);

    let app_state = Arc::new(api::AppState::new(health_registry.clone(), metrics.clone()));
    let api_handle = tokio::spawn(api::serve(config.api_port, app_state));

    // Without an initial catalog there is nothing to price against
    let export = Arc::new(ExportDirectory::new(&config.export_dir));
    let catalog_settings = config.catalog_settings();
    let initial = load_catalogs(export.as_ref(), &catalog_settings, &metrics, &logger)
        .await
        .context("Failed to build the initial price catalog")?;
    health_registry
        .catalog_loaded(initial.built_at.unwrap_or_else(chrono::Utc::now))
        .await;
    let catalogs = Arc::new(CatalogHandle::new(initial));

    let notifier: Arc<dyn ChatNotifier> = match &config.webhook_url {
        Some(url) => Arc::new(mattermost::MattermostNotifier::new(
            url.clone(),
            Duration::from_secs(config.webhook_timeout_secs),
        )?),
        None => {
            warn!("No webhook configured, recommendations will only be logged");
            Arc::new(mattermost::LogNotifier)
        }
    };

    let pipeline = Pipeline::new(
        export.clone(),
        catalogs,
        config.pipeline_settings(),
        metrics.clone(),
        logger.clone(),
    );

    let runner = Arc::new(scheduler::JobRunner {
        pipeline,
        accounts,
        metrics,
        notifier,
        price_source: export,
        catalog_settings,
        health: health_registry,
        logger: logger.clone(),
    });

    let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
    let scheduler_handle = tokio::spawn(scheduler::run(runner, shutdown_rx));

    tokio::select! {
        result = tokio::signal::ctrl_c() => {
            result?;
            logger.log_shutdown("SIGINT received");
        }
        result = api_handle => {
            logger.log_shutdown("API server stopped");
            result??;
        }
    }

    let _ = shutdown_tx.send(());
    let _ = scheduler_handle.await;
    info!("Shutting down");

    Ok(())
}
