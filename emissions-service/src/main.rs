use anyhow::Result;
use emissions_service::{
    config::AppConfig,
    metrics_export,
    observability,
    pipeline::{EmissionsPipeline, RunStatus},
};
use std::env;

#[tokio::main]
async fn main() -> Result<()> {
    observability::init_tracing();

    // Load configuration (EMISSIONS_CONFIG points at the TOML file).
    let mut cfg = AppConfig::load()?;

    // Optional positional argument overrides the accounting log path.
    if let Some(path) = env::args().nth(1) {
        cfg.accounting.path = path;
    }

    if cfg.metrics.is_some() {
        metrics_export::init()?;
    }

    let pipeline = EmissionsPipeline::from_config(&cfg)?;
    let report = pipeline.run().await?;

    if !report.dropped.is_empty() {
        println!("Skipped {} malformed accounting rows", report.dropped.len());
    }
    for failure in &report.failed_chunks {
        println!("API error: {}", failure.error);
    }

    match report.status {
        RunStatus::Completed => {
            println!("\n{}", report.summary);
            println!("\nResults saved to: {}", cfg.output.path);
        }
        RunStatus::NoRecords => {
            println!("No valid job records found in {}", cfg.accounting.path);
        }
        RunStatus::NoCarbonData => {
            println!("No carbon intensity data retrieved; emissions could not be computed");
            println!("\n{}", report.summary);
        }
    }

    if let Some(metrics_cfg) = &cfg.metrics {
        metrics_export::write_textfile(&metrics_cfg.textfile_path)?;
    }

    Ok(())
}
