//! Data ingestion orchestrator - runs the parse, rollup, reconcile, write pipeline

use anyhow::{bail, Context, Result};
use pincode_insights::config::Config;
use pincode_insights::ingestion::rollup::build_rollups;
use pincode_insights::ingestion::{parse, write, WriteStats};
use pincode_insights::metrics::check_consistency;
use sqlx::PgPool;
use std::env;
use std::path::PathBuf;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(false)
        .with_thread_ids(false)
        .with_level(true)
        .init();

    info!("Starting rollup ingestion pipeline");

    let config = Config::from_env()?;
    info!("Configuration loaded");

    // Exports to process: command line args, or LISTINGS_CSV
    let args: Vec<String> = env::args().collect();
    let sources: Vec<PathBuf> = if args.len() > 1 {
        args[1..].iter().map(PathBuf::from).collect()
    } else {
        config.listings_csv.iter().cloned().collect()
    };

    if sources.is_empty() {
        bail!("No listing exports given; pass CSV paths or set LISTINGS_CSV");
    }

    let stats = run_rollups(&config, &sources).await?;
    match stats {
        Some(stats) => info!("✓ Rollup ingestion completed: {}", stats),
        None => info!("✓ Rollup ingestion completed (nothing written)"),
    }

    Ok(())
}

/// Run the rollup pipeline over every export as one batch
async fn run_rollups(config: &Config, sources: &[PathBuf]) -> Result<Option<WriteStats>> {
    info!("=== Listing Rollup Pipeline ===");

    // Step 1: Parse exports into ListingRecord structs. A missing export
    // aborts the run rather than rolling up a partial batch.
    info!("Step 1/4: Parsing {} export(s)...", sources.len());
    let normalized = match parse::parse_listings_files(sources, config.date_policy) {
        Ok(normalized) => normalized,
        Err(e) => {
            error!("✗ Parsing failed: {:#}", e);
            return Err(e.context("Export parsing failed, nothing written"));
        }
    };
    let records = normalized.records;
    info!("✓ Parsed {} records ({} rows dropped)", records.len(), normalized.dropped);

    // Limit to first N records for testing (optional)
    let records = if config.limit_records > 0 {
        let limit = config.limit_records.min(records.len());
        warn!("Limiting to first {} records (testing mode)", limit);
        records.into_iter().take(limit).collect()
    } else {
        records
    };

    // Step 2: Build counters
    info!("Step 2/4: Building rollups...");
    let counters = build_rollups(&records);
    info!("✓ Built {} rollup counters", counters.len());

    // Step 3: Reconcile against the raw rows before anything is written
    info!("Step 3/4: Checking consistency...");
    let report = check_consistency(&records, &counters, config.reconcile_tolerance);
    if !report.is_consistent() {
        for drift in &report.drifts {
            error!(
                "{}: raw {:.3} vs rollup {:.3} (difference {:.3})",
                drift.metric, drift.raw, drift.rollup, drift.difference
            );
        }
        bail!(
            "Rollups diverge from raw rows by {:.3} points (tolerance {})",
            report.max_difference(),
            config.reconcile_tolerance
        );
    }
    info!("✓ Consistent within {}", config.reconcile_tolerance);

    // Step 4: Write to database
    let Some(url) = &config.database_url else {
        warn!("Step 4/4: DATABASE_URL not set, skipping write");
        return Ok(None);
    };

    info!("Step 4/4: Writing to database...");
    let db = PgPool::connect(url)
        .await
        .context("Failed to connect to database")?;
    write::ensure_schema(&db).await?;
    let stats = write::write_rollups(&db, &counters).await?;
    info!("✓ Write complete");

    Ok(Some(stats))
}
