//! Geocodes every home and comp that is still missing coordinates.
//!
//! Run after a bulk import so the first map request does not pay for the
//! geocoding calls.

use std::sync::Arc;

use hawthorn_map_api::aggregation::{AggregationPipeline, PipelineSettings};
use hawthorn_map_api::config::Config;
use hawthorn_map_api::db::Database;
use hawthorn_map_api::db_storage::PgRecordStore;
use hawthorn_map_api::services::GoogleGeocoder;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt::init();

    let config = Config::from_env()?;
    let db = Database::new(&config.database_url).await?;
    tracing::info!("Connected to database. Starting coordinate backfill...");

    let pipeline = AggregationPipeline::new(
        Arc::new(PgRecordStore::new(db.pool.clone())),
        Arc::new(GoogleGeocoder::new(&config)?),
        PipelineSettings::from(&config),
    );

    let summary = pipeline.backfill_missing().await?;

    tracing::info!(
        "Backfill complete. Attempted {}, resolved {}, failed {}.",
        summary.attempted,
        summary.resolved,
        summary.failed
    );
    println!("{}", serde_json::to_string_pretty(&summary)?);

    Ok(())
}
