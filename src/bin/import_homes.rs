//! Bulk-imports legacy home documents from a JSON array file.
//!
//! Usage: `import_homes <homes.json>`
//!
//! Each document uses the same camelCase fields and validation as
//! `POST /sold-homes` and may also carry `lat`/`lng`. A complete coordinate
//! pair is kept so those homes are never sent to the geocoder. Documents that
//! fail validation, including unparsable dates, are reported and skipped.
//! Only the database is needed; geocoding happens later in
//! `backfill_coordinates` or on the first map request.

use anyhow::Context;

use hawthorn_map_api::config::database_url_from_env;
use hawthorn_map_api::db::Database;
use hawthorn_map_api::db_storage::{PgRecordStore, RecordStore};
use hawthorn_map_api::models::HomeInput;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt::init();

    let path = std::env::args()
        .nth(1)
        .ok_or_else(|| anyhow::anyhow!("usage: import_homes <homes.json>"))?;

    let db = Database::new(&database_url_from_env()?).await?;
    let store = PgRecordStore::new(db.pool.clone());
    tracing::info!("Connected to database");

    let content =
        std::fs::read_to_string(&path).with_context(|| format!("Failed to read {}", path))?;
    let documents: Vec<HomeInput> = serde_json::from_str(&content)
        .with_context(|| format!("{} must contain a JSON array of homes", path))?;

    let total = documents.len();
    if total == 0 {
        println!("No homes found in {}", path);
        return Ok(());
    }

    println!("Importing {} homes from {}\n", total, path);

    let mut success_count = 0;
    let mut fail_count = 0;

    for (idx, document) in documents.into_iter().enumerate() {
        let imported = match document.into_imported_home() {
            Ok(home) => store.insert_home(home).await,
            Err(e) => Err(e),
        };

        match imported {
            Ok(home) => {
                let located = if home.coordinates.is_some() {
                    "with coordinates"
                } else {
                    "needs geocoding"
                };
                println!("[{}/{}] ✓ {} ({})", idx + 1, total, home.address, located);
                success_count += 1;
            }
            Err(e) => {
                println!("[{}/{}] ✗ {}", idx + 1, total, e);
                fail_count += 1;
            }
        }
    }

    println!("\n=== Import Complete ===");
    println!("Total homes: {}", total);
    println!("✓ Success: {}", success_count);
    println!("✗ Failed: {}", fail_count);
    println!(
        "Success rate: {:.1}%",
        (success_count as f64 / total as f64) * 100.0
    );

    Ok(())
}
