//! Fetch functions - retrieve raw listing rows and rollup counters from storage

use crate::config::Config;
use crate::ingestion::parse::{normalize_rows, parse_listings_file};
use crate::ingestion::rollup::{counter_from_row, DecodedRollups};
use crate::ingestion::types::{Normalized, RawListingRow, RollupRow};
use anyhow::Result;
use sqlx::PgPool;
use tracing::{info, warn};

/// Fetch every raw listing row from the listings table
pub async fn fetch_listing_rows(db: &PgPool) -> Result<Vec<RawListingRow>> {
    let rows = sqlx::query_as::<_, RawListingRow>(
        r#"
        SELECT
            report_date, product_id, sku_id, brand, company, client_name,
            product_description, category, city, pincode, platform,
            mrp::text AS mrp, selling_price::text AS selling_price,
            discount::text AS discount, availability
        FROM listings
        "#,
    )
    .fetch_all(db)
    .await?;

    info!("Fetched {} listing rows", rows.len());
    Ok(rows)
}

/// Fetch rollup counters, dropping rows that break the tier ordering
pub async fn fetch_rollups(db: &PgPool) -> Result<DecodedRollups> {
    let rows = sqlx::query_as::<_, RollupRow>(
        r#"
        SELECT
            report_date, city, pincode, company, client_name, brand,
            product_description, product_id, platform, category,
            available_count, listed_count, recognized_count, total_count,
            discount_sum, discount_samples, mrp_mean, selling_price_mean
        FROM listing_rollups
        "#,
    )
    .fetch_all(db)
    .await?;

    let mut decoded = DecodedRollups::default();
    for row in rows {
        match counter_from_row(row) {
            Ok(counter) => decoded.counters.push(counter),
            Err(e) => {
                decoded.dropped += 1;
                warn!("Dropping stored rollup: {}", e);
            }
        }
    }

    info!(
        "Fetched {} rollup counters ({} dropped)",
        decoded.counters.len(),
        decoded.dropped
    );
    Ok(decoded)
}

/// Load and normalize listings from the configured source.
/// A CSV export takes precedence over the database; with neither, the
/// dataset is empty.
pub async fn load_listings(config: &Config, db: Option<&PgPool>) -> Result<Normalized> {
    if let Some(path) = &config.listings_csv {
        return parse_listings_file(path, config.date_policy);
    }

    match db {
        Some(db) => {
            let rows = fetch_listing_rows(db).await?;
            Ok(normalize_rows(rows, config.date_policy))
        }
        None => {
            warn!("Neither LISTINGS_CSV nor DATABASE_URL is set; starting with no listings");
            Ok(Normalized::default())
        }
    }
}
