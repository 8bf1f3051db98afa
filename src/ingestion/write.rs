//! Write functions - persist rollup counters to PostgreSQL

use crate::ingestion::types::{RollupCounter, WriteStats};
use anyhow::Result;
use chrono::NaiveDate;
use sqlx::PgPool;
use tracing::{debug, info, warn};

/// Create the rollup table and its grouping-key constraint if missing
pub async fn ensure_schema(db: &PgPool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS listing_rollups (
            id                  BIGSERIAL PRIMARY KEY,
            report_date         DATE NOT NULL,
            city                TEXT NOT NULL DEFAULT '',
            pincode             TEXT NOT NULL DEFAULT '',
            company             TEXT NOT NULL DEFAULT '',
            client_name         TEXT NOT NULL DEFAULT '',
            brand               TEXT NOT NULL DEFAULT '',
            product_description TEXT NOT NULL DEFAULT '',
            product_id          TEXT NOT NULL DEFAULT '',
            platform            TEXT NOT NULL DEFAULT '',
            category            TEXT NOT NULL DEFAULT '',
            available_count     BIGINT NOT NULL,
            listed_count        BIGINT NOT NULL,
            recognized_count    BIGINT NOT NULL,
            total_count         BIGINT NOT NULL,
            discount_sum        DOUBLE PRECISION NOT NULL DEFAULT 0,
            discount_samples    BIGINT NOT NULL DEFAULT 0,
            mrp_mean            DOUBLE PRECISION NOT NULL DEFAULT 0,
            selling_price_mean  DOUBLE PRECISION NOT NULL DEFAULT 0,
            updated_at          TIMESTAMPTZ NOT NULL DEFAULT NOW(),
            CONSTRAINT listing_rollups_key UNIQUE (
                report_date, city, pincode, company, client_name, brand,
                product_description, product_id, platform, category
            ),
            CONSTRAINT listing_rollups_tiers CHECK (
                available_count <= listed_count
                AND listed_count <= recognized_count
                AND recognized_count <= total_count
            )
        )
        "#,
    )
    .execute(db)
    .await?;

    Ok(())
}

/// Write rollup counters, replacing counters with the same grouping key
pub async fn write_rollups(db: &PgPool, counters: &[RollupCounter]) -> Result<WriteStats> {
    info!("Writing {} rollup counters to database", counters.len());

    let mut stats = WriteStats::default();

    for counter in counters {
        // The table is keyed by report date; undated counters cannot be stored
        let Some(report_date) = counter.key.report_date else {
            stats.skipped += 1;
            continue;
        };

        match upsert_rollup(db, counter, report_date).await {
            Ok(true) => stats.inserted += 1,
            Ok(false) => stats.updated += 1,
            Err(e) => {
                warn!(
                    "Failed to write rollup for {} / {} / {}: {}",
                    counter.key.brand, counter.key.product_id, counter.key.city, e
                );
                stats.errors += 1;
            }
        }
    }

    info!("Write complete: {}", stats);

    Ok(stats)
}

/// Insert or update a single counter.
/// Returns true if inserted, false if updated
async fn upsert_rollup(db: &PgPool, counter: &RollupCounter, report_date: NaiveDate) -> Result<bool> {
    let key = &counter.key;
    let inserted = sqlx::query_scalar::<_, bool>(
        r#"
        INSERT INTO listing_rollups (
            report_date, city, pincode, company, client_name, brand,
            product_description, product_id, platform, category,
            available_count, listed_count, recognized_count, total_count,
            discount_sum, discount_samples, mrp_mean, selling_price_mean
        ) VALUES (
            $1, $2, $3, $4, $5, $6, $7, $8, $9, $10,
            $11, $12, $13, $14, $15, $16, $17, $18
        )
        ON CONFLICT ON CONSTRAINT listing_rollups_key DO UPDATE SET
            available_count = EXCLUDED.available_count,
            listed_count = EXCLUDED.listed_count,
            recognized_count = EXCLUDED.recognized_count,
            total_count = EXCLUDED.total_count,
            discount_sum = EXCLUDED.discount_sum,
            discount_samples = EXCLUDED.discount_samples,
            mrp_mean = EXCLUDED.mrp_mean,
            selling_price_mean = EXCLUDED.selling_price_mean,
            updated_at = NOW()
        RETURNING (xmax = 0) AS inserted
        "#,
    )
    .bind(report_date)
    .bind(&key.city)
    .bind(key.pincode.as_deref().unwrap_or(""))
    .bind(&key.company)
    .bind(&key.client_name)
    .bind(&key.brand)
    .bind(&key.product_description)
    .bind(&key.product_id)
    .bind(&key.platform)
    .bind(&key.category)
    .bind(to_i64(counter.available_count)?)
    .bind(to_i64(counter.listed_count)?)
    .bind(to_i64(counter.recognized_count)?)
    .bind(to_i64(counter.total_count)?)
    .bind(counter.discount_sum)
    .bind(to_i64(counter.discount_samples)?)
    .bind(counter.mrp_mean)
    .bind(counter.selling_price_mean)
    .fetch_one(db)
    .await?;

    debug!(
        "{} rollup {} / {} on {}",
        if inserted { "Inserted" } else { "Updated" },
        key.brand,
        key.product_id,
        report_date
    );

    Ok(inserted)
}

fn to_i64(count: u64) -> Result<i64> {
    i64::try_from(count).map_err(|_| anyhow::anyhow!("count {} exceeds BIGINT range", count))
}
