use anyhow::{Context, Result};
use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use pincode_insights::cache::ResultCache;
use pincode_insights::config::Config;
use pincode_insights::error::EngineError;
use pincode_insights::ingestion::fetch::{fetch_rollups, load_listings};
use pincode_insights::ingestion::rollup::build_rollups;
use pincode_insights::ingestion::{ListingRecord, RollupCounter};
use pincode_insights::metrics::filter::{parse_filter_date, parse_list};
use pincode_insights::metrics::insights::insights_for;
use pincode_insights::metrics::{
    brand_breakdown, city_breakdown, compute_metrics, pincode_breakdown, platform_breakdown,
    rescopable, resolve_own_brand, scope_rollups, time_series, FilterSet, MetricSource, OwnBrand,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::RwLock;
use tower_http::cors::CorsLayer;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

/// Everything the engine reads; replaced wholesale on reload
#[derive(Debug, Default)]
struct Dataset {
    version: u64,
    records: Vec<ListingRecord>,
    rollups: Vec<RollupCounter>,
    dropped_rows: usize,
}

#[derive(Clone)]
struct AppState {
    config: Arc<Config>,
    dataset: Arc<RwLock<Dataset>>,
    cache: Arc<Mutex<ResultCache<Value>>>,
    db: Option<PgPool>,
}

impl AppState {
    fn new(config: Config, dataset: Dataset, db: Option<PgPool>) -> Self {
        let cache = ResultCache::with_capacity(config.cache_capacity);
        AppState {
            config: Arc::new(config),
            dataset: Arc::new(RwLock::new(dataset)),
            cache: Arc::new(Mutex::new(cache)),
            db,
        }
    }

    fn cache(&self) -> Result<MutexGuard<'_, ResultCache<Value>>, ApiError> {
        self.cache
            .lock()
            .map_err(|_| ApiError::Internal("result cache lock poisoned".to_string()))
    }
}

#[derive(Serialize, Deserialize)]
struct ApiResponse {
    message: String,
    status: String,
    version: u64,
    records: usize,
    rollups: usize,
    dropped_rows: usize,
}

/// Filter query parameters; lists are comma-separated
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FilterQuery {
    brands: Option<String>,
    companies: Option<String>,
    products: Option<String>,
    cities: Option<String>,
    platforms: Option<String>,
    pincode: Option<String>,
    from: Option<String>,
    to: Option<String>,
    own_brand: Option<String>,
}

impl FilterQuery {
    fn filter_set(&self) -> Result<FilterSet, EngineError> {
        FilterSet {
            brands: parse_list(self.brands.as_deref()),
            companies: parse_list(self.companies.as_deref()),
            products: parse_list(self.products.as_deref()),
            cities: parse_list(self.cities.as_deref()),
            platforms: parse_list(self.platforms.as_deref()),
            pincode: self.pincode.clone(),
            date_from: parse_filter_date(self.from.as_deref())?,
            date_to: parse_filter_date(self.to.as_deref())?,
        }
        .canonicalize()
    }
}

#[derive(Debug)]
enum ApiError {
    BadRequest(EngineError),
    Internal(String),
}

impl From<EngineError> for ApiError {
    fn from(e: EngineError) -> Self {
        ApiError::BadRequest(e)
    }
}

impl From<serde_json::Error> for ApiError {
    fn from(e: serde_json::Error) -> Self {
        ApiError::Internal(format!("serialization failed: {}", e))
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(e: anyhow::Error) -> Self {
        ApiError::Internal(format!("{:#}", e))
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::BadRequest(e) => (StatusCode::BAD_REQUEST, e.to_string()),
            ApiError::Internal(message) => {
                error!("Request failed: {}", message);
                (StatusCode::INTERNAL_SERVER_ERROR, message)
            }
        };
        (status, Json(json!({ "error": message }))).into_response()
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(false)
        .init();

    info!("Starting pincode insights API server");

    let config = Config::from_env()?;

    let db = match &config.database_url {
        Some(url) => {
            info!("Connecting to database...");
            let pool = PgPoolOptions::new()
                .max_connections(5)
                .connect(url)
                .await
                .context("Failed to connect to database")?;
            info!("Database connected");
            Some(pool)
        }
        None => None,
    };

    let dataset = load_dataset(&config, db.as_ref()).await?;
    let addr = config.bind_addr;
    let app = app(AppState::new(config, dataset, db));

    info!("Server running on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    axum::serve(listener, app).await?;

    Ok(())
}

fn app(state: AppState) -> Router {
    Router::new()
        .route("/", get(health_check))
        .route("/api/health", get(health_check))
        .route("/api/metrics", get(get_metrics))
        .route("/api/metrics/time-series", get(get_time_series))
        .route("/api/metrics/cities", get(get_cities))
        .route("/api/metrics/brands", get(get_brands))
        .route("/api/metrics/platforms", get(get_platforms))
        .route("/api/metrics/pincodes", get(get_pincodes))
        .route("/api/insights", get(get_insights))
        .route("/api/rollup/metrics", get(get_rollup_metrics))
        .route("/api/reload", post(reload))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Load listings from the configured source, then rollups from the database.
/// Without stored rollups the counters are built from the loaded listings.
async fn load_dataset(config: &Config, db: Option<&PgPool>) -> Result<Dataset> {
    let normalized = load_listings(config, db).await?;

    let stored = match db {
        Some(db) => match fetch_rollups(db).await {
            Ok(decoded) => decoded.counters,
            Err(e) => {
                warn!("Could not fetch stored rollups, building from listings: {:#}", e);
                Vec::new()
            }
        },
        None => Vec::new(),
    };
    let rollups = if stored.is_empty() {
        build_rollups(&normalized.records)
    } else {
        stored
    };

    info!(
        "Dataset loaded: {} records ({} rows dropped), {} rollup counters",
        normalized.records.len(),
        normalized.dropped,
        rollups.len()
    );

    Ok(Dataset {
        version: 0,
        records: normalized.records,
        rollups,
        dropped_rows: normalized.dropped,
    })
}

async fn health_check(State(state): State<AppState>) -> Json<ApiResponse> {
    let dataset = state.dataset.read().await;
    Json(ApiResponse {
        message: "Pincode insights API is running".to_string(),
        status: "ok".to_string(),
        version: dataset.version,
        records: dataset.records.len(),
        rollups: dataset.rollups.len(),
        dropped_rows: dataset.dropped_rows,
    })
}

/// Scope the dataset, resolve the own brand against what is left and compute.
/// Results are memoized per dataset version and canonical filter key.
async fn cached<T, F>(
    state: &AppState,
    endpoint: &str,
    query: &FilterQuery,
    scope: fn(&Dataset, &FilterSet) -> Result<Vec<T>, EngineError>,
    compute: F,
) -> Result<Json<Value>, ApiError>
where
    T: MetricSource,
    F: FnOnce(&[T], Option<&OwnBrand>) -> Result<Value, ApiError>,
{
    let filter = query.filter_set()?;
    let explicit = query
        .own_brand
        .as_deref()
        .or(state.config.own_brand.as_deref());

    let key = format!(
        "{}|{}|own={}",
        endpoint,
        filter.canonical_key(),
        explicit.map(str::trim).unwrap_or("")
    );

    let dataset = state.dataset.read().await;
    let hit = state.cache()?.get(dataset.version, &key);
    if let Some(value) = hit {
        return Ok(Json(value));
    }

    // The cache lock is not held while computing; a concurrent miss on the
    // same key computes the same value
    let items = scope(&dataset, &filter)?;
    let own = resolve_own_brand(explicit, &items)?;
    let value = compute(&items, own.as_ref())?;

    state.cache()?.insert(dataset.version, key, value.clone());
    Ok(Json(value))
}

fn records(dataset: &Dataset, filter: &FilterSet) -> Result<Vec<ListingRecord>, EngineError> {
    Ok(filter.apply(&dataset.records))
}

fn rollups(dataset: &Dataset, filter: &FilterSet) -> Result<Vec<RollupCounter>, EngineError> {
    scope_rollups(&dataset.rollups, filter)
}

async fn get_metrics(
    State(state): State<AppState>,
    Query(query): Query<FilterQuery>,
) -> Result<Json<Value>, ApiError> {
    cached(&state, "metrics", &query, records, |items, own| {
        Ok(serde_json::to_value(compute_metrics(items, own))?)
    })
    .await
}

async fn get_time_series(
    State(state): State<AppState>,
    Query(query): Query<FilterQuery>,
) -> Result<Json<Value>, ApiError> {
    cached(&state, "time-series", &query, records, |items, _| {
        Ok(serde_json::to_value(time_series(items))?)
    })
    .await
}

async fn get_cities(
    State(state): State<AppState>,
    Query(query): Query<FilterQuery>,
) -> Result<Json<Value>, ApiError> {
    cached(&state, "cities", &query, records, |items, _| {
        Ok(serde_json::to_value(city_breakdown(items))?)
    })
    .await
}

async fn get_brands(
    State(state): State<AppState>,
    Query(query): Query<FilterQuery>,
) -> Result<Json<Value>, ApiError> {
    cached(&state, "brands", &query, records, |items, _| {
        Ok(serde_json::to_value(brand_breakdown(items))?)
    })
    .await
}

async fn get_platforms(
    State(state): State<AppState>,
    Query(query): Query<FilterQuery>,
) -> Result<Json<Value>, ApiError> {
    cached(&state, "platforms", &query, records, |items, _| {
        Ok(serde_json::to_value(platform_breakdown(items))?)
    })
    .await
}

async fn get_pincodes(
    State(state): State<AppState>,
    Query(query): Query<FilterQuery>,
) -> Result<Json<Value>, ApiError> {
    cached(&state, "pincodes", &query, records, |items, _| {
        Ok(serde_json::to_value(pincode_breakdown(items))?)
    })
    .await
}

async fn get_insights(
    State(state): State<AppState>,
    Query(query): Query<FilterQuery>,
) -> Result<Json<Value>, ApiError> {
    cached(&state, "insights", &query, records, |items, own| {
        Ok(serde_json::to_value(insights_for(items, own))?)
    })
    .await
}

async fn get_rollup_metrics(
    State(state): State<AppState>,
    Query(query): Query<FilterQuery>,
) -> Result<Json<Value>, ApiError> {
    cached(&state, "rollup-metrics", &query, rollups, |items, own| {
        // Counters classified upstream cannot be split into own and
        // competitor scopes
        let own = if rescopable(items) { own } else { None };
        Ok(serde_json::to_value(compute_metrics(items, own))?)
    })
    .await
}

/// Reload listings and rollups, then bump the dataset version so every
/// cached result is dropped on next use
async fn reload(State(state): State<AppState>) -> Result<Json<ApiResponse>, ApiError> {
    let fresh = load_dataset(&state.config, state.db.as_ref()).await?;

    let mut dataset = state.dataset.write().await;
    let version = dataset.version + 1;
    *dataset = Dataset { version, ..fresh };

    info!("Dataset reloaded as version {}", version);

    Ok(Json(ApiResponse {
        message: "Dataset reloaded".to_string(),
        status: "ok".to_string(),
        version,
        records: dataset.records.len(),
        rollups: dataset.rollups.len(),
        dropped_rows: dataset.dropped_rows,
    }))
}
