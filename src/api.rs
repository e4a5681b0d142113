use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use serde_json::json;
use tokio::net::TcpListener;
use tracing::{error, info};

use crate::curator::Curator;
use crate::data::batch::{Batch, Row};
use crate::data::types::{BarInterval, HistoryPeriod};
use crate::error::{CuratorError, CuratorResult};
use crate::services::importer::DataType;

pub type AppState = Arc<Curator>;

const DEFAULT_OHLCV_LIMIT: usize = 100;
const DEFAULT_NEWS_LIMIT: usize = 20;

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/stats", get(stats))
        .route("/quote/{ticker}", get(get_quote))
        .route("/quote/{ticker}/refresh", post(refresh_quote))
        .route("/watchlist", get(list_watchlist).post(add_many))
        .route("/watchlist/{ticker}", post(add_ticker).delete(remove_ticker))
        .route("/worker/start", post(start_worker))
        .route("/worker/stop", post(stop_worker))
        .route("/sources/{name}", get(source_health))
        .route("/ohlcv/{ticker}", get(get_ohlcv))
        .route("/backfill/{ticker}", post(backfill))
        .route("/news", get(get_news))
        .route("/import", post(import))
        .with_state(state)
}

/// Serves until `shutdown` resolves.
pub async fn run_server<F>(state: AppState, listener: TcpListener, shutdown: F) -> CuratorResult<()>
where
    F: std::future::Future<Output = ()> + Send + 'static,
{
    if let Ok(addr) = listener.local_addr() {
        info!("🌐 API Server listening on {}", addr);
    }
    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown)
        .await?;
    Ok(())
}

fn error_response(e: CuratorError) -> Response {
    let status = match &e {
        CuratorError::SourceUnavailable { .. } => StatusCode::BAD_GATEWAY,
        CuratorError::Validation(_) => StatusCode::BAD_REQUEST,
        CuratorError::Persist(_) => StatusCode::SERVICE_UNAVAILABLE,
        CuratorError::Configuration(_) => StatusCode::UNPROCESSABLE_ENTITY,
    };
    if status.is_server_error() {
        error!("❌ [API] {}", e);
    }
    (status, Json(json!({ "error": e.to_string() }))).into_response()
}

fn respond<T: serde::Serialize>(result: CuratorResult<T>) -> Response {
    match result {
        Ok(body) => Json(body).into_response(),
        Err(e) => error_response(e),
    }
}

async fn health(State(curator): State<AppState>) -> impl IntoResponse {
    let report = curator.health().await;
    let status = if report.healthy {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (status, Json(report))
}

async fn stats(State(curator): State<AppState>) -> impl IntoResponse {
    Json(curator.stats_snapshot())
}

async fn get_quote(State(curator): State<AppState>, Path(ticker): Path<String>) -> Response {
    respond(curator.get_quote(&ticker).await)
}

async fn refresh_quote(State(curator): State<AppState>, Path(ticker): Path<String>) -> Response {
    respond(curator.refresh_quote(&ticker).await)
}

async fn list_watchlist(State(curator): State<AppState>) -> impl IntoResponse {
    Json(json!({ "watchlist": curator.watchlist() }))
}

#[derive(Deserialize)]
struct TickersBody {
    tickers: Vec<String>,
}

async fn add_many(State(curator): State<AppState>, Json(body): Json<TickersBody>) -> impl IntoResponse {
    let added: Vec<&String> = body.tickers.iter().filter(|t| curator.watch(t)).collect();
    Json(json!({ "added": added, "watchlist": curator.watchlist() }))
}

async fn add_ticker(State(curator): State<AppState>, Path(ticker): Path<String>) -> impl IntoResponse {
    let added = curator.watch(&ticker);
    Json(json!({ "added": added, "watchlist": curator.watchlist() }))
}

async fn remove_ticker(State(curator): State<AppState>, Path(ticker): Path<String>) -> impl IntoResponse {
    let removed = curator.unwatch(&ticker);
    Json(json!({ "removed": removed, "watchlist": curator.watchlist() }))
}

#[derive(Deserialize)]
struct StartParams {
    interval_secs: Option<u64>,
}

async fn start_worker(State(curator): State<AppState>, Query(params): Query<StartParams>) -> impl IntoResponse {
    let started = match params.interval_secs {
        Some(secs) => curator.start_worker_with(Duration::from_secs(secs)),
        None => curator.start_worker(),
    };
    Json(json!({ "started": started, "state": curator.worker_state() }))
}

async fn stop_worker(State(curator): State<AppState>) -> impl IntoResponse {
    let stopped = curator.stop_worker().await;
    Json(json!({ "stopped": stopped, "state": curator.worker_state() }))
}

async fn source_health(State(curator): State<AppState>, Path(name): Path<String>) -> Response {
    match curator.source_health(&name) {
        Some(record) => Json(record).into_response(),
        None => (
            StatusCode::NOT_FOUND,
            Json(json!({ "error": format!("unknown source '{}'", name) })),
        )
            .into_response(),
    }
}

#[derive(Deserialize)]
struct OhlcvParams {
    interval: Option<String>,
    limit: Option<usize>,
}

async fn get_ohlcv(
    State(curator): State<AppState>,
    Path(ticker): Path<String>,
    Query(params): Query<OhlcvParams>,
) -> Response {
    let interval = match params.interval.as_deref().map(str::parse::<BarInterval>) {
        None => BarInterval::Day1,
        Some(Ok(i)) => i,
        Some(Err(e)) => return error_response(e),
    };
    let limit = params.limit.unwrap_or(DEFAULT_OHLCV_LIMIT);
    respond(curator.get_ohlcv(&ticker, interval, limit).await)
}

#[derive(Deserialize)]
struct BackfillParams {
    period: Option<String>,
    interval: Option<String>,
}

async fn backfill(
    State(curator): State<AppState>,
    Path(ticker): Path<String>,
    Query(params): Query<BackfillParams>,
) -> Response {
    let period = match params.period.as_deref().map(str::parse::<HistoryPeriod>) {
        None => HistoryPeriod::Month1,
        Some(Ok(p)) => p,
        Some(Err(e)) => return error_response(e),
    };
    let interval = match params.interval.as_deref().map(str::parse::<BarInterval>) {
        None => BarInterval::Day1,
        Some(Ok(i)) => i,
        Some(Err(e)) => return error_response(e),
    };
    match curator.fetch_historical(&ticker, period, interval).await {
        Ok(bars) => Json(json!({ "ticker": ticker.to_uppercase(), "bars": bars.len() })).into_response(),
        Err(e) => error_response(e),
    }
}

#[derive(Deserialize)]
struct NewsParams {
    ticker: Option<String>,
    limit: Option<usize>,
    /// Fetch from the sources instead of reading the store
    #[serde(default)]
    refresh: bool,
}

async fn get_news(State(curator): State<AppState>, Query(params): Query<NewsParams>) -> Response {
    let limit = params.limit.unwrap_or(DEFAULT_NEWS_LIMIT);
    let ticker = params.ticker.as_deref();
    if params.refresh {
        respond(curator.fetch_news(ticker, limit).await)
    } else {
        respond(curator.recent_news(ticker, limit).await)
    }
}

#[derive(Deserialize)]
struct ImportBody {
    #[serde(default)]
    data_type: Option<String>,
    /// Inline rows; when absent, files under `prefix` in the batch dir are imported
    rows: Option<Vec<Row>>,
    name: Option<String>,
    #[serde(default)]
    prefix: String,
}

async fn import(State(curator): State<AppState>, Json(body): Json<ImportBody>) -> Response {
    let declared = match body.data_type.as_deref().map(str::parse::<DataType>) {
        None => DataType::Auto,
        Some(Ok(t)) => t,
        Some(Err(e)) => return error_response(e),
    };
    match body.rows {
        Some(rows) => {
            let batch = Batch::new(body.name.unwrap_or_else(|| "inline".to_string()), rows);
            respond(curator.import_batch(&batch, declared).await)
        }
        None => respond(curator.import_from_batch_dir(&body.prefix, declared).await),
    }
}
