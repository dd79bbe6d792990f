//! REST API handlers
//!
//! This module defines the metadata, data, health and metrics routes.

use std::collections::HashSet;
use std::time::Instant;

use axum::{
    extract::{MatchedPath, Path, RawQuery, Request, State},
    http::{header, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use chrono::{DateTime, TimeZone, Utc};
use serde::Serialize;

use crate::finder::Finder;
use crate::metrics;
use crate::models::{BgpDump, Collector, DumpKind};
use crate::query::Query;

use super::AppState;

// ============================================================================
// API Response Types
// ============================================================================

/// Error body returned with every non-2xx status
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub success: bool,
    pub error: String,
}

impl ErrorResponse {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            success: false,
            error: message.into(),
        }
    }
}

fn error_response(status: StatusCode, message: impl Into<String>) -> Response {
    (status, Json(ErrorResponse::new(message))).into_response()
}

/// Health check response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub uptime_secs: u64,
}

// ============================================================================
// API Routes
// ============================================================================

/// Create the API router
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/meta/projects", get(list_projects))
        .route("/meta/projects/{project}", get(get_project))
        .route("/meta/collectors", get(list_collectors))
        .route("/meta/collectors/{collector}", get(get_collector))
        .route("/data", get(get_data))
        .route("/health", get(health_check))
        .route("/metrics", get(prometheus_metrics))
        .route_layer(middleware::from_fn(track_requests))
        .with_state(state)
}

async fn track_requests(request: Request, next: Next) -> Response {
    let route = request
        .extensions()
        .get::<MatchedPath>()
        .map(|p| p.as_str().to_owned())
        .unwrap_or_else(|| "unmatched".to_owned());
    let started = Instant::now();
    let response = next.run(request).await;
    metrics::record_api_request(
        &route,
        response.status().as_u16(),
        started.elapsed().as_secs_f64(),
    );
    response
}

// ============================================================================
// Metadata Handlers
// ============================================================================

async fn list_projects(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.finder.projects())
}

async fn get_project(State(state): State<AppState>, Path(name): Path<String>) -> Response {
    match state.finder.project(&name) {
        Some(project) => Json(project).into_response(),
        None => error_response(StatusCode::NOT_FOUND, format!("Project not found: {name}")),
    }
}

async fn list_collectors(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.finder.collectors(""))
}

async fn get_collector(State(state): State<AppState>, Path(name): Path<String>) -> Response {
    match state.finder.collector(&name) {
        Some(collector) => Json(collector).into_response(),
        None => error_response(StatusCode::NOT_FOUND, format!("Collector not found: {name}")),
    }
}

// ============================================================================
// Data Handler
// ============================================================================

/// Parsed `/data` request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataRequest {
    pub query: Query,
    pub no_cache: bool,
}

/// Parse the `/data` query string against the finder's collectors
///
/// Only the first `intervals[]` value is used. Several `types[]` values
/// widen to `any` unless they all name the same kind.
pub fn parse_data_request(raw: &str, finder: &dyn Finder) -> Result<DataRequest, String> {
    let mut intervals = Vec::new();
    let mut collector_names = Vec::new();
    let mut types = Vec::new();
    let mut no_cache = false;

    for (key, value) in url::form_urlencoded::parse(raw.as_bytes()) {
        match key.as_ref() {
            "intervals[]" | "intervals" => intervals.push(value.into_owned()),
            "collectors[]" | "collectors" => collector_names.push(value.into_owned()),
            "types[]" | "types" => types.push(value.into_owned()),
            "no-cache" => no_cache = value.eq_ignore_ascii_case("true"),
            _ => {}
        }
    }

    let interval = intervals
        .first()
        .ok_or_else(|| "at least one interval is required".to_string())?;
    let (from, until) = interval
        .split_once(',')
        .ok_or_else(|| "invalid interval format, expected FROM,UNTIL".to_string())?;
    let from = epoch(from).map_err(|e| format!("invalid start time: {e}"))?;
    let until = epoch(until).map_err(|e| format!("invalid end time: {e}"))?;

    let mut collectors: Vec<Collector> = Vec::with_capacity(collector_names.len());
    for name in &collector_names {
        let collector = finder
            .collector(name)
            .ok_or_else(|| format!("collector not found: {name}"))?;
        if !collectors.contains(&collector) {
            collectors.push(collector);
        }
    }

    let mut kinds = HashSet::new();
    for token in &types {
        let kind = DumpKind::parse(token).ok_or_else(|| format!("invalid type: {token}"))?;
        kinds.insert(kind);
    }
    let kind = match kinds.len() {
        1 => kinds.into_iter().next().unwrap_or_default(),
        _ => DumpKind::Any,
    };

    Ok(DataRequest {
        query: Query::new(from, until)
            .with_collectors(collectors)
            .with_kind(kind),
        no_cache,
    })
}

fn epoch(s: &str) -> Result<DateTime<Utc>, String> {
    let secs: i64 = s.trim().parse().map_err(|e| format!("{e}"))?;
    Utc.timestamp_opt(secs, 0)
        .single()
        .ok_or_else(|| format!("{secs} is out of range"))
}

async fn get_data(State(state): State<AppState>, RawQuery(raw): RawQuery) -> Response {
    let request = match parse_data_request(raw.as_deref().unwrap_or(""), state.finder.as_ref()) {
        Ok(r) => r,
        Err(message) => return error_response(StatusCode::BAD_REQUEST, message),
    };
    let query = &request.query;

    tracing::info!(
        from = %query.from,
        until = %query.until,
        dump_type = %query.kind,
        collectors = query.collectors.len(),
        no_cache = request.no_cache,
        "Data request"
    );

    let store = match (&state.store, request.no_cache) {
        (Some(store), false) => store,
        _ => {
            metrics::record_cache_lookup("bypass");
            return match live_find(&state, query).await {
                Ok(dumps) => Json(dumps).into_response(),
                Err(resp) => resp,
            };
        }
    };

    let cached = match store.fetch_by_query(query).await {
        Ok(cached) => cached,
        Err(e) => {
            metrics::record_cache_lookup("error");
            tracing::error!(error = %e, "Cache store read failed");
            return error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("Error fetching BGP dumps from the cache: {e}"),
            );
        }
    };
    if !cached.is_empty() {
        metrics::record_cache_lookup("hit");
        return Json(cached).into_response();
    }

    metrics::record_cache_lookup("miss");
    let dumps = match live_find(&state, query).await {
        Ok(dumps) => dumps,
        Err(resp) => return resp,
    };

    if !dumps.is_empty() {
        let now = Utc::now();
        let mut seen: Vec<Collector> = Vec::new();
        for dump in &dumps {
            if !seen.contains(&dump.collector) {
                seen.push(dump.collector.clone());
            }
        }
        let written = match store.upsert_collectors(&seen, now).await {
            Ok(_) => store.upsert_bgp_dumps(&dumps, now).await,
            Err(e) => Err(e),
        };
        match written {
            Ok(count) => tracing::info!(dumps_upserted = count, "Cached live results"),
            Err(e) => tracing::error!(error = %e, "Failed to cache live results"),
        }
    }

    Json(dumps).into_response()
}

async fn live_find(state: &AppState, query: &Query) -> Result<Vec<BgpDump>, Response> {
    state.finder.find(query).await.map_err(|e| {
        tracing::error!(error = %e, "Live find failed");
        error_response(
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("Error finding BGP dumps: {e}"),
        )
    })
}

// ============================================================================
// Health and Metrics Handlers
// ============================================================================

async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_secs: state.start_time.elapsed().as_secs(),
    })
}

async fn prometheus_metrics() -> Response {
    match metrics::encode_metrics() {
        Ok(body) => (
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            body,
        )
            .into_response(),
        Err(e) => error_response(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
    }
}

// ============================================================================
// Tests
// ============================================================================
