//! `scan-addons`: pull mods from CurseForge and Modrinth into the addons
//! collection.

use std::collections::HashMap;
use std::time::Instant;

use axum::extract::{Query, State};
use blueprint_core::config::env_keys::APPWRITE_FUNCTION_API_KEY;
use blueprint_core::config::{ScanOverrides, ADDONS_COLLECTION, SCAN_ADDONS_ENV};
use blueprint_core::error::AppError;
use blueprint_core::scan::AddonScanner;
use serde_json::{json, Value};
use tracing::info;

use super::{positive, success, ApiResult};
use crate::state::{AppState, SharedState};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanAction {
    Full,
    Quick,
    Health,
    /// One page of each catalog starting at the given offset.
    Incremental(u32),
}

impl ScanAction {
    /// Reads `?action=quick|health|incremental`; anything else is a full
    /// scan. Incremental scans start at `?offset=`, default 0.
    pub fn from_query(query: &HashMap<String, String>) -> Self {
        match query.get("action").map(String::as_str) {
            Some("quick") => ScanAction::Quick,
            Some("health") => ScanAction::Health,
            Some("incremental") => {
                ScanAction::Incremental(positive(query, "offset").unwrap_or(0))
            }
            _ => ScanAction::Full,
        }
    }
}

/// Scan tuning from query parameters.
pub fn overrides_from_query(query: &HashMap<String, String>) -> ScanOverrides {
    ScanOverrides {
        max_iterations: positive(query, "maxIterations"),
        batch_size: positive(query, "batchSize"),
        iteration_delay_ms: positive(query, "iterationDelay"),
        request_delay_ms: positive(query, "requestDelay"),
        search_query: query
            .get("searchQuery")
            .filter(|q| !q.trim().is_empty())
            .cloned(),
    }
}

/// Runs a scan or a health check and returns its report as JSON.
pub async fn run_scan(
    state: &AppState,
    action: ScanAction,
    overrides: &ScanOverrides,
) -> Result<Value, AppError> {
    state.env.require(SCAN_ADDONS_ENV)?;
    let api_key = state.env.value(APPWRITE_FUNCTION_API_KEY)?;
    let store = state
        .backends
        .documents(&state.env, api_key, state.database_id())?;
    let request_delay = match action {
        ScanAction::Quick => state.config.scan.quick(overrides).request_delay,
        _ => state.config.scan.full(overrides).request_delay,
    };
    let catalogs = state.backends.catalogs(&state.env, request_delay)?;

    let scanner = AddonScanner::new(
        store.as_ref(),
        catalogs.curseforge.as_ref(),
        catalogs.modrinth.as_ref(),
        ADDONS_COLLECTION,
        state.config.taxonomy.clone(),
    );

    let report = match action {
        ScanAction::Health => {
            serde_json::to_value(scanner.health_check(&state.env, SCAN_ADDONS_ENV).await)?
        }
        ScanAction::Quick => {
            let settings = state.config.scan.quick(overrides);
            info!(?settings, "Performing quick scan");
            serde_json::to_value(scanner.full_scan(&settings).await)?
        }
        ScanAction::Full => {
            let settings = state.config.scan.full(overrides);
            info!(?settings, "Performing full scan");
            serde_json::to_value(scanner.full_scan(&settings).await)?
        }
        ScanAction::Incremental(offset) => {
            let settings = state.config.scan.full(overrides);
            info!(offset, batch_size = settings.batch_size, "Performing incremental scan");
            let report = scanner
                .incremental_scan(offset, settings.batch_size, &settings.search_query)
                .await?;
            serde_json::to_value(report)?
        }
    };
    Ok(report)
}

async fn respond(state: SharedState, action: ScanAction, query: HashMap<String, String>) -> ApiResult {
    let started = Instant::now();
    let data = run_scan(&state, action, &overrides_from_query(&query)).await?;
    let elapsed = started.elapsed();
    info!(?action, elapsed_ms = elapsed.as_millis() as u64, "Scan request complete");
    Ok(success(json!({
        "data": data,
        "executionTime": format!("{:.2}s", elapsed.as_secs_f64()),
    })))
}

/// `/scan-addons`, dispatching on `?action=`.
pub async fn handle(
    State(state): State<SharedState>,
    Query(query): Query<HashMap<String, String>>,
) -> ApiResult {
    let action = ScanAction::from_query(&query);
    respond(state, action, query).await
}

/// `/scan-addons/quick`
pub async fn quick(
    State(state): State<SharedState>,
    Query(query): Query<HashMap<String, String>>,
) -> ApiResult {
    respond(state, ScanAction::Quick, query).await
}

/// `/scan-addons/health`
pub async fn health(
    State(state): State<SharedState>,
    Query(query): Query<HashMap<String, String>>,
) -> ApiResult {
    respond(state, ScanAction::Health, query).await
}
