//! `sync-index`: reconcile every configured search index with its source
//! collection.

use std::collections::HashMap;

use axum::body::Bytes;
use axum::extract::{Query, State};
use axum::http::HeaderMap;
use axum::response::{Html, IntoResponse};
use blueprint_core::config::env_keys::{MEILISEARCH_ENDPOINT, MEILISEARCH_SEARCH_API_KEY};
use blueprint_core::config::SYNC_INDEX_ENV;
use blueprint_core::error::AppError;
use blueprint_core::sync::{sync_all, SyncMode, SyncOptions, SyncSummary};
use serde_json::{json, Map, Value};
use tracing::{info, warn};

use super::{flag, header, json_body, success, ApiResult};
use crate::state::{AppState, SharedState};

/// Search page served on GET.
const SEARCH_PAGE: &str = include_str!("../../assets/search.html");

/// Runs one sync pass over every configured target.
pub async fn run_sync(
    state: &AppState,
    api_key: &str,
    mode: SyncMode,
) -> Result<SyncSummary, AppError> {
    state.env.require(SYNC_INDEX_ENV)?;
    let store = state
        .backends
        .documents(&state.env, api_key, state.database_id())?;
    let search = state.backends.search(&state.env)?;

    info!(
        mode = ?mode,
        targets = state.config.sync_targets.len(),
        "Starting index sync"
    );
    let summary = sync_all(
        store.as_ref(),
        search.as_ref(),
        &state.config.sync_targets,
        mode,
        &SyncOptions::default(),
    )
    .await;

    let totals = summary.totals();
    info!(
        synced = totals.synced,
        deleted = totals.deleted,
        failed = summary.failed_count(),
        "Index sync finished"
    );
    Ok(summary)
}

/// Response body for a finished sync.
pub fn summary_body(summary: &SyncSummary) -> Value {
    let results: Map<String, Value> = summary
        .results
        .iter()
        .map(|r| {
            let value = match &r.error {
                Some(message) => json!({ "error": message }),
                None => serde_json::to_value(&r.stats).unwrap_or(Value::Null),
            };
            (r.index.clone(), value)
        })
        .collect();

    let message = match summary.mode {
        SyncMode::DeleteAll => "All documents deleted",
        _ => "All indexes synced",
    };

    json!({
        "message": message,
        "syncType": summary.mode,
        "results": results,
        "totals": summary.totals(),
    })
}

/// `POST /sync-index`
pub async fn handle(
    State(state): State<SharedState>,
    headers: HeaderMap,
    Query(query): Query<HashMap<String, String>>,
    body: Bytes,
) -> ApiResult {
    let body = json_body(&body).unwrap_or_else(|e| {
        warn!(error = %e, "Ignoring unparsable request body");
        json!({})
    });
    let mode = SyncMode::from_flags(
        flag(&body, &query, "forceFullSync"),
        flag(&body, &query, "deleteAll"),
    );

    let api_key = state.appwrite_key(header(&headers, "x-appwrite-key"))?;
    let summary = run_sync(&state, &api_key, mode).await?;
    Ok(success(summary_body(&summary)))
}

/// `GET /sync-index`: the search page, wired to the public search key.
pub async fn search_page(State(state): State<SharedState>) -> ApiResult {
    state.env.require(SYNC_INDEX_ENV)?;
    let html = super::interpolate(
        SEARCH_PAGE,
        &[
            (
                MEILISEARCH_ENDPOINT,
                state.env.get(MEILISEARCH_ENDPOINT).unwrap_or_default(),
            ),
            (
                MEILISEARCH_SEARCH_API_KEY,
                state.env.get(MEILISEARCH_SEARCH_API_KEY).unwrap_or_default(),
            ),
        ],
    );
    Ok(Html(html).into_response())
}
