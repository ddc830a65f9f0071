//! `sync-document`: mirror one Appwrite document event into its index.

use std::collections::HashMap;
use std::time::Instant;

use axum::body::Bytes;
use axum::extract::{Query, State};
use axum::http::{header as http_header, HeaderMap, StatusCode};
use axum::response::IntoResponse;
use axum::Json;
use blueprint_core::config::SYNC_DOCUMENT_ENV;
use blueprint_core::error::AppError;
use blueprint_core::event::parse_event;
use blueprint_core::health::{check_search_health, format_health_report, HealthStatus};
use blueprint_core::retry::RetryPolicy;
use blueprint_core::sync::apply_event;
use serde_json::json;
use tracing::{error, info};

use super::{header, json_body, success, ApiError, ApiResult};
use crate::state::SharedState;

/// `POST /sync-document`
pub async fn handle(State(state): State<SharedState>, headers: HeaderMap, body: Bytes) -> ApiResult {
    let started = Instant::now();
    state.env.require(SYNC_DOCUMENT_ENV)?;

    let event = json_body(&body)
        .and_then(|body| parse_event(&body, header(&headers, "x-appwrite-event")))
        .map_err(|e| {
            error!(error = %e, "Rejected document event");
            ApiError::new(StatusCode::BAD_REQUEST, "Invalid event data format")
                .with("error", e.to_string())
        })?;

    let Some(target) = state.config.target_for_collection(&event.collection_id) else {
        info!(collection = %event.collection_id, "Collection not configured for sync, skipping");
        return Ok(success(json!({
            "message": format!("Collection {} not configured for sync", event.collection_id),
            "skipped": true,
        })));
    };

    let search = state.backends.search(&state.env)?;
    let receipt = apply_event(search.as_ref(), &target.index, &event, RetryPolicy::default())
        .await
        .map_err(|e| sync_failed(e, started))?;

    let elapsed = started.elapsed().as_millis() as u64;
    info!(
        action = %event.action,
        collection = %event.collection_id,
        document = %event.document_id,
        elapsed_ms = elapsed,
        "Document synced"
    );
    Ok(success(json!({
        "message": format!("Document {} synced successfully", event.action),
        "data": {
            "action": event.action,
            "collectionId": event.collection_id,
            "documentId": event.document_id,
            "indexName": target.index,
            "meilisearchTaskUid": receipt.task_uid,
            "executionTimeMs": elapsed,
        },
    })))
}

fn sync_failed(err: AppError, started: Instant) -> ApiError {
    error!(error = %err, "Document sync failed");
    let status =
        StatusCode::from_u16(err.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    ApiError::new(status, "Document sync failed")
        .with("error", err.to_string())
        .with("executionTimeMs", started.elapsed().as_millis() as u64)
}

/// True when the caller asked for the plain-text report.
fn wants_text(headers: &HeaderMap, query: &HashMap<String, String>) -> bool {
    query.get("format").map(String::as_str) == Some("text")
        || header(headers, http_header::ACCEPT.as_str())
            .is_some_and(|accept| accept.contains("text/plain"))
}

/// `GET /sync-document`: search engine health.
///
/// JSON by default, answering 503 unless healthy; plain text with
/// `?format=text` or `Accept: text/plain`.
pub async fn health(
    State(state): State<SharedState>,
    headers: HeaderMap,
    Query(query): Query<HashMap<String, String>>,
) -> ApiResult {
    state.env.require(SYNC_DOCUMENT_ENV)?;
    let search = state.backends.search(&state.env)?;
    let report = check_search_health(search.as_ref(), &state.config.index_names()).await;

    if wants_text(&headers, &query) {
        return Ok((
            StatusCode::OK,
            [(http_header::CONTENT_TYPE, "text/plain; charset=utf-8")],
            format_health_report(&report),
        )
            .into_response());
    }

    let status = if report.overall == HealthStatus::Healthy {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    Ok((status, Json(report)).into_response())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn test_wants_text() {
        let mut headers = HeaderMap::new();
        let mut query = HashMap::new();
        assert!(!wants_text(&headers, &query));

        query.insert("format".to_string(), "text".to_string());
        assert!(wants_text(&headers, &query));

        query.clear();
        headers.insert(
            http_header::ACCEPT,
            HeaderValue::from_static("text/plain, */*"),
        );
        assert!(wants_text(&headers, &query));
    }

    #[test]
    fn test_sync_failed_keeps_status() {
        let err = sync_failed(AppError::InvalidEvent("no payload".into()), Instant::now());
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
        let err = sync_failed(AppError::SearchError("down".into()), Instant::now());
        assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
