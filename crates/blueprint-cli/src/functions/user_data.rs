//! `user-data`: every document a user owns across the configured
//! collections.

use std::collections::HashMap;

use axum::body::Bytes;
use axum::extract::{Query as QueryParams, State};
use axum::http::{HeaderMap, StatusCode};
use blueprint_core::config::{MatchKind, UserDataSource, USER_DATA_ENV};
use blueprint_core::models::Document;
use blueprint_core::paging::CursorPager;
use blueprint_core::store::{DocumentStore, Query};
use serde_json::{json, Value};
use tracing::{debug, info, warn};

use super::{header, json_body, success, ApiError, ApiResult};
use crate::state::SharedState;

/// Documents of one collection belonging to the user.
#[derive(Debug, Clone, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CollectionData {
    pub collection_id: String,
    pub row: String,
    pub data: Vec<Document>,
}

/// Picks the user id from the `x-user-id` header, the body, or the query
/// string, in that order.
pub fn user_id_from(
    headers: &HeaderMap,
    body: &Value,
    query: &HashMap<String, String>,
) -> Option<String> {
    header(headers, "x-user-id")
        .map(str::to_string)
        .or_else(|| {
            body.get("userId")
                .and_then(Value::as_str)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
        })
        .or_else(|| query.get("userId").filter(|s| !s.is_empty()).cloned())
}

fn filter_for(source: &UserDataSource, user_id: &str) -> Query {
    match source.match_kind {
        MatchKind::Equal => Query::equal(&source.attribute, user_id),
        MatchKind::Contains => Query::contains(&source.attribute, user_id),
    }
}

/// Collects the user's documents from one source. A failing page stops
/// the walk but keeps what was already fetched.
pub async fn collect_source(
    store: &dyn DocumentStore,
    source: &UserDataSource,
    user_id: &str,
) -> CollectionData {
    let mut pager = CursorPager::new(&source.collection).with_filter(filter_for(source, user_id));
    let mut data = Vec::new();
    loop {
        match pager.next_page(store).await {
            Ok(Some(page)) => {
                debug!(
                    collection = %source.collection,
                    count = page.len(),
                    "Fetched user documents"
                );
                data.extend(page);
            }
            Ok(None) => break,
            Err(e) => {
                warn!(collection = %source.collection, error = %e, "Failed to fetch user documents");
                break;
            }
        }
    }
    CollectionData {
        collection_id: source.collection.clone(),
        row: source.attribute.clone(),
        data,
    }
}

/// `GET|POST /user-data`
pub async fn handle(
    State(state): State<SharedState>,
    headers: HeaderMap,
    QueryParams(query): QueryParams<HashMap<String, String>>,
    body: Bytes,
) -> ApiResult {
    let body = json_body(&body).unwrap_or_else(|_| json!({}));
    let Some(user_id) = user_id_from(&headers, &body, &query) else {
        return Err(ApiError::new(StatusCode::BAD_REQUEST, "User ID is required"));
    };

    state.env.require(USER_DATA_ENV)?;
    let key = state.appwrite_key(header(&headers, "x-appwrite-key"))?;
    let store = state
        .backends
        .documents(&state.env, &key, state.database_id())?;

    let mut all = Vec::with_capacity(state.config.user_data.len());
    for source in &state.config.user_data {
        all.push(collect_source(store.as_ref(), source, &user_id).await);
    }

    let message = format!("Successfully retrieved data for user {user_id} from all collections.");
    info!(user = %user_id, collections = all.len(), "{}", message);
    Ok(success(json!({ "message": message, "data": all })))
}
