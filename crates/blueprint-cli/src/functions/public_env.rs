//! `public-env`: the browser-safe client configuration, behind an origin
//! allow-list.

use axum::extract::State;
use axum::http::{header as http_header, HeaderMap, HeaderValue, StatusCode};
use blueprint_core::config::env_keys::APPWRITE_DATABASE_ID;
use blueprint_core::config::{AllowedOrigins, DEFAULT_DATABASE_ID, PUBLIC_ENV};
use serde_json::{json, Map, Value};
use tracing::warn;

use super::{header, success, ApiError, ApiResult};
use crate::state::SharedState;

/// `GET /public-env`
pub async fn handle(State(state): State<SharedState>, headers: HeaderMap) -> ApiResult {
    let origin = header(&headers, http_header::ORIGIN.as_str()).unwrap_or_default();
    let allowed = AllowedOrigins::from_env(&state.env);
    if !allowed.allows(origin) {
        warn!(origin, "Rejected public env request from origin");
        return Err(ApiError::new(StatusCode::FORBIDDEN, "CORS policy violation"));
    }

    state.env.require(PUBLIC_ENV)?;
    let env = &state.env;
    let mut data = Map::new();
    data.insert(
        APPWRITE_DATABASE_ID.to_string(),
        Value::from(env.get(APPWRITE_DATABASE_ID).unwrap_or(DEFAULT_DATABASE_ID)),
    );
    for key in PUBLIC_ENV {
        data.insert(key.to_string(), Value::from(env.get(key).unwrap_or_default()));
    }
    let mut response = success(json!({ "data": data }));

    if let Ok(value) = HeaderValue::from_str(origin) {
        response
            .headers_mut()
            .insert(http_header::ACCESS_CONTROL_ALLOW_ORIGIN, value);
    }
    Ok(response)
}
