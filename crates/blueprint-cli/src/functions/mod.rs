//! Function handlers.
//!
//! Every handler answers with a JSON envelope: `{"success": true, ...}` on
//! success and `{"success": false, "message": ...}` with the status from
//! [`AppError::status_code`] on failure.

pub mod manage_users;
pub mod public_env;
pub mod scan_addons;
pub mod sync_document;
pub mod sync_index;
pub mod user_data;

use std::collections::HashMap;
use std::sync::OnceLock;

use axum::body::Bytes;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use blueprint_core::error::AppError;
use chrono::Utc;
use regex::Regex;
use serde_json::{json, Map, Value};
use tracing::error;

/// Error response of a function.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    body: Map<String, Value>,
}

impl ApiError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        let mut body = Map::new();
        body.insert("success".into(), Value::Bool(false));
        body.insert("message".into(), Value::String(message.into()));
        Self { status, body }
    }

    /// Adds an extra field to the error body.
    pub fn with(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.body.insert(key.to_string(), value.into());
        self
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }
}

impl From<AppError> for ApiError {
    fn from(err: AppError) -> Self {
        let status = StatusCode::from_u16(err.status_code())
            .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        if status.is_server_error() {
            error!(error = %err, "Function failed");
        }
        ApiError::new(status, err.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let mut body = self.body;
        body.insert("timestamp".into(), Value::String(Utc::now().to_rfc3339()));
        (self.status, Json(Value::Object(body))).into_response()
    }
}

pub type ApiResult = Result<Response, ApiError>;

/// Wraps `fields` in a success envelope with a timestamp.
pub fn success(fields: Value) -> Response {
    success_with_status(StatusCode::OK, fields)
}

pub fn success_with_status(status: StatusCode, fields: Value) -> Response {
    let mut body = match fields {
        Value::Object(map) => map,
        other => {
            let mut map = Map::new();
            map.insert("data".into(), other);
            map
        }
    };
    body.insert("success".into(), Value::Bool(true));
    body.insert("timestamp".into(), Value::String(Utc::now().to_rfc3339()));
    (status, Json(Value::Object(body))).into_response()
}

/// Parses a request body as JSON. An empty body is an empty object.
pub fn json_body(body: &Bytes) -> Result<Value, AppError> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(json!({}));
    }
    Ok(serde_json::from_slice(body)?)
}

/// Header value as a string, if present and valid UTF-8.
pub fn header<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty())
}

/// True when `key` is `true` in the body or `"true"` in the query string.
pub fn flag(body: &Value, query: &HashMap<String, String>, key: &str) -> bool {
    body.get(key).and_then(Value::as_bool) == Some(true)
        || query.get(key).map(String::as_str) == Some("true")
}

/// Positive integer from the query string. Zero and garbage count as unset.
pub fn positive<T>(query: &HashMap<String, String>, key: &str) -> Option<T>
where
    T: std::str::FromStr + PartialOrd + Default,
{
    query
        .get(key)
        .and_then(|v| v.trim().parse::<T>().ok())
        .filter(|v| *v > T::default())
}

fn placeholder() -> Option<&'static Regex> {
    static PLACEHOLDER: OnceLock<Option<Regex>> = OnceLock::new();
    PLACEHOLDER
        .get_or_init(|| Regex::new(r"\{\{([^}]+)\}\}").ok())
        .as_ref()
}

/// Replaces every `{{KEY}}` in `template` with its value. Unknown keys
/// become empty strings.
///
/// # Examples
///
/// ```
/// use blueprint_cli::functions::interpolate;
///
/// let html = interpolate("<p>{{NAME}}{{MISSING}}</p>", &[("NAME", "Create")]);
/// assert_eq!(html, "<p>Create</p>");
/// ```
pub fn interpolate(template: &str, values: &[(&str, &str)]) -> String {
    let Some(re) = placeholder() else {
        return template.to_string();
    };
    re.replace_all(template, |caps: &regex::Captures<'_>| {
        let key = caps[1].trim();
        values
            .iter()
            .find(|(k, _)| *k == key)
            .map(|(_, v)| v.to_string())
            .unwrap_or_default()
    })
    .into_owned()
}
