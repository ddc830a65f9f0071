use std::time::Duration;

use blueprint_core::config::HttpConfig;
use blueprint_core::error::AppError;
use blueprint_core::retry::{retry_on_rate_limit, RateLimiter, RetryPolicy};
use reqwest::{Client, RequestBuilder, Response, StatusCode, Url};
use serde::de::DeserializeOwned;

/// Builds the shared reqwest client.
pub(crate) fn build_client(user_agent: &str, config: &HttpConfig) -> Result<Client, AppError> {
    Client::builder()
        .user_agent(user_agent)
        .timeout(config.timeout)
        .build()
        .map_err(|e| AppError::ClientError(e.to_string()))
}

pub(crate) fn retry_policy(config: &HttpConfig) -> RetryPolicy {
    RetryPolicy::new(config.max_retries, config.retry_base_delay)
}

/// Parses `raw` as a base URL whose path always ends in `/`, so that
/// relative joins append instead of replacing the last segment.
pub(crate) fn parse_base_url(raw: &str) -> Result<Url, AppError> {
    let normalized = if raw.ends_with('/') {
        raw.to_string()
    } else {
        format!("{raw}/")
    };
    Url::parse(&normalized).map_err(|_| AppError::InvalidUrl(raw.to_string()))
}

pub(crate) fn join(base: &Url, path: &str) -> Result<Url, AppError> {
    base.join(path)
        .map_err(|e| AppError::InvalidUrl(format!("{path}: {e}")))
}

/// Sends one request, mapping transport failures and error statuses.
///
/// Only HTTP 429 becomes [`AppError::RateLimitExceeded`]; every other
/// non-success status is a terminal client error.
async fn send_once(request: RequestBuilder, timeout: Duration) -> Result<Response, AppError> {
    let resp = request.send().await.map_err(|e| {
        if e.is_timeout() {
            AppError::Timeout(timeout.as_secs())
        } else if e.is_connect() {
            AppError::NetworkError(format!("Connection failed: {}", e))
        } else {
            AppError::ClientError(e.to_string())
        }
    })?;

    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    if status == StatusCode::TOO_MANY_REQUESTS {
        return Err(AppError::RateLimitExceeded);
    }
    Err(AppError::ClientError(format!(
        "HTTP {} from {}",
        status.as_u16(),
        resp.url()
    )))
}

/// GETs `url` as JSON, retrying with exponential backoff while rate limited.
///
/// Every attempt, retries included, first waits for a slot on `limiter`.
pub(crate) async fn get_json<T, F>(
    build: F,
    limiter: &RateLimiter,
    policy: RetryPolicy,
    timeout: Duration,
) -> Result<T, AppError>
where
    T: DeserializeOwned,
    F: Fn() -> RequestBuilder,
{
    let resp = retry_on_rate_limit(policy, || {
        let request = build();
        async move {
            limiter.acquire().await;
            send_once(request, timeout).await
        }
    })
    .await?;
    resp.json()
        .await
        .map_err(|e| AppError::ClientError(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base_url_gets_trailing_slash() {
        let url = parse_base_url("https://api.curseforge.com/v1").unwrap();
        assert_eq!(
            join(&url, "mods/search").unwrap().as_str(),
            "https://api.curseforge.com/v1/mods/search"
        );
    }

    #[test]
    fn test_invalid_base_url() {
        let err = parse_base_url("not a url").unwrap_err();
        assert!(matches!(err, AppError::InvalidUrl(_)));
    }
}
