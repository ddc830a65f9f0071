use thiserror::Error;

/// Application-wide error types.
///
/// This enum represents every failure the Blueprint functions can surface.
/// It uses the `thiserror` crate for ergonomic error handling; clients map
/// their transport errors into these variants at the boundary so handlers
/// only ever deal with `AppError`.
///
/// # HTTP mapping
///
/// Every variant maps onto an HTTP status through [`AppError::status_code`],
/// which the function handlers use when they build the `{ success: false }`
/// response envelope.
///
/// # Examples
///
/// ```no_run
/// use blueprint_core::error::AppError;
///
/// fn example() -> Result<(), AppError> {
///     Err(AppError::Generic("Something went wrong".to_string()))
/// }
/// ```
#[derive(Error, Debug)]
pub enum AppError {
    /// One or more required environment variables are absent or empty.
    #[error("Missing required environment variables: {}", .0.join(", "))]
    MissingEnv(Vec<String>),

    /// Configuration file could not be read or parsed.
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// HTTP client request failed.
    ///
    /// Covers non-success statuses from the mod catalogs and failures
    /// decoding their bodies.
    #[error("API Client error: {0}")]
    ClientError(String),

    /// Appwrite answered with an error status not covered by a
    /// more specific variant.
    #[error("Appwrite error (HTTP {status}): {message}")]
    AppwriteError { status: u16, message: String },

    /// Search engine call failed.
    #[error("Search index error: {0}")]
    SearchError(String),

    /// A search engine task finished in the failed state.
    #[error("Search task {task_uid} failed: {message}")]
    TaskFailed { task_uid: u32, message: String },

    /// JSON serialization or deserialization failed.
    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    /// URL parsing failed.
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    /// An incoming document event could not be interpreted.
    #[error("Invalid event: {0}")]
    InvalidEvent(String),

    /// Request payload is malformed or missing a field.
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// Caller is not allowed to perform the operation.
    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// Requested resource does not exist.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Resource already exists.
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Network or connection error.
    #[error("Network error: {0}")]
    NetworkError(String),

    /// Request timeout.
    #[error("Request timed out after {0} seconds")]
    Timeout(u64),

    /// Rate limit exceeded (HTTP 429).
    #[error("Rate limit exceeded. Please wait and try again.")]
    RateLimitExceeded,

    /// Every retry attempt hit the rate limit.
    #[error("Max retries exceeded for rate limit error after {attempts} attempts")]
    RetriesExhausted { attempts: u32 },

    /// Generic application error for cases not covered by specific variants.
    ///
    /// Use this sparingly - prefer creating specific error variants.
    #[error("Error: {0}")]
    Generic(String),
}

impl AppError {
    /// HTTP status used when this error reaches a function boundary.
    pub fn status_code(&self) -> u16 {
        match self {
            AppError::BadRequest(_) | AppError::InvalidEvent(_) => 400,
            AppError::Forbidden(_) => 403,
            AppError::NotFound(_) => 404,
            AppError::Conflict(_) => 409,
            AppError::RateLimitExceeded | AppError::RetriesExhausted { .. } => 429,
            AppError::Timeout(_) => 504,
            AppError::NetworkError(_) => 502,
            _ => 500,
        }
    }

    /// Returns a user-friendly error message suitable for CLI output.
    pub fn user_message(&self) -> String {
        match self {
            AppError::MissingEnv(keys) => format!(
                "Missing required environment variables: {}\n   Set them in the function settings or in a .env file.",
                keys.join(", ")
            ),
            AppError::ClientError(msg) => {
                if msg.contains("401") || msg.contains("403") {
                    format!("Catalog rejected the API key: {}\n   Check CURSEFORGE_API_KEY.", msg)
                } else if msg.contains("connect") {
                    format!("Cannot connect to catalog: {}\n   Check your internet connection.", msg)
                } else {
                    format!("API error: {}", msg)
                }
            }
            AppError::AppwriteError { status: 401, .. } => {
                "Appwrite rejected the API key.\n   Check APPWRITE_FUNCTION_API_KEY and the key scopes.".to_string()
            }
            AppError::SearchError(msg) if msg.contains("invalid_api_key") => {
                "Meilisearch rejected the API key.\n   Check MEILISEARCH_ADMIN_API_KEY.".to_string()
            }
            AppError::NetworkError(msg) => {
                format!("Network error: {}\n   Check your internet connection.", msg)
            }
            AppError::Timeout(secs) => {
                format!("Request timed out after {} seconds.\n   The server may be overloaded. Try again later.", secs)
            }
            AppError::RateLimitExceeded | AppError::RetriesExhausted { .. } => {
                "Too many requests. Please wait a moment and try again.".to_string()
            }
            _ => self.to_string(),
        }
    }

    /// Returns true if this error is a rate-limit rejection.
    ///
    /// Only these errors are retried by
    /// [`retry_on_rate_limit`](crate::retry::retry_on_rate_limit).
    pub fn is_rate_limited(&self) -> bool {
        matches!(self, AppError::RateLimitExceeded)
    }

    /// Returns true if this error is transient.
    ///
    /// # Examples
    ///
    /// ```
    /// use blueprint_core::error::AppError;
    ///
    /// let err = AppError::NetworkError("connection reset".to_string());
    /// assert!(err.is_retryable());
    ///
    /// let err = AppError::RateLimitExceeded;
    /// assert!(err.is_retryable());
    ///
    /// let err = AppError::NotFound("addon".to_string());
    /// assert!(!err.is_retryable());
    /// ```
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            AppError::NetworkError(_) | AppError::Timeout(_) | AppError::RateLimitExceeded
        )
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, AppError::NotFound(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_env_lists_every_key() {
        let err = AppError::MissingEnv(vec![
            "MEILISEARCH_ENDPOINT".to_string(),
            "MEILISEARCH_ADMIN_API_KEY".to_string(),
        ]);
        assert_eq!(
            err.to_string(),
            "Missing required environment variables: MEILISEARCH_ENDPOINT, MEILISEARCH_ADMIN_API_KEY"
        );
        assert_eq!(err.status_code(), 500);
    }

    #[test]
    fn test_generic_error() {
        let err = AppError::Generic("Something went wrong".to_string());
        assert_eq!(err.to_string(), "Error: Something went wrong");
    }

    #[test]
    fn test_appwrite_error_display() {
        let err = AppError::AppwriteError {
            status: 401,
            message: "missing scope".to_string(),
        };
        assert_eq!(err.to_string(), "Appwrite error (HTTP 401): missing scope");
        assert!(err.user_message().contains("Appwrite rejected the API key"));
    }

    #[test]
    fn test_status_codes() {
        assert_eq!(AppError::BadRequest("x".into()).status_code(), 400);
        assert_eq!(AppError::InvalidEvent("x".into()).status_code(), 400);
        assert_eq!(AppError::Forbidden("x".into()).status_code(), 403);
        assert_eq!(AppError::NotFound("x".into()).status_code(), 404);
        assert_eq!(AppError::Conflict("x".into()).status_code(), 409);
        assert_eq!(AppError::RateLimitExceeded.status_code(), 429);
        assert_eq!(AppError::Generic("x".into()).status_code(), 500);
    }

    #[test]
    fn test_error_from_serde() {
        let json = "{ invalid json }";
        let result: Result<serde_json::Value, _> = serde_json::from_str(json);
        let serde_err = result.unwrap_err();
        let app_err: AppError = serde_err.into();
        assert!(matches!(app_err, AppError::SerializationError(_)));
    }

    #[test]
    fn test_is_retryable() {
        assert!(AppError::NetworkError("timeout".to_string()).is_retryable());
        assert!(AppError::Timeout(30).is_retryable());
        assert!(AppError::RateLimitExceeded.is_retryable());
        assert!(!AppError::Forbidden("nope".to_string()).is_retryable());
        assert!(!AppError::RetriesExhausted { attempts: 5 }.is_retryable());
    }

    #[test]
    fn test_only_429_is_rate_limited() {
        assert!(AppError::RateLimitExceeded.is_rate_limited());
        assert!(!AppError::NetworkError("reset".into()).is_rate_limited());
        assert!(!AppError::AppwriteError {
            status: 500,
            message: "boom".into()
        }
        .is_rate_limited());
    }

    #[test]
    fn test_retries_exhausted_message() {
        let err = AppError::RetriesExhausted { attempts: 5 };
        assert!(err.to_string().contains("Max retries exceeded for rate limit error"));
        assert!(err.user_message().contains("Too many requests"));
    }

    #[test]
    fn test_timeout_error() {
        let err = AppError::Timeout(30);
        assert_eq!(err.to_string(), "Request timed out after 30 seconds");
    }
}
