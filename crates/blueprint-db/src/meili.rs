//! Meilisearch adapter.
//!
//! Every write waits for its task to finish, so a returned
//! [`TaskReceipt`] always refers to a succeeded task.

use std::time::Duration;

use async_trait::async_trait;
use blueprint_core::error::AppError;
use blueprint_core::models::{EngineHealth, IndexStats, SearchRecord, TaskReceipt};
use blueprint_core::store::SearchIndex;
use meilisearch_sdk::client::Client;
use meilisearch_sdk::documents::DocumentsQuery;
use meilisearch_sdk::errors::{Error as MeiliError, ErrorCode, MeilisearchError};
use meilisearch_sdk::indexes::IndexesQuery;
use meilisearch_sdk::task_info::TaskInfo;
use serde::Deserialize;
use tracing::{debug, info};

/// Primary key of every index.
pub const PRIMARY_KEY: &str = "id";

const TASK_POLL_INTERVAL: Duration = Duration::from_millis(100);
const DEFAULT_TASK_TIMEOUT: Duration = Duration::from_secs(60);
const MAX_INDEXES: usize = 1000;

#[derive(Deserialize)]
struct IdOnly {
    id: serde_json::Value,
}

impl IdOnly {
    fn into_string(self) -> String {
        match self.id {
            serde_json::Value::String(s) => s,
            other => other.to_string(),
        }
    }
}

/// Maps SDK errors onto [`AppError`]. Missing indexes become `NotFound`
/// and HTTP 429 becomes `RateLimitExceeded`.
fn map_error(err: MeiliError) -> AppError {
    match err {
        MeiliError::Meilisearch(e) if matches!(e.error_code, ErrorCode::IndexNotFound) => {
            AppError::NotFound(e.error_message)
        }
        MeiliError::MeilisearchCommunication(e) if e.status_code == 429 => {
            AppError::RateLimitExceeded
        }
        MeiliError::Meilisearch(e) if is_too_many_requests(&e) => AppError::RateLimitExceeded,
        other => AppError::SearchError(other.to_string()),
    }
}

/// The SDK drops both the status and unknown error codes, so a parsed 429
/// body is recognized by its link or message.
fn is_too_many_requests(e: &MeilisearchError) -> bool {
    let link = e.error_link.to_ascii_lowercase();
    let message = e.error_message.to_ascii_lowercase();
    link.contains("too_many") || link.contains("too-many") || message.contains("too many requests")
}

/// [`SearchIndex`] backed by a Meilisearch server.
///
/// # Examples
///
/// ```no_run
/// use blueprint_db::MeiliIndexer;
/// use blueprint_core::store::SearchIndex;
///
/// # async fn example() -> Result<(), blueprint_core::AppError> {
/// let indexer = MeiliIndexer::new("http://localhost:7700", "masterKey")?;
/// indexer.ensure_index("blogs").await?;
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct MeiliIndexer {
    client: Client,
    task_timeout: Duration,
}

impl MeiliIndexer {
    pub fn new(endpoint: &str, api_key: &str) -> Result<Self, AppError> {
        let client = Client::new(endpoint, Some(api_key))
            .map_err(|e| AppError::InvalidUrl(format!("{endpoint}: {e}")))?;
        Ok(Self {
            client,
            task_timeout: DEFAULT_TASK_TIMEOUT,
        })
    }

    /// How long to wait for a write task before giving up.
    pub fn with_task_timeout(mut self, timeout: Duration) -> Self {
        self.task_timeout = timeout;
        self
    }

    async fn wait(&self, info: TaskInfo) -> Result<TaskReceipt, AppError> {
        let task_uid = info.task_uid;
        let task = info
            .wait_for_completion(&self.client, Some(TASK_POLL_INTERVAL), Some(self.task_timeout))
            .await
            .map_err(map_error)?;
        if task.is_failure() {
            let failure = task.unwrap_failure();
            return Err(AppError::TaskFailed {
                task_uid,
                message: failure.error_message,
            });
        }
        Ok(TaskReceipt { task_uid })
    }

    async fn create_index(&self, uid: &str) -> Result<(), AppError> {
        let info = self
            .client
            .create_index(uid, Some(PRIMARY_KEY))
            .await
            .map_err(map_error)?;
        self.wait(info).await?;

        let info = self
            .client
            .index(uid)
            .set_displayed_attributes(["*"])
            .await
            .map_err(map_error)?;
        self.wait(info).await?;
        info!(index = uid, "Created index");
        Ok(())
    }
}

#[async_trait]
impl SearchIndex for MeiliIndexer {
    async fn ensure_index(&self, index: &str) -> Result<(), AppError> {
        match self.client.get_index(index).await.map_err(map_error) {
            Ok(_) => Ok(()),
            Err(AppError::NotFound(_)) => self.create_index(index).await,
            Err(e) => Err(e),
        }
    }

    async fn document_ids(
        &self,
        index: &str,
        offset: usize,
        limit: usize,
    ) -> Result<Vec<String>, AppError> {
        let idx = self.client.index(index);
        let page = DocumentsQuery::new(&idx)
            .with_offset(offset)
            .with_limit(limit)
            .with_fields([PRIMARY_KEY])
            .execute::<IdOnly>()
            .await
            .map_err(map_error)?;
        Ok(page.results.into_iter().map(IdOnly::into_string).collect())
    }

    async fn upsert_documents(
        &self,
        index: &str,
        records: &[SearchRecord],
    ) -> Result<TaskReceipt, AppError> {
        let info = self
            .client
            .index(index)
            .add_or_update(records, Some(PRIMARY_KEY))
            .await
            .map_err(map_error)?;
        let receipt = self.wait(info).await?;
        debug!(index, count = records.len(), task = receipt.task_uid, "Upserted documents");
        Ok(receipt)
    }

    async fn delete_documents(
        &self,
        index: &str,
        ids: &[String],
    ) -> Result<TaskReceipt, AppError> {
        let info = self
            .client
            .index(index)
            .delete_documents(ids)
            .await
            .map_err(map_error)?;
        self.wait(info).await
    }

    async fn delete_all_documents(&self, index: &str) -> Result<TaskReceipt, AppError> {
        let info = self
            .client
            .index(index)
            .delete_all_documents()
            .await
            .map_err(map_error)?;
        self.wait(info).await
    }

    async fn health(&self) -> Result<EngineHealth, AppError> {
        let health = self.client.health().await.map_err(map_error)?;
        let version = self.client.get_version().await.ok().map(|v| v.pkg_version);
        Ok(EngineHealth {
            status: health.status,
            version,
        })
    }

    async fn index_uids(&self) -> Result<Vec<String>, AppError> {
        let indexes = IndexesQuery::new(&self.client)
            .with_limit(MAX_INDEXES)
            .execute()
            .await
            .map_err(map_error)?;
        Ok(indexes.results.into_iter().map(|i| i.uid).collect())
    }

    async fn index_stats(&self, index: &str) -> Result<IndexStats, AppError> {
        let stats = self
            .client
            .index(index)
            .get_stats()
            .await
            .map_err(map_error)?;
        Ok(IndexStats {
            number_of_documents: stats.number_of_documents as u64,
            is_indexing: stats.is_indexing,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_id_only_accepts_numbers_and_strings() {
        let s: IdOnly = serde_json::from_str(r#"{"id": "abc"}"#).unwrap();
        assert_eq!(s.into_string(), "abc");
        let n: IdOnly = serde_json::from_str(r#"{"id": 42}"#).unwrap();
        assert_eq!(n.into_string(), "42");
    }

    #[test]
    fn test_new_indexer() {
        assert!(MeiliIndexer::new("http://localhost:7700", "key").is_ok());
    }
}
