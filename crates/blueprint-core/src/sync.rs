//! Collection to search index synchronization.
//!
//! A sync pass walks the source collection page by page, upserts every page
//! into the index, and, for targets with obsolete cleanup, removes index
//! documents whose id no longer exists in the source. Writes are retried
//! only when the search engine answers with a rate limit.

use std::collections::HashSet;

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::config::SyncTarget;
use crate::error::AppError;
use crate::event::{DocumentEvent, EventAction};
use crate::models::{SearchRecord, TaskReceipt};
use crate::paging::{collect_index_ids, CursorPager, DOCUMENT_PAGE_SIZE};
use crate::retry::{retry_on_rate_limit, RetryPolicy};
use crate::store::{DocumentStore, SearchIndex};

/// Ids deleted from the index per request.
pub const DELETE_BATCH_SIZE: usize = 1000;

/// What a sync pass does to each index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum SyncMode {
    /// Upsert everything, delete what disappeared from the source.
    #[default]
    Incremental,
    /// Wipe the index, then upsert everything.
    Full,
    /// Wipe the index and stop.
    DeleteAll,
}

impl SyncMode {
    /// `deleteAll` wins over `forceFullSync` when both are set.
    pub fn from_flags(force_full: bool, delete_all: bool) -> Self {
        match (force_full, delete_all) {
            (_, true) => SyncMode::DeleteAll,
            (true, false) => SyncMode::Full,
            (false, false) => SyncMode::Incremental,
        }
    }
}

/// Tuning for a sync pass.
#[derive(Debug, Clone, Copy)]
pub struct SyncOptions {
    pub page_size: u32,
    pub delete_batch_size: usize,
    pub retry: RetryPolicy,
}

impl Default for SyncOptions {
    fn default() -> Self {
        Self {
            page_size: DOCUMENT_PAGE_SIZE,
            delete_batch_size: DELETE_BATCH_SIZE,
            retry: RetryPolicy::rate_limit(),
        }
    }
}

/// Statistics for one index.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncStats {
    pub synced: usize,
    pub deleted: usize,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub deleted_all: bool,
}

impl SyncStats {
    pub fn new() -> Self {
        Self::default()
    }
}

/// Returns every id in `index_ids` that is absent from `source_ids`.
///
/// Order follows `index_ids`; duplicates are reported once.
///
/// # Examples
///
/// ```
/// use blueprint_core::sync::obsolete_ids;
///
/// let index = vec!["a".to_string(), "b".to_string(), "c".to_string()];
/// let source = vec!["b".to_string()];
/// assert_eq!(obsolete_ids(&index, &source), vec!["a", "c"]);
/// ```
pub fn obsolete_ids(index_ids: &[String], source_ids: &[String]) -> Vec<String> {
    let source: HashSet<&str> = source_ids.iter().map(String::as_str).collect();
    let mut seen = HashSet::new();
    index_ids
        .iter()
        .filter(|id| !source.contains(id.as_str()) && seen.insert(id.as_str()))
        .cloned()
        .collect()
}

/// Wipes an index without touching the source.
pub async fn clear_index<I>(search: &I, index: &str, options: &SyncOptions) -> Result<(), AppError>
where
    I: SearchIndex + ?Sized,
{
    search.ensure_index(index).await?;
    let receipt = retry_on_rate_limit(options.retry, || search.delete_all_documents(index)).await?;
    info!(index, task = receipt.task_uid, "Cleared index");
    Ok(())
}

/// Runs one sync pass for `target`.
pub async fn sync_collection<S, I>(
    store: &S,
    search: &I,
    target: &SyncTarget,
    mode: SyncMode,
    options: &SyncOptions,
) -> Result<SyncStats, AppError>
where
    S: DocumentStore + ?Sized,
    I: SearchIndex + ?Sized,
{
    let index = target.index.as_str();
    let mut stats = SyncStats::new();

    match mode {
        SyncMode::DeleteAll => {
            clear_index(search, index, options).await?;
            stats.deleted_all = true;
            return Ok(stats);
        }
        SyncMode::Full => clear_index(search, index, options).await?,
        SyncMode::Incremental => search.ensure_index(index).await?,
    }

    // After a wipe there is nothing left to clean up.
    let cleanup = target.cleanup_obsolete && mode == SyncMode::Incremental;
    let index_ids = if cleanup {
        let ids = collect_index_ids(search, index).await?;
        debug!(index, count = ids.len(), "Collected existing index ids");
        ids
    } else {
        Vec::new()
    };

    let mut source_ids = Vec::new();
    let mut pager = CursorPager::new(&target.collection).with_page_size(options.page_size);
    while let Some(page) = pager.next_page(store).await? {
        let records: Vec<SearchRecord> = page.iter().map(|d| d.to_search_record()).collect();
        source_ids.extend(page.into_iter().map(|d| d.id));

        let receipt =
            retry_on_rate_limit(options.retry, || search.upsert_documents(index, &records))
                .await?;
        stats.synced += records.len();
        debug!(
            index,
            batch = records.len(),
            task = receipt.task_uid,
            "Upserted page"
        );
    }

    if cleanup {
        let obsolete = obsolete_ids(&index_ids, &source_ids);
        if !obsolete.is_empty() {
            warn!(index, count = obsolete.len(), "Removing obsolete documents");
        }
        for batch in obsolete.chunks(options.delete_batch_size.max(1)) {
            retry_on_rate_limit(options.retry, || search.delete_documents(index, batch)).await?;
            stats.deleted += batch.len();
        }
    }

    info!(
        index,
        collection = %target.collection,
        synced = stats.synced,
        deleted = stats.deleted,
        "Sync pass complete"
    );
    Ok(stats)
}

/// Result of syncing one index.
#[derive(Debug, Clone)]
pub struct IndexSyncResult {
    pub index: String,
    pub stats: SyncStats,
    /// Error message if the pass failed, None if successful.
    pub error: Option<String>,
}

impl IndexSyncResult {
    pub fn success(index: String, stats: SyncStats) -> Self {
        Self {
            index,
            stats,
            error: None,
        }
    }

    pub fn failure(index: String, error: String) -> Self {
        Self {
            index,
            stats: SyncStats::default(),
            error: Some(error),
        }
    }

    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }
}

/// Aggregated results across every synced index.
#[derive(Debug, Clone, Default)]
pub struct SyncSummary {
    pub mode: SyncMode,
    pub results: Vec<IndexSyncResult>,
}

/// Totals across successful indexes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SyncTotals {
    pub synced: usize,
    pub deleted: usize,
}

impl SyncSummary {
    pub fn new(mode: SyncMode) -> Self {
        Self {
            mode,
            results: Vec::new(),
        }
    }

    pub fn add(&mut self, result: IndexSyncResult) {
        self.results.push(result);
    }

    pub fn successful_count(&self) -> usize {
        self.results.iter().filter(|r| r.is_success()).count()
    }

    pub fn failed_count(&self) -> usize {
        self.results.iter().filter(|r| !r.is_success()).count()
    }

    pub fn totals(&self) -> SyncTotals {
        self.results
            .iter()
            .fold(SyncTotals::default(), |acc, r| SyncTotals {
                synced: acc.synced + r.stats.synced,
                deleted: acc.deleted + r.stats.deleted,
            })
    }
}

/// Syncs every target in order. A failing target is recorded and does not
/// stop the others.
pub async fn sync_all<S, I>(
    store: &S,
    search: &I,
    targets: &[SyncTarget],
    mode: SyncMode,
    options: &SyncOptions,
) -> SyncSummary
where
    S: DocumentStore + ?Sized,
    I: SearchIndex + ?Sized,
{
    let mut summary = SyncSummary::new(mode);
    for target in targets {
        match sync_collection(store, search, target, mode, options).await {
            Ok(stats) => summary.add(IndexSyncResult::success(target.index.clone(), stats)),
            Err(e) => {
                tracing::error!(index = %target.index, error = %e, "Sync pass failed");
                summary.add(IndexSyncResult::failure(target.index.clone(), e.to_string()));
            }
        }
    }
    summary
}

/// Mirrors a single document event into `index`.
///
/// Create and update upsert the delivered payload; delete removes the id.
/// Rate-limited writes are retried with `policy`.
pub async fn apply_event<I>(
    search: &I,
    index: &str,
    event: &DocumentEvent,
    policy: RetryPolicy,
) -> Result<TaskReceipt, AppError>
where
    I: SearchIndex + ?Sized,
{
    search.ensure_index(index).await?;
    let receipt = match event.action {
        EventAction::Create | EventAction::Update => {
            let record = event.document()?.to_search_record();
            let records = std::slice::from_ref(&record);
            retry_on_rate_limit(policy, || search.upsert_documents(index, records)).await?
        }
        EventAction::Delete => {
            let ids = std::slice::from_ref(&event.document_id);
            retry_on_rate_limit(policy, || search.delete_documents(index, ids)).await?
        }
    };
    info!(
        index,
        document = %event.document_id,
        action = %event.action,
        task = receipt.task_uid,
        "Document event applied"
    );
    Ok(receipt)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{InMemoryIndex, InMemoryStore};
    use pretty_assertions::assert_eq;
    use std::time::Duration;

    fn ids(raw: &[&str]) -> Vec<String> {
        raw.iter().map(|s| s.to_string()).collect()
    }

    fn fast_options() -> SyncOptions {
        SyncOptions {
            retry: RetryPolicy::new(5, Duration::from_millis(1)),
            ..SyncOptions::default()
        }
    }

    #[test]
    fn test_obsolete_ids_exact_complement() {
        let index = ids(&["a", "b", "c", "d"]);
        let source = ids(&["b", "d", "e"]);
        assert_eq!(obsolete_ids(&index, &source), ids(&["a", "c"]));
    }

    #[test]
    fn test_obsolete_ids_edge_cases() {
        assert!(obsolete_ids(&[], &ids(&["a"])).is_empty());
        assert_eq!(obsolete_ids(&ids(&["a", "b"]), &[]), ids(&["a", "b"]));
        assert!(obsolete_ids(&ids(&["a", "b"]), &ids(&["b", "a"])).is_empty());
        assert_eq!(obsolete_ids(&ids(&["x", "x", "y"]), &ids(&["y"])), ids(&["x"]));
    }

    #[test]
    fn test_sync_mode_from_flags() {
        assert_eq!(SyncMode::from_flags(false, false), SyncMode::Incremental);
        assert_eq!(SyncMode::from_flags(true, false), SyncMode::Full);
        assert_eq!(SyncMode::from_flags(true, true), SyncMode::DeleteAll);
        assert_eq!(
            serde_json::to_value(SyncMode::DeleteAll).unwrap(),
            serde_json::json!("deleteAll")
        );
    }

    #[tokio::test]
    async fn test_incremental_sync_converges_ids() {
        let store = InMemoryStore::with_documents("blogs", 230);
        let index = InMemoryIndex::default();
        index.seed(
            "blogs",
            ["doc-0001", "stale-1", "stale-2"].iter().map(|s| s.to_string()),
        );

        let target = SyncTarget::new("blogs", "blogs", true);
        let stats = sync_collection(&store, &index, &target, SyncMode::Incremental, &fast_options())
            .await
            .unwrap();

        assert_eq!(stats.synced, 230);
        assert_eq!(stats.deleted, 2);

        let mut in_index = index.ids("blogs");
        in_index.sort();
        let expected: Vec<String> = (0..230).map(|i| format!("doc-{i:04}")).collect();
        assert_eq!(in_index, expected);
    }

    #[tokio::test]
    async fn test_records_drop_system_fields() {
        let store = InMemoryStore::with_documents("blogs", 1);
        let index = InMemoryIndex::default();
        let target = SyncTarget::new("blogs", "blogs", true);

        sync_collection(&store, &index, &target, SyncMode::Incremental, &fast_options())
            .await
            .unwrap();

        let record = index.record("blogs", "doc-0000").unwrap();
        assert!(record.fields.contains_key("title"));
        assert!(!record.fields.contains_key("$collectionId"));
    }

    #[tokio::test]
    async fn test_no_cleanup_keeps_extra_documents() {
        let store = InMemoryStore::with_documents("addons", 5);
        let index = InMemoryIndex::default();
        index.seed("addons", ["legacy".to_string()]);

        let target = SyncTarget::new("addons", "addons", false);
        let stats = sync_collection(&store, &index, &target, SyncMode::Incremental, &fast_options())
            .await
            .unwrap();

        assert_eq!(stats.deleted, 0);
        assert!(index.ids("addons").contains(&"legacy".to_string()));
    }

    #[tokio::test]
    async fn test_deletes_are_batched() {
        let store = InMemoryStore::with_documents("blogs", 1);
        let index = InMemoryIndex::default();
        index.seed("blogs", (0..2100).map(|i| format!("gone-{i}")));

        let target = SyncTarget::new("blogs", "blogs", true);
        let stats = sync_collection(&store, &index, &target, SyncMode::Incremental, &fast_options())
            .await
            .unwrap();

        assert_eq!(stats.deleted, 2100);
        assert_eq!(index.delete_batches(), vec![1000, 1000, 100]);
        assert_eq!(index.ids("blogs"), vec!["doc-0000".to_string()]);
    }

    #[tokio::test]
    async fn test_full_sync_wipes_first() {
        let store = InMemoryStore::with_documents("blogs", 3);
        let index = InMemoryIndex::default();
        index.seed("blogs", ["stale".to_string()]);

        let target = SyncTarget::new("blogs", "blogs", true);
        let stats = sync_collection(&store, &index, &target, SyncMode::Full, &fast_options())
            .await
            .unwrap();

        assert_eq!(stats.synced, 3);
        assert_eq!(stats.deleted, 0);
        assert_eq!(index.ids("blogs").len(), 3);
    }

    #[tokio::test]
    async fn test_delete_all_leaves_empty_index() {
        let store = InMemoryStore::with_documents("blogs", 3);
        let index = InMemoryIndex::default();
        index.seed("blogs", ["a".to_string(), "b".to_string()]);

        let target = SyncTarget::new("blogs", "blogs", true);
        let stats = sync_collection(&store, &index, &target, SyncMode::DeleteAll, &fast_options())
            .await
            .unwrap();

        assert!(stats.deleted_all);
        assert_eq!(stats.synced, 0);
        assert!(index.ids("blogs").is_empty());
        assert_eq!(store.list_calls(), 0);
    }

    #[tokio::test]
    async fn test_rate_limited_upsert_is_retried() {
        let store = InMemoryStore::with_documents("blogs", 10);
        let index = InMemoryIndex::default();
        index.rate_limit_next(2);

        let target = SyncTarget::new("blogs", "blogs", false);
        let stats = sync_collection(&store, &index, &target, SyncMode::Incremental, &fast_options())
            .await
            .unwrap();

        assert_eq!(stats.synced, 10);
        assert_eq!(index.ids("blogs").len(), 10);
    }

    #[tokio::test]
    async fn test_persistent_rate_limit_fails_target() {
        let store = InMemoryStore::with_documents("blogs", 10);
        let index = InMemoryIndex::default();
        index.rate_limit_next(100);

        let targets = vec![SyncTarget::new("blogs", "blogs", false)];
        let summary = sync_all(&store, &index, &targets, SyncMode::Incremental, &fast_options()).await;

        assert_eq!(summary.failed_count(), 1);
        assert!(summary.results[0]
            .error
            .as_deref()
            .unwrap()
            .contains("Max retries exceeded"));
    }

    #[tokio::test]
    async fn test_sync_all_totals() {
        let store = InMemoryStore::with_documents("blogs", 4);
        store.insert(
            "schematics",
            crate::models::Document::new("s1", serde_json::Map::new()),
        );
        let index = InMemoryIndex::default();
        index.seed("schematics", ["old".to_string()]);

        let targets = vec![
            SyncTarget::new("blogs", "blogs", true),
            SyncTarget::new("schematics", "schematics", true),
        ];
        let summary = sync_all(&store, &index, &targets, SyncMode::Incremental, &fast_options()).await;

        assert_eq!(summary.successful_count(), 2);
        assert_eq!(summary.totals(), SyncTotals { synced: 5, deleted: 1 });
    }

    #[test]
    fn test_index_sync_result_failure() {
        let result = IndexSyncResult::failure("blogs".into(), "boom".into());
        assert!(!result.is_success());
        assert_eq!(result.stats, SyncStats::default());
    }

    fn event(action: EventAction, payload: Option<serde_json::Value>) -> DocumentEvent {
        DocumentEvent {
            database_id: "main".into(),
            collection_id: "blogs".into(),
            document_id: "b1".into(),
            action,
            payload: payload.and_then(|p| p.as_object().cloned()),
        }
    }

    #[tokio::test]
    async fn test_apply_event_upserts_and_deletes() {
        let index = InMemoryIndex::default();
        let policy = RetryPolicy::new(3, Duration::from_millis(1));

        let created = event(
            EventAction::Create,
            Some(serde_json::json!({"$id": "b1", "$collectionId": "blogs", "title": "Rails"})),
        );
        apply_event(&index, "blogs", &created, policy).await.unwrap();
        assert!(index.has_index("blogs"));
        let record = index.record("blogs", "b1").unwrap();
        assert_eq!(record.fields["title"], "Rails");
        assert!(!record.fields.contains_key("$collectionId"));

        apply_event(&index, "blogs", &event(EventAction::Delete, None), policy)
            .await
            .unwrap();
        assert!(index.ids("blogs").is_empty());
    }

    #[tokio::test]
    async fn test_apply_event_without_payload_fails() {
        let index = InMemoryIndex::default();
        let err = apply_event(
            &index,
            "blogs",
            &event(EventAction::Update, None),
            RetryPolicy::new(1, Duration::from_millis(1)),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, AppError::InvalidEvent(_)));
    }
}
