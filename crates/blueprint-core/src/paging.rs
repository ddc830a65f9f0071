//! Pagination over remote collections and indexes.

use crate::error::AppError;
use crate::models::Document;
use crate::store::{DocumentStore, Query, SearchIndex};

/// Documents fetched per Appwrite page.
pub const DOCUMENT_PAGE_SIZE: u32 = 100;

/// Ids fetched per search index page.
pub const INDEX_PAGE_SIZE: usize = 1000;

/// Walks a collection page by page using `cursorAfter`.
///
/// The walk ends after an empty page or a page shorter than the page size,
/// so a full final page costs one extra (empty) request.
///
/// ```no_run
/// # use blueprint_core::paging::CursorPager;
/// # use blueprint_core::store::DocumentStore;
/// # async fn run(store: &dyn DocumentStore) -> Result<(), blueprint_core::AppError> {
/// let mut pager = CursorPager::new("blogs");
/// while let Some(page) = pager.next_page(store).await? {
///     println!("{} documents", page.len());
/// }
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct CursorPager {
    collection: String,
    filters: Vec<Query>,
    page_size: u32,
    cursor: Option<String>,
    done: bool,
}

impl CursorPager {
    pub fn new(collection: &str) -> Self {
        Self {
            collection: collection.to_string(),
            filters: Vec::new(),
            page_size: DOCUMENT_PAGE_SIZE,
            cursor: None,
            done: false,
        }
    }

    pub fn with_filter(mut self, query: Query) -> Self {
        self.filters.push(query);
        self
    }

    pub fn with_page_size(mut self, page_size: u32) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    pub fn is_done(&self) -> bool {
        self.done
    }

    /// Fetches the next page, or `None` once the collection is exhausted.
    pub async fn next_page<S>(&mut self, store: &S) -> Result<Option<Vec<Document>>, AppError>
    where
        S: DocumentStore + ?Sized,
    {
        if self.done {
            return Ok(None);
        }

        let mut queries = self.filters.clone();
        queries.push(Query::Limit(self.page_size));
        if let Some(cursor) = &self.cursor {
            queries.push(Query::CursorAfter(cursor.clone()));
        }

        let page = store.list_documents(&self.collection, &queries).await?;
        let documents = page.documents;

        if (documents.len() as u32) < self.page_size {
            self.done = true;
        }
        match documents.last() {
            Some(last) => self.cursor = Some(last.id.clone()),
            None => {
                self.done = true;
                return Ok(None);
            }
        }

        Ok(Some(documents))
    }

    /// Drains the pager into a single vector.
    pub async fn collect_all<S>(mut self, store: &S) -> Result<Vec<Document>, AppError>
    where
        S: DocumentStore + ?Sized,
    {
        let mut all = Vec::new();
        while let Some(page) = self.next_page(store).await? {
            all.extend(page);
        }
        Ok(all)
    }
}

/// Reads every document id in `index` using offset pagination.
pub async fn collect_index_ids<I>(search: &I, index: &str) -> Result<Vec<String>, AppError>
where
    I: SearchIndex + ?Sized,
{
    let mut ids = Vec::new();
    let mut offset = 0;
    loop {
        let page = search.document_ids(index, offset, INDEX_PAGE_SIZE).await?;
        let fetched = page.len();
        ids.extend(page);
        if fetched < INDEX_PAGE_SIZE {
            break;
        }
        offset += fetched;
    }
    Ok(ids)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{InMemoryIndex, InMemoryStore};

    #[tokio::test]
    async fn test_pager_stops_on_short_page() {
        let store = InMemoryStore::with_documents("blogs", 250);
        let mut pager = CursorPager::new("blogs");

        let mut sizes = Vec::new();
        while let Some(page) = pager.next_page(&store).await.unwrap() {
            sizes.push(page.len());
        }

        assert_eq!(sizes, vec![100, 100, 50]);
        assert_eq!(store.list_calls(), 3);
    }

    #[tokio::test]
    async fn test_pager_exact_multiple_needs_one_empty_page() {
        let store = InMemoryStore::with_documents("blogs", 200);
        let docs = CursorPager::new("blogs").collect_all(&store).await.unwrap();

        assert_eq!(docs.len(), 200);
        assert_eq!(store.list_calls(), 3);
    }

    #[tokio::test]
    async fn test_pager_empty_collection() {
        let store = InMemoryStore::default();
        let mut pager = CursorPager::new("blogs");
        assert!(pager.next_page(&store).await.unwrap().is_none());
        assert!(pager.is_done());
        assert!(pager.next_page(&store).await.unwrap().is_none());
        assert_eq!(store.list_calls(), 1);
    }

    #[tokio::test]
    async fn test_pager_passes_filters_and_cursor() {
        let store = InMemoryStore::default();
        for i in 0..3 {
            store.insert(
                "schematics",
                Document::new(
                    format!("doc-{i:04}"),
                    serde_json::json!({"user_id": "u1"}).as_object().cloned().unwrap(),
                ),
            );
        }
        let mut pager = CursorPager::new("schematics")
            .with_filter(Query::equal("user_id", "u1"))
            .with_page_size(2);

        pager.next_page(&store).await.unwrap();
        pager.next_page(&store).await.unwrap();

        let queries = store.recorded_queries();
        assert_eq!(queries[0][0], Query::equal("user_id", "u1"));
        assert_eq!(queries[0][1], Query::Limit(2));
        assert_eq!(queries[1][2], Query::CursorAfter("doc-0001".to_string()));
    }

    #[tokio::test]
    async fn test_collect_index_ids_pages() {
        let index = InMemoryIndex::default();
        index.seed("blogs", (0..2500).map(|i| format!("id-{i}")));

        let ids = collect_index_ids(&index, "blogs").await.unwrap();
        assert_eq!(ids.len(), 2500);
        assert_eq!(ids[0], "id-0");
        assert_eq!(ids[2499], "id-2499");
    }
}
