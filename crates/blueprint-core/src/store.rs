//! Service seams between the function logic and the remote systems.
//!
//! The sync engine, scanner and user functions are written against these
//! traits; `blueprint-db` and `blueprint-client` provide the HTTP-backed
//! implementations.

use async_trait::async_trait;
use serde_json::{json, Map, Value};

use crate::error::AppError;
use crate::models::{
    Document, DocumentPage, EngineHealth, IndexStats, SearchRecord, TaskReceipt, UserPage,
};

/// A filter or paging directive in the Appwrite query language.
#[derive(Debug, Clone, PartialEq)]
pub enum Query {
    Limit(u32),
    Offset(u32),
    CursorAfter(String),
    Equal(String, Vec<Value>),
    Contains(String, Vec<Value>),
    Search(String, String),
}

impl Query {
    pub fn equal(attribute: &str, value: impl Into<Value>) -> Self {
        Query::Equal(attribute.to_string(), vec![value.into()])
    }

    pub fn contains(attribute: &str, value: impl Into<Value>) -> Self {
        Query::Contains(attribute.to_string(), vec![value.into()])
    }

    /// Encodes the query as the JSON string Appwrite accepts in `queries[]`.
    ///
    /// # Examples
    ///
    /// ```
    /// use blueprint_core::store::Query;
    ///
    /// assert_eq!(
    ///     Query::Limit(100).to_query_string(),
    ///     r#"{"method":"limit","values":[100]}"#
    /// );
    /// ```
    pub fn to_query_string(&self) -> String {
        let value = match self {
            Query::Limit(n) => json!({ "method": "limit", "values": [n] }),
            Query::Offset(n) => json!({ "method": "offset", "values": [n] }),
            Query::CursorAfter(id) => json!({ "method": "cursorAfter", "values": [id] }),
            Query::Equal(attr, values) => {
                json!({ "method": "equal", "attribute": attr, "values": values })
            }
            Query::Contains(attr, values) => {
                json!({ "method": "contains", "attribute": attr, "values": values })
            }
            Query::Search(attr, term) => {
                json!({ "method": "search", "attribute": attr, "values": [term] })
            }
        };
        value.to_string()
    }
}

/// Read/write access to the documents of one database.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn list_documents(
        &self,
        collection: &str,
        queries: &[Query],
    ) -> Result<DocumentPage, AppError>;

    /// Creates a document with a server-generated id.
    async fn create_document(
        &self,
        collection: &str,
        data: &Map<String, Value>,
    ) -> Result<Document, AppError>;

    async fn update_document(
        &self,
        collection: &str,
        id: &str,
        data: &Map<String, Value>,
    ) -> Result<Document, AppError>;

    /// Connectivity probe. Returns the number of databases visible to the key.
    async fn ping(&self) -> Result<u64, AppError>;
}

/// A search engine holding one index per synced collection.
#[async_trait]
pub trait SearchIndex: Send + Sync {
    /// Creates the index with primary key `id` if it does not exist.
    async fn ensure_index(&self, index: &str) -> Result<(), AppError>;

    /// Ids of the documents at `offset..offset+limit`.
    async fn document_ids(
        &self,
        index: &str,
        offset: usize,
        limit: usize,
    ) -> Result<Vec<String>, AppError>;

    /// Adds or replaces records and waits for the task to finish.
    async fn upsert_documents(
        &self,
        index: &str,
        records: &[SearchRecord],
    ) -> Result<TaskReceipt, AppError>;

    async fn delete_documents(&self, index: &str, ids: &[String])
        -> Result<TaskReceipt, AppError>;

    async fn delete_all_documents(&self, index: &str) -> Result<TaskReceipt, AppError>;

    async fn health(&self) -> Result<EngineHealth, AppError>;

    async fn index_uids(&self) -> Result<Vec<String>, AppError>;

    async fn index_stats(&self, index: &str) -> Result<IndexStats, AppError>;
}

/// Users and team memberships.
#[async_trait]
pub trait TeamDirectory: Send + Sync {
    async fn list_users(
        &self,
        search: Option<&str>,
        limit: u32,
        offset: u32,
    ) -> Result<UserPage, AppError>;

    /// Ids of every team `user_id` belongs to.
    async fn user_team_ids(&self, user_id: &str) -> Result<Vec<String>, AppError>;

    /// Adds the user to the team. Fails with [`AppError::Conflict`] when the
    /// user is already a member.
    async fn add_membership(
        &self,
        team_id: &str,
        user_id: &str,
        roles: &[String],
        redirect_url: &str,
    ) -> Result<String, AppError>;

    /// Membership id of `user_id` in `team_id`, if any.
    async fn find_membership(&self, team_id: &str, user_id: &str)
        -> Result<Option<String>, AppError>;

    async fn delete_membership(&self, team_id: &str, membership_id: &str) -> Result<(), AppError>;
}
