//! In-memory fakes of the service traits.
//!
//! Compiled for this crate's tests and, through the `test-util` feature,
//! for the integration tests of dependent crates.

use std::collections::BTreeMap;
use std::sync::Mutex;

use async_trait::async_trait;
use serde_json::{Map, Value};

use crate::addons::{AddonCatalog, CatalogPage, Taxonomy};
use crate::error::AppError;
use crate::models::{
    Addon, Document, DocumentPage, EngineHealth, IndexStats, ModSource, SearchRecord, TaskReceipt,
    UserPage,
};
use crate::store::{DocumentStore, Query, SearchIndex, TeamDirectory};

#[derive(Default)]
pub struct InMemoryStore {
    collections: Mutex<BTreeMap<String, Vec<Document>>>,
    queries: Mutex<Vec<Vec<Query>>>,
    next_id: Mutex<u32>,
}

impl InMemoryStore {
    /// A collection of `count` empty documents named `doc-0000`, `doc-0001`, ...
    pub fn with_documents(collection: &str, count: usize) -> Self {
        let store = Self::default();
        for i in 0..count {
            let mut fields = Map::new();
            fields.insert("$collectionId".into(), Value::from(collection));
            fields.insert("title".into(), Value::from(format!("Document {i}")));
            store.insert(collection, Document::new(format!("doc-{i:04}"), fields));
        }
        store
    }

    pub fn insert(&self, collection: &str, doc: Document) {
        self.collections
            .lock()
            .unwrap()
            .entry(collection.to_string())
            .or_default()
            .push(doc);
    }

    pub fn documents(&self, collection: &str) -> Vec<Document> {
        self.collections
            .lock()
            .unwrap()
            .get(collection)
            .cloned()
            .unwrap_or_default()
    }

    pub fn list_calls(&self) -> usize {
        self.queries.lock().unwrap().len()
    }

    pub fn recorded_queries(&self) -> Vec<Vec<Query>> {
        self.queries.lock().unwrap().clone()
    }
}

fn matches(doc: &Document, query: &Query) -> bool {
    match query {
        Query::Equal(attr, values) => doc
            .fields
            .get(attr)
            .is_some_and(|v| values.contains(v)),
        Query::Contains(attr, values) => match doc.fields.get(attr) {
            Some(Value::Array(items)) => values.iter().any(|v| items.contains(v)),
            _ => false,
        },
        _ => true,
    }
}

#[async_trait]
impl DocumentStore for InMemoryStore {
    async fn list_documents(
        &self,
        collection: &str,
        queries: &[Query],
    ) -> Result<DocumentPage, AppError> {
        self.queries.lock().unwrap().push(queries.to_vec());

        let collections = self.collections.lock().unwrap();
        let all = collections.get(collection).cloned().unwrap_or_default();
        let filtered: Vec<Document> = all
            .into_iter()
            .filter(|d| queries.iter().all(|q| matches(d, q)))
            .collect();
        let total = filtered.len() as u64;

        let mut start = 0;
        let mut limit = 25;
        for q in queries {
            match q {
                Query::Limit(n) => limit = *n as usize,
                Query::Offset(n) => start = *n as usize,
                Query::CursorAfter(id) => {
                    start = filtered
                        .iter()
                        .position(|d| &d.id == id)
                        .map(|p| p + 1)
                        .unwrap_or(filtered.len());
                }
                _ => {}
            }
        }

        let documents = filtered.into_iter().skip(start).take(limit).collect();
        Ok(DocumentPage { total, documents })
    }

    async fn create_document(
        &self,
        collection: &str,
        data: &Map<String, Value>,
    ) -> Result<Document, AppError> {
        let mut next = self.next_id.lock().unwrap();
        *next += 1;
        let doc = Document::new(format!("new-{}", *next), data.clone());
        drop(next);
        self.insert(collection, doc.clone());
        Ok(doc)
    }

    async fn update_document(
        &self,
        collection: &str,
        id: &str,
        data: &Map<String, Value>,
    ) -> Result<Document, AppError> {
        let mut collections = self.collections.lock().unwrap();
        let doc = collections
            .get_mut(collection)
            .and_then(|docs| docs.iter_mut().find(|d| d.id == id))
            .ok_or_else(|| AppError::NotFound(id.to_string()))?;
        for (k, v) in data {
            doc.fields.insert(k.clone(), v.clone());
        }
        Ok(doc.clone())
    }

    async fn ping(&self) -> Result<u64, AppError> {
        Ok(1)
    }
}

#[derive(Default)]
pub struct InMemoryIndex {
    indexes: Mutex<BTreeMap<String, Vec<SearchRecord>>>,
    rate_limited_writes: Mutex<u32>,
    delete_batches: Mutex<Vec<usize>>,
    tasks: Mutex<u32>,
}

impl InMemoryIndex {
    pub fn seed<I, S>(&self, index: &str, ids: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut indexes = self.indexes.lock().unwrap();
        let records = indexes.entry(index.to_string()).or_default();
        records.extend(ids.into_iter().map(|id| SearchRecord {
            id: id.into(),
            fields: Map::new(),
        }));
    }

    /// Makes the next `n` write calls fail with a 429.
    pub fn rate_limit_next(&self, n: u32) {
        *self.rate_limited_writes.lock().unwrap() = n;
    }

    pub fn ids(&self, index: &str) -> Vec<String> {
        self.indexes
            .lock()
            .unwrap()
            .get(index)
            .map(|r| r.iter().map(|r| r.id.clone()).collect())
            .unwrap_or_default()
    }

    pub fn record(&self, index: &str, id: &str) -> Option<SearchRecord> {
        self.indexes
            .lock()
            .unwrap()
            .get(index)
            .and_then(|r| r.iter().find(|r| r.id == id).cloned())
    }

    pub fn has_index(&self, index: &str) -> bool {
        self.indexes.lock().unwrap().contains_key(index)
    }

    pub fn delete_batches(&self) -> Vec<usize> {
        self.delete_batches.lock().unwrap().clone()
    }

    fn write_gate(&self) -> Result<TaskReceipt, AppError> {
        let mut limited = self.rate_limited_writes.lock().unwrap();
        if *limited > 0 {
            *limited -= 1;
            return Err(AppError::RateLimitExceeded);
        }
        let mut tasks = self.tasks.lock().unwrap();
        *tasks += 1;
        Ok(TaskReceipt { task_uid: *tasks })
    }
}

#[async_trait]
impl SearchIndex for InMemoryIndex {
    async fn ensure_index(&self, index: &str) -> Result<(), AppError> {
        self.indexes
            .lock()
            .unwrap()
            .entry(index.to_string())
            .or_default();
        Ok(())
    }

    async fn document_ids(
        &self,
        index: &str,
        offset: usize,
        limit: usize,
    ) -> Result<Vec<String>, AppError> {
        Ok(self.ids(index).into_iter().skip(offset).take(limit).collect())
    }

    async fn upsert_documents(
        &self,
        index: &str,
        records: &[SearchRecord],
    ) -> Result<TaskReceipt, AppError> {
        let receipt = self.write_gate()?;
        let mut indexes = self.indexes.lock().unwrap();
        let existing = indexes.entry(index.to_string()).or_default();
        for record in records {
            match existing.iter_mut().find(|r| r.id == record.id) {
                Some(slot) => *slot = record.clone(),
                None => existing.push(record.clone()),
            }
        }
        Ok(receipt)
    }

    async fn delete_documents(
        &self,
        index: &str,
        ids: &[String],
    ) -> Result<TaskReceipt, AppError> {
        let receipt = self.write_gate()?;
        self.delete_batches.lock().unwrap().push(ids.len());
        if let Some(records) = self.indexes.lock().unwrap().get_mut(index) {
            records.retain(|r| !ids.contains(&r.id));
        }
        Ok(receipt)
    }

    async fn delete_all_documents(&self, index: &str) -> Result<TaskReceipt, AppError> {
        let receipt = self.write_gate()?;
        if let Some(records) = self.indexes.lock().unwrap().get_mut(index) {
            records.clear();
        }
        Ok(receipt)
    }

    async fn health(&self) -> Result<EngineHealth, AppError> {
        Ok(EngineHealth {
            status: "available".to_string(),
            version: Some("1.8.0".to_string()),
        })
    }

    async fn index_uids(&self) -> Result<Vec<String>, AppError> {
        Ok(self.indexes.lock().unwrap().keys().cloned().collect())
    }

    async fn index_stats(&self, index: &str) -> Result<IndexStats, AppError> {
        let indexes = self.indexes.lock().unwrap();
        let records = indexes
            .get(index)
            .ok_or_else(|| AppError::NotFound(format!("index {index}")))?;
        Ok(IndexStats {
            number_of_documents: records.len() as u64,
            is_indexing: false,
        })
    }
}

/// Users and team memberships. Adding an existing member is a `Conflict`.
#[derive(Default)]
pub struct InMemoryTeams {
    users: Mutex<Vec<Value>>,
    /// (membership id, team id, user id)
    memberships: Mutex<Vec<(String, String, String)>>,
}

impl InMemoryTeams {
    pub fn add_user(&self, user: Value) {
        self.users.lock().unwrap().push(user);
    }

    pub fn join(&self, team_id: &str, user_id: &str) -> String {
        let mut memberships = self.memberships.lock().unwrap();
        let id = format!("m-{}", memberships.len() + 1);
        memberships.push((id.clone(), team_id.to_string(), user_id.to_string()));
        id
    }

    pub fn is_member(&self, team_id: &str, user_id: &str) -> bool {
        self.memberships
            .lock()
            .unwrap()
            .iter()
            .any(|(_, t, u)| t == team_id && u == user_id)
    }
}

#[async_trait]
impl TeamDirectory for InMemoryTeams {
    async fn list_users(
        &self,
        search: Option<&str>,
        limit: u32,
        offset: u32,
    ) -> Result<UserPage, AppError> {
        let users: Vec<Value> = self
            .users
            .lock()
            .unwrap()
            .iter()
            .filter(|u| match search {
                Some(term) => u["name"].as_str().is_some_and(|n| n.contains(term)),
                None => true,
            })
            .cloned()
            .collect();
        let total = users.len() as u64;
        let users = users
            .into_iter()
            .skip(offset as usize)
            .take(limit as usize)
            .collect();
        Ok(UserPage { total, users })
    }

    async fn user_team_ids(&self, user_id: &str) -> Result<Vec<String>, AppError> {
        Ok(self
            .memberships
            .lock()
            .unwrap()
            .iter()
            .filter(|(_, _, u)| u == user_id)
            .map(|(_, t, _)| t.clone())
            .collect())
    }

    async fn add_membership(
        &self,
        team_id: &str,
        user_id: &str,
        _roles: &[String],
        _redirect_url: &str,
    ) -> Result<String, AppError> {
        if self.is_member(team_id, user_id) {
            return Err(AppError::Conflict("membership already exists".to_string()));
        }
        Ok(self.join(team_id, user_id))
    }

    async fn find_membership(
        &self,
        team_id: &str,
        user_id: &str,
    ) -> Result<Option<String>, AppError> {
        Ok(self
            .memberships
            .lock()
            .unwrap()
            .iter()
            .find(|(_, t, u)| t == team_id && u == user_id)
            .map(|(id, _, _)| id.clone()))
    }

    async fn delete_membership(&self, team_id: &str, membership_id: &str) -> Result<(), AppError> {
        self.memberships
            .lock()
            .unwrap()
            .retain(|(id, t, _)| !(id == membership_id && t == team_id));
        Ok(())
    }
}

/// A catalog serving a fixed list of addon names.
pub struct FakeCatalog {
    source: ModSource,
    names: Vec<String>,
    fail: bool,
    calls: Mutex<usize>,
}

impl FakeCatalog {
    pub fn new(source: ModSource, names: &[&str]) -> Self {
        Self {
            source,
            names: names.iter().map(|n| n.to_string()).collect(),
            fail: false,
            calls: Mutex::new(0),
        }
    }

    pub fn failing(source: ModSource) -> Self {
        Self {
            fail: true,
            ..Self::new(source, &[])
        }
    }

    pub fn calls(&self) -> usize {
        *self.calls.lock().unwrap()
    }

    pub fn addon(source: ModSource, name: &str) -> Addon {
        let id = Some(format!("{}-{}", source.as_str().to_lowercase(), name));
        let (curseforge_id, modrinth_id) = match source {
            ModSource::CurseForge => (id, None),
            ModSource::Modrinth => (None, id),
        };
        Addon {
            name: name.to_string(),
            sources: vec![source.to_string()],
            curseforge_id,
            modrinth_id,
            downloads: 10,
            ..Default::default()
        }
    }
}

#[async_trait]
impl AddonCatalog for FakeCatalog {
    fn source(&self) -> ModSource {
        self.source
    }

    async fn fetch_page(
        &self,
        offset: u32,
        limit: u32,
        _query: &str,
        _taxonomy: &Taxonomy,
    ) -> Result<CatalogPage, AppError> {
        *self.calls.lock().unwrap() += 1;
        if self.fail {
            return Err(AppError::ClientError("HTTP 500: upstream down".to_string()));
        }
        let addons: Vec<Addon> = self
            .names
            .iter()
            .skip(offset as usize)
            .take(limit as usize)
            .map(|n| Self::addon(self.source, n))
            .collect();
        Ok(CatalogPage {
            fetched: addons.len(),
            addons,
        })
    }
}
