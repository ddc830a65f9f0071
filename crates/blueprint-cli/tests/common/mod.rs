//! In-memory backends and a spawned server for the function tests.

#![allow(dead_code)]

use std::sync::{Arc, Mutex};
use std::time::Duration;

use blueprint_cli::{build_router, AppState, Backends, Catalogs};
use blueprint_core::config::env_keys::*;
use blueprint_core::config::{FunctionEnv, FunctionsConfig};
use blueprint_core::error::AppError;
use blueprint_core::models::{Document, ModSource};
use blueprint_core::store::{DocumentStore, SearchIndex, TeamDirectory};
use blueprint_core::testing::{FakeCatalog, InMemoryIndex, InMemoryStore, InMemoryTeams};
use serde_json::Value;

pub const ADMIN_TEAM: &str = "team-admin";
pub const BETA_TEAM: &str = "team-beta";

/// Every key any function requires.
pub fn full_env() -> Vec<(&'static str, &'static str)> {
    vec![
        (APPWRITE_ENDPOINT, "http://appwrite.test/v1"),
        (APPWRITE_PROJECT_ID, "project"),
        (APPWRITE_FUNCTION_API_KEY, "function-key"),
        (APPWRITE_API_KEY, "project-key"),
        (MEILISEARCH_ENDPOINT, "http://meili.test"),
        (MEILISEARCH_ADMIN_API_KEY, "admin-key"),
        (MEILISEARCH_SEARCH_API_KEY, "search-key"),
        (CURSEFORGE_API_KEY, "cf-key"),
        (ADMIN_TEAM_ID, ADMIN_TEAM),
        (BETA_TESTER_TEAM_ID, BETA_TEAM),
        (ALLOWED_ORIGINS, "https://blueprint-create.com, http://localhost:5173"),
        (APPWRITE_URL, "https://appwrite.blueprint-create.com/v1"),
        (MEILISEARCH_URL, "https://search.blueprint-create.com"),
    ]
}

pub fn doc(id: &str, fields: Value) -> Document {
    let Value::Object(map) = fields else {
        panic!("document fields must be an object");
    };
    Document::new(id, map)
}

#[derive(Default)]
pub struct FakeBackends {
    pub store: Arc<InMemoryStore>,
    pub index: Arc<InMemoryIndex>,
    pub teams: Arc<InMemoryTeams>,
    /// Appwrite keys handed to `documents`, in call order.
    pub document_keys: Mutex<Vec<String>>,
}

impl Backends for FakeBackends {
    fn documents(
        &self,
        _env: &FunctionEnv,
        api_key: &str,
        _database_id: &str,
    ) -> Result<Arc<dyn DocumentStore>, AppError> {
        self.document_keys.lock().unwrap().push(api_key.to_string());
        Ok(self.store.clone())
    }

    fn search(&self, _env: &FunctionEnv) -> Result<Arc<dyn SearchIndex>, AppError> {
        Ok(self.index.clone())
    }

    fn teams(&self, _env: &FunctionEnv, _api_key: &str) -> Result<Arc<dyn TeamDirectory>, AppError> {
        Ok(self.teams.clone())
    }

    fn catalogs(&self, _env: &FunctionEnv, _request_delay: Duration) -> Result<Catalogs, AppError> {
        Ok(Catalogs {
            curseforge: Arc::new(FakeCatalog::new(ModSource::CurseForge, &[])),
            modrinth: Arc::new(FakeCatalog::new(ModSource::Modrinth, &[])),
        })
    }
}

/// Spins up the functions server on an OS-assigned port, returning the
/// base URL.
pub async fn spawn_server(env: &[(&str, &str)], backends: Arc<FakeBackends>) -> String {
    let state = Arc::new(AppState::new(
        FunctionEnv::from_pairs(env.iter().copied()),
        FunctionsConfig::default(),
        backends,
    ));
    let app = build_router(state);
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://127.0.0.1:{}", port)
}
