//! Shared state handed to every function handler.

use std::sync::Arc;
use std::time::Duration;

use blueprint_client::{CurseForgeClient, ModrinthClient};
use blueprint_core::addons::AddonCatalog;
use blueprint_core::config::env_keys::*;
use blueprint_core::config::{FunctionEnv, FunctionsConfig};
use blueprint_core::error::AppError;
use blueprint_core::store::{DocumentStore, SearchIndex, TeamDirectory};
use blueprint_db::{AppwriteClient, AppwriteDatabase, AppwriteTeams, MeiliIndexer};

/// Both mod catalogs, in scan order.
pub struct Catalogs {
    pub curseforge: Arc<dyn AddonCatalog>,
    pub modrinth: Arc<dyn AddonCatalog>,
}

/// Builds the remote services a handler talks to.
///
/// Handlers resolve credentials per request (a caller may supply its own
/// Appwrite key), so services are created on demand rather than once at
/// startup.
pub trait Backends: Send + Sync {
    fn documents(
        &self,
        env: &FunctionEnv,
        api_key: &str,
        database_id: &str,
    ) -> Result<Arc<dyn DocumentStore>, AppError>;

    fn search(&self, env: &FunctionEnv) -> Result<Arc<dyn SearchIndex>, AppError>;

    fn teams(&self, env: &FunctionEnv, api_key: &str) -> Result<Arc<dyn TeamDirectory>, AppError>;

    /// Both catalogs, spacing their requests at least `request_delay` apart.
    fn catalogs(&self, env: &FunctionEnv, request_delay: Duration)
        -> Result<Catalogs, AppError>;
}

/// Production backends: Appwrite, Meilisearch, CurseForge and Modrinth
/// over HTTP.
#[derive(Debug, Clone, Copy, Default)]
pub struct HttpBackends;

impl HttpBackends {
    fn appwrite(env: &FunctionEnv, api_key: &str) -> Result<AppwriteClient, AppError> {
        AppwriteClient::new(
            env.value(APPWRITE_ENDPOINT)?,
            env.value(APPWRITE_PROJECT_ID)?,
            api_key,
        )
    }
}

impl Backends for HttpBackends {
    fn documents(
        &self,
        env: &FunctionEnv,
        api_key: &str,
        database_id: &str,
    ) -> Result<Arc<dyn DocumentStore>, AppError> {
        let client = Self::appwrite(env, api_key)?;
        Ok(Arc::new(AppwriteDatabase::new(client, database_id)))
    }

    fn search(&self, env: &FunctionEnv) -> Result<Arc<dyn SearchIndex>, AppError> {
        let indexer = MeiliIndexer::new(
            env.value(MEILISEARCH_ENDPOINT)?,
            env.value(MEILISEARCH_ADMIN_API_KEY)?,
        )?;
        Ok(Arc::new(indexer))
    }

    fn teams(&self, env: &FunctionEnv, api_key: &str) -> Result<Arc<dyn TeamDirectory>, AppError> {
        Ok(Arc::new(AppwriteTeams::new(Self::appwrite(env, api_key)?)))
    }

    fn catalogs(&self, env: &FunctionEnv, request_delay: Duration) -> Result<Catalogs, AppError> {
        let curseforge = CurseForgeClient::new(env.value(CURSEFORGE_API_KEY)?)?
            .with_request_delay(request_delay);
        let modrinth = ModrinthClient::new()?.with_request_delay(request_delay);
        Ok(Catalogs {
            curseforge: Arc::new(curseforge),
            modrinth: Arc::new(modrinth),
        })
    }
}

/// Everything a handler needs: the environment snapshot, the functions
/// file and a way to reach the remote services.
pub struct AppState {
    pub env: FunctionEnv,
    pub config: FunctionsConfig,
    pub backends: Arc<dyn Backends>,
}

pub type SharedState = Arc<AppState>;

impl AppState {
    pub fn new(env: FunctionEnv, config: FunctionsConfig, backends: Arc<dyn Backends>) -> Self {
        Self {
            env,
            config,
            backends,
        }
    }

    /// Appwrite key for document access: the caller's `x-appwrite-key`
    /// header first, then the function key, then the project key.
    pub fn appwrite_key(&self, header_key: Option<&str>) -> Result<String, AppError> {
        header_key
            .filter(|k| !k.trim().is_empty())
            .or_else(|| {
                self.env
                    .first_of(&[APPWRITE_FUNCTION_API_KEY, APPWRITE_API_KEY])
            })
            .map(str::to_string)
            .ok_or_else(|| AppError::MissingEnv(vec![APPWRITE_FUNCTION_API_KEY.to_string()]))
    }

    /// Database id from the environment, falling back to the functions file.
    pub fn database_id(&self) -> &str {
        self.env
            .get(APPWRITE_DATABASE_ID)
            .unwrap_or(&self.config.database_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state(pairs: &[(&str, &str)]) -> AppState {
        AppState::new(
            FunctionEnv::from_pairs(pairs.iter().copied()),
            FunctionsConfig::default(),
            Arc::new(HttpBackends),
        )
    }

    #[test]
    fn test_header_key_wins() {
        let state = state(&[(APPWRITE_FUNCTION_API_KEY, "env-key")]);
        assert_eq!(state.appwrite_key(Some("header-key")).unwrap(), "header-key");
        assert_eq!(state.appwrite_key(Some(" ")).unwrap(), "env-key");
    }

    #[test]
    fn test_key_falls_back_to_project_key() {
        let state = state(&[(APPWRITE_API_KEY, "project-key")]);
        assert_eq!(state.appwrite_key(None).unwrap(), "project-key");
    }

    #[test]
    fn test_missing_key() {
        let err = state(&[]).appwrite_key(None).unwrap_err();
        assert!(matches!(err, AppError::MissingEnv(_)));
    }

    #[test]
    fn test_database_id_prefers_env() {
        assert_eq!(state(&[]).database_id(), "main");
        assert_eq!(state(&[(APPWRITE_DATABASE_ID, "staging")]).database_id(), "staging");
    }

    #[test]
    fn test_http_backends_need_endpoints() {
        let env = FunctionEnv::default();
        assert!(HttpBackends.search(&env).is_err());
        assert!(HttpBackends.documents(&env, "k", "main").is_err());
    }
}
