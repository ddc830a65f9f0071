use async_trait::async_trait;
use blueprint_core::addons::{
    minecraft_versions_in, pick_name, AddonCatalog, CatalogPage, Taxonomy,
};
use blueprint_core::config::HttpConfig;
use blueprint_core::error::AppError;
use blueprint_core::models::{Addon, ModSource};
use blueprint_core::retry::{RateLimiter, RetryPolicy};
use futures::stream::{self, StreamExt};
use reqwest::{Client, Url};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use crate::http;

const DEFAULT_BASE_URL: &str = "https://api.modrinth.com/v2/";

/// Project lookups kept in flight per page.
const PROJECT_CONCURRENCY: usize = 5;

#[derive(Deserialize, Debug)]
struct SearchResponse {
    #[serde(default)]
    hits: Vec<ModrinthHit>,
}

/// A search hit from `search`.
#[derive(Deserialize, Serialize, Debug, Clone, Default)]
pub struct ModrinthHit {
    #[serde(default)]
    pub project_id: Option<String>,
    #[serde(default)]
    pub slug: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    /// Mixed category and loader tags.
    #[serde(default)]
    pub categories: Vec<String>,
    #[serde(default)]
    pub versions: Vec<String>,
    #[serde(default)]
    pub icon_url: Option<String>,
    #[serde(default)]
    pub date_created: Option<String>,
    #[serde(default)]
    pub date_modified: Option<String>,
    #[serde(default)]
    pub author: Option<String>,
    #[serde(default)]
    pub downloads: u64,
    /// Long markdown description, fetched from the project endpoint.
    #[serde(skip)]
    pub body: Option<String>,
    #[serde(flatten)]
    pub extras: serde_json::Map<String, Value>,
}

/// A full project from `project/{id}`.
#[derive(Deserialize, Debug, Clone)]
pub struct ModrinthProject {
    pub id: String,
    #[serde(default)]
    pub slug: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub body: Option<String>,
    #[serde(flatten)]
    pub extras: serde_json::Map<String, Value>,
}

/// Projects and versions a project depends on.
#[derive(Deserialize, Debug, Clone, Default)]
pub struct ModrinthDependencies {
    #[serde(default)]
    pub projects: Vec<Value>,
    #[serde(default)]
    pub versions: Vec<Value>,
}

/// HTTP client for the Modrinth v2 API. No key is needed.
#[derive(Clone)]
pub struct ModrinthClient {
    client: Client,
    base_url: Url,
    limiter: Arc<RateLimiter>,
    retry: RetryPolicy,
    timeout: Duration,
}

impl ModrinthClient {
    pub fn new() -> Result<Self, AppError> {
        Self::with_config(DEFAULT_BASE_URL, &HttpConfig::default())
    }

    pub fn with_config(base_url: &str, config: &HttpConfig) -> Result<Self, AppError> {
        Ok(Self {
            client: http::build_client("blueprint-create/addon-scanner/0.1", config)?,
            base_url: http::parse_base_url(base_url)?,
            limiter: Arc::new(RateLimiter::new(Duration::ZERO)),
            retry: http::retry_policy(config),
            timeout: config.timeout,
        })
    }

    /// Spaces consecutive requests at least `delay` apart.
    pub fn with_request_delay(mut self, delay: Duration) -> Self {
        self.limiter = Arc::new(RateLimiter::new(delay));
        self
    }

    async fn get<T: serde::de::DeserializeOwned>(&self, url: Url) -> Result<T, AppError> {
        http::get_json(
            || self.client.get(url.clone()),
            &self.limiter,
            self.retry,
            self.timeout,
        )
        .await
    }

    /// Searches mod projects.
    pub async fn search_mods(
        &self,
        offset: u32,
        limit: u32,
        query: &str,
    ) -> Result<Vec<ModrinthHit>, AppError> {
        let mut url = http::join(&self.base_url, "search")?;
        url.query_pairs_mut()
            .append_pair("query", query)
            .append_pair("limit", &limit.to_string())
            .append_pair("offset", &offset.to_string())
            .append_pair("facets", r#"[["project_type:mod"]]"#);

        debug!(offset, limit, query, "Searching Modrinth");
        let resp: SearchResponse = self.get(url).await?;
        Ok(resp.hits)
    }

    /// Fetches a project by id or slug.
    pub async fn project(&self, id_or_slug: &str) -> Result<ModrinthProject, AppError> {
        let url = http::join(&self.base_url, &format!("project/{}", id_or_slug))?;
        self.get(url).await
    }

    pub async fn dependencies(&self, project_id: &str) -> Result<ModrinthDependencies, AppError> {
        let url = http::join(&self.base_url, &format!("project/{}/dependencies", project_id))?;
        self.get(url).await
    }

    async fn attach_bodies(&self, hits: Vec<ModrinthHit>) -> Vec<ModrinthHit> {
        stream::iter(hits)
            .map(|mut hit| async move {
                let Some(identifier) = hit.slug.clone().or_else(|| hit.project_id.clone()) else {
                    return hit;
                };
                match self.project(&identifier).await {
                    Ok(project) => hit.body = project.body.filter(|b| !b.is_empty()),
                    Err(e) => warn!(project = %identifier, error = %e, "Modrinth project fetch failed"),
                }
                hit
            })
            .buffered(PROJECT_CONCURRENCY)
            .collect()
            .await
    }

    /// Normalizes a search hit into an [`Addon`].
    ///
    /// Modrinth mixes loaders into `categories`, so both lists are filtered
    /// out of the same tags. Returns `None` when no name can be derived.
    pub fn into_addon(hit: ModrinthHit, taxonomy: &Taxonomy) -> Option<Addon> {
        let extra_str = |key: &str| hit.extras.get(key).and_then(Value::as_str);
        let name = pick_name(
            &[
                hit.title.as_deref(),
                extra_str("name"),
                extra_str("displayName"),
                hit.slug.as_deref(),
            ],
            ModSource::Modrinth,
            hit.project_id.as_deref(),
        )?;

        let tags: Vec<&str> = hit.categories.iter().map(String::as_str).collect();
        let versions: Vec<&str> = match hit.extras.get("game_versions").and_then(Value::as_array) {
            Some(list) => list.iter().filter_map(Value::as_str).collect(),
            None => hit.versions.iter().map(String::as_str).collect(),
        };

        Some(Addon {
            curseforge_id: None,
            modrinth_id: hit.project_id.clone(),
            name,
            description: hit.description.clone().unwrap_or_default(),
            slug: hit.slug.clone().unwrap_or_default(),
            sources: vec![ModSource::Modrinth.to_string()],
            icon: hit.icon_url.clone().unwrap_or_default(),
            created_at: hit.date_created.clone().unwrap_or_default(),
            updated_at: hit.date_modified.clone().unwrap_or_default(),
            authors: vec![hit.author.clone().unwrap_or_default()],
            categories: taxonomy.categories_in(tags.iter().copied()),
            downloads: hit.downloads,
            curseforge_raw: None,
            modrinth_raw: serde_json::to_string(&hit).ok(),
            minecraft_versions: minecraft_versions_in(versions),
            loaders: taxonomy.loaders_in(tags.iter().copied()),
            body: hit.body.clone().unwrap_or_default(),
        })
    }
}

#[async_trait]
impl AddonCatalog for ModrinthClient {
    fn source(&self) -> ModSource {
        ModSource::Modrinth
    }

    async fn fetch_page(
        &self,
        offset: u32,
        limit: u32,
        query: &str,
        taxonomy: &Taxonomy,
    ) -> Result<CatalogPage, AppError> {
        let hits = self.search_mods(offset, limit, query).await?;
        let fetched = hits.len();
        let hits = self.attach_bodies(hits).await;
        let addons = hits
            .into_iter()
            .filter_map(|h| Self::into_addon(h, taxonomy))
            .collect();
        Ok(CatalogPage { fetched, addons })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_into_addon_splits_tags() {
        let hit: ModrinthHit = serde_json::from_value(json!({
            "project_id": "LNytGWDc",
            "slug": "create",
            "title": "Create",
            "description": "Aesthetic technology",
            "categories": ["technology", "decoration", "fabric", "forge"],
            "versions": ["1.19.2", "1.20.1", "23w13a", "b1.7.3"],
            "icon_url": "https://cdn.modrinth.com/create.png",
            "author": "simibubi",
            "downloads": 5000000,
            "follows": 12
        }))
        .unwrap();

        let addon = ModrinthClient::into_addon(hit, &Taxonomy::default()).unwrap();
        assert_eq!(addon.modrinth_id.as_deref(), Some("LNytGWDc"));
        assert_eq!(addon.categories, vec!["technology", "decoration"]);
        assert_eq!(addon.loaders, vec!["fabric", "forge"]);
        assert_eq!(addon.minecraft_versions, vec!["1.19.2", "1.20.1", "23w13a"]);
        assert_eq!(addon.authors, vec!["simibubi"]);
        assert_eq!(addon.sources, vec!["Modrinth"]);

        let raw: Value = serde_json::from_str(addon.modrinth_raw.as_deref().unwrap()).unwrap();
        assert_eq!(raw["follows"], 12);
    }

    #[test]
    fn test_into_addon_fallback_and_missing_name() {
        let hit: ModrinthHit =
            serde_json::from_value(json!({"project_id": "abc", "title": ""})).unwrap();
        assert_eq!(
            ModrinthClient::into_addon(hit, &Taxonomy::default())
                .unwrap()
                .name,
            "Modrinth-abc"
        );

        let nameless: ModrinthHit = serde_json::from_value(json!({"downloads": 3})).unwrap();
        assert!(ModrinthClient::into_addon(nameless, &Taxonomy::default()).is_none());
    }
}
