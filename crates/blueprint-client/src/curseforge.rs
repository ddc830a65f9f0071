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

const DEFAULT_BASE_URL: &str = "https://api.curseforge.com/v1/";

/// CurseForge game id of Minecraft.
pub const MINECRAFT_GAME_ID: u32 = 432;

/// Class id of "Mods" (as opposed to modpacks, resource packs, ...).
pub const MODS_CLASS_ID: u32 = 6;

/// Category id of modpacks, excluded from category listings.
pub const MODPACKS_CATEGORY_ID: u64 = 4471;

const MOD_LOADER_TYPES: &[&str] = &["Forge", "Fabric", "NeoForge"];

const DEFAULT_GAME_VERSIONS: &[&str] = &["1.20.1", "1.20", "1.20.2", "1.20.3", "1.20.4", "1.19.2"];

/// Description requests kept in flight per page.
const DESCRIPTION_CONCURRENCY: usize = 5;

/// Every CurseForge response wraps its payload in `data`.
#[derive(Deserialize, Debug)]
struct CurseForgeResponse<T> {
    data: T,
}

#[derive(Deserialize, Serialize, Debug, Clone, Default)]
#[serde(rename_all = "camelCase")]
pub struct CurseForgeLogo {
    #[serde(default)]
    pub thumbnail_url: Option<String>,
}

#[derive(Deserialize, Serialize, Debug, Clone, Default)]
pub struct CurseForgeAuthor {
    #[serde(default)]
    pub name: String,
}

#[derive(Deserialize, Serialize, Debug, Clone, Default)]
#[serde(rename_all = "camelCase")]
pub struct CurseForgeFile {
    #[serde(default)]
    pub game_versions: Vec<String>,
}

/// A mod as returned by `mods/search`.
///
/// Fields the scanner does not read are kept in `extras` so the raw payload
/// can be stored alongside the normalized addon.
///
/// # Examples
///
/// ```
/// use blueprint_client::curseforge::CurseForgeMod;
///
/// let json = r#"{
///     "id": 328085,
///     "name": "Create",
///     "slug": "create",
///     "downloadCount": 1000,
///     "classId": 6
/// }"#;
///
/// let m: CurseForgeMod = serde_json::from_str(json).unwrap();
/// assert_eq!(m.id, 328085);
/// assert_eq!(m.download_count, 1000);
/// assert!(m.extras.contains_key("classId"));
/// ```
#[derive(Deserialize, Serialize, Debug, Clone, Default)]
#[serde(rename_all = "camelCase")]
pub struct CurseForgeMod {
    pub id: u64,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub slug: Option<String>,
    #[serde(default)]
    pub summary: Option<String>,
    #[serde(default)]
    pub logo: Option<CurseForgeLogo>,
    #[serde(default)]
    pub date_created: Option<String>,
    #[serde(default)]
    pub date_modified: Option<String>,
    #[serde(default)]
    pub authors: Vec<CurseForgeAuthor>,
    /// Category objects; plain strings are accepted too.
    #[serde(default)]
    pub categories: Vec<Value>,
    #[serde(default)]
    pub download_count: u64,
    #[serde(default)]
    pub latest_files: Vec<CurseForgeFile>,
    /// Long HTML description, fetched separately.
    #[serde(skip)]
    pub body: Option<String>,
    #[serde(flatten)]
    pub extras: serde_json::Map<String, Value>,
}

/// A CurseForge category.
#[derive(Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CurseForgeCategory {
    pub id: u64,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub slug: String,
    #[serde(default)]
    pub class_id: Option<u64>,
}

/// HTTP client for the CurseForge v1 API.
///
/// # Examples
///
/// ```no_run
/// use blueprint_client::CurseForgeClient;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let client = CurseForgeClient::new("my-api-key")?;
/// let mods = client.search_mods(0, 50, "create").await?;
/// println!("Found {} mods", mods.len());
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct CurseForgeClient {
    client: Client,
    base_url: Url,
    api_key: String,
    game_versions: Vec<String>,
    limiter: Arc<RateLimiter>,
    retry: RetryPolicy,
    timeout: Duration,
}

impl CurseForgeClient {
    /// Creates a client against the public CurseForge API.
    pub fn new(api_key: &str) -> Result<Self, AppError> {
        Self::with_config(DEFAULT_BASE_URL, api_key, &HttpConfig::default())
    }

    /// Creates a client against `base_url`.
    ///
    /// # Errors
    ///
    /// Returns `AppError::InvalidUrl` if the URL is malformed.
    /// Returns `AppError::ClientError` if the HTTP client cannot be built.
    pub fn with_config(
        base_url: &str,
        api_key: &str,
        config: &HttpConfig,
    ) -> Result<Self, AppError> {
        Ok(Self {
            client: http::build_client("Blueprint/0.1 (addon-scanner)", config)?,
            base_url: http::parse_base_url(base_url)?,
            api_key: api_key.to_string(),
            game_versions: DEFAULT_GAME_VERSIONS.iter().map(|v| v.to_string()).collect(),
            limiter: Arc::new(RateLimiter::new(Duration::ZERO)),
            retry: http::retry_policy(config),
            timeout: config.timeout,
        })
    }

    /// Restricts searches to these Minecraft versions.
    pub fn with_game_versions(mut self, versions: Vec<String>) -> Self {
        self.game_versions = versions;
        self
    }

    /// Spaces consecutive requests, description lookups included, at least
    /// `delay` apart.
    pub fn with_request_delay(mut self, delay: Duration) -> Self {
        self.limiter = Arc::new(RateLimiter::new(delay));
        self
    }

    async fn get<T: serde::de::DeserializeOwned>(&self, url: Url) -> Result<T, AppError> {
        let resp: CurseForgeResponse<T> = http::get_json(
            || {
                self.client
                    .get(url.clone())
                    .header("x-api-key", &self.api_key)
            },
            &self.limiter,
            self.retry,
            self.timeout,
        )
        .await?;
        Ok(resp.data)
    }

    /// Searches Minecraft mods, most downloaded first.
    ///
    /// # Arguments
    ///
    /// * `index` - Offset of the first result
    /// * `page_size` - Maximum number of results
    /// * `filter` - Free-text search filter
    pub async fn search_mods(
        &self,
        index: u32,
        page_size: u32,
        filter: &str,
    ) -> Result<Vec<CurseForgeMod>, AppError> {
        let mut url = http::join(&self.base_url, "mods/search")?;
        let loaders = serde_json::to_string(MOD_LOADER_TYPES)?;
        let versions = serde_json::to_string(&self.game_versions)?;
        url.query_pairs_mut()
            .append_pair("gameId", &MINECRAFT_GAME_ID.to_string())
            .append_pair("classId", &MODS_CLASS_ID.to_string())
            .append_pair("searchFilter", filter)
            .append_pair("index", &index.to_string())
            .append_pair("pageSize", &page_size.to_string())
            .append_pair("sortField", "downloadCount")
            .append_pair("sortOrder", "desc")
            .append_pair("modLoaderTypes", &loaders)
            .append_pair("gameVersions", &versions);

        debug!(index, page_size, filter, "Searching CurseForge");
        self.get(url).await
    }

    /// Fetches the long HTML description of a mod.
    pub async fn mod_description(&self, mod_id: u64) -> Result<String, AppError> {
        let url = http::join(&self.base_url, &format!("mods/{}/description", mod_id))?;
        let description: Option<String> = self.get(url).await?;
        Ok(description.unwrap_or_default())
    }

    /// Lists every Minecraft category.
    pub async fn categories(&self) -> Result<Vec<CurseForgeCategory>, AppError> {
        let mut url = http::join(&self.base_url, "categories")?;
        url.query_pairs_mut()
            .append_pair("gameId", &MINECRAFT_GAME_ID.to_string());
        self.get(url).await
    }

    /// Ids of every category except modpacks.
    pub async fn categories_excluding_modpacks(&self) -> Result<Vec<u64>, AppError> {
        Ok(self
            .categories()
            .await?
            .into_iter()
            .map(|c| c.id)
            .filter(|id| *id != MODPACKS_CATEGORY_ID)
            .collect())
    }

    /// Fills in `body` for each mod. A failed lookup leaves it empty.
    async fn attach_descriptions(&self, mods: Vec<CurseForgeMod>) -> Vec<CurseForgeMod> {
        stream::iter(mods)
            .map(|mut m| async move {
                match self.mod_description(m.id).await {
                    Ok(body) if !body.is_empty() => m.body = Some(body),
                    Ok(_) => {}
                    Err(e) => warn!(mod_id = m.id, error = %e, "CurseForge description fetch failed"),
                }
                m
            })
            .buffered(DESCRIPTION_CONCURRENCY)
            .collect()
            .await
    }

    /// Normalizes a CurseForge mod into an [`Addon`].
    ///
    /// Loaders and Minecraft versions both come from the game version tags
    /// of the latest files. Returns `None` when no name can be derived.
    ///
    /// # Examples
    ///
    /// ```
    /// use blueprint_client::CurseForgeClient;
    /// use blueprint_client::curseforge::CurseForgeMod;
    /// use blueprint_core::addons::Taxonomy;
    ///
    /// let m: CurseForgeMod = serde_json::from_str(r#"{
    ///     "id": 328085,
    ///     "name": "Create",
    ///     "latestFiles": [{"gameVersions": ["Forge", "1.20.1"]}]
    /// }"#).unwrap();
    ///
    /// let addon = CurseForgeClient::into_addon(m, &Taxonomy::default()).unwrap();
    /// assert_eq!(addon.curseforge_id.as_deref(), Some("328085"));
    /// assert_eq!(addon.loaders, vec!["Forge"]);
    /// assert_eq!(addon.minecraft_versions, vec!["1.20.1"]);
    /// ```
    pub fn into_addon(m: CurseForgeMod, taxonomy: &Taxonomy) -> Option<Addon> {
        let id = m.id.to_string();
        let extra_str = |key: &str| m.extras.get(key).and_then(Value::as_str);
        let name = pick_name(
            &[
                m.name.as_deref(),
                extra_str("displayName"),
                extra_str("title"),
                m.slug.as_deref(),
            ],
            ModSource::CurseForge,
            Some(&id),
        )?;

        let tags: Vec<&str> = m
            .latest_files
            .iter()
            .flat_map(|f| f.game_versions.iter().map(String::as_str))
            .collect();

        let category_tags: Vec<&str> = m
            .categories
            .iter()
            .filter_map(|c| match c {
                Value::String(s) => Some(s.as_str()),
                Value::Object(o) => o.get("slug").and_then(Value::as_str),
                _ => None,
            })
            .collect();

        let raw = serde_json::to_string(&m).ok();
        let description = m
            .summary
            .clone()
            .or_else(|| extra_str("description").map(str::to_string))
            .unwrap_or_default();

        Some(Addon {
            curseforge_id: Some(id),
            modrinth_id: None,
            name,
            description,
            slug: m.slug.clone().unwrap_or_default(),
            sources: vec![ModSource::CurseForge.to_string()],
            icon: m
                .logo
                .as_ref()
                .and_then(|l| l.thumbnail_url.clone())
                .unwrap_or_default(),
            created_at: m.date_created.clone().unwrap_or_default(),
            updated_at: m.date_modified.clone().unwrap_or_default(),
            authors: m.authors.iter().map(|a| a.name.clone()).collect(),
            categories: taxonomy.categories_in(category_tags),
            downloads: m.download_count,
            curseforge_raw: raw,
            modrinth_raw: None,
            minecraft_versions: minecraft_versions_in(tags.iter().copied()),
            loaders: taxonomy.loaders_in(tags.iter().copied()),
            body: m.body.clone().unwrap_or_default(),
        })
    }
}

#[async_trait]
impl AddonCatalog for CurseForgeClient {
    fn source(&self) -> ModSource {
        ModSource::CurseForge
    }

    async fn fetch_page(
        &self,
        offset: u32,
        limit: u32,
        query: &str,
        taxonomy: &Taxonomy,
    ) -> Result<CatalogPage, AppError> {
        let mods = self.search_mods(offset, limit, query).await?;
        let fetched = mods.len();
        let mods = self.attach_descriptions(mods).await;
        let addons = mods
            .into_iter()
            .filter_map(|m| Self::into_addon(m, taxonomy))
            .collect();
        Ok(CatalogPage { fetched, addons })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn parse(value: Value) -> CurseForgeMod {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_new_client() {
        assert!(CurseForgeClient::new("key").is_ok());
        assert!(CurseForgeClient::with_config("::", "key", &HttpConfig::default()).is_err());
    }

    #[test]
    fn test_into_addon_full_record() {
        let m = parse(json!({
            "id": 328085,
            "name": " Create ",
            "slug": "create",
            "summary": "Aesthetic technology",
            "logo": {"thumbnailUrl": "https://media.forgecdn.net/create.png"},
            "dateCreated": "2019-08-01T00:00:00Z",
            "dateModified": "2024-05-01T00:00:00Z",
            "authors": [{"name": "simibubi"}, {"name": "zelophed"}],
            "categories": [{"slug": "technology"}, "Storage", {"slug": "kitchen-sink"}],
            "downloadCount": 120000000,
            "latestFiles": [
                {"gameVersions": ["Forge", "1.20.1"]},
                {"gameVersions": ["NeoForge", "1.20.1", "Client"]}
            ]
        }));

        let addon = CurseForgeClient::into_addon(m, &Taxonomy::default()).unwrap();
        assert_eq!(addon.name, "Create");
        assert_eq!(addon.description, "Aesthetic technology");
        assert_eq!(addon.icon, "https://media.forgecdn.net/create.png");
        assert_eq!(addon.authors, vec!["simibubi", "zelophed"]);
        assert_eq!(addon.categories, vec!["technology", "Storage"]);
        assert_eq!(addon.loaders, vec!["Forge", "NeoForge"]);
        assert_eq!(addon.minecraft_versions, vec!["1.20.1"]);
        assert_eq!(addon.downloads, 120000000);
        assert_eq!(addon.sources, vec!["CurseForge"]);

        let raw: Value = serde_json::from_str(addon.curseforge_raw.as_deref().unwrap()).unwrap();
        assert_eq!(raw["id"], 328085);
    }

    #[test]
    fn test_into_addon_name_fallbacks() {
        let display = parse(json!({"id": 1, "name": "  ", "displayName": "Shown"}));
        assert_eq!(
            CurseForgeClient::into_addon(display, &Taxonomy::default())
                .unwrap()
                .name,
            "Shown"
        );

        let bare = parse(json!({"id": 42}));
        assert_eq!(
            CurseForgeClient::into_addon(bare, &Taxonomy::default())
                .unwrap()
                .name,
            "CurseForge-42"
        );
    }
}
