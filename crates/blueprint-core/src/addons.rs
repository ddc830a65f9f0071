//! Addon normalization and merging.
//!
//! The catalog clients turn their raw API payloads into [`Addon`] records
//! with the helpers here; the scanner then merges records that share a name
//! across catalogs.

use std::collections::HashMap;
use std::sync::OnceLock;

use async_trait::async_trait;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::AppError;
use crate::models::{Addon, ModSource};

const LOADERS: &[&str] = &[
    "forge",
    "fabric",
    "quilt",
    "liteloader",
    "rift",
    "bukkit",
    "spigot",
    "paper",
    "fabric-api",
    "fml",
    "bedrock",
    "sponge",
    "tconstruct",
    "curseforge",
    "neoforge",
];

const CATEGORIES: &[&str] = &[
    "storage",
    "food",
    "technology",
    "utility",
    "transportation",
    "management",
    "game-mechanics",
    "adventure",
    "worldgen",
    "equipment",
    "decoration",
    "cursed",
    "minigame",
    "mobs",
    "optimisation",
    "economy",
    "datapack",
    "magic",
    "social",
    "library",
    "optimization",
];

/// Allow-lists of loader and category tags kept on an addon.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Taxonomy {
    pub loaders: Vec<String>,
    pub categories: Vec<String>,
}

impl Default for Taxonomy {
    fn default() -> Self {
        Self {
            loaders: LOADERS.iter().map(|s| s.to_string()).collect(),
            categories: CATEGORIES.iter().map(|s| s.to_string()).collect(),
        }
    }
}

impl Taxonomy {
    pub fn is_loader(&self, tag: &str) -> bool {
        let tag = tag.to_lowercase();
        self.loaders.iter().any(|l| *l == tag)
    }

    pub fn is_category(&self, tag: &str) -> bool {
        let tag = tag.to_lowercase();
        self.categories.iter().any(|c| *c == tag)
    }

    pub fn loaders_in<'a, I: IntoIterator<Item = &'a str>>(&self, tags: I) -> Vec<String> {
        unique(tags.into_iter().filter(|t| self.is_loader(t)))
    }

    pub fn categories_in<'a, I: IntoIterator<Item = &'a str>>(&self, tags: I) -> Vec<String> {
        unique(tags.into_iter().filter(|t| self.is_category(t)))
    }
}

fn version_patterns() -> &'static [Regex] {
    static PATTERNS: OnceLock<Vec<Regex>> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        [r"^\d+\.\d+(\.\d+)?$", r"^\d+w\d+[a-z]$"]
            .into_iter()
            .filter_map(|p| Regex::new(p).ok())
            .collect()
    })
}

/// True for release versions (`1.20.1`), weekly snapshots (`23w13a`) and the
/// generic `snapshot` tag.
///
/// # Examples
///
/// ```
/// use blueprint_core::addons::is_minecraft_version;
///
/// assert!(is_minecraft_version("1.19.2"));
/// assert!(is_minecraft_version("23w13a"));
/// assert!(!is_minecraft_version("Forge"));
/// ```
pub fn is_minecraft_version(tag: &str) -> bool {
    tag == "snapshot" || version_patterns().iter().any(|re| re.is_match(tag))
}

pub fn minecraft_versions_in<'a, I: IntoIterator<Item = &'a str>>(tags: I) -> Vec<String> {
    unique(tags.into_iter().filter(|t| is_minecraft_version(t)))
}

/// First non-blank candidate, trimmed; otherwise `"<source>-<id>"`.
pub fn pick_name(candidates: &[Option<&str>], source: ModSource, id: Option<&str>) -> Option<String> {
    candidates
        .iter()
        .flatten()
        .map(|c| c.trim())
        .find(|c| !c.is_empty())
        .map(str::to_string)
        .or_else(|| {
            id.filter(|i| !i.is_empty())
                .map(|i| format!("{}-{}", source.as_str(), i))
        })
}

fn unique<'a, I: IntoIterator<Item = &'a str>>(items: I) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for item in items {
        if !out.iter().any(|o| o == item) {
            out.push(item.to_string());
        }
    }
    out
}

fn union_into(target: &mut Vec<String>, extra: &[String]) {
    for item in extra {
        if !target.contains(item) {
            target.push(item.clone());
        }
    }
}

fn fill_if_empty(target: &mut String, other: &str) {
    if target.is_empty() {
        *target = other.to_string();
    }
}

fn fill_opt(target: &mut Option<String>, other: &Option<String>) {
    if target.as_deref().map_or(true, str::is_empty) {
        if let Some(v) = other.as_deref().filter(|v| !v.is_empty()) {
            *target = Some(v.to_string());
        }
    }
}

/// Merges addons sharing a name.
///
/// List fields are unioned, downloads summed, and every other field keeps
/// the first non-empty value. Output order follows first appearance.
pub fn combine_duplicates(addons: Vec<Addon>) -> Vec<Addon> {
    let mut order: Vec<String> = Vec::new();
    let mut by_name: HashMap<String, Addon> = HashMap::new();

    for addon in addons {
        match by_name.get_mut(&addon.name) {
            Some(existing) => {
                union_into(&mut existing.sources, &addon.sources);
                existing.downloads += addon.downloads;
                fill_if_empty(&mut existing.description, &addon.description);
                fill_if_empty(&mut existing.icon, &addon.icon);
                fill_if_empty(&mut existing.slug, &addon.slug);
                fill_if_empty(&mut existing.body, &addon.body);
                union_into(&mut existing.categories, &addon.categories);
                union_into(&mut existing.minecraft_versions, &addon.minecraft_versions);
                union_into(&mut existing.loaders, &addon.loaders);
                union_into(&mut existing.authors, &addon.authors);
                fill_if_empty(&mut existing.created_at, &addon.created_at);
                fill_if_empty(&mut existing.updated_at, &addon.updated_at);
                fill_opt(&mut existing.curseforge_id, &addon.curseforge_id);
                fill_opt(&mut existing.modrinth_id, &addon.modrinth_id);
                fill_opt(&mut existing.curseforge_raw, &addon.curseforge_raw);
                fill_opt(&mut existing.modrinth_raw, &addon.modrinth_raw);
            }
            None => {
                order.push(addon.name.clone());
                by_name.insert(addon.name.clone(), addon);
            }
        }
    }

    order
        .into_iter()
        .filter_map(|name| by_name.remove(&name))
        .collect()
}

/// The record written when `incoming` from `source` matches a stored addon.
///
/// Sources and authors accumulate, catalog ids already stored are kept, and
/// downloads take the larger figure so repeated scans do not inflate them.
pub fn merge_existing(existing: &Addon, incoming: &Addon, source: ModSource) -> Addon {
    let mut merged = incoming.clone();

    merged.sources = existing.sources.clone();
    union_into(&mut merged.sources, &[source.to_string()]);

    merged.authors = existing.authors.clone();
    union_into(&mut merged.authors, &incoming.authors);

    merged.curseforge_id = existing.curseforge_id.clone();
    fill_opt(&mut merged.curseforge_id, &incoming.curseforge_id);
    merged.modrinth_id = existing.modrinth_id.clone();
    fill_opt(&mut merged.modrinth_id, &incoming.modrinth_id);

    // Keep the other catalog's raw payload.
    fill_opt(&mut merged.curseforge_raw, &existing.curseforge_raw);
    fill_opt(&mut merged.modrinth_raw, &existing.modrinth_raw);

    merged.downloads = existing.downloads.max(incoming.downloads);
    merged
}

/// One page fetched from a catalog.
#[derive(Debug, Clone, Default)]
pub struct CatalogPage {
    /// Raw results returned by the catalog, before normalization.
    pub fetched: usize,
    pub addons: Vec<Addon>,
}

impl CatalogPage {
    /// Results dropped because no usable name could be derived.
    pub fn filtered(&self) -> usize {
        self.fetched.saturating_sub(self.addons.len())
    }
}

/// A third-party mod catalog.
#[async_trait]
pub trait AddonCatalog: Send + Sync {
    fn source(&self) -> ModSource;

    /// Searches `query`, attaches long descriptions, and normalizes results.
    async fn fetch_page(
        &self,
        offset: u32,
        limit: u32,
        query: &str,
        taxonomy: &Taxonomy,
    ) -> Result<CatalogPage, AppError>;
}
