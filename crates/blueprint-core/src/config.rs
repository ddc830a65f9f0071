//! Configuration types for Blueprint components.
//!
//! Configuration is layered: built-in defaults, then an optional TOML
//! functions file, then the process environment. Secrets and endpoints only
//! ever come from the environment; the TOML file describes *what* to sync and
//! scan, never credentials.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::addons::Taxonomy;
use crate::error::AppError;

/// Appwrite database holding every synced collection.
pub const DEFAULT_DATABASE_ID: &str = "main";

/// Collection the addon scanner writes into.
pub const ADDONS_COLLECTION: &str = "addons";

/// Where team invitations redirect once accepted.
pub const DEFAULT_MEMBERSHIP_REDIRECT: &str = "https://blueprint-create.com";

/// Environment variable names shared by the functions.
pub mod env_keys {
    pub const APPWRITE_ENDPOINT: &str = "APPWRITE_FUNCTION_API_ENDPOINT";
    pub const APPWRITE_PROJECT_ID: &str = "APPWRITE_FUNCTION_PROJECT_ID";
    pub const APPWRITE_FUNCTION_API_KEY: &str = "APPWRITE_FUNCTION_API_KEY";
    pub const APPWRITE_API_KEY: &str = "APPWRITE_API_KEY";
    pub const MEILISEARCH_ENDPOINT: &str = "MEILISEARCH_ENDPOINT";
    pub const MEILISEARCH_ADMIN_API_KEY: &str = "MEILISEARCH_ADMIN_API_KEY";
    pub const MEILISEARCH_SEARCH_API_KEY: &str = "MEILISEARCH_SEARCH_API_KEY";
    pub const CURSEFORGE_API_KEY: &str = "CURSEFORGE_API_KEY";
    pub const ADMIN_TEAM_ID: &str = "ADMIN_TEAM_ID";
    pub const BETA_TESTER_TEAM_ID: &str = "BETA_TESTER_TEAM_ID";
    pub const ALLOWED_ORIGINS: &str = "ALLOWED_ORIGINS";
    pub const APPWRITE_URL: &str = "APPWRITE_URL";
    pub const APPWRITE_DATABASE_ID: &str = "APPWRITE_DATABASE_ID";
    pub const MEILISEARCH_URL: &str = "MEILISEARCH_URL";
}

use env_keys::*;

/// Keys the full index sync refuses to run without.
pub const SYNC_INDEX_ENV: &[&str] = &[
    APPWRITE_ENDPOINT,
    APPWRITE_PROJECT_ID,
    MEILISEARCH_ENDPOINT,
    MEILISEARCH_ADMIN_API_KEY,
    MEILISEARCH_SEARCH_API_KEY,
];

/// Keys the event-driven document sync needs.
pub const SYNC_DOCUMENT_ENV: &[&str] = &[
    APPWRITE_ENDPOINT,
    APPWRITE_PROJECT_ID,
    MEILISEARCH_ENDPOINT,
    MEILISEARCH_ADMIN_API_KEY,
];

pub const SCAN_ADDONS_ENV: &[&str] = &[
    APPWRITE_ENDPOINT,
    APPWRITE_PROJECT_ID,
    APPWRITE_FUNCTION_API_KEY,
    CURSEFORGE_API_KEY,
];

/// Keys exposed to the browser by the public env function.
pub const PUBLIC_ENV: &[&str] = &[APPWRITE_URL, MEILISEARCH_URL, MEILISEARCH_SEARCH_API_KEY];

pub const USER_DATA_ENV: &[&str] = &[APPWRITE_ENDPOINT, APPWRITE_PROJECT_ID];

pub const MANAGE_USERS_ENV: &[&str] = &[
    APPWRITE_API_KEY,
    APPWRITE_PROJECT_ID,
    ADMIN_TEAM_ID,
    BETA_TESTER_TEAM_ID,
    APPWRITE_ENDPOINT,
];

/// Snapshot of the environment a function runs with.
///
/// Taken once at startup so handlers never read `std::env` directly and tests
/// can build one from literal pairs.
#[derive(Debug, Clone, Default)]
pub struct FunctionEnv {
    vars: BTreeMap<String, String>,
}

impl FunctionEnv {
    /// Captures the current process environment.
    pub fn from_process() -> Self {
        Self {
            vars: std::env::vars().collect(),
        }
    }

    pub fn from_pairs<K, V, I>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            vars: pairs
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }

    /// Returns the value for `key`, treating empty and whitespace-only
    /// values as unset.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.vars
            .get(key)
            .map(String::as_str)
            .filter(|v| !v.trim().is_empty())
    }

    /// Returns the keys from `required` that are unset, in request order.
    pub fn missing(&self, required: &[&str]) -> Vec<String> {
        required
            .iter()
            .filter(|key| self.get(key).is_none())
            .map(|key| key.to_string())
            .collect()
    }

    /// Fails with [`AppError::MissingEnv`] if any key in `required` is unset.
    ///
    /// # Examples
    ///
    /// ```
    /// use blueprint_core::config::FunctionEnv;
    ///
    /// let env = FunctionEnv::from_pairs([("A", "1"), ("B", "")]);
    /// assert!(env.require(&["A"]).is_ok());
    /// assert!(env.require(&["A", "B"]).is_err());
    /// ```
    pub fn require(&self, required: &[&str]) -> Result<(), AppError> {
        let missing = self.missing(required);
        if missing.is_empty() {
            Ok(())
        } else {
            Err(AppError::MissingEnv(missing))
        }
    }

    /// Like [`get`](Self::get) but reports the key as missing.
    pub fn value(&self, key: &str) -> Result<&str, AppError> {
        self.get(key)
            .ok_or_else(|| AppError::MissingEnv(vec![key.to_string()]))
    }

    /// First set key among `keys`.
    pub fn first_of(&self, keys: &[&str]) -> Option<&str> {
        keys.iter().find_map(|k| self.get(k))
    }
}

/// Browser origins allowed to read the public configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AllowedOrigins(Vec<String>);

impl AllowedOrigins {
    /// Parses a comma-separated list, dropping blanks.
    pub fn parse(raw: &str) -> Self {
        Self(
            raw.split(',')
                .map(|o| o.trim().to_string())
                .filter(|o| !o.is_empty())
                .collect(),
        )
    }

    pub fn from_env(env: &FunctionEnv) -> Self {
        env.get(ALLOWED_ORIGINS).map(Self::parse).unwrap_or_default()
    }

    /// Exact membership check. An empty list admits nobody.
    pub fn allows(&self, origin: &str) -> bool {
        self.0.iter().any(|o| o == origin)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// HTTP client configuration for external API calls.
pub struct HttpConfig {
    pub timeout: Duration,
    pub max_retries: u32,
    pub retry_base_delay: Duration,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            max_retries: 5,
            retry_base_delay: Duration::from_millis(1000),
        }
    }
}

/// One collection mirrored into one search index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncTarget {
    pub index: String,
    pub collection: String,
    /// Delete index documents whose source document no longer exists.
    #[serde(default = "default_true")]
    pub cleanup_obsolete: bool,
}

fn default_true() -> bool {
    true
}

impl SyncTarget {
    pub fn new(index: &str, collection: &str, cleanup_obsolete: bool) -> Self {
        Self {
            index: index.to_string(),
            collection: collection.to_string(),
            cleanup_obsolete,
        }
    }
}

/// The platform's synced collections.
///
/// Addons are rewritten wholesale by the scanner, so their index is only
/// ever upserted.
pub fn default_sync_targets() -> Vec<SyncTarget> {
    vec![
        SyncTarget::new("addons", "addons", false),
        SyncTarget::new("blogs", "blogs", true),
        SyncTarget::new("blog_tags", "blog_tags", true),
        SyncTarget::new("schematics", "schematics", true),
        SyncTarget::new("schematics_tags", "schematics_tags", true),
    ]
}

/// Upper bound on a quick scan's page size.
const QUICK_MAX_BATCH_SIZE: u32 = 50;

/// Tuning for one addon scan run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanSettings {
    pub max_iterations: u32,
    pub batch_size: u32,
    #[serde(with = "millis")]
    pub iteration_delay: Duration,
    #[serde(with = "millis")]
    pub request_delay: Duration,
    pub search_query: String,
}

impl Default for ScanSettings {
    fn default() -> Self {
        Self {
            max_iterations: 15,
            batch_size: 50,
            iteration_delay: Duration::from_millis(3000),
            request_delay: Duration::from_millis(800),
            search_query: "create".to_string(),
        }
    }
}

/// Caller-supplied scan overrides, typically from query parameters.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScanOverrides {
    pub max_iterations: Option<u32>,
    pub batch_size: Option<u32>,
    pub iteration_delay_ms: Option<u64>,
    pub request_delay_ms: Option<u64>,
    pub search_query: Option<String>,
}

impl ScanSettings {
    /// Full scan settings with overrides applied on top of `self`.
    pub fn full(&self, overrides: &ScanOverrides) -> Self {
        Self {
            max_iterations: overrides.max_iterations.unwrap_or(self.max_iterations),
            batch_size: overrides.batch_size.unwrap_or(self.batch_size),
            iteration_delay: overrides
                .iteration_delay_ms
                .map(Duration::from_millis)
                .unwrap_or(self.iteration_delay),
            request_delay: overrides
                .request_delay_ms
                .map(Duration::from_millis)
                .unwrap_or(self.request_delay),
            search_query: overrides
                .search_query
                .clone()
                .unwrap_or_else(|| self.search_query.clone()),
        }
    }

    /// Reduced settings for a quick scan.
    ///
    /// Iterations are capped at 10, the batch at the full batch size, and
    /// delays are floored at 1000 ms between iterations and 250 ms between
    /// requests.
    pub fn quick(&self, overrides: &ScanOverrides) -> Self {
        let iteration_ms = overrides.iteration_delay_ms.unwrap_or(2000).max(1000);
        let request_ms = overrides.request_delay_ms.unwrap_or(500).max(250);
        Self {
            max_iterations: overrides.max_iterations.unwrap_or(5).min(10),
            batch_size: overrides.batch_size.unwrap_or(20).min(QUICK_MAX_BATCH_SIZE),
            iteration_delay: Duration::from_millis(iteration_ms),
            request_delay: Duration::from_millis(request_ms),
            search_query: overrides
                .search_query
                .clone()
                .unwrap_or_else(|| self.search_query.clone()),
        }
    }
}

/// How a user is matched inside a collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchKind {
    /// Attribute holds the user id.
    Equal,
    /// Attribute is an array containing the user id.
    Contains,
}

/// A collection holding documents owned by a user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserDataSource {
    pub collection: String,
    pub attribute: String,
    #[serde(rename = "match", default = "default_match")]
    pub match_kind: MatchKind,
}

fn default_match() -> MatchKind {
    MatchKind::Equal
}

pub fn default_user_data_sources() -> Vec<UserDataSource> {
    vec![
        UserDataSource {
            collection: "schematics".to_string(),
            attribute: "user_id".to_string(),
            match_kind: MatchKind::Equal,
        },
        UserDataSource {
            collection: "blogs".to_string(),
            attribute: "authors_uuid".to_string(),
            match_kind: MatchKind::Contains,
        },
    ]
}

/// Contents of the optional `functions.toml`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FunctionsConfig {
    pub database_id: String,
    pub sync_targets: Vec<SyncTarget>,
    pub scan: ScanSettings,
    pub taxonomy: Taxonomy,
    pub user_data: Vec<UserDataSource>,
    pub membership_redirect_url: String,
}

impl Default for FunctionsConfig {
    fn default() -> Self {
        Self {
            database_id: DEFAULT_DATABASE_ID.to_string(),
            sync_targets: default_sync_targets(),
            scan: ScanSettings::default(),
            taxonomy: Taxonomy::default(),
            user_data: default_user_data_sources(),
            membership_redirect_url: DEFAULT_MEMBERSHIP_REDIRECT.to_string(),
        }
    }
}

impl FunctionsConfig {
    /// Looks up the sync target whose collection id is `collection`.
    pub fn target_for_collection(&self, collection: &str) -> Option<&SyncTarget> {
        self.sync_targets.iter().find(|t| t.collection == collection)
    }

    pub fn index_names(&self) -> Vec<String> {
        self.sync_targets.iter().map(|t| t.index.clone()).collect()
    }
}

/// Default location of the functions file: `$CONFIG_DIR/blueprint/functions.toml`.
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("blueprint").join("functions.toml"))
}

/// Loads the functions configuration.
///
/// An explicit `path` must exist. Without one, the default location is used
/// when present, otherwise built-in defaults apply.
pub fn load_functions_config(path: Option<&Path>) -> Result<FunctionsConfig, AppError> {
    let resolved = match path {
        Some(p) => Some(p.to_path_buf()),
        None => default_config_path().filter(|p| p.exists()),
    };

    let Some(path) = resolved else {
        tracing::debug!("No functions config file found, using defaults");
        return Ok(FunctionsConfig::default());
    };

    let raw = std::fs::read_to_string(&path).map_err(|e| {
        AppError::ConfigError(format!("cannot read {}: {}", path.display(), e))
    })?;
    let config: FunctionsConfig = toml::from_str(&raw)
        .map_err(|e| AppError::ConfigError(format!("{}: {}", path.display(), e)))?;

    tracing::info!(
        path = %path.display(),
        targets = config.sync_targets.len(),
        "Loaded functions config"
    );
    Ok(config)
}

mod millis {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        u64::deserialize(d).map(Duration::from_millis)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::io::Write;

    #[test]
    fn test_http_config_defaults() {
        let config = HttpConfig::default();
        assert_eq!(config.timeout, Duration::from_secs(30));
        assert_eq!(config.max_retries, 5);
        assert_eq!(config.retry_base_delay, Duration::from_millis(1000));
    }

    #[test]
    fn test_require_reports_every_missing_key_in_order() {
        let env = FunctionEnv::from_pairs([
            (APPWRITE_ENDPOINT, "https://cloud.appwrite.io/v1"),
            (MEILISEARCH_ENDPOINT, "  "),
        ]);
        let err = env.require(SYNC_DOCUMENT_ENV).unwrap_err();
        match err {
            AppError::MissingEnv(keys) => assert_eq!(
                keys,
                vec![
                    APPWRITE_PROJECT_ID.to_string(),
                    MEILISEARCH_ENDPOINT.to_string(),
                    MEILISEARCH_ADMIN_API_KEY.to_string(),
                ]
            ),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_require_passes_when_all_present() {
        let env = FunctionEnv::from_pairs(SCAN_ADDONS_ENV.iter().map(|k| (*k, "x")));
        assert!(env.require(SCAN_ADDONS_ENV).is_ok());
        assert!(env.missing(SCAN_ADDONS_ENV).is_empty());
    }

    #[test]
    fn test_first_of_skips_empty() {
        let env = FunctionEnv::from_pairs([(APPWRITE_FUNCTION_API_KEY, ""), (APPWRITE_API_KEY, "k")]);
        assert_eq!(
            env.first_of(&[APPWRITE_FUNCTION_API_KEY, APPWRITE_API_KEY]),
            Some("k")
        );
    }

    #[test]
    fn test_allowed_origins_exact_match() {
        let origins = AllowedOrigins::parse("https://blueprint-create.com, http://localhost:5173,,");
        assert!(origins.allows("https://blueprint-create.com"));
        assert!(origins.allows("http://localhost:5173"));
        assert!(!origins.allows("https://blueprint-create.com/"));
        assert!(!origins.allows("https://evil.example"));
        assert!(!origins.allows(""));
    }

    #[test]
    fn test_empty_allow_list_admits_nobody() {
        let origins = AllowedOrigins::from_env(&FunctionEnv::default());
        assert!(origins.is_empty());
        assert!(!origins.allows("https://blueprint-create.com"));
    }

    #[test]
    fn test_default_sync_targets() {
        let targets = default_sync_targets();
        assert_eq!(targets.len(), 5);
        assert!(!targets[0].cleanup_obsolete);
        assert!(targets[1..].iter().all(|t| t.cleanup_obsolete));
    }

    #[test]
    fn test_quick_scan_clamps() {
        let base = ScanSettings::default();
        let quick = base.quick(&ScanOverrides::default());
        assert_eq!(quick.max_iterations, 5);
        assert_eq!(quick.batch_size, 20);
        assert_eq!(quick.iteration_delay, Duration::from_millis(2000));
        assert_eq!(quick.request_delay, Duration::from_millis(500));

        let greedy = base.quick(&ScanOverrides {
            max_iterations: Some(50),
            batch_size: Some(500),
            iteration_delay_ms: Some(10),
            request_delay_ms: Some(10),
            search_query: Some("aeronautics".to_string()),
        });
        assert_eq!(greedy.max_iterations, 10);
        assert_eq!(greedy.batch_size, 50);
        assert_eq!(greedy.iteration_delay, Duration::from_millis(1000));
        assert_eq!(greedy.request_delay, Duration::from_millis(250));
        assert_eq!(greedy.search_query, "aeronautics");
    }

    #[test]
    fn test_quick_scan_batch_ignores_configured_full_batch() {
        let base = ScanSettings {
            batch_size: 25,
            ..ScanSettings::default()
        };
        let quick = base.quick(&ScanOverrides {
            batch_size: Some(40),
            ..Default::default()
        });
        assert_eq!(quick.batch_size, 40);
    }

    #[test]
    fn test_full_scan_overrides() {
        let full = ScanSettings::default().full(&ScanOverrides {
            batch_size: Some(10),
            ..Default::default()
        });
        assert_eq!(full.batch_size, 10);
        assert_eq!(full.max_iterations, 15);
        assert_eq!(full.request_delay, Duration::from_millis(800));
    }

    #[test]
    fn test_load_missing_explicit_path_fails() {
        let err = load_functions_config(Some(Path::new("/definitely/not/here.toml"))).unwrap_err();
        assert!(matches!(err, AppError::ConfigError(_)));
    }

    #[test]
    fn test_load_partial_file_keeps_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
database_id = "staging"

[[sync_targets]]
index = "blogs"
collection = "blogs"

[scan]
batch_size = 25
request_delay = 100
"#
        )
        .unwrap();

        let config = load_functions_config(Some(file.path())).unwrap();
        assert_eq!(config.database_id, "staging");
        assert_eq!(config.sync_targets, vec![SyncTarget::new("blogs", "blogs", true)]);
        assert_eq!(config.scan.batch_size, 25);
        assert_eq!(config.scan.request_delay, Duration::from_millis(100));
        assert_eq!(config.scan.max_iterations, 15);
        assert_eq!(config.user_data, default_user_data_sources());
        assert_eq!(config.membership_redirect_url, DEFAULT_MEMBERSHIP_REDIRECT);
    }

    #[test]
    fn test_load_invalid_file_fails() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "sync_targets = 3").unwrap();
        let err = load_functions_config(Some(file.path())).unwrap_err();
        assert!(err.to_string().contains("Configuration error"));
    }

    #[test]
    fn test_target_for_collection() {
        let config = FunctionsConfig::default();
        assert_eq!(
            config.target_for_collection("schematics").map(|t| t.index.as_str()),
            Some("schematics")
        );
        assert!(config.target_for_collection("comments").is_none());
    }
}
