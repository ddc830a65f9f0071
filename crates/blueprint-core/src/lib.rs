//! Blueprint Core - domain types, error handling, configuration, and the
//! sync and scan engines shared by every function.

pub mod addons;
pub mod config;
pub mod error;
pub mod event;
pub mod health;
pub mod models;
pub mod paging;
pub mod retry;
pub mod scan;
pub mod store;
pub mod sync;

#[cfg(any(test, feature = "test-util"))]
pub mod testing;

pub use addons::{AddonCatalog, CatalogPage, Taxonomy};
pub use config::{
    default_config_path, load_functions_config, AllowedOrigins, FunctionEnv, FunctionsConfig,
    HttpConfig, ScanOverrides, ScanSettings, SyncTarget,
};
pub use error::AppError;
pub use event::{parse_event, DocumentEvent, EventAction};
pub use health::{check_search_health, format_health_report, HealthReport, HealthStatus};
pub use models::{Addon, Document, DocumentPage, ModSource, SearchRecord, TaskReceipt};
pub use retry::{retry_on_rate_limit, retry_with_backoff, RateLimiter, RetryPolicy};
pub use scan::{AddonScanner, IncrementalScanReport, ScanReport};
pub use store::{DocumentStore, Query, SearchIndex, TeamDirectory};
pub use sync::{apply_event, sync_all, sync_collection, SyncMode, SyncOptions, SyncStats, SyncSummary};
