//! Health reports for the search engine and the addon scanner.

use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::time::Instant;

use chrono::{DateTime, SecondsFormat, Utc};
use serde::Serialize;
use tracing::warn;

use crate::store::SearchIndex;

/// Overall verdict of a health report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Degraded,
    Unhealthy,
}

impl HealthStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            HealthStatus::Healthy => "healthy",
            HealthStatus::Degraded => "degraded",
            HealthStatus::Unhealthy => "unhealthy",
        }
    }

    pub fn is_healthy(&self) -> bool {
        *self == HealthStatus::Healthy
    }

    /// The worse of two statuses.
    pub fn worst(self, other: HealthStatus) -> HealthStatus {
        match (self, other) {
            (HealthStatus::Unhealthy, _) | (_, HealthStatus::Unhealthy) => HealthStatus::Unhealthy,
            (HealthStatus::Degraded, _) | (_, HealthStatus::Degraded) => HealthStatus::Degraded,
            _ => HealthStatus::Healthy,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EngineCheck {
    pub status: HealthStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum IndexPresence {
    AllPresent,
    SomeMissing,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IndexCheck {
    pub status: IndexPresence,
    pub configured: Vec<String>,
    pub existing: Vec<String>,
    pub missing: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status")]
pub enum IndexStatsEntry {
    #[serde(rename = "success", rename_all = "camelCase")]
    Success {
        document_count: u64,
        is_indexing: bool,
    },
    #[serde(rename = "error")]
    Error { error: String },
}

/// Everything the document sync reports on `GET`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchHealthReport {
    pub timestamp: DateTime<Utc>,
    pub execution_time_ms: u64,
    pub overall: HealthStatus,
    pub meilisearch: EngineCheck,
    pub indexes: IndexCheck,
    pub index_stats: BTreeMap<String, IndexStatsEntry>,
}

async fn check_engine<I: SearchIndex + ?Sized>(search: &I) -> EngineCheck {
    match search.health().await {
        Ok(health) if health.status == "available" => EngineCheck {
            status: HealthStatus::Healthy,
            version: health.version,
            error: None,
        },
        Ok(health) => EngineCheck {
            status: HealthStatus::Unhealthy,
            version: health.version,
            error: Some(format!("engine status is {}", health.status)),
        },
        Err(e) => EngineCheck {
            status: HealthStatus::Unhealthy,
            version: None,
            error: Some(e.to_string()),
        },
    }
}

async fn check_indexes<I: SearchIndex + ?Sized>(search: &I, configured: &[String]) -> IndexCheck {
    match search.index_uids().await {
        Ok(existing) => {
            let missing: Vec<String> = configured
                .iter()
                .filter(|c| !existing.contains(c))
                .cloned()
                .collect();
            IndexCheck {
                status: if missing.is_empty() {
                    IndexPresence::AllPresent
                } else {
                    IndexPresence::SomeMissing
                },
                configured: configured.to_vec(),
                existing,
                missing,
                error: None,
            }
        }
        Err(e) => IndexCheck {
            status: IndexPresence::Error,
            configured: configured.to_vec(),
            existing: Vec::new(),
            missing: Vec::new(),
            error: Some(e.to_string()),
        },
    }
}

/// Probes the engine, the configured indexes, and the stats of every
/// configured index that exists.
///
/// The report is `healthy` only when the engine answers and the index list
/// could be read; a missing index alone does not degrade it.
pub async fn check_search_health<I>(search: &I, configured: &[String]) -> SearchHealthReport
where
    I: SearchIndex + ?Sized,
{
    let started = Instant::now();
    let (engine, indexes) = tokio::join!(check_engine(search), check_indexes(search, configured));

    let mut index_stats = BTreeMap::new();
    if indexes.status != IndexPresence::Error {
        for name in configured.iter().filter(|c| indexes.existing.contains(c)) {
            let entry = match search.index_stats(name).await {
                Ok(stats) => IndexStatsEntry::Success {
                    document_count: stats.number_of_documents,
                    is_indexing: stats.is_indexing,
                },
                Err(e) => {
                    warn!(index = %name, error = %e, "Failed to read index stats");
                    IndexStatsEntry::Error {
                        error: e.to_string(),
                    }
                }
            };
            index_stats.insert(name.clone(), entry);
        }
    }

    let overall = if engine.status.is_healthy() && indexes.status != IndexPresence::Error {
        HealthStatus::Healthy
    } else {
        HealthStatus::Degraded
    };

    SearchHealthReport {
        timestamp: Utc::now(),
        execution_time_ms: started.elapsed().as_millis() as u64,
        overall,
        meilisearch: engine,
        indexes,
        index_stats,
    }
}

/// Plain-text rendering of a [`SearchHealthReport`].
pub fn format_health_report(report: &SearchHealthReport) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "Sync System Health Report");
    let _ = writeln!(
        out,
        "Generated: {}",
        report.timestamp.to_rfc3339_opts(SecondsFormat::Millis, true)
    );
    let _ = writeln!(out, "Execution Time: {}ms", report.execution_time_ms);
    let _ = writeln!(
        out,
        "Overall Status: {}",
        report.overall.as_str().to_uppercase()
    );
    out.push('\n');

    let _ = writeln!(out, "Meilisearch Health:");
    let _ = writeln!(out, "   Status: {}", report.meilisearch.status.as_str());
    if let Some(version) = &report.meilisearch.version {
        let _ = writeln!(out, "   Version: {version}");
    }
    if let Some(error) = &report.meilisearch.error {
        let _ = writeln!(out, "   Error: {error}");
    }
    out.push('\n');

    let _ = writeln!(out, "Index Status:");
    let _ = writeln!(out, "   Configured: {}", report.indexes.configured.len());
    let _ = writeln!(out, "   Existing: {}", report.indexes.existing.len());
    if !report.indexes.missing.is_empty() {
        let _ = writeln!(out, "   Missing: {}", report.indexes.missing.join(", "));
    }

    if !report.index_stats.is_empty() {
        out.push('\n');
        let _ = writeln!(out, "Index Statistics:");
        for (name, entry) in &report.index_stats {
            match entry {
                IndexStatsEntry::Success {
                    document_count,
                    is_indexing,
                } => {
                    let suffix = if *is_indexing { " (indexing)" } else { "" };
                    let _ = writeln!(out, "   {name}: {document_count} documents{suffix}");
                }
                IndexStatsEntry::Error { error } => {
                    let _ = writeln!(out, "   {name}: Error - {error}");
                }
            }
        }
    }

    out.trim_end().to_string()
}

/// One named check of the scanner health report.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CheckResult {
    pub status: HealthStatus,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub count: Option<u64>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub missing: Vec<String>,
}

impl CheckResult {
    pub fn healthy(message: impl Into<String>) -> Self {
        Self {
            status: HealthStatus::Healthy,
            message: message.into(),
            count: None,
            missing: Vec::new(),
        }
    }

    pub fn unhealthy(message: impl Into<String>) -> Self {
        Self {
            status: HealthStatus::Unhealthy,
            message: message.into(),
            count: None,
            missing: Vec::new(),
        }
    }

    pub fn with_count(mut self, count: u64) -> Self {
        self.count = Some(count);
        self
    }
}

/// How a failed check affects the overall status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckWeight {
    /// Failure makes the whole system unhealthy.
    Critical,
    /// Failure only degrades it.
    Optional,
}

/// Named checks folded into one status.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthReport {
    pub status: HealthStatus,
    pub checks: BTreeMap<String, CheckResult>,
    pub timestamp: DateTime<Utc>,
    pub execution_time_ms: u64,
}

impl HealthReport {
    pub fn new() -> Self {
        Self {
            status: HealthStatus::Healthy,
            checks: BTreeMap::new(),
            timestamp: Utc::now(),
            execution_time_ms: 0,
        }
    }

    pub fn record(&mut self, name: &str, weight: CheckWeight, result: CheckResult) {
        if !result.status.is_healthy() {
            let effect = match weight {
                CheckWeight::Critical => HealthStatus::Unhealthy,
                CheckWeight::Optional => HealthStatus::Degraded,
            };
            self.status = self.status.worst(effect);
        }
        self.checks.insert(name.to_string(), result);
    }
}

impl Default for HealthReport {
    fn default() -> Self {
        Self::new()
    }
}
