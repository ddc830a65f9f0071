//! The addon scanner.
//!
//! A scan pages through the CurseForge and Modrinth catalogs side by side,
//! saves every normalized addon into the addons collection as it goes, and
//! finishes with a pass that merges addons listed on both catalogs.

use std::time::Instant;

use serde::Serialize;
use tokio::time::sleep;
use tracing::{debug, error, info, warn};

use crate::addons::{combine_duplicates, merge_existing, AddonCatalog, CatalogPage, Taxonomy};
use crate::config::{FunctionEnv, ScanSettings};
use crate::error::AppError;
use crate::health::{CheckResult, CheckWeight, HealthReport};
use crate::models::{Addon, Document, ModSource};
use crate::retry::{retry_on_rate_limit, RetryPolicy};
use crate::store::{DocumentStore, Query};

/// Fetched and saved counts for one catalog.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SourceCounts {
    pub fetched: usize,
    pub saved: usize,
}

/// Outcome of writing a batch of addons.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SaveCounts {
    pub created: usize,
    pub updated: usize,
    pub errors: usize,
    pub total: usize,
}

impl SaveCounts {
    pub fn saved(&self) -> usize {
        self.created + self.updated
    }
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanReport {
    pub iterations: u32,
    pub total_mods: u64,
    pub curseforge: SourceCounts,
    pub modrinth: SourceCounts,
    pub combined: SaveCounts,
    pub errors: Vec<String>,
    pub execution_time_ms: u64,
}

/// Result of a single-iteration scan at a fixed offset.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IncrementalScanReport {
    pub offset: u32,
    pub batch_size: u32,
    pub curseforge: SourceCounts,
    pub modrinth: SourceCounts,
    pub errors: Vec<String>,
    pub execution_time_ms: u64,
}

/// Scans both catalogs into one addons collection.
pub struct AddonScanner<'a> {
    store: &'a dyn DocumentStore,
    curseforge: &'a dyn AddonCatalog,
    modrinth: &'a dyn AddonCatalog,
    collection: String,
    taxonomy: Taxonomy,
    retry: RetryPolicy,
}

impl<'a> AddonScanner<'a> {
    pub fn new(
        store: &'a dyn DocumentStore,
        curseforge: &'a dyn AddonCatalog,
        modrinth: &'a dyn AddonCatalog,
        collection: &str,
        taxonomy: Taxonomy,
    ) -> Self {
        Self {
            store,
            curseforge,
            modrinth,
            collection: collection.to_string(),
            taxonomy,
            retry: RetryPolicy::rate_limit(),
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Number of addons stored, or 0 when the collection cannot be read.
    pub async fn count(&self) -> u64 {
        match self.try_count().await {
            Ok(total) => total,
            Err(e) => {
                error!(collection = %self.collection, error = %e, "Failed to count addons");
                0
            }
        }
    }

    async fn try_count(&self) -> Result<u64, AppError> {
        let page = self
            .store
            .list_documents(&self.collection, &[Query::Limit(1)])
            .await?;
        Ok(page.total)
    }

    async fn find_by_name(&self, name: &str) -> Result<Option<Document>, AppError> {
        let page = self
            .store
            .list_documents(&self.collection, &[Query::equal("name", name)])
            .await?;
        Ok(page.documents.into_iter().next())
    }

    async fn create(&self, addon: &Addon) -> Result<(), AppError> {
        let data = addon.to_data()?;
        retry_on_rate_limit(self.retry, || self.store.create_document(&self.collection, &data))
            .await?;
        Ok(())
    }

    async fn update(&self, id: &str, addon: &Addon) -> Result<(), AppError> {
        let data = addon.to_data()?;
        retry_on_rate_limit(self.retry, || {
            self.store.update_document(&self.collection, id, &data)
        })
        .await?;
        Ok(())
    }

    async fn save_one(&self, addon: &Addon, source: ModSource) -> Result<bool, AppError> {
        match self.find_by_name(&addon.name).await? {
            Some(doc) => {
                let existing = Addon::from_document(&doc)?;
                let merged = merge_existing(&existing, addon, source);
                self.update(&doc.id, &merged).await?;
                debug!(name = %addon.name, %source, "Updated addon");
                Ok(false)
            }
            None => {
                self.create(addon).await?;
                debug!(name = %addon.name, %source, "Created addon");
                Ok(true)
            }
        }
    }

    /// Creates or updates each addon by name, recording `source` on it.
    /// Failures are counted, not propagated.
    pub async fn save_with_source(&self, addons: &[Addon], source: ModSource) -> SaveCounts {
        let mut counts = SaveCounts {
            total: addons.len(),
            ..SaveCounts::default()
        };
        for addon in addons {
            match self.save_one(addon, source).await {
                Ok(true) => counts.created += 1,
                Ok(false) => counts.updated += 1,
                Err(e) => {
                    counts.errors += 1;
                    warn!(name = %addon.name, %source, error = %e, "Failed to save addon");
                }
            }
        }
        info!(
            %source,
            created = counts.created,
            updated = counts.updated,
            errors = counts.errors,
            "Saved addons"
        );
        counts
    }

    /// Merges duplicates across catalogs and upserts the result by name.
    ///
    /// Sources recorded on the stored addon are kept.
    pub async fn combine_and_upsert(&self, addons: Vec<Addon>) -> SaveCounts {
        let fetched = addons.len();
        let combined = combine_duplicates(addons);
        info!(fetched, unique = combined.len(), "Combined addons");

        let mut counts = SaveCounts {
            total: combined.len(),
            ..SaveCounts::default()
        };
        for addon in &combined {
            match self.upsert_combined(addon).await {
                Ok(true) => counts.created += 1,
                Ok(false) => counts.updated += 1,
                Err(e) => {
                    counts.errors += 1;
                    warn!(name = %addon.name, error = %e, "Failed to upsert combined addon");
                }
            }
        }
        counts
    }

    async fn upsert_combined(&self, addon: &Addon) -> Result<bool, AppError> {
        match self.find_by_name(&addon.name).await? {
            Some(doc) => {
                let existing = Addon::from_document(&doc)?;
                let mut record = addon.clone();
                for source in &existing.sources {
                    if !record.sources.contains(source) {
                        record.sources.push(source.clone());
                    }
                }
                self.update(&doc.id, &record).await?;
                Ok(false)
            }
            None => {
                self.create(addon).await?;
                Ok(true)
            }
        }
    }

    async fn fetch(
        &self,
        catalog: &dyn AddonCatalog,
        offset: u32,
        settings: &ScanSettings,
    ) -> Result<CatalogPage, AppError> {
        catalog
            .fetch_page(offset, settings.batch_size, &settings.search_query, &self.taxonomy)
            .await
    }

    /// Runs a multi-iteration scan.
    ///
    /// A catalog error only empties that catalog's page for the iteration.
    /// A catalog returning a short page is not queried again, and the scan
    /// stops once both pages of an iteration are empty.
    pub async fn full_scan(&self, settings: &ScanSettings) -> ScanReport {
        let started = Instant::now();
        let mut report = ScanReport::default();
        let mut all_addons: Vec<Addon> = Vec::new();
        let mut offset = 0u32;
        let mut exhausted = [false, false];

        let initial = self.count().await;
        info!(
            max_iterations = settings.max_iterations,
            batch_size = settings.batch_size,
            query = %settings.search_query,
            initial,
            "Starting addon scan"
        );

        for iteration in 1..=settings.max_iterations {
            debug!(iteration, offset, "Scan iteration");

            let (cf, mr) = tokio::join!(
                async {
                    if exhausted[0] {
                        return Ok(CatalogPage::default());
                    }
                    self.fetch(self.curseforge, offset, settings).await
                },
                async {
                    if exhausted[1] {
                        return Ok(CatalogPage::default());
                    }
                    self.fetch(self.modrinth, offset, settings).await
                },
            );

            let mut pages = Vec::with_capacity(2);
            for (slot, (catalog, result)) in [(self.curseforge, cf), (self.modrinth, mr)]
                .into_iter()
                .enumerate()
            {
                let page = match result {
                    Ok(page) => {
                        if page.fetched < settings.batch_size as usize {
                            exhausted[slot] = true;
                        }
                        page
                    }
                    Err(e) => {
                        warn!(source = %catalog.source(), iteration, error = %e, "Catalog fetch failed");
                        report
                            .errors
                            .push(format!("{} iteration {}: {}", catalog.source(), iteration, e));
                        CatalogPage::default()
                    }
                };
                pages.push((catalog.source(), page));
            }

            if pages.iter().all(|(_, p)| p.fetched == 0) {
                info!(iteration, "No more results, stopping");
                break;
            }

            for (source, page) in &pages {
                if page.filtered() > 0 {
                    warn!(%source, filtered = page.filtered(), "Dropped results without a name");
                }
                self.counts_mut(&mut report, *source).fetched += page.fetched;
            }

            sleep(settings.request_delay).await;

            for (source, page) in pages {
                let counts = self.save_with_source(&page.addons, source).await;
                self.counts_mut(&mut report, source).saved += counts.saved();
                all_addons.extend(page.addons);
            }

            report.iterations = iteration;
            offset += settings.batch_size;

            if exhausted.iter().all(|e| *e) {
                info!(iteration, "Both catalogs exhausted, stopping");
                break;
            }
            if iteration < settings.max_iterations {
                sleep(settings.iteration_delay).await;
            }
        }

        report.combined = self.combine_and_upsert(all_addons).await;
        report.total_mods = self.count().await;
        report.execution_time_ms = started.elapsed().as_millis() as u64;

        info!(
            iterations = report.iterations,
            total_mods = report.total_mods,
            curseforge_fetched = report.curseforge.fetched,
            modrinth_fetched = report.modrinth.fetched,
            errors = report.errors.len(),
            elapsed_ms = report.execution_time_ms,
            "Addon scan complete"
        );
        report
    }

    fn counts_mut<'r>(&self, report: &'r mut ScanReport, source: ModSource) -> &'r mut SourceCounts {
        match source {
            ModSource::CurseForge => &mut report.curseforge,
            ModSource::Modrinth => &mut report.modrinth,
        }
    }

    /// Fetches and saves a single page of each catalog at `offset`.
    /// Catalog errors fail the whole call.
    pub async fn incremental_scan(
        &self,
        offset: u32,
        batch_size: u32,
        query: &str,
    ) -> Result<IncrementalScanReport, AppError> {
        let started = Instant::now();
        let (cf, mr) = tokio::join!(
            self.curseforge.fetch_page(offset, batch_size, query, &self.taxonomy),
            self.modrinth.fetch_page(offset, batch_size, query, &self.taxonomy),
        );
        let (cf, mr) = (cf?, mr?);

        let cf_saved = self.save_with_source(&cf.addons, ModSource::CurseForge).await;
        let mr_saved = self.save_with_source(&mr.addons, ModSource::Modrinth).await;

        Ok(IncrementalScanReport {
            offset,
            batch_size,
            curseforge: SourceCounts {
                fetched: cf.fetched,
                saved: cf_saved.saved(),
            },
            modrinth: SourceCounts {
                fetched: mr.fetched,
                saved: mr_saved.saved(),
            },
            errors: Vec::new(),
            execution_time_ms: started.elapsed().as_millis() as u64,
        })
    }

    /// Checks the database, the addons collection, both catalogs, and the
    /// environment. Catalog failures only degrade the report.
    pub async fn health_check(&self, env: &FunctionEnv, required: &[&str]) -> HealthReport {
        let started = Instant::now();
        let mut report = HealthReport::new();

        let database = match self.store.ping().await {
            Ok(total) => CheckResult::healthy(format!("Connected to {total} databases")),
            Err(e) => CheckResult::unhealthy(format!("Database connection failed: {e}")),
        };
        report.record("database", CheckWeight::Critical, database);

        let collection = match self.try_count().await {
            Ok(count) => {
                CheckResult::healthy(format!("Collection accessible with {count} documents"))
                    .with_count(count)
            }
            Err(e) => CheckResult::unhealthy(format!("Collection access failed: {e}")),
        };
        report.record("addonsCollection", CheckWeight::Critical, collection);

        for (name, catalog) in [
            ("curseforgeApi", self.curseforge),
            ("modrinthApi", self.modrinth),
        ] {
            let result = match catalog.fetch_page(0, 1, "test", &self.taxonomy).await {
                Ok(page) => {
                    CheckResult::healthy(format!("API accessible, returned {} results", page.fetched))
                }
                Err(e) => CheckResult::unhealthy(format!("API access failed: {e}")),
            };
            report.record(name, CheckWeight::Optional, result);
        }

        let missing = env.missing(required);
        let environment = if missing.is_empty() {
            CheckResult::healthy("All required environment variables are set")
        } else {
            let mut check = CheckResult::unhealthy(format!(
                "Missing environment variables: {}",
                missing.join(", ")
            ));
            check.missing = missing;
            check
        };
        report.record("environment", CheckWeight::Critical, environment);

        report.execution_time_ms = started.elapsed().as_millis() as u64;
        info!(
            status = report.status.as_str(),
            elapsed_ms = report.execution_time_ms,
            "Scanner health check complete"
        );
        report
    }
}
