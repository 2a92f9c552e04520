//! Reconciliation engine.
//!
//! [`HarvestPipeline`] drives one source through the three harvest stages:
//! 1. **Gather**: list every remote record, diff against the tracked guids and
//!    queue one tracked item per guid (`new`, `change` or `delete`)
//! 2. **Fetch**: let the source enrich each queued item with detail metadata
//! 3. **Import**: map the content and create, update or delete the package
//!
//! Gather is all-or-nothing: a single failing page or record aborts it and
//! nothing is queued, because deletions computed from a partial listing would
//! be wrong. Fetch and import are isolated per item.

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;
use std::time::Instant;

use chrono::{NaiveDate, Utc};
use futures::StreamExt;
use tracing::{debug, error, info, instrument, warn};

use crate::harvest::traits::{HarvestError, HarvestJob, HarvestSource, ItemOutcome, MappingContext};
use crate::lookups::{FrequencyCache, StaticFrequencies, StaticLicenseRegistry};
use crate::model::{ActionContext, ItemStatus, TrackedItem};
use crate::traits::{CatalogError, LicenseRegistry, PackageStore, Supersede, TrackingStore};

// ============================================================================
// Report Types
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Gather,
    Fetch,
    Import,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Gather => "gather",
            Stage::Fetch => "fetch",
            Stage::Import => "import",
        };
        f.write_str(name)
    }
}

/// Outcome of one stage for one tracked item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemReport {
    pub item_id: String,
    pub guid: String,
    pub outcome: ItemOutcome,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemFailure {
    pub guid: String,
    pub stage: Stage,
    pub reason: String,
}

/// Counters for a completed harvest job.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct HarvestStats {
    pub added: usize,
    pub updated: usize,
    pub deleted: usize,
    pub unchanged: usize,
    pub failed: usize,
    pub total_duration_ms: u64,
}

impl HarvestStats {
    pub fn total(&self) -> usize {
        self.added + self.updated + self.deleted + self.unchanged + self.failed
    }
}

#[derive(Debug, Clone)]
pub struct HarvestReport {
    pub job_id: String,
    /// Number of items queued by the gather stage
    pub queued: usize,
    pub stats: HarvestStats,
    pub failures: Vec<ItemFailure>,
}

impl HarvestReport {
    fn new(job_id: &str, queued: usize) -> Self {
        Self {
            job_id: job_id.to_string(),
            queued,
            stats: HarvestStats::default(),
            failures: Vec::new(),
        }
    }

    fn record(&mut self, stage: Stage, report: ItemReport) {
        match report.outcome {
            ItemOutcome::Created => self.stats.added += 1,
            ItemOutcome::Updated => self.stats.updated += 1,
            ItemOutcome::Deleted => self.stats.deleted += 1,
            ItemOutcome::Unchanged => self.stats.unchanged += 1,
            ItemOutcome::Fetched | ItemOutcome::Skipped => {}
            ItemOutcome::Failed(reason) => {
                self.stats.failed += 1;
                self.failures.push(ItemFailure {
                    guid: report.guid,
                    stage,
                    reason,
                });
            }
        }
    }

    /// True when at least one item failed but the job itself completed.
    pub fn is_partial(&self) -> bool {
        !self.failures.is_empty()
    }
}

// ============================================================================
// Pipeline
// ============================================================================

/// Harvest cycle for one source.
///
/// Generic over the source capabilities and the two persistence seams so
/// tests can swap in in-memory collaborators.
///
/// # Example
///
/// ```ignore
/// let pipeline = HarvestPipeline::new(source, MemoryTrackingStore::new(), MemoryCatalog::new());
/// let report = pipeline.run(&job).await?;
/// println!("{} added, {} updated", report.stats.added, report.stats.updated);
/// ```
pub struct HarvestPipeline<S, T, P>
where
    S: HarvestSource,
    T: TrackingStore,
    P: PackageStore,
{
    source: S,
    tracking: T,
    store: P,
    licenses: Arc<dyn LicenseRegistry>,
    frequencies: Arc<FrequencyCache>,
    context: ActionContext,
    /// Fixed mapping date; today's date when unset
    mapping_date: Option<NaiveDate>,
}

impl<S, T, P> HarvestPipeline<S, T, P>
where
    S: HarvestSource,
    T: TrackingStore,
    P: PackageStore,
{
    /// Creates a pipeline with the built-in license registry and frequency
    /// vocabulary.
    pub fn new(source: S, tracking: T, store: P) -> Self {
        Self {
            source,
            tracking,
            store,
            licenses: Arc::new(StaticLicenseRegistry::default()),
            frequencies: Arc::new(FrequencyCache::new(Arc::new(StaticFrequencies))),
            context: ActionContext::default(),
            mapping_date: None,
        }
    }

    pub fn with_licenses(mut self, licenses: Arc<dyn LicenseRegistry>) -> Self {
        self.licenses = licenses;
        self
    }

    /// Shares one frequency cache between pipelines.
    pub fn with_frequencies(mut self, frequencies: Arc<FrequencyCache>) -> Self {
        self.frequencies = frequencies;
        self
    }

    pub fn with_context(mut self, context: ActionContext) -> Self {
        self.context = context;
        self
    }

    pub fn with_mapping_date(mut self, date: NaiveDate) -> Self {
        self.mapping_date = Some(date);
        self
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    pub fn tracking(&self) -> &T {
        &self.tracking
    }

    pub fn store(&self) -> &P {
        &self.store
    }

    pub fn frequencies(&self) -> &FrequencyCache {
        &self.frequencies
    }

    /// Runs gather, then fetch and import for every queued item.
    ///
    /// # Errors
    ///
    /// Only gather errors are returned; item failures are listed in the
    /// report.
    #[instrument(skip(self, job), fields(source = %job.source.name, job = %job.id))]
    pub async fn run(&self, job: &HarvestJob) -> Result<HarvestReport, HarvestError> {
        let start = Instant::now();

        let item_ids = self.gather(job).await.map_err(|e| {
            error!(category = e.category(), "Error harvesting {}: {}", self.source.name(), e);
            e
        })?;

        let mut report = HarvestReport::new(&job.id, item_ids.len());
        for item_id in &item_ids {
            let fetched = self.fetch(job, item_id).await;
            if fetched.outcome.is_failure() {
                report.record(Stage::Fetch, fetched);
                continue;
            }
            report.record(Stage::Import, self.import(job, item_id).await);
        }

        report.stats.total_duration_ms = start.elapsed().as_millis() as u64;
        let stats = &report.stats;
        info!(
            added = stats.added,
            updated = stats.updated,
            deleted = stats.deleted,
            unchanged = stats.unchanged,
            failed = stats.failed,
            duration_ms = stats.total_duration_ms,
            "Harvest job finished"
        );
        for failure in &report.failures {
            warn!(guid = %failure.guid, stage = %failure.stage, "{}", failure.reason);
        }

        Ok(report)
    }

    // ========================================================================
    // Stage 1: Gather
    // ========================================================================

    /// Lists the remote records and queues one tracked item per guid.
    ///
    /// Returns the ids of the queued items. Nothing is queued on error.
    #[instrument(skip(self, job), fields(source = %job.source.name))]
    pub async fn gather(&self, job: &HarvestJob) -> Result<Vec<String>, HarvestError> {
        info!(url = %job.source.url, "Connecting to {}", self.source.name());

        let tracked = self.tracking.current_packages(&job.source.id).await?;

        let mut queue = Vec::new();
        let mut seen = HashSet::new();
        let (mut received, mut to_add, mut to_update) = (0usize, 0usize, 0usize);

        let mut records = self.source.list_remote(job);
        while let Some(record) = records.next().await {
            let record = record?;
            received += 1;
            // guid-less records are queued one by one and fail at import
            if record.guid.trim().is_empty() {
                warn!(title = ?record.title, "Remote record without guid");
                queue.push(
                    TrackedItem::queued(&job.source.id, &job.id, "", ItemStatus::New)
                        .with_content(record.serialized()),
                );
                continue;
            }
            if !seen.insert(record.guid.clone()) {
                warn!(guid = %record.guid, "Duplicate guid in remote listing, skipping");
                continue;
            }

            let content = record.serialized();
            let (item, action) = match tracked.get(&record.guid) {
                Some(package_id) => {
                    to_update += 1;
                    let item = TrackedItem::queued(
                        &job.source.id,
                        &job.id,
                        &record.guid,
                        ItemStatus::Change,
                    )
                    .with_package(package_id.clone());
                    (item, "UPDATE")
                }
                None => {
                    to_add += 1;
                    let item =
                        TrackedItem::queued(&job.source.id, &job.id, &record.guid, ItemStatus::New);
                    (item, "ADD")
                }
            };
            debug!(guid = %record.guid, title = ?record.title, "Queued for {}", action);
            queue.push(item.with_content(content));
        }
        drop(records);

        if received == 0 {
            return Err(HarvestError::EmptyGather {
                source_name: self.source.name().to_string(),
            });
        }

        let mut removed: Vec<_> = tracked
            .into_iter()
            .filter(|(guid, _)| !seen.contains(guid))
            .collect();
        removed.sort();
        let to_delete = removed.len();
        for (guid, package_id) in removed {
            debug!(guid = %guid, "Queued for DELETE");
            queue.push(
                TrackedItem::queued(&job.source.id, &job.id, guid, ItemStatus::Delete)
                    .with_package(package_id),
            );
        }

        info!(
            found = received,
            new = to_add,
            update = to_update,
            delete = to_delete,
            "Gather completed"
        );

        Ok(self.tracking.queue(queue).await?)
    }

    // ========================================================================
    // Stage 2: Fetch
    // ========================================================================

    pub async fn fetch(&self, job: &HarvestJob, item_id: &str) -> ItemReport {
        let item = match self.load(item_id).await {
            Ok(item) => item,
            Err(e) => return self.failed(item_id, String::new(), Stage::Fetch, e).await,
        };
        let guid = item.guid.clone();

        match self.fetch_item(job, item).await {
            Ok(outcome) => ItemReport {
                item_id: item_id.to_string(),
                guid,
                outcome,
            },
            Err(e) => self.failed(item_id, guid, Stage::Fetch, e).await,
        }
    }

    async fn fetch_item(
        &self,
        job: &HarvestJob,
        mut item: TrackedItem,
    ) -> Result<ItemOutcome, HarvestError> {
        if item.status == ItemStatus::Delete || item.guid.trim().is_empty() {
            return Ok(ItemOutcome::Skipped);
        }
        let Some(content) = item.content.as_deref() else {
            return Ok(ItemOutcome::Skipped);
        };

        match self.source.fetch_detail(job, &item.guid, content).await? {
            Some(enriched) => {
                item.content = Some(enriched);
                self.tracking.save(&item).await?;
                Ok(ItemOutcome::Fetched)
            }
            None => Ok(ItemOutcome::Skipped),
        }
    }

    // ========================================================================
    // Stage 3: Import
    // ========================================================================

    pub async fn import(&self, job: &HarvestJob, item_id: &str) -> ItemReport {
        let item = match self.load(item_id).await {
            Ok(item) => item,
            Err(e) => return self.failed(item_id, String::new(), Stage::Import, e).await,
        };
        let guid = item.guid.clone();

        match self.import_item(job, item).await {
            Ok(outcome) => ItemReport {
                item_id: item_id.to_string(),
                guid,
                outcome,
            },
            Err(e) => self.failed(item_id, guid, Stage::Import, e).await,
        }
    }

    async fn import_item(
        &self,
        job: &HarvestJob,
        mut item: TrackedItem,
    ) -> Result<ItemOutcome, HarvestError> {
        if item.status == ItemStatus::Delete {
            return self.delete_item(job, &item).await;
        }

        if item.guid.trim().is_empty() {
            return Err(HarvestError::MissingGuid {
                item_id: item.id.clone(),
            });
        }

        let content = item
            .content
            .clone()
            .ok_or_else(|| HarvestError::mapping(format!("Empty content for guid {}", item.guid)))?;

        let prior = self
            .tracking
            .current_for_guid(&job.source.id, &item.guid)
            .await?
            .filter(|prior| prior.id != item.id);
        let is_modified = prior
            .as_ref()
            .map_or(true, |prior| prior.content.as_deref() != Some(content.as_str()));

        if let Some(prior) = prior.as_ref() {
            if !is_modified && item.status == ItemStatus::Change {
                item.metadata_modified = prior.metadata_modified;
                item.job_id = prior.job_id.clone();
                item.local_package_id = prior.local_package_id.clone();
                self.tracking
                    .commit(item, Supersede::Discard(prior.id.clone()))
                    .await?;
                info!(guid = %prior.guid, "Document unchanged, skipping");
                return Ok(ItemOutcome::Unchanged);
            }
        }

        let frequencies = self.frequencies.get().await;
        let ctx = MappingContext {
            config: &job.source.config,
            licenses: self.licenses.as_ref(),
            frequencies,
            today: self.mapping_date(),
        };
        let mut draft = self
            .source
            .map_to_package(job, &item.guid, &content, &ctx)?;
        self.source
            .attach_resources(job, &content, &mut draft)
            .await;
        if let Some(org_id) = self.owner_org(job).await? {
            draft.owner_org = Some(org_id);
        }

        let existing = prior
            .as_ref()
            .and_then(|prior| prior.local_package_id.clone())
            .or_else(|| item.local_package_id.clone());

        let (package_id, outcome) = match existing {
            Some(package_id) => {
                draft.id = Some(package_id);
                let id = self.store.update_package(&self.context, draft).await?;
                info!(guid = %item.guid, package = %id, "Updated package");
                (id, ItemOutcome::Updated)
            }
            None => {
                if draft.id.is_none() {
                    draft.id = Some(uuid::Uuid::new_v4().to_string());
                }
                let id = self.store.create_package(&self.context, draft).await?;
                info!(guid = %item.guid, package = %id, "Created package");
                (id, ItemOutcome::Created)
            }
        };

        item.local_package_id = Some(package_id);
        item.metadata_modified = Some(Utc::now());
        let supersede = match prior {
            Some(prior) => Supersede::Retire(prior.id),
            None => Supersede::Nothing,
        };
        self.tracking.commit(item, supersede).await?;

        Ok(outcome)
    }

    async fn delete_item(
        &self,
        job: &HarvestJob,
        item: &TrackedItem,
    ) -> Result<ItemOutcome, HarvestError> {
        if let Some(package_id) = item.local_package_id.as_deref() {
            match self.store.delete_package(&self.context, package_id).await {
                Ok(()) => info!(guid = %item.guid, package = %package_id, "Deleted package"),
                Err(CatalogError::NotFound(_)) => {
                    warn!(guid = %item.guid, package = %package_id, "Package already gone")
                }
                Err(e) => return Err(e.into()),
            }
        }
        self.tracking.retire(&job.source.id, &item.guid).await?;
        Ok(ItemOutcome::Deleted)
    }

    // ========================================================================
    // Helpers
    // ========================================================================

    async fn load(&self, item_id: &str) -> Result<TrackedItem, HarvestError> {
        self.tracking
            .get(item_id)
            .await?
            .ok_or_else(|| crate::traits::StoreError::NotFound(item_id.to_string()).into())
    }

    async fn owner_org(&self, job: &HarvestJob) -> Result<Option<String>, HarvestError> {
        let Some(name) = job.source.owner_org.as_deref() else {
            return Ok(None);
        };
        match self.store.organization_lookup(&self.context, name).await? {
            Some(org) => Ok(Some(org.id)),
            None => {
                warn!(organization = %name, "Owner organization not found");
                Ok(None)
            }
        }
    }

    fn mapping_date(&self) -> NaiveDate {
        self.mapping_date
            .unwrap_or_else(|| Utc::now().date_naive())
    }

    async fn failed(
        &self,
        item_id: &str,
        guid: String,
        stage: Stage,
        err: HarvestError,
    ) -> ItemReport {
        let reason = format!("{} error for guid '{}': {}", stage, guid, err);
        warn!(item = %item_id, category = err.category(), "{}", reason);
        if let Err(e) = self.tracking.record_error(item_id, &reason).await {
            error!(item = %item_id, error = %e, "Could not record item error");
        }
        ItemReport {
            item_id: item_id.to_string(),
            guid,
            outcome: ItemOutcome::Failed(reason),
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
