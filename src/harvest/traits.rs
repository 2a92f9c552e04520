//! Core traits and types for the harvest cycle.
//!
//! - Source capabilities via [`HarvestSource`]
//! - Job description via [`HarvestJob`]
//! - Per-item results via [`ItemOutcome`]
//! - The error taxonomy via [`HarvestError`]

use async_trait::async_trait;
use chrono::NaiveDate;
use futures::stream::BoxStream;
use thiserror::Error;

use crate::client::TransportError;
use crate::config::HarvesterConfig;
use crate::decode::DecodeError;
use crate::lookups::FrequencyMap;
use crate::model::{PackageDraft, RemoteRecord};
use crate::traits::{CatalogError, LicenseRegistry, StoreError};

// ============================================================================
// Error Types
// ============================================================================

#[derive(Error, Debug)]
pub enum HarvestError {
    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Decode(#[from] DecodeError),

    #[error(transparent)]
    Catalog(#[from] CatalogError),

    #[error(transparent)]
    Store(#[from] StoreError),

    /// A record reached the import stage without a guid
    #[error("Missing guid for tracked item {item_id}")]
    MissingGuid { item_id: String },

    /// The remote listing produced no records at all
    #[error("No records received from {source_name}")]
    EmptyGather { source_name: String },

    /// Remote metadata could not be mapped to a package
    #[error("Mapping failed: {0}")]
    Mapping(String),

    /// The job never got to run
    #[error("Job cancelled: {0}")]
    Cancelled(String),
}

impl HarvestError {
    pub fn mapping(message: impl Into<String>) -> Self {
        Self::Mapping(message.into())
    }

    /// Category used in job logs.
    pub fn category(&self) -> &'static str {
        match self {
            HarvestError::Transport(_) => "transport",
            HarvestError::Decode(_) => "decode",
            HarvestError::Catalog(CatalogError::Validation(_)) => "validation",
            HarvestError::Catalog(_) => "catalog",
            HarvestError::Store(_) => "store",
            HarvestError::MissingGuid { .. } => "missing_guid",
            HarvestError::EmptyGather { .. } => "empty_gather",
            HarvestError::Mapping(_) => "mapping",
            HarvestError::Cancelled(_) => "cancelled",
        }
    }
}

// ============================================================================
// Job Description
// ============================================================================

/// The harvest source a job runs against.
#[derive(Debug, Clone)]
pub struct SourceInfo {
    pub id: String,
    pub name: String,
    pub url: String,
    pub config: HarvesterConfig,
    /// Organization owning the harvested packages
    pub owner_org: Option<String>,
}

#[derive(Debug, Clone)]
pub struct HarvestJob {
    pub id: String,
    pub source: SourceInfo,
}

impl HarvestJob {
    pub fn new(source: SourceInfo) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            source,
        }
    }
}

/// Everything a mapping needs besides the record itself.
///
/// Mapping functions only read from this, so the same record and context
/// always produce the same draft.
pub struct MappingContext<'a> {
    pub config: &'a HarvesterConfig,
    pub licenses: &'a dyn LicenseRegistry,
    pub frequencies: FrequencyMap,
    /// Date stamped on `issued` and `metadata_modified`
    pub today: NaiveDate,
}

// ============================================================================
// Item Outcomes
// ============================================================================

/// Result of processing one tracked item in the fetch or import stage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ItemOutcome {
    Created,
    Updated,
    Deleted,
    /// Content identical to the previous harvest, nothing written
    Unchanged,
    /// Fetch stage enriched the content
    Fetched,
    /// Nothing to do for this item in this stage
    Skipped,
    Failed(String),
}

impl ItemOutcome {
    pub fn is_failure(&self) -> bool {
        matches!(self, ItemOutcome::Failed(_))
    }
}

// ============================================================================
// Source Trait
// ============================================================================

/// Capabilities of one remote service.
///
/// The reconciliation engine only talks to remote services through this
/// trait; listing, detail retrieval and mapping are source specific.
#[async_trait]
pub trait HarvestSource: Send + Sync {
    /// Name used in logs and job errors.
    fn name(&self) -> &str;

    /// Lazily lists every remote record; a failing element aborts the gather.
    fn list_remote<'a>(
        &'a self,
        job: &'a HarvestJob,
    ) -> BoxStream<'a, Result<RemoteRecord, HarvestError>>;

    /// Returns enriched content for a queued item, `None` when the listing
    /// already carries everything.
    async fn fetch_detail(
        &self,
        _job: &HarvestJob,
        _guid: &str,
        _content: &str,
    ) -> Result<Option<String>, HarvestError> {
        Ok(None)
    }

    /// Maps tracked content to a package draft.
    fn map_to_package(
        &self,
        job: &HarvestJob,
        guid: &str,
        content: &str,
        ctx: &MappingContext<'_>,
    ) -> Result<PackageDraft, HarvestError>;

    /// Adds linked resources; failures are logged and the resource skipped.
    async fn attach_resources(&self, _job: &HarvestJob, _content: &str, _draft: &mut PackageDraft) {
    }
}

#[async_trait]
impl<S: HarvestSource + ?Sized> HarvestSource for Box<S> {
    fn name(&self) -> &str {
        (**self).name()
    }

    fn list_remote<'a>(
        &'a self,
        job: &'a HarvestJob,
    ) -> BoxStream<'a, Result<RemoteRecord, HarvestError>> {
        (**self).list_remote(job)
    }

    async fn fetch_detail(
        &self,
        job: &HarvestJob,
        guid: &str,
        content: &str,
    ) -> Result<Option<String>, HarvestError> {
        (**self).fetch_detail(job, guid, content).await
    }

    fn map_to_package(
        &self,
        job: &HarvestJob,
        guid: &str,
        content: &str,
        ctx: &MappingContext<'_>,
    ) -> Result<PackageDraft, HarvestError> {
        (**self).map_to_package(job, guid, content, ctx)
    }

    async fn attach_resources(&self, job: &HarvestJob, content: &str, draft: &mut PackageDraft) {
        (**self).attach_resources(job, content, draft).await
    }
}
