//! Seams to the collaborators the harvester drives but does not own: the
//! catalogue that persists packages, the bookkeeping of tracked items, the
//! license registry and the frequency vocabulary.

use crate::model::{ActionContext, Organization, PackageDraft, TrackedItem};
use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};
use thiserror::Error;

/// Rejection raised by the catalogue, with a `field -> messages` summary.
#[derive(Error, Debug, Clone, PartialEq)]
#[error("Validation failed: {}", summarize(.summary))]
pub struct ValidationError {
    pub summary: BTreeMap<String, Vec<String>>,
}

impl ValidationError {
    pub fn field(field: impl Into<String>, message: impl Into<String>) -> Self {
        let mut summary = BTreeMap::new();
        summary.insert(field.into(), vec![message.into()]);
        Self { summary }
    }
}

fn summarize(summary: &BTreeMap<String, Vec<String>>) -> String {
    summary
        .iter()
        .map(|(field, messages)| format!("{}: {}", field, messages.join(", ")))
        .collect::<Vec<_>>()
        .join("; ")
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum CatalogError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error("Package not found: {0}")]
    NotFound(String),
    #[error("Catalogue error: {0}")]
    Other(String),
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum StoreError {
    #[error("Tracked item not found: {0}")]
    NotFound(String),
    #[error("Tracking store error: {0}")]
    Other(String),
}

/// Package persistence offered by the hosting catalogue.
#[async_trait]
pub trait PackageStore: Send + Sync {
    /// Creates a package and returns its identifier.
    async fn create_package(
        &self,
        ctx: &ActionContext,
        draft: PackageDraft,
    ) -> Result<String, CatalogError>;

    /// Replaces the package `draft.id` and returns its identifier.
    async fn update_package(
        &self,
        ctx: &ActionContext,
        draft: PackageDraft,
    ) -> Result<String, CatalogError>;

    async fn delete_package(&self, ctx: &ActionContext, package_id: &str)
        -> Result<(), CatalogError>;

    async fn organization_lookup(
        &self,
        ctx: &ActionContext,
        name: &str,
    ) -> Result<Option<Organization>, CatalogError>;
}

/// How a committed import treats the item it replaces.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Supersede {
    Nothing,
    /// Keep the prior item for history but mark it not current.
    Retire(String),
    /// Drop the prior item, it duplicates the committed one.
    Discard(String),
}

/// Bookkeeping of remote records previously seen for a source.
///
/// Implementations must apply [`TrackingStore::queue`] and
/// [`TrackingStore::commit`] atomically.
#[async_trait]
pub trait TrackingStore: Send + Sync {
    /// Current guid -> local package id pairs for a source.
    async fn current_packages(
        &self,
        source_id: &str,
    ) -> Result<HashMap<String, Option<String>>, StoreError>;

    /// Persists a whole gather queue, returning the item ids in order.
    async fn queue(&self, items: Vec<TrackedItem>) -> Result<Vec<String>, StoreError>;

    async fn get(&self, item_id: &str) -> Result<Option<TrackedItem>, StoreError>;

    async fn current_for_guid(
        &self,
        source_id: &str,
        guid: &str,
    ) -> Result<Option<TrackedItem>, StoreError>;

    async fn save(&self, item: &TrackedItem) -> Result<(), StoreError>;

    async fn record_error(&self, item_id: &str, message: &str) -> Result<(), StoreError>;

    /// Marks `item` current and applies `supersede` in one step.
    async fn commit(&self, item: TrackedItem, supersede: Supersede) -> Result<(), StoreError>;

    /// Clears the current flag of every item tracking `guid`.
    async fn retire(&self, source_id: &str, guid: &str) -> Result<(), StoreError>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct License {
    pub name: String,
    pub title: String,
    pub uri: String,
}

pub trait LicenseRegistry: Send + Sync {
    /// Finds the license whose name ends with `(label)`.
    fn find_by_label(&self, label: &str) -> Option<License>;

    fn default_license(&self) -> License;

    fn resolve(&self, label: Option<&str>) -> License {
        label
            .and_then(|label| self.find_by_label(label))
            .unwrap_or_else(|| self.default_license())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VocabularyItem {
    pub text: String,
    pub value: String,
}

#[async_trait]
pub trait VocabularySource: Send + Sync {
    async fn frequency_items(&self) -> Result<Vec<VocabularyItem>, CatalogError>;
}
