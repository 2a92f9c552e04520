//! In-memory collaborators.
//!
//! Used by the `harvest` binary for dry runs and by the test suites.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::model::{ActionContext, Organization, PackageDraft, TrackedItem};
use crate::traits::{CatalogError, PackageStore, StoreError, Supersede, TrackingStore, ValidationError};

/// Tracked items kept in a vector behind one lock, so every call is atomic.
#[derive(Debug, Default)]
pub struct MemoryTrackingStore {
    items: RwLock<Vec<TrackedItem>>,
}

impl MemoryTrackingStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn items(&self) -> Vec<TrackedItem> {
        self.items.read().await.clone()
    }

    pub async fn items_for_guid(&self, guid: &str) -> Vec<TrackedItem> {
        self.items
            .read()
            .await
            .iter()
            .filter(|item| item.guid == guid)
            .cloned()
            .collect()
    }
}

#[async_trait]
impl TrackingStore for MemoryTrackingStore {
    async fn current_packages(
        &self,
        source_id: &str,
    ) -> Result<HashMap<String, Option<String>>, StoreError> {
        Ok(self
            .items
            .read()
            .await
            .iter()
            .filter(|item| item.current && item.source_id == source_id)
            .map(|item| (item.guid.clone(), item.local_package_id.clone()))
            .collect())
    }

    async fn queue(&self, items: Vec<TrackedItem>) -> Result<Vec<String>, StoreError> {
        let ids = items.iter().map(|item| item.id.clone()).collect();
        self.items.write().await.extend(items);
        Ok(ids)
    }

    async fn get(&self, item_id: &str) -> Result<Option<TrackedItem>, StoreError> {
        Ok(self
            .items
            .read()
            .await
            .iter()
            .find(|item| item.id == item_id)
            .cloned())
    }

    async fn current_for_guid(
        &self,
        source_id: &str,
        guid: &str,
    ) -> Result<Option<TrackedItem>, StoreError> {
        Ok(self
            .items
            .read()
            .await
            .iter()
            .find(|item| item.current && item.source_id == source_id && item.guid == guid)
            .cloned())
    }

    async fn save(&self, item: &TrackedItem) -> Result<(), StoreError> {
        let mut items = self.items.write().await;
        let slot = items
            .iter_mut()
            .find(|existing| existing.id == item.id)
            .ok_or_else(|| StoreError::NotFound(item.id.clone()))?;
        *slot = item.clone();
        Ok(())
    }

    async fn record_error(&self, item_id: &str, message: &str) -> Result<(), StoreError> {
        let mut items = self.items.write().await;
        let item = items
            .iter_mut()
            .find(|item| item.id == item_id)
            .ok_or_else(|| StoreError::NotFound(item_id.to_string()))?;
        item.errors.push(message.to_string());
        Ok(())
    }

    async fn commit(&self, mut item: TrackedItem, supersede: Supersede) -> Result<(), StoreError> {
        let mut items = self.items.write().await;

        if let Supersede::Discard(prior_id) = &supersede {
            items.retain(|existing| &existing.id != prior_id);
        }
        for existing in items
            .iter_mut()
            .filter(|existing| existing.source_id == item.source_id && existing.guid == item.guid)
        {
            existing.current = false;
        }

        item.current = true;
        match items.iter_mut().find(|existing| existing.id == item.id) {
            Some(slot) => *slot = item,
            None => items.push(item),
        }
        Ok(())
    }

    async fn retire(&self, source_id: &str, guid: &str) -> Result<(), StoreError> {
        for item in self
            .items
            .write()
            .await
            .iter_mut()
            .filter(|item| item.source_id == source_id && item.guid == guid)
        {
            item.current = false;
        }
        Ok(())
    }
}

/// Package catalogue kept in memory.
///
/// Rejects drafts without a title, mirroring the catalogue's schema check,
/// and counts every write it accepts.
#[derive(Debug, Default)]
pub struct MemoryCatalog {
    packages: RwLock<HashMap<String, PackageDraft>>,
    organizations: HashMap<String, Organization>,
    writes: AtomicUsize,
}

impl MemoryCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_organization(mut self, organization: Organization) -> Self {
        self.organizations
            .insert(organization.name.clone(), organization);
        self
    }

    pub async fn package(&self, id: &str) -> Option<PackageDraft> {
        self.packages.read().await.get(id).cloned()
    }

    pub async fn package_ids(&self) -> Vec<String> {
        let mut ids: Vec<_> = self.packages.read().await.keys().cloned().collect();
        ids.sort();
        ids
    }

    pub fn writes(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    fn validate(draft: &PackageDraft) -> Result<(), ValidationError> {
        if draft.title.trim().is_empty() {
            return Err(ValidationError::field("title", "Missing value"));
        }
        Ok(())
    }
}

#[async_trait]
impl PackageStore for MemoryCatalog {
    async fn create_package(
        &self,
        _ctx: &ActionContext,
        mut draft: PackageDraft,
    ) -> Result<String, CatalogError> {
        Self::validate(&draft)?;
        let id = draft
            .id
            .get_or_insert_with(|| uuid::Uuid::new_v4().to_string())
            .clone();

        let mut packages = self.packages.write().await;
        if packages.contains_key(&id) {
            return Err(ValidationError::field("id", "Dataset id already exists").into());
        }
        packages.insert(id.clone(), draft);
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(id)
    }

    async fn update_package(
        &self,
        _ctx: &ActionContext,
        draft: PackageDraft,
    ) -> Result<String, CatalogError> {
        Self::validate(&draft)?;
        let id = draft
            .id
            .clone()
            .ok_or_else(|| ValidationError::field("id", "Missing value"))?;

        let mut packages = self.packages.write().await;
        if !packages.contains_key(&id) {
            return Err(CatalogError::NotFound(id));
        }
        packages.insert(id.clone(), draft);
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(id)
    }

    async fn delete_package(
        &self,
        _ctx: &ActionContext,
        package_id: &str,
    ) -> Result<(), CatalogError> {
        self.packages
            .write()
            .await
            .remove(package_id)
            .ok_or_else(|| CatalogError::NotFound(package_id.to_string()))?;
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn organization_lookup(
        &self,
        _ctx: &ActionContext,
        name: &str,
    ) -> Result<Option<Organization>, CatalogError> {
        Ok(self.organizations.get(name).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ItemStatus;

    fn item(guid: &str) -> TrackedItem {
        TrackedItem::queued("src", "job-1", guid, ItemStatus::New).with_content("{}")
    }

    #[tokio::test]
    async fn test_commit_keeps_one_current_item() {
        let store = MemoryTrackingStore::new();
        let first = item("A");
        let second = item("A");
        store.queue(vec![first.clone(), second.clone()]).await.unwrap();

        store.commit(first.clone(), Supersede::Nothing).await.unwrap();
        store
            .commit(second.clone(), Supersede::Retire(first.id.clone()))
            .await
            .unwrap();

        let items = store.items_for_guid("A").await;
        assert_eq!(items.len(), 2);
        assert_eq!(items.iter().filter(|i| i.current).count(), 1);
        let current = store.current_for_guid("src", "A").await.unwrap().unwrap();
        assert_eq!(current.id, second.id);
    }

    #[tokio::test]
    async fn test_commit_discard_removes_prior() {
        let store = MemoryTrackingStore::new();
        let first = item("A");
        let second = item("A");
        store.queue(vec![first.clone(), second.clone()]).await.unwrap();
        store.commit(first.clone(), Supersede::Nothing).await.unwrap();
        store
            .commit(second, Supersede::Discard(first.id.clone()))
            .await
            .unwrap();

        assert_eq!(store.items_for_guid("A").await.len(), 1);
        assert!(store.get(&first.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_retire_and_current_packages() {
        let store = MemoryTrackingStore::new();
        let a = item("A").with_package(Some("pkg-a".into()));
        let b = item("B");
        store.queue(vec![a.clone(), b.clone()]).await.unwrap();
        store.commit(a, Supersede::Nothing).await.unwrap();
        store.commit(b, Supersede::Nothing).await.unwrap();

        store.retire("src", "B").await.unwrap();
        let current = store.current_packages("src").await.unwrap();
        assert_eq!(current.len(), 1);
        assert_eq!(current["A"].as_deref(), Some("pkg-a"));
        assert!(store.current_packages("other").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_record_error_unknown_item() {
        let store = MemoryTrackingStore::new();
        assert!(matches!(
            store.record_error("missing", "boom").await,
            Err(StoreError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_catalog_validation_and_writes() {
        let catalog = MemoryCatalog::new();
        let ctx = ActionContext::default();

        let err = catalog
            .create_package(&ctx, PackageDraft::default())
            .await
            .unwrap_err();
        assert!(matches!(err, CatalogError::Validation(_)));
        assert_eq!(catalog.writes(), 0);

        let draft = PackageDraft {
            id: Some("pkg-1".into()),
            title: "Popolazione residente".into(),
            ..Default::default()
        };
        assert_eq!(catalog.create_package(&ctx, draft.clone()).await.unwrap(), "pkg-1");
        assert!(catalog.create_package(&ctx, draft.clone()).await.is_err());
        assert_eq!(catalog.update_package(&ctx, draft).await.unwrap(), "pkg-1");
        catalog.delete_package(&ctx, "pkg-1").await.unwrap();
        assert!(matches!(
            catalog.delete_package(&ctx, "pkg-1").await,
            Err(CatalogError::NotFound(_))
        ));
        assert_eq!(catalog.writes(), 3);
    }
}
