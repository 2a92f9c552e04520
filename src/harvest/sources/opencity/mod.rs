//! OpenCity dataset listing.
//!
//! The listing already carries the full dataset metadata, so this source
//! has no fetch stage.

pub mod client;
pub mod mapping;

use std::sync::Arc;

use async_trait::async_trait;
use futures::stream::BoxStream;
use futures::StreamExt;
use serde_json::Value;

use crate::client::Fetcher;
use crate::decode::decode;
use crate::harvest::traits::{HarvestError, HarvestJob, HarvestSource, MappingContext};
use crate::model::{PackageDraft, RemoteRecord};

pub use client::OpenCityClient;

/// Default page size of the dataset listing.
pub const DATASET_LIMIT: u32 = 100;

pub(crate) const NAMESPACE: &str = "opencity";

/// Record id as text; numeric ids are rendered, anything else is empty.
pub fn record_id(item: &Value) -> String {
    match &item["id"] {
        Value::String(id) => id.clone(),
        Value::Number(id) => id.to_string(),
        _ => String::new(),
    }
}

pub struct OpenCitySource {
    fetcher: Arc<dyn Fetcher>,
    limit: u32,
}

impl OpenCitySource {
    pub fn new(fetcher: Arc<dyn Fetcher>) -> Self {
        Self {
            fetcher,
            limit: DATASET_LIMIT,
        }
    }

    pub fn with_limit(mut self, limit: u32) -> Self {
        self.limit = limit;
        self
    }
}

#[async_trait]
impl HarvestSource for OpenCitySource {
    fn name(&self) -> &str {
        "OpenCity"
    }

    fn list_remote<'a>(
        &'a self,
        job: &'a HarvestJob,
    ) -> BoxStream<'a, Result<RemoteRecord, HarvestError>> {
        OpenCityClient::new(Arc::clone(&self.fetcher), &job.source.url)
            .with_limit(self.limit)
            .records()
            .map(|item| {
                let item = item?;
                Ok(RemoteRecord::new(record_id(&item), item))
            })
            .boxed()
    }

    fn map_to_package(
        &self,
        _job: &HarvestJob,
        _guid: &str,
        content: &str,
        ctx: &MappingContext<'_>,
    ) -> Result<PackageDraft, HarvestError> {
        mapping::package_from_item(&decode(content)?, ctx)
    }
}
