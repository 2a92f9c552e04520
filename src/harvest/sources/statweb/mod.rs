//! StatWeb statistical indicators.
//!
//! - StatWebPro lists `{id, URL}` entries; each entry's metadata is retrieved
//!   in the fetch stage and its linked tables become resources.
//! - StatWebSubPro lists complete metadata records directly.

pub mod mapping;
pub mod metadata;

use std::sync::Arc;

use async_trait::async_trait;
use futures::stream::{self, BoxStream};
use futures::StreamExt;
use serde_json::Value;
use tracing::{debug, error, info, warn};

use crate::client::{parse_url, reroute_url, Fetcher};
use crate::decode::decode;
use crate::harvest::traits::{HarvestError, HarvestJob, HarvestSource, MappingContext};
use crate::model::{PackageDraft, RemoteRecord};

use self::mapping::RESOURCE_KEYS;
use self::metadata::{parse_index, Field, StatWebEntry, StatWebMetadata};

async fn load_index(
    fetcher: &dyn Fetcher,
    job: &HarvestJob,
    source_name: &str,
) -> Result<Vec<Value>, HarvestError> {
    let url = parse_url(&job.source.url)?;
    info!(source = source_name, %url, "Connecting to index");
    let text = fetcher.get_text(&url).await?;
    parse_index(&text)
}

/// Turns a fallible listing into a stream of records.
fn into_stream<'a>(
    listing: impl std::future::Future<Output = Result<Vec<RemoteRecord>, HarvestError>> + Send + 'a,
) -> BoxStream<'a, Result<RemoteRecord, HarvestError>> {
    stream::once(listing)
        .flat_map(|listing| {
            let items: Vec<Result<RemoteRecord, HarvestError>> = match listing {
                Ok(records) => records.into_iter().map(Ok).collect(),
                Err(e) => vec![Err(e)],
            };
            stream::iter(items)
        })
        .boxed()
}

pub struct StatWebProSource {
    fetcher: Arc<dyn Fetcher>,
}

impl StatWebProSource {
    pub fn new(fetcher: Arc<dyn Fetcher>) -> Self {
        Self { fetcher }
    }

    async fn list(&self, job: &HarvestJob) -> Result<Vec<RemoteRecord>, HarvestError> {
        let entries = load_index(self.fetcher.as_ref(), job, self.name()).await?;
        entries
            .into_iter()
            .map(|value| {
                let entry = StatWebEntry::from_value(value.clone())?;
                Ok(RemoteRecord::new(entry.guid(), value))
            })
            .collect()
    }

    async fn fetch_resource(&self, job: &HarvestJob, key: &str, url: &str) -> Option<(String, String)> {
        let url = match reroute_url(url, &job.source.url) {
            Ok(url) => url,
            Err(e) => {
                warn!(resource = key, error = %e, "Skipping resource with a bad URL");
                return None;
            }
        };
        debug!(resource = key, %url, "Loading resource");
        let decoded = match self.fetcher.get_text(&url).await {
            Ok(text) => decode(&text).map_err(HarvestError::from),
            Err(e) => Err(e.into()),
        };
        match decoded {
            Ok(Value::Object(map)) => match map.keys().next() {
                Some(title) => Some((title.clone(), url.to_string())),
                None => {
                    warn!(resource = key, %url, "Resource document is empty");
                    None
                }
            },
            Ok(_) => {
                warn!(resource = key, %url, "Resource document is not an object");
                None
            }
            Err(e) => {
                error!(resource = key, %url, error = %e, "Error loading resource");
                None
            }
        }
    }
}

#[async_trait]
impl HarvestSource for StatWebProSource {
    fn name(&self) -> &str {
        "StatWebPro"
    }

    fn list_remote<'a>(
        &'a self,
        job: &'a HarvestJob,
    ) -> BoxStream<'a, Result<RemoteRecord, HarvestError>> {
        into_stream(self.list(job))
    }

    async fn fetch_detail(
        &self,
        job: &HarvestJob,
        guid: &str,
        content: &str,
    ) -> Result<Option<String>, HarvestError> {
        let mut entry = StatWebEntry::parse(content)?;
        let url = entry
            .url()
            .ok_or_else(|| HarvestError::mapping(format!("Entry {} has no URL", guid)))?;
        let url = reroute_url(&url, &job.source.url)?;

        info!(%guid, %url, "Retrieving StatWebPro metadata");
        let text = self.fetcher.get_text(&url).await?;
        if text.trim().is_empty() {
            return Err(HarvestError::mapping(format!("Empty metadata for {}", guid)));
        }
        entry.set_metadata(StatWebMetadata::from_document(&text)?);
        Ok(Some(entry.to_json()))
    }

    fn map_to_package(
        &self,
        _job: &HarvestJob,
        guid: &str,
        content: &str,
        ctx: &MappingContext<'_>,
    ) -> Result<PackageDraft, HarvestError> {
        let entry = StatWebEntry::parse(content)?;
        let metadata = entry
            .metadata()
            .ok_or_else(|| HarvestError::mapping(format!("No metadata fetched for {}", guid)))?;
        mapping::pro_package(&entry, &metadata, ctx)
    }

    async fn attach_resources(&self, job: &HarvestJob, content: &str, draft: &mut PackageDraft) {
        let Some(metadata) = StatWebEntry::parse(content)
            .ok()
            .and_then(|entry| entry.metadata())
        else {
            warn!("No metadata to attach resources from");
            return;
        };

        for key in RESOURCE_KEYS {
            let Some(url) = metadata.raw(key) else {
                continue;
            };
            let Some((title, url)) = self.fetch_resource(job, key, &url).await else {
                continue;
            };
            let license_url = draft.license_url.clone();
            draft
                .resources
                .push(mapping::json_resource(&title, &url, license_url.as_deref()));

            if let Some(csv_url) = metadata.raw(&format!("{}CSV", key)) {
                draft
                    .resources
                    .push(mapping::csv_resource(&title, &csv_url, license_url.as_deref()));
            }
        }
    }
}

pub struct StatWebSubProSource {
    fetcher: Arc<dyn Fetcher>,
}

impl StatWebSubProSource {
    pub const GUID_PREFIX: &'static str = "subpro";

    pub fn new(fetcher: Arc<dyn Fetcher>) -> Self {
        Self { fetcher }
    }

    async fn list(&self, job: &HarvestJob) -> Result<Vec<RemoteRecord>, HarvestError> {
        let entries = load_index(self.fetcher.as_ref(), job, self.name()).await?;
        entries
            .into_iter()
            .map(|value| {
                let metadata = StatWebMetadata::from_value(value.clone())?;
                let guid = metadata
                    .get(Field::Id)
                    .map(|id| format!("{}:{}", Self::GUID_PREFIX, id))
                    .unwrap_or_default();
                Ok(RemoteRecord::new(guid, value))
            })
            .collect()
    }
}

#[async_trait]
impl HarvestSource for StatWebSubProSource {
    fn name(&self) -> &str {
        "StatWebSubPro"
    }

    fn list_remote<'a>(
        &'a self,
        job: &'a HarvestJob,
    ) -> BoxStream<'a, Result<RemoteRecord, HarvestError>> {
        into_stream(self.list(job))
    }

    fn map_to_package(
        &self,
        _job: &HarvestJob,
        _guid: &str,
        content: &str,
        ctx: &MappingContext<'_>,
    ) -> Result<PackageDraft, HarvestError> {
        let metadata = StatWebMetadata::from_value(decode(content)?)?;
        mapping::subpro_package(&metadata, ctx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::TransportError;
    use crate::config::HarvesterConfig;
    use crate::harvest::traits::SourceInfo;
    use crate::lookups::StaticLicenseRegistry;
    use chrono::NaiveDate;
    use futures::TryStreamExt;
    use std::collections::HashMap;
    use url::Url;

    struct StaticSite {
        documents: HashMap<String, String>,
    }

    impl StaticSite {
        fn new(documents: &[(&str, &str)]) -> Arc<Self> {
            Arc::new(Self {
                documents: documents
                    .iter()
                    .map(|(url, body)| (url.to_string(), body.to_string()))
                    .collect(),
            })
        }
    }

    #[async_trait]
    impl Fetcher for StaticSite {
        async fn get_text(&self, url: &Url) -> Result<String, TransportError> {
            self.documents
                .get(url.as_str())
                .cloned()
                .ok_or_else(|| TransportError::Status {
                    url: url.to_string(),
                    status: 404,
                })
        }
    }

    fn job(url: &str) -> HarvestJob {
        HarvestJob::new(SourceInfo {
            id: "src-statweb".into(),
            name: "statweb".into(),
            url: url.into(),
            config: HarvesterConfig::default(),
            owner_org: None,
        })
    }

    const INDEX: &str = r#"{"IndicatoriStrutturali": [
        {"id": "42", "URL": "http://old-host:8080/ind/42"},
        null
    ]}"#;

    const METADATA: &str = "{\"IndicatoreDettaglio\": [{
        \"Descrizione\": \"Tasso di\nnatalità\",
        \"Settore\": \"Popolazione\",
        \"Indicatore\": \"http://old-host:8080/dati/42\",
        \"IndicatoreCSV\": \"http://csv-host/dati/42.csv\",
        \"TabNumeratore\": \"http://old-host:8080/num/42\"
    }]}";

    fn pro_site() -> Arc<StaticSite> {
        StaticSite::new(&[
            ("https://statweb.example.org/index", INDEX),
            ("https://statweb.example.org/ind/42", METADATA),
            ("https://statweb.example.org/dati/42", r#"{"Tasso di natalità": []}"#),
        ])
    }

    #[tokio::test]
    async fn test_pro_cycle_stages() {
        let source = StatWebProSource::new(pro_site());
        let job = job("https://statweb.example.org/index");

        let records: Vec<RemoteRecord> = source.list_remote(&job).try_collect().await.unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].guid, "statistica:42");

        let content = source
            .fetch_detail(&job, "statistica:42", &records[0].serialized())
            .await
            .unwrap()
            .unwrap();
        let entry = StatWebEntry::parse(&content).unwrap();
        assert_eq!(
            entry.metadata().unwrap().get(Field::Description).as_deref(),
            Some("Tasso di\nnatalità")
        );

        let licenses = StaticLicenseRegistry::default();
        let ctx = MappingContext {
            config: &job.source.config,
            licenses: &licenses,
            frequencies: Arc::new(HashMap::new()),
            today: NaiveDate::from_ymd_opt(2024, 1, 2).unwrap(),
        };
        let mut draft = source
            .map_to_package(&job, "statistica:42", &content, &ctx)
            .unwrap();
        source.attach_resources(&job, &content, &mut draft).await;

        // the numerator table is not served, so only the indicator and its CSV twin remain
        assert_eq!(draft.resources.len(), 2);
        assert_eq!(draft.resources[0].name, "Tasso di natalità");
        assert_eq!(draft.resources[0].url, "https://statweb.example.org/dati/42");
        assert_eq!(draft.resources[0].format, "json");
        assert_eq!(draft.resources[1].url, "http://csv-host/dati/42.csv");
        assert_eq!(draft.resources[1].license_type, draft.license_url);
    }

    #[tokio::test]
    async fn test_pro_fetch_failure_is_an_error() {
        let source = StatWebProSource::new(StaticSite::new(&[]));
        let job = job("https://statweb.example.org/index");
        let err = source
            .fetch_detail(&job, "statistica:1", r#"{"id": "1", "URL": "http://x/ind/1"}"#)
            .await
            .unwrap_err();
        assert!(matches!(err, HarvestError::Transport(TransportError::Status { status: 404, .. })));
    }

    #[tokio::test]
    async fn test_pro_unreachable_index_aborts_listing() {
        let source = StatWebProSource::new(StaticSite::new(&[]));
        let job = job("https://statweb.example.org/index");
        let results: Vec<_> = source.list_remote(&job).collect().await;
        assert_eq!(results.len(), 1);
        assert!(results[0].is_err());
    }

    #[tokio::test]
    async fn test_subpro_lists_full_records() {
        let site = StaticSite::new(&[(
            "https://statweb.example.org/subpro",
            r#"{"IndicatoriSubPro": [{"id": 310, "Descrizione": "Addetti", "Settore": "Servizi"}]}"#,
        )]);
        let source = StatWebSubProSource::new(site);
        let job = job("https://statweb.example.org/subpro");

        let records: Vec<RemoteRecord> = source.list_remote(&job).try_collect().await.unwrap();
        assert_eq!(records[0].guid, "subpro:310");
        assert!(source
            .fetch_detail(&job, "subpro:310", &records[0].serialized())
            .await
            .unwrap()
            .is_none());
    }
}
