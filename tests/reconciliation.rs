//! End-to-end harvest cycles against in-memory stores.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::NaiveDate;
use futures::stream::{self, BoxStream, StreamExt};
use serde_json::{json, Value};
use url::Url;

use opendata_harvester::client::{Fetcher, TransportError};
use opendata_harvester::config::HarvesterConfig;
use opendata_harvester::harvest::memory::{MemoryCatalog, MemoryTrackingStore};
use opendata_harvester::harvest::sources::{StatWebProSource, StatWebSubProSource};
use opendata_harvester::harvest::{
    HarvestError, HarvestJob, HarvestPipeline, HarvestSource, MappingContext, SourceInfo,
};
use opendata_harvester::lookups::derive_package_id;
use opendata_harvester::model::{GroupRef, PackageDraft, RemoteRecord};
use opendata_harvester::traits::TrackingStore;

/// Source whose listing is set by the test between runs.
struct ScriptedSource {
    listing: Mutex<Vec<Value>>,
}

impl ScriptedSource {
    fn new(listing: Vec<Value>) -> Self {
        Self {
            listing: Mutex::new(listing),
        }
    }

    fn set_listing(&self, listing: Vec<Value>) {
        *self.listing.lock().unwrap() = listing;
    }
}

#[async_trait]
impl HarvestSource for ScriptedSource {
    fn name(&self) -> &str {
        "Scripted"
    }

    fn list_remote<'a>(
        &'a self,
        _job: &'a HarvestJob,
    ) -> BoxStream<'a, Result<RemoteRecord, HarvestError>> {
        let records: Vec<_> = self
            .listing
            .lock()
            .unwrap()
            .iter()
            .map(|item| Ok(RemoteRecord::new(item["id"].as_str().unwrap_or_default(), item.clone())))
            .collect();
        stream::iter(records).boxed()
    }

    fn map_to_package(
        &self,
        _job: &HarvestJob,
        guid: &str,
        content: &str,
        _ctx: &MappingContext<'_>,
    ) -> Result<PackageDraft, HarvestError> {
        let value: Value = serde_json::from_str(content).map_err(|e| HarvestError::mapping(e.to_string()))?;
        Ok(PackageDraft {
            id: Some(derive_package_id("scripted", guid)),
            title: value["title"].as_str().unwrap_or_default().to_string(),
            ..Default::default()
        })
    }
}

fn job(url: &str) -> HarvestJob {
    HarvestJob::new(SourceInfo {
        id: "src-1".into(),
        name: "Scripted".into(),
        url: url.into(),
        config: HarvesterConfig::default(),
        owner_org: None,
    })
}

fn record(id: &str, title: &str) -> Value {
    json!({"id": id, "title": title})
}

fn pipeline(listing: Vec<Value>) -> HarvestPipeline<ScriptedSource, MemoryTrackingStore, MemoryCatalog> {
    HarvestPipeline::new(
        ScriptedSource::new(listing),
        MemoryTrackingStore::new(),
        MemoryCatalog::new(),
    )
    .with_mapping_date(NaiveDate::from_ymd_opt(2024, 6, 1).unwrap())
}

async fn current_count(pipeline: &HarvestPipeline<ScriptedSource, MemoryTrackingStore, MemoryCatalog>, guid: &str) -> usize {
    pipeline
        .tracking()
        .items_for_guid(guid)
        .await
        .iter()
        .filter(|item| item.current)
        .count()
}

#[tokio::test]
async fn second_run_on_unchanged_listing_writes_nothing() {
    let pipeline = pipeline(vec![record("A", "Alpha"), record("B", "Beta")]);

    let first = pipeline.run(&job("https://remote.example.org")).await.unwrap();
    assert_eq!(first.stats.added, 2);
    let writes = pipeline.store().writes();

    let second = pipeline.run(&job("https://remote.example.org")).await.unwrap();
    assert_eq!(second.stats.unchanged, 2);
    assert_eq!(second.stats.total(), 2);
    assert_eq!(pipeline.store().writes(), writes);
    assert_eq!(current_count(&pipeline, "A").await, 1);
    assert_eq!(pipeline.tracking().items_for_guid("A").await.len(), 1);
}

#[tokio::test]
async fn vanished_records_are_deleted() {
    let pipeline = pipeline(vec![record("A", "Alpha"), record("B", "Beta")]);
    pipeline.run(&job("https://remote.example.org")).await.unwrap();

    pipeline.source().set_listing(vec![record("A", "Alpha")]);
    let report = pipeline.run(&job("https://remote.example.org")).await.unwrap();

    assert_eq!(report.stats.deleted, 1);
    assert_eq!(report.stats.unchanged, 1);
    let current = pipeline.tracking().current_packages("src-1").await.unwrap();
    assert_eq!(current.keys().collect::<Vec<_>>(), ["A"]);
    assert_eq!(
        pipeline.store().package_ids().await,
        [derive_package_id("scripted", "A")]
    );
}

#[tokio::test]
async fn empty_listing_fails_without_queueing() {
    let pipeline = pipeline(vec![record("A", "Alpha"), record("B", "Beta")]);
    pipeline.run(&job("https://remote.example.org")).await.unwrap();
    let tracked = pipeline.tracking().items().await.len();

    pipeline.source().set_listing(Vec::new());
    let err = pipeline
        .run(&job("https://remote.example.org"))
        .await
        .unwrap_err();

    assert!(matches!(err, HarvestError::EmptyGather { .. }));
    assert_eq!(pipeline.tracking().items().await.len(), tracked);
    assert_eq!(pipeline.store().package_ids().await.len(), 2);
}

#[tokio::test]
async fn changed_content_updates_and_supersedes_prior() {
    let pipeline = pipeline(vec![record("X123", "C1")]);
    pipeline.run(&job("https://remote.example.org")).await.unwrap();
    let first = pipeline
        .tracking()
        .current_for_guid("src-1", "X123")
        .await
        .unwrap()
        .unwrap();

    let unchanged = pipeline.run(&job("https://remote.example.org")).await.unwrap();
    assert_eq!(unchanged.stats.unchanged, 1);
    let carried = pipeline
        .tracking()
        .current_for_guid("src-1", "X123")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(carried.local_package_id, first.local_package_id);
    assert_eq!(carried.metadata_modified, first.metadata_modified);

    pipeline.source().set_listing(vec![record("X123", "C2")]);
    let changed = pipeline.run(&job("https://remote.example.org")).await.unwrap();
    assert_eq!(changed.stats.updated, 1);

    let items = pipeline.tracking().items_for_guid("X123").await;
    assert_eq!(items.len(), 2);
    assert_eq!(items.iter().filter(|i| i.current).count(), 1);
    assert!(!items.iter().any(|i| i.id == carried.id && i.current));

    let package_id = first.local_package_id.unwrap();
    assert_eq!(pipeline.store().package(&package_id).await.unwrap().title, "C2");
}

#[tokio::test]
async fn failed_item_does_not_block_the_rest() {
    let pipeline = pipeline(vec![record("A", ""), record("B", "Beta")]);
    let report = pipeline.run(&job("https://remote.example.org")).await.unwrap();

    assert!(report.is_partial());
    assert_eq!(report.stats.added, 1);
    assert_eq!(report.failures[0].guid, "A");
    assert_eq!(current_count(&pipeline, "A").await, 0);

    // fixed upstream: the next run creates it
    pipeline
        .source()
        .set_listing(vec![record("A", "Alpha"), record("B", "Beta")]);
    let report = pipeline.run(&job("https://remote.example.org")).await.unwrap();
    assert_eq!(report.stats.added, 1);
    assert_eq!(report.stats.unchanged, 1);
}

struct StaticSite {
    documents: Mutex<HashMap<String, String>>,
}

impl StaticSite {
    fn new(documents: &[(&str, &str)]) -> Arc<Self> {
        Arc::new(Self {
            documents: Mutex::new(
                documents
                    .iter()
                    .map(|(url, body)| (url.to_string(), body.to_string()))
                    .collect(),
            ),
        })
    }

    fn publish(&self, url: &str, body: &str) {
        self.documents
            .lock()
            .unwrap()
            .insert(url.to_string(), body.to_string());
    }
}

#[async_trait]
impl Fetcher for StaticSite {
    async fn get_text(&self, url: &Url) -> Result<String, TransportError> {
        self.documents
            .lock()
            .unwrap()
            .get(url.as_str())
            .cloned()
            .ok_or_else(|| TransportError::Status {
                url: url.to_string(),
                status: 404,
            })
    }
}

#[tokio::test]
async fn subpro_packages_are_stable_across_runs() {
    let index = r#"{"IndicatoriSubPro": [
        {"id": 310, "Descrizione": "Addetti per impresa", "Settore": "Servizi", "FreqAggiornamento": "Annuale"},
        null,
        {"id": 311, "Descrizione": "Superficie boscata", "Settore": "Astronomia"}
    ]}"#;
    let site = StaticSite::new(&[("https://statweb.example.org/subpro", index)]);

    let pipeline = HarvestPipeline::new(
        StatWebSubProSource::new(site),
        MemoryTrackingStore::new(),
        MemoryCatalog::new(),
    )
    .with_mapping_date(NaiveDate::from_ymd_opt(2024, 6, 1).unwrap());

    let mut job = job("https://statweb.example.org/subpro");
    job.source.config = HarvesterConfig::parse(Some(r#"{"groups": [{"name": "statistica"}]}"#)).unwrap();

    let report = pipeline.run(&job).await.unwrap();
    assert_eq!(report.stats.added, 2);

    let servizi = pipeline
        .store()
        .package(&derive_package_id("statistica_subpro", "310"))
        .await
        .unwrap();
    assert_eq!(
        servizi.groups,
        vec![GroupRef::new("economia"), GroupRef::new("statistica")]
    );
    assert_eq!(servizi.extra("frequency"), Some("ANNUAL"));

    let fallback = pipeline
        .store()
        .package(&derive_package_id("statistica_subpro", "311"))
        .await
        .unwrap();
    assert_eq!(fallback.groups[0], GroupRef::new("popolazionesocieta"));

    let again = pipeline.run(&job).await.unwrap();
    assert_eq!(again.stats.unchanged, 2);
    assert_eq!(pipeline.store().package_ids().await.len(), 2);
}

const PRO_INDEX: &str = r#"{"IndicatoriStrutturali": [
    {"id": "42", "URL": "http://old-host:8080/ind/42"}
]}"#;

fn pro_metadata(description: &str) -> String {
    format!(
        r#"{{"IndicatoreDettaglio": [{{
            "Descrizione": "{}",
            "Settore": "Popolazione",
            "Indicatore": "http://old-host:8080/dati/42",
            "IndicatoreCSV": "http://csv-host/dati/42.csv",
            "TabNumeratore": "http://old-host:8080/num/42"
        }}]}}"#,
        description
    )
}

#[tokio::test]
async fn pro_detail_changes_drive_updates() {
    let site = StaticSite::new(&[
        ("https://statweb.example.org/index", PRO_INDEX),
        ("https://statweb.example.org/dati/42", r#"{"Tasso di natalita": []}"#),
    ]);
    site.publish("https://statweb.example.org/ind/42", &pro_metadata("Tasso di natalita"));

    let pipeline = HarvestPipeline::new(
        StatWebProSource::new(site.clone()),
        MemoryTrackingStore::new(),
        MemoryCatalog::new(),
    )
    .with_mapping_date(NaiveDate::from_ymd_opt(2024, 6, 1).unwrap());
    let job = job("https://statweb.example.org/index");
    let package_id = derive_package_id("statistica", "42");

    let first = pipeline.run(&job).await.unwrap();
    assert_eq!(first.stats.added, 1);
    let package = pipeline.store().package(&package_id).await.unwrap();
    assert_eq!(package.title, "Tasso di natalita");
    // numerator is not served: indicator plus its CSV twin
    assert_eq!(package.resources.len(), 2);
    assert_eq!(package.resources[0].url, "https://statweb.example.org/dati/42");
    assert_eq!(package.resources[1].url, "http://csv-host/dati/42.csv");

    let writes = pipeline.store().writes();
    let second = pipeline.run(&job).await.unwrap();
    assert_eq!(second.stats.unchanged, 1);
    assert_eq!(pipeline.store().writes(), writes);

    // same index entry, new detail document
    site.publish("https://statweb.example.org/ind/42", &pro_metadata("Tasso di natalita grezzo"));
    let third = pipeline.run(&job).await.unwrap();
    assert_eq!(third.stats.updated, 1);
    let package = pipeline.store().package(&package_id).await.unwrap();
    assert_eq!(package.title, "Tasso di natalita grezzo");
    assert_eq!(package.resources.len(), 2);

    let tracked = pipeline.tracking().items_for_guid("statistica:42").await;
    assert_eq!(tracked.iter().filter(|item| item.current).count(), 1);
}
