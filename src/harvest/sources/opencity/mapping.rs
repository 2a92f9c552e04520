use serde_json::{Map, Value};

use crate::harvest::sources::{merge_groups, text_of};
use crate::harvest::traits::{HarvestError, MappingContext};
use crate::lookups::derive_package_id;
use crate::model::{flatten_extras, PackageDraft};

use super::{record_id, NAMESPACE};

/// Maps one OpenCity dataset to a package draft.
pub fn package_from_item(item: &Value, ctx: &MappingContext<'_>) -> Result<PackageDraft, HarvestError> {
    let id = record_id(item);
    let title = field(item, "title")
        .ok_or_else(|| HarvestError::mapping(format!("OpenCity dataset '{}' has no title", id)))?;
    let license = ctx.licenses.resolve(field(item, "license").as_deref());
    let today = ctx.today.format("%Y-%m-%d").to_string();

    let mut extras = Map::new();
    if let Some(identifier) = field(item, "identifier") {
        extras.insert("identifier".into(), Value::String(identifier));
    }
    if let Some(geonames) = field(item, "spatial_coverage") {
        extras.insert("geographical_geonames_url".into(), Value::String(geonames));
    }
    if let Some(start) = field(item, "start_date") {
        let mut interval = Map::new();
        interval.insert("temporal_start".into(), Value::String(start));
        if let Some(end) = field(item, "end_date") {
            interval.insert("temporal_end".into(), Value::String(end));
        }
        extras.insert(
            "temporal_coverage".into(),
            Value::Array(vec![Value::Object(interval)]),
        );
    }
    extras.insert("issued".into(), Value::String(today.clone()));
    extras.insert(
        "_harvest_source".into(),
        Value::String(format!("{}:{}", NAMESPACE, id)),
    );

    Ok(PackageDraft {
        id: Some(derive_package_id(NAMESPACE, &id)),
        title,
        notes: field(item, "short_description"),
        url: field(item, "uri"),
        license_id: Some(license.name),
        license_title: Some(license.title),
        license_url: Some(license.uri),
        metadata_modified: Some(today),
        isopen: true,
        groups: merge_groups(None, &ctx.config.groups),
        extras: flatten_extras(extras),
        ..Default::default()
    })
}

fn field(item: &Value, key: &str) -> Option<String> {
    item.get(key).and_then(text_of)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::HarvesterConfig;
    use crate::lookups::StaticLicenseRegistry;
    use crate::model::GroupRef;
    use chrono::NaiveDate;
    use serde_json::json;
    use std::collections::HashMap;
    use std::sync::Arc;

    fn context<'a>(config: &'a HarvesterConfig, licenses: &'a StaticLicenseRegistry) -> MappingContext<'a> {
        MappingContext {
            config,
            licenses,
            frequencies: Arc::new(HashMap::new()),
            today: NaiveDate::from_ymd_opt(2024, 3, 1).unwrap(),
        }
    }

    #[test]
    fn test_maps_dataset() {
        let config = HarvesterConfig {
            groups: vec![GroupRef::new("comune")],
            ..Default::default()
        };
        let licenses = StaticLicenseRegistry::default();
        let item = json!({
            "id": "ds-1",
            "title": "Parcheggi",
            "short_description": "Posti auto in centro",
            "identifier": "c_l378:ds-1",
            "spatial_coverage": "http://www.geonames.org/3165243",
            "uri": "https://city.example.org/ds-1",
            "start_date": "2020-01-01",
            "end_date": "2020-12-31",
            "license": "CC BY 4.0"
        });

        let draft = package_from_item(&item, &context(&config, &licenses)).unwrap();
        assert_eq!(draft.id.as_deref(), Some(derive_package_id("opencity", "ds-1").as_str()));
        assert_eq!(draft.title, "Parcheggi");
        assert_eq!(draft.notes.as_deref(), Some("Posti auto in centro"));
        assert_eq!(draft.url.as_deref(), Some("https://city.example.org/ds-1"));
        assert_eq!(draft.extra("identifier"), Some("c_l378:ds-1"));
        assert_eq!(
            draft.extra("temporal_coverage"),
            Some(r#"[{"temporal_end":"2020-12-31","temporal_start":"2020-01-01"}]"#)
        );
        assert_eq!(
            draft.license_url.as_deref(),
            Some("https://creativecommons.org/licenses/by/4.0/")
        );
        assert_eq!(draft.groups, vec![GroupRef::new("comune")]);
        assert_eq!(draft.metadata_modified.as_deref(), Some("2024-03-01"));
    }

    #[test]
    fn test_missing_title_is_an_error() {
        let config = HarvesterConfig::default();
        let licenses = StaticLicenseRegistry::default();
        let err = package_from_item(&json!({"id": 4}), &context(&config, &licenses)).unwrap_err();
        assert!(err.to_string().contains("no title"));
    }

    #[test]
    fn test_optional_fields_are_omitted() {
        let config = HarvesterConfig::default();
        let licenses = StaticLicenseRegistry::default();
        let draft =
            package_from_item(&json!({"id": 4, "title": "Scuole"}), &context(&config, &licenses)).unwrap();
        assert!(draft.extra("temporal_coverage").is_none());
        assert!(draft.extra("identifier").is_none());
        assert_eq!(draft.extra("_harvest_source"), Some("opencity:4"));
        assert_eq!(draft.license_id.as_deref(), Some("Licenza sconosciuta"));
    }
}
