use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Sync status attached to a queued [`TrackedItem`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ItemStatus {
    New,
    Change,
    Delete,
    Unchanged,
}

impl ItemStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ItemStatus::New => "new",
            ItemStatus::Change => "change",
            ItemStatus::Delete => "delete",
            ItemStatus::Unchanged => "unchanged",
        }
    }
}

/// One item as returned by a remote listing.
#[derive(Debug, Clone, PartialEq)]
pub struct RemoteRecord {
    pub guid: String,
    pub title: Option<String>,
    pub content: Value,
}

impl RemoteRecord {
    pub fn new(guid: impl Into<String>, content: Value) -> Self {
        let title = content
            .get("title")
            .and_then(Value::as_str)
            .map(str::to_string);
        Self {
            guid: guid.into(),
            title,
            content,
        }
    }

    /// Serialized payload stored on the tracked item.
    ///
    /// `serde_json::Map` keeps keys sorted, so two payloads that differ only
    /// in key order or whitespace serialize to the same text.
    pub fn serialized(&self) -> String {
        self.content.to_string()
    }
}

/// Local bookkeeping of a remote record seen by a harvest job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackedItem {
    pub id: String,
    pub source_id: String,
    pub job_id: String,
    pub guid: String,
    pub local_package_id: Option<String>,
    pub current: bool,
    pub content: Option<String>,
    pub status: ItemStatus,
    pub metadata_modified: Option<DateTime<Utc>>,
    pub errors: Vec<String>,
}

impl TrackedItem {
    pub fn queued(
        source_id: impl Into<String>,
        job_id: impl Into<String>,
        guid: impl Into<String>,
        status: ItemStatus,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            source_id: source_id.into(),
            job_id: job_id.into(),
            guid: guid.into(),
            local_package_id: None,
            current: false,
            content: None,
            status,
            metadata_modified: None,
            errors: Vec::new(),
        }
    }

    pub fn with_content(mut self, content: impl Into<String>) -> Self {
        self.content = Some(content.into());
        self
    }

    pub fn with_package(mut self, package_id: Option<String>) -> Self {
        self.local_package_id = package_id;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GroupRef {
    pub name: String,
}

impl GroupRef {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

/// A file or link attached to a package.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceAttachment {
    pub name: String,
    pub description: String,
    pub url: String,
    pub format: String,
    pub mimetype: String,
    pub resource_type: String,
    pub distribution_format: String,
    pub license_type: Option<String>,
}

/// Mapped package ready to be handed to the catalogue.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PackageDraft {
    pub id: Option<String>,
    pub title: String,
    pub notes: Option<String>,
    pub url: Option<String>,
    pub author: Option<String>,
    pub author_email: Option<String>,
    pub maintainer: Option<String>,
    pub maintainer_email: Option<String>,
    pub license_id: Option<String>,
    pub license_title: Option<String>,
    pub license_url: Option<String>,
    pub metadata_modified: Option<String>,
    pub owner_org: Option<String>,
    pub isopen: bool,
    pub groups: Vec<GroupRef>,
    pub resources: Vec<ResourceAttachment>,
    /// Flat extension attributes, structured values already JSON-encoded.
    pub extras: BTreeMap<String, String>,
}

impl PackageDraft {
    pub fn extra(&self, key: &str) -> Option<&str> {
        self.extras.get(key).map(String::as_str)
    }
}

/// Flattens structured extras into key -> text pairs.
///
/// Strings are kept verbatim, lists and maps become JSON text, nulls are
/// dropped.
pub fn flatten_extras(extras: serde_json::Map<String, Value>) -> BTreeMap<String, String> {
    extras
        .into_iter()
        .filter_map(|(key, value)| {
            let text = match value {
                Value::Null => return None,
                Value::String(s) => s,
                other => other.to_string(),
            };
            Some((key, text))
        })
        .collect()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Organization {
    pub id: String,
    pub name: String,
}

/// Permissions handed to every catalogue action.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActionContext {
    pub user: String,
    pub ignore_auth: bool,
}

impl Default for ActionContext {
    fn default() -> Self {
        Self {
            user: "harvest".to_string(),
            ignore_auth: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_serialized_ignores_key_order() {
        let a: Value = serde_json::from_str(r#"{"b": 1, "a": 2}"#).unwrap();
        let b: Value = serde_json::from_str(r#"{ "a":2,"b":1 }"#).unwrap();
        assert_eq!(
            RemoteRecord::new("x", a).serialized(),
            RemoteRecord::new("x", b).serialized()
        );
    }

    #[test]
    fn test_flatten_extras() {
        let mut map = serde_json::Map::new();
        map.insert("plain".into(), json!("text"));
        map.insert("list".into(), json!([{"theme": "OP_DATPRO"}]));
        map.insert("missing".into(), Value::Null);
        map.insert("year".into(), json!(2001));

        let flat = flatten_extras(map);
        assert_eq!(flat["plain"], "text");
        assert_eq!(flat["list"], r#"[{"theme":"OP_DATPRO"}]"#);
        assert_eq!(flat["year"], "2001");
        assert!(!flat.contains_key("missing"));
    }

    #[test]
    fn test_item_status_serialization() {
        let json = serde_json::to_string(&ItemStatus::Change).unwrap();
        assert_eq!(json, "\"change\"");
        assert_eq!(ItemStatus::Delete.as_str(), "delete");
    }
}
