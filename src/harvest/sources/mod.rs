//! Remote services the harvester knows how to talk to.

pub mod opencity;
pub mod statweb;

use std::sync::Arc;

use serde_json::Value;

use crate::client::Fetcher;
use crate::config::SourceKind;
use crate::model::GroupRef;

use super::traits::HarvestSource;

pub use opencity::OpenCitySource;
pub use statweb::{StatWebProSource, StatWebSubProSource};

/// Builds the source implementation for a configured kind.
///
/// `dataset_limit` is the page size of paginated listings.
pub fn source_for(
    kind: SourceKind,
    fetcher: Arc<dyn Fetcher>,
    dataset_limit: u32,
) -> Box<dyn HarvestSource> {
    match kind {
        SourceKind::OpenCity => {
            Box::new(OpenCitySource::new(fetcher).with_limit(dataset_limit))
        }
        SourceKind::StatWebPro => Box::new(StatWebProSource::new(fetcher)),
        SourceKind::StatWebSubPro => Box::new(StatWebSubProSource::new(fetcher)),
    }
}

/// Text form of a scalar JSON value; empty strings count as absent.
pub fn text_of(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

/// `first` followed by `configured`, without repeating a group name.
pub fn merge_groups(first: Option<GroupRef>, configured: &[GroupRef]) -> Vec<GroupRef> {
    let mut groups: Vec<GroupRef> = Vec::with_capacity(configured.len() + 1);
    for group in first.into_iter().chain(configured.iter().cloned()) {
        if !groups.iter().any(|g| g.name == group.name) {
            groups.push(group);
        }
    }
    groups
}
