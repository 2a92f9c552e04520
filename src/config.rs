//! Harvester configuration.
//!
//! Two layers are handled here:
//! - the per-source harvester configuration, a JSON text stored with the
//!   harvest source ([`HarvesterConfig`])
//! - the process settings read by the `harvest` binary from a TOML file
//!   ([`Settings`])

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tracing::debug;

use crate::model::GroupRef;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Configuration file not found: {path}")]
    NotFound { path: PathBuf },

    #[error("Failed to read configuration file")]
    Io(#[from] std::io::Error),

    #[error("Invalid configuration format")]
    InvalidFormat(#[from] toml::de::Error),

    #[error("Invalid harvester configuration JSON: {0}")]
    InvalidJson(#[from] serde_json::Error),

    #[error("Invalid configuration value for {field}: {reason}")]
    InvalidValue { field: String, reason: String },
}

/// Per-source configuration.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HarvesterConfig {
    pub groups: Vec<GroupRef>,
    /// The decoded document, unknown keys included.
    pub raw: serde_json::Map<String, Value>,
}

impl HarvesterConfig {
    /// Parses and validates a source configuration; empty text means defaults.
    pub fn parse(text: Option<&str>) -> Result<Self, ConfigError> {
        let text = match text.map(str::trim) {
            None | Some("") => return Ok(Self::default()),
            Some(text) => text,
        };

        let raw = match serde_json::from_str::<Value>(text)? {
            Value::Object(map) => map,
            _ => {
                return Err(ConfigError::InvalidValue {
                    field: "config".into(),
                    reason: "expected a JSON object".into(),
                })
            }
        };

        let groups = match raw.get("groups") {
            None => Vec::new(),
            Some(Value::Array(items)) => items
                .iter()
                .map(parse_group)
                .collect::<Result<Vec<_>, _>>()?,
            Some(_) => {
                return Err(ConfigError::InvalidValue {
                    field: "groups".into(),
                    reason: "\"groups\" should be a list".into(),
                })
            }
        };

        debug!(?groups, "Using harvester config");
        Ok(Self { groups, raw })
    }
}

fn parse_group(value: &Value) -> Result<GroupRef, ConfigError> {
    value
        .get("name")
        .and_then(Value::as_str)
        .filter(|name| !name.is_empty())
        .map(GroupRef::new)
        .ok_or_else(|| ConfigError::InvalidValue {
            field: "groups".into(),
            reason: format!("group reference without a name: {}", value),
        })
}

/// Which remote service a source talks to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    OpenCity,
    StatWebPro,
    StatWebSubPro,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceSettings {
    pub kind: SourceKind,
    pub id: String,
    pub name: String,
    pub url: String,
    /// Harvester configuration as JSON text
    pub config: Option<String>,
    pub owner_org: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpSettings {
    pub user_agent: String,
    /// Page size requested from paginated listings
    pub dataset_limit: u32,
}

impl Default for HttpSettings {
    fn default() -> Self {
        Self {
            user_agent: concat!("opendata-harvester/", env!("CARGO_PKG_VERSION")).to_string(),
            dataset_limit: crate::harvest::sources::opencity::DATASET_LIMIT,
        }
    }
}

/// Settings file for the `harvest` binary.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    pub source: SourceSettings,
    #[serde(default)]
    pub http: HttpSettings,
}

impl Settings {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Err(ConfigError::NotFound {
                path: path.to_path_buf(),
            });
        }
        let text = std::fs::read_to_string(path)?;
        let settings: Settings = toml::from_str(&text)?;
        settings.validate()?;
        Ok(settings)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.http.dataset_limit == 0 {
            return Err(ConfigError::InvalidValue {
                field: "http.dataset_limit".into(),
                reason: "must be greater than zero".into(),
            });
        }
        url::Url::parse(&self.source.url).map_err(|e| ConfigError::InvalidValue {
            field: "source.url".into(),
            reason: e.to_string(),
        })?;
        HarvesterConfig::parse(self.source.config.as_deref())?;
        Ok(())
    }
}
