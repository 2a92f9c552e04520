//! Read-only views over StatWeb index entries and metadata records.

use serde_json::{Map, Value};
use tracing::info;

use crate::decode::decode;
use crate::harvest::sources::text_of;
use crate::harvest::traits::HarvestError;

/// Logical metadata attributes.
///
/// Some attributes were published under different keys over time; each one
/// carries its candidate keys in lookup order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Field {
    Id,
    Description,
    Sector,
    Algorithm,
    LastUpdate,
    StartYear,
    EndYear,
    Frequency,
    MeasurementUnit,
    Theme,
    License,
    Area,
    Phenomenon,
    TerritorialComparisons,
    Notes,
    ProvincialSources,
    NationalSources,
    InternationalSources,
    MinGeoLevel,
    IndicatorType,
    BaseYear,
    DataSource,
    PhenomenonType,
}

impl Field {
    pub fn keys(&self) -> &'static [&'static str] {
        match self {
            Field::Id => &["id"],
            Field::Description => &["Descrizione"],
            Field::Sector => &["Settore"],
            Field::Algorithm => &["Algoritmo"],
            Field::LastUpdate => &["UltimoAggiornamento"],
            Field::StartYear => &["AnnoInizio"],
            Field::EndYear => &["AnnoFine"],
            Field::Frequency => &["FreqAggiornamento", "FrequenzaAggiornamento"],
            Field::MeasurementUnit => &["UnitàMisura", "UM"],
            Field::Theme => &["Tema"],
            Field::License => &["Licenza"],
            Field::Area => &["Area"],
            Field::Phenomenon => &["Fenomeno"],
            Field::TerritorialComparisons => &["ConfrontiTerritoriali"],
            Field::Notes => &["Note"],
            Field::ProvincialSources => &["NsoggDiffonPro"],
            Field::NationalSources => &["NsoggDiffonNaz"],
            Field::InternationalSources => &["NsoggDiffonInt"],
            Field::MinGeoLevel => &["LivelloGeograficoMinimo"],
            Field::IndicatorType => &["TipoIndicatore"],
            Field::BaseYear => &["AnnoBase"],
            Field::DataSource => &["Fonte"],
            Field::PhenomenonType => &["TipoFenomento", "TipoFenomeno"],
        }
    }
}

/// Metadata of one statistical indicator.
#[derive(Debug, Clone, PartialEq)]
pub struct StatWebMetadata {
    fields: Map<String, Value>,
}

impl StatWebMetadata {
    pub fn from_value(value: Value) -> Result<Self, HarvestError> {
        match value {
            Value::Object(fields) => Ok(Self { fields }),
            other => Err(HarvestError::mapping(format!(
                "StatWeb metadata should be an object, found {}",
                other
            ))),
        }
    }

    /// Parses a detail document `{ "<name>": [metadata, ...] }`.
    pub fn from_document(text: &str) -> Result<Self, HarvestError> {
        let first = first_listed(decode(text)?)?
            .into_iter()
            .next()
            .ok_or_else(|| HarvestError::mapping("Empty StatWeb metadata list"))?;
        Self::from_value(first)
    }

    /// First present, non-empty value among the candidate keys.
    pub fn get(&self, field: Field) -> Option<String> {
        field
            .keys()
            .iter()
            .find_map(|key| self.fields.get(*key).and_then(text_of))
    }

    /// Value of an arbitrary key.
    pub fn raw(&self, key: &str) -> Option<String> {
        self.fields.get(key).and_then(text_of)
    }

    pub fn into_value(self) -> Value {
        Value::Object(self.fields)
    }
}

/// One entry of the StatWebPro index: `{ "id": .., "URL": .. }`, plus the
/// `metadata` object once the fetch stage has run.
#[derive(Debug, Clone, PartialEq)]
pub struct StatWebEntry {
    fields: Map<String, Value>,
}

impl StatWebEntry {
    pub const GUID_PREFIX: &'static str = "statistica";

    pub fn from_value(value: Value) -> Result<Self, HarvestError> {
        match value {
            Value::Object(fields) => Ok(Self { fields }),
            other => Err(HarvestError::mapping(format!(
                "StatWebPro entry should be an object, found {}",
                other
            ))),
        }
    }

    pub fn parse(text: &str) -> Result<Self, HarvestError> {
        Self::from_value(decode(text)?)
    }

    pub fn id(&self) -> Option<String> {
        self.fields.get("id").and_then(text_of)
    }

    /// `statistica:<id>`, empty when the entry has no id.
    pub fn guid(&self) -> String {
        self.id()
            .map(|id| format!("{}:{}", Self::GUID_PREFIX, id))
            .unwrap_or_default()
    }

    pub fn url(&self) -> Option<String> {
        self.fields.get("URL").and_then(text_of)
    }

    pub fn set_metadata(&mut self, metadata: StatWebMetadata) {
        self.fields
            .insert("metadata".to_string(), metadata.into_value());
    }

    pub fn metadata(&self) -> Option<StatWebMetadata> {
        self.fields
            .get("metadata")
            .cloned()
            .and_then(|value| StatWebMetadata::from_value(value).ok())
    }

    pub fn to_json(&self) -> String {
        Value::Object(self.fields.clone()).to_string()
    }
}

/// Entries of an index document `{ "<name>": [entry, null, ...] }`.
///
/// Null entries are skipped.
pub fn parse_index(text: &str) -> Result<Vec<Value>, HarvestError> {
    let entries = first_listed(decode(text)?)?;
    let total = entries.len();
    let entries: Vec<Value> = entries.into_iter().filter(|e| !e.is_null()).collect();
    if entries.len() < total {
        info!(skipped = total - entries.len(), "Empty entries in index");
    }
    info!(count = entries.len(), "Found entries in index");
    Ok(entries)
}

fn first_listed(document: Value) -> Result<Vec<Value>, HarvestError> {
    let Value::Object(map) = document else {
        return Err(HarvestError::mapping("StatWeb document should be an object"));
    };
    match map.into_iter().next() {
        Some((_, Value::Array(items))) => Ok(items),
        Some((name, _)) => Err(HarvestError::mapping(format!(
            "StatWeb document key '{}' is not a list",
            name
        ))),
        None => Err(HarvestError::mapping("Empty StatWeb document")),
    }
}
