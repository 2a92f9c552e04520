//! Lookup tables and caches consulted while mapping remote metadata.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::{info, warn};

use crate::traits::{CatalogError, License, LicenseRegistry, VocabularyItem, VocabularySource};

/// Stable package identifier for a record of a source namespace.
///
/// The same `(namespace, record id)` pair always yields the same identifier.
pub fn derive_package_id(namespace: &str, record_id: &str) -> String {
    format!("{:x}", md5::compute(format!("{}:{}", namespace, record_id)))
}

/// Sector label -> group name, with a fixed fallback group.
#[derive(Debug, Clone, Copy)]
pub struct CategoryTable {
    entries: &'static [(&'static str, &'static str)],
    default_group: &'static str,
}

impl CategoryTable {
    pub const fn new(
        entries: &'static [(&'static str, &'static str)],
        default_group: &'static str,
    ) -> Self {
        Self {
            entries,
            default_group,
        }
    }

    /// Looks up the lower-cased, trimmed sector label.
    pub fn group_for(&self, sector: Option<&str>) -> &'static str {
        let Some(sector) = sector else {
            return self.default_group;
        };
        let key = sector.trim().to_lowercase();
        self.entries
            .iter()
            .find(|(label, _)| *label == key)
            .map(|(_, group)| *group)
            .unwrap_or(self.default_group)
    }

    pub fn default_group(&self) -> &'static str {
        self.default_group
    }
}

pub const PRO_CATEGORIES: CategoryTable = CategoryTable::new(
    &[
        ("agricoltura", "agricoltura"),
        ("pesca", "agricoltura"),
        ("silvicoltura", "agricoltura"),
        ("commercio con l'estero", "economia"),
        ("commercio con l'estero e internazionalizzazione", "economia"),
        ("internazionalizzazione", "economia"),
        ("conti economici", "economia"),
        ("pubblica amministrazione", "amministrazione"),
        ("istruzione formazione", "cultura"),
        ("istruzione e formazione", "cultura"),
        ("ricerca", "cultura"),
        ("sviluppo e innovazione", "scienza-tecnologia"),
        ("mercato del lavoro", "popolazionesocieta"),
        ("salute", "wellbeing"),
        ("famiglie e comportamenti sociali", "wellbeing"),
        ("assistenza e protezione sociale", "wellbeing"),
        ("popolazione", "popolazionesocieta"),
        ("società dell'informazione", "popolazionesocieta"),
    ],
    "popolazionesocieta",
);

pub const SUBPRO_CATEGORIES: CategoryTable = CategoryTable::new(
    &[
        ("l'ambiente e il territorio", "regionicitta"),
        ("le infrastrutture", "regionicitta"),
        ("popolazione", "popolazionesocieta"),
        ("famiglie e comportamenti sociali", "popolazionesocieta"),
        ("istruzione e formazione", "cultura"),
        ("mercato del lavoro", "economia"),
        (
            "le imprese, la formazione e la valorizzazione del capitale produttivo",
            "economia",
        ),
        ("agricoltura", "economia"),
        ("servizi", "economia"),
        ("agricoltura, silvicoltura, pesca", "agricoltura"),
    ],
    "popolazionesocieta",
);

/// In-process license registry.
#[derive(Debug, Clone)]
pub struct StaticLicenseRegistry {
    licenses: Vec<License>,
    default: License,
}

impl StaticLicenseRegistry {
    pub fn new(licenses: Vec<License>, default: License) -> Self {
        Self { licenses, default }
    }
}

impl Default for StaticLicenseRegistry {
    fn default() -> Self {
        let cc_by = License {
            name: "Creative Commons Attribution 4.0 International (CC BY 4.0)".into(),
            title: "Creative Commons Attribution 4.0 International (CC BY 4.0)".into(),
            uri: "https://creativecommons.org/licenses/by/4.0/".into(),
        };
        let cc0 = License {
            name: "Creative Commons CC0 1.0 Universal (CC0 1.0)".into(),
            title: "Creative Commons CC0 1.0 Universal (CC0 1.0)".into(),
            uri: "https://creativecommons.org/publicdomain/zero/1.0/".into(),
        };
        let odbl = License {
            name: "Open Data Commons Open Database License (ODbL)".into(),
            title: "Open Data Commons Open Database License (ODbL)".into(),
            uri: "https://opendatacommons.org/licenses/odbl/".into(),
        };
        let unknown = License {
            name: "Licenza sconosciuta".into(),
            title: "Licenza sconosciuta".into(),
            uri: "http://dati.gov.it/onto/controlledvocabulary/License/C1_Unknown".into(),
        };
        Self::new(vec![cc_by, cc0, odbl], unknown)
    }
}

impl LicenseRegistry for StaticLicenseRegistry {
    fn find_by_label(&self, label: &str) -> Option<License> {
        let suffix = format!("({})", label.trim());
        self.licenses
            .iter()
            .find(|license| license.name.ends_with(&suffix))
            .cloned()
    }

    fn default_license(&self) -> License {
        self.default.clone()
    }
}

pub type FrequencyMap = Arc<HashMap<String, String>>;

/// Frequency vocabulary, loaded once and shared until invalidated.
///
/// Keys are lower-cased labels, values are vocabulary codes.
pub struct FrequencyCache {
    source: Arc<dyn VocabularySource>,
    cached: RwLock<Option<FrequencyMap>>,
}

impl FrequencyCache {
    pub fn new(source: Arc<dyn VocabularySource>) -> Self {
        Self {
            source,
            cached: RwLock::new(None),
        }
    }

    pub async fn get(&self) -> FrequencyMap {
        if let Some(map) = self.cached.read().await.as_ref() {
            return Arc::clone(map);
        }
        self.reload().await
    }

    pub async fn invalidate(&self) {
        *self.cached.write().await = None;
    }

    /// Loads the vocabulary again, replacing any cached snapshot.
    ///
    /// A failed load yields an empty map and is not cached.
    pub async fn reload(&self) -> FrequencyMap {
        info!("Initializing frequencies mapping");
        match self.source.frequency_items().await {
            Ok(items) => {
                let map: FrequencyMap = Arc::new(
                    items
                        .into_iter()
                        .map(|item| (item.text.to_lowercase(), item.value))
                        .collect(),
                );
                info!(count = map.len(), "Cached frequencies");
                *self.cached.write().await = Some(Arc::clone(&map));
                map
            }
            Err(e) => {
                warn!(error = %e, "Could not load frequency vocabulary");
                Arc::new(HashMap::new())
            }
        }
    }
}

/// Vocabulary with the Italian labels of the EU frequency authority table.
#[derive(Debug, Clone, Default)]
pub struct StaticFrequencies;

#[async_trait]
impl VocabularySource for StaticFrequencies {
    async fn frequency_items(&self) -> Result<Vec<VocabularyItem>, CatalogError> {
        let items = [
            ("Annuale", "ANNUAL"),
            ("Semestrale", "ANNUAL_2"),
            ("Trimestrale", "QUARTERLY"),
            ("Mensile", "MONTHLY"),
            ("Settimanale", "WEEKLY"),
            ("Quotidiano", "DAILY"),
            ("Biennale", "BIENNIAL"),
            ("Triennale", "TRIENNIAL"),
            ("Irregolare", "IRREG"),
            ("Mai", "NEVER"),
        ];
        Ok(items
            .iter()
            .map(|(text, value)| VocabularyItem {
                text: text.to_string(),
                value: value.to_string(),
            })
            .collect())
    }
}
