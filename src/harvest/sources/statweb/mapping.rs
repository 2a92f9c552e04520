//! StatWeb metadata -> package drafts.

use chrono::NaiveDate;
use serde_json::{json, Map, Value};
use tracing::warn;

use crate::harvest::sources::merge_groups;
use crate::harvest::traits::{HarvestError, MappingContext};
use crate::lookups::{derive_package_id, PRO_CATEGORIES, SUBPRO_CATEGORIES};
use crate::model::{flatten_extras, GroupRef, PackageDraft, ResourceAttachment};

use super::metadata::{Field, StatWebEntry, StatWebMetadata};

pub const TRENTO_IPA: &str = "p_TN";
pub const HOLDER_NAME: &str = "Provincia Autonoma di Trento";
pub const ISPAT_NAME: &str = "ISPAT Istituto di statistica della provincia di Trento";
pub const ISPAT_CODE: &str = "XGT4IE";
pub const ISPAT_BASE_URL: &str = "http://www.ispat.provincia.tn.it";
pub const ISPAT_MAIL: &str = "ispat@provincia.tn.it";
pub const SUBPRO_BASE_URL: &str = "http://www.statweb.provincia.tn.it/INDICATORISTRUTTURALISubPro/";

const AUTHOR: &str = "Servizio Statistica";
const AUTHOR_EMAIL: &str = "serv.statistica@provincia.tn.it";
const DEFAULT_THEME: &str = "OP_DATPRO";
const UNKNOWN_FREQUENCY: &str = "UNKNOWN";
const DESCRIPTION_END_TEXT: &str = "Elaborazioni a cura di ISPAT";

pub const PRO_NAMESPACE: &str = "statistica";
pub const SUBPRO_NAMESPACE: &str = "statistica_subpro";

/// Keys of the resources linked from a Pro metadata record.
pub const RESOURCE_KEYS: [&str; 3] = ["Indicatore", "TabNumeratore", "TabDenominatore"];

fn date_text(date: NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}

fn epoch() -> NaiveDate {
    NaiveDate::from_ymd_opt(1970, 1, 1).unwrap_or_default()
}

/// Jan 1 of `AnnoInizio`; missing or implausible years fall back to 1970.
fn start_date(metadata: &StatWebMetadata) -> NaiveDate {
    let year = match metadata.get(Field::StartYear) {
        None => 1970,
        Some(text) if text.trim().len() < 4 => {
            warn!(anno_inizio = %text, "Bad start year");
            1970
        }
        Some(text) => text.trim().parse::<i32>().unwrap_or_else(|_| {
            warn!(anno_inizio = %text, "Unparsable start year");
            1970
        }),
    };
    NaiveDate::from_ymd_opt(year, 1, 1).unwrap_or_else(epoch)
}

/// Dec 31 of `AnnoFine`, when it is a year.
fn end_date(metadata: &StatWebMetadata) -> Option<NaiveDate> {
    let text = metadata.get(Field::EndYear)?;
    match text.trim().parse::<i32>() {
        Ok(year) => NaiveDate::from_ymd_opt(year, 12, 31),
        Err(_) => {
            warn!(anno_fine = %text, "Unparsable end year");
            None
        }
    }
}

/// `UltimoAggiornamento` as `dd/mm/yyyy`, 01/01/1970 when absent.
fn last_update(metadata: &StatWebMetadata) -> NaiveDate {
    let Some(text) = metadata.get(Field::LastUpdate) else {
        return epoch();
    };
    NaiveDate::parse_from_str(text.trim(), "%d/%m/%Y").unwrap_or_else(|_| {
        warn!(ultimo_aggiornamento = %text, "Unparsable last update date");
        epoch()
    })
}

fn frequency_code(metadata: &StatWebMetadata, ctx: &MappingContext<'_>) -> String {
    let label = metadata.get(Field::Frequency);
    label
        .as_deref()
        .and_then(|label| ctx.frequencies.get(&label.to_lowercase()))
        .cloned()
        .unwrap_or_else(|| {
            warn!(frequency = ?label, "Could not parse frequency");
            UNKNOWN_FREQUENCY.to_string()
        })
}

fn put(extras: &mut Map<String, Value>, key: &str, value: Option<String>) {
    if let Some(value) = value {
        extras.insert(key.to_string(), Value::String(value));
    }
}

/// Fields shared by Pro and SubPro packages.
fn base_package(
    metadata: &StatWebMetadata,
    ctx: &MappingContext<'_>,
) -> Result<(PackageDraft, Map<String, Value>), HarvestError> {
    let title = metadata
        .get(Field::Description)
        .ok_or_else(|| HarvestError::mapping("StatWeb metadata has no Descrizione"))?;
    let today = date_text(ctx.today);
    let created = start_date(metadata);
    let license = ctx.licenses.resolve(metadata.get(Field::License).as_deref());

    let mut extras = Map::new();
    put(&mut extras, "holder_name", Some(HOLDER_NAME.into()));
    put(&mut extras, "holder_identifier", Some(TRENTO_IPA.into()));
    extras.insert(
        "themes_aggregate".into(),
        json!([{
            "subthemes": [],
            "theme": metadata.get(Field::Theme).unwrap_or_else(|| DEFAULT_THEME.into()),
        }]),
    );
    put(&mut extras, "geographical_name", Some("ITA_TRT".into()));
    put(
        &mut extras,
        "geographical_geonames_url",
        Some("http://www.geonames.org/3165243".into()),
    );
    put(&mut extras, "temporal_start", Some(date_text(created)));
    put(&mut extras, "frequency", Some(frequency_code(metadata, ctx)));
    put(&mut extras, "issued", Some(today.clone()));
    put(&mut extras, "modified", Some(date_text(last_update(metadata))));
    put(&mut extras, "encoding", Some("UTF-8".into()));
    put(&mut extras, "Algoritmo", metadata.get(Field::Algorithm));
    put(&mut extras, "Anno di inizio", metadata.get(Field::StartYear));
    put(&mut extras, "Measurement unit", metadata.get(Field::MeasurementUnit));

    if metadata.get(Field::StartYear).is_some() {
        let mut interval = Map::new();
        interval.insert("temporal_start".into(), Value::String(date_text(created)));
        if let Some(end) = end_date(metadata) {
            interval.insert("temporal_end".into(), Value::String(date_text(end)));
        }
        extras.insert(
            "temporal_coverage".into(),
            Value::Array(vec![Value::Object(interval)]),
        );
    }

    let draft = PackageDraft {
        title,
        author: Some(AUTHOR.into()),
        author_email: Some(AUTHOR_EMAIL.into()),
        maintainer: Some(AUTHOR.into()),
        maintainer_email: Some(AUTHOR_EMAIL.into()),
        license_id: Some(license.name),
        license_title: Some(license.title),
        license_url: Some(license.uri),
        metadata_modified: Some(today),
        isopen: true,
        ..Default::default()
    };
    Ok((draft, extras))
}

/// Package for a StatWebPro indicator.
pub fn pro_package(
    entry: &StatWebEntry,
    metadata: &StatWebMetadata,
    ctx: &MappingContext<'_>,
) -> Result<PackageDraft, HarvestError> {
    let id = entry
        .id()
        .ok_or_else(|| HarvestError::mapping("StatWebPro entry has no id"))?;
    let (mut draft, mut extras) = base_package(metadata, ctx)?;

    put(&mut extras, "identifier", Some(format!("{}:ispat_{}", TRENTO_IPA, id)));
    put(&mut extras, "language", Some("ITA".into()));
    put(&mut extras, "publisher_name", Some(ISPAT_NAME.into()));
    put(&mut extras, "publisher_identifier", Some(ISPAT_CODE.into()));
    extras.insert(
        "creator".into(),
        json!([{
            "creator_name": {"it": ISPAT_NAME, "de": ISPAT_NAME, "fr": ISPAT_NAME, "en": ISPAT_NAME},
            "creator_identifier": ISPAT_CODE,
        }]),
    );
    extras.insert(
        "contact_point".into(),
        json!([{
            "contact_point_name": ISPAT_NAME,
            "contact_point_identifier": ISPAT_CODE,
            "contact_point_email": ISPAT_MAIL,
        }]),
    );
    put(&mut extras, "Fenomeno", metadata.get(Field::Phenomenon));
    put(
        &mut extras,
        "Confronti territoriali",
        metadata.get(Field::TerritorialComparisons),
    );
    put(&mut extras, "_harvest_source", Some(format!("{}:{}", PRO_NAMESPACE, id)));
    put(&mut extras, "source_url", entry.url());

    let group = PRO_CATEGORIES.group_for(metadata.get(Field::Sector).as_deref());
    draft.id = Some(derive_package_id(PRO_NAMESPACE, &id));
    draft.url = Some(ISPAT_BASE_URL.into());
    draft.notes = Some(pro_description(metadata));
    draft.groups = merge_groups(Some(GroupRef::new(group)), &ctx.config.groups);
    draft.extras = flatten_extras(extras);
    Ok(draft)
}

/// Package for a StatWebSubPro indicator.
pub fn subpro_package(
    metadata: &StatWebMetadata,
    ctx: &MappingContext<'_>,
) -> Result<PackageDraft, HarvestError> {
    let id = metadata
        .get(Field::Id)
        .ok_or_else(|| HarvestError::mapping("StatWebSubPro metadata has no id"))?;
    let (mut draft, mut extras) = base_package(metadata, ctx)?;
    let package_id = derive_package_id(SUBPRO_NAMESPACE, &id);

    put(&mut extras, "identifier", Some(package_id.clone()));
    put(&mut extras, "Fonte", metadata.get(Field::DataSource));
    put(&mut extras, "Tipo di Fenomeno", metadata.get(Field::PhenomenonType));
    put(&mut extras, "Tipo di Indicatore", metadata.get(Field::IndicatorType));
    put(&mut extras, "Settore", metadata.get(Field::Sector));
    put(
        &mut extras,
        "Livello Geografico Minimo",
        metadata.get(Field::MinGeoLevel),
    );
    put(
        &mut extras,
        "_harvest_source",
        Some(format!("{}:{}", SUBPRO_NAMESPACE, id)),
    );

    let group = SUBPRO_CATEGORIES.group_for(metadata.get(Field::Sector).as_deref());
    draft.id = Some(package_id);
    draft.url = Some(SUBPRO_BASE_URL.into());
    draft.notes = Some(subpro_description(metadata));
    draft.groups = merge_groups(Some(GroupRef::new(group)), &ctx.config.groups);
    draft.extras = flatten_extras(extras);
    Ok(draft)
}

fn add_field(description: &mut String, label: &str, value: Option<String>) {
    if let Some(value) = value {
        description.push_str(&format!("**{}:** {}\n\n", label, value));
    }
}

pub fn pro_description(metadata: &StatWebMetadata) -> String {
    let mut d = String::new();
    add_field(&mut d, "Area", metadata.get(Field::Area));
    add_field(&mut d, "Settore", metadata.get(Field::Sector));
    add_field(&mut d, "Algoritmo", metadata.get(Field::Algorithm));
    add_field(&mut d, "Fenomeno", metadata.get(Field::Phenomenon));
    add_field(
        &mut d,
        "Confronti territoriali",
        metadata.get(Field::TerritorialComparisons),
    );
    add_field(&mut d, "Anno Inizio", metadata.get(Field::StartYear));
    add_field(&mut d, "Anno Fine", metadata.get(Field::EndYear));
    add_field(&mut d, "Note", metadata.get(Field::Notes));
    add_field(&mut d, "Fonte dati Trentino", metadata.get(Field::ProvincialSources));
    add_field(&mut d, "Fonte dati nazionali", metadata.get(Field::NationalSources));
    add_field(
        &mut d,
        "Fonte dati internazionali",
        metadata.get(Field::InternationalSources),
    );
    d.push_str(DESCRIPTION_END_TEXT);
    d
}

fn indicator_type_label(code: &str) -> Option<&'static str> {
    match code {
        "R" => Some("Rapporto"),
        "M" => Some("Media"),
        "I" => Some("Incremento anno precedente"),
        _ => None,
    }
}

pub fn subpro_description(metadata: &StatWebMetadata) -> String {
    let indicator_type = metadata
        .get(Field::IndicatorType)
        .and_then(|code| indicator_type_label(code.trim()))
        .map(str::to_string);

    let mut d = String::new();
    add_field(&mut d, "Settore", metadata.get(Field::Sector));
    add_field(&mut d, "Algoritmo", metadata.get(Field::Algorithm));
    add_field(&mut d, "Tipo Indicatore", indicator_type);
    add_field(&mut d, "Livello Geografico Minimo", metadata.get(Field::MinGeoLevel));
    d
}

pub fn json_resource(name: &str, url: &str, license_url: Option<&str>) -> ResourceAttachment {
    ResourceAttachment {
        name: name.to_string(),
        description: name.to_string(),
        url: url.to_string(),
        format: "json".into(),
        mimetype: "application/json".into(),
        resource_type: "api".into(),
        distribution_format: "JSON".into(),
        license_type: license_url.map(str::to_string),
    }
}

pub fn csv_resource(name: &str, url: &str, license_url: Option<&str>) -> ResourceAttachment {
    ResourceAttachment {
        format: "csv".into(),
        mimetype: "text/csv".into(),
        resource_type: "file".into(),
        distribution_format: "CSV".into(),
        ..json_resource(name, url, license_url)
    }
}
