//! Statistics Norway (SSB) adapter.
//!
//! Two products are used:
//!
//! - Predefined JSON-stat datasets with the latest quarterly population
//!   per region (`1104` country, `1102` counties, `1108` municipalities).
//! - CSV exports of statistical tables (`tabell.csv?key=...`), used for the
//!   urban settlement table. Parsing lives in `popsync_io::settlement_table`.

use chrono::NaiveDate;
use serde_json::Value;

use popsync_recon::model::{Population, SourceRecord};
use popsync_recon::{EntityId, EntityKind};

use super::common::FetchClient;
use crate::CliError;

pub(crate) const SSB_DATASET_BASE: &str = "https://data.ssb.no/api/v0/dataset";
pub(crate) const SSB_TABLE_URL: &str = "https://www.ssb.no/eksport/tabell.csv";

/// Contents code of the population figure inside the datasets.
const POPULATION_CONTENT: &str = "Folketallet11";

/// Predefined dataset for an administrative level.
pub(crate) fn dataset_for(kind: EntityKind) -> Option<&'static str> {
    match kind {
        EntityKind::Country => Some("1104"),
        EntityKind::County => Some("1102"),
        EntityKind::Municipality => Some("1108"),
        EntityKind::Settlement => None,
    }
}

pub(crate) struct SsbClient {
    fetch: FetchClient,
    dataset_base: String,
    table_url: String,
}

impl SsbClient {
    pub(crate) fn new() -> Result<Self, CliError> {
        Ok(Self::with_base_urls(
            FetchClient::new("SSB")?,
            SSB_DATASET_BASE.to_string(),
            SSB_TABLE_URL.to_string(),
        ))
    }

    pub(crate) fn with_base_urls(fetch: FetchClient, dataset_base: String, table_url: String) -> Self {
        Self {
            fetch,
            dataset_base: dataset_base.trim_end_matches('/').to_string(),
            table_url,
        }
    }

    /// Latest population of every region in `dataset`.
    pub(crate) fn population(&self, dataset: &str, kind: EntityKind) -> Result<Vec<SourceRecord>, CliError> {
        let url = format!("{}/{dataset}.json", self.dataset_base);
        let body = self.fetch.get_json(&url, &[("lang", "no")])?;
        parse_dataset(&body, kind).map_err(|e| self.fetch.malformed(format!("dataset {dataset}: {e}")))
    }

    /// Raw bytes of an exported statistical table.
    pub(crate) fn table(&self, key: &str) -> Result<Vec<u8>, CliError> {
        self.fetch.get_bytes(&self.table_url, &[("key", key)])
    }
}

// ── JSON-stat ───────────────────────────────────────────────────────

/// Parse a single-period JSON-stat dataset into one record per region.
///
/// The value of region `r` is at `index(r) * contents + index(Folketallet11)`.
/// Regions without a figure (`null`) are skipped.
pub(crate) fn parse_dataset(body: &Value, kind: EntityKind) -> Result<Vec<SourceRecord>, String> {
    let dataset = &body["dataset"];
    let dimension = &dataset["dimension"];

    let regions = dimension["Region"]["category"]["index"]
        .as_object()
        .ok_or("missing Region index")?;
    let labels = &dimension["Region"]["category"]["label"];

    let contents = dimension["ContentsCode"]["category"]["index"]
        .as_object()
        .ok_or("missing ContentsCode index")?;
    let content_position = contents
        .get(POPULATION_CONTENT)
        .and_then(Value::as_u64)
        .ok_or_else(|| format!("no {POPULATION_CONTENT} contents code"))?;

    let periods = dimension["Tid"]["category"]["index"]
        .as_object()
        .ok_or("missing Tid index")?;
    let period = match periods.keys().collect::<Vec<_>>().as_slice() {
        [period] => period.as_str(),
        other => return Err(format!("expected a single period, found {}", other.len())),
    };
    let record_date = quarter_date(period)?;

    let values = dataset["value"].as_array().ok_or("missing value array")?;

    let mut records = Vec::with_capacity(regions.len());
    for (code, position) in regions {
        let position = position
            .as_u64()
            .ok_or_else(|| format!("region {code}: index is not a number"))?;
        let at = (position * contents.len() as u64 + content_position) as usize;
        let value = values
            .get(at)
            .ok_or_else(|| format!("region {code}: value {at} out of range"))?;

        let population = match value {
            Value::Null => {
                log::debug!("{kind} {code}: no population for {period}");
                continue;
            }
            Value::Number(n) => n
                .as_u64()
                .map(Population)
                .ok_or_else(|| format!("region {code}: population {n} is not a whole number"))?,
            Value::String(s) => s.parse::<Population>().map_err(|e| format!("region {code}: {e}"))?,
            other => return Err(format!("region {code}: unexpected value {other}")),
        };

        let id = EntityId::parse(kind, code).map_err(|e| e.to_string())?;
        let name = labels[code.as_str()].as_str().unwrap_or(code).to_string();

        records.push(SourceRecord {
            id,
            name,
            population,
            record_date,
            parent_refs: Vec::new(),
        });
    }

    log::info!("{} {} for {period} ({record_date})", records.len(), kind.plural());
    Ok(records)
}

/// Population date for a quarter such as `2020K1`: the first day after it.
pub(crate) fn quarter_date(period: &str) -> Result<NaiveDate, String> {
    let bad = || format!("unrecognised period {period:?} (expected YYYYKq)");
    let (year, quarter) = period.split_once('K').ok_or_else(bad)?;
    let year: i32 = year.parse().map_err(|_| bad())?;

    let (year, month) = match quarter {
        "1" => (year, 4),
        "2" => (year, 7),
        "3" => (year, 10),
        "4" => (year + 1, 1),
        _ => return Err(bad()),
    };
    NaiveDate::from_ymd_opt(year, month, 1).ok_or_else(bad)
}
