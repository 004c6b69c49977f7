//! Statistics Sweden (SCB) adapter.
//!
//! Population per municipality comes from an open rowstore dataset with one
//! row per municipality. County and country totals are summed from the
//! municipality rows.

use std::collections::BTreeMap;

use chrono::NaiveDate;
use serde_json::Value;

use popsync_recon::model::{Population, SourceRecord};
use popsync_recon::{EntityId, EntityKind};

use super::common::FetchClient;
use crate::CliError;

pub(crate) const SCB_ROWSTORE_URL: &str =
    "https://catalog.skl.se/rowstore/dataset/b80d412c-9a81-4de3-a62c-724192295677";

const ROW_LIMIT: &str = "400";
const POPULATION_PREFIX: &str = "folkmängd";
pub(crate) const COUNTRY_NAME: &str = "Sverige";

pub(crate) struct ScbClient {
    fetch: FetchClient,
    url: String,
}

impl ScbClient {
    pub(crate) fn new() -> Result<Self, CliError> {
        Ok(Self::with_url(FetchClient::new("SCB")?, SCB_ROWSTORE_URL.to_string()))
    }

    pub(crate) fn with_url(fetch: FetchClient, url: String) -> Self {
        Self { fetch, url }
    }

    /// Country, county and municipality records, in that order.
    pub(crate) fn population(&self) -> Result<Vec<SourceRecord>, CliError> {
        let body = self.fetch.get_json(&self.url, &[("_limit", ROW_LIMIT)])?;
        parse_rowstore(&body).map_err(|e| self.fetch.malformed(e))
    }
}

/// Parse rowstore `results` into country, county and municipality records.
///
/// The population column is named `folkmängd YYYY` (end of year); the
/// record date is the first day of the following year.
pub(crate) fn parse_rowstore(body: &Value) -> Result<Vec<SourceRecord>, String> {
    let rows = body["results"].as_array().ok_or("missing results array")?;
    let first = rows.first().and_then(Value::as_object).ok_or("no rows")?;

    let population_key = first
        .keys()
        .find(|k| k.starts_with(POPULATION_PREFIX))
        .ok_or_else(|| format!("no '{POPULATION_PREFIX} YYYY' column"))?
        .clone();
    let record_date = year_end_date(&population_key)?;

    let mut country = Population(0);
    let mut counties: BTreeMap<String, (String, Population)> = BTreeMap::new();
    let mut municipalities = Vec::with_capacity(rows.len());

    for row in rows {
        let field = |name: &str| text(row, name);

        let population = match &row[population_key.as_str()] {
            Value::Number(n) => n.as_u64().map(Population).ok_or_else(|| format!("bad population {n}"))?,
            Value::String(s) => s.parse::<Population>().map_err(|e| e.to_string())?,
            other => return Err(format!("bad population {other}")),
        };

        let id = EntityId::parse(EntityKind::Municipality, field("kommunkod")?).map_err(|e| e.to_string())?;
        let county_code = field("länskod")?;
        EntityId::parse(EntityKind::County, county_code).map_err(|e| e.to_string())?;

        let county = counties
            .entry(county_code.to_string())
            .or_insert_with(|| (String::new(), Population(0)));
        if county.0.is_empty() {
            county.0 = field("län")?.to_string();
        }
        county.1 += population;
        country += population;

        municipalities.push(SourceRecord {
            id,
            name: field("kommun")?.to_string(),
            population,
            record_date,
            parent_refs: Vec::new(),
        });
    }

    let mut records = vec![SourceRecord {
        id: EntityId::country(),
        name: COUNTRY_NAME.into(),
        population: country,
        record_date,
        parent_refs: Vec::new(),
    }];
    for (code, (name, population)) in counties {
        records.push(SourceRecord {
            id: EntityId::parse(EntityKind::County, &code).map_err(|e| e.to_string())?,
            name,
            population,
            record_date,
            parent_refs: Vec::new(),
        });
    }
    records.extend(municipalities);

    log::info!("{COUNTRY_NAME}: {country} inhabitants per {record_date}");
    Ok(records)
}

fn text<'a>(row: &'a Value, name: &str) -> Result<&'a str, String> {
    row[name].as_str().ok_or_else(|| format!("row without '{name}': {row}"))
}

fn year_end_date(key: &str) -> Result<NaiveDate, String> {
    let year: i32 = key
        .get(key.len().saturating_sub(4)..)
        .and_then(|y| y.parse().ok())
        .ok_or_else(|| format!("no year in column '{key}'"))?;
    NaiveDate::from_ymd_opt(year + 1, 1, 1).ok_or_else(|| format!("bad year in column '{key}'"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample() -> Value {
        json!({
            "results": [
                { "kommunkod": "0114", "kommun": "Upplands Väsby", "länskod": "01", "län": "Stockholms län", "folkmängd 2019": "46 784" },
                { "kommunkod": "0180", "kommun": "Stockholm", "länskod": "01", "län": "Stockholms län", "folkmängd 2019": 974073 },
                { "kommunkod": "0380", "kommun": "Uppsala", "länskod": "03", "län": "Uppsala län", "folkmängd 2019": "233 839" }
            ]
        })
    }

    #[test]
    fn aggregates_counties_and_country() {
        let records = parse_rowstore(&sample()).unwrap();

        let rows: Vec<(EntityKind, &str, u64)> = records
            .iter()
            .map(|r| (r.id.kind(), r.id.code(), r.population.get()))
            .collect();
        assert_eq!(
            rows,
            vec![
                (EntityKind::Country, "0", 1_254_696),
                (EntityKind::County, "01", 1_020_857),
                (EntityKind::County, "03", 233_839),
                (EntityKind::Municipality, "0114", 46_784),
                (EntityKind::Municipality, "0180", 974_073),
                (EntityKind::Municipality, "0380", 233_839),
            ]
        );
        assert_eq!(records[1].name, "Stockholms län");
        assert!(records
            .iter()
            .all(|r| r.record_date == NaiveDate::from_ymd_opt(2020, 1, 1).unwrap()));
    }

    #[test]
    fn rejects_rows_without_population_column() {
        let body = json!({ "results": [{ "kommunkod": "0114", "kommun": "X", "länskod": "01", "län": "Y" }] });
        assert!(parse_rowstore(&body).is_err());
    }

    #[test]
    fn rejects_bad_municipality_code() {
        let body = json!({ "results": [
            { "kommunkod": "114", "kommun": "X", "länskod": "01", "län": "Y", "folkmängd 2019": "1" }
        ] });
        assert!(parse_rowstore(&body).is_err());
    }
}
