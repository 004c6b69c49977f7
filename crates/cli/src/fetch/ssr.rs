//! Place-name lookup in the Norwegian central place name register (SSR),
//! used to position new urban settlement nodes.

use serde_json::Value;

use popsync_recon::create::{Placement, PlacementQuality};
use popsync_recon::model::SourceRecord;

use super::common::FetchClient;
use crate::CliError;

pub(crate) const SSR_URL: &str = "https://ws.geonorge.no/SKWS3Index/ssr/json/sok";

/// Place types describing settlements, administration or landmarks. A hit
/// of one of these types is preferred over the first hit.
const PREFERRED_TYPES: &[&str] = &[
    "by",
    "tettsted",
    "tettbebyggelse",
    "tettsteddel",
    "bydel",
    "bygdelag (bygd)",
    "grend",
    "boligfelt",
    "kommune",
    "kirke",
    "skole",
    "rådhus",
    "stasjon",
];

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Hit {
    pub lat: f64,
    pub lon: f64,
    pub place_type: String,
}

pub(crate) struct SsrClient {
    fetch: FetchClient,
    url: String,
}

impl SsrClient {
    pub(crate) fn new() -> Result<Self, CliError> {
        Ok(Self::with_url(FetchClient::new("SSR")?, SSR_URL.to_string()))
    }

    pub(crate) fn with_url(fetch: FetchClient, url: String) -> Self {
        Self { fetch, url }
    }

    /// Best hit for `name` inside municipality `municipality`.
    pub(crate) fn search(&self, name: &str, municipality: &str) -> Result<Option<Hit>, CliError> {
        let name: String = name.chars().filter(|c| !matches!(c, '(' | ')')).collect();
        let body = self.fetch.get_json(
            &self.url,
            &[
                ("navn", name.trim()),
                ("epsgKode", "4326"),
                ("fylkeKommuneListe", municipality),
                ("eksakteForst", "true"),
            ],
        )?;
        best_hit(&body).map_err(|e| self.fetch.malformed(e))
    }

    /// Place a new settlement.
    ///
    /// Every part of the name (split on `/`, else `-`) is searched in each
    /// member municipality. Failing that, the first municipality whose own
    /// name is found is used and the placement is flagged for review.
    pub(crate) fn locate(&self, record: &SourceRecord) -> Result<Placement, CliError> {
        let names: Vec<&str> = if record.name.contains('/') {
            record.name.split('/').collect()
        } else {
            record.name.split('-').collect()
        };

        for member in &record.parent_refs {
            for name in names.iter().map(|n| n.trim()).filter(|n| !n.is_empty()) {
                if let Some(hit) = self.search(name, &member.id)? {
                    log::info!("{} {} -> {}, {}", record.name, record.population, hit.place_type, member.name);
                    return Ok(placement(hit, &member.name, PlacementQuality::Exact));
                }
            }
        }

        for member in &record.parent_refs {
            if let Some(hit) = self.search(&member.name, &member.id)? {
                log::info!("{} {} -> municipality {}", record.name, record.population, member.name);
                return Ok(placement(hit, &member.name, PlacementQuality::Municipality));
            }
        }

        Ok(Placement::not_found())
    }
}

fn placement(hit: Hit, municipality: &str, quality: PlacementQuality) -> Placement {
    Placement {
        lat: hit.lat,
        lon: hit.lon,
        municipality: Some(municipality.to_string()),
        place_type: Some(hit.place_type).filter(|t| !t.is_empty()),
        quality,
    }
}

/// Pick from `stedsnavn`, which is an object for a single hit and an array
/// otherwise. Absent means no hits.
pub(crate) fn best_hit(body: &Value) -> Result<Option<Hit>, String> {
    let places: Vec<&Value> = match &body["stedsnavn"] {
        Value::Null => return Ok(None),
        Value::Array(items) => items.iter().collect(),
        single @ Value::Object(_) => vec![single],
        other => return Err(format!("unexpected stedsnavn {other}")),
    };

    let chosen = places
        .iter()
        .copied()
        .find(|p| PREFERRED_TYPES.contains(&place_type(p).to_lowercase().as_str()))
        .or_else(|| places.first().copied());

    let Some(place) = chosen else { return Ok(None) };
    Ok(Some(Hit {
        lat: coordinate(&place["nord"])?,
        lon: coordinate(&place["aust"])?,
        place_type: place_type(place),
    }))
}

fn place_type(place: &Value) -> String {
    place["navnetype"].as_str().unwrap_or_default().trim().to_string()
}

fn coordinate(value: &Value) -> Result<f64, String> {
    match value {
        Value::Number(n) => n.as_f64().ok_or_else(|| format!("bad coordinate {n}")),
        Value::String(s) => s.trim().parse().map_err(|_| format!("bad coordinate {s:?}")),
        other => Err(format!("bad coordinate {other}")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use httpmock::prelude::*;
    use popsync_recon::model::{MemberRef, Population};
    use popsync_recon::{EntityId, EntityKind};
    use serde_json::json;
    use std::time::Duration;

    #[test]
    fn single_hit_is_an_object() {
        let body = json!({ "stedsnavn": { "nord": "59.1229", "aust": "11.3875", "navnetype": "By " } });
        let hit = best_hit(&body).unwrap().unwrap();
        assert_eq!(hit, Hit { lat: 59.1229, lon: 11.3875, place_type: "By".into() });
    }

    #[test]
    fn preferred_type_wins_over_order() {
        let body = json!({ "stedsnavn": [
            { "nord": "1", "aust": "1", "navnetype": "Vann" },
            { "nord": "2", "aust": "2", "navnetype": "Tettsted" }
        ] });
        assert_eq!(best_hit(&body).unwrap().unwrap().place_type, "Tettsted");

        let body = json!({ "stedsnavn": [{ "nord": "1", "aust": "1", "navnetype": "Vann" }] });
        assert_eq!(best_hit(&body).unwrap().unwrap().place_type, "Vann");
    }

    #[test]
    fn no_hits() {
        assert_eq!(best_hit(&json!({ "totaltAntallTreff": "0" })).unwrap(), None);
        assert_eq!(best_hit(&json!({ "stedsnavn": [] })).unwrap(), None);
    }

    fn record(name: &str) -> SourceRecord {
        SourceRecord {
            id: EntityId::parse(EntityKind::Settlement, "0105").unwrap(),
            name: name.into(),
            population: Population(1200),
            record_date: NaiveDate::from_ymd_opt(2020, 1, 1).unwrap(),
            parent_refs: vec![MemberRef { id: "3001".into(), name: "Halden".into(), population: Population(1200) }],
        }
    }

    fn client(server: &MockServer) -> SsrClient {
        let fetch = FetchClient::new("SSR").unwrap().with_backoff(Duration::ZERO);
        SsrClient::with_url(fetch, server.url("/sok"))
    }

    #[test]
    fn locate_tries_name_parts_then_municipality() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(GET).path("/sok").query_param("navn", "Sponvika");
            then.status(200).json_body(json!({}));
        });
        let part = server.mock(|when, then| {
            when.method(GET).path("/sok").query_param("navn", "Tistedal").query_param("fylkeKommuneListe", "3001");
            then.status(200).json_body(json!({ "stedsnavn": { "nord": "59.13", "aust": "11.45", "navnetype": "Tettsted" } }));
        });

        let placement = client(&server).locate(&record("Sponvika/Tistedal")).unwrap();

        part.assert();
        assert_eq!(placement.quality, PlacementQuality::Exact);
        assert_eq!(placement.municipality.as_deref(), Some("Halden"));
        assert_eq!(placement.place_type.as_deref(), Some("Tettsted"));
    }

    #[test]
    fn locate_falls_back_to_municipality() {
        let server = MockServer::start();
        let municipality = server.mock(|when, then| {
            when.method(GET).path("/sok").query_param("navn", "Halden");
            then.status(200).json_body(json!({ "stedsnavn": { "nord": "59.12", "aust": "11.38", "navnetype": "By" } }));
        });
        server.mock(|when, then| {
            when.method(GET).path("/sok").query_param("navn", "Ukjent");
            then.status(200).json_body(json!({}));
        });

        let placement = client(&server).locate(&record("Ukjent")).unwrap();

        municipality.assert();
        assert_eq!(placement.quality, PlacementQuality::Municipality);
        assert!(placement.needs_check());
    }
}
