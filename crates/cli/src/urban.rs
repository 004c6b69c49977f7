// urban: yearly population of urban settlements (tettsteder)

use std::collections::BTreeMap;
use std::path::PathBuf;

use chrono::NaiveDate;

use popsync_io::settlement_table;
use popsync_recon::create::Placement;
use popsync_recon::{EntityKind, RunReport, SourceRecord, SourceSet};

use crate::fetch::ssb::SsbClient;
use crate::fetch::ssr::SsrClient;
use crate::profiles::{self, Profile};
use crate::run::{self, Console, Reference, RunArgs};
use crate::CliError;

/// Where the settlement table comes from.
pub(crate) enum TableSource {
    File(PathBuf),
    /// Export key of an SSB statistical table.
    Ssb(String),
}

pub(crate) fn cmd_urban(
    year: i32,
    table: TableSource,
    geocode: bool,
    args: RunArgs,
    overpass_url: &str,
) -> Result<(), CliError> {
    let config = profiles::load(Profile::Urban, args.config.as_deref())?;
    let console = Console::new(args.json);
    if config.level(EntityKind::Settlement).is_none() {
        return Err(CliError::config("profile has no settlement level"));
    }

    let record_date = NaiveDate::from_ymd_opt(year, 1, 1)
        .ok_or_else(|| CliError::usage(format!("invalid year {year}")))?;

    let records = match table {
        TableSource::File(path) => {
            console.line(format!("Loading urban settlements from {}...", path.display()));
            settlement_table::read(&path, record_date)?
        }
        TableSource::Ssb(key) => {
            console.line("Loading urban settlements from SSB...");
            let bytes = SsbClient::new()?.table(&key)?;
            settlement_table::parse(&settlement_table::decode(&bytes), record_date)?
        }
    };
    console.line(format!("  {} urban settlements per {record_date}", records.len()));

    let mut sources = BTreeMap::new();
    sources.insert(EntityKind::Settlement, SourceSet::from_records(records)?);

    let ssr = if geocode { Some(SsrClient::new()?) } else { None };
    let locate = |record: &SourceRecord| Ok(place(ssr.as_ref(), record));

    let reference = Reference::open(args.osm.as_deref(), overpass_url)?;
    let mut report = RunReport::new();
    let output = run::reconcile(&config, sources, &reference, locate, &console, &mut report)?;

    let out = profiles::output_path(&config, args.out, Some(year));
    run::finish(&config, &output, &out, &report, &console)
}

/// Position a new settlement. A failed lookup leaves it at the placeholder
/// for manual check; it never stops the run.
fn place(ssr: Option<&SsrClient>, record: &SourceRecord) -> Placement {
    let Some(ssr) = ssr else {
        return Placement::not_found();
    };
    match ssr.locate(record) {
        Ok(placement) => placement,
        Err(e) => {
            log::warn!("{} {}: place lookup failed: {}", record.id, record.name, e.message);
            Placement::not_found()
        }
    }
}
