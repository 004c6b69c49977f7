// norway: quarterly population of the country, counties and municipalities

use std::collections::BTreeMap;

use popsync_recon::{RunReport, SourceSet};

use crate::fetch::ssb::{self, SsbClient};
use crate::profiles::{self, Profile};
use crate::run::{self, Console, Reference, RunArgs};
use crate::CliError;

pub(crate) fn cmd_norway(args: RunArgs, overpass_url: &str) -> Result<(), CliError> {
    let config = profiles::load(Profile::Norway, args.config.as_deref())?;
    let console = Console::new(args.json);

    console.line("Loading population from SSB...");
    let ssb = SsbClient::new()?;
    let mut sources = BTreeMap::new();
    for level in &config.levels {
        let dataset = ssb::dataset_for(level.kind).ok_or_else(|| {
            CliError::config(format!("SSB has no population dataset for the {} level", level.kind))
        })?;
        let records = ssb.population(dataset, level.kind)?;
        if let Some(first) = records.first() {
            console.line(format!("  {} {} per {}", records.len(), level.kind.plural(), first.record_date));
        }
        sources.insert(level.kind, SourceSet::from_records(records)?);
    }

    let reference = Reference::open(args.osm.as_deref(), overpass_url)?;
    let mut report = RunReport::new();
    let output = run::reconcile(&config, sources, &reference, run::no_location, &console, &mut report)?;

    let out = profiles::output_path(&config, args.out, None);
    run::finish(&config, &output, &out, &report, &console)
}
