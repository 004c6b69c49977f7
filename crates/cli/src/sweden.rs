// sweden: yearly population of the country, counties and municipalities

use popsync_recon::RunReport;

use crate::fetch::scb::ScbClient;
use crate::profiles::{self, Profile};
use crate::run::{self, Console, Reference, RunArgs};
use crate::CliError;

pub(crate) fn cmd_sweden(args: RunArgs, overpass_url: &str) -> Result<(), CliError> {
    let config = profiles::load(Profile::Sweden, args.config.as_deref())?;
    let console = Console::new(args.json);

    console.line("Loading population from SCB...");
    let records = ScbClient::new()?.population()?;
    if let Some(country) = records.first() {
        console.line(format!("  {} {} per {}", country.name, country.population, country.record_date));
    }

    // Counties and the country are derived from municipality rows; levels
    // left out of the profile are dropped.
    let mut sources = run::group_by_kind(records)?;
    sources.retain(|kind, _| config.level(*kind).is_some());

    let reference = Reference::open(args.osm.as_deref(), overpass_url)?;
    let mut report = RunReport::new();
    let output = run::reconcile(&config, sources, &reference, run::no_location, &console, &mut report)?;

    let out = profiles::output_path(&config, args.out, None);
    run::finish(&config, &output, &out, &report, &console)
}
