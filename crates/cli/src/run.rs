// Shared run pipeline: per-level reconcile against OSM, then one output file

use std::collections::BTreeMap;
use std::fmt::Display;
use std::path::{Path, PathBuf};

use clap::Args;
use serde::Serialize;

use popsync_io::osm::FIRST_NEW_NODE_ID;
use popsync_io::Document;
use popsync_recon::config::LevelConfig;
use popsync_recon::create::Placement;
use popsync_recon::report::LevelSummary;
use popsync_recon::{prepare_source, run_level, EntityKind, ReconConfig, RunReport, SourceRecord, SourceSet, Warning};

use crate::exit_codes::EXIT_ERROR;
use crate::fetch::overpass::OverpassClient;
use crate::CliError;

const GENERATOR: &str = concat!("popsync v", env!("CARGO_PKG_VERSION"));

/// Options every update command takes.
#[derive(Args, Debug, Clone, Default)]
pub(crate) struct RunArgs {
    /// Profile TOML replacing the built-in one
    #[arg(long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Read OSM data from this file instead of querying Overpass
    #[arg(long, value_name = "FILE")]
    pub osm: Option<PathBuf>,

    /// Output file (default: the profile's output name)
    #[arg(long, short = 'o', value_name = "FILE")]
    pub out: Option<PathBuf>,

    /// Print the run report as JSON on stdout
    #[arg(long)]
    pub json: bool,
}

// ============================================================================
// Console
// ============================================================================

/// Progress and summary lines go to stdout, or stderr when stdout carries JSON.
pub(crate) struct Console {
    json: bool,
}

impl Console {
    pub(crate) fn new(json: bool) -> Self {
        Self { json }
    }

    pub(crate) fn line(&self, msg: impl Display) {
        if self.json {
            eprintln!("{msg}");
        } else {
            println!("{msg}");
        }
    }
}

// ============================================================================
// Reference data
// ============================================================================

pub(crate) enum Reference {
    Overpass(OverpassClient),
    /// A local file; every level reads its own copy.
    File(Document),
}

impl Reference {
    pub(crate) fn open(osm: Option<&Path>, overpass_url: &str) -> Result<Self, CliError> {
        match osm {
            Some(path) => {
                let doc = Document::read(path)?;
                log::info!("{} elements in {}", doc.elements.len(), path.display());
                Ok(Self::File(doc))
            }
            None => Ok(Self::Overpass(OverpassClient::new(overpass_url)?)),
        }
    }

    fn document(&self, level: &LevelConfig) -> Result<Document, CliError> {
        match self {
            Self::File(doc) => Ok(doc.clone()),
            Self::Overpass(client) => {
                let query = level.query.as_deref().ok_or_else(|| {
                    CliError::config(format!("{} level has no Overpass query", level.kind))
                        .with_hint("add `query` to the level or pass --osm FILE")
                })?;
                client.query(query)
            }
        }
    }
}

// ============================================================================
// Pipeline
// ============================================================================

/// Group records by the kind of their id.
pub(crate) fn group_by_kind(records: Vec<SourceRecord>) -> Result<BTreeMap<EntityKind, SourceSet>, CliError> {
    let mut sets: BTreeMap<EntityKind, SourceSet> = BTreeMap::new();
    for record in records {
        sets.entry(record.id.kind()).or_default().insert(record)?;
    }
    Ok(sets)
}

/// Locator for levels that never create features.
pub(crate) fn no_location(_: &SourceRecord) -> Result<Placement, CliError> {
    Ok(Placement::not_found())
}

/// Reconcile every configured level and collect the edited elements.
///
/// Nothing is written here, so an error at any level leaves no output behind.
pub(crate) fn reconcile<F>(
    config: &ReconConfig,
    mut sources: BTreeMap<EntityKind, SourceSet>,
    reference: &Reference,
    mut locate: F,
    console: &Console,
    report: &mut RunReport,
) -> Result<Document, CliError>
where
    F: FnMut(&SourceRecord) -> Result<Placement, CliError>,
{
    let mut output = Document::default();
    let mut next_id = FIRST_NEW_NODE_ID;

    for level in &config.levels {
        let source = sources.remove(&level.kind).ok_or_else(|| {
            CliError::config(format!("no source data for the {} level", level.kind))
        })?;
        let source = prepare_source(config, level, source, report)?;

        console.line(format!("Loading {} from OSM...", level.kind.plural()));
        let mut doc = reference.document(level)?;
        let mut features = doc.features(level, report);

        let outcome = run_level(level, &config.tags, &source, &mut features, report, &mut locate)?;
        let touched = doc.apply(&features);
        doc.add_nodes(&outcome.created, &mut next_id);
        log::debug!("{}: {touched} element(s) rewritten", level.kind);

        if let Some(summary) = report.level(level.kind) {
            print_level(console, summary);
        }
        output.merge(doc);
    }

    Ok(output)
}

fn print_level(console: &Console, s: &LevelSummary) {
    let plural = s.kind.plural();
    let title = format!("{}{}", plural[..1].to_uppercase(), &plural[1..]);

    console.line(format!("{title}: {} in source, {} in OSM", s.source_records, s.reference_features));
    console.line(format!("  already correct: {}", s.already_correct));
    console.line(format!("  updated:         {}", s.updated));
    if s.created > 0 {
        console.line(format!("  new:             {}", s.created));
    }
    if s.stale > 0 {
        console.line(format!("  not in source:   {}", s.stale));
    }
    if s.missing > 0 {
        console.line(format!("  not in OSM:      {}", s.missing));
    }
    if s.needs_check > 0 {
        console.line(format!("  check location:  {}", s.needs_check));
    }
}

// ============================================================================
// Output
// ============================================================================

#[derive(Serialize)]
struct JsonReport<'a> {
    profile: &'a str,
    output: String,
    modified: usize,
    levels: &'a [LevelSummary],
    warnings: &'a [Warning],
}

/// Write the output document, then the summary (or JSON report).
pub(crate) fn finish(
    config: &ReconConfig,
    output: &Document,
    out: &Path,
    report: &RunReport,
    console: &Console,
) -> Result<(), CliError> {
    output.save(GENERATOR, out)?;
    let modified = output.modified_count();

    if !report.warnings.is_empty() {
        console.line(format!("{} warning(s), see log above", report.warnings.len()));
    }
    console.line(format!("Saved '{}' ({modified} modified element(s))", out.display()));

    if console.json {
        let json = JsonReport {
            profile: &config.name,
            output: out.display().to_string(),
            modified,
            levels: &report.levels,
            warnings: &report.warnings,
        };
        let text = serde_json::to_string_pretty(&json)
            .map_err(|e| CliError { code: EXIT_ERROR, message: format!("cannot encode report: {e}"), hint: None })?;
        println!("{text}");
    }
    Ok(())
}
