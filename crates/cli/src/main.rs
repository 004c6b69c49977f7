// popsync - official population figures into OpenStreetMap change files
// See DESIGN.md for the reconciliation rules

mod exit_codes;
mod fetch;
mod norway;
mod profiles;
mod run;
mod sweden;
mod urban;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{ArgAction, ArgGroup, Parser, Subcommand};

use popsync_io::IoError;
use popsync_recon::ReconError;

use exit_codes::{EXIT_CONFIG, EXIT_INPUT, EXIT_IO, EXIT_SUCCESS, EXIT_USAGE};
use run::RunArgs;
use urban::TableSource;

const LONG_VERSION: &str = concat!(
    env!("CARGO_PKG_VERSION"),
    " (", env!("POPSYNC_COMMIT"), ")",
    "\nengine:  popsync-recon ", env!("CARGO_PKG_VERSION"),
    "\ntarget:  ", env!("POPSYNC_TARGET"),
);

#[derive(Parser)]
#[command(name = "popsync")]
#[command(about = "Update population tags in OpenStreetMap from official statistics")]
#[command(long_version = LONG_VERSION)]
#[command(version)]
struct Cli {
    /// Overpass API interpreter endpoint
    #[arg(
        long,
        global = true,
        env = "POPSYNC_OVERPASS_URL",
        default_value = fetch::overpass::OVERPASS_URL,
        value_name = "URL"
    )]
    overpass_url: String,

    /// More log output (-v info, -vv debug, -vvv trace). RUST_LOG overrides.
    #[arg(short, long, global = true, action = ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Norwegian country, counties and municipalities (SSB, quarterly)
    #[command(after_help = "\
Examples:
  popsync norway
  popsync norway --out Update_population.osm --json > report.json
  popsync norway --osm municipalities.osm -v")]
    Norway {
        #[command(flatten)]
        args: RunArgs,
    },

    /// Swedish country, counties and municipalities (SCB, yearly)
    #[command(after_help = "\
Examples:
  popsync sweden
  popsync sweden --config my-sweden.toml")]
    Sweden {
        #[command(flatten)]
        args: RunArgs,
    },

    /// Norwegian urban settlements (SSB settlement table); missing ones are created
    #[command(group(ArgGroup::new("table_source").required(true).args(["file", "table"])))]
    #[command(after_help = "\
Examples:
  popsync urban 2020 Tettsteder_2020.csv
  popsync urban 2020 --table 449421
  popsync urban 2020 Tettsteder_2020.csv --osm tettsted.osm --no-geocode")]
    Urban {
        /// Year of the statistics; population is dated 1 January of this year
        #[arg(value_parser = clap::value_parser!(i32).range(1900..=2999))]
        year: i32,

        /// Settlement table CSV exported from SSB
        file: Option<PathBuf>,

        /// Download the settlement table from SSB by export key
        #[arg(long, value_name = "KEY")]
        table: Option<String>,

        /// Do not look up locations for new settlements in SSR
        #[arg(long)]
        no_geocode: bool,

        #[command(flatten)]
        args: RunArgs,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let overpass_url = cli.overpass_url.as_str();
    let result = match cli.command {
        Commands::Norway { args } => norway::cmd_norway(args, overpass_url),
        Commands::Sweden { args } => sweden::cmd_sweden(args, overpass_url),
        Commands::Urban { year, file, table, no_geocode, args } => {
            match (file, table) {
                (Some(path), _) => urban::cmd_urban(year, TableSource::File(path), !no_geocode, args, overpass_url),
                (None, Some(key)) => urban::cmd_urban(year, TableSource::Ssb(key), !no_geocode, args, overpass_url),
                (None, None) => Err(CliError::usage("urban needs a settlement table FILE or --table KEY")),
            }
        }
    };

    match result {
        Ok(()) => ExitCode::from(EXIT_SUCCESS),
        Err(CliError { code, message, hint }) => {
            if !message.is_empty() {
                eprintln!("error: {}", message);
            }
            if let Some(hint) = hint {
                eprintln!("hint:  {}", hint);
            }
            ExitCode::from(code)
        }
    }
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .format_timestamp(None)
        .format_target(false)
        .init();
}

// ============================================================================
// Errors
// ============================================================================

#[derive(Debug)]
pub struct CliError {
    pub code: u8,
    pub message: String,
    pub hint: Option<String>,
}

impl CliError {
    pub fn usage(msg: impl Into<String>) -> Self {
        Self { code: EXIT_USAGE, message: msg.into(), hint: None }
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self { code: EXIT_CONFIG, message: msg.into(), hint: None }
    }

    pub fn input(msg: impl Into<String>) -> Self {
        Self { code: EXIT_INPUT, message: msg.into(), hint: None }
    }

    pub fn io(msg: impl Into<String>) -> Self {
        Self { code: EXIT_IO, message: msg.into(), hint: None }
    }

    /// Add a hint to an existing error.
    pub fn with_hint(mut self, hint: impl Into<String>) -> Self {
        self.hint = Some(hint.into());
        self
    }
}

impl From<ReconError> for CliError {
    fn from(e: ReconError) -> Self {
        match &e {
            ReconError::ConfigParse(_) | ReconError::ConfigValidation(_) => Self::config(e.to_string()),
            ReconError::DuplicateReference(_) => {
                Self::input(e.to_string()).with_hint("fix the duplicate tags in OSM and run again")
            }
            ReconError::DuplicateSource(_) | ReconError::InvalidId { .. } | ReconError::InvalidPopulation(_) => {
                Self::input(e.to_string())
            }
        }
    }
}

impl From<IoError> for CliError {
    fn from(e: IoError) -> Self {
        match e {
            IoError::Recon(e) => e.into(),
            e if e.is_input() => Self::input(e.to_string()),
            e => Self::io(e.to_string()),
        }
    }
}
