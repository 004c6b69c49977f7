use std::fmt;
use std::path::PathBuf;

use popsync_recon::ReconError;

#[derive(Debug)]
pub enum IoError {
    Read { path: PathBuf, message: String },
    Write { path: PathBuf, message: String },
    /// Not well-formed XML.
    Xml(String),
    /// Well-formed, but not an OSM document we can work with.
    Structure(String),
    /// Bad row in a settlement table. `row` is 1-based and counts the header rows.
    Table { row: usize, message: String },
    Recon(ReconError),
}

impl IoError {
    /// True for errors caused by the content of an input rather than the filesystem.
    pub fn is_input(&self) -> bool {
        !matches!(self, Self::Read { .. } | Self::Write { .. })
    }
}

impl fmt::Display for IoError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Read { path, message } => write!(f, "cannot read {}: {message}", path.display()),
            Self::Write { path, message } => write!(f, "cannot write {}: {message}", path.display()),
            Self::Xml(msg) => write!(f, "malformed OSM XML: {msg}"),
            Self::Structure(msg) => write!(f, "unexpected OSM document structure: {msg}"),
            Self::Table { row, message } => write!(f, "settlement table row {row}: {message}"),
            Self::Recon(e) => write!(f, "{e}"),
        }
    }
}

impl std::error::Error for IoError {}

impl From<ReconError> for IoError {
    fn from(e: ReconError) -> Self {
        Self::Recon(e)
    }
}
