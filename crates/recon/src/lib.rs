//! `popsync-recon`: population reconciliation engine.
//!
//! Pure engine crate: receives pre-loaded source records and reference
//! features, returns the partition, mutated features and a run report.
//! No CLI or IO dependencies.

pub mod config;
pub mod create;
pub mod engine;
pub mod error;
pub mod id;
pub mod matcher;
pub mod model;
pub mod reconcile;
pub mod report;
pub mod split;

pub use config::ReconConfig;
pub use engine::{prepare_source, run_level, LevelOutcome};
pub use error::ReconError;
pub use id::{EntityId, EntityKind};
pub use model::{Population, ReferenceFeature, SourceRecord, SourceSet, Tags};
pub use report::{RunReport, Warning};
