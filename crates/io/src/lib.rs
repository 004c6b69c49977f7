// File I/O: OSM XML documents and settlement tables

pub mod error;
pub mod osm;
pub mod settlement_table;

pub use error::IoError;
pub use osm::Document;
