//! Adapters for the external data sources: statistics agencies (SSB, SCB),
//! the Overpass API and the SSR place-name register.

pub(crate) mod common;
pub(crate) mod overpass;
pub(crate) mod scb;
pub(crate) mod ssb;
pub(crate) mod ssr;
