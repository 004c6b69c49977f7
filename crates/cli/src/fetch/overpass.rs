//! Overpass API adapter: runs an Overpass QL query and returns the OSM document.

use url::Url;

use popsync_io::Document;

use super::common::FetchClient;
use crate::CliError;

pub(crate) const OVERPASS_URL: &str = "https://overpass-api.de/api/interpreter";

pub(crate) struct OverpassClient {
    fetch: FetchClient,
    endpoint: Url,
}

impl OverpassClient {
    pub(crate) fn new(endpoint: &str) -> Result<Self, CliError> {
        Ok(Self::with_fetch(FetchClient::new("Overpass")?, parse_endpoint(endpoint)?))
    }

    pub(crate) fn with_fetch(fetch: FetchClient, endpoint: Url) -> Self {
        Self { fetch, endpoint }
    }

    /// Run `query` and parse the XML response.
    pub(crate) fn query(&self, query: &str) -> Result<Document, CliError> {
        log::debug!("overpass query: {query}");
        let xml = self.fetch.get_text(self.endpoint.as_str(), &[("data", query)])?;
        Document::parse(&xml).map_err(|e| self.fetch.malformed(e))
    }
}

/// Validate an interpreter URL given on the command line.
pub(crate) fn parse_endpoint(endpoint: &str) -> Result<Url, CliError> {
    let url = Url::parse(endpoint)
        .map_err(|e| CliError::usage(format!("invalid Overpass URL '{endpoint}': {e}")))?;
    match url.scheme() {
        "http" | "https" => Ok(url),
        other => Err(CliError::usage(format!(
            "invalid Overpass URL '{endpoint}': unsupported scheme '{other}'"
        ))),
    }
}
