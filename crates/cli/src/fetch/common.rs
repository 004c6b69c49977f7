//! Shared infrastructure for the fetch adapters.
//!
//! Every adapter (ssb, scb, overpass, ssr) goes through [`FetchClient`]:
//!
//! - HTTP 429, 503 and 504 and connection/timeout errors are retried with
//!   exponential backoff (5 s, 10 s, 20 s, ...) up to [`MAX_ATTEMPTS`].
//! - Any other non-success status, and any other request error, fails immediately.
//! - A body is returned complete or not at all.

use std::thread;
use std::time::Duration;

use crate::exit_codes;
use crate::CliError;

// ── Constants ───────────────────────────────────────────────────────

pub(crate) const MAX_ATTEMPTS: u32 = 5;
pub(crate) const USER_AGENT: &str = concat!("popsync/", env!("CARGO_PKG_VERSION"));

const DEFAULT_BACKOFF: Duration = Duration::from_secs(5);
// Overpass queries over a whole country can run for minutes.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(300);

const RETRYABLE: [u16; 3] = [429, 503, 504];

// ── FetchClient ─────────────────────────────────────────────────────

pub(crate) struct FetchClient {
    http: reqwest::blocking::Client,
    source_name: String,
    backoff: Duration,
}

impl FetchClient {
    pub(crate) fn new(source_name: &str) -> Result<Self, CliError> {
        let http = reqwest::blocking::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| CliError {
                code: exit_codes::EXIT_FETCH_UPSTREAM,
                message: format!("failed to build HTTP client: {e}"),
                hint: None,
            })?;

        Ok(Self {
            http,
            source_name: source_name.to_string(),
            backoff: DEFAULT_BACKOFF,
        })
    }

    /// Base delay before the first retry; doubled per attempt.
    #[cfg(test)]
    pub(crate) fn with_backoff(mut self, backoff: Duration) -> Self {
        self.backoff = backoff;
        self
    }

    /// GET `url` with `query` parameters and return the raw body.
    pub(crate) fn get_bytes(&self, url: &str, query: &[(&str, &str)]) -> Result<Vec<u8>, CliError> {
        self.request_with_retry(|http| http.get(url).query(query))
    }

    /// GET `url` with `query` parameters and return the body as UTF-8 text.
    pub(crate) fn get_text(&self, url: &str, query: &[(&str, &str)]) -> Result<String, CliError> {
        let bytes = self.get_bytes(url, query)?;
        String::from_utf8(bytes).map_err(|e| self.malformed(format!("body is not UTF-8: {e}")))
    }

    /// GET `url` with `query` parameters and parse the body as JSON.
    pub(crate) fn get_json(
        &self,
        url: &str,
        query: &[(&str, &str)],
    ) -> Result<serde_json::Value, CliError> {
        let text = self.get_text(url, query)?;
        let trimmed = text.trim_start_matches('\u{feff}');
        serde_json::from_str(trimmed).map_err(|e| {
            self.malformed(format!(
                "invalid JSON: {e} (body: {})",
                trimmed.chars().take(200).collect::<String>()
            ))
        })
    }

    /// Error for a response that arrived but has the wrong shape.
    pub(crate) fn malformed(&self, detail: impl std::fmt::Display) -> CliError {
        CliError {
            code: exit_codes::EXIT_FETCH_MALFORMED,
            message: format!("{} response malformed: {detail}", self.source_name),
            hint: None,
        }
    }

    /// Send a request with retry + exponential backoff.
    ///
    /// `build_request` is called once per attempt.
    fn request_with_retry(
        &self,
        build_request: impl Fn(&reqwest::blocking::Client) -> reqwest::blocking::RequestBuilder,
    ) -> Result<Vec<u8>, CliError> {
        let mut wait = self.backoff;

        for attempt in 1..=MAX_ATTEMPTS {
            let failure = match build_request(&self.http).send() {
                Ok(resp) => {
                    let status = resp.status().as_u16();

                    if resp.status().is_success() {
                        return resp.bytes().map(|b| b.to_vec()).map_err(|e| CliError {
                            code: exit_codes::EXIT_FETCH_UPSTREAM,
                            message: format!(
                                "failed to read {} response body: {e}",
                                self.source_name
                            ),
                            hint: None,
                        });
                    }

                    if !RETRYABLE.contains(&status) {
                        let url = resp.url().to_string();
                        return Err(CliError {
                            code: exit_codes::EXIT_FETCH_UPSTREAM,
                            message: format!("{} error (HTTP {status})", self.source_name),
                            hint: Some(url),
                        });
                    }

                    if attempt == MAX_ATTEMPTS {
                        let (code, what) = if status == 429 {
                            (exit_codes::EXIT_FETCH_RATE_LIMIT, "rate limited")
                        } else {
                            (exit_codes::EXIT_FETCH_UPSTREAM, "upstream error")
                        };
                        return Err(CliError {
                            code,
                            message: format!(
                                "{} {what} after {MAX_ATTEMPTS} attempts (HTTP {status})",
                                self.source_name
                            ),
                            hint: Some("try again later".into()),
                        });
                    }

                    format!("HTTP {status}")
                }
                Err(e) if !(e.is_connect() || e.is_timeout()) => {
                    return Err(CliError {
                        code: exit_codes::EXIT_FETCH_UPSTREAM,
                        message: format!("{} request failed: {e}", self.source_name),
                        hint: None,
                    });
                }
                Err(e) => {
                    if attempt == MAX_ATTEMPTS {
                        return Err(CliError {
                            code: exit_codes::EXIT_FETCH_UPSTREAM,
                            message: format!(
                                "{} upstream error after {MAX_ATTEMPTS} attempts: {e}",
                                self.source_name
                            ),
                            hint: None,
                        });
                    }
                    e.to_string()
                }
            };

            log::warn!(
                "{}: retry {attempt}/{} in {}s ({failure})",
                self.source_name,
                MAX_ATTEMPTS - 1,
                wait.as_secs(),
            );
            thread::sleep(wait);
            wait *= 2;
        }

        Err(CliError {
            code: exit_codes::EXIT_FETCH_UPSTREAM,
            message: format!("{} request was never sent", self.source_name),
            hint: None,
        })
    }
}
