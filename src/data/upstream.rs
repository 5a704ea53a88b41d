//! Open-data API client for the employment guarantee scheme dataset
//!
//! Builds filtered query URLs against the data.gov.in resource and parses the
//! raw `records` list out of the response.

use std::sync::Arc;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, USER_AGENT};
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use thiserror::Error;
use tracing::debug;

use super::{Query, RawRecord};

/// Resource endpoint of the district-wise monthly dataset
pub const DEFAULT_BASE_URL: &str =
    "https://api.data.gov.in/resource/ee03643a-ee4c-48c2-ac30-9f2ff26ab722";

/// Row limit for a single district summary request
pub const SUMMARY_ROW_LIMIT: u32 = 1500;

/// Row limit for a whole-state refresh request
pub const REFRESH_ROW_LIMIT: u32 = 1000;

/// Upstream rejects requests that do not look like a browser
const BROWSER_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64)";

/// Stand-in for the api key in URLs that leave this process
const REDACTED: &str = "REDACTED";

/// Errors that can occur when fetching upstream records
#[derive(Debug, Error)]
pub enum UpstreamError {
    /// HTTP request failed
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// Upstream answered with a non-success status
    #[error("upstream returned {status} for {url}")]
    Status { status: StatusCode, url: String },

    /// Failed to parse the response body
    #[error("failed to parse upstream response: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Records returned for one upstream request
#[derive(Debug, Clone, Default)]
pub struct UpstreamResponse {
    /// The request URL with the api key redacted, for diagnostics
    pub url: String,
    pub records: Vec<RawRecord>,
}

/// A source of raw upstream rows
#[async_trait]
pub trait RecordSource: Send + Sync {
    /// Fetches rows for one district, filtered by financial year when given
    async fn fetch(&self, query: &Query) -> Result<UpstreamResponse, UpstreamError>;

    /// Fetches rows for a whole state, used by the refresh job
    async fn fetch_state(&self, state: &str) -> Result<UpstreamResponse, UpstreamError>;
}

#[async_trait]
impl<T: RecordSource + ?Sized> RecordSource for Arc<T> {
    async fn fetch(&self, query: &Query) -> Result<UpstreamResponse, UpstreamError> {
        (**self).fetch(query).await
    }

    async fn fetch_state(&self, state: &str) -> Result<UpstreamResponse, UpstreamError> {
        (**self).fetch_state(state).await
    }
}

/// Response body from the open-data API
#[derive(Debug, Deserialize)]
struct ApiResponse {
    #[serde(default)]
    records: Option<Vec<RawRecord>>,
}

/// Client for the open-data API
#[derive(Debug, Clone)]
pub struct UpstreamClient {
    http_client: Client,
    api_key: String,
    base_url: String,
}

impl UpstreamClient {
    /// Creates a client that sends the browser-like headers upstream requires
    pub fn new(api_key: impl Into<String>) -> Result<Self, UpstreamError> {
        let mut headers = HeaderMap::new();
        headers.insert(USER_AGENT, HeaderValue::from_static(BROWSER_USER_AGENT));
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));

        let http_client = Client::builder().default_headers(headers).build()?;

        Ok(Self {
            http_client,
            api_key: api_key.into(),
            base_url: DEFAULT_BASE_URL.to_string(),
        })
    }

    /// Points the client at a different endpoint
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('?').to_string();
        self
    }

    /// URL for a district query
    ///
    /// State and district are upper-cased to match upstream values; the
    /// financial year is passed through as-is and omitted when absent.
    pub fn summary_url(&self, query: &Query) -> String {
        let state = query.state().to_uppercase();
        let district = query.district().to_uppercase();

        let mut filters = vec![("state_name", state.as_str())];
        if let Some(fin_year) = query.fin_year() {
            filters.push(("fin_year", fin_year));
        }
        filters.push(("district_name", district.as_str()));

        self.build_url(&filters, SUMMARY_ROW_LIMIT)
    }

    /// URL for a whole-state refresh; the state name is passed as-is
    pub fn state_url(&self, state: &str) -> String {
        self.build_url(&[("state_name", state)], REFRESH_ROW_LIMIT)
    }

    fn build_url(&self, filters: &[(&str, &str)], limit: u32) -> String {
        let mut params = vec![
            format!("api-key={}", urlencoded(&self.api_key)),
            "format=json".to_string(),
            format!("limit={}", limit),
        ];
        params.extend(
            filters
                .iter()
                .map(|(name, value)| format!("filters[{}]={}", name, urlencoded(value))),
        );

        format!("{}?{}", self.base_url, params.join("&"))
    }

    /// Replaces the api key in a URL built by this client
    fn redact(&self, url: &str) -> String {
        if self.api_key.is_empty() {
            return url.to_string();
        }
        url.replace(
            &format!("api-key={}", urlencoded(&self.api_key)),
            &format!("api-key={}", REDACTED),
        )
    }

    async fn get_records(&self, url: &str) -> Result<UpstreamResponse, UpstreamError> {
        let redacted = self.redact(url);
        debug!(url = %redacted, "requesting upstream records");

        let response = self
            .http_client
            .get(url)
            .send()
            .await
            .map_err(without_url)?;
        let status = response.status();
        if !status.is_success() {
            return Err(UpstreamError::Status {
                status,
                url: redacted,
            });
        }

        let text = response.text().await.map_err(without_url)?;
        let records = parse_records(&text)?;
        debug!(url = %redacted, rows = records.len(), "upstream records received");

        Ok(UpstreamResponse {
            url: redacted,
            records,
        })
    }
}

#[async_trait]
impl RecordSource for UpstreamClient {
    async fn fetch(&self, query: &Query) -> Result<UpstreamResponse, UpstreamError> {
        let url = self.summary_url(query);
        self.get_records(&url).await
    }

    async fn fetch_state(&self, state: &str) -> Result<UpstreamResponse, UpstreamError> {
        let url = self.state_url(state);
        self.get_records(&url).await
    }
}

/// Drops the request URL from a transport error, since it carries the api key
fn without_url(err: reqwest::Error) -> UpstreamError {
    UpstreamError::Http(err.without_url())
}

/// Extracts the `records` list; a missing or null list is an empty result
fn parse_records(body: &str) -> Result<Vec<RawRecord>, UpstreamError> {
    let response: ApiResponse = serde_json::from_str(body)?;
    Ok(response.records.unwrap_or_default())
}

/// Percent-encodes a query component, leaving the unreserved set untouched
fn urlencoded(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for byte in s.bytes() {
        match byte {
            b'A'..=b'Z'
            | b'a'..=b'z'
            | b'0'..=b'9'
            | b'-'
            | b'_'
            | b'.'
            | b'!'
            | b'~'
            | b'*'
            | b'\''
            | b'('
            | b')' => out.push(byte as char),
            _ => out.push_str(&format!("%{:02X}", byte)),
        }
    }
    out
}
