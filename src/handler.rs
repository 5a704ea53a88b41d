//! District summary request handling
//!
//! Validates the request, serves from cache when possible, and otherwise
//! fetches upstream rows, aggregates them and writes the result back to the
//! cache and the durable store. Both writes are best-effort: their failures
//! are logged and reported in [`PersistReport`] but never fail the request.

use serde::ser::{Serialize, SerializeStruct, Serializer};
use tracing::{debug, error, info, warn};

use crate::cache::{CacheError, CacheStore, SUMMARY_TTL};
use crate::data::{
    aggregate, DistrictRequest, MonthSummary, Query, RecordSource, StoredSummary, UpstreamError,
};
use crate::store::SummaryStore;

/// Result of a best-effort side effect
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriteStatus {
    Written,
    Failed(String),
}

impl WriteStatus {
    pub fn is_written(&self) -> bool {
        matches!(self, WriteStatus::Written)
    }
}

/// What happened to the cache and durable-store writes of a fresh result
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PersistReport {
    pub cache: WriteStatus,
    pub store: WriteStatus,
}

/// Outcome of one "get district summary" request
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    /// Served verbatim from the cache
    Cached { data: Vec<MonthSummary> },
    /// Fetched upstream and aggregated
    Computed {
        data: Vec<MonthSummary>,
        persisted: PersistReport,
    },
    /// Upstream returned no rows; `url` is the redacted request URL
    NotFound { url: String },
    /// District or state missing
    BadRequest,
    /// Any other failure, carrying only the failure's message
    ServerError { error: String },
}

impl Outcome {
    pub fn message(&self) -> &'static str {
        match self {
            Outcome::Cached { .. } => "Data fetched from cache",
            Outcome::Computed { .. } => "Data fetched and summarized successfully",
            Outcome::NotFound { .. } => "No data found for the given filters",
            Outcome::BadRequest => "Choose your district and state",
            Outcome::ServerError { .. } => "Server error",
        }
    }

    /// HTTP-style status code for the outcome
    pub fn status_code(&self) -> u16 {
        match self {
            Outcome::Cached { .. } | Outcome::Computed { .. } => 200,
            Outcome::NotFound { .. } => 404,
            Outcome::BadRequest => 400,
            Outcome::ServerError { .. } => 500,
        }
    }

    pub fn is_success(&self) -> bool {
        self.status_code() == 200
    }

    pub fn data(&self) -> Option<&[MonthSummary]> {
        match self {
            Outcome::Cached { data } | Outcome::Computed { data, .. } => Some(data),
            _ => None,
        }
    }

    pub fn data_mut(&mut self) -> Option<&mut Vec<MonthSummary>> {
        match self {
            Outcome::Cached { data } | Outcome::Computed { data, .. } => Some(data),
            _ => None,
        }
    }
}

impl Serialize for Outcome {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut payload = serializer.serialize_struct("Outcome", 3)?;
        payload.serialize_field("message", self.message())?;
        match self {
            Outcome::Cached { data } => {
                payload.serialize_field("source", "cache")?;
                payload.serialize_field("data", data)?;
            }
            Outcome::Computed { data, .. } => {
                payload.serialize_field("source", "upstream")?;
                payload.serialize_field("data", data)?;
            }
            Outcome::NotFound { url } => payload.serialize_field("url", url)?,
            Outcome::BadRequest => {}
            Outcome::ServerError { error } => payload.serialize_field("error", error)?,
        }
        payload.end()
    }
}

/// Serves district summaries from a cache, an upstream source and a store
pub struct DistrictService<S, C, D> {
    source: S,
    cache: C,
    store: D,
}

impl<S, C, D> DistrictService<S, C, D>
where
    S: RecordSource,
    C: CacheStore,
    D: SummaryStore,
{
    pub fn new(source: S, cache: C, store: D) -> Self {
        Self {
            source,
            cache,
            store,
        }
    }

    pub fn cache(&self) -> &C {
        &self.cache
    }

    pub fn store(&self) -> &D {
        &self.store
    }

    /// Handles one request; never fails, every fault becomes an [`Outcome`]
    pub async fn get_district_summary(&self, request: &DistrictRequest) -> Outcome {
        let query = match request.validate() {
            Ok(query) => query,
            Err(err) => {
                debug!(error = %err, "rejecting district request");
                return Outcome::BadRequest;
            }
        };

        match self.summarize(&query).await {
            Ok(outcome) => outcome,
            Err(err) => {
                error!(
                    state = query.state(),
                    district = query.district(),
                    error = %err,
                    "error fetching district data"
                );
                Outcome::ServerError {
                    error: err.to_string(),
                }
            }
        }
    }

    async fn summarize(&self, query: &Query) -> Result<Outcome, UpstreamError> {
        let key = query.cache_key();

        if let Some(data) = self.read_cache(&key) {
            info!(key = %key, months = data.len(), "serving district summary from cache");
            return Ok(Outcome::Cached { data });
        }

        let response = self.source.fetch(query).await?;
        if response.records.is_empty() {
            info!(key = %key, "upstream returned no rows");
            return Ok(Outcome::NotFound { url: response.url });
        }

        let data = aggregate(&response.records);
        info!(
            key = %key,
            rows = response.records.len(),
            months = data.len(),
            "aggregated upstream rows"
        );

        let persisted = self.persist(query, &key, &data);
        Ok(Outcome::Computed { data, persisted })
    }

    /// Looks up a cached summary list; any cache problem counts as a miss
    fn read_cache(&self, key: &str) -> Option<Vec<MonthSummary>> {
        let raw = match self.cache.get(key) {
            Ok(Some(raw)) => raw,
            Ok(None) => return None,
            Err(err) => {
                warn!(key, error = %err, "cache read failed, treating as miss");
                return None;
            }
        };

        match serde_json::from_str(&raw) {
            Ok(data) => Some(data),
            Err(err) => {
                warn!(key, error = %err, "cached value is not a summary list, treating as miss");
                None
            }
        }
    }

    fn persist(&self, query: &Query, key: &str, data: &[MonthSummary]) -> PersistReport {
        let cache = match serde_json::to_string(data)
            .map_err(CacheError::from)
            .and_then(|json| self.cache.set(key, &json, SUMMARY_TTL))
        {
            Ok(()) => WriteStatus::Written,
            Err(err) => {
                warn!(key, error = %err, "failed to cache district summary");
                WriteStatus::Failed(err.to_string())
            }
        };

        let record = StoredSummary::from_query(query, data.to_vec());
        let store = match self.store.create(&record) {
            Ok(()) => WriteStatus::Written,
            Err(err) => {
                error!(key, error = %err, "failed to store district summary");
                WriteStatus::Failed(err.to_string())
            }
        };

        PersistReport { cache, store }
    }
}
