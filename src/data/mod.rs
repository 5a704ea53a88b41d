//! Core data models for Gram Data
//!
//! This module contains the request, upstream-row and summary types shared by
//! the upstream client, the aggregator, the cache and the durable store.

pub mod aggregate;
pub mod months;
pub mod upstream;

pub use aggregate::aggregate;
pub use upstream::{RecordSource, UpstreamClient, UpstreamError, UpstreamResponse};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

/// Cache-key token used when no financial year is requested
pub const ANY_FIN_YEAR: &str = "all";

/// Errors raised while validating an inbound request
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    /// A required field was absent or blank
    #[error("missing required field: {0}")]
    MissingField(&'static str),
}

/// Inbound "get district summary" payload, as sent by the display layer
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DistrictRequest {
    pub district: Option<String>,
    #[serde(rename = "stateName")]
    pub state_name: Option<String>,
    pub fin_year: Option<String>,
}

impl DistrictRequest {
    pub fn new(state_name: &str, district: &str, fin_year: Option<&str>) -> Self {
        Self {
            district: Some(district.to_string()),
            state_name: Some(state_name.to_string()),
            fin_year: fin_year.map(str::to_string),
        }
    }

    /// Checks the required fields and produces a validated [`Query`]
    pub fn validate(&self) -> Result<Query, ValidationError> {
        let district = required(self.district.as_deref(), "district")?;
        let state = required(self.state_name.as_deref(), "stateName")?;
        let fin_year = self
            .fin_year
            .as_deref()
            .map(str::trim)
            .filter(|year| !year.is_empty())
            .map(str::to_string);

        Ok(Query {
            state,
            district,
            fin_year,
        })
    }
}

fn required(value: Option<&str>, field: &'static str) -> Result<String, ValidationError> {
    match value.map(str::trim) {
        Some(v) if !v.is_empty() => Ok(v.to_string()),
        _ => Err(ValidationError::MissingField(field)),
    }
}

/// A validated district query
///
/// State and district are guaranteed non-empty. The financial year is
/// optional; when absent it is left out of upstream filters and encoded as
/// [`ANY_FIN_YEAR`] in the cache key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Query {
    state: String,
    district: String,
    fin_year: Option<String>,
}

impl Query {
    pub fn state(&self) -> &str {
        &self.state
    }

    pub fn district(&self) -> &str {
        &self.district
    }

    pub fn fin_year(&self) -> Option<&str> {
        self.fin_year.as_deref()
    }

    /// Cache key in the form `{state}_{district}_{fin_year}`
    pub fn cache_key(&self) -> String {
        format!(
            "{}_{}_{}",
            self.state,
            self.district,
            self.fin_year().unwrap_or(ANY_FIN_YEAR)
        )
    }
}

/// One upstream row with no guaranteed schema
///
/// Field names and value types vary between upstream releases, so fields are
/// looked up by name and read defensively by the aggregator.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RawRecord(Map<String, Value>);

impl RawRecord {
    /// Returns the raw value of a field, if present
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.0.get(field)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<Map<String, Value>> for RawRecord {
    fn from(fields: Map<String, Value>) -> Self {
        Self(fields)
    }
}

/// Aggregated figures for one month of a district's data
///
/// Serialized field names follow the upstream naming the display layer reads.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonthSummary {
    /// Month label exactly as it appeared upstream
    pub month: String,
    /// Sum of expenditure, rendered with two decimals
    #[serde(rename = "tot_exp")]
    pub total_expenditure: String,
    #[serde(rename = "Approved_Labour_Budget")]
    pub approved_labour_budget: f64,
    #[serde(rename = "Average_Wage_rate_per_day_per_person")]
    pub average_wage_rate: f64,
    pub total_households_worked: i64,
    /// Mean percentage of payments generated within 15 days, two decimals
    pub avg_payment_within_15_days: String,
}

/// Payload of a durable-store row
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "rows", rename_all = "snake_case")]
pub enum StoredData {
    /// Aggregated months written on a cache-miss fetch
    Summaries(Vec<MonthSummary>),
    /// Unaggregated upstream rows written by the refresh job
    Raw(Vec<RawRecord>),
}

impl StoredData {
    pub fn len(&self) -> usize {
        match self {
            StoredData::Summaries(rows) => rows.len(),
            StoredData::Raw(rows) => rows.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// A durable record of one district's data
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredSummary {
    pub state_name: String,
    pub district_name: String,
    pub fin_year: Option<String>,
    pub data: StoredData,
    pub stored_at: DateTime<Utc>,
}

impl StoredSummary {
    /// Builds the row persisted after a cache-miss fetch
    pub fn from_query(query: &Query, summaries: Vec<MonthSummary>) -> Self {
        Self {
            state_name: query.state().to_string(),
            district_name: query.district().to_string(),
            fin_year: query.fin_year().map(str::to_string),
            data: StoredData::Summaries(summaries),
            stored_at: Utc::now(),
        }
    }
}
