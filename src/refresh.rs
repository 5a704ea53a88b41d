//! Background data refresh
//!
//! Periodically re-fetches raw upstream rows for every state that already has
//! a stored row and overwrites that row's payload with them. This path stores
//! raw rows and bypasses aggregation. Progress is reported to the caller over
//! a tokio channel.

use std::sync::Arc;
use std::time::Duration;

use futures::stream::{self, StreamExt};
use tokio::sync::mpsc;
use tracing::{error, info, warn};

use crate::data::{RecordSource, StoredData};
use crate::store::SummaryStore;

/// States covered by the refresh job
pub const STATES: [&str; 28] = [
    "Andhra Pradesh",
    "Arunachal Pradesh",
    "Assam",
    "Bihar",
    "Chhattisgarh",
    "Goa",
    "Gujarat",
    "Haryana",
    "Himachal Pradesh",
    "Jharkhand",
    "Karnataka",
    "Kerala",
    "Madhya Pradesh",
    "Maharashtra",
    "Manipur",
    "Meghalaya",
    "Mizoram",
    "Nagaland",
    "Odisha",
    "Punjab",
    "Rajasthan",
    "Sikkim",
    "Tamil Nadu",
    "Telangana",
    "Tripura",
    "Uttar Pradesh",
    "Uttarakhand",
    "West Bengal",
];

/// Messages sent from background refresh to the caller
#[derive(Debug, Clone)]
pub enum RefreshMessage {
    /// A refresh pass started
    RefreshStarted,
    /// A state's stored row was overwritten with fresh raw rows
    StateUpdated { state: String, rows: usize },
    /// A state could not be refreshed
    RefreshError { state: String, error: String },
    /// A refresh pass finished
    RefreshCompleted(RefreshSummary),
}

/// Result of one refresh pass
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RefreshSummary {
    /// States whose stored row was overwritten
    pub updated: Vec<String>,
    /// States with no stored row, left alone
    pub skipped: Vec<String>,
    /// States that failed, with the failure message
    pub failed: Vec<(String, String)>,
}

/// Configuration for the refresh job
#[derive(Debug, Clone)]
pub struct RefreshConfig {
    /// Interval between refresh passes
    pub interval: Duration,
    /// Maximum number of concurrent upstream requests in one pass
    pub concurrency: usize,
    /// States to consider
    pub states: Vec<String>,
}

impl Default for RefreshConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(24 * 3600), // daily
            concurrency: 4,
            states: STATES.iter().map(|s| s.to_string()).collect(),
        }
    }
}

/// Runs one refresh pass over `states`
///
/// Per-state failures are logged and collected in the summary; they never
/// abort the pass.
pub async fn refresh_states<S, D>(
    source: &S,
    store: &D,
    states: &[String],
    concurrency: usize,
) -> RefreshSummary
where
    S: RecordSource + ?Sized,
    D: SummaryStore + ?Sized,
{
    let mut summary = RefreshSummary::default();

    let mut targets = Vec::new();
    for state in states {
        match store.find_by_state(state) {
            Ok(Some(_)) => targets.push(state.clone()),
            Ok(None) => summary.skipped.push(state.clone()),
            Err(err) => {
                error!(state = %state, error = %err, "failed to look up stored state");
                summary.failed.push((state.clone(), err.to_string()));
            }
        }
    }

    let fetched: Vec<_> = stream::iter(targets)
        .map(|state| async move {
            let result = source.fetch_state(&state).await;
            (state, result)
        })
        .buffer_unordered(concurrency.max(1))
        .collect()
        .await;

    for (state, result) in fetched {
        let response = match result {
            Ok(response) => response,
            Err(err) => {
                error!(state = %state, error = %err, "error updating state data");
                summary.failed.push((state, err.to_string()));
                continue;
            }
        };

        if response.records.is_empty() {
            warn!(state = %state, "upstream returned no rows, clearing stored data");
        }

        let rows = response.records.len();
        match store.replace_state_data(&state, StoredData::Raw(response.records)) {
            Ok(true) => {
                info!(state = %state, rows, "updated stored state data");
                summary.updated.push(state);
            }
            Ok(false) => summary.skipped.push(state),
            Err(err) => {
                error!(state = %state, error = %err, "failed to store refreshed state data");
                summary.failed.push((state, err.to_string()));
            }
        }
    }

    summary
}

/// Handle for controlling the background refresh system
pub struct RefreshHandle {
    /// Channel for receiving refresh messages
    pub receiver: mpsc::Receiver<RefreshMessage>,
    /// Flag to signal shutdown
    shutdown_tx: mpsc::Sender<()>,
}

impl RefreshHandle {
    /// Creates a new RefreshHandle and spawns the background refresh task
    ///
    /// The first pass runs immediately, then once per `config.interval`.
    pub fn spawn<S, D>(config: RefreshConfig, source: Arc<S>, store: Arc<D>) -> Self
    where
        S: RecordSource + 'static,
        D: SummaryStore + 'static,
    {
        let (msg_tx, msg_rx) = mpsc::channel(32);
        let (shutdown_tx, mut shutdown_rx) = mpsc::channel::<()>(1);

        tokio::spawn(async move {
            let mut interval = tokio::time::interval(config.interval);

            loop {
                tokio::select! {
                    _ = interval.tick() => {
                        let _ = msg_tx.send(RefreshMessage::RefreshStarted).await;

                        let summary = refresh_states(
                            source.as_ref(),
                            store.as_ref(),
                            &config.states,
                            config.concurrency,
                        )
                        .await;

                        for state in &summary.updated {
                            let rows = match store.find_by_state(state) {
                                Ok(Some(row)) => row.data.len(),
                                _ => 0,
                            };
                            let _ = msg_tx
                                .send(RefreshMessage::StateUpdated {
                                    state: state.clone(),
                                    rows,
                                })
                                .await;
                        }
                        for (state, error) in &summary.failed {
                            let _ = msg_tx
                                .send(RefreshMessage::RefreshError {
                                    state: state.clone(),
                                    error: error.clone(),
                                })
                                .await;
                        }

                        let _ = msg_tx.send(RefreshMessage::RefreshCompleted(summary)).await;
                    }
                    _ = shutdown_rx.recv() => {
                        break;
                    }
                }
            }
        });

        Self {
            receiver: msg_rx,
            shutdown_tx,
        }
    }

    /// Shuts down the background refresh task
    pub async fn shutdown(self) {
        let _ = self.shutdown_tx.send(()).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{
        DistrictRequest, MonthSummary, Query, RawRecord, StoredSummary, UpstreamError,
        UpstreamResponse,
    };
    use crate::store::JsonFileStore;
    use async_trait::async_trait;
    use reqwest::StatusCode;
    use serde_json::json;
    use std::collections::HashMap;
    use std::sync::Mutex;
    use tempfile::TempDir;

    /// Upstream stand-in keyed by state name
    #[derive(Default)]
    struct StateSource {
        rows: HashMap<String, usize>,
        failing: Vec<String>,
        requested: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl RecordSource for StateSource {
        async fn fetch(&self, _query: &Query) -> Result<UpstreamResponse, UpstreamError> {
            unreachable!("refresh only fetches whole states")
        }

        async fn fetch_state(&self, state: &str) -> Result<UpstreamResponse, UpstreamError> {
            self.requested.lock().unwrap().push(state.to_string());
            if self.failing.iter().any(|s| s == state) {
                return Err(UpstreamError::Status {
                    status: StatusCode::INTERNAL_SERVER_ERROR,
                    url: format!("http://upstream/?filters[state_name]={}", state),
                });
            }
            let count = self.rows.get(state).copied().unwrap_or(0);
            let records = (0..count)
                .map(|i| {
                    serde_json::from_value::<RawRecord>(json!({"state_name": state, "row": i}))
                        .unwrap()
                })
                .collect();
            Ok(UpstreamResponse {
                url: String::new(),
                records,
            })
        }
    }

    fn seeded_store(states: &[&str]) -> (JsonFileStore, TempDir) {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let store = JsonFileStore::in_dir(temp_dir.path());
        for state in states {
            let query = DistrictRequest::new(state, "Some District", None)
                .validate()
                .unwrap();
            store
                .create(&StoredSummary::from_query(&query, Vec::<MonthSummary>::new()))
                .unwrap();
        }
        (store, temp_dir)
    }

    fn states(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_refresh_config_default() {
        let config = RefreshConfig::default();
        assert_eq!(config.interval, Duration::from_secs(86400));
        assert_eq!(config.states.len(), 28);
        assert_eq!(config.concurrency, 4);
    }

    #[tokio::test]
    async fn test_refresh_only_touches_stored_states() {
        let (store, _temp_dir) = seeded_store(&["Goa"]);
        let source = StateSource {
            rows: HashMap::from([("Goa".to_string(), 3), ("Kerala".to_string(), 5)]),
            ..Default::default()
        };

        let summary = refresh_states(&source, &store, &states(&["Goa", "Kerala"]), 2).await;

        assert_eq!(summary.updated, vec!["Goa"]);
        assert_eq!(summary.skipped, vec!["Kerala"]);
        assert_eq!(*source.requested.lock().unwrap(), vec!["Goa"]);

        let goa = store.find_by_state("Goa").unwrap().unwrap();
        assert!(matches!(&goa.data, StoredData::Raw(rows) if rows.len() == 3));
    }

    #[tokio::test]
    async fn test_refresh_failure_keeps_stored_data_and_continues() {
        let (store, _temp_dir) = seeded_store(&["Goa", "Assam"]);
        let source = StateSource {
            rows: HashMap::from([("Assam".to_string(), 1)]),
            failing: vec!["Goa".to_string()],
            ..Default::default()
        };

        let summary = refresh_states(&source, &store, &states(&["Goa", "Assam"]), 1).await;

        assert_eq!(summary.updated, vec!["Assam"]);
        assert_eq!(summary.failed.len(), 1);
        assert_eq!(summary.failed[0].0, "Goa");
        let goa = store.find_by_state("Goa").unwrap().unwrap();
        assert!(matches!(goa.data, StoredData::Summaries(_)));
    }

    #[tokio::test]
    async fn test_refresh_with_empty_upstream_overwrites_stored_data() {
        let (store, _temp_dir) = seeded_store(&["Sikkim"]);
        let source = StateSource::default();

        let summary = refresh_states(&source, &store, &states(&["Sikkim"]), 4).await;

        assert_eq!(summary.updated, vec!["Sikkim"]);
        let sikkim = store.find_by_state("Sikkim").unwrap().unwrap();
        assert!(matches!(&sikkim.data, StoredData::Raw(rows) if rows.is_empty()));
    }

    #[tokio::test]
    async fn test_refresh_handle_runs_first_pass_immediately() {
        let (store, _temp_dir) = seeded_store(&["Punjab"]);
        let source = StateSource {
            rows: HashMap::from([("Punjab".to_string(), 2)]),
            ..Default::default()
        };
        let config = RefreshConfig {
            states: states(&["Punjab"]),
            ..Default::default()
        };

        let mut handle = RefreshHandle::spawn(config, Arc::new(source), Arc::new(store));

        assert!(matches!(
            handle.receiver.recv().await,
            Some(RefreshMessage::RefreshStarted)
        ));
        match handle.receiver.recv().await {
            Some(RefreshMessage::StateUpdated { state, rows }) => {
                assert_eq!(state, "Punjab");
                assert_eq!(rows, 2);
            }
            other => panic!("expected StateUpdated, got {:?}", other),
        }
        match handle.receiver.recv().await {
            Some(RefreshMessage::RefreshCompleted(summary)) => {
                assert_eq!(summary.updated, vec!["Punjab"]);
            }
            other => panic!("expected RefreshCompleted, got {:?}", other),
        }

        handle.shutdown().await;
    }
}
