//! Durable store for district summaries
//!
//! Rows are keyed loosely by (state, district, financial year) and appended on
//! every cache-miss fetch; nothing here deduplicates them. The refresh job
//! looks rows up by state and overwrites their payload in place.

mod json_file;

pub use json_file::JsonFileStore;

use std::sync::Arc;

use thiserror::Error;

use crate::data::{StoredData, StoredSummary};

/// Errors that can occur when reading or writing the durable store
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("store document could not be (de)serialized: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("store lock poisoned")]
    Poisoned,
}

/// Persistence for [`StoredSummary`] rows
pub trait SummaryStore: Send + Sync {
    /// Appends a row
    fn create(&self, record: &StoredSummary) -> Result<(), StoreError>;

    /// Returns the first stored row for a state, if any
    fn find_by_state(&self, state_name: &str) -> Result<Option<StoredSummary>, StoreError>;

    /// Overwrites the payload of the row [`find_by_state`] would return
    ///
    /// Returns `false` when the state has no stored row.
    ///
    /// [`find_by_state`]: SummaryStore::find_by_state
    fn replace_state_data(&self, state_name: &str, data: StoredData) -> Result<bool, StoreError>;

    /// Every stored row, oldest first
    fn all(&self) -> Result<Vec<StoredSummary>, StoreError>;
}

impl<T: SummaryStore + ?Sized> SummaryStore for Arc<T> {
    fn create(&self, record: &StoredSummary) -> Result<(), StoreError> {
        (**self).create(record)
    }

    fn find_by_state(&self, state_name: &str) -> Result<Option<StoredSummary>, StoreError> {
        (**self).find_by_state(state_name)
    }

    fn replace_state_data(&self, state_name: &str, data: StoredData) -> Result<bool, StoreError> {
        (**self).replace_state_data(state_name, data)
    }

    fn all(&self) -> Result<Vec<StoredSummary>, StoreError> {
        (**self).all()
    }
}
