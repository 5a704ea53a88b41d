//! JSON document store
//!
//! Keeps every row in a single `summaries.json` array under the data
//! directory. Writes replace the file atomically; a process-wide mutex
//! serializes read-modify-write cycles.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use directories::ProjectDirs;
use tempfile::NamedTempFile;
use tracing::debug;

use super::{StoreError, SummaryStore};
use crate::data::{StoredData, StoredSummary};

/// File name of the store document
const STORE_FILE: &str = "summaries.json";

/// A [`SummaryStore`] backed by one JSON file
#[derive(Debug)]
pub struct JsonFileStore {
    path: PathBuf,
    lock: Mutex<()>,
}

impl JsonFileStore {
    /// Creates a store in the XDG data directory (`~/.local/share/gramdata/`)
    ///
    /// Returns `None` if the data directory cannot be determined.
    pub fn new() -> Option<Self> {
        let project_dirs = ProjectDirs::from("", "", "gramdata")?;
        Some(Self::in_dir(project_dirs.data_dir()))
    }

    /// Creates a store whose document lives in `dir`
    pub fn in_dir(dir: &Path) -> Self {
        Self {
            path: dir.join(STORE_FILE),
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn load(&self) -> Result<Vec<StoredSummary>, StoreError> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }
        let content = fs::read_to_string(&self.path)?;
        if content.trim().is_empty() {
            return Ok(Vec::new());
        }
        Ok(serde_json::from_str(&content)?)
    }

    fn save(&self, rows: &[StoredSummary]) -> Result<(), StoreError> {
        let dir = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        fs::create_dir_all(dir)?;

        let json = serde_json::to_string_pretty(rows)?;

        // Write atomically via a uniquely named temp file next to the store
        let mut file = NamedTempFile::new_in(dir)?;
        file.write_all(json.as_bytes())?;
        file.as_file().sync_all()?;
        file.persist(&self.path).map_err(|err| err.error)?;

        Ok(())
    }
}

impl SummaryStore for JsonFileStore {
    fn create(&self, record: &StoredSummary) -> Result<(), StoreError> {
        let _guard = self.lock.lock().map_err(|_| StoreError::Poisoned)?;

        let mut rows = self.load()?;
        rows.push(record.clone());
        self.save(&rows)?;

        debug!(
            state = %record.state_name,
            district = %record.district_name,
            rows = rows.len(),
            "stored summary row"
        );
        Ok(())
    }

    fn find_by_state(&self, state_name: &str) -> Result<Option<StoredSummary>, StoreError> {
        let _guard = self.lock.lock().map_err(|_| StoreError::Poisoned)?;

        Ok(self
            .load()?
            .into_iter()
            .find(|row| row.state_name == state_name))
    }

    fn replace_state_data(&self, state_name: &str, data: StoredData) -> Result<bool, StoreError> {
        let _guard = self.lock.lock().map_err(|_| StoreError::Poisoned)?;

        let mut rows = self.load()?;
        let Some(row) = rows.iter_mut().find(|row| row.state_name == state_name) else {
            return Ok(false);
        };
        row.data = data;
        self.save(&rows)?;

        Ok(true)
    }

    fn all(&self) -> Result<Vec<StoredSummary>, StoreError> {
        let _guard = self.lock.lock().map_err(|_| StoreError::Poisoned)?;
        self.load()
    }
}
