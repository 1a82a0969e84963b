//! JSON file feed adapter for offline loads and fixtures.

use super::{records_from_value, RecordSource, SourceError, SourceResult};
use crate::normalize::RawRecord;
use log::info;
use serde_json::Value;
use std::path::PathBuf;

/// Reads one feed from a file holding a JSON array of records.
pub struct JsonFileSource {
    path: PathBuf,
    label: String,
}

impl JsonFileSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let label = path.display().to_string();
        Self { path, label }
    }
}

impl RecordSource for JsonFileSource {
    fn location(&self) -> &str {
        &self.label
    }

    fn fetch_all(&self) -> SourceResult<Vec<RawRecord>> {
        let content = std::fs::read_to_string(&self.path).map_err(|source| SourceError::Io {
            location: self.label.clone(),
            source,
        })?;
        let payload: Value =
            serde_json::from_str(&content).map_err(|err| SourceError::Decode {
                location: self.label.clone(),
                message: err.to_string(),
            })?;
        let records = records_from_value(&self.label, payload)?;
        info!(
            "event=source_fetch module=source status=ok kind=file records={}",
            records.len()
        );
        Ok(records)
    }
}
