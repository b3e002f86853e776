//! Persisted pointer to the most recently known run

use chrono::{DateTime, Utc};
use openapi_client::RunId;
use serde::{Deserialize, Serialize};

use crate::errors::ConsoleError;
use crate::filesys::file::File;

/// Contents of `current_run.json`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CurrentRun {
    pub run_id: RunId,
    pub updated_at: DateTime<Utc>,
}

impl CurrentRun {
    pub fn new(run_id: RunId) -> Self {
        Self {
            run_id,
            updated_at: Utc::now(),
        }
    }
}

/// Load the current run, `None` when nothing was persisted yet
pub async fn load_current_run(file: &File) -> Result<Option<CurrentRun>, ConsoleError> {
    if !file.exists().await {
        return Ok(None);
    }
    let current: CurrentRun = file.read_json().await.map_err(|e| {
        ConsoleError::StorageError(format!(
            "Unreadable current run file {}: {}",
            file.path().display(),
            e
        ))
    })?;
    if current.run_id.is_empty() {
        return Ok(None);
    }
    Ok(Some(current))
}

/// Overwrite the current run
pub async fn save_current_run(file: &File, current: &CurrentRun) -> Result<(), ConsoleError> {
    file.write_json(current).await.map_err(|e| {
        ConsoleError::StorageError(format!(
            "Failed to write current run file {}: {}",
            file.path().display(),
            e
        ))
    })
}
