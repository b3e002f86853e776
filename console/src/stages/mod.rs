//! Stage controllers: one state machine per pipeline step

use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use openapi_client::{Environment, RunId};

use crate::errors::ConsoleError;
use crate::storage::settings::Settings;

pub mod deploy;
pub mod messages;
pub mod monitor;
pub mod prepare;
pub mod upload;

pub use deploy::{DeployEvent, DeployStage, DeployView};
pub use monitor::{MonitorEvent, MonitorStage, MonitorView};
pub use prepare::{PrepareEvent, PrepareStage, PrepareView};
pub use upload::{UploadEvent, UploadStage, UploadView};

/// Cadences and defaults shared by the stage controllers
#[derive(Debug, Clone)]
pub struct StageOptions {
    /// Prepare status polling interval
    pub prepare_poll_interval: Duration,

    /// Monitor summary polling interval
    pub monitor_poll_interval: Duration,

    /// Environment preselected on entering deploy
    pub default_environment: Environment,
}

impl Default for StageOptions {
    fn default() -> Self {
        Self {
            prepare_poll_interval: Duration::from_secs(2),
            monitor_poll_interval: Duration::from_secs(5),
            default_environment: Environment::Dev,
        }
    }
}

impl From<&Settings> for StageOptions {
    fn from(settings: &Settings) -> Self {
        Self {
            prepare_poll_interval: settings.prepare_poll_interval(),
            monitor_poll_interval: settings.monitor_poll_interval(),
            default_environment: settings.default_environment,
        }
    }
}

/// The run a stage acts on, or the stage's missing-run error
pub(crate) fn require_run(run_id: Option<RunId>, missing: &str) -> Result<RunId, ConsoleError> {
    run_id
        .filter(|run_id| !run_id.is_empty())
        .ok_or_else(|| ConsoleError::MissingRunId(missing.to_string()))
}

/// View and poller state are only touched under short, non-async sections
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
