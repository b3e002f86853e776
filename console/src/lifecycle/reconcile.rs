//! Merging fetched status into a stage's view without losing last-known-good data

use openapi_client::{DeployStatus, MonitorSummary, PrepareStatus, RunPhase};
use tracing::{debug, info};

use crate::errors::ConsoleError;

/// Shown when a first fetch fails without any usable message
pub const NO_STATUS_YET: &str = "Control plane unreachable, no status received yet.";

/// A status payload that may carry a phase
pub trait StatusPayload: Clone {
    fn phase(&self) -> Option<RunPhase>;
}

impl StatusPayload for PrepareStatus {
    fn phase(&self) -> Option<RunPhase> {
        Some(self.phase)
    }
}

impl StatusPayload for DeployStatus {
    fn phase(&self) -> Option<RunPhase> {
        Some(self.phase)
    }
}

impl StatusPayload for MonitorSummary {
    fn phase(&self) -> Option<RunPhase> {
        None
    }
}

/// Last-known-good status plus the stage's error slot
#[derive(Debug, Clone, PartialEq)]
pub struct StatusView<T> {
    pub status: Option<T>,
    pub error: Option<String>,
}

impl<T> Default for StatusView<T> {
    fn default() -> Self {
        Self {
            status: None,
            error: None,
        }
    }
}

impl<T: StatusPayload> StatusView<T> {
    /// Phase of the most recent successful fetch
    pub fn phase(&self) -> Option<RunPhase> {
        self.status.as_ref().and_then(StatusPayload::phase)
    }
}

/// Phase transition observed while reconciling
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PhaseChange {
    pub from: Option<RunPhase>,
    pub to: RunPhase,
}

/// Result of a reconciliation
#[derive(Debug, Clone, PartialEq)]
pub struct Reconciled<T> {
    pub view: StatusView<T>,
    pub phase_change: Option<PhaseChange>,
}

/// Merges fetch results into a [`StatusView`].
///
/// `fallback` is the stage's wording for failures that carry no message of
/// their own. Without one, such failures leave the view untouched unless
/// nothing has been shown yet.
#[derive(Debug, Clone, Copy)]
pub struct Reconciler {
    stage: &'static str,
    fallback: Option<&'static str>,
}

impl Reconciler {
    pub const fn with_fallback(stage: &'static str, fallback: &'static str) -> Self {
        Self {
            stage,
            fallback: Some(fallback),
        }
    }

    pub const fn silent(stage: &'static str) -> Self {
        Self {
            stage,
            fallback: None,
        }
    }

    pub fn reconcile<T: StatusPayload>(
        &self,
        previous: &StatusView<T>,
        fetched: Result<T, ConsoleError>,
    ) -> Reconciled<T> {
        match fetched {
            Ok(status) => {
                let before = previous.phase();
                let phase_change = status
                    .phase()
                    .filter(|after| before != Some(*after))
                    .map(|to| PhaseChange { from: before, to });
                if let Some(change) = phase_change {
                    info!(
                        "{} phase {} -> {}",
                        self.stage,
                        change.from.map(|p| p.as_str()).unwrap_or("none"),
                        change.to
                    );
                }

                Reconciled {
                    view: StatusView {
                        status: Some(status),
                        error: None,
                    },
                    phase_change,
                }
            }
            Err(e) => {
                debug!("{} status fetch failed: {}", self.stage, e);

                let message = e
                    .user_message()
                    .or_else(|| self.fallback.map(str::to_string));
                let error = match message {
                    Some(message) => Some(message),
                    None if previous.status.is_none() && previous.error.is_none() => {
                        Some(NO_STATUS_YET.to_string())
                    }
                    None => previous.error.clone(),
                };

                Reconciled {
                    view: StatusView {
                        status: previous.status.clone(),
                        error,
                    },
                    phase_change: None,
                }
            }
        }
    }
}
