//! Monitor stage: read-only metrics, polled until teardown

use std::sync::{Arc, Mutex};

use openapi_client::{MonitorSummary, RunId};
use tracing::{debug, info};

use crate::errors::ConsoleError;
use crate::http::ControlPlaneExt;
use crate::identity::RunIdentityExt;
use crate::lifecycle::{Reconciler, StatusView};
use crate::stages::{lock, messages, require_run, StageOptions};
use crate::workers::poller::{self, PollerHandle};

const SUMMARY: Reconciler = Reconciler::with_fallback("monitor", messages::MONITOR_FAILED);

/// Monitor view model
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MonitorView {
    pub run_id: Option<RunId>,
    pub summary: StatusView<MonitorSummary>,
    /// Until the first tick settles
    pub is_loading: bool,
}

/// Monitor events
#[derive(Debug, Clone)]
pub enum MonitorEvent {
    Enter { run_id: Option<RunId> },
    Leave,
}

struct MonitorState {
    view: MonitorView,
    session: u64,
}

/// Monitor stage controller
pub struct MonitorStage {
    api: Arc<dyn ControlPlaneExt>,
    identity: Arc<dyn RunIdentityExt>,
    options: StageOptions,
    state: Arc<Mutex<MonitorState>>,
    poller: Mutex<Option<PollerHandle>>,
}

impl MonitorStage {
    pub fn new(
        api: Arc<dyn ControlPlaneExt>,
        identity: Arc<dyn RunIdentityExt>,
        options: StageOptions,
    ) -> Self {
        Self {
            api,
            identity,
            options,
            state: Arc::new(Mutex::new(MonitorState {
                view: MonitorView::default(),
                session: 0,
            })),
            poller: Mutex::new(None),
        }
    }

    pub fn current_view(&self) -> MonitorView {
        lock(&self.state).view.clone()
    }

    pub async fn dispatch(&self, event: MonitorEvent) {
        match event {
            MonitorEvent::Enter { run_id } => self.enter(run_id).await,
            MonitorEvent::Leave => {
                self.leave();
            }
        }
    }

    async fn enter(&self, explicit: Option<RunId>) {
        let resolved = self.identity.resolve(explicit.as_ref()).await;

        let armed = lock(&self.poller).is_some();
        if armed && resolved.is_some() && lock(&self.state).view.run_id == resolved {
            debug!("Monitor already active for {:?}", resolved);
            return;
        }

        let session = self.leave();
        let run_id = match require_run(resolved, messages::MISSING_RUN) {
            Ok(run_id) => run_id,
            Err(e) => {
                lock(&self.state).view.summary.error = e.user_message();
                return;
            }
        };

        info!("Monitoring run {}", run_id);
        {
            let mut state = lock(&self.state);
            state.view.run_id = Some(run_id.clone());
            state.view.is_loading = true;
        }

        let api = self.api.clone();
        let state = self.state.clone();
        let handle = poller::start(
            poller::Options::new("monitor-summary", self.options.monitor_poll_interval),
            move || {
                let api = api.clone();
                let run_id = run_id.clone();
                async move { api.monitor_summary(&run_id).await }
            },
            move |fetched: Result<MonitorSummary, ConsoleError>| {
                let mut state = lock(&state);
                if state.session != session {
                    return;
                }
                state.view.is_loading = false;
                let reconciled = SUMMARY.reconcile(&state.view.summary, fetched);
                state.view.summary = reconciled.view;
            },
        );

        *lock(&self.poller) = Some(handle);
    }

    /// Cancel polling and reset the view. Returns the new session.
    fn leave(&self) -> u64 {
        let handle = lock(&self.poller).take();
        if let Some(handle) = handle {
            handle.cancel();
        }

        let mut state = lock(&self.state);
        state.session += 1;
        state.view = MonitorView::default();
        state.session
    }
}

impl Drop for MonitorStage {
    fn drop(&mut self) {
        let handle = lock(&self.poller).take();
        if let Some(handle) = handle {
            handle.cancel();
        }
    }
}
