//! Prepare stage: GPU selection, start, then status polling until teardown

use std::sync::{Arc, Mutex};

use openapi_client::{GpuOption, PrepareStatus, RunId, RunPhase};
use tracing::{debug, info, warn};

use crate::errors::ConsoleError;
use crate::http::ControlPlaneExt;
use crate::identity::RunIdentityExt;
use crate::lifecycle::{
    gate, GateDecision, GpuInventory, Preconditions, Reconciler, Stage, StatusView,
};
use crate::stages::{lock, messages, require_run, StageOptions};
use crate::workers::poller::{self, PollerHandle};

const STATUS: Reconciler = Reconciler::with_fallback("prepare", messages::PREPARE_STATUS_FAILED);
const START: Reconciler = Reconciler::with_fallback("prepare", messages::PREPARE_START_FAILED);

/// Prepare view model
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PrepareView {
    pub run_id: Option<RunId>,
    /// Latest status and the stage's error slot
    pub status: StatusView<PrepareStatus>,
    pub gpu_options: Vec<GpuOption>,
    pub selected_gpu: Option<String>,
    pub gpu_loading: bool,
    /// GPU listing has its own error channel
    pub gpu_error: Option<String>,
    pub is_starting: bool,
    pub polling: bool,
}

impl PrepareView {
    pub fn phase(&self) -> Option<RunPhase> {
        self.status.phase()
    }

    pub fn gpu_inventory(&self) -> GpuInventory {
        if self.gpu_loading {
            GpuInventory::Loading
        } else if self.gpu_error.is_some() {
            GpuInventory::Unavailable
        } else {
            GpuInventory::Loaded {
                options: self.gpu_options.len(),
                selected: self.selected_gpu.is_some(),
            }
        }
    }

    /// Listing succeeded but offered nothing
    pub fn no_gpu_available(&self) -> bool {
        matches!(self.gpu_inventory(), GpuInventory::Loaded { options: 0, .. })
    }

    pub fn gate(&self) -> GateDecision {
        gate(
            self.phase(),
            &Preconditions::new(Stage::Prepare, self.run_id.as_ref())
                .in_flight(self.is_starting)
                .gpu(self.gpu_inventory()),
        )
    }
}

/// Prepare events
#[derive(Debug, Clone)]
pub enum PrepareEvent {
    /// Enter the stage, optionally with a run id from navigation
    Enter { run_id: Option<RunId> },
    SelectGpu(String),
    Start,
    /// Tear the stage down
    Leave,
}

struct PrepareState {
    view: PrepareView,
    /// Bumped on every enter/leave; results from older sessions are dropped
    session: u64,
}

/// Prepare stage controller
pub struct PrepareStage {
    api: Arc<dyn ControlPlaneExt>,
    identity: Arc<dyn RunIdentityExt>,
    options: StageOptions,
    state: Arc<Mutex<PrepareState>>,
    poller: Mutex<Option<PollerHandle>>,
}

impl PrepareStage {
    pub fn new(
        api: Arc<dyn ControlPlaneExt>,
        identity: Arc<dyn RunIdentityExt>,
        options: StageOptions,
    ) -> Self {
        Self {
            api,
            identity,
            options,
            state: Arc::new(Mutex::new(PrepareState {
                view: PrepareView::default(),
                session: 0,
            })),
            poller: Mutex::new(None),
        }
    }

    pub fn current_view(&self) -> PrepareView {
        lock(&self.state).view.clone()
    }

    pub async fn dispatch(&self, event: PrepareEvent) {
        match event {
            PrepareEvent::Enter { run_id } => self.enter(run_id).await,
            PrepareEvent::SelectGpu(gpu_id) => self.select_gpu(gpu_id),
            PrepareEvent::Start => self.start().await,
            PrepareEvent::Leave => {
                self.leave();
            }
        }
    }

    async fn enter(&self, explicit: Option<RunId>) {
        let resolved = self.identity.resolve(explicit.as_ref()).await;

        let armed = lock(&self.poller).is_some();
        if armed && resolved.is_some() && lock(&self.state).view.run_id == resolved {
            debug!("Prepare already active for {:?}", resolved);
            return;
        }

        let session = self.leave();
        let run_id = match require_run(resolved, messages::MISSING_RUN) {
            Ok(run_id) => run_id,
            Err(e) => {
                lock(&self.state).view.status.error = e.user_message();
                return;
            }
        };

        info!("Entering prepare for run {}", run_id);
        {
            let mut state = lock(&self.state);
            state.view.run_id = Some(run_id.clone());
            state.view.gpu_loading = true;
        }

        // Each fetch settles on its own; a slow GPU listing never holds back status
        let gpus = async {
            let gpus = self.api.list_gpus(&run_id).await;
            let mut state = lock(&self.state);
            if state.session == session {
                apply_gpus(&mut state.view, gpus);
            }
        };
        let status = async {
            let status = self.api.prepare_status(&run_id).await;
            let status_ok = status.is_ok();
            {
                let mut state = lock(&self.state);
                if state.session != session {
                    return;
                }
                let reconciled = STATUS.reconcile(&state.view.status, status);
                state.view.status = reconciled.view;
            }
            if status_ok {
                self.arm_poller(run_id.clone(), session);
            }
        };
        tokio::join!(gpus, status);
    }

    fn select_gpu(&self, gpu_id: String) {
        let mut state = lock(&self.state);
        if state.view.gpu_options.iter().any(|gpu| gpu.id == gpu_id) {
            state.view.selected_gpu = Some(gpu_id);
        } else {
            warn!("Ignoring unknown GPU selection {}", gpu_id);
        }
    }

    async fn start(&self) {
        let (run_id, gpu_id, session) = {
            let mut state = lock(&self.state);
            let view = &mut state.view;

            let run_id = match require_run(view.run_id.clone(), messages::MISSING_RUN) {
                Ok(run_id) => run_id,
                Err(e) => {
                    view.status.error = e.user_message();
                    return;
                }
            };
            if matches!(view.gpu_inventory(), GpuInventory::Loaded { options, selected: false } if options > 0)
            {
                view.status.error = Some(messages::PREPARE_SELECT_GPU.to_string());
                return;
            }
            if view.no_gpu_available() {
                view.status.error = Some(messages::PREPARE_NO_GPU.to_string());
                return;
            }
            if !view.gate().can_start {
                debug!("Prepare start ignored, action not available");
                return;
            }

            view.is_starting = true;
            view.status.error = None;
            (run_id, view.selected_gpu.clone(), state.session)
        };

        info!("Starting prepare for run {} (gpu {:?})", run_id, gpu_id);
        let result = self.api.prepare_start(&run_id, gpu_id.as_deref()).await;
        let started = result.is_ok();

        {
            let mut state = lock(&self.state);
            if state.session != session {
                return;
            }
            state.view.is_starting = false;
            let reconciled = START.reconcile(&state.view.status, result);
            state.view.status = reconciled.view;
        }

        if started {
            self.arm_poller(run_id, session);
        }
    }

    fn arm_poller(&self, run_id: RunId, session: u64) {
        let mut poller = lock(&self.poller);
        if poller.is_some() {
            return;
        }
        {
            let mut state = lock(&self.state);
            if state.session != session {
                return;
            }
            state.view.polling = true;
        }

        let api = self.api.clone();
        let state = self.state.clone();
        let handle = poller::start(
            poller::Options::new("prepare-status", self.options.prepare_poll_interval).deferred(),
            move || {
                let api = api.clone();
                let run_id = run_id.clone();
                async move { api.prepare_status(&run_id).await }
            },
            move |fetched: Result<PrepareStatus, ConsoleError>| {
                let mut state = lock(&state);
                if state.session != session {
                    return;
                }
                let reconciled = STATUS.reconcile(&state.view.status, fetched);
                state.view.status = reconciled.view;
            },
        );

        *poller = Some(handle);
    }

    /// Cancel polling and reset the view. Returns the new session.
    fn leave(&self) -> u64 {
        let handle = lock(&self.poller).take();
        if let Some(handle) = handle {
            handle.cancel();
        }

        let mut state = lock(&self.state);
        state.session += 1;
        state.view = PrepareView::default();
        state.session
    }
}

fn apply_gpus(view: &mut PrepareView, gpus: Result<Vec<GpuOption>, ConsoleError>) {
    view.gpu_loading = false;
    match gpus {
        Ok(options) => {
            view.selected_gpu = options.first().map(|gpu| gpu.id.clone());
            view.gpu_options = options;
            view.gpu_error = None;
        }
        Err(e) => {
            warn!("GPU listing failed: {}", e);
            view.gpu_error = Some(
                e.user_message()
                    .unwrap_or_else(|| messages::GPU_LIST_FAILED.to_string()),
            );
            view.gpu_options.clear();
            view.selected_gpu = None;
        }
    }
}

impl Drop for PrepareStage {
    fn drop(&mut self) {
        let handle = lock(&self.poller).take();
        if let Some(handle) = handle {
            handle.cancel();
        }
    }
}
