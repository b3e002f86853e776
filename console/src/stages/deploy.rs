//! Deploy stage: environment choice, start, and user-paced status checks

use std::sync::{Arc, Mutex};

use openapi_client::{DeployStatus, Environment, RunId, RunPhase};
use tracing::{debug, info};

use crate::errors::ConsoleError;
use crate::http::ControlPlaneExt;
use crate::identity::RunIdentityExt;
use crate::lifecycle::{gate, GateDecision, Preconditions, Reconciler, Stage, StatusView};
use crate::stages::{lock, messages, require_run, StageOptions};

const ENTRY: Reconciler = Reconciler::silent("deploy");
const REFRESH: Reconciler = Reconciler::with_fallback("deploy", messages::DEPLOY_STATUS_FAILED);
const START: Reconciler = Reconciler::with_fallback("deploy", messages::DEPLOY_START_FAILED);

/// Deploy view model
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DeployView {
    pub run_id: Option<RunId>,
    /// Target environment, corrected to the server's value when they differ
    pub environment: Environment,
    pub status: StatusView<DeployStatus>,
    pub info: Option<String>,
    pub is_deploying: bool,
    pub is_checking: bool,
}

impl DeployView {
    pub fn phase(&self) -> Option<RunPhase> {
        self.status.phase()
    }

    pub fn gate(&self) -> GateDecision {
        gate(
            self.phase(),
            &Preconditions::new(Stage::Deploy, self.run_id.as_ref()).in_flight(self.is_deploying),
        )
    }

    pub fn can_refresh(&self) -> bool {
        self.run_id.is_some() && !self.is_checking
    }
}

/// Deploy events
#[derive(Debug, Clone)]
pub enum DeployEvent {
    Enter { run_id: Option<RunId> },
    SelectEnvironment(Environment),
    Start,
    /// Re-fetch the status on demand
    Refresh,
    Leave,
}

struct DeployState {
    view: DeployView,
    session: u64,
    /// Latest status check; older check responses are dropped
    check: u64,
}

/// What a request was sent for
#[derive(Debug, Clone, Copy)]
struct Ticket {
    session: u64,
    check: Option<u64>,
    environment: Environment,
}

/// Deploy stage controller. No automatic polling.
pub struct DeployStage {
    api: Arc<dyn ControlPlaneExt>,
    identity: Arc<dyn RunIdentityExt>,
    options: StageOptions,
    state: Mutex<DeployState>,
}

impl DeployStage {
    pub fn new(
        api: Arc<dyn ControlPlaneExt>,
        identity: Arc<dyn RunIdentityExt>,
        options: StageOptions,
    ) -> Self {
        let view = DeployView {
            environment: options.default_environment,
            ..Default::default()
        };
        Self {
            api,
            identity,
            options,
            state: Mutex::new(DeployState {
                view,
                session: 0,
                check: 0,
            }),
        }
    }

    pub fn current_view(&self) -> DeployView {
        lock(&self.state).view.clone()
    }

    pub async fn dispatch(&self, event: DeployEvent) {
        match event {
            DeployEvent::Enter { run_id } => self.enter(run_id).await,
            DeployEvent::SelectEnvironment(environment) => {
                self.select_environment(environment).await
            }
            DeployEvent::Start => self.start().await,
            DeployEvent::Refresh => self.refresh(REFRESH, false).await,
            DeployEvent::Leave => {
                self.reset();
            }
        }
    }

    async fn enter(&self, explicit: Option<RunId>) {
        let resolved = self.identity.resolve(explicit.as_ref()).await;
        self.reset();

        let run_id = match require_run(resolved, messages::MISSING_RUN_DEPLOY) {
            Ok(run_id) => run_id,
            Err(e) => {
                lock(&self.state).view.status.error = e.user_message();
                return;
            }
        };

        info!("Entering deploy for run {}", run_id);
        lock(&self.state).view.run_id = Some(run_id);
        self.refresh(ENTRY, false).await;
    }

    async fn select_environment(&self, environment: Environment) {
        {
            let mut state = lock(&self.state);
            if state.view.environment == environment {
                return;
            }
            state.view.environment = environment;
            state.view.info = None;
            if state.view.run_id.is_none() {
                return;
            }
        }
        // A check still running for the old environment is superseded
        self.refresh(ENTRY, true).await;
    }

    async fn refresh(&self, reconciler: Reconciler, supersede: bool) {
        let (run_id, ticket) = {
            let mut state = lock(&self.state);
            let missing = messages::MISSING_RUN_DEPLOY;
            let run_id = match require_run(state.view.run_id.clone(), missing) {
                Ok(run_id) => run_id,
                Err(e) => {
                    state.view.status.error = e.user_message();
                    return;
                }
            };
            if state.view.is_checking && !supersede {
                debug!("Deploy status check already in flight");
                return;
            }
            state.view.is_checking = true;
            state.check += 1;
            let ticket = Ticket {
                session: state.session,
                check: Some(state.check),
                environment: state.view.environment,
            };
            (run_id, ticket)
        };

        let result = self.api.deploy_status(&run_id, ticket.environment).await;
        self.apply(ticket, reconciler, result, |view| view.is_checking = false);
    }

    async fn start(&self) {
        let (run_id, ticket) = {
            let mut state = lock(&self.state);
            let missing = messages::MISSING_RUN_DEPLOY;
            let run_id = match require_run(state.view.run_id.clone(), missing) {
                Ok(run_id) => run_id,
                Err(e) => {
                    state.view.status.error = e.user_message();
                    return;
                }
            };
            if !state.view.gate().can_start {
                debug!("Deploy start ignored, action not available");
                return;
            }
            state.view.is_deploying = true;
            state.view.status.error = None;
            state.view.info = None;
            let ticket = Ticket {
                session: state.session,
                check: None,
                environment: state.view.environment,
            };
            (run_id, ticket)
        };

        info!("Starting deployment of run {} to {}", run_id, ticket.environment);
        let result = self.api.deploy_start(&run_id, ticket.environment).await;
        let started = result.is_ok();
        self.apply(ticket, START, result, |view| {
            view.is_deploying = false;
            if started && view.environment == ticket.environment {
                view.info = Some(messages::DEPLOY_STARTED.to_string());
            }
        });
    }

    fn apply(
        &self,
        ticket: Ticket,
        reconciler: Reconciler,
        result: Result<DeployStatus, ConsoleError>,
        settle: impl FnOnce(&mut DeployView),
    ) {
        let mut state = lock(&self.state);
        if state.session != ticket.session {
            debug!("Dropping deploy result from a previous session");
            return;
        }
        if ticket.check.is_some_and(|check| check != state.check) {
            debug!("Dropping superseded deploy status check");
            return;
        }

        let view = &mut state.view;
        settle(view);
        if view.environment != ticket.environment {
            debug!(
                "Dropping deploy result for {}, now targeting {}",
                ticket.environment, view.environment
            );
            return;
        }
        let server_env = result.as_ref().ok().map(|status| status.environment);
        let reconciled = reconciler.reconcile(&view.status, result);
        view.status = reconciled.view;

        if let Some(server_env) = server_env {
            if server_env != view.environment {
                info!(
                    "Server reports environment {}, switching from {}",
                    server_env, view.environment
                );
                view.environment = server_env;
            }
        }
    }

    fn reset(&self) -> u64 {
        let mut state = lock(&self.state);
        state.session += 1;
        state.view = DeployView {
            environment: self.options.default_environment,
            ..Default::default()
        };
        state.session
    }
}
