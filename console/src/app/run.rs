//! Command runner: builds the stage controllers and drives one stage

use std::future::Future;
use std::sync::Arc;

use openapi_client::{Environment, RunId};
use tokio::pin;
use tracing::{error, info};

use crate::app::options::{AppOptions, Command};
use crate::app::render;
use crate::errors::ConsoleError;
use crate::http::{ControlPlaneExt, HttpClient};
use crate::identity::{FileRunIdentity, RunIdentityExt};
use crate::stages::{
    DeployEvent, DeployStage, MonitorEvent, MonitorStage, PrepareEvent, PrepareStage,
    UploadEvent, UploadStage,
};
use crate::storage::current_run::load_current_run;

/// Shared collaborators of the stage controllers
pub struct AppState {
    pub api: Arc<dyn ControlPlaneExt>,
    pub identity: Arc<dyn RunIdentityExt>,
    pub options: AppOptions,
}

impl AppState {
    pub fn init(options: AppOptions) -> Result<Self, ConsoleError> {
        let client = HttpClient::new(&options.backend_base_url, options.api_token.clone())?;
        let identity = FileRunIdentity::new(options.layout.current_run_file());
        Ok(Self {
            api: Arc::new(client),
            identity: Arc::new(identity),
            options,
        })
    }
}

/// Run a console command until it completes or `shutdown_signal` resolves
pub async fn run(
    command: Command,
    options: AppOptions,
    shutdown_signal: impl Future<Output = ()> + Send,
) -> Result<(), ConsoleError> {
    options.layout.setup().await?;
    let state = AppState::init(options)?;
    run_with(command, &state, shutdown_signal).await
}

/// Same as [`run`] with injected collaborators
pub async fn run_with(
    command: Command,
    state: &AppState,
    shutdown_signal: impl Future<Output = ()> + Send,
) -> Result<(), ConsoleError> {
    info!("Running command {:?}", command);
    match command {
        Command::Upload { artifact } => {
            let stage = UploadStage::new(state.api.clone(), state.identity.clone());
            let next = stage.dispatch(UploadEvent::Submit { artifact }).await;
            let view = stage.current_view();
            println!("{}", render::upload(&view, next.as_ref()));
            fail_on(view.error)
        }
        Command::Prepare { run_id, gpu, start } => {
            prepare(state, run_id, gpu, start, shutdown_signal).await
        }
        Command::Deploy {
            run_id,
            environment,
            start,
            watch,
        } => deploy(state, run_id, environment, start, watch, shutdown_signal).await,
        Command::Monitor { run_id } => monitor(state, run_id, shutdown_signal).await,
        Command::Status => {
            let file = state.options.layout.current_run_file();
            match load_current_run(&file).await? {
                Some(current) => println!(
                    "{} (since {})",
                    current.run_id,
                    current.updated_at.to_rfc3339()
                ),
                None => println!("No current run"),
            }
            Ok(())
        }
    }
}

async fn prepare(
    state: &AppState,
    run_id: Option<RunId>,
    gpu: Option<String>,
    start: bool,
    shutdown_signal: impl Future<Output = ()> + Send,
) -> Result<(), ConsoleError> {
    let stage = PrepareStage::new(
        state.api.clone(),
        state.identity.clone(),
        state.options.stages.clone(),
    );

    stage.dispatch(PrepareEvent::Enter { run_id }).await;
    if let Some(gpu) = gpu {
        stage.dispatch(PrepareEvent::SelectGpu(gpu)).await;
    }
    if start {
        stage.dispatch(PrepareEvent::Start).await;
    }

    pin!(shutdown_signal);
    let mut last = None;
    loop {
        let view = stage.current_view();
        if last.as_ref() != Some(&view) {
            println!("{}", render::prepare(&view));
        }
        let done = view.phase().is_some_and(|phase| phase.is_terminal()) || !view.polling;
        last = Some(view);
        if done {
            break;
        }

        tokio::select! {
            _ = &mut shutdown_signal => {
                info!("Interrupted, leaving prepare");
                break;
            }
            _ = tokio::time::sleep(state.options.render_interval) => {}
        }
    }

    stage.dispatch(PrepareEvent::Leave).await;
    fail_on(last.and_then(|view| view.status.error))
}

async fn deploy(
    state: &AppState,
    run_id: Option<RunId>,
    environment: Option<Environment>,
    start: bool,
    watch: Option<std::time::Duration>,
    shutdown_signal: impl Future<Output = ()> + Send,
) -> Result<(), ConsoleError> {
    let stage = DeployStage::new(
        state.api.clone(),
        state.identity.clone(),
        state.options.stages.clone(),
    );

    stage.dispatch(DeployEvent::Enter { run_id }).await;
    if let Some(environment) = environment {
        stage.dispatch(DeployEvent::SelectEnvironment(environment)).await;
    }
    if start {
        stage.dispatch(DeployEvent::Start).await;
    }

    let mut view = stage.current_view();
    println!("{}", render::deploy(&view));

    if let (Some(every), true) = (watch, view.run_id.is_some()) {
        pin!(shutdown_signal);
        while !view.phase().is_some_and(|phase| phase.is_terminal()) {
            tokio::select! {
                _ = &mut shutdown_signal => {
                    info!("Interrupted, leaving deploy");
                    break;
                }
                _ = tokio::time::sleep(every) => {}
            }
            stage.dispatch(DeployEvent::Refresh).await;
            let refreshed = stage.current_view();
            if refreshed != view {
                println!("{}", render::deploy(&refreshed));
            }
            view = refreshed;
        }
    }

    stage.dispatch(DeployEvent::Leave).await;
    fail_on(view.status.error)
}

async fn monitor(
    state: &AppState,
    run_id: Option<RunId>,
    shutdown_signal: impl Future<Output = ()> + Send,
) -> Result<(), ConsoleError> {
    let stage = MonitorStage::new(
        state.api.clone(),
        state.identity.clone(),
        state.options.stages.clone(),
    );

    stage.dispatch(MonitorEvent::Enter { run_id }).await;

    pin!(shutdown_signal);
    let mut last = None;
    loop {
        let view = stage.current_view();
        if last.as_ref() != Some(&view) {
            println!("{}", render::monitor(&view));
        }
        let idle = view.run_id.is_none();
        last = Some(view);
        if idle {
            break;
        }

        tokio::select! {
            _ = &mut shutdown_signal => {
                info!("Interrupted, leaving monitor");
                break;
            }
            _ = tokio::time::sleep(state.options.render_interval) => {}
        }
    }

    stage.dispatch(MonitorEvent::Leave).await;
    match last {
        Some(view) if view.run_id.is_none() => fail_on(view.summary.error),
        _ => Ok(()),
    }
}

fn fail_on(error: Option<String>) -> Result<(), ConsoleError> {
    match error {
        Some(message) => {
            error!("{}", message);
            Err(ConsoleError::StageFailed(message))
        }
        None => Ok(()),
    }
}
