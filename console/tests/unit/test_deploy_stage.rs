//! Deploy stage: environment reconciliation, start and manual refresh

use std::sync::Arc;
use std::time::Duration;

use openapi_client::{Environment, RunId, RunPhase};
use persephone::identity::{MemoryRunIdentity, RunIdentityExt};
use persephone::lifecycle::{Route, Stage, NO_STATUS_YET};
use persephone::stages::messages;
use persephone::stages::{DeployEvent, DeployStage, StageOptions};

use crate::common::{deploy_status, Call, FakeControlPlane, Reply};

fn stage_for(api: &Arc<FakeControlPlane>, run_id: Option<&str>) -> DeployStage {
    let identity = match run_id {
        Some(run_id) => MemoryRunIdentity::with_run(run_id),
        None => MemoryRunIdentity::new(),
    };
    let options = StageOptions {
        default_environment: Environment::Stage,
        ..Default::default()
    };
    DeployStage::new(api.clone(), Arc::new(identity), options)
}

#[tokio::test]
async fn test_server_environment_wins() {
    let api = FakeControlPlane::new();
    api.deploy_status
        .ok(deploy_status("r1", Environment::Prod, RunPhase::Running));
    let stage = stage_for(&api, Some("r1"));
    assert_eq!(stage.current_view().environment, Environment::Stage);

    stage.dispatch(DeployEvent::Enter { run_id: None }).await;

    assert_eq!(
        api.calls(),
        vec![Call::DeployStatus(RunId::new("r1"), Environment::Stage)]
    );
    let view = stage.current_view();
    assert_eq!(view.environment, Environment::Prod);
    assert_eq!(view.phase(), Some(RunPhase::Running));
    assert!(!view.is_checking);

    // Start goes to the corrected environment
    api.deploy_start
        .ok(deploy_status("r1", Environment::Prod, RunPhase::Pending));
    stage.dispatch(DeployEvent::Start).await;
    assert_eq!(
        api.calls().last(),
        Some(&Call::DeployStart(RunId::new("r1"), Environment::Prod))
    );
}

#[tokio::test]
async fn test_entry_fetch_is_one_shot() {
    let api = FakeControlPlane::new();
    api.deploy_status
        .ok(deploy_status("r1", Environment::Stage, RunPhase::Running));
    let stage = stage_for(&api, Some("r1"));

    stage.dispatch(DeployEvent::Enter { run_id: None }).await;
    tokio::task::yield_now().await;
    assert_eq!(api.calls().len(), 1);

    stage.dispatch(DeployEvent::Refresh).await;
    assert_eq!(api.calls().len(), 2);
}

#[tokio::test]
async fn test_entry_transport_failure_is_quiet_refresh_is_not() {
    let api = FakeControlPlane::new();
    api.deploy_status.push(Reply::Transport);
    let stage = stage_for(&api, Some("r1"));

    stage.dispatch(DeployEvent::Enter { run_id: None }).await;
    let view = stage.current_view();
    assert_eq!(view.status.status, None);
    assert_eq!(view.status.error.as_deref(), Some(NO_STATUS_YET));

    api.deploy_status
        .reset(Reply::Ok(deploy_status("r1", Environment::Stage, RunPhase::Running)));
    stage.dispatch(DeployEvent::Refresh).await;
    let good = stage.current_view().status.status;
    assert!(good.is_some());
    assert_eq!(stage.current_view().status.error, None);

    api.deploy_status.reset(Reply::Transport);
    stage.dispatch(DeployEvent::Refresh).await;
    let view = stage.current_view();
    assert_eq!(view.status.status, good);
    assert_eq!(
        view.status.error.as_deref(),
        Some(messages::DEPLOY_STATUS_FAILED)
    );
}

#[tokio::test]
async fn test_start_reports_info_and_advances_on_success() {
    let api = FakeControlPlane::new();
    api.deploy_status
        .ok(deploy_status("r1", Environment::Stage, RunPhase::Pending));
    api.deploy_start
        .ok(deploy_status("r1", Environment::Stage, RunPhase::Running));
    let stage = stage_for(&api, Some("r1"));

    stage.dispatch(DeployEvent::Enter { run_id: None }).await;
    assert!(stage.current_view().gate().can_start);

    stage.dispatch(DeployEvent::Start).await;
    let view = stage.current_view();
    assert_eq!(view.info.as_deref(), Some(messages::DEPLOY_STARTED));
    assert!(!view.is_deploying);
    assert_eq!(view.phase(), Some(RunPhase::Running));
    assert!(!view.gate().can_advance);

    api.deploy_status
        .reset(Reply::Ok(deploy_status("r1", Environment::Stage, RunPhase::Succeeded)));
    stage.dispatch(DeployEvent::Refresh).await;
    let decision = stage.current_view().gate();
    assert!(decision.can_advance);
    assert_eq!(
        decision.advance_target,
        Some(Route::new(Stage::Monitor, Some(RunId::new("r1"))))
    );
}

#[tokio::test]
async fn test_start_failure_shows_server_message() {
    let api = FakeControlPlane::new();
    api.deploy_status
        .ok(deploy_status("r1", Environment::Stage, RunPhase::Pending));
    api.deploy_start
        .push(Reply::Api(409, Some("Run is not prepared")));
    let stage = stage_for(&api, Some("r1"));

    stage.dispatch(DeployEvent::Enter { run_id: None }).await;
    stage.dispatch(DeployEvent::Start).await;

    let view = stage.current_view();
    assert_eq!(view.status.error.as_deref(), Some("Run is not prepared"));
    assert_eq!(view.info, None);
    assert_eq!(view.phase(), Some(RunPhase::Pending));
}

#[tokio::test]
async fn test_changing_environment_refetches() {
    let api = FakeControlPlane::new();
    api.deploy_status
        .push(Reply::Ok(deploy_status("r1", Environment::Stage, RunPhase::Succeeded)));
    api.deploy_status
        .push(Reply::Ok(deploy_status("r1", Environment::Dev, RunPhase::Pending)));
    let stage = stage_for(&api, Some("r1"));

    stage.dispatch(DeployEvent::Enter { run_id: None }).await;
    stage
        .dispatch(DeployEvent::SelectEnvironment(Environment::Dev))
        .await;

    assert_eq!(
        api.calls().last(),
        Some(&Call::DeployStatus(RunId::new("r1"), Environment::Dev))
    );
    let view = stage.current_view();
    assert_eq!(view.environment, Environment::Dev);
    assert_eq!(view.phase(), Some(RunPhase::Pending));
}

#[tokio::test(start_paused = true)]
async fn test_environment_change_supersedes_check_in_flight() {
    let api = FakeControlPlane::new();
    api.deploy_status
        .push(Reply::Ok(deploy_status("r1", Environment::Dev, RunPhase::Running)));
    api.deploy_status
        .push(Reply::Ok(deploy_status("r1", Environment::Stage, RunPhase::Pending)));
    api.deploy_status.set_delay(Duration::from_secs(1));
    let stage = Arc::new(DeployStage::new(
        api.clone(),
        Arc::new(MemoryRunIdentity::with_run("r1")),
        StageOptions::default(),
    ));

    let entering = {
        let stage = stage.clone();
        tokio::spawn(async move { stage.dispatch(DeployEvent::Enter { run_id: None }).await })
    };
    // The Dev check is still outstanding when the user switches to Stage
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(stage.current_view().is_checking);

    stage
        .dispatch(DeployEvent::SelectEnvironment(Environment::Stage))
        .await;
    entering.await.unwrap();

    assert_eq!(
        api.calls(),
        vec![
            Call::DeployStatus(RunId::new("r1"), Environment::Dev),
            Call::DeployStatus(RunId::new("r1"), Environment::Stage),
        ]
    );
    let view = stage.current_view();
    assert_eq!(view.environment, Environment::Stage);
    assert_eq!(view.phase(), Some(RunPhase::Pending));
    assert!(!view.is_checking);
}

#[tokio::test]
async fn test_missing_run_blocks_every_action() {
    let api = FakeControlPlane::new();
    let stage = stage_for(&api, None);

    stage.dispatch(DeployEvent::Enter { run_id: None }).await;
    stage.dispatch(DeployEvent::Start).await;
    stage.dispatch(DeployEvent::Refresh).await;

    let view = stage.current_view();
    assert_eq!(
        view.status.error.as_deref(),
        Some(messages::MISSING_RUN_DEPLOY)
    );
    assert!(!view.gate().can_start);
    assert!(!view.can_refresh());
    assert!(api.calls().is_empty());
}

#[tokio::test]
async fn test_explicit_run_id_is_remembered() {
    let api = FakeControlPlane::new();
    api.deploy_status
        .ok(deploy_status("r9", Environment::Stage, RunPhase::Pending));
    let identity = Arc::new(MemoryRunIdentity::with_run("r1"));
    let stage = DeployStage::new(api.clone(), identity.clone(), StageOptions::default());

    stage
        .dispatch(DeployEvent::Enter {
            run_id: Some(RunId::new("r9")),
        })
        .await;

    assert_eq!(identity.resolve(None).await, Some(RunId::new("r9")));
    assert_eq!(
        api.calls(),
        vec![Call::DeployStatus(RunId::new("r9"), Environment::Dev)]
    );
}
