//! Monitor stage: continuous polling with last-known-good metrics

use std::sync::Arc;
use std::time::Duration;

use openapi_client::RunId;
use persephone::identity::MemoryRunIdentity;
use persephone::stages::messages;
use persephone::stages::{MonitorEvent, MonitorStage, MonitorView, StageOptions};

use crate::common::{summary, Call, FakeControlPlane, Reply};

fn stage_for(api: &Arc<FakeControlPlane>, identity: MemoryRunIdentity) -> MonitorStage {
    MonitorStage::new(api.clone(), Arc::new(identity), StageOptions::default())
}

fn summary_calls(api: &FakeControlPlane) -> usize {
    api.count(|call| matches!(call, Call::MonitorSummary(_)))
}

#[tokio::test(start_paused = true)]
async fn test_failure_then_success_then_failure_keeps_metrics() {
    let api = FakeControlPlane::new();
    api.monitor.push(Reply::Transport);
    api.monitor.ok(summary("r1", 42.0));
    let stage = stage_for(&api, MemoryRunIdentity::with_run("r1"));

    stage.dispatch(MonitorEvent::Enter { run_id: None }).await;
    tokio::time::sleep(Duration::from_millis(10)).await;

    let view = stage.current_view();
    assert!(!view.is_loading);
    assert_eq!(view.summary.status, None);
    assert_eq!(view.summary.error.as_deref(), Some(messages::MONITOR_FAILED));

    tokio::time::sleep(Duration::from_secs(5)).await;
    let view = stage.current_view();
    assert_eq!(view.summary.status, Some(summary("r1", 42.0)));
    assert_eq!(view.summary.error, None);

    api.monitor.reset(Reply::Transport);
    tokio::time::sleep(Duration::from_secs(5)).await;
    let view = stage.current_view();
    assert_eq!(view.summary.status, Some(summary("r1", 42.0)));
    assert_eq!(view.summary.error.as_deref(), Some(messages::MONITOR_FAILED));

    stage.dispatch(MonitorEvent::Leave).await;
}

#[tokio::test(start_paused = true)]
async fn test_polls_indefinitely_until_leave() {
    let api = FakeControlPlane::new();
    api.monitor.ok(summary("r1", 1.0));
    let stage = stage_for(&api, MemoryRunIdentity::with_run("r1"));

    stage.dispatch(MonitorEvent::Enter { run_id: None }).await;
    tokio::time::sleep(Duration::from_millis(20_100)).await;
    assert_eq!(summary_calls(&api), 5);

    stage.dispatch(MonitorEvent::Leave).await;
    assert_eq!(stage.current_view(), MonitorView::default());

    tokio::time::sleep(Duration::from_secs(30)).await;
    assert_eq!(summary_calls(&api), 5);
}

#[tokio::test(start_paused = true)]
async fn test_slow_summary_never_overlaps() {
    let api = FakeControlPlane::new();
    api.monitor.ok(summary("r1", 1.0));
    api.monitor.set_delay(Duration::from_secs(7));
    let stage = stage_for(&api, MemoryRunIdentity::with_run("r1"));

    stage.dispatch(MonitorEvent::Enter { run_id: None }).await;
    // Calls at 0s, 7s and 14s; the 5s and 10s ticks collapse
    tokio::time::sleep(Duration::from_millis(15_000)).await;
    assert_eq!(summary_calls(&api), 3);

    stage.dispatch(MonitorEvent::Leave).await;
}

#[tokio::test(start_paused = true)]
async fn test_route_run_id_wins_over_store() {
    let api = FakeControlPlane::new();
    api.monitor.ok(summary("r7", 3.0));
    let stage = stage_for(&api, MemoryRunIdentity::with_run("r1"));

    stage
        .dispatch(MonitorEvent::Enter {
            run_id: Some(RunId::new("r7")),
        })
        .await;
    tokio::time::sleep(Duration::from_millis(10)).await;

    assert_eq!(stage.current_view().run_id, Some(RunId::new("r7")));
    assert_eq!(api.calls(), vec![Call::MonitorSummary(RunId::new("r7"))]);

    stage.dispatch(MonitorEvent::Leave).await;
}

#[tokio::test(start_paused = true)]
async fn test_missing_run_does_not_poll() {
    let api = FakeControlPlane::new();
    let stage = stage_for(&api, MemoryRunIdentity::new());

    stage.dispatch(MonitorEvent::Enter { run_id: None }).await;
    tokio::time::sleep(Duration::from_secs(20)).await;

    assert_eq!(
        stage.current_view().summary.error.as_deref(),
        Some(messages::MISSING_RUN)
    );
    assert!(api.calls().is_empty());
}
