//! Scripted control plane and fixtures shared by the stage tests

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use openapi_client::{
    DeployStatus, Environment, GpuOption, MonitorSummary, PrepareStatus, RedMetrics, RunId,
    RunPhase, SloMetrics, StepStatus, UploadResponse,
};
use persephone::errors::ConsoleError;
use persephone::http::ControlPlaneExt;

/// One scripted answer
#[derive(Debug, Clone)]
pub enum Reply<T> {
    Ok(T),
    Api(u16, Option<&'static str>),
    Transport,
}

impl<T: Clone> Reply<T> {
    fn to_result(&self) -> Result<T, ConsoleError> {
        match self {
            Reply::Ok(value) => Ok(value.clone()),
            Reply::Api(status, message) => {
                Err(ConsoleError::api(*status, message.map(str::to_string)))
            }
            Reply::Transport => Err(ConsoleError::Transport("connection refused".to_string())),
        }
    }
}

/// Replies are consumed in order; the last one repeats forever
pub struct Script<T> {
    replies: Mutex<VecDeque<Reply<T>>>,
    delay: Mutex<Duration>,
}

impl<T: Clone> Script<T> {
    fn new() -> Self {
        Self {
            replies: Mutex::new(VecDeque::new()),
            delay: Mutex::new(Duration::ZERO),
        }
    }

    pub fn push(&self, reply: Reply<T>) {
        self.replies.lock().unwrap().push_back(reply);
    }

    pub fn ok(&self, value: T) {
        self.push(Reply::Ok(value));
    }

    /// Drop pending replies and answer with `reply` from now on
    pub fn reset(&self, reply: Reply<T>) {
        let mut replies = self.replies.lock().unwrap();
        replies.clear();
        replies.push_back(reply);
    }

    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock().unwrap() = delay;
    }

    async fn next(&self) -> Result<T, ConsoleError> {
        let reply = {
            let mut replies = self.replies.lock().unwrap();
            if replies.len() > 1 {
                replies.pop_front()
            } else {
                replies.front().cloned()
            }
        };
        let delay = *self.delay.lock().unwrap();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        reply.unwrap_or(Reply::Transport).to_result()
    }
}

/// Recorded control-plane call
#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    Upload { file_name: String, size: usize },
    ListGpus(RunId),
    PrepareStart { run_id: RunId, gpu_id: Option<String> },
    PrepareStatus(RunId),
    DeployStart(RunId, Environment),
    DeployStatus(RunId, Environment),
    MonitorSummary(RunId),
}

pub struct FakeControlPlane {
    pub upload: Script<UploadResponse>,
    pub gpus: Script<Vec<GpuOption>>,
    pub prepare_start: Script<PrepareStatus>,
    pub prepare_status: Script<PrepareStatus>,
    pub deploy_start: Script<DeployStatus>,
    pub deploy_status: Script<DeployStatus>,
    pub monitor: Script<MonitorSummary>,
    calls: Mutex<Vec<Call>>,
}

impl FakeControlPlane {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            upload: Script::new(),
            gpus: Script::new(),
            prepare_start: Script::new(),
            prepare_status: Script::new(),
            deploy_start: Script::new(),
            deploy_status: Script::new(),
            monitor: Script::new(),
            calls: Mutex::new(Vec::new()),
        })
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn count(&self, matches: impl Fn(&Call) -> bool) -> usize {
        self.calls.lock().unwrap().iter().filter(|c| matches(c)).count()
    }

    fn record(&self, call: Call) {
        self.calls.lock().unwrap().push(call);
    }
}

#[async_trait]
impl ControlPlaneExt for FakeControlPlane {
    async fn upload(
        &self,
        file_name: String,
        contents: Vec<u8>,
    ) -> Result<UploadResponse, ConsoleError> {
        self.record(Call::Upload {
            file_name,
            size: contents.len(),
        });
        self.upload.next().await
    }

    async fn list_gpus(&self, run_id: &RunId) -> Result<Vec<GpuOption>, ConsoleError> {
        self.record(Call::ListGpus(run_id.clone()));
        self.gpus.next().await
    }

    async fn prepare_start(
        &self,
        run_id: &RunId,
        gpu_id: Option<&str>,
    ) -> Result<PrepareStatus, ConsoleError> {
        self.record(Call::PrepareStart {
            run_id: run_id.clone(),
            gpu_id: gpu_id.map(str::to_string),
        });
        self.prepare_start.next().await
    }

    async fn prepare_status(&self, run_id: &RunId) -> Result<PrepareStatus, ConsoleError> {
        self.record(Call::PrepareStatus(run_id.clone()));
        self.prepare_status.next().await
    }

    async fn deploy_start(
        &self,
        run_id: &RunId,
        env: Environment,
    ) -> Result<DeployStatus, ConsoleError> {
        self.record(Call::DeployStart(run_id.clone(), env));
        self.deploy_start.next().await
    }

    async fn deploy_status(
        &self,
        run_id: &RunId,
        env: Environment,
    ) -> Result<DeployStatus, ConsoleError> {
        self.record(Call::DeployStatus(run_id.clone(), env));
        self.deploy_status.next().await
    }

    async fn monitor_summary(&self, run_id: &RunId) -> Result<MonitorSummary, ConsoleError> {
        self.record(Call::MonitorSummary(run_id.clone()));
        self.monitor.next().await
    }
}

// =============================== FIXTURES ================================== //

pub fn gpu(id: &str) -> GpuOption {
    GpuOption {
        id: id.to_string(),
        name: format!("NVIDIA {}", id.to_uppercase()),
        memory_gb: Some(80.0),
        provider: Some("on-prem".to_string()),
    }
}

pub fn prepare_status(run_id: &str, phase: RunPhase) -> PrepareStatus {
    PrepareStatus {
        run_id: RunId::new(run_id),
        phase,
        steps: vec![StepStatus {
            name: "pull-image".to_string(),
            status: phase,
            message: None,
            completed_at: None,
        }],
        updated_at: None,
    }
}

pub fn deploy_status(run_id: &str, environment: Environment, phase: RunPhase) -> DeployStatus {
    DeployStatus {
        run_id: RunId::new(run_id),
        environment,
        phase,
        message: None,
        version: Some("v1".to_string()),
        started_at: None,
        updated_at: None,
    }
}

pub fn summary(run_id: &str, rps: f64) -> MonitorSummary {
    MonitorSummary {
        run_id: RunId::new(run_id),
        red: RedMetrics {
            requests_per_second: rps,
            error_rate_percent: 0.5,
            p95_duration_ms: 120.0,
        },
        slo: SloMetrics {
            availability_percent: 99.9,
            latency_p95_ms: 130.0,
        },
        updated_at: None,
    }
}

/// Let spawned pollers and joined requests run to their next suspension
pub async fn settle() {
    for _ in 0..10 {
        tokio::task::yield_now().await;
    }
}
