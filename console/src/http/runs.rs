//! Run lifecycle API client

use async_trait::async_trait;
use openapi_client::{
    DeployStatus, Environment, GpuOption, MonitorSummary, PrepareStatus, RunId, UploadResponse,
};

use crate::errors::ConsoleError;
use crate::http::client::HttpClient;
use crate::http::control_plane::ControlPlaneExt;

#[async_trait]
impl ControlPlaneExt for HttpClient {
    async fn upload(
        &self,
        file_name: String,
        contents: Vec<u8>,
    ) -> Result<UploadResponse, ConsoleError> {
        self.post_multipart("/upload", "file", file_name, contents)
            .await
    }

    async fn list_gpus(&self, run_id: &RunId) -> Result<Vec<GpuOption>, ConsoleError> {
        self.get("/prepare/gpus", &[("runId", run_id.as_str())])
            .await
    }

    async fn prepare_start(
        &self,
        run_id: &RunId,
        gpu_id: Option<&str>,
    ) -> Result<PrepareStatus, ConsoleError> {
        let mut query = vec![("runId", run_id.as_str())];
        if let Some(gpu_id) = gpu_id {
            query.push(("gpuId", gpu_id));
        }
        self.post("/prepare/start", &query).await
    }

    async fn prepare_status(&self, run_id: &RunId) -> Result<PrepareStatus, ConsoleError> {
        self.get("/prepare/status", &[("runId", run_id.as_str())])
            .await
    }

    async fn deploy_start(
        &self,
        run_id: &RunId,
        env: Environment,
    ) -> Result<DeployStatus, ConsoleError> {
        self.post(
            "/deploy/start",
            &[("runId", run_id.as_str()), ("env", env.as_str())],
        )
        .await
    }

    async fn deploy_status(
        &self,
        run_id: &RunId,
        env: Environment,
    ) -> Result<DeployStatus, ConsoleError> {
        self.get(
            "/deploy/status",
            &[("runId", run_id.as_str()), ("env", env.as_str())],
        )
        .await
    }

    async fn monitor_summary(&self, run_id: &RunId) -> Result<MonitorSummary, ConsoleError> {
        self.get("/monitor/summary", &[("runId", run_id.as_str())])
            .await
    }
}
