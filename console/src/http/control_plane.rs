//! The control-plane contract stage controllers depend on

use async_trait::async_trait;
use openapi_client::{
    DeployStatus, Environment, GpuOption, MonitorSummary, PrepareStatus, RunId, UploadResponse,
};

use crate::errors::ConsoleError;

/// Control-plane API trait for testability
#[async_trait]
pub trait ControlPlaneExt: Send + Sync {
    /// `POST /upload` (multipart, field `file`)
    async fn upload(&self, file_name: String, contents: Vec<u8>)
        -> Result<UploadResponse, ConsoleError>;

    /// `GET /prepare/gpus`
    async fn list_gpus(&self, run_id: &RunId) -> Result<Vec<GpuOption>, ConsoleError>;

    /// `POST /prepare/start`
    async fn prepare_start(
        &self,
        run_id: &RunId,
        gpu_id: Option<&str>,
    ) -> Result<PrepareStatus, ConsoleError>;

    /// `GET /prepare/status`
    async fn prepare_status(&self, run_id: &RunId) -> Result<PrepareStatus, ConsoleError>;

    /// `POST /deploy/start`
    async fn deploy_start(
        &self,
        run_id: &RunId,
        env: Environment,
    ) -> Result<DeployStatus, ConsoleError>;

    /// `GET /deploy/status`
    async fn deploy_status(
        &self,
        run_id: &RunId,
        env: Environment,
    ) -> Result<DeployStatus, ConsoleError>;

    /// `GET /monitor/summary`
    async fn monitor_summary(&self, run_id: &RunId) -> Result<MonitorSummary, ConsoleError>;
}
