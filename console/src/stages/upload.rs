//! Upload stage: single request, mints the run id

use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use openapi_client::RunId;
use tracing::{error, info};

use crate::errors::ConsoleError;
use crate::filesys::file::File;
use crate::http::ControlPlaneExt;
use crate::identity::RunIdentityExt;
use crate::lifecycle::{gate, GateDecision, Preconditions, Route, Stage};
use crate::stages::{lock, messages};

/// Upload view model
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UploadView {
    pub is_uploading: bool,
    pub error: Option<String>,
    /// Set once an upload succeeded
    pub run_id: Option<RunId>,
}

impl UploadView {
    pub fn gate(&self) -> GateDecision {
        gate(
            None,
            &Preconditions::new(Stage::Upload, self.run_id.as_ref()).in_flight(self.is_uploading),
        )
    }
}

/// Upload events
#[derive(Debug, Clone)]
pub enum UploadEvent {
    /// Submit the chosen artifact, if any
    Submit { artifact: Option<PathBuf> },
}

/// Upload stage controller
pub struct UploadStage {
    api: Arc<dyn ControlPlaneExt>,
    identity: Arc<dyn RunIdentityExt>,
    view: Mutex<UploadView>,
}

impl UploadStage {
    pub fn new(api: Arc<dyn ControlPlaneExt>, identity: Arc<dyn RunIdentityExt>) -> Self {
        Self {
            api,
            identity,
            view: Mutex::new(UploadView::default()),
        }
    }

    pub fn current_view(&self) -> UploadView {
        lock(&self.view).clone()
    }

    /// Returns the prepare route once the upload succeeded
    pub async fn dispatch(&self, event: UploadEvent) -> Option<Route> {
        match event {
            UploadEvent::Submit { artifact } => self.submit(artifact).await,
        }
    }

    async fn submit(&self, artifact: Option<PathBuf>) -> Option<Route> {
        let Some(path) = artifact else {
            lock(&self.view).error = Some(messages::UPLOAD_NO_FILE.to_string());
            return None;
        };

        {
            let mut view = lock(&self.view);
            if !view.gate().can_start {
                return None;
            }
            view.is_uploading = true;
            view.error = None;
        }

        let result = self.upload(File::new(path)).await;

        let mut view = lock(&self.view);
        view.is_uploading = false;
        match result {
            Ok(run_id) => {
                view.run_id = Some(run_id.clone());
                Some(Route::new(Stage::Prepare, Some(run_id)))
            }
            Err(e) => {
                error!("Upload failed: {}", e);
                view.error = Some(
                    e.user_message()
                        .unwrap_or_else(|| messages::UPLOAD_FAILED.to_string()),
                );
                None
            }
        }
    }

    async fn upload(&self, artifact: File) -> Result<RunId, ConsoleError> {
        if !artifact.exists().await {
            return Err(ConsoleError::Precondition(format!(
                "Artifact not found: {}",
                artifact.path().display()
            )));
        }
        let contents = artifact.read_bytes().await?;
        let file_name = artifact.name().unwrap_or_else(|| "artifact".to_string());

        info!("Uploading {} ({} bytes)", file_name, contents.len());
        let response = self.api.upload(file_name, contents).await?;
        if response.run_id.is_empty() {
            return Err(ConsoleError::Precondition(
                messages::UPLOAD_EMPTY_RUN_ID.to_string(),
            ));
        }

        self.identity.remember(&response.run_id).await;
        info!("Upload accepted, run {}", response.run_id);
        Ok(response.run_id)
    }
}
