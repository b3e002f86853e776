//! User-facing stage messages

pub const MISSING_RUN: &str = "No run id found. Go back to the upload stage.";
pub const MISSING_RUN_DEPLOY: &str = "No run id found. Go back to the previous stages.";

pub const UPLOAD_NO_FILE: &str = "Please choose an artifact file.";
pub const UPLOAD_FAILED: &str = "Could not upload the artifact. Try again later.";
pub const UPLOAD_EMPTY_RUN_ID: &str = "The control plane did not return a run id.";

pub const PREPARE_STATUS_FAILED: &str = "Could not fetch the prepare status.";
pub const PREPARE_START_FAILED: &str = "Could not start preparation.";
pub const PREPARE_SELECT_GPU: &str = "Select a GPU for hosting before starting preparation.";
pub const PREPARE_NO_GPU: &str = "No free GPUs. Try again later or release resources.";
pub const GPU_LIST_FAILED: &str = "Could not fetch the GPU list.";

pub const DEPLOY_START_FAILED: &str = "Could not start the deployment.";
pub const DEPLOY_STATUS_FAILED: &str = "Could not fetch the deployment status.";
pub const DEPLOY_STARTED: &str = "Deployment started. Refresh the status to check progress.";

pub const MONITOR_FAILED: &str = "Could not load monitoring metrics.";
