//! Resolves the active run id from navigation or the persisted fallback

use async_trait::async_trait;
use openapi_client::RunId;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::filesys::file::File;
use crate::storage::current_run::{load_current_run, save_current_run, CurrentRun};

/// Run identity trait for testability
#[async_trait]
pub trait RunIdentityExt: Send + Sync {
    /// Resolve the active run.
    ///
    /// An explicit id wins and overwrites the persisted value. Without one
    /// the persisted value is returned. `None` means no run is known yet.
    async fn resolve(&self, explicit: Option<&RunId>) -> Option<RunId>;

    /// Persist a freshly minted run id (upload success)
    async fn remember(&self, run_id: &RunId);
}

/// Run identity backed by `current_run.json`
pub struct FileRunIdentity {
    file: File,
    cached: RwLock<Option<RunId>>,
}

impl FileRunIdentity {
    pub fn new(file: File) -> Self {
        Self {
            file,
            cached: RwLock::new(None),
        }
    }

    async fn persist(&self, run_id: &RunId) {
        {
            let mut cached = self.cached.write().await;
            *cached = Some(run_id.clone());
        }

        if let Err(e) = save_current_run(&self.file, &CurrentRun::new(run_id.clone())).await {
            warn!(
                "Failed to persist current run {} to {}: {}",
                run_id,
                self.file.path().display(),
                e
            );
        }
    }
}

#[async_trait]
impl RunIdentityExt for FileRunIdentity {
    async fn resolve(&self, explicit: Option<&RunId>) -> Option<RunId> {
        if let Some(run_id) = explicit.filter(|id| !id.is_empty()) {
            debug!("Using explicit run id {}", run_id);
            self.persist(run_id).await;
            return Some(run_id.clone());
        }

        {
            let cached = self.cached.read().await;
            if let Some(run_id) = cached.as_ref() {
                return Some(run_id.clone());
            }
        }

        match load_current_run(&self.file).await {
            Ok(Some(current)) => {
                let mut cached = self.cached.write().await;
                *cached = Some(current.run_id.clone());
                Some(current.run_id)
            }
            Ok(None) => None,
            Err(e) => {
                warn!("Ignoring unreadable current run file: {}", e);
                None
            }
        }
    }

    async fn remember(&self, run_id: &RunId) {
        info!("Current run is now {}", run_id);
        self.persist(run_id).await;
    }
}

/// In-memory run identity, for embedding and tests
#[derive(Default)]
pub struct MemoryRunIdentity {
    current: RwLock<Option<RunId>>,
}

impl MemoryRunIdentity {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_run(run_id: impl Into<RunId>) -> Self {
        Self {
            current: RwLock::new(Some(run_id.into())),
        }
    }
}

#[async_trait]
impl RunIdentityExt for MemoryRunIdentity {
    async fn resolve(&self, explicit: Option<&RunId>) -> Option<RunId> {
        if let Some(run_id) = explicit.filter(|id| !id.is_empty()) {
            *self.current.write().await = Some(run_id.clone());
            return Some(run_id.clone());
        }
        self.current.read().await.clone()
    }

    async fn remember(&self, run_id: &RunId) {
        *self.current.write().await = Some(run_id.clone());
    }
}
