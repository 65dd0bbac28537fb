//! Tracking of upload destinations that are not yet finalized.
//!
//! Every accepted upload registers its destination path here before the
//! receive worker starts. The shutdown path unlinks whatever is still
//! registered, so a node killed mid-upload leaves no partial files behind.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use dashmap::DashSet;
use tracing::{debug, warn};

/// The set of upload destinations the server has reserved but not yet
/// finalized.
#[derive(Default)]
pub struct PendingUploads {
    paths: DashSet<PathBuf>,
}

impl PendingUploads {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Register `path` and return the guard that deregisters it.
    pub fn register(self: &Arc<Self>, path: PathBuf) -> UploadGuard {
        self.paths.insert(path.clone());
        UploadGuard {
            pending: self.clone(),
            path,
        }
    }

    /// Whether `path` belongs to an upload still in flight.
    pub fn contains(&self, path: &Path) -> bool {
        self.paths.contains(path)
    }

    /// Take every still-pending destination; used by the shutdown unlink
    /// pass.
    pub fn drain(&self) -> Vec<PathBuf> {
        let paths: Vec<PathBuf> = self.paths.iter().map(|p| p.key().clone()).collect();
        self.paths.clear();
        paths
    }

    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }
}

/// Scope-bound registration of one upload destination.
///
/// Dropping the guard deregisters the path, whichever way the owning
/// worker exits.
pub struct UploadGuard {
    pending: Arc<PendingUploads>,
    path: PathBuf,
}

impl UploadGuard {
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Delete the partial file after a failed transfer. A destination the
    /// worker never got around to creating is tolerated.
    pub async fn fail(&self) {
        match tokio::fs::remove_file(&self.path).await {
            Ok(()) => debug!("removed partial upload {}", self.path.display()),
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => warn!(
                "failed to remove partial upload {}: {}",
                self.path.display(),
                e
            ),
        }
    }
}

impl Drop for UploadGuard {
    fn drop(&mut self) {
        self.pending.paths.remove(&self.path);
    }
}
