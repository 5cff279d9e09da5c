//! Per-session scratch directories

use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::errors::DeployerError;
use crate::filesys::dir::Dir;

/// Hands out unique workspaces under a root directory
#[derive(Debug, Clone)]
pub struct WorkspaceManager {
    root: PathBuf,
}

impl WorkspaceManager {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Create a fresh, empty workspace
    pub async fn acquire(&self) -> Result<Workspace, DeployerError> {
        let dir = Dir::create_temp_dir(&self.root, "deploy").await?;
        debug!("Acquired workspace {}", dir.path().display());
        Ok(Workspace {
            dir,
            released: false,
        })
    }

    /// Remove a workspace and everything in it. Failures are logged only.
    pub async fn release(&self, mut workspace: Workspace) {
        workspace.released = true;
        match workspace.dir.delete().await {
            Ok(()) => debug!("Released workspace {}", workspace.dir.path().display()),
            Err(e) => warn!(
                "Failed to remove workspace {}: {}",
                workspace.dir.path().display(),
                e
            ),
        }
    }
}

/// A scratch directory owned by one session.
///
/// Dropping a workspace that was never released removes it synchronously.
#[derive(Debug)]
pub struct Workspace {
    dir: Dir,
    released: bool,
}

impl Workspace {
    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Where the repository is cloned
    pub fn source_dir(&self) -> PathBuf {
        self.dir.path().join("source")
    }
}

impl Drop for Workspace {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        if let Err(e) = std::fs::remove_dir_all(self.dir.path()) {
            if e.kind() != std::io::ErrorKind::NotFound {
                warn!("Failed to remove workspace {}: {}", self.dir.path().display(), e);
            }
        }
    }
}
