//! Storage layout configuration

use std::path::PathBuf;

use crate::errors::DeployerError;
use crate::filesys::dir::Dir;
use crate::filesys::file::File;

/// On-disk locations used by the service
#[derive(Debug, Clone)]
pub struct StorageLayout {
    /// Directory holding the history and settings files
    pub data_dir: PathBuf,

    /// Root of the published artifact directories, one per app
    pub publish_root: PathBuf,

    /// Parent of the per-session clone/build workspaces
    pub workspace_root: PathBuf,
}

impl StorageLayout {
    /// Create a new storage layout
    pub fn new(
        data_dir: impl Into<PathBuf>,
        publish_root: impl Into<PathBuf>,
        workspace_root: impl Into<PathBuf>,
    ) -> Self {
        Self {
            data_dir: data_dir.into(),
            publish_root: publish_root.into(),
            workspace_root: workspace_root.into(),
        }
    }

    /// Layout rooted entirely inside `base`, used by tests
    pub fn under(base: impl Into<PathBuf>) -> Self {
        let base = base.into();
        Self::new(base.join("data"), base.join("deployments"), base.join("work"))
    }

    /// Deployment and container action history
    pub fn history_file(&self) -> File {
        File::new(self.data_dir.join("deploy-history.json"))
    }

    /// Per-app settings
    pub fn settings_file(&self) -> File {
        File::new(self.data_dir.join("settings.json"))
    }

    /// Root of published artifacts
    pub fn publish_dir(&self) -> Dir {
        Dir::new(&self.publish_root)
    }

    /// Published artifact directory of one app
    pub fn app_publish_dir(&self, app: &str) -> Dir {
        self.publish_dir().subdir(app)
    }

    /// Parent of session workspaces
    pub fn workspace_dir(&self) -> Dir {
        Dir::new(&self.workspace_root)
    }

    /// Setup the storage layout (create directories)
    pub async fn setup(&self) -> Result<(), DeployerError> {
        Dir::new(&self.data_dir).create().await?;
        self.publish_dir().create().await?;
        self.workspace_dir().create().await?;
        Ok(())
    }
}

impl Default for StorageLayout {
    fn default() -> Self {
        Self::new("data", "deployments", std::env::temp_dir())
    }
}
