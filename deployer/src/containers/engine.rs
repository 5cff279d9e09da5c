//! Container engine abstraction

use std::path::PathBuf;

use async_trait::async_trait;

use crate::errors::DeployerError;

/// A container as reported by the engine
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineContainer {
    pub name: String,
    /// Raw state text, e.g. `running`
    pub state: String,
    /// Human readable status, e.g. `Up 2 minutes`
    pub status: String,
    /// Raw creation time text, engine specific
    pub created_at: Option<String>,
}

/// Everything needed to start a serving container
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunSpec {
    pub name: String,
    pub image: String,
    /// Host directory mounted read-only
    pub mount_source: PathBuf,
    pub mount_target: String,
    pub network: Option<String>,
    pub restart_policy: String,
    pub labels: Vec<(String, String)>,
}

/// Container engine operations used by the service
#[async_trait]
pub trait ContainerEngine: Send + Sync {
    /// All containers, any state, whose name starts with `prefix`
    async fn list(&self, prefix: &str) -> Result<Vec<EngineContainer>, DeployerError>;

    /// Force-remove a container. Returns `false` when it did not exist.
    async fn remove(&self, name: &str) -> Result<bool, DeployerError>;

    /// Create and start a container, returning its id
    async fn run(&self, spec: &RunSpec) -> Result<String, DeployerError>;

    async fn start(&self, name: &str) -> Result<(), DeployerError>;

    async fn stop(&self, name: &str) -> Result<(), DeployerError>;

    async fn restart(&self, name: &str) -> Result<(), DeployerError>;
}
