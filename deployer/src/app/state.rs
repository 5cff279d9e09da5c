//! Application state management

use std::sync::Arc;

use tracing::info;

use crate::app::options::AppOptions;
use crate::containers::docker::DockerCli;
use crate::containers::engine::ContainerEngine;
use crate::containers::inventory::Inventory;
use crate::containers::naming::ContainerNaming;
use crate::deploy::orchestrator::Orchestrator;
use crate::errors::DeployerError;
use crate::storage::history::HistoryStore;
use crate::storage::layout::StorageLayout;
use crate::storage::settings::SettingsStore;

/// Main application state
pub struct AppState {
    /// On-disk locations
    pub layout: StorageLayout,

    /// Deployment and container action history
    pub history: Arc<HistoryStore>,

    /// Per-app settings
    pub settings: Arc<SettingsStore>,

    /// Managed app listing and lifecycle actions
    pub inventory: Arc<Inventory>,

    /// Deploy sessions
    pub orchestrator: Arc<Orchestrator>,
}

impl AppState {
    /// Initialize application state with the configured container engine
    pub async fn init(options: &AppOptions) -> Result<Self, DeployerError> {
        let engine: Arc<dyn ContainerEngine> =
            Arc::new(DockerCli::new(&options.containers.engine_bin));
        Self::with_engine(options, engine).await
    }

    /// Initialize application state around an existing engine
    pub async fn with_engine(
        options: &AppOptions,
        engine: Arc<dyn ContainerEngine>,
    ) -> Result<Self, DeployerError> {
        info!("Initializing application state...");

        let layout = options.layout.clone();
        layout.setup().await?;

        let history = Arc::new(HistoryStore::new(layout.history_file()));
        let settings = Arc::new(SettingsStore::new(layout.settings_file()));

        let naming = ContainerNaming::new(
            &options.containers.prefix,
            options.containers.public_base_url.clone(),
        );
        let inventory = Arc::new(Inventory::new(
            engine.clone(),
            naming,
            history.clone(),
            settings.clone(),
            layout.clone(),
        ));

        let orchestrator = Arc::new(Orchestrator::new(
            options.deploy.clone(),
            layout.clone(),
            engine,
            inventory.clone(),
            history.clone(),
            settings.clone(),
        ));

        Ok(Self {
            layout,
            history,
            settings,
            inventory,
            orchestrator,
        })
    }

    /// Stop running deploy sessions so their workspaces are released
    pub async fn shutdown(&self) -> Result<(), DeployerError> {
        info!("Shutting down application state...");
        self.orchestrator.shutdown().await;
        Ok(())
    }
}
