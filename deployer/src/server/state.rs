//! Server state

use std::sync::Arc;

use crate::app::state::AppState;
use crate::containers::inventory::Inventory;
use crate::deploy::orchestrator::Orchestrator;
use crate::storage::history::HistoryStore;
use crate::storage::settings::SettingsStore;

/// Server state shared across handlers
pub struct ServerState {
    pub orchestrator: Arc<Orchestrator>,
    pub inventory: Arc<Inventory>,
    pub history: Arc<HistoryStore>,
    pub settings: Arc<SettingsStore>,
}

impl ServerState {
    pub fn new(
        orchestrator: Arc<Orchestrator>,
        inventory: Arc<Inventory>,
        history: Arc<HistoryStore>,
        settings: Arc<SettingsStore>,
    ) -> Self {
        Self {
            orchestrator,
            inventory,
            history,
            settings,
        }
    }

    pub fn from_app_state(app_state: &AppState) -> Self {
        Self::new(
            app_state.orchestrator.clone(),
            app_state.inventory.clone(),
            app_state.history.clone(),
            app_state.settings.clone(),
        )
    }
}
