//! Managed app inventory and lifecycle actions

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, RwLock};

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use crate::containers::engine::{ContainerEngine, EngineContainer};
use crate::containers::naming::ContainerNaming;
use crate::errors::DeployerError;
use crate::models::app::{AppInfo, ContainerAction, ContainerState};
use crate::models::deployment::is_safe_name;
use crate::models::history::{ActionStatus, ContainerActionRecord, HistoryEvent};
use crate::storage::history::HistoryStore;
use crate::storage::layout::StorageLayout;
use crate::storage::settings::SettingsStore;
use crate::utils::{generate_uuid, parse_timestamp};

/// Apps published moments ago that the engine may not report yet
#[derive(Debug, Default)]
pub struct PendingApps {
    entries: RwLock<HashMap<String, AppInfo>>,
}

impl PendingApps {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn upsert(&self, info: AppInfo) {
        let mut entries = self.entries.write().unwrap_or_else(|e| e.into_inner());
        entries.insert(info.name.clone(), info);
    }

    pub fn remove(&self, app: &str) -> Option<AppInfo> {
        let mut entries = self.entries.write().unwrap_or_else(|e| e.into_inner());
        entries.remove(app)
    }

    pub fn get(&self, app: &str) -> Option<AppInfo> {
        let entries = self.entries.read().unwrap_or_else(|e| e.into_inner());
        entries.get(app).cloned()
    }

    pub fn len(&self) -> usize {
        let entries = self.entries.read().unwrap_or_else(|e| e.into_inner());
        entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// All entries, dropping the ones the engine now reports
    fn settle(&self, observed: &HashSet<String>) -> Vec<AppInfo> {
        let mut entries = self.entries.write().unwrap_or_else(|e| e.into_inner());
        let snapshot = entries.values().cloned().collect();
        entries.retain(|name, _| !observed.contains(name));
        snapshot
    }
}

/// Result of [`Inventory::act`]
#[derive(Debug, Clone, PartialEq)]
pub enum ActionOutcome {
    Updated(AppInfo),
    Removed { purged: bool },
}

/// Lists managed apps and applies lifecycle actions to their containers
pub struct Inventory {
    engine: Arc<dyn ContainerEngine>,
    naming: ContainerNaming,
    pending: PendingApps,
    history: Arc<HistoryStore>,
    settings: Arc<SettingsStore>,
    layout: StorageLayout,
}

impl Inventory {
    pub fn new(
        engine: Arc<dyn ContainerEngine>,
        naming: ContainerNaming,
        history: Arc<HistoryStore>,
        settings: Arc<SettingsStore>,
        layout: StorageLayout,
    ) -> Self {
        Self {
            engine,
            naming,
            pending: PendingApps::new(),
            history,
            settings,
            layout,
        }
    }

    pub fn naming(&self) -> &ContainerNaming {
        &self.naming
    }

    pub fn pending(&self) -> &PendingApps {
        &self.pending
    }

    /// Remember a just-published app until the engine reports it
    pub fn record_pending(&self, info: AppInfo) {
        debug!("Pending app {} ({})", info.name, info.container);
        self.pending.upsert(info);
    }

    /// Managed apps, live and pending, sorted by name. Never fails: an
    /// unreachable engine yields just the pending entries.
    pub async fn list(&self) -> Vec<AppInfo> {
        let containers = match self.engine.list(self.naming.prefix()).await {
            Ok(containers) => containers,
            Err(e) => {
                warn!("Container listing failed, showing pending apps only: {}", e);
                Vec::new()
            }
        };

        let live: Vec<AppInfo> = containers
            .into_iter()
            .filter_map(|c| self.app_info(c))
            .collect();
        let observed: HashSet<String> = live.iter().map(|a| a.name.clone()).collect();
        let pending = self.pending.settle(&observed);

        let mut apps = merge_apps(live, pending);
        self.enrich(&mut apps).await;
        apps
    }

    /// Apply `action` to a managed container and record it in history
    pub async fn act(
        &self,
        container: &str,
        action: ContainerAction,
        purge: bool,
    ) -> Result<ActionOutcome, DeployerError> {
        let app = self.naming.app_name(container).ok_or_else(|| {
            DeployerError::Validation(format!(
                "Container {} is not managed by this service.",
                container
            ))
        })?;
        // The app name doubles as a path segment under the publish root
        if !is_safe_name(app) {
            return Err(DeployerError::Validation(format!(
                "Invalid container name {:?}.",
                container
            )));
        }

        info!("Container action {} on {}", action, container);
        match action {
            ContainerAction::Remove => self.remove(app, container, purge).await,
            ContainerAction::Start | ContainerAction::Stop | ContainerAction::Restart => {
                let result = match action {
                    ContainerAction::Start => self.engine.start(container).await,
                    ContainerAction::Stop => self.engine.stop(container).await,
                    _ => self.engine.restart(container).await,
                };
                if let Err(e) = result {
                    self.record_action(app, container, action, Err(&e)).await;
                    return Err(e);
                }
                self.record_action(app, container, action, Ok(None)).await;

                let mut current = self
                    .engine
                    .list(self.naming.prefix())
                    .await?
                    .into_iter()
                    .filter(|c| c.name == container)
                    .filter_map(|c| self.app_info(c))
                    .collect::<Vec<_>>();
                self.enrich(&mut current).await;
                current
                    .pop()
                    .map(ActionOutcome::Updated)
                    .ok_or_else(|| DeployerError::ContainerVanished(container.to_string()))
            }
        }
    }

    async fn remove(
        &self,
        app: &str,
        container: &str,
        purge: bool,
    ) -> Result<ActionOutcome, DeployerError> {
        let existed = match self.engine.remove(container).await {
            Ok(existed) => existed,
            Err(e) => {
                self.record_action(app, container, ContainerAction::Remove, Err(&e))
                    .await;
                return Err(e);
            }
        };

        self.pending.remove(app);
        let purged = purge && self.purge_artifacts(app).await;

        if existed {
            let note = purged.then(|| "published files purged".to_string());
            self.record_action(app, container, ContainerAction::Remove, Ok(note))
                .await;
        } else {
            debug!("Container {} was already removed", container);
        }

        Ok(ActionOutcome::Removed { purged })
    }

    async fn purge_artifacts(&self, app: &str) -> bool {
        let dir = self.layout.app_publish_dir(app);
        match dir.delete().await {
            Ok(()) => {
                info!("Purged published files at {}", dir.path().display());
                true
            }
            Err(e) => {
                warn!("Failed to purge {}: {}", dir.path().display(), e);
                false
            }
        }
    }

    async fn record_action(
        &self,
        app: &str,
        container: &str,
        action: ContainerAction,
        result: Result<Option<String>, &DeployerError>,
    ) {
        let (status, message) = match result {
            Ok(note) => (ActionStatus::Success, note),
            Err(e) => (ActionStatus::Failed, Some(e.to_string())),
        };
        self.history
            .record(HistoryEvent::ContainerAction(ContainerActionRecord {
                id: generate_uuid(),
                app: app.to_string(),
                container: container.to_string(),
                action,
                status,
                timestamp: Utc::now(),
                message,
            }))
            .await;
    }

    fn app_info(&self, container: EngineContainer) -> Option<AppInfo> {
        let app = self.naming.app_name(&container.name)?.to_string();
        let state_text = if container.state.trim().is_empty() {
            &container.status
        } else {
            &container.state
        };

        let mut info = AppInfo::new(
            app.clone(),
            container.name.clone(),
            ContainerState::from_engine_text(state_text),
            container.status.clone(),
        );
        if let Some(at) = container.created_at.as_deref().and_then(parse_engine_time) {
            info.updated_at = at;
        }
        info.url = self.naming.public_url(&app);
        Some(info)
    }

    async fn enrich(&self, apps: &mut [AppInfo]) {
        if apps.is_empty() {
            return;
        }
        let settings = match self.settings.all().await {
            Ok(settings) => settings,
            Err(e) => {
                warn!("Could not read app settings: {}", e);
                return;
            }
        };
        for app in apps.iter_mut() {
            let Some(stored) = settings.get(&app.name) else {
                continue;
            };
            app.repo_url = app.repo_url.take().or_else(|| stored.repo_url.clone());
            app.branch = app.branch.take().or_else(|| stored.branch.clone());
            app.framework = app.framework.take().or_else(|| stored.framework.clone());
            app.last_deployed_at = app
                .last_deployed_at
                .take()
                .or_else(|| stored.last_deployed_at.clone());
        }
    }
}

/// Union of live and pending apps, one entry per name, sorted by name.
///
/// Live entries win; a pending entry only contributes its URL when the live
/// one has none.
pub fn merge_apps(live: Vec<AppInfo>, pending: Vec<AppInfo>) -> Vec<AppInfo> {
    let mut pending: HashMap<String, AppInfo> = pending
        .into_iter()
        .map(|info| (info.name.clone(), info))
        .collect();

    let mut merged: Vec<AppInfo> = Vec::new();
    let mut seen = HashSet::new();
    for mut info in live {
        if !seen.insert(info.name.clone()) {
            continue;
        }
        if let Some(placeholder) = pending.remove(&info.name) {
            if info.url.is_none() {
                info.url = placeholder.url;
            }
        }
        merged.push(info);
    }
    merged.extend(pending.into_values());
    merged.sort_by(|a, b| a.name.cmp(&b.name));
    merged
}

/// Engine creation times look like `2024-05-01 10:00:00 +0000 UTC`
fn parse_engine_time(raw: &str) -> Option<DateTime<Utc>> {
    if let Some(at) = parse_timestamp(raw) {
        return Some(at);
    }
    let head = raw.split_whitespace().take(3).collect::<Vec<_>>().join(" ");
    DateTime::parse_from_str(&head, "%Y-%m-%d %H:%M:%S %z")
        .ok()
        .map(|at| at.with_timezone(&Utc))
}
