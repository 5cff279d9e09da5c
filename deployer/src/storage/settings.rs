//! Per-app settings file management

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde_json::Value;
use tokio::sync::Mutex;
use tracing::warn;

use crate::errors::DeployerError;
use crate::filesys::file::File;
use crate::models::deployment::DeployRequest;
use crate::models::settings::{AppSettings, AppSettingsPatch};
use crate::utils::iso_timestamp;

/// Settings for all apps, one JSON object keyed by app name
pub struct SettingsStore {
    file: File,
    lock: Mutex<()>,
}

impl SettingsStore {
    pub fn new(file: File) -> Self {
        Self {
            file,
            lock: Mutex::new(()),
        }
    }

    /// Every app's normalized settings
    pub async fn all(&self) -> Result<BTreeMap<String, AppSettings>, DeployerError> {
        let _guard = self.lock.lock().await;
        self.read_all().await
    }

    pub async fn get(&self, app: &str) -> Result<Option<AppSettings>, DeployerError> {
        Ok(self.all().await?.remove(app))
    }

    /// Merge `patch` into the app's settings and persist
    pub async fn upsert(
        &self,
        app: &str,
        patch: AppSettingsPatch,
    ) -> Result<AppSettings, DeployerError> {
        let _guard = self.lock.lock().await;
        let mut all = self.read_all().await?;
        let current = all.remove(app).unwrap_or_else(|| AppSettings::new(app));
        let next = current.merge(patch).normalized(app);
        all.insert(app.to_string(), next.clone());
        self.file.write_json(&all).await?;
        Ok(next)
    }

    /// Returns whether anything was removed
    pub async fn delete(&self, app: &str) -> Result<bool, DeployerError> {
        let _guard = self.lock.lock().await;
        let mut all = self.read_all().await?;
        if all.remove(app).is_none() {
            return Ok(false);
        }
        self.file.write_json(&all).await?;
        Ok(true)
    }

    /// Remember the configuration of a successful deploy
    pub async fn record_deploy(
        &self,
        request: &DeployRequest,
        commit: Option<&str>,
        at: DateTime<Utc>,
    ) -> Result<AppSettings, DeployerError> {
        let patch = AppSettingsPatch {
            repo_url: Some(request.repo_url.clone()),
            branch: Some(request.branch().to_string()),
            framework: request.framework.clone(),
            app_path: request.app_path.clone(),
            last_commit: commit.map(str::to_string),
            last_deployed_at: Some(iso_timestamp(at)),
            ..Default::default()
        };
        self.upsert(&request.name, patch).await
    }

    async fn read_all(&self) -> Result<BTreeMap<String, AppSettings>, DeployerError> {
        self.file.ensure_exists("{}").await?;
        let contents = self.file.read_string().await?;
        let Ok(Value::Object(entries)) = serde_json::from_str::<Value>(&contents) else {
            warn!("Settings file {} is unreadable, treating as empty", self.file.path().display());
            return Ok(BTreeMap::new());
        };

        let mut result = BTreeMap::new();
        for (app, value) in entries {
            if !value.is_object() {
                continue;
            }
            match serde_json::from_value::<AppSettings>(value) {
                Ok(settings) => {
                    let settings = settings.normalized(&app);
                    result.insert(app, settings);
                }
                Err(e) => warn!("Skipping malformed settings for {}: {}", app, e),
            }
        }
        Ok(result)
    }
}
