//! Per-app settings

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::utils::{iso_timestamp, parse_timestamp};

/// Persisted metadata for one app
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppSettings {
    #[serde(default)]
    pub app: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owner: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub public_env: Option<BTreeMap<String, String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secrets: Option<BTreeMap<String, String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub domain: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub repo_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub branch: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub framework: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub app_path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_commit: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_deployed_at: Option<String>,
}

/// Partial update; absent fields keep their stored value, empty strings clear it
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppSettingsPatch {
    pub notes: Option<String>,
    pub owner: Option<String>,
    pub public_env: Option<BTreeMap<String, String>>,
    pub secrets: Option<BTreeMap<String, String>>,
    pub domain: Option<String>,
    pub repo_url: Option<String>,
    pub branch: Option<String>,
    pub framework: Option<String>,
    pub app_path: Option<String>,
    pub last_commit: Option<String>,
    pub last_deployed_at: Option<String>,
}

impl AppSettings {
    pub fn new(app: impl Into<String>) -> Self {
        Self {
            app: app.into(),
            ..Default::default()
        }
    }

    /// Overlay a patch onto these settings
    pub fn merge(mut self, patch: AppSettingsPatch) -> Self {
        fn take<T>(slot: &mut Option<T>, value: Option<T>) {
            if value.is_some() {
                *slot = value;
            }
        }
        take(&mut self.notes, patch.notes);
        take(&mut self.owner, patch.owner);
        take(&mut self.public_env, patch.public_env);
        take(&mut self.secrets, patch.secrets);
        take(&mut self.domain, patch.domain);
        take(&mut self.repo_url, patch.repo_url);
        take(&mut self.branch, patch.branch);
        take(&mut self.framework, patch.framework);
        take(&mut self.app_path, patch.app_path);
        take(&mut self.last_commit, patch.last_commit);
        take(&mut self.last_deployed_at, patch.last_deployed_at);
        self
    }

    /// Trim text, drop empty values and blank env keys, and keep
    /// `lastDeployedAt` only when it is a valid timestamp.
    pub fn normalized(self, app: &str) -> Self {
        fn clean(value: Option<String>) -> Option<String> {
            value
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        }
        fn clean_env(env: Option<BTreeMap<String, String>>) -> Option<BTreeMap<String, String>> {
            let env: BTreeMap<String, String> = env?
                .into_iter()
                .map(|(k, v)| (k.trim().to_string(), v))
                .filter(|(k, _)| !k.is_empty())
                .collect();
            (!env.is_empty()).then_some(env)
        }

        Self {
            app: app.to_string(),
            notes: clean(self.notes),
            owner: clean(self.owner),
            public_env: clean_env(self.public_env),
            secrets: clean_env(self.secrets),
            domain: clean(self.domain),
            repo_url: clean(self.repo_url),
            branch: clean(self.branch),
            framework: clean(self.framework),
            app_path: clean(self.app_path),
            last_commit: clean(self.last_commit),
            last_deployed_at: self
                .last_deployed_at
                .as_deref()
                .and_then(parse_timestamp)
                .map(iso_timestamp),
        }
    }
}
