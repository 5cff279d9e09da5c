//! Managed app / container models

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Normalized container state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContainerState {
    Running,
    Restarting,
    Exited,
}

impl ContainerState {
    /// Normalize the engine's human readable state text
    pub fn from_engine_text(raw: &str) -> Self {
        let raw = raw.to_lowercase();
        if raw.contains("running") {
            ContainerState::Running
        } else if raw.contains("restart") {
            ContainerState::Restarting
        } else {
            ContainerState::Exited
        }
    }
}

/// One managed app as shown on the dashboard
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppInfo {
    pub name: String,
    pub container: String,
    pub state: ContainerState,
    pub status: String,
    pub updated_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub repo_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub branch: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub framework: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_deployed_at: Option<String>,
}

impl AppInfo {
    pub fn new(
        name: impl Into<String>,
        container: impl Into<String>,
        state: ContainerState,
        status: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            container: container.into(),
            state,
            status: status.into(),
            updated_at: Utc::now(),
            url: None,
            repo_url: None,
            branch: None,
            framework: None,
            last_deployed_at: None,
        }
    }
}

/// Lifecycle action on a managed container
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContainerAction {
    Start,
    Stop,
    Restart,
    Remove,
}

impl ContainerAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            ContainerAction::Start => "start",
            ContainerAction::Stop => "stop",
            ContainerAction::Restart => "restart",
            ContainerAction::Remove => "remove",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_lowercase().as_str() {
            "start" => Some(ContainerAction::Start),
            "stop" => Some(ContainerAction::Stop),
            "restart" => Some(ContainerAction::Restart),
            "remove" => Some(ContainerAction::Remove),
            _ => None,
        }
    }
}

impl std::fmt::Display for ContainerAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
