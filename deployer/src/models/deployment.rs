//! Deployment models

use std::path::{Component, Path};

use serde::{Deserialize, Serialize};

use crate::errors::DeployerError;

pub const DEFAULT_BRANCH: &str = "main";

/// A deploy request as submitted by the dashboard
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeployRequest {
    /// App identifier, also the container and artifact directory suffix
    #[serde(default)]
    pub name: String,

    /// Repository to clone (http or https)
    #[serde(default)]
    pub repo_url: String,

    /// Branch to check out, `main` when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub branch: Option<String>,

    /// Framework label, informational only
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub framework: Option<String>,

    /// Sub-path of the app inside the repository, informational only
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub app_path: Option<String>,

    /// `KEY=value` lines exported to the build steps
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub variables: Option<String>,
}

impl DeployRequest {
    pub fn new(name: impl Into<String>, repo_url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            repo_url: repo_url.into(),
            ..Default::default()
        }
    }

    pub fn with_branch(mut self, branch: impl Into<String>) -> Self {
        self.branch = Some(branch.into());
        self
    }

    /// Branch to deploy
    pub fn branch(&self) -> &str {
        self.branch.as_deref().unwrap_or(DEFAULT_BRANCH)
    }

    /// Trim every field, apply defaults and reject anything that is not safe
    /// to use as a container name, path segment or clone source.
    pub fn validated(self) -> Result<DeployRequest, DeployerError> {
        let name = self.name.trim().to_string();
        let repo_url = self.repo_url.trim().to_string();

        if name.is_empty() || repo_url.is_empty() {
            return Err(DeployerError::Validation(
                "Both name and repoUrl are required.".to_string(),
            ));
        }
        if !is_safe_name(&name) {
            return Err(DeployerError::Validation(format!(
                "Invalid app name {:?}: use letters, digits, '.', '_' or '-', starting with a letter or digit.",
                name
            )));
        }
        match url::Url::parse(&repo_url) {
            Ok(url) if matches!(url.scheme(), "http" | "https") => {}
            _ => {
                return Err(DeployerError::Validation(format!(
                    "Invalid repoUrl {:?}: expected an http(s) URL.",
                    repo_url
                )));
            }
        }

        let branch = non_empty(self.branch).unwrap_or_else(|| DEFAULT_BRANCH.to_string());
        if branch.starts_with('-') {
            return Err(DeployerError::Validation(format!(
                "Invalid branch {:?}.",
                branch
            )));
        }

        let app_path = non_empty(self.app_path);
        if let Some(path) = &app_path {
            let relative = Path::new(path)
                .components()
                .all(|c| matches!(c, Component::Normal(_) | Component::CurDir));
            if !relative {
                return Err(DeployerError::Validation(format!(
                    "Invalid appPath {:?}: expected a relative path inside the repository.",
                    path
                )));
            }
        }

        Ok(DeployRequest {
            name,
            repo_url,
            branch: Some(branch),
            framework: non_empty(self.framework),
            app_path,
            variables: self.variables.filter(|v| !v.trim().is_empty()),
        })
    }
}

/// `[A-Za-z0-9][A-Za-z0-9_.-]*`
pub fn is_safe_name(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) if first.is_ascii_alphanumeric() => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-'))
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Terminal outcome of a deployment session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeploymentStatus {
    Success,
    Failed,
    Cancelled,
}

impl DeploymentStatus {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_lowercase().as_str() {
            "success" => Some(DeploymentStatus::Success),
            "failed" => Some(DeploymentStatus::Failed),
            "cancelled" | "canceled" => Some(DeploymentStatus::Cancelled),
            _ => None,
        }
    }
}
