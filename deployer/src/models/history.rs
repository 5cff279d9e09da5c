//! History (audit log) records
//!
//! Records are stored as a JSON array. Each element carries a `kind` tag;
//! elements written before the tag existed are deployment records. Reading
//! always goes through [`HistoryEvent::decode`], which fills defaults for
//! missing fields and drops elements that cannot be recovered.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::models::app::ContainerAction;
use crate::models::deployment::{DeploymentStatus, DEFAULT_BRANCH};
use crate::utils::parse_timestamp;

/// One deploy session outcome
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeploymentRecord {
    pub id: String,
    pub app: String,
    pub container: String,
    pub repo_url: String,
    pub branch: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub framework: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub commit: Option<String>,
    pub status: DeploymentStatus,
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
    pub duration_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// Outcome of a container lifecycle action
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActionStatus {
    Success,
    Failed,
}

/// One container lifecycle action
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContainerActionRecord {
    pub id: String,
    pub app: String,
    pub container: String,
    pub action: ContainerAction,
    pub status: ActionStatus,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// A history entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum HistoryEvent {
    Deployment(DeploymentRecord),
    ContainerAction(ContainerActionRecord),
}

impl HistoryEvent {
    pub fn id(&self) -> &str {
        match self {
            HistoryEvent::Deployment(r) => &r.id,
            HistoryEvent::ContainerAction(r) => &r.id,
        }
    }

    pub fn app(&self) -> &str {
        match self {
            HistoryEvent::Deployment(r) => &r.app,
            HistoryEvent::ContainerAction(r) => &r.app,
        }
    }

    /// Time the event finished, used for newest-first ordering
    pub fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            HistoryEvent::Deployment(r) => r.completed_at,
            HistoryEvent::ContainerAction(r) => r.timestamp,
        }
    }

    /// Decode a stored element, tolerating legacy and partial shapes.
    ///
    /// Returns `None` for unknown kinds and for records without an id, an
    /// app or any usable timestamp.
    pub fn decode(value: &Value) -> Option<HistoryEvent> {
        let obj = value.as_object()?;
        match obj.get("kind").and_then(Value::as_str) {
            None | Some("deployment") => decode_deployment(obj).map(HistoryEvent::Deployment),
            Some("container_action") => {
                decode_container_action(obj).map(HistoryEvent::ContainerAction)
            }
            Some(_) => None,
        }
    }
}

fn text(obj: &Map<String, Value>, key: &str) -> Option<String> {
    obj.get(key)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

fn timestamp(obj: &Map<String, Value>, key: &str) -> Option<DateTime<Utc>> {
    obj.get(key).and_then(Value::as_str).and_then(parse_timestamp)
}

fn decode_deployment(obj: &Map<String, Value>) -> Option<DeploymentRecord> {
    let id = text(obj, "id")?;
    let app = text(obj, "app")?;

    let started = timestamp(obj, "startedAt");
    let completed = timestamp(obj, "completedAt");
    let (started_at, completed_at) = match (started, completed) {
        (Some(s), Some(c)) => (s, c),
        (Some(s), None) => (s, s),
        (None, Some(c)) => (c, c),
        (None, None) => return None,
    };

    let duration_ms = obj
        .get("durationMs")
        .and_then(Value::as_f64)
        .filter(|ms| ms.is_finite() && *ms >= 0.0)
        .map(|ms| ms.round() as u64)
        .unwrap_or_else(|| (completed_at - started_at).num_milliseconds().max(0) as u64);

    let status = obj
        .get("status")
        .and_then(Value::as_str)
        .and_then(DeploymentStatus::parse)
        .unwrap_or(DeploymentStatus::Success);

    Some(DeploymentRecord {
        container: text(obj, "container").unwrap_or_default(),
        repo_url: text(obj, "repoUrl").unwrap_or_default(),
        branch: text(obj, "branch").unwrap_or_else(|| DEFAULT_BRANCH.to_string()),
        framework: text(obj, "framework"),
        commit: text(obj, "commit"),
        message: text(obj, "message"),
        id,
        app,
        status,
        started_at,
        completed_at,
        duration_ms,
    })
}

fn decode_container_action(obj: &Map<String, Value>) -> Option<ContainerActionRecord> {
    let action = obj
        .get("action")
        .and_then(Value::as_str)
        .and_then(ContainerAction::parse)?;

    let status = match obj.get("status").and_then(Value::as_str) {
        Some("failed") => ActionStatus::Failed,
        _ => ActionStatus::Success,
    };

    Some(ContainerActionRecord {
        id: text(obj, "id")?,
        app: text(obj, "app")?,
        container: text(obj, "container").unwrap_or_default(),
        action,
        status,
        timestamp: timestamp(obj, "timestamp")?,
        message: text(obj, "message"),
    })
}
