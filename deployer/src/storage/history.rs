//! Append-only deployment / container action history

use serde_json::Value;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::errors::DeployerError;
use crate::filesys::file::File;
use crate::models::history::HistoryEvent;

/// Filter for [`HistoryStore::list`]
#[derive(Debug, Clone, Default)]
pub struct HistoryQuery {
    pub app: Option<String>,
    pub limit: Option<usize>,
}

/// History kept as one JSON array file.
///
/// Appends are read-modify-write of the whole file under a single mutex, so
/// two writers never both extend the same stale snapshot.
pub struct HistoryStore {
    file: File,
    lock: Mutex<()>,
}

impl HistoryStore {
    pub fn new(file: File) -> Self {
        Self {
            file,
            lock: Mutex::new(()),
        }
    }

    pub fn file(&self) -> &File {
        &self.file
    }

    /// Append one event
    pub async fn append(&self, event: HistoryEvent) -> Result<(), DeployerError> {
        let _guard = self.lock.lock().await;
        let mut raw = self.read_raw().await?;
        debug!("Appending history event {} for {}", event.id(), event.app());
        raw.push(serde_json::to_value(&event)?);
        self.file.write_json(&raw).await
    }

    /// Append, logging instead of failing. History outages never block a deploy.
    pub async fn record(&self, event: HistoryEvent) {
        let id = event.id().to_string();
        if let Err(e) = self.append(event).await {
            warn!("Failed to write history event {}: {}", id, e);
        }
    }

    /// All decodable events in append order
    pub async fn read_all(&self) -> Result<Vec<HistoryEvent>, DeployerError> {
        let raw = {
            let _guard = self.lock.lock().await;
            self.read_raw().await?
        };
        Ok(raw.iter().filter_map(HistoryEvent::decode).collect())
    }

    /// Newest first, optionally filtered by app and truncated
    pub async fn list(&self, query: &HistoryQuery) -> Result<Vec<HistoryEvent>, DeployerError> {
        let mut events = self.read_all().await?;
        events.reverse();
        // stable: equal timestamps keep newest-appended first
        events.sort_by(|a, b| b.occurred_at().cmp(&a.occurred_at()));

        if let Some(app) = query.app.as_deref().filter(|a| !a.is_empty()) {
            events.retain(|e| e.app() == app);
        }
        if let Some(limit) = query.limit {
            events.truncate(limit);
        }
        Ok(events)
    }

    async fn read_raw(&self) -> Result<Vec<Value>, DeployerError> {
        self.file.ensure_exists("[]").await?;
        let contents = self.file.read_string().await?;
        match serde_json::from_str::<Value>(&contents) {
            Ok(Value::Array(items)) => Ok(items),
            Ok(_) => {
                warn!("History file {} is not an array, starting over", self.file.path().display());
                Ok(Vec::new())
            }
            Err(e) => {
                warn!("History file {} is corrupt ({}), starting over", self.file.path().display(), e);
                Ok(Vec::new())
            }
        }
    }
}
