//! One run of the deploy pipeline

use std::sync::OnceLock;

use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;

use crate::deploy::fsm::{SessionEvent, Step, StepMachine};
use crate::deploy::sink::LogSink;
use crate::errors::DeployerError;
use crate::models::deployment::{DeployRequest, DeploymentStatus};
use crate::models::history::DeploymentRecord;
use crate::utils::generate_uuid;

/// Shared state of a running session.
///
/// The pipeline task advances it; the supervising task finalizes it even if
/// the pipeline panics.
pub struct DeploymentSession {
    id: String,
    request: DeployRequest,
    container: String,
    started_at: DateTime<Utc>,
    machine: RwLock<StepMachine>,
    commit: OnceLock<String>,
    log: LogSink,
    cancel: CancellationToken,
}

impl DeploymentSession {
    pub fn new(
        request: DeployRequest,
        container: String,
        log: LogSink,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            id: generate_uuid(),
            request,
            container,
            started_at: Utc::now(),
            machine: RwLock::new(StepMachine::new()),
            commit: OnceLock::new(),
            log,
            cancel,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn request(&self) -> &DeployRequest {
        &self.request
    }

    pub fn app(&self) -> &str {
        &self.request.name
    }

    pub fn container(&self) -> &str {
        &self.container
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    pub fn log(&self) -> &LogSink {
        &self.log
    }

    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    pub async fn step(&self) -> Step {
        self.machine.read().await.step()
    }

    pub async fn error(&self) -> Option<String> {
        self.machine.read().await.error().map(str::to_string)
    }

    /// Feed an event to the state machine
    pub async fn advance(&self, event: SessionEvent) -> Result<Step, DeployerError> {
        let mut machine = self.machine.write().await;
        machine.process(event).map_err(DeployerError::Internal)
    }

    /// Record the checked-out commit. Only the first call has any effect.
    pub fn set_commit(&self, commit: &str) -> bool {
        self.commit.set(commit.to_string()).is_ok()
    }

    pub fn commit(&self) -> Option<&str> {
        self.commit.get().map(String::as_str)
    }

    /// History record for a finished session
    pub fn to_record(
        &self,
        status: DeploymentStatus,
        message: Option<String>,
        completed_at: DateTime<Utc>,
    ) -> DeploymentRecord {
        let duration_ms = (completed_at - self.started_at).num_milliseconds().max(0) as u64;
        DeploymentRecord {
            id: self.id.clone(),
            app: self.request.name.clone(),
            container: self.container.clone(),
            repo_url: self.request.repo_url.clone(),
            branch: self.request.branch().to_string(),
            framework: self.request.framework.clone(),
            commit: self.commit().map(str::to_string),
            status,
            started_at: self.started_at,
            completed_at,
            duration_ms,
            message,
        }
    }
}
