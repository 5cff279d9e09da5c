//! Deployment orchestrator

use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::Utc;
use futures::Stream;
use tokio::sync::{mpsc, watch, OwnedMutexGuard};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::containers::engine::ContainerEngine;
use crate::containers::inventory::Inventory;
use crate::containers::naming::ContainerNaming;
use crate::deploy::builder::{BuildOutcome, BuildPipeline};
use crate::deploy::fsm::{SessionEvent, Step};
use crate::deploy::git::SourceFetcher;
use crate::deploy::process::ProcessRunner;
use crate::deploy::publish::{PublishOptions, PublishedApp, Publisher};
use crate::deploy::session::DeploymentSession;
use crate::deploy::sink::{LogSink, LOG_RETENTION, STREAM_BUFFER};
use crate::deploy::workspace::WorkspaceManager;
use crate::errors::DeployerError;
use crate::models::app::{AppInfo, ContainerState};
use crate::models::deployment::{DeployRequest, DeploymentStatus};
use crate::models::history::HistoryEvent;
use crate::storage::history::HistoryStore;
use crate::storage::layout::StorageLayout;
use crate::storage::settings::SettingsStore;
use crate::utils::parse_env_text;

pub const COMPLETE_LINE: &str = "Deployment complete.";
pub const CANCELLED_LINE: &str = "Deployment cancelled by client.";

/// Deploy pipeline options
#[derive(Debug, Clone)]
pub struct DeployOptions {
    /// Version control binary
    pub git_bin: String,

    /// Package manager used for install and build
    pub package_manager: String,

    /// Build output directory inside the checkout
    pub build_output_dir: String,

    /// Wall-clock limit per subprocess
    pub step_timeout: Option<Duration>,

    /// Hold a per-app lock while publishing
    pub serialize_app_deploys: bool,

    /// Serving container settings
    pub publish: PublishOptions,
}

impl Default for DeployOptions {
    fn default() -> Self {
        Self {
            git_bin: "git".to_string(),
            package_manager: "npm".to_string(),
            build_output_dir: "dist".to_string(),
            step_timeout: None,
            serialize_app_deploys: true,
            publish: PublishOptions::default(),
        }
    }
}

/// Live log of one session, ends when the session is done
pub struct DeployStream {
    session_id: String,
    receiver: mpsc::Receiver<String>,
}

impl DeployStream {
    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub async fn next_chunk(&mut self) -> Option<String> {
        self.receiver.recv().await
    }

    /// Read until the session finishes
    pub async fn collect_text(mut self) -> String {
        let mut text = String::new();
        while let Some(chunk) = self.receiver.recv().await {
            text.push_str(&chunk);
        }
        text
    }

    pub fn into_stream(self) -> impl Stream<Item = String> + Send + 'static {
        futures::stream::unfold(self.receiver, |mut rx| async move {
            rx.recv().await.map(|chunk| (chunk, rx))
        })
    }
}

/// Publish locks keyed by app name
#[derive(Default)]
struct AppLocks {
    locks: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl AppLocks {
    async fn lock(&self, app: &str) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.locks.lock().unwrap_or_else(|e| e.into_inner());
            locks.entry(app.to_string()).or_default().clone()
        };
        lock.lock_owned().await
    }

    /// Forget `app`'s lock once nobody holds or waits for it
    fn release(&self, app: &str, guard: OwnedMutexGuard<()>) {
        drop(guard);
        let mut locks = self.locks.lock().unwrap_or_else(|e| e.into_inner());
        if locks.get(app).is_some_and(|lock| Arc::strong_count(lock) == 1) {
            locks.remove(app);
        }
    }

    fn len(&self) -> usize {
        self.locks.lock().unwrap_or_else(|e| e.into_inner()).len()
    }
}

/// Counts one running session until dropped
struct InFlight(Arc<watch::Sender<usize>>);

impl InFlight {
    fn enter(counter: &Arc<watch::Sender<usize>>) -> Self {
        counter.send_modify(|n| *n += 1);
        Self(counter.clone())
    }
}

impl Drop for InFlight {
    fn drop(&mut self) {
        self.0.send_modify(|n| *n -= 1);
    }
}

/// Runs deploy sessions: clone, build, publish, record
pub struct Orchestrator {
    options: DeployOptions,
    naming: ContainerNaming,
    workspaces: WorkspaceManager,
    fetcher: SourceFetcher,
    builder: BuildPipeline,
    publisher: Publisher,
    inventory: Arc<Inventory>,
    history: Arc<HistoryStore>,
    settings: Arc<SettingsStore>,
    app_locks: AppLocks,
    shutdown: CancellationToken,
    in_flight: Arc<watch::Sender<usize>>,
}

impl Orchestrator {
    pub fn new(
        options: DeployOptions,
        layout: StorageLayout,
        engine: Arc<dyn ContainerEngine>,
        inventory: Arc<Inventory>,
        history: Arc<HistoryStore>,
        settings: Arc<SettingsStore>,
    ) -> Self {
        let runner = ProcessRunner::new(options.step_timeout);
        let naming = inventory.naming().clone();
        Self {
            workspaces: WorkspaceManager::new(layout.workspace_root.clone()),
            fetcher: SourceFetcher::new(&options.git_bin, runner.clone()),
            builder: BuildPipeline::node(&options.package_manager, runner),
            publisher: Publisher::new(
                engine,
                naming.clone(),
                layout,
                options.publish.clone(),
            ),
            naming,
            inventory,
            history,
            settings,
            app_locks: AppLocks::default(),
            shutdown: CancellationToken::new(),
            in_flight: Arc::new(watch::channel(0).0),
            options,
        }
    }

    pub fn options(&self) -> &DeployOptions {
        &self.options
    }

    /// Validate `request` and start a session in the background.
    ///
    /// Dropping the returned stream cancels the session unless it is
    /// already publishing.
    pub fn start(self: &Arc<Self>, request: DeployRequest) -> Result<DeployStream, DeployerError> {
        // Counted before the check so shutdown cannot miss it
        let in_flight = InFlight::enter(&self.in_flight);
        if self.shutdown.is_cancelled() {
            return Err(DeployerError::ShuttingDown);
        }
        let request = request.validated()?;

        let (log, receiver) = LogSink::channel(STREAM_BUFFER, LOG_RETENTION);
        let container = self.naming.container_name(&request.name);
        let session = Arc::new(DeploymentSession::new(
            request,
            container,
            log,
            self.shutdown.child_token(),
        ));
        let session_id = session.id().to_string();
        info!(
            "Deployment {} accepted for {} ({} @ {})",
            session_id,
            session.app(),
            session.request().repo_url,
            session.request().branch()
        );

        let done = CancellationToken::new();
        tokio::spawn(watch_client(session.clone(), done.clone()));

        let this = Arc::clone(self);
        tokio::spawn(async move {
            this.supervise(session, done).await;
            drop(in_flight);
        });

        Ok(DeployStream {
            session_id,
            receiver,
        })
    }

    /// Cancel running sessions and wait until each has released its
    /// workspace and written history. Later `start` calls are refused.
    pub async fn shutdown(&self) {
        self.shutdown.cancel();
        let mut running = self.in_flight.subscribe();
        let pending = *running.borrow();
        if pending > 0 {
            info!("Waiting for {} deployment(s) to stop", pending);
        }
        let _ = running.wait_for(|n| *n == 0).await;
    }

    /// Run the pipeline, then release the workspace, write history and the
    /// terminal line, whatever the pipeline did.
    async fn supervise(self: Arc<Self>, session: Arc<DeploymentSession>, done: CancellationToken) {
        if let Err(e) = session.advance(SessionEvent::Accept).await {
            warn!("Session {}: {}", session.id(), e);
        }
        self.write_preamble(&session).await;

        let result = match self.workspaces.acquire().await {
            Ok(workspace) => {
                let source_dir = workspace.source_dir();
                let pipeline = tokio::spawn({
                    let this = Arc::clone(&self);
                    let session = Arc::clone(&session);
                    async move { this.run_pipeline(&session, &source_dir).await }
                });
                let result = match pipeline.await {
                    Ok(result) => result,
                    Err(e) => Err(DeployerError::Internal(format!(
                        "deployment task failed: {}",
                        e
                    ))),
                };
                self.workspaces.release(workspace).await;
                result
            }
            Err(e) => Err(e),
        };

        // Publishing is never interrupted, so its failures stay failures
        let step = session.step().await;
        let (status, message, event) = match result {
            Ok(_) => (DeploymentStatus::Success, None, SessionEvent::Published),
            Err(_) if session.is_cancelled() && step != Step::Publishing => (
                DeploymentStatus::Cancelled,
                Some(CANCELLED_LINE.to_string()),
                SessionEvent::Cancel,
            ),
            Err(e) => {
                let message = e.to_string();
                (
                    DeploymentStatus::Failed,
                    Some(message.clone()),
                    SessionEvent::Fail(message),
                )
            }
        };
        if let Err(e) = session.advance(event).await {
            warn!("Session {}: {}", session.id(), e);
        }

        let record = session.to_record(status, message.clone(), Utc::now());
        let duration_ms = record.duration_ms;
        self.history.record(HistoryEvent::Deployment(record)).await;

        let log = session.log();
        match status {
            DeploymentStatus::Success => {
                info!("Deployment {} of {} complete in {}ms", session.id(), session.app(), duration_ms);
                log.line(COMPLETE_LINE).await;
            }
            DeploymentStatus::Cancelled => {
                info!("Deployment {} of {} cancelled by client", session.id(), session.app());
                log.line(CANCELLED_LINE).await;
            }
            DeploymentStatus::Failed => {
                let message = message.unwrap_or_default();
                error!("Deployment {} of {} failed: {}", session.id(), session.app(), message);
                log.line(format!("Deployment failed: {}", message)).await;
            }
        }

        done.cancel();
    }

    async fn write_preamble(&self, session: &DeploymentSession) {
        let log = session.log();
        let request = session.request();
        log.line(format!("Starting deployment for {}", request.name)).await;
        log.line(format!("Repository: {}", request.repo_url)).await;
        log.line(format!("Branch: {}", request.branch())).await;
        if let Some(framework) = &request.framework {
            log.line(format!("Framework: {}", framework)).await;
        }
        if let Some(app_path) = &request.app_path {
            log.line(format!("App Path: {}", app_path)).await;
        }
    }

    async fn run_pipeline(
        &self,
        session: &DeploymentSession,
        source_dir: &Path,
    ) -> Result<PublishedApp, DeployerError> {
        let log = session.log();
        let cancel = session.cancel_token();
        let request = session.request();

        // Cloning
        write_marker(log, Step::Cloning).await;
        let commit = self
            .fetcher
            .fetch(&request.repo_url, request.branch(), source_dir, log, cancel)
            .await?;
        if session.set_commit(&commit) {
            log.line(format!("Checked out commit: {}", commit)).await;
        }
        if cancel.is_cancelled() {
            return Err(DeployerError::Cancelled);
        }
        session.advance(SessionEvent::Cloned).await?;

        // Building
        write_marker(log, Step::Building).await;
        let env = request
            .variables
            .as_deref()
            .map(parse_env_text)
            .unwrap_or_default();
        if !env.is_empty() {
            debug!("Passing {} variables to the build", env.len());
        }
        if self.builder.build(source_dir, &env, log, cancel).await? == BuildOutcome::Cancelled {
            return Err(DeployerError::Cancelled);
        }
        if cancel.is_cancelled() {
            return Err(DeployerError::Cancelled);
        }
        session.advance(SessionEvent::Built).await?;

        // Publishing
        write_marker(log, Step::Publishing).await;
        let build_output = source_dir.join(&self.options.build_output_dir);
        let guard = if self.options.serialize_app_deploys {
            Some(self.app_locks.lock(session.app()).await)
        } else {
            None
        };
        let published = self
            .publisher
            .publish(session.app(), &build_output, log)
            .await;
        if let Some(guard) = guard {
            self.app_locks.release(session.app(), guard);
        }
        let published = published?;

        let mut pending = AppInfo::new(
            published.app.clone(),
            published.container.clone(),
            ContainerState::Running,
            published.status.clone(),
        );
        pending.url = published.url.clone();
        self.inventory.record_pending(pending);

        if let Err(e) = self
            .settings
            .record_deploy(request, session.commit(), Utc::now())
            .await
        {
            warn!("Failed to store settings for {}: {}", session.app(), e);
        }

        log.line(format!("Container: {}", published.container)).await;
        if let Some(url) = &published.url {
            log.line(format!("Available at: {}", url)).await;
        }
        Ok(published)
    }
}

async fn write_marker(log: &LogSink, step: Step) {
    if let Some(marker) = step.marker() {
        log.line(marker).await;
    }
}

/// Cancel the session when the stream reader goes away
async fn watch_client(session: Arc<DeploymentSession>, done: CancellationToken) {
    let log = session.log().clone();
    let cancel = session.cancel_token().clone();
    let id = session.id().to_string();
    // Only the clones above may outlive this point
    drop(session);

    tokio::select! {
        _ = log.closed() => {
            debug!("Client of deployment {} disconnected", id);
            cancel.cancel();
        }
        _ = done.cancelled() => {}
    }
}
