//! Shared test fixtures

#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use motion_deployer::app::options::AppOptions;
use motion_deployer::app::state::AppState;
use motion_deployer::containers::engine::{ContainerEngine, EngineContainer, RunSpec};
use motion_deployer::errors::DeployerError;
use motion_deployer::models::history::HistoryEvent;
use motion_deployer::storage::history::{HistoryQuery, HistoryStore};
use motion_deployer::storage::layout::StorageLayout;

pub const FAKE_COMMIT: &str = "0123456789abcdef0123456789abcdef01234567";

/// In-memory container engine
#[derive(Default)]
pub struct FakeEngine {
    pub containers: Mutex<Vec<EngineContainer>>,
    pub runs: Mutex<Vec<RunSpec>>,
    /// Every call fails like an unreachable daemon
    pub unreachable: AtomicBool,
    /// `run` succeeds but the container is not listed yet
    pub lagging: AtomicBool,
    /// Lifecycle actions delete the container right after succeeding
    pub vanish_on_action: AtomicBool,
}

impl FakeEngine {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn with_container(self: Arc<Self>, name: &str, state: &str, status: &str) -> Arc<Self> {
        self.containers.lock().unwrap().push(EngineContainer {
            name: name.to_string(),
            state: state.to_string(),
            status: status.to_string(),
            created_at: Some("2024-05-01 10:00:00 +0000 UTC".to_string()),
        });
        self
    }

    pub fn state_of(&self, name: &str) -> Option<String> {
        self.containers
            .lock()
            .unwrap()
            .iter()
            .find(|c| c.name == name)
            .map(|c| c.state.clone())
    }

    pub fn run_count(&self) -> usize {
        self.runs.lock().unwrap().len()
    }

    fn check_reachable(&self, operation: &str) -> Result<(), DeployerError> {
        if self.unreachable.load(Ordering::SeqCst) {
            return Err(DeployerError::ContainerEngine {
                operation: operation.to_string(),
                message: "Cannot connect to the engine daemon".to_string(),
            });
        }
        Ok(())
    }

    fn set_state(&self, name: &str, state: &str, status: &str) -> Result<(), DeployerError> {
        let mut containers = self.containers.lock().unwrap();
        let Some(index) = containers.iter().position(|c| c.name == name) else {
            return Err(DeployerError::NotFound(format!("Container {} not found.", name)));
        };
        if self.vanish_on_action.load(Ordering::SeqCst) {
            containers.remove(index);
            return Ok(());
        }
        containers[index].state = state.to_string();
        containers[index].status = status.to_string();
        Ok(())
    }
}

#[async_trait]
impl ContainerEngine for FakeEngine {
    async fn list(&self, prefix: &str) -> Result<Vec<EngineContainer>, DeployerError> {
        self.check_reachable("list")?;
        Ok(self
            .containers
            .lock()
            .unwrap()
            .iter()
            .filter(|c| c.name.starts_with(prefix))
            .cloned()
            .collect())
    }

    async fn remove(&self, name: &str) -> Result<bool, DeployerError> {
        self.check_reachable("remove")?;
        let mut containers = self.containers.lock().unwrap();
        let before = containers.len();
        containers.retain(|c| c.name != name);
        Ok(containers.len() != before)
    }

    async fn run(&self, spec: &RunSpec) -> Result<String, DeployerError> {
        self.check_reachable("run")?;
        self.runs.lock().unwrap().push(spec.clone());
        if !self.lagging.load(Ordering::SeqCst) {
            self.containers.lock().unwrap().push(EngineContainer {
                name: spec.name.clone(),
                state: "running".to_string(),
                status: "Up 1 second".to_string(),
                created_at: None,
            });
        }
        Ok(format!("id-{}", spec.name))
    }

    async fn start(&self, name: &str) -> Result<(), DeployerError> {
        self.check_reachable("start")?;
        self.set_state(name, "running", "Up 1 second")
    }

    async fn stop(&self, name: &str) -> Result<(), DeployerError> {
        self.check_reachable("stop")?;
        self.set_state(name, "exited", "Exited (0) 1 second ago")
    }

    async fn restart(&self, name: &str) -> Result<(), DeployerError> {
        self.check_reachable("restart")?;
        self.set_state(name, "running", "Up 1 second")
    }
}

/// Write an executable shell script
#[cfg(unix)]
pub fn write_script(dir: &Path, name: &str, body: &str) -> PathBuf {
    use std::os::unix::fs::PermissionsExt;

    let path = dir.join(name);
    std::fs::write(&path, format!("#!/bin/sh\n{}\n", body)).unwrap();
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
    path
}

/// `git` that "clones" an empty checkout and reports [`FAKE_COMMIT`]
pub fn fake_git_ok() -> String {
    format!(
        r#"case "$1" in
  clone)
    for last; do :; done
    mkdir -p "$last"
    echo "Cloning into '$last'..." >&2
    ;;
  rev-parse)
    echo {}
    ;;
  *)
    exit 1
    ;;
esac"#,
        FAKE_COMMIT
    )
}

pub const FAKE_GIT_NOT_FOUND: &str = r#"echo "fatal: repository not found" >&2
exit 128"#;

/// `npm` whose build writes `dist/index.html` containing `$APP_TITLE`
pub const FAKE_NPM_OK: &str = r#"case "$1" in
  install)
    echo "added 1 package"
    ;;
  run)
    mkdir -p dist/assets
    echo "<h1>$APP_TITLE</h1>" > dist/index.html
    echo "console.log(1)" > dist/assets/app.js
    echo "build finished"
    ;;
esac"#;

/// `npm` whose build succeeds without producing `dist`
pub const FAKE_NPM_NO_DIST: &str = r#"echo "nothing to do""#;

/// `npm` whose build fails
pub const FAKE_NPM_BROKEN: &str = r#"case "$1" in
  install) echo "ok" ;;
  run) echo "error TS2322: type mismatch" >&2; exit 2 ;;
esac"#;

/// `npm` whose install never finishes
pub const FAKE_NPM_HANGS: &str = r#"echo "resolving packages"
exec sleep 30"#;

/// A service wired to a fake engine and fake toolchain scripts
pub struct Harness {
    pub dir: tempfile::TempDir,
    pub engine: Arc<FakeEngine>,
    pub state: AppState,
}

impl Harness {
    #[cfg(unix)]
    pub async fn new(git: &str, npm: &str) -> Self {
        Self::with_engine(git, npm, FakeEngine::new(), |_| {}).await
    }

    #[cfg(unix)]
    pub async fn with_engine(
        git: &str,
        npm: &str,
        engine: Arc<FakeEngine>,
        configure: impl FnOnce(&mut AppOptions),
    ) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let bin = dir.path().join("bin");
        std::fs::create_dir_all(&bin).unwrap();

        let mut options = AppOptions::default();
        options.layout = StorageLayout::under(dir.path());
        options.deploy.git_bin = write_script(&bin, "git", git).display().to_string();
        options.deploy.package_manager = write_script(&bin, "npm", npm).display().to_string();
        configure(&mut options);

        let state = AppState::with_engine(&options, engine.clone()).await.unwrap();
        Self { dir, engine, state }
    }

    pub fn layout(&self) -> &StorageLayout {
        &self.state.layout
    }

    /// Entries left under the workspace root
    pub fn workspace_entries(&self) -> usize {
        std::fs::read_dir(&self.layout().workspace_root)
            .map(|entries| entries.count())
            .unwrap_or(0)
    }

    pub async fn history(&self) -> Vec<HistoryEvent> {
        self.state.history.list(&HistoryQuery::default()).await.unwrap()
    }
}

/// Poll `history` until `check` passes or the deadline hits
pub async fn wait_for_history<F>(history: &HistoryStore, check: F) -> Vec<HistoryEvent>
where
    F: Fn(&[HistoryEvent]) -> bool,
{
    let deadline = tokio::time::Instant::now() + Duration::from_secs(10);
    loop {
        let events = history.list(&HistoryQuery::default()).await.unwrap();
        if check(&events) || tokio::time::Instant::now() > deadline {
            return events;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
}
