//! Inventory tests against an in-memory engine

use std::sync::atomic::Ordering;
use std::sync::Arc;

use motion_deployer::containers::inventory::{ActionOutcome, Inventory};
use motion_deployer::containers::naming::ContainerNaming;
use motion_deployer::errors::DeployerError;
use motion_deployer::models::app::{AppInfo, ContainerAction, ContainerState};
use motion_deployer::models::history::{ActionStatus, HistoryEvent};
use motion_deployer::storage::history::{HistoryQuery, HistoryStore};
use motion_deployer::storage::layout::StorageLayout;
use motion_deployer::storage::settings::SettingsStore;

use crate::common::FakeEngine;

struct Fixture {
    _dir: tempfile::TempDir,
    layout: StorageLayout,
    history: Arc<HistoryStore>,
    inventory: Inventory,
}

async fn fixture(engine: Arc<FakeEngine>) -> Fixture {
    let dir = tempfile::tempdir().unwrap();
    let layout = StorageLayout::under(dir.path());
    layout.setup().await.unwrap();
    let history = Arc::new(HistoryStore::new(layout.history_file()));
    let settings = Arc::new(SettingsStore::new(layout.settings_file()));
    let naming = ContainerNaming::new(
        "static_",
        Some(url::Url::parse("https://apps.example.com/").unwrap()),
    );
    let inventory = Inventory::new(engine, naming, history.clone(), settings, layout.clone());
    Fixture {
        _dir: dir,
        layout,
        history,
        inventory,
    }
}

async fn action_events(history: &HistoryStore) -> Vec<(ContainerAction, ActionStatus)> {
    history
        .list(&HistoryQuery::default())
        .await
        .unwrap()
        .into_iter()
        .filter_map(|event| match event {
            HistoryEvent::ContainerAction(record) => Some((record.action, record.status)),
            _ => None,
        })
        .collect()
}

#[tokio::test]
async fn test_list_only_managed_containers() {
    let engine = FakeEngine::new()
        .with_container("static_docs", "exited", "Exited (0) 2 hours ago")
        .with_container("static_blog", "running", "Up 3 hours")
        .with_container("postgres", "running", "Up 3 days");
    let f = fixture(engine).await;

    let apps = f.inventory.list().await;
    let names: Vec<&str> = apps.iter().map(|a| a.name.as_str()).collect();
    assert_eq!(names, vec!["blog", "docs"]);
    assert_eq!(apps[0].state, ContainerState::Running);
    assert_eq!(apps[1].state, ContainerState::Exited);
    assert_eq!(apps[0].url.as_deref(), Some("https://apps.example.com/blog"));
}

#[tokio::test]
async fn test_unreachable_engine_shows_pending_only() {
    let engine = FakeEngine::new().with_container("static_docs", "running", "Up");
    engine.unreachable.store(true, Ordering::SeqCst);
    let f = fixture(engine).await;

    assert!(f.inventory.list().await.is_empty());

    f.inventory.record_pending(AppInfo::new(
        "fresh",
        "static_fresh",
        ContainerState::Running,
        "Up just now",
    ));
    let apps = f.inventory.list().await;
    assert_eq!(apps.len(), 1);
    assert_eq!(apps[0].name, "fresh");
}

#[tokio::test]
async fn test_pending_dropped_once_observed() {
    let engine = FakeEngine::new();
    let f = fixture(engine.clone()).await;
    f.inventory.record_pending(AppInfo::new(
        "docs",
        "static_docs",
        ContainerState::Running,
        "Up just now",
    ));

    let apps = f.inventory.list().await;
    assert_eq!(apps.len(), 1);
    assert_eq!(f.inventory.pending().len(), 1);

    let _ = engine.with_container("static_docs", "running", "Up 2 seconds");
    let apps = f.inventory.list().await;
    assert_eq!(apps.len(), 1);
    assert_eq!(apps[0].status, "Up 2 seconds");
    assert!(f.inventory.pending().is_empty());
}

#[tokio::test]
async fn test_stop_updates_state_and_records_event() {
    let engine = FakeEngine::new().with_container("static_docs", "running", "Up 1 hour");
    let f = fixture(engine.clone()).await;

    let outcome = f
        .inventory
        .act("static_docs", ContainerAction::Stop, false)
        .await
        .unwrap();

    let ActionOutcome::Updated(info) = outcome else {
        panic!("expected updated app info");
    };
    assert_eq!(info.state, ContainerState::Exited);
    assert_eq!(engine.state_of("static_docs").as_deref(), Some("exited"));
    assert_eq!(
        action_events(&f.history).await,
        vec![(ContainerAction::Stop, ActionStatus::Success)]
    );
}

#[tokio::test]
async fn test_container_vanishing_after_action() {
    let engine = FakeEngine::new().with_container("static_docs", "running", "Up");
    engine.vanish_on_action.store(true, Ordering::SeqCst);
    let f = fixture(engine).await;

    let err = f
        .inventory
        .act("static_docs", ContainerAction::Restart, false)
        .await
        .unwrap_err();
    assert!(matches!(err, DeployerError::ContainerVanished(_)));
}

#[tokio::test]
async fn test_start_missing_container_records_failure() {
    let f = fixture(FakeEngine::new()).await;

    let err = f
        .inventory
        .act("static_ghost", ContainerAction::Start, false)
        .await
        .unwrap_err();
    assert!(matches!(err, DeployerError::NotFound(_)));
    assert_eq!(
        action_events(&f.history).await,
        vec![(ContainerAction::Start, ActionStatus::Failed)]
    );
}

#[tokio::test]
async fn test_remove_with_purge_is_idempotent() {
    let engine = FakeEngine::new().with_container("static_docs", "running", "Up");
    let f = fixture(engine.clone()).await;
    let published = f.layout.app_publish_dir("docs");
    published.create().await.unwrap();
    tokio::fs::write(published.path().join("index.html"), "<h1>docs</h1>")
        .await
        .unwrap();

    let first = f
        .inventory
        .act("static_docs", ContainerAction::Remove, true)
        .await
        .unwrap();
    assert_eq!(first, ActionOutcome::Removed { purged: true });
    assert!(!published.path().exists());
    assert!(engine.state_of("static_docs").is_none());

    let second = f
        .inventory
        .act("static_docs", ContainerAction::Remove, false)
        .await
        .unwrap();
    assert_eq!(second, ActionOutcome::Removed { purged: false });
    assert_eq!(
        action_events(&f.history).await,
        vec![(ContainerAction::Remove, ActionStatus::Success)]
    );
}

#[tokio::test]
async fn test_unmanaged_container_is_rejected() {
    let engine = FakeEngine::new().with_container("postgres", "running", "Up");
    let f = fixture(engine.clone()).await;

    let err = f
        .inventory
        .act("postgres", ContainerAction::Stop, false)
        .await
        .unwrap_err();
    assert!(matches!(err, DeployerError::Validation(_)));
    assert_eq!(engine.state_of("postgres").as_deref(), Some("running"));
    assert!(action_events(&f.history).await.is_empty());
}

#[tokio::test]
async fn test_purge_never_leaves_publish_root() {
    let f = fixture(FakeEngine::new()).await;
    let keep = f.layout.data_dir.join("keep.txt");
    std::fs::write(&keep, "x").unwrap();

    for container in ["static_..", "static_../data", "static_.", "static_a/../../data"] {
        let err = f
            .inventory
            .act(container, ContainerAction::Remove, true)
            .await
            .unwrap_err();
        assert!(matches!(err, DeployerError::Validation(_)), "{}", container);
    }

    assert!(keep.exists());
    assert!(f.layout.publish_root.exists());
    assert!(f.layout.workspace_root.exists());
    assert!(action_events(&f.history).await.is_empty());
}
