//! History store tests

use std::sync::Arc;

use chrono::{Duration, TimeZone, Utc};

use motion_deployer::filesys::file::File;
use motion_deployer::models::app::ContainerAction;
use motion_deployer::models::deployment::DeploymentStatus;
use motion_deployer::models::history::{
    ActionStatus, ContainerActionRecord, DeploymentRecord, HistoryEvent,
};
use motion_deployer::storage::history::{HistoryQuery, HistoryStore};

fn deployment(id: &str, app: &str, minute: u32) -> HistoryEvent {
    let started_at = Utc.with_ymd_and_hms(2024, 5, 1, 10, minute, 0).unwrap();
    HistoryEvent::Deployment(DeploymentRecord {
        id: id.to_string(),
        app: app.to_string(),
        container: format!("static_{}", app),
        repo_url: "https://example.com/repo.git".to_string(),
        branch: "main".to_string(),
        framework: None,
        commit: Some("abc1234".to_string()),
        status: DeploymentStatus::Success,
        started_at,
        completed_at: started_at + Duration::seconds(30),
        duration_ms: 30_000,
        message: None,
    })
}

fn action(id: &str, app: &str, minute: u32) -> HistoryEvent {
    HistoryEvent::ContainerAction(ContainerActionRecord {
        id: id.to_string(),
        app: app.to_string(),
        container: format!("static_{}", app),
        action: ContainerAction::Restart,
        status: ActionStatus::Success,
        timestamp: Utc.with_ymd_and_hms(2024, 5, 1, 10, minute, 0).unwrap(),
        message: None,
    })
}

fn store(dir: &tempfile::TempDir) -> HistoryStore {
    HistoryStore::new(File::new(dir.path().join("data/deploy-history.json")))
}

#[tokio::test]
async fn test_round_trip_keeps_ids() {
    let dir = tempfile::tempdir().unwrap();
    let store = store(&dir);

    store.append(deployment("d1", "demo", 0)).await.unwrap();
    store.append(action("a1", "demo", 5)).await.unwrap();
    store.append(deployment("d2", "docs", 10)).await.unwrap();

    let reopened = HistoryStore::new(store.file().clone());
    let mut ids: Vec<String> = reopened
        .read_all()
        .await
        .unwrap()
        .iter()
        .map(|e| e.id().to_string())
        .collect();
    ids.sort();
    assert_eq!(ids, vec!["a1", "d1", "d2"]);
}

#[tokio::test]
async fn test_list_newest_first_with_filters() {
    let dir = tempfile::tempdir().unwrap();
    let store = store(&dir);

    store.append(deployment("d1", "demo", 0)).await.unwrap();
    store.append(deployment("d2", "docs", 20)).await.unwrap();
    store.append(action("a1", "demo", 10)).await.unwrap();

    let all = store.list(&HistoryQuery::default()).await.unwrap();
    let ids: Vec<&str> = all.iter().map(|e| e.id()).collect();
    assert_eq!(ids, vec!["d2", "a1", "d1"]);

    let demo = store
        .list(&HistoryQuery {
            app: Some("demo".into()),
            limit: Some(1),
        })
        .await
        .unwrap();
    assert_eq!(demo.len(), 1);
    assert_eq!(demo[0].id(), "a1");
}

#[tokio::test]
async fn test_legacy_and_unknown_records() {
    let dir = tempfile::tempdir().unwrap();
    let store = store(&dir);
    let legacy = r#"[
        {"id": "old", "app": "demo", "container": "static_demo", "repoUrl": "https://example.com/r.git",
         "branch": "main", "startedAt": "2024-05-01T10:00:00.000Z", "completedAt": "2024-05-01T10:00:05.000Z"},
        {"kind": "webhook", "id": "w1", "app": "demo"},
        42
    ]"#;
    store.file().write_atomic(legacy.as_bytes()).await.unwrap();

    let events = store.read_all().await.unwrap();
    assert_eq!(events.len(), 1);
    let HistoryEvent::Deployment(record) = &events[0] else {
        panic!("expected a deployment record");
    };
    assert_eq!(record.status, DeploymentStatus::Success);
    assert_eq!(record.duration_ms, 5000);

    // Rewritten records carry the kind tag
    store.append(action("a1", "demo", 30)).await.unwrap();
    let raw: serde_json::Value = store.file().read_json().await.unwrap();
    assert_eq!(raw.as_array().unwrap().len(), 4);
    assert_eq!(raw[3]["kind"], "container_action");
}

#[tokio::test]
async fn test_corrupt_file_reads_as_empty() {
    let dir = tempfile::tempdir().unwrap();
    let store = store(&dir);
    store.file().write_atomic(b"{ not json").await.unwrap();

    assert!(store.read_all().await.unwrap().is_empty());
    store.append(deployment("d1", "demo", 0)).await.unwrap();
    assert_eq!(store.read_all().await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_concurrent_appends_are_not_lost() {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(store(&dir));

    let mut tasks = Vec::new();
    for i in 0..20 {
        let store = store.clone();
        tasks.push(tokio::spawn(async move {
            store
                .append(deployment(&format!("d{}", i), "demo", i % 60))
                .await
                .unwrap();
        }));
    }
    for task in tasks {
        task.await.unwrap();
    }

    assert_eq!(store.read_all().await.unwrap().len(), 20);
}
