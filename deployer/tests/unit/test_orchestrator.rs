//! End-to-end deploy sessions with fake toolchain scripts

use std::sync::atomic::Ordering;
use std::time::Duration;

use motion_deployer::deploy::orchestrator::{CANCELLED_LINE, COMPLETE_LINE};
use motion_deployer::deploy::publish::NGINX_HTML_DIR;
use motion_deployer::errors::DeployerError;
use motion_deployer::models::app::ContainerState;
use motion_deployer::models::deployment::{DeployRequest, DeploymentStatus};
use motion_deployer::models::history::{DeploymentRecord, HistoryEvent};

use crate::common::{
    fake_git_ok, wait_for_history, FakeEngine, Harness, FAKE_COMMIT, FAKE_GIT_NOT_FOUND,
    FAKE_NPM_BROKEN, FAKE_NPM_HANGS, FAKE_NPM_NO_DIST, FAKE_NPM_OK,
};

fn request(name: &str) -> DeployRequest {
    DeployRequest {
        variables: Some("APP_TITLE=Hello Motion\n# comment\n".to_string()),
        framework: Some("vite".to_string()),
        ..DeployRequest::new(name, "https://example.com/team/site.git")
    }
}

fn deployments(events: &[HistoryEvent]) -> Vec<&DeploymentRecord> {
    events
        .iter()
        .filter_map(|event| match event {
            HistoryEvent::Deployment(record) => Some(record),
            _ => None,
        })
        .collect()
}

#[tokio::test]
async fn test_successful_deploy() {
    let h = Harness::new(&fake_git_ok(), FAKE_NPM_OK).await;

    let stream = h.state.orchestrator.start(request("site")).unwrap();
    let text = stream.collect_text().await;

    assert!(text.starts_with("Starting deployment for site\n"), "{}", text);
    let clone_at = text.find("== Git clone/update ==").unwrap();
    let build_at = text.find("== Build").unwrap();
    let publish_at = text.find("== Publish with Nginx ==").unwrap();
    assert!(clone_at < build_at && build_at < publish_at);
    assert!(text.contains(&format!("Checked out commit: {}", FAKE_COMMIT)));
    assert!(text.contains("build finished"));
    assert!(text.contains("Container: static_site"));
    assert!(text.ends_with(&format!("{}\n", COMPLETE_LINE)), "{}", text);

    let events = h.history().await;
    let records = deployments(&events);
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].status, DeploymentStatus::Success);
    assert_eq!(records[0].commit.as_deref(), Some(FAKE_COMMIT));
    assert_eq!(records[0].container, "static_site");

    let index = h.layout().app_publish_dir("site").path().join("index.html");
    let html = std::fs::read_to_string(index).unwrap();
    assert!(html.contains("<h1>Hello Motion</h1>"));
    assert!(h
        .layout()
        .app_publish_dir("site")
        .path()
        .join("assets/app.js")
        .exists());

    let runs = h.engine.runs.lock().unwrap().clone();
    assert_eq!(runs.len(), 1);
    assert_eq!(runs[0].mount_target, NGINX_HTML_DIR);
    assert!(runs[0].mount_source.is_absolute());

    let settings = h.state.settings.get("site").await.unwrap().unwrap();
    assert_eq!(settings.last_commit.as_deref(), Some(FAKE_COMMIT));
    assert_eq!(h.workspace_entries(), 0);
}

#[tokio::test]
async fn test_redeploy_replaces_container() {
    let h = Harness::new(&fake_git_ok(), FAKE_NPM_OK).await;

    for _ in 0..2 {
        let text = h
            .state
            .orchestrator
            .start(request("site"))
            .unwrap()
            .collect_text()
            .await;
        assert!(text.ends_with(&format!("{}\n", COMPLETE_LINE)), "{}", text);
    }

    assert_eq!(h.engine.run_count(), 2);
    let apps = h.state.inventory.list().await;
    assert_eq!(apps.len(), 1);
}

#[tokio::test]
async fn test_lagging_engine_shows_app_once() {
    let engine = FakeEngine::new();
    engine.lagging.store(true, Ordering::SeqCst);
    let h = Harness::with_engine(&fake_git_ok(), FAKE_NPM_OK, engine, |_| {}).await;

    let text = h
        .state
        .orchestrator
        .start(request("site"))
        .unwrap()
        .collect_text()
        .await;
    assert!(text.ends_with(&format!("{}\n", COMPLETE_LINE)));

    let apps = h.state.inventory.list().await;
    assert_eq!(apps.len(), 1);
    assert_eq!(apps[0].name, "site");
    assert_eq!(apps[0].state, ContainerState::Running);
    assert_eq!(apps[0].repo_url.as_deref(), Some("https://example.com/team/site.git"));
}

#[tokio::test]
async fn test_missing_build_output_fails() {
    let h = Harness::new(&fake_git_ok(), FAKE_NPM_NO_DIST).await;

    let text = h
        .state
        .orchestrator
        .start(request("site"))
        .unwrap()
        .collect_text()
        .await;

    let last = text.lines().last().unwrap();
    assert!(
        last.starts_with("Deployment failed: dist directory not found at"),
        "{}",
        text
    );
    let events = h.history().await;
    let records = deployments(&events);
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].status, DeploymentStatus::Failed);
    assert_eq!(h.engine.run_count(), 0);
    assert_eq!(h.workspace_entries(), 0);
}

#[tokio::test]
async fn test_build_failure_is_reported() {
    let h = Harness::new(&fake_git_ok(), FAKE_NPM_BROKEN).await;

    let text = h
        .state
        .orchestrator
        .start(request("site"))
        .unwrap()
        .collect_text()
        .await;

    assert!(text.contains("error TS2322"));
    let last = text.lines().last().unwrap();
    assert!(last.starts_with("Deployment failed: build step failed"), "{}", text);
}

#[tokio::test]
async fn test_clone_failure_is_reported() {
    let h = Harness::new(FAKE_GIT_NOT_FOUND, FAKE_NPM_OK).await;

    let text = h
        .state
        .orchestrator
        .start(request("site"))
        .unwrap()
        .collect_text()
        .await;

    assert!(!text.contains("== Build"));
    let last = text.lines().last().unwrap();
    assert!(last.starts_with("Deployment failed: git clone failed"), "{}", text);
    assert!(last.contains("repository not found"));

    let events = h.history().await;
    let records = deployments(&events);
    assert_eq!(records[0].status, DeploymentStatus::Failed);
    assert_eq!(records[0].commit, None);
}

#[tokio::test]
async fn test_invalid_request_starts_nothing() {
    let h = Harness::new(&fake_git_ok(), FAKE_NPM_OK).await;

    let err = h
        .state
        .orchestrator
        .start(DeployRequest::new("", "https://example.com/r.git"))
        .err()
        .unwrap();
    assert!(matches!(err, DeployerError::Validation(_)));

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(h.history().await.is_empty());
    assert_eq!(h.workspace_entries(), 0);
}

#[tokio::test]
async fn test_disconnect_cancels_session() {
    let h = Harness::new(&fake_git_ok(), FAKE_NPM_HANGS).await;

    let mut stream = h.state.orchestrator.start(request("site")).unwrap();
    let mut seen = String::new();
    while let Some(chunk) = stream.next_chunk().await {
        seen.push_str(&chunk);
        if seen.contains("resolving packages") {
            break;
        }
    }
    assert!(seen.contains("== Build"));
    drop(stream);

    let events = wait_for_history(&h.state.history, |events| !events.is_empty()).await;
    let records = deployments(&events);
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].status, DeploymentStatus::Cancelled);
    assert_eq!(records[0].message.as_deref(), Some(CANCELLED_LINE));
    assert_eq!(h.engine.run_count(), 0);

    // Workspace release happens before the history write
    assert_eq!(h.workspace_entries(), 0);
}

#[tokio::test]
async fn test_concurrent_deploys_of_one_app() {
    let h = Harness::new(&fake_git_ok(), FAKE_NPM_OK).await;

    let first = h.state.orchestrator.start(request("site")).unwrap();
    let second = h.state.orchestrator.start(request("site")).unwrap();
    assert_ne!(first.session_id(), second.session_id());

    let (first, second) = tokio::join!(first.collect_text(), second.collect_text());
    for text in [&first, &second] {
        assert!(text.ends_with(&format!("{}\n", COMPLETE_LINE)), "{}", text);
    }

    assert_eq!(h.engine.run_count(), 2);
    let apps = h.state.inventory.list().await;
    let names: Vec<&str> = apps.iter().map(|a| a.name.as_str()).collect();
    assert_eq!(names, vec!["site"]);

    let events = h.history().await;
    let records = deployments(&events);
    assert_eq!(records.len(), 2);
    assert!(records
        .iter()
        .all(|r| r.status == DeploymentStatus::Success));
    assert_eq!(h.workspace_entries(), 0);
}

#[tokio::test]
async fn test_shutdown_stops_running_sessions() {
    let h = Harness::new(&fake_git_ok(), FAKE_NPM_HANGS).await;

    let mut stream = h.state.orchestrator.start(request("site")).unwrap();
    let mut seen = String::new();
    while let Some(chunk) = stream.next_chunk().await {
        seen.push_str(&chunk);
        if seen.contains("resolving packages") {
            break;
        }
    }

    tokio::time::timeout(Duration::from_secs(10), h.state.shutdown())
        .await
        .expect("shutdown waits only for the cancelled session")
        .unwrap();

    // History and workspace are settled once shutdown returns
    let events = h.history().await;
    let records = deployments(&events);
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].status, DeploymentStatus::Cancelled);
    assert_eq!(h.workspace_entries(), 0);

    let rest = stream.collect_text().await;
    assert!(rest.ends_with(&format!("{}\n", CANCELLED_LINE)), "{}", rest);

    let err = h.state.orchestrator.start(request("site")).err().unwrap();
    assert!(matches!(err, DeployerError::ShuttingDown));
}
