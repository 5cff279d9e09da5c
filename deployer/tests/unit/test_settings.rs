//! Settings store tests

use std::collections::BTreeMap;

use chrono::{TimeZone, Utc};

use motion_deployer::filesys::file::File;
use motion_deployer::models::deployment::DeployRequest;
use motion_deployer::models::settings::AppSettingsPatch;
use motion_deployer::storage::settings::SettingsStore;

fn store(dir: &tempfile::TempDir) -> SettingsStore {
    SettingsStore::new(File::new(dir.path().join("settings.json")))
}

#[tokio::test]
async fn test_upsert_merges_and_persists() {
    let dir = tempfile::tempdir().unwrap();
    let store = store(&dir);

    let mut env = BTreeMap::new();
    env.insert("VITE_API".to_string(), "https://api.example.com".to_string());
    store
        .upsert(
            "demo",
            AppSettingsPatch {
                owner: Some("web team".into()),
                public_env: Some(env),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    let merged = store
        .upsert(
            "demo",
            AppSettingsPatch {
                notes: Some("  marketing site ".into()),
                ..Default::default()
            },
        )
        .await
        .unwrap();

    assert_eq!(merged.owner.as_deref(), Some("web team"));
    assert_eq!(merged.notes.as_deref(), Some("marketing site"));

    let reopened = SettingsStore::new(File::new(dir.path().join("settings.json")));
    let stored = reopened.get("demo").await.unwrap().unwrap();
    assert_eq!(stored, merged);
    assert_eq!(stored.app, "demo");
}

#[tokio::test]
async fn test_delete_is_idempotent() {
    let dir = tempfile::tempdir().unwrap();
    let store = store(&dir);
    store
        .upsert("demo", AppSettingsPatch::default())
        .await
        .unwrap();

    assert!(store.delete("demo").await.unwrap());
    assert!(!store.delete("demo").await.unwrap());
    assert!(store.get("demo").await.unwrap().is_none());
}

#[tokio::test]
async fn test_record_deploy_stores_last_config() {
    let dir = tempfile::tempdir().unwrap();
    let store = store(&dir);
    let request = DeployRequest {
        framework: Some("vite".into()),
        app_path: Some("apps/web".into()),
        ..DeployRequest::new("demo", "https://example.com/repo.git").with_branch("release")
    };
    let at = Utc.with_ymd_and_hms(2024, 5, 1, 10, 0, 0).unwrap();

    let settings = store
        .record_deploy(&request, Some("abc1234"), at)
        .await
        .unwrap();

    assert_eq!(settings.repo_url.as_deref(), Some("https://example.com/repo.git"));
    assert_eq!(settings.branch.as_deref(), Some("release"));
    assert_eq!(settings.app_path.as_deref(), Some("apps/web"));
    assert_eq!(settings.last_commit.as_deref(), Some("abc1234"));
    assert_eq!(settings.last_deployed_at.as_deref(), Some("2024-05-01T10:00:00.000Z"));
}

#[tokio::test]
async fn test_malformed_entries_are_skipped() {
    let dir = tempfile::tempdir().unwrap();
    let file = File::new(dir.path().join("settings.json"));
    file.write_atomic(br#"{"demo": {"owner": "ops"}, "broken": 7, "odd": {"publicEnv": "nope"}}"#)
        .await
        .unwrap();

    let all = SettingsStore::new(file).all().await.unwrap();
    assert_eq!(all.keys().collect::<Vec<_>>(), vec!["demo"]);
}
