//! Revision delivery, backup and rollback.

use async_trait::async_trait;
use parking_lot::Mutex;
use pretty_assertions::assert_eq;
use regsync_core::{
    BackupStore, ConfigListener, ConfigProviderManager, ProviderSettings, Providers, SyncError,
    SyncResult,
};
use regsync_test::fixtures::{registry_task, DocumentBuilder};
use regsync_test::ManualProvider;
use regsync_types::SyncDocument;
use std::collections::BTreeMap;
use std::sync::Arc;
use tempfile::TempDir;

/// Accepts revisions unless they contain a task named `reject`.
#[derive(Default)]
struct Picky {
    applied: Mutex<Vec<SyncDocument>>,
}

#[async_trait]
impl ConfigListener for Picky {
    async fn on_change(&self, document: &SyncDocument) -> SyncResult<()> {
        if document.tasks.iter().any(|t| t.name == "reject") {
            return Err(SyncError::invalid_config("tasks", "rejected by test"));
        }
        self.applied.lock().push(document.clone());
        Ok(())
    }
}

fn document(task: &str) -> SyncDocument {
    DocumentBuilder::new()
        .task(registry_task(task, "prod", "orders"))
        .pull("10s")
        .build()
}

fn settings(dir: &TempDir) -> ProviderSettings {
    ProviderSettings {
        name: "manual".to_string(),
        options: BTreeMap::from([("key".to_string(), "value".to_string())]),
        backup_path: dir.path().join("backup").join("regsync.json"),
    }
}

async fn manager_with(provider: &ManualProvider, dir: &TempDir) -> ConfigProviderManager {
    let mut providers = Providers::new();
    provider.register(&mut providers);
    ConfigProviderManager::new(&providers, settings(dir))
        .await
        .unwrap()
}

#[tokio::test]
async fn test_unknown_provider_rejected() {
    let dir = TempDir::new().unwrap();
    let err = ConfigProviderManager::new(&Providers::new(), settings(&dir))
        .await
        .err()
        .unwrap();
    assert!(matches!(err, SyncError::ProviderNotFound { .. }));
}

#[tokio::test]
async fn test_provider_receives_options() {
    let dir = TempDir::new().unwrap();
    let provider = ManualProvider::new("manual");
    let _manager = manager_with(&provider, &dir).await;
    assert_eq!(
        provider.init_options().unwrap().get("key").map(String::as_str),
        Some("value")
    );
}

#[tokio::test]
async fn test_accepted_revision_is_backed_up() {
    let dir = TempDir::new().unwrap();
    let provider = ManualProvider::new("manual");
    let manager = manager_with(&provider, &dir).await;
    let listener = Arc::new(Picky::default());
    manager.add_listener(listener.clone());

    provider.publish(document("one")).await;

    assert_eq!(listener.applied.lock().len(), 1);
    let backup = BackupStore::new(settings(&dir).backup_path);
    assert_eq!(backup.load().await.unwrap(), Some(document("one")));
}

#[tokio::test]
async fn test_rejected_revision_rolls_back() {
    let dir = TempDir::new().unwrap();
    let provider = ManualProvider::new("manual");
    let manager = manager_with(&provider, &dir).await;
    let listener = Arc::new(Picky::default());
    manager.add_listener(listener.clone());

    manager.commit(&document("one")).await.unwrap();
    provider.publish(document("reject")).await;

    // The listener was handed the previous revision again.
    let applied = listener.applied.lock().clone();
    assert_eq!(applied, vec![document("one")]);

    let backup = BackupStore::new(settings(&dir).backup_path);
    assert_eq!(backup.load().await.unwrap(), Some(document("one")));
}

#[tokio::test]
async fn test_backup_used_when_provider_is_empty() {
    let dir = TempDir::new().unwrap();
    BackupStore::new(settings(&dir).backup_path)
        .save(&document("saved"))
        .await
        .unwrap();

    let provider = ManualProvider::new("manual");
    let manager = manager_with(&provider, &dir).await;
    assert_eq!(manager.get_config().await.unwrap(), Some(document("saved")));

    provider.publish(document("live")).await;
    assert_eq!(manager.get_config().await.unwrap(), Some(document("live")));
}

#[tokio::test]
async fn test_destroy_closes_provider() {
    let dir = TempDir::new().unwrap();
    let provider = ManualProvider::new("manual");
    let manager = manager_with(&provider, &dir).await;
    manager.destroy().await;
    assert!(provider.is_closed());
}
