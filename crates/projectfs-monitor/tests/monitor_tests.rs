//! End-to-end tests against the real OS watcher.

use std::fs;
use std::sync::Arc;
use std::time::Duration;

use projectfs_core::{NotificationHub, ProjectConfig, ResourceKey, ResourceNotification};
use projectfs_monitor::{MonitorState, RescanRequest, ResourceMonitor};
use tempfile::TempDir;
use tokio::sync::{broadcast, mpsc};
use tokio::time::timeout;

fn key(s: &str) -> ResourceKey {
    ResourceKey::new(s).unwrap()
}

fn config_for(temp: &TempDir) -> Arc<ProjectConfig> {
    Arc::new(
        ProjectConfig::builder()
            .root(temp.path())
            .debounce_ms(100u64)
            .build()
            .unwrap(),
    )
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_burst_of_writes_requests_one_rescan() {
    let temp = TempDir::new().unwrap();
    let hub = NotificationHub::new();
    let mut notifications = hub.subscribe();
    let (tx, mut rescans) = mpsc::unbounded_channel();

    let mut monitor = ResourceMonitor::new(config_for(&temp), hub, Arc::new(tx));
    monitor.initialize().unwrap();

    for i in 0..20 {
        fs::write(temp.path().join(format!("file{i}.txt")), "x").unwrap();
    }

    let first = timeout(Duration::from_secs(5), rescans.recv()).await.unwrap();
    assert_eq!(first, Some(RescanRequest));

    // Nothing else arrives once the burst has settled
    let extra = timeout(Duration::from_millis(400), rescans.recv()).await;
    assert!(extra.is_err());

    let created = key("file0.txt");
    let mut seen = false;
    while let Ok(notification) = notifications.try_recv() {
        if notification.key() == Some(&created) {
            seen = true;
        }
    }
    assert!(seen);

    monitor.shutdown();
    assert_eq!(monitor.state(), MonitorState::Stopped);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_noise_never_requests_rescan() {
    let temp = TempDir::new().unwrap();
    fs::create_dir(temp.path().join("__pycache__")).unwrap();
    let hub = NotificationHub::new();
    let mut notifications = hub.subscribe();
    let (tx, mut rescans) = mpsc::unbounded_channel();

    let mut monitor = ResourceMonitor::new(config_for(&temp), hub, Arc::new(tx));
    monitor.initialize().unwrap();

    fs::write(temp.path().join("draft.tmp"), "x").unwrap();
    fs::write(temp.path().join(".hidden"), "x").unwrap();
    fs::write(temp.path().join("__pycache__/mod.pyc"), "x").unwrap();

    let result = timeout(Duration::from_millis(600), rescans.recv()).await;
    assert!(result.is_err());
    assert!(!matches!(
        notifications.try_recv(),
        Ok(ResourceNotification::ResourceCreated { .. })
    ));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_shutdown_stops_delivery() {
    let temp = TempDir::new().unwrap();
    let (tx, mut rescans) = mpsc::unbounded_channel();

    let mut monitor =
        ResourceMonitor::new(config_for(&temp), NotificationHub::new(), Arc::new(tx));
    monitor.initialize().unwrap();
    monitor.schedule_resource_update();
    monitor.shutdown();

    fs::write(temp.path().join("late.txt"), "x").unwrap();

    let result = timeout(Duration::from_millis(500), rescans.recv()).await;
    assert!(!matches!(result, Ok(Some(_))));
}

/// Start watching `temp`, returning the monitor with its notification and rescan receivers.
fn watch(
    temp: &TempDir,
) -> (
    ResourceMonitor,
    broadcast::Receiver<ResourceNotification>,
    mpsc::UnboundedReceiver<RescanRequest>,
) {
    let hub = NotificationHub::new();
    let notifications = hub.subscribe();
    let (tx, rescans) = mpsc::unbounded_channel();
    let mut monitor = ResourceMonitor::new(config_for(temp), hub, Arc::new(tx));
    monitor.initialize().unwrap();
    (monitor, notifications, rescans)
}

/// Wait for the rescan request, then take everything announced before it.
async fn announced_before_rescan(
    notifications: &mut broadcast::Receiver<ResourceNotification>,
    rescans: &mut mpsc::UnboundedReceiver<RescanRequest>,
) -> Vec<ResourceNotification> {
    let request = timeout(Duration::from_secs(5), rescans.recv()).await.unwrap();
    assert_eq!(request, Some(RescanRequest));

    let mut seen = Vec::new();
    while let Ok(notification) = notifications.try_recv() {
        seen.push(notification);
    }
    seen
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_rename_is_reported_once() {
    let temp = TempDir::new().unwrap();
    fs::write(temp.path().join("a.txt"), "a").unwrap();
    let (_monitor, mut notifications, mut rescans) = watch(&temp);

    fs::rename(temp.path().join("a.txt"), temp.path().join("b.txt")).unwrap();

    let seen = announced_before_rescan(&mut notifications, &mut rescans).await;
    assert_eq!(
        seen,
        vec![
            ResourceNotification::ResourceRenamed {
                from: key("a.txt"),
                to: key("b.txt"),
            },
            ResourceNotification::ResourceChanged { key: key("b.txt") },
        ]
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_delete_is_announced() {
    let temp = TempDir::new().unwrap();
    fs::write(temp.path().join("gone.txt"), "x").unwrap();
    let (_monitor, mut notifications, mut rescans) = watch(&temp);

    fs::remove_file(temp.path().join("gone.txt")).unwrap();

    let seen = announced_before_rescan(&mut notifications, &mut rescans).await;
    assert!(seen.contains(&ResourceNotification::ResourceDeleted { key: key("gone.txt") }));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_save_through_temp_file_is_a_change() {
    let temp = TempDir::new().unwrap();
    let doc = temp.path().join("doc.txt");
    fs::write(&doc, "v1").unwrap();
    let (_monitor, mut notifications, mut rescans) = watch(&temp);

    let staged = temp.path().join("doc.txt.tmp");
    fs::write(&staged, "v2").unwrap();
    fs::rename(&staged, &doc).unwrap();

    let seen = announced_before_rescan(&mut notifications, &mut rescans).await;
    assert!(seen.contains(&ResourceNotification::ResourceChanged { key: key("doc.txt") }));
    assert!(seen.iter().all(|n| n.key() == Some(&key("doc.txt"))));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_move_out_of_project_is_a_delete() {
    let temp = TempDir::new().unwrap();
    let elsewhere = TempDir::new().unwrap();
    fs::write(temp.path().join("out.txt"), "x").unwrap();
    let (_monitor, mut notifications, mut rescans) = watch(&temp);

    fs::rename(temp.path().join("out.txt"), elsewhere.path().join("out.txt")).unwrap();

    let seen = announced_before_rescan(&mut notifications, &mut rescans).await;
    assert_eq!(
        seen,
        vec![ResourceNotification::ResourceDeleted { key: key("out.txt") }]
    );
}
