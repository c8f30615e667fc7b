//! Integration tests for the operation engine.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use std::sync::Arc;

use projectfs_core::{NotificationHub, ProjectConfig, ResourceKey, ResourceNotification};
use projectfs_ops::{OperationEngine, OperationError, SidecarCompanion, TransferMode};
use projectfs_registry::Registry;
use tempfile::TempDir;

fn key(s: &str) -> ResourceKey {
    ResourceKey::new(s).unwrap()
}

fn config_for(temp: &TempDir) -> Arc<ProjectConfig> {
    Arc::new(ProjectConfig::new(temp.path()))
}

fn engine_for(temp: &TempDir, hub: NotificationHub) -> OperationEngine {
    let config = config_for(temp);
    let companion = Arc::new(SidecarCompanion::from_config(&config));
    OperationEngine::new(config, hub)
        .unwrap()
        .with_companion(companion)
}

/// Everything under `root` except the metadata folder: folders map to `None`.
fn snapshot(root: &Path) -> BTreeMap<String, Option<Vec<u8>>> {
    fn visit(base: &Path, dir: &Path, out: &mut BTreeMap<String, Option<Vec<u8>>>) {
        for entry in fs::read_dir(dir).unwrap() {
            let entry = entry.unwrap();
            let path = entry.path();
            let rel = path
                .strip_prefix(base)
                .unwrap()
                .to_string_lossy()
                .replace('\\', "/");
            if rel == ".projectfs" {
                continue;
            }
            if path.is_dir() {
                out.insert(rel, None);
                visit(base, &path, out);
            } else {
                out.insert(rel, Some(fs::read(&path).unwrap()));
            }
        }
    }

    let mut out = BTreeMap::new();
    visit(root, root, &mut out);
    out
}

fn seed(root: &Path) {
    fs::create_dir_all(root.join("src/lib")).unwrap();
    fs::write(root.join("src/main.py"), "print('hi')").unwrap();
    fs::write(root.join("src/lib/util.py"), "x = 1").unwrap();
    fs::write(root.join("notes.txt"), "notes").unwrap();
}

fn drain(
    rx: &mut tokio::sync::broadcast::Receiver<ResourceNotification>,
) -> Vec<ResourceNotification> {
    let mut out = Vec::new();
    while let Ok(notification) = rx.try_recv() {
        out.push(notification);
    }
    out
}

fn key_changes(notifications: &[ResourceNotification]) -> Vec<(String, String)> {
    notifications
        .iter()
        .filter_map(|n| match n {
            ResourceNotification::ResourceKeyChanged { old_key, new_key } => {
                Some((old_key.to_string(), new_key.to_string()))
            }
            _ => None,
        })
        .collect()
}

#[tokio::test]
async fn test_undo_everything_restores_disk() {
    let temp = TempDir::new().unwrap();
    seed(temp.path());
    let before = snapshot(temp.path());
    let mut engine = engine_for(&temp, NotificationHub::new());

    engine.create_file(&key("a/b/new.txt"), "new").await.unwrap();
    engine.create_folder(&key("empty")).await.unwrap();
    engine.copy_file(&key("notes.txt"), &key("copy.txt")).await.unwrap();
    engine.copy_folder(&key("src"), &key("backup/src")).await.unwrap();
    engine.move_file(&key("notes.txt"), &key("docs/notes.txt")).await.unwrap();
    engine.move_folder(&key("src/lib"), &key("lib")).await.unwrap();
    engine.delete_file(&key("src/main.py")).await.unwrap();
    engine.delete_folder(&key("backup")).await.unwrap();
    assert_ne!(snapshot(temp.path()), before);

    let mut undone = 0;
    while engine.can_undo() {
        engine.undo().await.unwrap();
        undone += 1;
    }

    assert_eq!(undone, 8);
    assert_eq!(snapshot(temp.path()), before);
}

#[tokio::test]
async fn test_undo_then_redo_reproduces_state() {
    let temp = TempDir::new().unwrap();
    seed(temp.path());
    let mut engine = engine_for(&temp, NotificationHub::new());

    engine.create_file(&key("new.txt"), "fresh").await.unwrap();
    engine.copy_folder(&key("src"), &key("src2")).await.unwrap();
    engine.move_file(&key("notes.txt"), &key("src2/notes.txt")).await.unwrap();
    engine.delete_folder(&key("src")).await.unwrap();
    let after = snapshot(temp.path());

    for _ in 0..4 {
        engine.undo().await.unwrap();
    }
    assert!(!engine.can_undo());
    assert_eq!(engine.redo_description(), Some("Create file 'new.txt'"));

    for _ in 0..4 {
        engine.redo().await.unwrap();
    }
    assert!(!engine.can_redo());
    assert_eq!(snapshot(temp.path()), after);
}

#[tokio::test]
async fn test_delete_and_undo_restores_companion() {
    let temp = TempDir::new().unwrap();
    seed(temp.path());
    let companion = temp.path().join(".projectfs/data/src/main.py.json");
    fs::create_dir_all(companion.parent().unwrap()).unwrap();
    fs::write(&companion, br#"{"cursor": 4}"#).unwrap();
    let mut engine = engine_for(&temp, NotificationHub::new());

    engine.delete_folder(&key("src")).await.unwrap();
    assert!(!temp.path().join("src").exists());
    assert!(!companion.exists());

    engine.undo().await.unwrap();
    assert_eq!(
        fs::read(temp.path().join("src/main.py")).unwrap(),
        b"print('hi')"
    );
    assert_eq!(fs::read(&companion).unwrap(), br#"{"cursor": 4}"#);
}

#[tokio::test]
async fn test_move_carries_companion() {
    let temp = TempDir::new().unwrap();
    seed(temp.path());
    let old = temp.path().join(".projectfs/data/notes.txt.json");
    fs::create_dir_all(old.parent().unwrap()).unwrap();
    fs::write(&old, "{}").unwrap();
    let mut engine = engine_for(&temp, NotificationHub::new());

    engine.move_file(&key("notes.txt"), &key("docs/n.txt")).await.unwrap();
    let new = temp.path().join(".projectfs/data/docs/n.txt.json");
    assert!(!old.exists());
    assert_eq!(fs::read_to_string(&new).unwrap(), "{}");

    engine.undo().await.unwrap();
    assert!(old.exists());
    assert!(!temp.path().join(".projectfs/data/docs").exists());
}

#[tokio::test]
async fn test_new_operation_clears_redo_and_its_trash() {
    let temp = TempDir::new().unwrap();
    seed(temp.path());
    let mut engine = engine_for(&temp, NotificationHub::new());
    let trash = engine.config().trash_root();

    engine.create_file(&key("draft.txt"), "draft").await.unwrap();
    engine.undo().await.unwrap();
    assert!(engine.can_redo());
    assert_eq!(fs::read_dir(&trash).unwrap().count(), 1);

    engine.create_folder(&key("other")).await.unwrap();
    assert!(!engine.can_redo());
    assert_eq!(fs::read_dir(&trash).unwrap().count(), 0);

    // Redo on an empty stack is a no-op
    engine.redo().await.unwrap();
    assert!(!temp.path().join("draft.txt").exists());
}

#[tokio::test]
async fn test_history_is_bounded() {
    let temp = TempDir::new().unwrap();
    for i in 0..51 {
        fs::write(temp.path().join(format!("f{i:02}.txt")), "x").unwrap();
    }
    let mut engine = engine_for(&temp, NotificationHub::new());
    let trash = engine.config().trash_root();

    for i in 0..51 {
        engine.delete_file(&key(&format!("f{i:02}.txt"))).await.unwrap();
    }

    assert_eq!(engine.undo_log().len(), 50);
    assert_eq!(fs::read_dir(&trash).unwrap().count(), 50);

    let mut undone = 0;
    while engine.can_undo() {
        engine.undo().await.unwrap();
        undone += 1;
    }
    assert_eq!(undone, 50);
    assert!(!temp.path().join("f00.txt").exists());
    assert!(temp.path().join("f01.txt").exists());
    assert!(temp.path().join("f50.txt").exists());
}

#[tokio::test]
async fn test_readme_move_scenario() {
    let temp = TempDir::new().unwrap();
    let hub = NotificationHub::new();
    let mut rx = hub.subscribe();
    let config = config_for(&temp);
    let mut registry = Registry::new(Arc::clone(&config), hub.clone()).unwrap();
    let mut engine = OperationEngine::new(config, hub).unwrap();

    engine
        .create_file(&key("src/readme.md"), "hello")
        .await
        .unwrap();
    registry.rescan().unwrap();
    let readme = temp.path().join("src").join("readme.md");
    assert!(
        registry
            .all_files()
            .contains(&(key("src/readme.md"), readme.clone()))
    );

    drain(&mut rx);
    engine
        .move_file(&key("src/readme.md"), &key("docs/readme.md"))
        .await
        .unwrap();
    assert_eq!(
        key_changes(&drain(&mut rx)),
        vec![("src/readme.md".to_string(), "docs/readme.md".to_string())]
    );

    engine.undo().await.unwrap();
    assert_eq!(fs::read_to_string(&readme).unwrap(), "hello");
    assert!(!temp.path().join("docs").exists());
    assert_eq!(
        key_changes(&drain(&mut rx)),
        vec![("docs/readme.md".to_string(), "src/readme.md".to_string())]
    );
}

#[tokio::test]
async fn test_folder_move_reports_descendants() {
    let temp = TempDir::new().unwrap();
    seed(temp.path());
    let hub = NotificationHub::new();
    let mut rx = hub.subscribe();
    let mut engine = engine_for(&temp, hub);

    engine.move_folder(&key("src"), &key("code")).await.unwrap();

    let changes = key_changes(&drain(&mut rx));
    assert_eq!(
        changes,
        vec![
            ("src".to_string(), "code".to_string()),
            ("src/lib".to_string(), "code/lib".to_string()),
            ("src/lib/util.py".to_string(), "code/lib/util.py".to_string()),
            ("src/main.py".to_string(), "code/main.py".to_string()),
        ]
    );
}

#[tokio::test]
async fn test_batch_undo_and_redo_order() {
    let temp = TempDir::new().unwrap();
    seed(temp.path());
    let before = snapshot(temp.path());
    let hub = NotificationHub::new();
    let mut rx = hub.subscribe();
    let mut engine = engine_for(&temp, hub);

    engine.begin_batch();
    engine.create_folder(&key("archive")).await.unwrap();
    engine
        .move_file(&key("notes.txt"), &key("archive/notes.txt"))
        .await
        .unwrap();
    engine
        .move_file(&key("archive/notes.txt"), &key("archive/old.txt"))
        .await
        .unwrap();
    engine.commit_batch().await;
    let after = snapshot(temp.path());

    assert_eq!(engine.undo_log().len(), 1);
    assert_eq!(engine.undo_description(), Some("3 operations"));

    drain(&mut rx);
    engine.undo().await.unwrap();
    assert_eq!(snapshot(temp.path()), before);
    assert_eq!(
        key_changes(&drain(&mut rx)),
        vec![
            ("archive/old.txt".to_string(), "archive/notes.txt".to_string()),
            ("archive/notes.txt".to_string(), "notes.txt".to_string()),
        ]
    );

    engine.redo().await.unwrap();
    assert_eq!(snapshot(temp.path()), after);
}

#[tokio::test]
async fn test_batch_keeps_completed_steps_on_failure() {
    let temp = TempDir::new().unwrap();
    seed(temp.path());
    let mut engine = engine_for(&temp, NotificationHub::new());

    engine.begin_batch();
    engine.create_file(&key("one.txt"), "1").await.unwrap();
    let err = engine.create_file(&key("notes.txt"), "dup").await.unwrap_err();
    assert!(err.is_validation());
    engine.commit_batch().await;

    assert!(temp.path().join("one.txt").exists());
    engine.undo().await.unwrap();
    assert!(!temp.path().join("one.txt").exists());
    assert_eq!(fs::read_to_string(temp.path().join("notes.txt")).unwrap(), "notes");
}

#[tokio::test]
async fn test_transfer_into_existing_folder() {
    let temp = TempDir::new().unwrap();
    seed(temp.path());
    let mut engine = engine_for(&temp, NotificationHub::new());

    let moved = engine
        .transfer(
            &temp.path().join("notes.txt"),
            &temp.path().join("src"),
            TransferMode::Move,
        )
        .await
        .unwrap();
    assert_eq!(moved, key("src/notes.txt"));
    assert!(temp.path().join("src/notes.txt").is_file());

    let copied = engine
        .transfer(
            &temp.path().join("src/lib"),
            &temp.path().join("lib2"),
            TransferMode::Copy,
        )
        .await
        .unwrap();
    assert_eq!(copied, key("lib2"));
    assert!(temp.path().join("lib2/util.py").is_file());

    let outside = temp.path().parent().unwrap().join("elsewhere");
    let err = engine
        .transfer(&temp.path().join("lib2"), &outside, TransferMode::Move)
        .await
        .unwrap_err();
    assert!(matches!(err, OperationError::Resource(_)));
}

#[tokio::test]
async fn test_undo_stack_notifications() {
    let temp = TempDir::new().unwrap();
    let hub = NotificationHub::new();
    let mut rx = hub.subscribe();
    let mut engine = engine_for(&temp, hub);

    engine.create_folder(&key("x")).await.unwrap();
    engine.undo().await.unwrap();

    let stack: Vec<_> = drain(&mut rx)
        .into_iter()
        .filter_map(|n| match n {
            ResourceNotification::UndoStackChanged { can_undo, can_redo } => {
                Some((can_undo, can_redo))
            }
            _ => None,
        })
        .collect();
    assert_eq!(stack, vec![(true, false), (false, true)]);
}

#[tokio::test]
async fn test_stale_trash_is_purged_on_startup() {
    let temp = TempDir::new().unwrap();
    let leftover = temp.path().join(".projectfs/trash/old-session/file.txt");
    fs::create_dir_all(leftover.parent().unwrap()).unwrap();
    fs::write(&leftover, "stale").unwrap();

    let _engine = engine_for(&temp, NotificationHub::new());
    assert!(!temp.path().join(".projectfs/trash").exists());
}
