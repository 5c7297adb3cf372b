use std::cell::Cell;

use chrono::{Duration, Utc};
use eseis_sync_core::error::SyncError;
use eseis_sync_core::export::{export_item, write_metadata, ExportAction, ExportableItem};
use tempfile::tempdir;

#[tokio::test]
async fn second_export_of_unchanged_item_is_skipped_without_fetching() {
    let dir = tempdir().unwrap();
    let destination = dir.path().join("AG 2023.pdf");
    let item = ExportableItem::new(7, "AG 2023", Utc::now() - Duration::days(30));
    let fetches = Cell::new(0);

    let first = export_item(&item, &destination, || async {
        fetches.set(fetches.get() + 1);
        Ok(b"%PDF-first".to_vec())
    })
    .await
    .unwrap();
    let second = export_item(&item, &destination, || async {
        fetches.set(fetches.get() + 1);
        Ok(b"%PDF-second".to_vec())
    })
    .await
    .unwrap();

    assert_eq!(first, ExportAction::Created);
    assert_eq!(second, ExportAction::Skipped);
    assert_eq!(fetches.get(), 1);
    assert_eq!(std::fs::read(&destination).unwrap(), b"%PDF-first");
}

#[tokio::test]
async fn remote_update_after_local_write_replaces_bytes() {
    let dir = tempdir().unwrap();
    let destination = dir.path().join("budget.pdf");
    std::fs::write(&destination, b"stale").unwrap();

    let item = ExportableItem::new(8, "budget", Utc::now() + Duration::hours(1));
    let action = export_item(&item, &destination, || async { Ok(b"fresh".to_vec()) })
        .await
        .unwrap();

    assert_eq!(action, ExportAction::Created);
    assert_eq!(std::fs::read(&destination).unwrap(), b"fresh");
}

#[tokio::test]
async fn failed_fetch_leaves_no_artifact_behind() {
    let dir = tempdir().unwrap();
    let destination = dir.path().join("missing.pdf");
    let item = ExportableItem::new(9, "missing", Utc::now());

    let result = export_item(&item, &destination, || async {
        Err(SyncError::transport("/v1/sergic_documents", "status 404"))
    })
    .await;

    assert!(result.is_err());
    assert!(!destination.exists());
    assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
}

#[tokio::test]
async fn missing_parent_directory_is_a_filesystem_error() {
    let dir = tempdir().unwrap();
    let destination = dir.path().join("not-created").join("doc.pdf");
    let item = ExportableItem::new(10, "doc", Utc::now());

    let err = export_item(&item, &destination, || async { Ok(b"x".to_vec()) })
        .await
        .unwrap_err();
    assert!(matches!(err, SyncError::Filesystem { .. }));
}

#[test]
fn metadata_is_rewritten_pretty_printed() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("info.json");
    write_metadata(&serde_json::json!({"id": 1}), &path).unwrap();
    write_metadata(&serde_json::json!({"id": 2, "name": "Ascenseur"}), &path).unwrap();

    let written = std::fs::read_to_string(&path).unwrap();
    assert!(written.contains("\n  \"id\": 2"));
    assert!(written.contains("Ascenseur"));
}

#[cfg(unix)]
#[tokio::test]
async fn exported_files_are_world_readable() {
    use std::os::unix::fs::PermissionsExt;

    let dir = tempdir().unwrap();
    let destination = dir.path().join("contrat.pdf");
    let item = ExportableItem::new(11, "contrat", Utc::now());
    export_item(&item, &destination, || async { Ok(b"%PDF".to_vec()) })
        .await
        .unwrap();
    let metadata_path = dir.path().join("info.json");
    write_metadata(&serde_json::json!({"id": 11}), &metadata_path).unwrap();

    for path in [&destination, &metadata_path] {
        let mode = std::fs::metadata(path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o644, "{}", path.display());
    }
}
