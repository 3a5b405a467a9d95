use settlement_sync::archive::DirectoryArchive;
use settlement_sync_core::contract::ArchiveStore;
use settlement_sync_core::error::ArchiveError;
use std::fs;
use tempfile::tempdir;

#[tokio::test]
async fn list_returns_plain_files_only() {
    let root = tempdir().unwrap();
    fs::write(root.path().join("EXTRATO_2"), b"x").unwrap();
    fs::write(root.path().join("EXTRATO_1"), b"x").unwrap();
    fs::write(root.path().join(".EXTRATO_3.partial"), b"x").unwrap();
    fs::create_dir(root.path().join("2024")).unwrap();

    let archive = DirectoryArchive::new(root.path());
    let names: Vec<String> = archive.list().await.unwrap().into_iter().collect();
    assert_eq!(names, vec!["EXTRATO_1".to_string(), "EXTRATO_2".to_string()]);
}

#[tokio::test]
async fn missing_archive_directory_is_an_error() {
    let root = tempdir().unwrap();
    let archive = DirectoryArchive::new(root.path().join("not-mounted"));
    let err = archive.list().await.unwrap_err();
    assert!(matches!(err, ArchiveError::Io { .. }), "{err}");
}

#[tokio::test]
async fn store_moves_the_staged_file() {
    let staging = tempdir().unwrap();
    let root = tempdir().unwrap();
    let staged = staging.path().join("EXTRATO_1");
    fs::write(&staged, b"A0...").unwrap();

    let archive = DirectoryArchive::new(root.path());
    assert_eq!(archive.location("EXTRATO_1"), root.path().join("EXTRATO_1"));

    let stored = archive.store("EXTRATO_1", &staged).await.unwrap();
    assert_eq!(stored, root.path().join("EXTRATO_1"));
    assert_eq!(fs::read(&stored).unwrap(), b"A0...");
    assert!(!staged.exists());
    assert!(archive.list().await.unwrap().contains("EXTRATO_1"));
}

#[tokio::test]
async fn store_never_overwrites_an_archived_file() {
    let staging = tempdir().unwrap();
    let root = tempdir().unwrap();
    fs::write(root.path().join("EXTRATO_1"), b"original").unwrap();
    let staged = staging.path().join("EXTRATO_1");
    fs::write(&staged, b"new").unwrap();

    let archive = DirectoryArchive::new(root.path());
    let err = archive.store("EXTRATO_1", &staged).await.unwrap_err();
    assert!(matches!(err, ArchiveError::AlreadyArchived(ref name) if name == "EXTRATO_1"));
    assert_eq!(fs::read(root.path().join("EXTRATO_1")).unwrap(), b"original");
    assert!(staged.exists());
}

#[tokio::test]
async fn store_fails_when_the_staged_file_is_gone() {
    let staging = tempdir().unwrap();
    let root = tempdir().unwrap();
    let archive = DirectoryArchive::new(root.path());

    let err = archive
        .store("EXTRATO_1", &staging.path().join("EXTRATO_1"))
        .await
        .unwrap_err();
    assert!(matches!(err, ArchiveError::Io { .. }), "{err}");
    assert!(archive.list().await.unwrap().is_empty());
}

#[tokio::test]
async fn store_by_copy_files_the_copy_and_leaves_no_partial() {
    let staging = tempdir().unwrap();
    let root = tempdir().unwrap();
    let staged = staging.path().join("EXTRATO_1");
    fs::write(&staged, b"A0...").unwrap();

    let archive = DirectoryArchive::new(root.path());
    let stored = archive.store_by_copy("EXTRATO_1", &staged).await.unwrap();

    assert_eq!(stored, root.path().join("EXTRATO_1"));
    assert_eq!(fs::read(&stored).unwrap(), b"A0...");
    assert!(!staged.exists());
    assert!(!root.path().join(".EXTRATO_1.partial").exists());
    let entries: Vec<_> = fs::read_dir(root.path()).unwrap().collect();
    assert_eq!(entries.len(), 1);
}

#[tokio::test]
async fn store_by_copy_succeeds_when_the_staged_copy_cannot_be_removed() {
    use std::os::unix::fs::PermissionsExt;

    let staging = tempdir().unwrap();
    let root = tempdir().unwrap();
    let staged = staging.path().join("EXTRATO_1");
    fs::write(&staged, b"A0...").unwrap();
    // A read-only directory forbids unlinking its entries (root ignores the mode bits).
    fs::set_permissions(staging.path(), fs::Permissions::from_mode(0o555)).unwrap();
    let enforced = fs::write(staging.path().join("canary"), b"").is_err();

    let archive = DirectoryArchive::new(root.path());
    let result = archive.store_by_copy("EXTRATO_1", &staged).await;
    fs::set_permissions(staging.path(), fs::Permissions::from_mode(0o755)).unwrap();

    let stored = result.expect("a filed statement is a successful store");
    assert_eq!(fs::read(&stored).unwrap(), b"A0...");
    assert!(archive.list().await.unwrap().contains("EXTRATO_1"));
    assert!(!root.path().join(".EXTRATO_1.partial").exists());
    if enforced {
        assert!(staged.exists());
    }
}

#[tokio::test]
async fn store_by_copy_into_a_missing_archive_keeps_the_staged_file() {
    let staging = tempdir().unwrap();
    let root = tempdir().unwrap();
    let staged = staging.path().join("EXTRATO_1");
    fs::write(&staged, b"A0...").unwrap();

    let archive = DirectoryArchive::new(root.path().join("not-mounted"));
    let err = archive.store_by_copy("EXTRATO_1", &staged).await.unwrap_err();
    assert!(matches!(err, ArchiveError::Io { .. }), "{err}");
    assert!(staged.exists());
}

#[tokio::test]
async fn store_by_copy_never_overwrites_an_archived_file() {
    let staging = tempdir().unwrap();
    let root = tempdir().unwrap();
    fs::write(root.path().join("EXTRATO_1"), b"original").unwrap();
    let staged = staging.path().join("EXTRATO_1");
    fs::write(&staged, b"new").unwrap();

    let archive = DirectoryArchive::new(root.path());
    let err = archive.store_by_copy("EXTRATO_1", &staged).await.unwrap_err();
    assert!(matches!(err, ArchiveError::AlreadyArchived(_)));
    assert_eq!(fs::read(root.path().join("EXTRATO_1")).unwrap(), b"original");
    assert!(!root.path().join(".EXTRATO_1.partial").exists());
}
