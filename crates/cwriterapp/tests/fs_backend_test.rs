use cwriterapp::error::CwriterError;
use cwriterapp::store::backend::{BackendKind, StorageBackend};
use cwriterapp::store::mp_fs::MiniProgramFsBackend;
use cwriterapp::store::native_fs::NativeFsBackend;
use std::fs;
use tempfile::TempDir;

fn setup() -> (TempDir, NativeFsBackend, MiniProgramFsBackend) {
    let dir = TempDir::new().unwrap();
    let native = NativeFsBackend::new(dir.path().join("native"));
    let mp = MiniProgramFsBackend::new(dir.path().join("mp"));
    (dir, native, mp)
}

async fn exercise_basic_io(backend: &dyn StorageBackend) {
    // 1. Write
    backend
        .write_file("users/a/user.config.json", b"{\"id\":\"a\"}")
        .await
        .unwrap();

    // 2. Read
    assert_eq!(
        backend.read_file("users/a/user.config.json").await,
        Some(b"{\"id\":\"a\"}".to_vec())
    );

    // 3. Overwrite
    backend
        .write_file("users/a/user.config.json", b"{}")
        .await
        .unwrap();
    assert_eq!(
        backend.read_file("users/a/user.config.json").await,
        Some(b"{}".to_vec())
    );

    // 4. Delete
    assert!(backend.delete_file("users/a/user.config.json").await);
    assert_eq!(backend.read_file("users/a/user.config.json").await, None);
    assert!(backend.exists("users/a").await);
}

#[tokio::test]
async fn test_fs_backends_basic_io() {
    let (_dir, native, mp) = setup();
    exercise_basic_io(&native).await;
    exercise_basic_io(&mp).await;
    assert_eq!(native.kind(), BackendKind::NativeFs);
    assert_eq!(mp.kind(), BackendKind::MiniProgramFs);
    assert!(native.supports_listing());
    assert!(mp.supports_listing());
}

#[tokio::test]
async fn test_fs_backend_atomic_write_artifacts() {
    let (_dir, native, _) = setup();
    for i in 0..5 {
        native
            .write_file("logs/a/operations.json", format!("[{}]", i).as_bytes())
            .await
            .unwrap();
    }

    let entries: Vec<String> = fs::read_dir(native.root().join("logs/a"))
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    assert_eq!(entries, vec!["operations.json".to_string()]);
    assert_eq!(
        fs::read_to_string(native.root().join("logs/a/operations.json")).unwrap(),
        "[4]"
    );
}

#[tokio::test]
async fn test_fs_backend_lists_work_folders() {
    let (_dir, native, mp) = setup();
    for backend in [&native as &dyn StorageBackend, &mp] {
        backend.mkdir("users/a/works/100").await.unwrap();
        backend
            .write_file("users/a/works/200/work.config.json", b"{}")
            .await
            .unwrap();
        assert_eq!(
            backend.list_dir("users/a/works").await,
            vec!["100".to_string(), "200".to_string()]
        );
    }
}

#[tokio::test]
async fn test_fs_backend_delete_dir_removes_subtree() {
    let (_dir, native, _) = setup();
    native
        .write_file("users/a/works/1/chapters/chapters.json", b"[]")
        .await
        .unwrap();
    native
        .write_file("users/a/works/1/work.config.json", b"{}")
        .await
        .unwrap();

    assert!(native.delete_dir("users/a/works/1").await);
    assert!(!native.exists("users/a/works/1").await);
    assert!(native.exists("users/a/works").await);
}

#[tokio::test]
async fn test_fs_backend_write_error_carries_path() {
    let (_dir, native, _) = setup();
    native.write_file("blocker", b"x").await.unwrap();

    let err = native
        .write_file("blocker/inner.json", b"{}")
        .await
        .unwrap_err();
    match err {
        CwriterError::Io { path, .. } => assert!(path.contains("blocker")),
        other => panic!("unexpected error: {:?}", other),
    }
}
