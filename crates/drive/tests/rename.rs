//! Integration tests for rename and move operations

mod common;

use std::path::Path;
use std::sync::Arc;
use std::sync::Mutex;

use stowage::prelude::*;

#[tokio::test]
async fn test_rename_same_parent_no_target() {
    let (drive, _store, _credentials) = common::setup_test_env().await;
    common::write_file(&drive, "/x", b"payload").await;

    let (mut meta, _, _) = drive.get_meta_data(Path::new("/x")).await.unwrap();
    let original_map = meta.data_map().unwrap().clone();

    let reclaimed = drive
        .rename_file(Path::new("/x"), Path::new("/y"), &mut meta)
        .await
        .unwrap();
    assert_eq!(reclaimed, 0);

    assert!(matches!(
        drive.get_meta_data(Path::new("/x")).await,
        Err(DriveError::NotFound(_))
    ));
    let (renamed, _, _) = drive.get_meta_data(Path::new("/y")).await.unwrap();
    assert_eq!(renamed.data_map().unwrap(), &original_map);
    assert_eq!(common::read_file(&drive, "/y").await, b"payload");
}

#[tokio::test]
async fn test_rename_cross_parent_with_collision() {
    let (drive, _store, _credentials) = common::setup_test_env().await;
    drive.create_directory(Path::new("/A")).await.unwrap();
    drive.create_directory(Path::new("/B")).await.unwrap();
    common::write_file(&drive, "/A/x", b"ten bytes!").await;
    common::write_file(&drive, "/B/x", b"smo").await;

    let (mut meta, _, _) = drive.get_meta_data(Path::new("/A/x")).await.unwrap();
    let reclaimed = drive
        .rename_file(Path::new("/A/x"), Path::new("/B/x"), &mut meta)
        .await
        .unwrap();
    assert_eq!(reclaimed, 3);

    assert!(matches!(
        drive.get_meta_data(Path::new("/A/x")).await,
        Err(DriveError::NotFound(_))
    ));
    assert_eq!(common::read_file(&drive, "/B/x").await, b"ten bytes!");
    let (moved, _, _) = drive.get_meta_data(Path::new("/B/x")).await.unwrap();
    assert_eq!(moved.end_of_file, 10);
}

#[tokio::test]
async fn test_displaced_target_chunks_deleted() {
    let (drive, store, _credentials) = common::setup_test_env().await;
    drive.create_directory(Path::new("/A")).await.unwrap();
    drive.create_directory(Path::new("/B")).await.unwrap();
    common::write_file(&drive, "/A/x", b"small").await;
    // The displaced target is big enough to own chunk blobs.
    common::write_file(&drive, "/B/x", &vec![0x5au8; 20_000]).await;
    let blobs_with_target = store.len().await;

    let (mut meta, _, _) = drive.get_meta_data(Path::new("/A/x")).await.unwrap();
    let reclaimed = drive
        .rename_file(Path::new("/A/x"), Path::new("/B/x"), &mut meta)
        .await
        .unwrap();
    assert_eq!(reclaimed, 20_000);

    // The displaced target's chunk is gone from the store.
    assert_eq!(store.len().await, blobs_with_target - 1);
    assert_eq!(common::read_file(&drive, "/B/x").await, b"small");
}

#[tokio::test]
async fn test_rename_same_parent_with_collision() {
    let (drive, _store, _credentials) = common::setup_test_env().await;
    common::write_file(&drive, "/keepname", b"winner").await;
    common::write_file(&drive, "/loser", b"displaced").await;

    let (mut meta, _, _) = drive.get_meta_data(Path::new("/keepname")).await.unwrap();
    let reclaimed = drive
        .rename_file(Path::new("/keepname"), Path::new("/loser"), &mut meta)
        .await
        .unwrap();
    assert_eq!(reclaimed, 9);

    let children = drive.list_directory(Path::new("/"), None).await.unwrap();
    assert_eq!(children, vec!["loser"]);
    assert_eq!(common::read_file(&drive, "/loser").await, b"winner");
}

#[tokio::test]
async fn test_children_conserved_across_rename() {
    let (drive, _store, _credentials) = common::setup_test_env().await;
    for name in ["a", "b", "c"] {
        common::write_file(&drive, &format!("/{name}"), b"x").await;
    }

    let (mut meta, _, _) = drive.get_meta_data(Path::new("/b")).await.unwrap();
    drive
        .rename_file(Path::new("/b"), Path::new("/renamed"), &mut meta)
        .await
        .unwrap();

    let children = drive.list_directory(Path::new("/"), None).await.unwrap();
    assert_eq!(children, vec!["a", "c", "renamed"]);
}

#[tokio::test]
async fn test_case_only_rename() {
    let (drive, _store, _credentials) = common::setup_test_env().await;
    common::write_file(&drive, "/readme", b"content").await;

    let (mut meta, _, _) = drive.get_meta_data(Path::new("/readme")).await.unwrap();
    let reclaimed = drive
        .rename_file(Path::new("/readme"), Path::new("/README"), &mut meta)
        .await
        .unwrap();
    assert_eq!(reclaimed, 0);

    let children = drive.list_directory(Path::new("/"), None).await.unwrap();
    assert_eq!(children, vec!["README"]);
    assert_eq!(common::read_file(&drive, "/README").await, b"content");
}

#[tokio::test]
async fn test_rename_directory_carries_subtree() {
    let (drive, _store, _credentials) = common::setup_test_env().await;
    drive.create_directory(Path::new("/old")).await.unwrap();
    common::write_file(&drive, "/old/one.txt", b"1").await;
    common::write_file(&drive, "/old/two.txt", b"2").await;
    drive.create_directory(Path::new("/target")).await.unwrap();

    let (mut meta, _, _) = drive.get_meta_data(Path::new("/old")).await.unwrap();
    drive
        .rename_file(Path::new("/old"), Path::new("/target/new"), &mut meta)
        .await
        .unwrap();

    assert_eq!(common::read_file(&drive, "/target/new/one.txt").await, b"1");
    assert_eq!(common::read_file(&drive, "/target/new/two.txt").await, b"2");
    assert!(matches!(
        drive.list_directory(Path::new("/old"), None).await,
        Err(DriveError::NotFound(_))
    ));
}

#[tokio::test]
async fn test_rename_onto_nonempty_directory_fails() {
    let (drive, _store, _credentials) = common::setup_test_env().await;
    common::write_file(&drive, "/file.txt", b"data").await;
    drive.create_directory(Path::new("/full")).await.unwrap();
    common::write_file(&drive, "/full/occupant", b"x").await;

    let (mut meta, _, _) = drive.get_meta_data(Path::new("/file.txt")).await.unwrap();
    let before = (meta.change_time, meta.last_write_time);

    let result = drive
        .rename_file(Path::new("/file.txt"), Path::new("/full"), &mut meta)
        .await;
    assert!(matches!(result, Err(DriveError::InvalidParameter(_))));

    // The failed attempt restored the caller's timestamps.
    assert_eq!((meta.change_time, meta.last_write_time), before);
    assert_eq!(common::read_file(&drive, "/file.txt").await, b"data");
}

#[tokio::test]
async fn test_rename_onto_empty_directory_displaces_it() {
    let (drive, _store, _credentials) = common::setup_test_env().await;
    common::write_file(&drive, "/file.txt", b"data").await;
    drive.create_directory(Path::new("/empty")).await.unwrap();

    let (mut meta, _, _) = drive.get_meta_data(Path::new("/file.txt")).await.unwrap();
    let reclaimed = drive
        .rename_file(Path::new("/file.txt"), Path::new("/empty"), &mut meta)
        .await
        .unwrap();
    assert_eq!(reclaimed, 4096);

    assert_eq!(common::read_file(&drive, "/empty").await, b"data");
}

#[tokio::test]
async fn test_rename_notifies_observer() {
    let (mut drive, _store, _credentials) = common::setup_test_env().await;
    let seen: Arc<Mutex<Vec<(String, String)>>> = Arc::new(Mutex::new(Vec::new()));
    {
        let seen = seen.clone();
        drive.set_rename_observer(move |from, to| {
            seen.lock().unwrap().push((
                from.display().to_string(),
                to.display().to_string(),
            ));
        });
    }

    common::write_file(&drive, "/x", b"data").await;
    let (mut meta, _, _) = drive.get_meta_data(Path::new("/x")).await.unwrap();
    drive
        .rename_file(Path::new("/x"), Path::new("/y"), &mut meta)
        .await
        .unwrap();

    assert_eq!(
        seen.lock().unwrap().clone(),
        vec![("/x".to_string(), "/y".to_string())]
    );
}

#[tokio::test]
async fn test_rename_to_reserved_name_fails() {
    let (drive, _store, _credentials) = common::setup_test_env().await;
    common::write_file(&drive, "/fine.txt", b"data").await;

    let (mut meta, _, _) = drive.get_meta_data(Path::new("/fine.txt")).await.unwrap();
    let result = drive
        .rename_file(Path::new("/fine.txt"), Path::new("/aux"), &mut meta)
        .await;
    assert!(matches!(result, Err(DriveError::InvalidParameter(_))));
}
