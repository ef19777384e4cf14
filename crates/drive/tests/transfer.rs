//! Integration tests for DataMap transfer between drive instances

mod common;

use std::path::Path;

use stowage::prelude::*;

#[tokio::test]
async fn test_data_map_transfer_between_users() {
    let (sender, store, _credentials) = common::setup_test_env().await;

    // Big enough that the content lives in chunk blobs, which is the
    // point of shipping a DataMap instead of the bytes.
    let content: Vec<u8> = (0..30_000).map(|i| (i % 253) as u8).collect();
    common::write_file(&sender, "/original.bin", &content).await;

    let serialised = sender
        .get_data_map(Path::new("/original.bin"))
        .await
        .unwrap();

    // A second user on the same store imports the file without
    // re-uploading a single chunk.
    let receiver = Drive::new(
        store.clone(),
        &Credentials::new("receiver", "0000", "pw"),
        DriveConfig::default(),
    )
    .await
    .unwrap();
    let blobs_before_insert = store.len().await;

    receiver
        .insert_data_map(Path::new("/imported.bin"), &serialised)
        .await
        .unwrap();
    assert_eq!(store.len().await, blobs_before_insert);

    assert_eq!(common::read_file(&receiver, "/imported.bin").await, content);
    let (meta, _, _) = receiver
        .get_meta_data(Path::new("/imported.bin"))
        .await
        .unwrap();
    assert_eq!(meta.end_of_file, content.len() as u64);
}

#[tokio::test]
async fn test_get_data_map_rejects_directories() {
    let (drive, _store, _credentials) = common::setup_test_env().await;
    drive.create_directory(Path::new("/docs")).await.unwrap();

    let result = drive.get_data_map(Path::new("/docs")).await;
    assert!(matches!(result, Err(DriveError::InvalidParameter(_))));
}

#[tokio::test]
async fn test_insert_data_map_rejects_garbage() {
    let (drive, _store, _credentials) = common::setup_test_env().await;

    let result = drive
        .insert_data_map(Path::new("/bad.bin"), &[0xff, 0x00, 0x13])
        .await;
    assert!(matches!(result, Err(DriveError::Parsing(_))));
}

#[tokio::test]
async fn test_reinsert_under_same_user() {
    let (drive, _store, _credentials) = common::setup_test_env().await;
    common::write_file(&drive, "/source.txt", b"round trip").await;

    let serialised = drive.get_data_map(Path::new("/source.txt")).await.unwrap();
    drive
        .insert_data_map(Path::new("/copy.txt"), &serialised)
        .await
        .unwrap();

    assert_eq!(common::read_file(&drive, "/copy.txt").await, b"round trip");
}
