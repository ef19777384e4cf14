//! Integration tests for first-run bootstrap and returning-user recovery

mod common;

use std::sync::Arc;

use stowage::prelude::*;
use stowage::session;

#[tokio::test]
async fn test_first_run_store_layout() {
    let (drive, store, credentials) = common::setup_test_env().await;

    // Exactly four blobs: the MID and TMID indirection records plus the
    // root-parent and root directory envelopes (their listings are small
    // enough to stay inline, so no chunk blobs).
    assert_eq!(store.len().await, 4);
    assert!(
        store
            .contains(&session::mid_name(&credentials.keyword, &credentials.pin))
            .await
    );
    assert!(
        store
            .contains(&session::tmid_name(
                &credentials.keyword,
                &credentials.pin,
                &credentials.password
            ))
            .await
    );
    assert!(store.contains(drive.root_parent_id()).await);

    // The root directory starts out empty.
    let children = drive.list_directory("/".as_ref(), None).await.unwrap();
    assert!(children.is_empty());
}

#[tokio::test]
async fn test_recovery_restores_identities() {
    let (drive, store, credentials) = common::setup_test_env().await;
    let unique_user_id = *drive.unique_user_id();
    let root_parent_id = *drive.root_parent_id();
    common::write_file(&drive, "/kept.txt", b"still here").await;
    drop(drive);

    let recovered = Drive::new(store, &credentials, DriveConfig::default())
        .await
        .unwrap();
    assert_eq!(*recovered.unique_user_id(), unique_user_id);
    assert_eq!(*recovered.root_parent_id(), root_parent_id);

    // The recovered session reaches the same tree.
    assert_eq!(common::read_file(&recovered, "/kept.txt").await, b"still here");
}

#[tokio::test]
async fn test_recovery_does_not_recreate_root() {
    let (drive, store, credentials) = common::setup_test_env().await;
    common::write_file(&drive, "/a.txt", b"x").await;
    let blobs_before = store.len().await;
    drop(drive);

    let _recovered = Drive::new(store.clone(), &credentials, DriveConfig::default())
        .await
        .unwrap();
    assert_eq!(store.len().await, blobs_before);
}

#[tokio::test]
async fn test_wrong_credentials_rejected() {
    let (_drive, store, _credentials) = common::setup_test_env().await;

    let wrong = Credentials::new("keyword", "1234", "not-the-password");
    let result = Drive::new(store, &wrong, DriveConfig::default()).await;
    assert!(matches!(result, Err(DriveError::Decryption)));
}

#[tokio::test]
async fn test_two_users_share_a_store() {
    let (first, store, _credentials) = common::setup_test_env().await;
    common::write_file(&first, "/mine.txt", b"first user data").await;

    let other_credentials = Credentials::new("other", "9999", "secret");
    let second = Drive::new(store, &other_credentials, DriveConfig::default())
        .await
        .unwrap();

    // Distinct identities, distinct roots; the second user sees an
    // empty tree.
    assert_ne!(second.unique_user_id(), first.unique_user_id());
    assert_ne!(second.root_parent_id(), first.root_parent_id());
    let children = second.list_directory("/".as_ref(), None).await.unwrap();
    assert!(children.is_empty());

    assert_eq!(common::read_file(&first, "/mine.txt").await, b"first user data");
}

#[tokio::test]
async fn test_mount_state_waiting() {
    let (drive, _store, _credentials) = common::setup_test_env().await;
    let drive = Arc::new(drive);

    let waiter = {
        let drive = drive.clone();
        tokio::spawn(async move { drive.wait_until_mounted().await })
    };
    drive.set_mount_state(true);
    assert!(waiter.await.unwrap());

    let unmount_waiter = {
        let drive = drive.clone();
        tokio::spawn(async move { drive.wait_until_unmounted().await })
    };
    drive.set_mount_state(false);
    // Idempotent: a second unmount is a no-op.
    drive.set_mount_state(false);
    unmount_waiter.await.unwrap();
}
