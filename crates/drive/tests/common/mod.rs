//! Shared test utilities for drive integration tests
#![allow(dead_code)]

use std::sync::Arc;

use stowage::prelude::*;

/// Set up a test environment: a fresh in-memory store and a drive
/// bootstrapped against it with fixed test credentials.
pub async fn setup_test_env() -> (Drive<MemoryStore>, Arc<MemoryStore>, Credentials) {
    let store = Arc::new(MemoryStore::unbounded());
    let credentials = Credentials::new("keyword", "1234", "password");
    let drive = Drive::new(store.clone(), &credentials, DriveConfig::default())
        .await
        .unwrap();
    (drive, store, credentials)
}

/// Create a file at `path` holding `content`, through the full
/// open-write-close lifecycle.
pub async fn write_file(drive: &Drive<MemoryStore>, path: &str, content: &[u8]) {
    let mut context = drive.create_file(path.as_ref()).await.unwrap();
    context.write(content, 0).await.unwrap();
    drive.close(&mut context).await.unwrap();
}

/// Read the full content of the file at `path`.
pub async fn read_file(drive: &Drive<MemoryStore>, path: &str) -> Vec<u8> {
    let mut context = drive.open(path.as_ref()).await.unwrap();
    let size = context.size();
    let data = context.read(0, size as usize).await.unwrap();
    drive.close(&mut context).await.unwrap();
    data
}
