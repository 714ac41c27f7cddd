//! Integration tests for the content store over both backends.

use sharex_storage::{
    BackendError, ContentStore, ContentStoreError, MemoryBackend, MemoryConnector, SledConnector,
};
use sharex_types::{ContentId, LocalFile};
use std::sync::Arc;
use tempfile::TempDir;

/// Helper to create a payload spanning several chunks
fn create_payload(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i % 251) as u8).collect()
}

fn create_file(name: &str, data: Vec<u8>) -> LocalFile {
    LocalFile::new(name, "application/octet-stream", data)
}

#[tokio::test]
async fn sled_store_handles_multi_chunk_payloads() {
    let temp_dir = TempDir::new().unwrap();
    let store = ContentStore::new(SledConnector::new(temp_dir.path()).with_chunk_size(1024));

    let file = create_file("video.bin", create_payload(10_000));
    let cid = store.store(&file).await.unwrap();

    assert_eq!(cid, ContentId::from_data(&file.data));
    assert_eq!(store.retrieve(&cid).await.unwrap(), file.data);

    let descriptor = store.list(&cid).await.unwrap().unwrap();
    assert_eq!(descriptor.name, "video.bin");
    assert_eq!(descriptor.size_bytes, 10_000);
}

#[tokio::test]
async fn sled_store_keeps_independent_entries() {
    let temp_dir = TempDir::new().unwrap();
    let store = ContentStore::new(SledConnector::new(temp_dir.path()).with_chunk_size(7));

    let first = create_file("first.txt", b"first payload".to_vec());
    let second = create_file("second.txt", b"second, longer payload".to_vec());
    let first_cid = store.store(&first).await.unwrap();
    let second_cid = store.store(&second).await.unwrap();

    assert_ne!(first_cid, second_cid);
    assert_eq!(store.retrieve(&first_cid).await.unwrap(), first.data);
    assert_eq!(store.retrieve(&second_cid).await.unwrap(), second.data);
}

#[tokio::test]
async fn empty_payload_round_trips() {
    let temp_dir = TempDir::new().unwrap();
    let store = ContentStore::new(SledConnector::new(temp_dir.path()));

    let cid = store.store(&create_file("empty", Vec::new())).await.unwrap();
    assert!(store.retrieve(&cid).await.unwrap().is_empty());
    assert_eq!(store.list(&cid).await.unwrap().unwrap().size_bytes, 0);
}

#[tokio::test]
async fn memory_connector_shares_one_backend() {
    let backend = Arc::new(MemoryBackend::new(16));
    let writer = ContentStore::new(MemoryConnector::with_backend(backend.clone()));
    let reader = ContentStore::new(MemoryConnector::with_backend(backend.clone()));

    let file = create_file("shared.bin", create_payload(100));
    let cid = writer.store(&file).await.unwrap();

    assert_eq!(reader.retrieve(&cid).await.unwrap(), file.data);
    assert_eq!(backend.len(), 1);
}

#[tokio::test]
async fn unknown_cid_fails_on_sled() {
    let temp_dir = TempDir::new().unwrap();
    let store = ContentStore::new(SledConnector::new(temp_dir.path()));
    let missing = ContentId::parse("b3deadbeef").unwrap();

    assert!(store.list(&missing).await.unwrap().is_none());
    match store.retrieve(&missing).await {
        Err(ContentStoreError::Retrieve {
            cid,
            source: BackendError::NotFound(_),
        }) => assert_eq!(cid, missing),
        other => panic!("unexpected result: {other:?}"),
    }
}
