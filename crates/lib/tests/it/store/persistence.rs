use std::sync::Arc;

use tempfile::TempDir;

use layerconf::{Client, InMemory, Record};

use crate::helpers::{read, write};

#[tokio::test]
async fn test_record_state_survives_save_and_load() {
    let dir = TempDir::new().unwrap();
    let file = dir.path().join("store.json");

    let store = Arc::new(InMemory::new());
    {
        let client = Client::dial_shared(store.clone()).await.unwrap();
        write(&client, "master", "tests/name", "hello").await;
        let record = Record::new(&client, ["master", "defaults"], "defaults", "state", "tests")
            .await
            .unwrap();
        record.int_field("ncpu", 2).await.unwrap();
        record.seal().await.unwrap();
        record.upgrade(2).await.unwrap();
    }
    store.save_to_file(&file).await.unwrap();

    let loaded = InMemory::load_from_file(&file).await.unwrap();
    let client = Client::dial(loaded).await.unwrap();
    assert_eq!(read(&client, "master", "tests/name").await.as_deref(), Some("hello"));
    assert_eq!(read(&client, "defaults", "tests/ncpu").await.as_deref(), Some("2"));

    let record = Record::new(&client, ["master", "defaults"], "defaults", "state", "tests")
        .await
        .unwrap();
    assert_eq!(record.schema_version(), 2);
    let ncpu = record.int_field("ncpu", 2).await.unwrap();
    assert_eq!(ncpu.value(), 2);
}

#[tokio::test]
async fn test_load_missing_file() {
    let dir = TempDir::new().unwrap();
    let store = InMemory::load_from_file(dir.path().join("missing.json"))
        .await
        .unwrap();
    let client = Client::dial(store).await.unwrap();
    assert_eq!(client.branches().await.unwrap(), vec!["master"]);
}

#[tokio::test]
async fn test_load_invalid_file() {
    let dir = TempDir::new().unwrap();
    let file = dir.path().join("invalid.json");
    tokio::fs::write(&file, "{ not json").await.unwrap();

    let err = InMemory::load_from_file(&file).await.unwrap_err();
    assert!(err.is_store_error());
    assert!(err.is_io_error());
}
