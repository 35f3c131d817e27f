use layerconf::{Client, InMemory, store::StoreError};

use crate::helpers::{read, test_client, write};

#[tokio::test]
async fn test_transaction_commit() {
    let client = test_client().await;
    let mut txn = client.new_transaction("master").await.unwrap();
    txn.write("a", "a").unwrap();
    txn.write("b", "b").unwrap();
    txn.write("c", "c").unwrap();
    let head = txn.commit("Write test").await.unwrap();

    assert_eq!(client.head("master").await.unwrap(), head);
    for key in ["a", "b", "c"] {
        assert_eq!(read(&client, "master", key).await.as_deref(), Some(key));
    }

    let history = client.history("master").await.unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].message, "Write test");
    let time = chrono::DateTime::parse_from_rfc3339(&history[0].time()).unwrap();
    assert_eq!(time.timestamp_millis() as u64, history[0].timestamp);
}

#[tokio::test]
async fn test_write_then_read_round_trip() {
    let client = test_client().await;
    write(&client, "master", "services/web/port", "8080").await;

    let head = client.head("master").await.unwrap();
    let snapshot = client.snapshot(head);
    assert_eq!(snapshot.read("services/web/port").await.unwrap(), "8080");
    assert_eq!(snapshot.read(["services", "web", "port"]).await.unwrap(), "8080");
}

#[tokio::test]
async fn test_staged_writes_invisible_until_commit() {
    let client = test_client().await;
    let mut txn = client.new_transaction("master").await.unwrap();
    txn.write("pending", "value").unwrap();

    assert_eq!(read(&client, "master", "pending").await, None);
    txn.commit("Publish").await.unwrap();
    assert_eq!(read(&client, "master", "pending").await.as_deref(), Some("value"));
}

#[tokio::test]
async fn test_conflict_requires_new_transaction() {
    let client = test_client().await;
    let mut stale = client.new_transaction("master").await.unwrap();
    write(&client, "master", "x", "first").await;

    stale.write("x", "second").unwrap();
    let err = stale.commit("Too late").await.unwrap_err();
    assert!(err.is_conflict());
    assert!(matches!(
        err,
        layerconf::Error::Store(StoreError::Conflict { ref branch, .. }) if branch == "master"
    ));

    let mut retry = client.new_transaction("master").await.unwrap();
    retry.write("x", "second").unwrap();
    retry.commit("Retry").await.unwrap();
    assert_eq!(read(&client, "master", "x").await.as_deref(), Some("second"));
}

#[tokio::test]
async fn test_missing_branch_and_unreachable_store() {
    let client = test_client().await;
    assert!(client.new_transaction("nope").await.unwrap_err().is_not_found());
    assert!(client.head("nope").await.unwrap_err().is_not_found());

    let store = InMemory::new();
    store.set_reachable(false);
    assert!(Client::dial(store).await.unwrap_err().is_connection_error());
}

#[tokio::test]
async fn test_remove_subtree() {
    let client = test_client().await;
    write(&client, "master", "tests/a", "1").await;
    write(&client, "master", "tests/b", "2").await;
    crate::helpers::rm(&client, "master", "tests").await;

    let snapshot = client.snapshot_of("master").await.unwrap();
    assert_eq!(snapshot.try_list("tests").await.unwrap(), None);
    assert!(snapshot.list("").await.unwrap().is_empty());
}
