use crate::helpers::{setup, write};

#[tokio::test]
async fn test_config_lifecycle() {
    let (client, record) = setup().await;
    record
        .on_upgrade(2, |m| m.set_as("ncpu", 1i64))
        .await
        .unwrap();

    write(&client, "master", "tests/name", "hello").await;
    write(&client, "master", "tests/ncpu", "1").await;
    write(&client, "master", "tests/running", "true").await;
    record.wait().await.unwrap();

    let name_f = record.string_field("name", "hello").await.unwrap();
    let ncpu_f = record.int_field("ncpu", 1).await.unwrap();
    let running_f = record.bool_field("running", true).await.unwrap();

    let (name, mut name_v) = name_f.get();
    let (ncpu, mut ncpu_v) = ncpu_f.get();
    let (running, mut running_v) = running_f.get();
    assert_eq!((name.as_str(), ncpu, running), ("hello", 1, true));
    assert!(!name_f.has_changed(name_v));
    assert!(!ncpu_f.has_changed(ncpu_v));
    assert!(!running_f.has_changed(running_v));

    // A new name is picked up by the next wait; other fields stay put.
    write(&client, "master", "tests/name", "there").await;
    record.wait().await.unwrap();
    assert!(name_f.has_changed(name_v));
    let (name, v) = name_f.get();
    assert_eq!(name, "there");
    name_v = v;
    assert!(!ncpu_f.has_changed(ncpu_v));
    assert!(!running_f.has_changed(running_v));

    write(&client, "master", "tests/ncpu", "5").await;
    record.wait().await.unwrap();
    assert!(ncpu_f.has_changed(ncpu_v));
    let (ncpu, v) = ncpu_f.get();
    assert_eq!(ncpu, 5);
    ncpu_v = v;

    // Malformed content resolves to the default instead of failing.
    write(&client, "master", "tests/running", "rubbish").await;
    record.wait().await.unwrap();
    assert!(running_f.has_changed(running_v));
    let (running, v) = running_f.get();
    assert!(running);
    running_v = v;

    assert!(!ncpu_f.has_changed(ncpu_v));
    assert!(!name_f.has_changed(name_v));

    // Upgrading to the current schema version does nothing.
    record.upgrade(1).await.unwrap();
    assert!(!ncpu_f.has_changed(ncpu_v));
    assert_eq!(record.schema_version(), 1);

    record.upgrade(2).await.unwrap();
    assert!(ncpu_f.has_changed(ncpu_v));
    let (ncpu, v) = ncpu_f.get();
    assert_eq!(ncpu, 1);
    assert_eq!(record.schema_version(), 2);

    record.upgrade(2).await.unwrap();
    assert!(!ncpu_f.has_changed(v));
    assert_eq!(ncpu_f.value(), 1);
    assert!(!running_f.has_changed(running_v));
}

#[tokio::test]
async fn test_rewriting_identical_value_keeps_version() {
    let (client, record) = setup().await;
    write(&client, "master", "tests/name", "hello").await;
    let name_f = record.string_field("name", "x").await.unwrap();
    let (_, version) = name_f.get();

    write(&client, "master", "tests/name", "hello").await;
    write(&client, "master", "tests/other", "unrelated").await;
    record.wait().await.unwrap();
    record.wait().await.unwrap();

    assert!(!name_f.has_changed(version));
    assert_eq!(record.generation(), 2);
}

#[tokio::test]
async fn test_wait_without_fields_bumps_generation() {
    let (_client, record) = setup().await;
    for expected in 1..=3 {
        record.wait().await.unwrap();
        assert_eq!(record.generation(), expected);
    }
}

#[tokio::test]
async fn test_removed_value_falls_back_to_default() {
    let (client, record) = setup().await;
    write(&client, "master", "tests/ncpu", "8").await;
    let ncpu_f = record.int_field("ncpu", 2).await.unwrap();
    let (ncpu, version) = ncpu_f.get();
    assert_eq!(ncpu, 8);

    crate::helpers::rm(&client, "master", "tests/ncpu").await;
    record.wait().await.unwrap();
    assert!(ncpu_f.has_changed(version));
    assert_eq!(ncpu_f.value(), 2);
}

#[tokio::test]
async fn test_clones_share_fields() {
    let (client, record) = setup().await;
    let other = record.clone();
    let name_f = record.string_field("name", "a").await.unwrap();
    let same = other.string_field("name", "b").await.unwrap();

    write(&client, "master", "tests/name", "c").await;
    other.wait().await.unwrap();
    assert_eq!(name_f.value(), "c");
    assert_eq!(same.value(), "c");
    assert_eq!(record.generation(), 1);
}
