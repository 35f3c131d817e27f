use std::sync::{
    Arc,
    atomic::{AtomicUsize, Ordering},
};

use layerconf::record::RecordError;

use crate::helpers::{read, setup, test_record, write};

#[tokio::test]
async fn test_steps_run_in_ascending_order() {
    let (client, record) = setup().await;
    write(&client, "master", "tests/timeout", "30").await;

    // Registered out of order on purpose.
    record
        .on_upgrade(3, |m| {
            let secs = m.get_as::<i64>("timeout-ms").map(|ms| ms / 1000);
            match secs {
                Some(secs) => m.set_as("timeout-secs", secs),
                None => Err(m.fail("timeout-ms missing")),
            }
        })
        .await
        .unwrap();
    record
        .on_upgrade(2, |m| {
            if let Some(secs) = m.get_as::<i64>("timeout") {
                m.set_as("timeout-ms", secs * 1000)?;
            }
            m.remove("timeout")
        })
        .await
        .unwrap();

    record.upgrade(3).await.unwrap();
    assert_eq!(record.schema_version(), 3);
    assert_eq!(read(&client, "master", "tests/timeout").await, None);
    assert_eq!(read(&client, "master", "tests/timeout-ms").await.as_deref(), Some("30000"));
    assert_eq!(read(&client, "master", "tests/timeout-secs").await.as_deref(), Some("30"));
    assert_eq!(read(&client, "state", "tests/schema-version").await.as_deref(), Some("3"));
}

#[tokio::test]
async fn test_upgrade_is_idempotent() {
    let (client, record) = setup().await;
    write(&client, "master", "tests/ncpu", "5").await;
    record.on_upgrade(2, |m| m.set("ncpu", "1")).await.unwrap();
    let ncpu_f = record.int_field("ncpu", 1).await.unwrap();

    record.upgrade(2).await.unwrap();
    let first = ncpu_f.get();
    let head = client.head("master").await.unwrap();

    record.upgrade(2).await.unwrap();
    record.upgrade(1).await.unwrap();
    assert_eq!(ncpu_f.get(), first);
    assert_eq!(first.0, 1);
    assert_eq!(client.head("master").await.unwrap(), head);
}

#[tokio::test]
async fn test_rerun_after_stale_version_is_harmless() {
    let (client, record) = setup().await;
    write(&client, "master", "tests/ncpu", "5").await;
    record.on_upgrade(2, |m| m.set("ncpu", "1")).await.unwrap();
    record.upgrade(2).await.unwrap();
    let head = client.head("master").await.unwrap();

    // Simulate a crash that lost the persisted version.
    write(&client, "state", "tests/schema-version", "1").await;
    let restarted = test_record(&client).await;
    assert_eq!(restarted.schema_version(), 1);
    let runs = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&runs);
    restarted
        .on_upgrade(2, move |m| {
            counter.fetch_add(1, Ordering::SeqCst);
            m.set("ncpu", "1")
        })
        .await
        .unwrap();
    restarted.upgrade(2).await.unwrap();

    assert_eq!(runs.load(Ordering::SeqCst), 1);
    assert_eq!(client.head("master").await.unwrap(), head);
    assert_eq!(restarted.schema_version(), 2);
}

#[tokio::test]
async fn test_failed_step_stops_at_last_finished_version() {
    let (client, record) = setup().await;
    let a_f = record.string_field("a", "0").await.unwrap();
    let (_, version) = a_f.get();
    record.on_upgrade(2, |m| m.set("a", "1")).await.unwrap();
    record
        .on_upgrade(3, |m| Err(m.fail("cannot convert")))
        .await
        .unwrap();

    let err = record.upgrade(3).await.unwrap_err();
    assert!(matches!(
        err,
        layerconf::Error::Record(RecordError::UpgradeFailed { version: 3, .. })
    ));
    assert_eq!(record.schema_version(), 2);
    assert_eq!(read(&client, "master", "tests/a").await.as_deref(), Some("1"));
    assert_eq!(read(&client, "state", "tests/schema-version").await.as_deref(), Some("2"));
    // Fields reflect what the finished steps committed.
    assert!(a_f.has_changed(version));
    assert_eq!(a_f.value(), "1");
}

#[tokio::test]
async fn test_migration_sees_merged_view() {
    let (client, record) = setup().await;
    write(&client, "defaults", "tests/mode", "fast").await;
    write(&client, "master", "tests/level", "3").await;

    let seen = Arc::new(std::sync::Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    record
        .on_upgrade(2, move |m| {
            sink.lock().unwrap().extend(m.keys());
            assert!(!m.is_overridden("mode"));
            m.rename("level", "verbosity")
        })
        .await
        .unwrap();
    record.upgrade(2).await.unwrap();

    assert_eq!(*seen.lock().unwrap(), vec!["level", "mode"]);
    assert_eq!(read(&client, "master", "tests/verbosity").await.as_deref(), Some("3"));
    assert_eq!(read(&client, "master", "tests/level").await, None);
    // Lower-priority branches are never modified by upgrades.
    assert_eq!(read(&client, "defaults", "tests/mode").await.as_deref(), Some("fast"));
}

#[tokio::test]
async fn test_migrates_nested_field() {
    let (client, record) = setup().await;
    write(&client, "master", "tests/net/port", "80").await;
    let port_f = record.int_field("net/port", 1).await.unwrap();
    let (port, version) = port_f.get();
    assert_eq!(port, 80);

    let seen = Arc::new(std::sync::Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    record
        .on_upgrade(2, move |m| {
            sink.lock().unwrap().extend(m.keys());
            let port = m
                .get_as::<i64>("net/port")
                .ok_or_else(|| m.fail("net/port missing"))?;
            m.set_as("net/port", port + 8000)?;
            m.rename("net/port", "net/listen/port")?;
            m.set_as("net/port", port + 8000)
        })
        .await
        .unwrap();
    record.upgrade(2).await.unwrap();

    assert!(seen.lock().unwrap().contains(&"net/port".to_string()));
    assert!(port_f.has_changed(version));
    assert_eq!(port_f.value(), 8080);
    assert_eq!(read(&client, "master", "tests/net/port").await.as_deref(), Some("8080"));
    assert_eq!(read(&client, "master", "tests/net/listen/port").await.as_deref(), Some("8080"));
}
