mod common;

use std::{sync::Arc, time::Duration};

use chrono::Utc;
use common::{FakeCluster, endpoints};
use kafka_gateway::{
    adapters::SqliteMirror,
    config::models::SqliteConfig,
    core::{BrokerClient, model::NewMirrorRecord, security::SecurityMaterial},
    ports::mirror::{MessageMirror, MirrorError},
};
use tempfile::TempDir;

fn config(dir: &TempDir) -> SqliteConfig {
    SqliteConfig {
        enabled: true,
        db_path: dir
            .path()
            .join("nested/data/messages.db")
            .to_string_lossy()
            .into_owned(),
        table_name: "kafka_messages".to_string(),
    }
}

fn record(topic: &str, key: Option<&[u8]>, value: &str, offset: i64) -> NewMirrorRecord {
    NewMirrorRecord {
        topic: topic.to_string(),
        key: key.map(<[u8]>::to_vec),
        value: value.as_bytes().to_vec(),
        partition: 0,
        offset,
    }
}

#[tokio::test]
async fn test_save_and_query_newest_first() {
    let dir = TempDir::new().unwrap();
    let mirror = SqliteMirror::open(&config(&dir)).await.unwrap();

    mirror.save(record("orders", Some(b"k"), "first", 0)).await.unwrap();
    mirror.save(record("payments", None, "other", 0)).await.unwrap();
    mirror.save(record("orders", None, "second", 1)).await.unwrap();
    mirror.save(record("orders", Some(b""), "third", 2)).await.unwrap();

    let page = mirror.query_by_topic("orders", 10, 0).await.unwrap();
    let values: Vec<&[u8]> = page.iter().map(|r| r.value.as_slice()).collect();
    assert_eq!(values, vec![b"third".as_slice(), b"second", b"first"]);

    // Absent and empty keys survive the round trip distinctly
    assert_eq!(page[0].key, Some(Vec::new()));
    assert_eq!(page[1].key, None);
    assert_eq!(page[2].key, Some(b"k".to_vec()));
    assert!(page[0].timestamp >= page[2].timestamp);

    let paged = mirror.query_by_topic("orders", 1, 1).await.unwrap();
    assert_eq!(paged.len(), 1);
    assert_eq!(paged[0].value, b"second");

    assert!(mirror.query_by_topic("missing", 10, 0).await.unwrap().is_empty());
    assert_eq!(mirror.count().await.unwrap(), 4);
    assert_eq!(mirror.count_by_topic("orders").await.unwrap(), 3);
    assert_eq!(mirror.count_by_topic("payments").await.unwrap(), 1);
    assert_eq!(mirror.count_by_topic("missing").await.unwrap(), 0);

    mirror.close().await.unwrap();
}

#[tokio::test]
async fn test_reopen_keeps_records() {
    let dir = TempDir::new().unwrap();

    let mirror = SqliteMirror::open(&config(&dir)).await.unwrap();
    mirror.save(record("orders", None, "kept", 7)).await.unwrap();
    mirror.close().await.unwrap();

    let mirror = SqliteMirror::open(&config(&dir)).await.unwrap();
    let page = mirror.query_by_topic("orders", 10, 0).await.unwrap();
    assert_eq!(page.len(), 1);
    assert_eq!(page[0].offset, 7);
    mirror.close().await.unwrap();
}

#[tokio::test]
async fn test_operations_after_close_fail() {
    let dir = TempDir::new().unwrap();
    let mirror = SqliteMirror::open(&config(&dir)).await.unwrap();

    mirror.close().await.unwrap();
    mirror.close().await.unwrap();

    let err = mirror.save(record("orders", None, "late", 0)).await.unwrap_err();
    assert!(matches!(err, MirrorError::Closed));
    assert!(matches!(mirror.count().await, Err(MirrorError::Closed)));
    assert!(matches!(
        mirror.count_by_topic("orders").await,
        Err(MirrorError::Closed)
    ));
}

#[tokio::test]
async fn test_published_message_is_mirrored_as_published() {
    let dir = TempDir::new().unwrap();
    let mirror = Arc::new(SqliteMirror::open(&config(&dir)).await.unwrap());
    let cluster = FakeCluster::new().with_topic("orders", &[0, 1, 2]);
    let client = BrokerClient::connect_with(
        endpoints(),
        &SecurityMaterial::Plaintext,
        &cluster.connector(),
        Some(mirror.clone() as Arc<dyn MessageMirror>),
    )
    .await
    .unwrap();

    let t0 = Utc::now();
    let published = client
        .publish("orders", Some(b"user-42".to_vec()), b"payload".to_vec())
        .await
        .unwrap();

    for _ in 0..100 {
        if mirror.count_by_topic("orders").await.unwrap() >= 1 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    let page = mirror.query_by_topic("orders", 10, 0).await.unwrap();
    assert_eq!(page.len(), 1);
    let stored = &page[0];
    assert_eq!(stored.topic, "orders");
    assert_eq!(stored.key.as_deref(), Some(b"user-42".as_slice()));
    assert_eq!(stored.value, b"payload");
    assert_eq!(stored.partition, published.partition);
    assert_eq!(stored.offset, published.offset);
    assert!(stored.timestamp >= t0, "{} is before {t0}", stored.timestamp);

    client.close().await.unwrap();
    assert!(matches!(mirror.count().await, Err(MirrorError::Closed)));
}
