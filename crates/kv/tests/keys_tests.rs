// Key range scans and value encoding

mod common;

use common::{memory_registry, sqlite_registry};
use serde::{Deserialize, Serialize};
use vellum_kv::{KeyRange, KvError, KvHandle};

#[derive(Debug, PartialEq, Serialize, Deserialize)]
struct Checkpoint {
    seq: u64,
    device: String,
}

async fn seed(handle: &KvHandle) {
    for key in ["a-1", "a-2", "a-10", "b-1", "a"] {
        handle.set(key, key).await.unwrap();
    }
}

async fn check_prefix_scan(handle: &KvHandle) {
    seed(handle).await;

    let keys = handle.keys(&KeyRange::prefix("a-"), None).await.unwrap();
    assert_eq!(keys, vec!["a-1", "a-10", "a-2"]);

    let stripped = handle.keys_with_prefix("a-", None).await.unwrap();
    assert_eq!(stripped, vec!["1", "10", "2"]);

    let limited = handle.keys_with_prefix("a-", Some(2)).await.unwrap();
    assert_eq!(limited, vec!["1", "10"]);

    let all = handle.keys(&KeyRange::all(), None).await.unwrap();
    assert_eq!(all, vec!["a", "a-1", "a-10", "a-2", "b-1"]);

    let bounded = handle
        .keys(&KeyRange::between("a-10", "b-1"), None)
        .await
        .unwrap();
    assert_eq!(bounded, vec!["a-10", "a-2", "b-1"]);
}

#[tokio::test]
async fn test_prefix_scan_memory() {
    let (_engine, registry) = memory_registry();
    let handle = registry.open("scan").await.unwrap();
    check_prefix_scan(&handle).await;
}

#[tokio::test]
async fn test_prefix_scan_sqlite() {
    let (_temp, registry) = sqlite_registry().await;
    let handle = registry.open("scan").await.unwrap();
    check_prefix_scan(&handle).await;
}

#[tokio::test]
async fn test_structured_values_roundtrip() {
    let (_engine, registry) = memory_registry();
    let handle = registry.open("sync").await.unwrap();
    let checkpoint = Checkpoint {
        seq: 17,
        device: "laptop".to_string(),
    };

    let key = handle.set("checkpoint", &checkpoint).await.unwrap();
    assert_eq!(key, "checkpoint");
    assert_eq!(
        handle.get::<Checkpoint>("checkpoint").await.unwrap(),
        Some(checkpoint)
    );
}

#[tokio::test]
async fn test_get_with_wrong_type_is_serialization_error() {
    let (_engine, registry) = memory_registry();
    let handle = registry.open("sync").await.unwrap();
    handle.set("seq", "not a number").await.unwrap();

    let err = handle.get::<u64>("seq").await.unwrap_err();
    assert!(matches!(err, KvError::Serialization(_)));
}

#[tokio::test]
async fn test_del_and_clear() {
    let (_engine, registry) = memory_registry();
    let handle = registry.open("scratch").await.unwrap();
    seed(&handle).await;

    handle.del("a-1").await.unwrap();
    handle.del("missing").await.unwrap();
    assert_eq!(handle.get::<String>("a-1").await.unwrap(), None);
    assert_eq!(
        handle.get::<String>("a-2").await.unwrap().as_deref(),
        Some("a-2")
    );

    handle.clear().await.unwrap();
    assert!(handle.keys(&KeyRange::all(), None).await.unwrap().is_empty());
}
