use std::sync::Arc;
use std::time::Duration;

use tokio::time::sleep;

use rustcache::auth::HtpasswdFile;
use rustcache::client::{Client, ClientError};
use rustcache::server;
use rustcache::storage::{MemoryStorage, MultiStorage, SledStorage, Storage};

async fn start_server(port: u16, storage: Arc<dyn Storage>, validator: Option<Arc<HtpasswdFile>>) {
    tokio::spawn(async move {
        server::run(&format!("127.0.0.1:{port}"), storage, validator).await
    });
    sleep(Duration::from_millis(100)).await;
}

fn memory() -> Arc<dyn Storage> {
    Arc::new(MemoryStorage::new(1000, Duration::from_secs(60)).unwrap())
}

#[tokio::test]
async fn string_operations() {
    start_server(7901, memory(), None).await;
    let client = Client::new("127.0.0.1:7901", None, 4);

    client.set("key", "value", 0).await.unwrap();
    assert_eq!(client.get("key").await.unwrap(), "value");

    client.update("key", "updated").await.unwrap();
    assert_eq!(client.get("key").await.unwrap(), "updated");

    client.set("other", "x", 0).await.unwrap();
    assert_eq!(client.keys().await.unwrap(), vec!["key", "other"]);

    client.delete("other").await.unwrap();
    assert_eq!(client.keys().await.unwrap(), vec!["key"]);
}

#[tokio::test]
async fn ttl_and_expire() {
    start_server(7902, memory(), None).await;
    let client = Client::new("127.0.0.1:7902", None, 4);

    client.set("key", "value", 0).await.unwrap();
    assert_eq!(client.ttl("key").await.unwrap(), 0);

    client.expire("key", 60).await.unwrap();
    let ttl = client.ttl("key").await.unwrap();
    assert!(ttl > 0 && ttl <= 60);
}

#[tokio::test]
async fn hash_operations() {
    start_server(7903, memory(), None).await;
    let client = Client::new("127.0.0.1:7903", None, 4);

    client.hash_create("h", 0).await.unwrap();
    client.hash_set("h", "f2", "v2").await.unwrap();
    client.hash_set("h", "f1", "v1").await.unwrap();

    assert_eq!(client.hash_get("h", "f1").await.unwrap(), "v1");
    assert_eq!(client.hash_len("h").await.unwrap(), 2);
    assert_eq!(client.hash_keys("h").await.unwrap(), vec!["f1", "f2"]);
    assert_eq!(
        client.hash_get_all("h").await.unwrap(),
        vec![
            ("f1".to_string(), "v1".to_string()),
            ("f2".to_string(), "v2".to_string()),
        ]
    );

    client.hash_delete("h", "f1").await.unwrap();
    assert_eq!(client.hash_len("h").await.unwrap(), 1);
}

#[tokio::test]
async fn list_operations() {
    start_server(7904, memory(), None).await;
    let client = Client::new("127.0.0.1:7904", None, 4);

    client.list_create("l", 0).await.unwrap();
    client.list_right_push("l", "a").await.unwrap();
    client.list_left_push("l", "b").await.unwrap();

    assert_eq!(client.list_len("l").await.unwrap(), 2);
    assert_eq!(client.list_range("l", 0, 9).await.unwrap(), vec!["b", "a"]);
    assert_eq!(client.list_left_pop("l").await.unwrap(), "b");
    assert_eq!(client.list_right_pop("l").await.unwrap(), "a");
}

#[tokio::test]
async fn server_errors_surface_verbatim() {
    start_server(7905, memory(), None).await;
    let client = Client::new("127.0.0.1:7905", None, 4);

    let err = client.get("missing").await.unwrap_err();
    assert!(matches!(
        err,
        ClientError::Server(ref message) if message == "Key does not exist"
    ));

    client.hash_create("h", 0).await.unwrap();
    let err = client.get("h").await.unwrap_err();
    assert!(matches!(
        err,
        ClientError::Server(ref message) if message == "Key type is not string"
    ));

    client.list_create("l", 0).await.unwrap();
    let err = client.list_left_pop("l").await.unwrap_err();
    assert!(matches!(
        err,
        ClientError::Server(ref message) if message == "List is empty"
    ));
}

#[tokio::test]
async fn values_with_embedded_crlf_round_trip() {
    start_server(7906, memory(), None).await;
    let client = Client::new("127.0.0.1:7906", None, 4);

    client.set("key", "va\r\nlue", 0).await.unwrap();
    assert_eq!(client.get("key").await.unwrap(), "va\r\nlue");
}

#[tokio::test]
async fn pool_reuses_connections() {
    start_server(7907, memory(), None).await;
    let client = Client::new("127.0.0.1:7907", None, 1);

    // all calls are funneled through the single pooled connection
    for i in 0..10 {
        client.set(&format!("key{i}"), "value", 0).await.unwrap();
    }
    assert_eq!(client.keys().await.unwrap().len(), 10);
}

#[tokio::test]
async fn authenticates_on_connect() {
    let htpasswd = tempfile::NamedTempFile::new().unwrap();
    std::fs::write(htpasswd.path(), "admin:secret\n").unwrap();
    let validator = Arc::new(HtpasswdFile::load(htpasswd.path()).unwrap());
    start_server(7908, memory(), Some(validator)).await;

    let client = Client::new(
        "127.0.0.1:7908",
        Some(("admin".to_string(), "secret".to_string())),
        4,
    );
    client.set("key", "value", 0).await.unwrap();
    assert_eq!(client.get("key").await.unwrap(), "value");

    let rejected = Client::new(
        "127.0.0.1:7908",
        Some(("admin".to_string(), "wrong".to_string())),
        4,
    );
    let err = rejected.get("key").await.unwrap_err();
    assert!(matches!(
        err,
        ClientError::Server(ref message) if message == "Invalid credentials"
    ));

    let anonymous = Client::new("127.0.0.1:7908", None, 4);
    let err = anonymous.get("key").await.unwrap_err();
    assert!(matches!(
        err,
        ClientError::Server(ref message) if message == "Need authentication"
    ));
}

#[tokio::test]
async fn works_against_the_multi_storage() {
    let shards: Vec<Box<dyn Storage>> = (0..4)
        .map(|_| {
            Box::new(MemoryStorage::new(1000, Duration::from_secs(60)).unwrap())
                as Box<dyn Storage>
        })
        .collect();
    let storage: Arc<dyn Storage> = Arc::new(MultiStorage::new(shards).unwrap());
    start_server(7909, storage, None).await;

    let client = Client::new("127.0.0.1:7909", None, 4);
    for key in ["alpha", "beta", "gamma", "delta"] {
        client.set(key, key.to_uppercase(), 0).await.unwrap();
    }
    assert_eq!(
        client.keys().await.unwrap(),
        vec!["alpha", "beta", "delta", "gamma"]
    );
    assert_eq!(client.get("gamma").await.unwrap(), "GAMMA");
}

#[tokio::test]
async fn works_against_the_durable_storage() {
    let dir = tempfile::tempdir().unwrap();
    let storage: Arc<dyn Storage> = Arc::new(
        SledStorage::open(dir.path().join("db"), Duration::from_secs(60)).unwrap(),
    );
    start_server(7910, storage, None).await;

    let client = Client::new("127.0.0.1:7910", None, 4);
    client.set("key", "value", 0).await.unwrap();
    assert_eq!(client.get("key").await.unwrap(), "value");

    client.hash_create("h", 0).await.unwrap();
    client.hash_set("h", "f", "v").await.unwrap();
    assert_eq!(client.hash_get("h", "f").await.unwrap(), "v");

    // the durable engine refuses list operations
    let err = client.list_create("l", 0).await.unwrap_err();
    assert!(matches!(
        err,
        ClientError::Server(ref message) if message == "Operation is not supported"
    ));
}
