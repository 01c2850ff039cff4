use std::time::Duration;

use doc_store::{
    watch, CollectionPath, DocumentStore, Fields, MemoryStore, Query, SortDirection, StoreError,
    Transaction, Write,
};
use futures::StreamExt;
use serde_json::json;

fn body(value: serde_json::Value) -> Fields {
    value.as_object().cloned().unwrap()
}

#[tokio::test]
async fn test_commit_rejects_stale_read() {
    let store = MemoryStore::new(16);
    let path = CollectionPath::parse("posts").unwrap().doc("p1").unwrap();
    store
        .commit(&[], &[Write::Create { path: path.clone(), data: body(json!({"n": 0})) }])
        .await
        .unwrap();

    let mut first = Transaction::begin(&store);
    let mut second = Transaction::begin(&store);
    first.get(&path).await.unwrap();
    second.get(&path).await.unwrap();

    first.increment(path.clone(), "n", 1);
    second.increment(path.clone(), "n", 10);

    first.commit().await.unwrap();
    let err = second.commit().await.unwrap_err();
    assert!(matches!(err, StoreError::Conflict(_)));

    let doc = store.get(&path).await.unwrap().unwrap();
    assert_eq!(doc.data["n"], 1);
}

#[tokio::test]
async fn test_read_of_absent_document_conflicts_with_concurrent_create() {
    let store = MemoryStore::new(16);
    let path = CollectionPath::parse("votes").unwrap().doc("u1").unwrap();

    let mut tx = Transaction::begin(&store);
    assert!(tx.get(&path).await.unwrap().is_none());

    store
        .commit(&[], &[Write::Set { path: path.clone(), data: body(json!({"direction": "up"})) }])
        .await
        .unwrap();

    tx.set(path.clone(), body(json!({"direction": "down"})));
    assert!(matches!(tx.commit().await, Err(StoreError::Conflict(_))));
    assert_eq!(store.get(&path).await.unwrap().unwrap().data["direction"], "up");
}

#[tokio::test]
async fn test_failed_write_leaves_nothing_applied() {
    let store = MemoryStore::new(16);
    let posts = CollectionPath::parse("posts").unwrap();
    let created = posts.doc("new").unwrap();
    let missing = posts.doc("missing").unwrap();

    let mut tx = Transaction::begin(&store);
    tx.create(created.clone(), body(json!({"title": "x"})));
    tx.increment(missing, "commentCount", 1);
    let err = tx.commit().await.unwrap_err();

    assert!(matches!(err, StoreError::NotFound(_)));
    assert!(store.get(&created).await.unwrap().is_none());
    assert!(store.query(&Query::new(posts)).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_reads_after_writes_are_rejected() {
    let store = MemoryStore::new(16);
    let path = CollectionPath::parse("posts").unwrap().doc("p1").unwrap();

    let mut tx = Transaction::begin(&store);
    tx.set(path.clone(), Fields::new());
    assert!(matches!(
        tx.get(&path).await,
        Err(StoreError::InvalidTransaction(_))
    ));
}

#[tokio::test]
async fn test_versions_change_on_every_write() {
    let store = MemoryStore::new(16);
    let path = CollectionPath::parse("posts").unwrap().doc("p1").unwrap();

    store
        .commit(&[], &[Write::Set { path: path.clone(), data: Fields::new() }])
        .await
        .unwrap();
    let v1 = store.get(&path).await.unwrap().unwrap().version;

    store.commit(&[], &[Write::Delete { path: path.clone() }]).await.unwrap();
    store
        .commit(&[], &[Write::Set { path: path.clone(), data: Fields::new() }])
        .await
        .unwrap();
    let v2 = store.get(&path).await.unwrap().unwrap().version;

    assert_ne!(v1, v2);
}

#[tokio::test]
async fn test_watch_emits_initial_and_changed_snapshots() {
    let store = MemoryStore::shared(16);
    let posts = CollectionPath::parse("posts").unwrap();
    let users = CollectionPath::parse("users").unwrap();

    store
        .commit(&[], &[Write::Set { path: posts.doc("a").unwrap(), data: body(json!({"rank": 2})) }])
        .await
        .unwrap();

    let mut snapshots = watch(
        store.clone(),
        Query::new(posts.clone()).order_by("rank", SortDirection::Ascending),
    );

    let initial = snapshots.next().await.unwrap().unwrap();
    assert_eq!(initial.documents.len(), 1);

    // Unrelated collection: must not wake the watcher.
    store
        .commit(&[], &[Write::Set { path: users.doc("u").unwrap(), data: Fields::new() }])
        .await
        .unwrap();
    store
        .commit(&[], &[Write::Set { path: posts.doc("b").unwrap(), data: body(json!({"rank": 1})) }])
        .await
        .unwrap();

    let next = tokio::time::timeout(Duration::from_secs(1), snapshots.next())
        .await
        .expect("snapshot after commit")
        .unwrap()
        .unwrap();
    let ids: Vec<&str> = next.documents.iter().map(|d| d.id()).collect();
    assert_eq!(ids, vec!["b", "a"]);
}

#[tokio::test]
async fn test_watch_coalesces_bursts() {
    let store = MemoryStore::shared(4);
    let posts = CollectionPath::parse("posts").unwrap();
    let mut snapshots = watch(store.clone(), Query::new(posts.clone()));
    snapshots.next().await.unwrap().unwrap();

    for i in 0..10 {
        store
            .commit(&[], &[Write::Set { path: posts.doc(i).unwrap(), data: Fields::new() }])
            .await
            .unwrap();
    }

    let snapshot = snapshots.next().await.unwrap().unwrap();
    assert_eq!(snapshot.documents.len(), 10);
}
