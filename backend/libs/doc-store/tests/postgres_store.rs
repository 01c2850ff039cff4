//! Runs against a real PostgreSQL when `DATABASE_URL` is set; skipped otherwise.

use doc_store::{CollectionPath, DocumentStore, Fields, PgDocumentStore, Query, StoreError, Transaction, Write};
use serde_json::json;
use uuid::Uuid;

async fn connect() -> Option<PgDocumentStore> {
    let url = match std::env::var("DATABASE_URL") {
        Ok(url) => url,
        Err(_) => {
            eprintln!("Skipping test: DATABASE_URL not set");
            return None;
        }
    };
    match PgDocumentStore::connect(&url, 4, 16).await {
        Ok(store) => Some(store),
        Err(e) => {
            eprintln!("Skipping test: PostgreSQL unavailable: {}", e);
            None
        }
    }
}

#[tokio::test]
async fn test_pg_commit_and_conflict() {
    let Some(store) = connect().await else { return };
    let collection = CollectionPath::parse(format!("test_{}", Uuid::new_v4().simple())).unwrap();
    let path = collection.doc("p1").unwrap();

    store
        .commit(&[], &[Write::Create { path: path.clone(), data: json!({"n": 0}).as_object().cloned().unwrap() }])
        .await
        .unwrap();

    let mut first = Transaction::begin(&store);
    let mut second = Transaction::begin(&store);
    first.get(&path).await.unwrap();
    second.get(&path).await.unwrap();
    first.increment(path.clone(), "n", 1);
    second.increment(path.clone(), "n", 1);

    first.commit().await.unwrap();
    assert!(matches!(second.commit().await, Err(StoreError::Conflict(_))));

    let docs = store.query(&Query::new(collection.clone())).await.unwrap();
    assert_eq!(docs.len(), 1);
    assert_eq!(docs[0].data["n"], 1);

    store.commit(&[], &[Write::Delete { path }]).await.unwrap();
}

#[tokio::test]
async fn test_pg_update_of_missing_document_aborts_batch() {
    let Some(store) = connect().await else { return };
    let collection = CollectionPath::parse(format!("test_{}", Uuid::new_v4().simple())).unwrap();

    let result = store
        .commit(
            &[],
            &[
                Write::Set { path: collection.doc("a").unwrap(), data: Fields::new() },
                Write::Update {
                    path: collection.doc("missing").unwrap(),
                    fields: Fields::new(),
                    transforms: vec![],
                },
            ],
        )
        .await;

    assert!(matches!(result, Err(StoreError::NotFound(_))));
    assert!(store.query(&Query::new(collection)).await.unwrap().is_empty());
}
