//! # Document Store
//!
//! Hierarchical JSON document storage with atomic multi-document transactions
//! and live queries, behind one trait so services never depend on a backend.
//!
//! ## Model
//!
//! - Documents live at slash-separated paths (`posts/{id}`,
//!   `posts/{id}/comments/{cid}`) and carry a JSON object plus a version.
//! - A [`Transaction`] records the version of every document it reads and
//!   stages writes. Commit succeeds only if none of those documents changed
//!   in the meantime; otherwise it fails with [`StoreError::Conflict`] and
//!   the caller re-runs the body through [`run_transaction`].
//! - [`watch`] turns a [`Query`] into a stream of full snapshots, one per
//!   committed change to the queried collection.
//!
//! ## Backends
//!
//! - [`MemoryStore`]: in-process, for development and tests.
//! - [`PgDocumentStore`]: PostgreSQL JSONB table, row locks at commit,
//!   `LISTEN/NOTIFY` for change fan-out.
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use doc_store::{run_transaction, CollectionPath, MemoryStore, RetryPolicy, StoreError, Transaction};
//! use serde_json::json;
//!
//! # async fn example() -> Result<(), StoreError> {
//! let store = MemoryStore::shared(64);
//! let counters = CollectionPath::parse("counters")?;
//! let path = counters.doc("visits")?;
//!
//! run_transaction(&RetryPolicy::default(), || {
//!     let store = store.clone();
//!     let path = path.clone();
//!     async move {
//!         let mut tx = Transaction::begin(store.as_ref());
//!         let current = tx.get(&path).await?;
//!         match current {
//!             Some(_) => tx.increment(path, "n", 1),
//!             None => tx.create(path, json!({"n": 1}).as_object().cloned().unwrap_or_default()),
//!         };
//!         tx.commit().await
//!     }
//! })
//! .await?;
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::sync::broadcast;

mod error;
pub mod memory;
pub mod metrics;
pub mod mutation;
pub mod path;
pub mod postgres;
pub mod query;
pub mod transaction;
pub mod watch;

pub use error::{StoreError, StoreResult};
pub use memory::MemoryStore;
pub use mutation::{FieldTransform, Fields, Write};
pub use path::{CollectionPath, DocPath};
pub use postgres::PgDocumentStore;
pub use query::{FilterOp, Query, QuerySnapshot, SortDirection};
pub use transaction::{run_transaction, Contention, RetryPolicy, Transaction};
pub use watch::{watch, SnapshotStream};

/// A stored document at a specific version.
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    pub path: DocPath,
    /// Changes on every committed write; never reused for the same path.
    pub version: i64,
    pub data: Fields,
    pub create_time: DateTime<Utc>,
    pub update_time: DateTime<Utc>,
}

impl Document {
    pub fn id(&self) -> &str {
        self.path.id()
    }

    /// Deserialize the body into a typed record.
    pub fn decode<T: DeserializeOwned>(&self) -> StoreResult<T> {
        serde_json::from_value(serde_json::Value::Object(self.data.clone())).map_err(|e| {
            StoreError::Malformed {
                path: self.path.to_string(),
                reason: e.to_string(),
            }
        })
    }
}

/// Serialize a typed record into a document body.
pub fn encode<T: Serialize>(value: &T) -> StoreResult<Fields> {
    match serde_json::to_value(value)? {
        serde_json::Value::Object(fields) => Ok(fields),
        other => Err(StoreError::InvalidTransaction(format!(
            "document body must be a JSON object, got {}",
            other
        ))),
    }
}

/// Optimistic-concurrency check evaluated atomically at commit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Precondition {
    pub path: DocPath,
    /// Version observed by the reader; `None` means the document was absent.
    pub version: Option<i64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CommitResult {
    pub commit_time: DateTime<Utc>,
    pub writes: usize,
}

/// Broadcast after every commit that changed at least one document.
///
/// An empty `collections` list means any collection may have changed, e.g.
/// after the backend lost notifications.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangeNotice {
    pub collections: Vec<CollectionPath>,
    pub commit_time: DateTime<Utc>,
}

impl ChangeNotice {
    /// Notice that wakes every watcher.
    pub fn resync(commit_time: DateTime<Utc>) -> Self {
        Self {
            collections: Vec::new(),
            commit_time,
        }
    }

    pub fn touches(&self, collection: &CollectionPath) -> bool {
        self.collections.is_empty() || self.collections.iter().any(|c| c == collection)
    }
}

/// Backend contract shared by every store implementation.
///
/// Implementations only provide point reads, collection reads and an atomic
/// commit; transaction bookkeeping and live queries are built on top.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Read the latest committed version of a document.
    async fn get(&self, path: &DocPath) -> StoreResult<Option<Document>>;

    /// Evaluate a query against the latest committed state.
    async fn query(&self, query: &Query) -> StoreResult<Vec<Document>>;

    /// Atomically check every precondition and apply every write, or do nothing.
    async fn commit(&self, preconditions: &[Precondition], writes: &[Write]) -> StoreResult<CommitResult>;

    /// Subscribe to change notices for commits made after this call.
    fn changes(&self) -> broadcast::Receiver<ChangeNotice>;

    /// Connectivity check used by the readiness endpoint.
    async fn ping(&self) -> StoreResult<()>;

    fn backend_name(&self) -> &'static str;
}

/// Store handle shared across request handlers and watchers.
pub type SharedStore = Arc<dyn DocumentStore>;
