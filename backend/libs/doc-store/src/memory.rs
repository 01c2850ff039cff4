//! In-process document store.
//!
//! Commits take one write lock, compare every precondition against the
//! current versions and only then apply the staged batch, which makes each
//! commit a compare-and-swap over its whole read set.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::{broadcast, RwLock};
use tracing::trace;

use crate::error::{StoreError, StoreResult};
use crate::metrics::record_commit;
use crate::mutation::{self, Fields, StagedDoc, Write};
use crate::path::DocPath;
use crate::query::Query;
use crate::{ChangeNotice, CommitResult, Document, DocumentStore, Precondition, SharedStore};

const BACKEND: &str = "memory";

#[derive(Debug, Clone)]
struct StoredDoc {
    version: i64,
    data: Fields,
    create_time: DateTime<Utc>,
    update_time: DateTime<Utc>,
}

impl StoredDoc {
    fn to_document(&self, path: &DocPath) -> Document {
        Document {
            path: path.clone(),
            version: self.version,
            data: self.data.clone(),
            create_time: self.create_time,
            update_time: self.update_time,
        }
    }
}

pub struct MemoryStore {
    docs: RwLock<BTreeMap<DocPath, StoredDoc>>,
    sequence: AtomicI64,
    changes: broadcast::Sender<ChangeNotice>,
}

impl MemoryStore {
    /// `capacity` bounds how many change notices a slow watcher may lag behind.
    pub fn new(capacity: usize) -> Self {
        let (changes, _) = broadcast::channel(capacity.max(1));
        Self {
            docs: RwLock::new(BTreeMap::new()),
            sequence: AtomicI64::new(0),
            changes,
        }
    }

    pub fn shared(capacity: usize) -> SharedStore {
        Arc::new(Self::new(capacity))
    }

    fn next_version(&self) -> i64 {
        self.sequence.fetch_add(1, Ordering::SeqCst) + 1
    }

    async fn apply_commit(&self, preconditions: &[Precondition], writes: &[Write]) -> StoreResult<CommitResult> {
        let mut docs = self.docs.write().await;

        for precondition in preconditions {
            let current = docs.get(&precondition.path).map(|d| d.version);
            if current != precondition.version {
                trace!(
                    path = %precondition.path,
                    expected = ?precondition.version,
                    found = ?current,
                    "Precondition failed"
                );
                return Err(StoreError::Conflict(precondition.path.to_string()));
            }
        }

        let now = Utc::now();
        let staged = mutation::stage(writes, now, |path| {
            docs.get(path).map(|d| StagedDoc {
                data: d.data.clone(),
                create_time: d.create_time,
            })
        })?;

        let mut collections = BTreeSet::new();
        for (path, entry) in staged {
            collections.insert(path.parent());
            match entry {
                Some(doc) => {
                    let stored = StoredDoc {
                        version: self.next_version(),
                        data: doc.data,
                        create_time: doc.create_time,
                        update_time: now,
                    };
                    docs.insert(path, stored);
                }
                None => {
                    docs.remove(&path);
                }
            }
        }
        drop(docs);

        if !collections.is_empty() {
            // No receivers is fine: nobody is watching.
            let _ = self.changes.send(ChangeNotice {
                collections: collections.into_iter().collect(),
                commit_time: now,
            });
        }

        Ok(CommitResult {
            commit_time: now,
            writes: writes.len(),
        })
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new(256)
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn get(&self, path: &DocPath) -> StoreResult<Option<Document>> {
        let docs = self.docs.read().await;
        Ok(docs.get(path).map(|d| d.to_document(path)))
    }

    async fn query(&self, query: &Query) -> StoreResult<Vec<Document>> {
        let docs = self.docs.read().await;
        let candidates = docs
            .iter()
            .filter(|(path, _)| path.parent() == query.collection)
            .map(|(path, d)| d.to_document(path))
            .collect();
        Ok(query.apply(candidates))
    }

    async fn commit(&self, preconditions: &[Precondition], writes: &[Write]) -> StoreResult<CommitResult> {
        let result = self.apply_commit(preconditions, writes).await;
        record_commit(BACKEND, &result);
        result
    }

    fn changes(&self) -> broadcast::Receiver<ChangeNotice> {
        self.changes.subscribe()
    }

    async fn ping(&self) -> StoreResult<()> {
        Ok(())
    }

    fn backend_name(&self) -> &'static str {
        BACKEND
    }
}
