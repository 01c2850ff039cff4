//! PostgreSQL-backed document store.
//!
//! Documents live in a single `documents` table (JSONB body, BIGINT
//! version). A commit locks every touched row with `SELECT ... FOR UPDATE`,
//! validates the read set, writes, and emits `pg_notify` inside the same
//! transaction so watchers are only woken for committed changes.

use std::collections::{BTreeSet, HashMap};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgListener, PgPoolOptions};
use sqlx::types::Json;
use sqlx::PgPool;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::error::{StoreError, StoreResult};
use crate::metrics::record_commit;
use crate::mutation::{self, Fields, StagedDoc, Write};
use crate::path::DocPath;
use crate::query::Query;
use crate::{ChangeNotice, CommitResult, Document, DocumentStore, Precondition};

const BACKEND: &str = "postgres";
const CHANGE_CHANNEL: &str = "doc_store_changes";

#[derive(Debug, sqlx::FromRow)]
struct DocumentRow {
    path: String,
    version: i64,
    data: Json<Fields>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl DocumentRow {
    fn into_document(self) -> StoreResult<Document> {
        Ok(Document {
            path: DocPath::parse(self.path)?,
            version: self.version,
            data: self.data.0,
            create_time: self.created_at,
            update_time: self.updated_at,
        })
    }
}

/// Map driver errors onto the store taxonomy.
///
/// Serialization failures and deadlocks are contention; connection and pool
/// failures are unavailability; SQLSTATE class 53 is resource exhaustion.
fn classify(err: sqlx::Error) -> StoreError {
    if matches!(
        err,
        sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_)
    ) {
        return StoreError::Unavailable(err.to_string());
    }

    let (code, message) = match err.as_database_error() {
        Some(db) => (db.code().map(|c| c.into_owned()), db.message().to_string()),
        None => return StoreError::Database(err),
    };

    match code.as_deref() {
        Some("40001") | Some("40P01") => StoreError::Conflict(message),
        Some("53300") => StoreError::Unavailable(message),
        Some(code) if code.starts_with("53") => StoreError::QuotaExceeded(message),
        _ => StoreError::Database(err),
    }
}

pub struct PgDocumentStore {
    pool: PgPool,
    changes: broadcast::Sender<ChangeNotice>,
    listener: JoinHandle<()>,
}

impl Drop for PgDocumentStore {
    fn drop(&mut self) {
        self.listener.abort();
    }
}

impl PgDocumentStore {
    /// Connect, run migrations and start the change listener.
    pub async fn connect(database_url: &str, max_connections: u32, capacity: usize) -> StoreResult<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(Duration::from_secs(10))
            .idle_timeout(Duration::from_secs(600))
            .connect(database_url)
            .await
            .map_err(classify)?;
        Self::from_pool(pool, capacity).await
    }

    pub async fn from_pool(pool: PgPool, capacity: usize) -> StoreResult<Self> {
        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .map_err(|e| StoreError::Unavailable(format!("migration failed: {}", e)))?;
        info!("Document store migrations completed");

        let (changes, _) = broadcast::channel(capacity.max(1));

        let mut listener = PgListener::connect_with(&pool).await.map_err(classify)?;
        listener.listen(CHANGE_CHANNEL).await.map_err(classify)?;

        let sender = changes.clone();
        let listener = tokio::spawn(async move {
            loop {
                match listener.recv().await {
                    Ok(notification) => {
                        match serde_json::from_str::<ChangeNotice>(notification.payload()) {
                            Ok(notice) => {
                                let _ = sender.send(notice);
                            }
                            Err(e) => warn!("Ignoring malformed change notification: {}", e),
                        }
                    }
                    Err(e) => {
                        // PgListener reconnects on the next recv(); notices missed
                        // while disconnected are gone, so wake every watcher.
                        error!("Change listener error: {}", e);
                        if sender.receiver_count() > 0 {
                            let _ = sender.send(ChangeNotice::resync(Utc::now()));
                        }
                        tokio::time::sleep(Duration::from_secs(1)).await;
                    }
                }
            }
        });

        Ok(Self {
            pool,
            changes,
            listener,
        })
    }

    async fn apply_commit(&self, preconditions: &[Precondition], writes: &[Write]) -> StoreResult<CommitResult> {
        let mut tx = self.pool.begin().await.map_err(classify)?;

        let touched: BTreeSet<String> = preconditions
            .iter()
            .map(|p| p.path.to_string())
            .chain(writes.iter().map(|w| w.path().to_string()))
            .collect();
        let paths: Vec<String> = touched.into_iter().collect();

        let rows = sqlx::query_as::<_, DocumentRow>(
            r#"
            SELECT path, version, data, created_at, updated_at
            FROM documents
            WHERE path = ANY($1)
            FOR UPDATE
            "#,
        )
        .bind(&paths)
        .fetch_all(&mut *tx)
        .await
        .map_err(classify)?;

        let current: HashMap<String, DocumentRow> =
            rows.into_iter().map(|row| (row.path.clone(), row)).collect();

        for precondition in preconditions {
            let found = current.get(precondition.path.as_str()).map(|row| row.version);
            if found != precondition.version {
                debug!(path = %precondition.path, "Precondition failed");
                return Err(StoreError::Conflict(precondition.path.to_string()));
            }
        }

        let now = Utc::now();
        let staged = mutation::stage(writes, now, |path| {
            current.get(path.as_str()).map(|row| StagedDoc {
                data: row.data.0.clone(),
                create_time: row.created_at,
            })
        })?;

        let mut collections = BTreeSet::new();
        for (path, entry) in &staged {
            collections.insert(path.parent());
            let existed = current.contains_key(path.as_str());
            match (entry, existed) {
                (Some(doc), true) => {
                    sqlx::query(
                        r#"
                        UPDATE documents
                        SET data = $2, version = nextval('doc_store_version_seq'), updated_at = $3
                        WHERE path = $1
                        "#,
                    )
                    .bind(path.as_str())
                    .bind(Json(&doc.data))
                    .bind(now)
                    .execute(&mut *tx)
                    .await
                    .map_err(classify)?;
                }
                (Some(doc), false) => {
                    let inserted = sqlx::query(
                        r#"
                        INSERT INTO documents (path, collection, version, data, created_at, updated_at)
                        VALUES ($1, $2, nextval('doc_store_version_seq'), $3, $4, $5)
                        ON CONFLICT (path) DO NOTHING
                        "#,
                    )
                    .bind(path.as_str())
                    .bind(path.parent().as_str())
                    .bind(Json(&doc.data))
                    .bind(doc.create_time)
                    .bind(now)
                    .execute(&mut *tx)
                    .await
                    .map_err(classify)?;

                    // A concurrent transaction created the row after our lock scan.
                    if inserted.rows_affected() == 0 {
                        return Err(StoreError::Conflict(path.to_string()));
                    }
                }
                (None, true) => {
                    sqlx::query("DELETE FROM documents WHERE path = $1")
                        .bind(path.as_str())
                        .execute(&mut *tx)
                        .await
                        .map_err(classify)?;
                }
                (None, false) => {}
            }
        }

        if !collections.is_empty() {
            let notice = ChangeNotice {
                collections: collections.into_iter().collect(),
                commit_time: now,
            };
            sqlx::query("SELECT pg_notify($1, $2)")
                .bind(CHANGE_CHANNEL)
                .bind(serde_json::to_string(&notice)?)
                .execute(&mut *tx)
                .await
                .map_err(classify)?;
        }

        tx.commit().await.map_err(classify)?;

        Ok(CommitResult {
            commit_time: now,
            writes: writes.len(),
        })
    }
}

#[async_trait]
impl DocumentStore for PgDocumentStore {
    async fn get(&self, path: &DocPath) -> StoreResult<Option<Document>> {
        let row = sqlx::query_as::<_, DocumentRow>(
            r#"
            SELECT path, version, data, created_at, updated_at
            FROM documents
            WHERE path = $1
            "#,
        )
        .bind(path.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(classify)?;

        row.map(DocumentRow::into_document).transpose()
    }

    async fn query(&self, query: &Query) -> StoreResult<Vec<Document>> {
        let rows = sqlx::query_as::<_, DocumentRow>(
            r#"
            SELECT path, version, data, created_at, updated_at
            FROM documents
            WHERE collection = $1
            "#,
        )
        .bind(query.collection.as_str())
        .fetch_all(&self.pool)
        .await
        .map_err(classify)?;

        let docs = rows
            .into_iter()
            .map(DocumentRow::into_document)
            .collect::<StoreResult<Vec<_>>>()?;
        Ok(query.apply(docs))
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
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(classify)?;
        Ok(())
    }

    fn backend_name(&self) -> &'static str {
        BACKEND
    }
}
