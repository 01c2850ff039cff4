//! Optimistic transactions and the retry loop that drives them.

use std::collections::BTreeMap;
use std::future::Future;
use std::time::Duration;

use rand::Rng;
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use crate::error::{StoreError, StoreResult};
use crate::metrics::TRANSACTION_RETRIES_TOTAL;
use crate::mutation::{FieldTransform, Fields, Write};
use crate::path::DocPath;
use crate::{CommitResult, Document, DocumentStore, Precondition};

/// Read set plus staged writes against one store.
///
/// All reads must happen before the first write. Repeated reads of the same
/// path return the first observed version so the body sees a stable view.
pub struct Transaction<'s> {
    store: &'s dyn DocumentStore,
    reads: BTreeMap<DocPath, Option<Document>>,
    writes: Vec<Write>,
}

impl<'s> Transaction<'s> {
    pub fn begin(store: &'s dyn DocumentStore) -> Self {
        Self {
            store,
            reads: BTreeMap::new(),
            writes: Vec::new(),
        }
    }

    pub async fn get(&mut self, path: &DocPath) -> StoreResult<Option<Document>> {
        if !self.writes.is_empty() {
            return Err(StoreError::InvalidTransaction(format!(
                "read of {} after a write; reads must come first",
                path
            )));
        }
        if let Some(seen) = self.reads.get(path) {
            return Ok(seen.clone());
        }
        let doc = self.store.get(path).await?;
        self.reads.insert(path.clone(), doc.clone());
        Ok(doc)
    }

    /// Read and decode a document.
    pub async fn get_as<T: DeserializeOwned>(&mut self, path: &DocPath) -> StoreResult<Option<T>> {
        match self.get(path).await? {
            Some(doc) => doc.decode().map(Some),
            None => Ok(None),
        }
    }

    pub fn create(&mut self, path: DocPath, data: Fields) -> &mut Self {
        self.writes.push(Write::Create { path, data });
        self
    }

    pub fn set(&mut self, path: DocPath, data: Fields) -> &mut Self {
        self.writes.push(Write::Set { path, data });
        self
    }

    pub fn update(&mut self, path: DocPath, fields: Fields, transforms: Vec<FieldTransform>) -> &mut Self {
        self.writes.push(Write::Update {
            path,
            fields,
            transforms,
        });
        self
    }

    pub fn increment(&mut self, path: DocPath, field: &str, by: i64) -> &mut Self {
        self.update(
            path,
            Fields::new(),
            vec![FieldTransform::Increment {
                field: field.to_string(),
                by,
            }],
        )
    }

    pub fn delete(&mut self, path: DocPath) -> &mut Self {
        self.writes.push(Write::Delete { path });
        self
    }

    /// Validate the read set and apply all staged writes atomically.
    pub async fn commit(self) -> StoreResult<CommitResult> {
        let preconditions: Vec<Precondition> = self
            .reads
            .iter()
            .map(|(path, doc)| Precondition {
                path: path.clone(),
                version: doc.as_ref().map(|d| d.version),
            })
            .collect();
        self.store.commit(&preconditions, &self.writes).await
    }
}

/// Errors that may signal lost optimistic-concurrency races.
pub trait Contention {
    fn is_contention(&self) -> bool;
}

impl Contention for StoreError {
    fn is_contention(&self) -> bool {
        self.is_conflict()
    }
}

/// How often and how patiently a contended transaction is re-run.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total attempts including the first one
    pub max_attempts: u32,
    /// Delay before the first retry
    pub initial_backoff: Duration,
    /// Upper bound on the delay between attempts
    pub max_backoff: Duration,
    /// Add random jitter to backoff (±30%)
    pub jitter: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            initial_backoff: Duration::from_millis(10),
            max_backoff: Duration::from_millis(500),
            jitter: true,
        }
    }
}

/// Run a transaction body, re-running it from scratch on contention.
///
/// The body must begin its own [`Transaction`] on every call so each attempt
/// reads fresh state. Non-contention errors are returned immediately; after
/// `max_attempts` the last contention error is returned.
pub async fn run_transaction<F, Fut, T, E>(policy: &RetryPolicy, mut body: F) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Contention,
{
    let mut attempt = 1;
    let mut backoff = policy.initial_backoff;

    loop {
        match body().await {
            Ok(value) => {
                if attempt > 1 {
                    TRANSACTION_RETRIES_TOTAL
                        .with_label_values(&["committed"])
                        .inc_by(u64::from(attempt - 1));
                }
                return Ok(value);
            }
            Err(err) if err.is_contention() && attempt < policy.max_attempts => {
                let delay = calculate_backoff(backoff, policy.jitter);
                debug!(
                    attempt,
                    max_attempts = policy.max_attempts,
                    delay_ms = delay.as_millis() as u64,
                    "Transaction contention, re-running body"
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
                backoff = (backoff * 2).min(policy.max_backoff);
            }
            Err(err) => {
                if err.is_contention() {
                    warn!(attempts = attempt, "Transaction retries exhausted");
                    TRANSACTION_RETRIES_TOTAL
                        .with_label_values(&["exhausted"])
                        .inc_by(u64::from(attempt - 1));
                }
                return Err(err);
            }
        }
    }
}

fn calculate_backoff(base: Duration, jitter: bool) -> Duration {
    if !jitter {
        return base;
    }
    let factor = rand::thread_rng().gen_range(0.7..=1.3);
    Duration::from_secs_f64(base.as_secs_f64() * factor)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn fast_policy(max_attempts: u32) -> RetryPolicy {
        RetryPolicy {
            max_attempts,
            initial_backoff: Duration::from_millis(1),
            max_backoff: Duration::from_millis(2),
            jitter: false,
        }
    }

    #[tokio::test]
    async fn test_retries_contention_until_success() {
        let calls = AtomicU32::new(0);
        let result: Result<u32, StoreError> = run_transaction(&fast_policy(5), || {
            let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
            async move {
                if n < 3 {
                    Err(StoreError::Conflict("posts/p1".into()))
                } else {
                    Ok(n)
                }
            }
        })
        .await;

        assert_eq!(result.unwrap(), 3);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_non_contention_error_is_not_retried() {
        let calls = AtomicU32::new(0);
        let result: Result<(), StoreError> = run_transaction(&fast_policy(5), || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(StoreError::NotFound("posts/p1".into())) }
        })
        .await;

        assert!(matches!(result, Err(StoreError::NotFound(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_gives_up_after_max_attempts() {
        let calls = AtomicU32::new(0);
        let result: Result<(), StoreError> = run_transaction(&fast_policy(3), || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(StoreError::Conflict("posts/p1".into())) }
        })
        .await;

        assert!(matches!(result, Err(StoreError::Conflict(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn test_backoff_jitter_bounds() {
        let base = Duration::from_millis(100);
        for _ in 0..50 {
            let delay = calculate_backoff(base, true);
            assert!(delay >= Duration::from_millis(69) && delay <= Duration::from_millis(131));
        }
        assert_eq!(calculate_backoff(base, false), base);
    }
}
