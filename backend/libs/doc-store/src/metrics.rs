use once_cell::sync::Lazy;
use prometheus::{IntCounterVec, Opts};
use tracing::warn;

/// Commits by backend and outcome (`ok`, `conflict`, `error`).
pub static COMMITS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register(
        IntCounterVec::new(
            Opts::new("doc_store_commits_total", "Document store commits by outcome"),
            &["backend", "outcome"],
        )
        .expect("valid metric opts for doc_store_commits_total"),
    )
});

/// Transaction bodies re-run after a commit conflict.
pub static TRANSACTION_RETRIES_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register(
        IntCounterVec::new(
            Opts::new(
                "doc_store_transaction_retries_total",
                "Transaction bodies re-run after contention, by final result",
            ),
            &["result"],
        )
        .expect("valid metric opts for doc_store_transaction_retries_total"),
    )
});

fn register(counter: IntCounterVec) -> IntCounterVec {
    if let Err(e) = prometheus::default_registry().register(Box::new(counter.clone())) {
        warn!("Failed to register doc-store metric: {}", e);
    }
    counter
}

pub(crate) fn record_commit<T>(backend: &'static str, result: &crate::StoreResult<T>) {
    let outcome = match result {
        Ok(_) => "ok",
        Err(e) if e.is_conflict() => "conflict",
        Err(_) => "error",
    };
    COMMITS_TOTAL.with_label_values(&[backend, outcome]).inc();
}
