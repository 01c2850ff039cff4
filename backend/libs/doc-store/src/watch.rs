//! Live queries: a stream of full snapshots per committed change.

use chrono::Utc;
use futures::stream::{self, BoxStream, StreamExt};
use tokio::sync::broadcast::{self, error::RecvError, error::TryRecvError};
use tracing::debug;

use crate::error::StoreResult;
use crate::query::{Query, QuerySnapshot};
use crate::{ChangeNotice, SharedStore};

pub type SnapshotStream = BoxStream<'static, StoreResult<QuerySnapshot>>;

struct WatchState {
    store: SharedStore,
    query: Query,
    changes: broadcast::Receiver<ChangeNotice>,
    initial: bool,
}

/// Subscribe to a query.
///
/// The first item is the current result set; every later item is the full
/// result set after a commit touching the query's collection. Bursts of
/// changes (or a lagging consumer) collapse into one snapshot. A failed
/// query is yielded once and ends the stream.
pub fn watch(store: SharedStore, query: Query) -> SnapshotStream {
    // Subscribe before the initial read so no commit falls in between.
    let changes = store.changes();
    let state = WatchState {
        store,
        query,
        changes,
        initial: true,
    };

    stream::unfold(Some(state), |state| async move {
        let mut state = state?;

        if !state.initial {
            loop {
                match state.changes.recv().await {
                    Ok(notice) if notice.touches(&state.query.collection) => break,
                    Ok(_) => continue,
                    Err(RecvError::Lagged(skipped)) => {
                        debug!(skipped, collection = %state.query.collection, "Watcher lagged, resynchronising");
                        break;
                    }
                    Err(RecvError::Closed) => return None,
                }
            }
            loop {
                match state.changes.try_recv() {
                    Ok(_) | Err(TryRecvError::Lagged(_)) => continue,
                    Err(_) => break,
                }
            }
        }
        state.initial = false;

        match state.store.query(&state.query).await {
            Ok(documents) => {
                let snapshot = QuerySnapshot {
                    documents,
                    read_time: Utc::now(),
                };
                Some((Ok(snapshot), Some(state)))
            }
            Err(e) => Some((Err(e), None)),
        }
    })
    .boxed()
}
