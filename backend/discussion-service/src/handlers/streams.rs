//! Live listings over server-sent events.
//!
//! Each event carries the full ordered result set as JSON. A store failure
//! is sent once as an `error` event and closes the stream.

use actix_web::{web, HttpResponse};
use doc_store::{watch, Document, Query, StoreResult};
use futures::StreamExt;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, warn};

use crate::domain::{Comment, Post};
use crate::error::{Result, ServiceError};
use crate::handlers::posts::ListPostsQuery;
use crate::metrics::SUBSCRIPTIONS_TOTAL;
use crate::services::{CommentService, PostService};
use crate::AppState;

const MAX_STREAM_LIMIT: usize = 100;

/// GET /api/v1/posts/stream
pub async fn stream_posts(
    state: web::Data<AppState>,
    query: web::Query<ListPostsQuery>,
) -> Result<HttpResponse> {
    let limit = query.limit.map(|l| l.min(MAX_STREAM_LIMIT));
    let query = PostService::list_query(query.order, query.published_only, limit)?;
    SUBSCRIPTIONS_TOTAL.with_label_values(&["posts"]).inc();
    Ok(sse_response::<Post>(&state, query))
}

/// GET /api/v1/posts/{post_id}/comments/stream
pub async fn stream_comments(
    state: web::Data<AppState>,
    path: web::Path<String>,
) -> Result<HttpResponse> {
    let post_id = path.into_inner();
    // Subscribing to a missing post fails up front rather than streaming nothing.
    state.posts.get_post(&post_id).await?;
    let query = CommentService::list_query(&post_id)?;
    SUBSCRIPTIONS_TOTAL.with_label_values(&["comments"]).inc();
    Ok(sse_response::<Comment>(&state, query))
}

fn sse_response<T>(state: &AppState, query: Query) -> HttpResponse
where
    T: DeserializeOwned + Serialize + 'static,
{
    let collection = query.collection.to_string();
    debug!(collection = %collection, "Live query opened");

    let events = watch(state.store.clone(), query).map(|item| {
        let frame = match item.and_then(|snapshot| decode_all::<T>(&snapshot.documents)) {
            Ok(records) => data_frame(&records),
            Err(e) => {
                warn!(error = %e, "Live query failed");
                error_frame(&ServiceError::from(e))
            }
        };
        Ok::<_, actix_web::Error>(frame)
    });

    HttpResponse::Ok()
        .content_type("text/event-stream")
        .insert_header(("Cache-Control", "no-cache"))
        .streaming(events)
}

fn decode_all<T: DeserializeOwned>(documents: &[Document]) -> StoreResult<Vec<T>> {
    documents.iter().map(|doc| doc.decode()).collect()
}

fn data_frame<T: Serialize>(records: &[T]) -> web::Bytes {
    match serde_json::to_string(records) {
        Ok(json) => web::Bytes::from(format!("data: {}\n\n", json)),
        Err(e) => error_frame(&ServiceError::from(e)),
    }
}

fn error_frame(err: &ServiceError) -> web::Bytes {
    let body = serde_json::to_string(&err.to_body()).unwrap_or_else(|_| "{}".to_string());
    web::Bytes::from(format!("event: error\ndata: {}\n\n", body))
}
