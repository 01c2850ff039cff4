//! Discussion Service Library
//!
//! Posts, threaded comments and up/down votes over a transactional document
//! store. The only non-trivial logic is keeping vote counters and comment
//! counts consistent with their records under concurrent requests; see
//! [`services::votes`] and [`services::comments`].

pub mod config;
pub mod domain;
pub mod error;
pub mod handlers;
pub mod metrics;
pub mod middleware;
pub mod services;

pub use config::Config;
pub use error::{ErrorBody, Result, ServiceError};

use doc_store::{RetryPolicy, SharedStore};

use services::{CommentService, EventService, PostService, UserService, VoteService};

/// Shared state handed to every request handler.
#[derive(Clone)]
pub struct AppState {
    pub store: SharedStore,
    pub posts: PostService,
    pub comments: CommentService,
    pub votes: VoteService,
    pub users: UserService,
    pub events: EventService,
}

impl AppState {
    pub fn new(store: SharedStore, retry: RetryPolicy) -> Self {
        Self {
            posts: PostService::new(store.clone(), retry.clone()),
            comments: CommentService::new(store.clone(), retry.clone()),
            votes: VoteService::new(store.clone(), retry.clone()),
            users: UserService::new(store.clone(), retry.clone()),
            events: EventService::new(store.clone(), retry),
            store,
        }
    }
}
