//! Store layout.
//!
//! ```text
//! posts/{postId}
//! posts/{postId}/userVotes/{userId}
//! posts/{postId}/comments/{commentId}
//! posts/{postId}/comments/{commentId}/userVotes/{userId}
//! users/{userId}
//! events/{eventId}
//! ```

use doc_store::{CollectionPath, DocPath, StoreResult};

pub const POSTS: &str = "posts";
pub const COMMENTS: &str = "comments";
pub const USER_VOTES: &str = "userVotes";
pub const USERS: &str = "users";
pub const EVENTS: &str = "events";

pub fn posts() -> StoreResult<CollectionPath> {
    CollectionPath::parse(POSTS)
}

pub fn post(post_id: &str) -> StoreResult<DocPath> {
    posts()?.doc(post_id)
}

pub fn post_vote(post_id: &str, user_id: &str) -> StoreResult<DocPath> {
    post(post_id)?.collection(USER_VOTES)?.doc(user_id)
}

pub fn comments(post_id: &str) -> StoreResult<CollectionPath> {
    post(post_id)?.collection(COMMENTS)
}

pub fn comment(post_id: &str, comment_id: &str) -> StoreResult<DocPath> {
    comments(post_id)?.doc(comment_id)
}

pub fn comment_votes(post_id: &str, comment_id: &str) -> StoreResult<CollectionPath> {
    comment(post_id, comment_id)?.collection(USER_VOTES)
}

pub fn comment_vote(post_id: &str, comment_id: &str, user_id: &str) -> StoreResult<DocPath> {
    comment_votes(post_id, comment_id)?.doc(user_id)
}

pub fn users() -> StoreResult<CollectionPath> {
    CollectionPath::parse(USERS)
}

pub fn user(user_id: &str) -> StoreResult<DocPath> {
    users()?.doc(user_id)
}

pub fn events() -> StoreResult<CollectionPath> {
    CollectionPath::parse(EVENTS)
}

pub fn event(event_id: &str) -> StoreResult<DocPath> {
    events()?.doc(event_id)
}
