pub mod comments;
pub mod events;
pub mod posts;
pub mod users;
pub mod votes;

pub use comments::CommentService;
pub use events::{EventFilter, EventOrder, EventPatch, EventService, NewEvent, OrderDirection};
pub use posts::{NewPost, PostOrder, PostPatch, PostService};
pub use users::{ProfilePatch, UserService};
pub use votes::{VoteService, VoteSubject};

use crate::error::{Result, ServiceError};

pub const MAX_TITLE_CHARS: usize = 300;
pub const MAX_POST_CHARS: usize = 50_000;
pub const MAX_COMMENT_CHARS: usize = 10_000;

/// Trim user text and enforce `1..=max` characters.
pub(crate) fn clean_text(field: &str, value: &str, max: usize) -> Result<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(ServiceError::validation(
            "validation/missing-fields",
            format!("{} is required", field),
        ));
    }
    if trimmed.chars().count() > max {
        return Err(ServiceError::validation(
            "validation/too-long",
            format!("{} must be at most {} characters", field, max),
        ));
    }
    Ok(trimmed.to_string())
}

/// Reject blank path ids before they reach the store.
pub(crate) fn require_id(name: &'static str, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(ServiceError::validation(
            "validation/missing-ids",
            format!("{} is required", name),
        ));
    }
    Ok(())
}
