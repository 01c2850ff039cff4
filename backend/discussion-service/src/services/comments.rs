/// Comment service: comment CRUD with `commentCount` maintenance
///
/// Adding and deleting a comment change the parent post's counter in the same
/// transaction as the comment itself, so the counter always equals the number
/// of comments present.
use chrono::Utc;
use doc_store::{
    encode, run_transaction, FieldTransform, Fields, Query, RetryPolicy,
    SharedStore, SortDirection, Transaction,
};
use serde_json::Value;
use tracing::info;
use uuid::Uuid;

use crate::domain::{models::timestamp, paths, Comment};
use crate::error::{Result, ServiceError};
use crate::metrics::{record_error, COMMENT_WRITES_TOTAL};
use crate::middleware::{ensure_can_modify, Actor};
use crate::services::{clean_text, require_id, MAX_COMMENT_CHARS};

fn comment_count_change(delta: i64) -> Vec<FieldTransform> {
    vec![
        FieldTransform::Increment {
            field: "commentCount".to_string(),
            by: delta,
        },
        FieldTransform::ServerTimestamp {
            field: "updatedAt".to_string(),
        },
    ]
}

#[derive(Clone)]
pub struct CommentService {
    store: SharedStore,
    retry: RetryPolicy,
}

impl CommentService {
    pub fn new(store: SharedStore, retry: RetryPolicy) -> Self {
        Self { store, retry }
    }

    /// Create a comment (or a reply when `parent_id` is set) and bump the
    /// post's comment count.
    pub async fn add_comment(
        &self,
        actor: &Actor,
        post_id: &str,
        content: &str,
        parent_id: Option<&str>,
    ) -> Result<Comment> {
        let result = self.create(actor, post_id, content, parent_id).await;
        match &result {
            Ok(_) => COMMENT_WRITES_TOTAL.with_label_values(&["add"]).inc(),
            Err(err) => record_error("add_comment", err.code()),
        }
        result
    }

    async fn create(
        &self,
        actor: &Actor,
        post_id: &str,
        content: &str,
        parent_id: Option<&str>,
    ) -> Result<Comment> {
        require_id("Post ID", post_id)?;
        let content = clean_text("Content", content, MAX_COMMENT_CHARS)?;
        let post_path = paths::post(post_id)?;
        let parent_path = match parent_id {
            Some(parent_id) => {
                require_id("Parent comment ID", parent_id)?;
                Some(paths::comment(post_id, parent_id)?)
            }
            None => None,
        };

        let comment_id = Uuid::new_v4().to_string();
        let comment_path = paths::comment(post_id, &comment_id)?;

        let comment = run_transaction(&self.retry, || {
            let store = self.store.clone();
            let post_path = post_path.clone();
            let parent_path = parent_path.clone();
            let comment_path = comment_path.clone();
            let comment_id = comment_id.clone();
            let content = content.clone();
            async move {
                let mut tx = Transaction::begin(store.as_ref());

                if tx.get(&post_path).await?.is_none() {
                    return Err(ServiceError::not_found("Post", post_path.id()));
                }
                if let Some(parent_path) = &parent_path {
                    if tx.get(parent_path).await?.is_none() {
                        return Err(ServiceError::not_found("Parent comment", parent_path.id()));
                    }
                }

                let now = Utc::now();
                let comment = Comment {
                    id: comment_id,
                    post_id: post_path.id().to_string(),
                    parent_id: parent_path.as_ref().map(|p| p.id().to_string()),
                    author_id: actor.id(),
                    author_name: actor.display_name.clone(),
                    content,
                    created_at: now,
                    updated_at: now,
                    upvote_count: 0,
                    downvote_count: 0,
                    vote_score: 0,
                };

                tx.create(comment_path, encode(&comment)?);
                tx.update(post_path, Fields::new(), comment_count_change(1));
                tx.commit().await?;
                Ok::<_, ServiceError>(comment)
            }
        })
        .await?;

        info!(
            post_id = %comment.post_id,
            comment_id = %comment.id,
            author_id = %comment.author_id,
            "Comment added"
        );
        Ok(comment)
    }

    /// Edit a comment's content. Never touches `commentCount`.
    pub async fn update_comment(
        &self,
        actor: &Actor,
        post_id: &str,
        comment_id: &str,
        content: &str,
    ) -> Result<Comment> {
        require_id("Post ID", post_id)?;
        require_id("Comment ID", comment_id)?;
        let content = clean_text("Content", content, MAX_COMMENT_CHARS)?;
        let comment_path = paths::comment(post_id, comment_id)?;

        let result = run_transaction(&self.retry, || {
            let store = self.store.clone();
            let comment_path = comment_path.clone();
            let content = content.clone();
            async move {
                let mut tx = Transaction::begin(store.as_ref());
                let mut comment: Comment = tx
                    .get_as(&comment_path)
                    .await?
                    .ok_or_else(|| ServiceError::not_found("Comment", comment_path.id()))?;
                ensure_can_modify(actor, &comment.author_id, "comment")?;

                comment.content = content;
                comment.updated_at = Utc::now();

                let mut fields = Fields::new();
                fields.insert("content".to_string(), Value::from(comment.content.clone()));
                fields.insert(
                    "updatedAt".to_string(),
                    Value::from(timestamp::format(&comment.updated_at)),
                );
                tx.update(comment_path, fields, Vec::new());
                tx.commit().await?;
                Ok::<_, ServiceError>(comment)
            }
        })
        .await;

        match &result {
            Ok(comment) => {
                COMMENT_WRITES_TOTAL.with_label_values(&["update"]).inc();
                info!(post_id, comment_id = %comment.id, "Comment updated");
            }
            Err(err) => record_error("update_comment", err.code()),
        }
        result
    }

    /// Remove a comment with its vote markers and decrement the post's count.
    ///
    /// Replies stay in place; threading is presentational.
    pub async fn delete_comment(&self, actor: &Actor, post_id: &str, comment_id: &str) -> Result<()> {
        require_id("Post ID", post_id)?;
        require_id("Comment ID", comment_id)?;
        let post_path = paths::post(post_id)?;
        let comment_path = paths::comment(post_id, comment_id)?;
        let votes_query = Query::new(paths::comment_votes(post_id, comment_id)?);

        let result = run_transaction(&self.retry, || {
            let store = self.store.clone();
            let post_path = post_path.clone();
            let comment_path = comment_path.clone();
            let votes_query = votes_query.clone();
            async move {
                let mut tx = Transaction::begin(store.as_ref());
                let comment: Comment = tx
                    .get_as(&comment_path)
                    .await?
                    .ok_or_else(|| ServiceError::not_found("Comment", comment_path.id()))?;
                ensure_can_modify(actor, &comment.author_id, "comment")?;
                let post_exists = tx.get(&post_path).await?.is_some();

                // Markers added after this read bump the comment's version,
                // which fails the commit and re-runs the body.
                let markers = store.query(&votes_query).await?;

                for marker in markers {
                    tx.delete(marker.path);
                }
                tx.delete(comment_path);
                if post_exists {
                    tx.update(post_path, Fields::new(), comment_count_change(-1));
                }
                tx.commit().await?;
                Ok::<_, ServiceError>(())
            }
        })
        .await;

        match &result {
            Ok(()) => {
                COMMENT_WRITES_TOTAL.with_label_values(&["delete"]).inc();
                info!(post_id, comment_id, actor = %actor.user_id, "Comment deleted");
            }
            Err(err) => record_error("delete_comment", err.code()),
        }
        result
    }

    /// Comments of a post, oldest first.
    pub async fn list_comments(&self, post_id: &str) -> Result<Vec<Comment>> {
        require_id("Post ID", post_id)?;
        let post_path = paths::post(post_id)?;
        if self.store.get(&post_path).await?.is_none() {
            return Err(ServiceError::not_found("Post", post_id));
        }

        let docs = self.store.query(&Self::list_query(post_id)?).await?;
        docs.iter()
            .map(|doc| doc.decode().map_err(ServiceError::from))
            .collect()
    }

    /// Query backing both the listing and the live comment stream.
    pub fn list_query(post_id: &str) -> Result<Query> {
        Ok(Query::new(paths::comments(post_id)?).order_by("createdAt", SortDirection::Ascending))
    }
}
