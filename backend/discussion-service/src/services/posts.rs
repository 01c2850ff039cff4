/// Post service: publishing, editing and listing posts
use chrono::Utc;
use doc_store::{
    encode, run_transaction, FieldTransform, Fields, Query, RetryPolicy,
    SharedStore, SortDirection, Transaction, Write,
};
use serde::Deserialize;
use tracing::{info, warn};
use uuid::Uuid;

use crate::domain::{paths, Post};
use crate::error::{Result, ServiceError};
use crate::metrics::record_error;
use crate::middleware::{ensure_can_modify, ensure_can_publish, Actor};
use crate::services::{clean_text, require_id, MAX_POST_CHARS, MAX_TITLE_CHARS};

/// Input for a new post.
#[derive(Debug, Clone, Default)]
pub struct NewPost {
    pub title: String,
    pub content: String,
    pub tags: Vec<String>,
    pub attachments: Vec<String>,
    /// Defaults to published
    pub published: Option<bool>,
}

/// Fields an author may change after publishing.
#[derive(Debug, Clone, Default)]
pub struct PostPatch {
    pub title: Option<String>,
    pub content: Option<String>,
    pub tags: Option<Vec<String>>,
    pub attachments: Option<Vec<String>>,
    pub published: Option<bool>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum PostOrder {
    /// Newest first
    #[default]
    CreatedAt,
    /// Highest score first
    VoteScore,
}

fn clean_tags(tags: Vec<String>) -> Vec<String> {
    let mut cleaned: Vec<String> = Vec::with_capacity(tags.len());
    for tag in tags {
        let tag = tag.trim().to_lowercase();
        if !tag.is_empty() && !cleaned.contains(&tag) {
            cleaned.push(tag);
        }
    }
    cleaned
}

#[derive(Clone)]
pub struct PostService {
    store: SharedStore,
    retry: RetryPolicy,
}

impl PostService {
    pub fn new(store: SharedStore, retry: RetryPolicy) -> Self {
        Self { store, retry }
    }

    /// Publish a new post. Requires the author or admin role.
    pub async fn create_post(&self, actor: &Actor, input: NewPost) -> Result<Post> {
        ensure_can_publish(actor)?;
        let title = clean_text("Title", &input.title, MAX_TITLE_CHARS)?;
        let content = clean_text("Content", &input.content, MAX_POST_CHARS)?;

        let now = Utc::now();
        let post = Post {
            id: Uuid::new_v4().to_string(),
            title,
            content,
            author_id: actor.id(),
            author_name: actor.display_name.clone(),
            created_at: now,
            updated_at: now,
            upvote_count: 0,
            downvote_count: 0,
            vote_score: 0,
            comment_count: 0,
            view_count: 0,
            tags: clean_tags(input.tags),
            attachments: input.attachments,
            published: input.published.unwrap_or(true),
        };

        self.store
            .commit(
                &[],
                &[Write::Create {
                    path: paths::post(&post.id)?,
                    data: encode(&post)?,
                }],
            )
            .await?;

        info!(post_id = %post.id, author_id = %post.author_id, "Post created");
        Ok(post)
    }

    pub async fn get_post(&self, post_id: &str) -> Result<Post> {
        require_id("Post ID", post_id)?;
        let doc = self
            .store
            .get(&paths::post(post_id)?)
            .await?
            .ok_or_else(|| ServiceError::not_found("Post", post_id))?;
        Ok(doc.decode()?)
    }

    pub async fn list_posts(&self, order: PostOrder, published_only: bool, limit: Option<usize>) -> Result<Vec<Post>> {
        let docs = self
            .store
            .query(&Self::list_query(order, published_only, limit)?)
            .await?;
        docs.iter()
            .map(|doc| doc.decode().map_err(ServiceError::from))
            .collect()
    }

    /// Query backing both the listing and the live post stream.
    pub fn list_query(order: PostOrder, published_only: bool, limit: Option<usize>) -> Result<Query> {
        let mut query = Query::new(paths::posts()?);
        if published_only {
            query = query.where_eq("published", true);
        }
        query = match order {
            PostOrder::CreatedAt => query.order_by("createdAt", SortDirection::Descending),
            PostOrder::VoteScore => query
                .order_by("voteScore", SortDirection::Descending)
                .order_by("createdAt", SortDirection::Descending),
        };
        if let Some(limit) = limit {
            query = query.limit(limit);
        }
        Ok(query)
    }

    /// Apply an author's edit. Counters are never touched here.
    pub async fn update_post(&self, actor: &Actor, post_id: &str, patch: PostPatch) -> Result<Post> {
        require_id("Post ID", post_id)?;
        let title = patch
            .title
            .as_deref()
            .map(|t| clean_text("Title", t, MAX_TITLE_CHARS))
            .transpose()?;
        let content = patch
            .content
            .as_deref()
            .map(|c| clean_text("Content", c, MAX_POST_CHARS))
            .transpose()?;
        let tags = patch.tags.map(clean_tags);
        let post_path = paths::post(post_id)?;

        let result = run_transaction(&self.retry, || {
            let store = self.store.clone();
            let post_path = post_path.clone();
            let title = title.clone();
            let content = content.clone();
            let tags = tags.clone();
            let attachments = patch.attachments.clone();
            async move {
                let mut tx = Transaction::begin(store.as_ref());
                let mut post: Post = tx
                    .get_as(&post_path)
                    .await?
                    .ok_or_else(|| ServiceError::not_found("Post", post_path.id()))?;
                ensure_can_modify(actor, &post.author_id, "post")?;

                let mut fields = Fields::new();
                if let Some(title) = title {
                    fields.insert("title".to_string(), title.clone().into());
                    post.title = title;
                }
                if let Some(content) = content {
                    fields.insert("content".to_string(), content.clone().into());
                    post.content = content;
                }
                if let Some(tags) = tags {
                    fields.insert("tags".to_string(), serde_json::to_value(&tags)?);
                    post.tags = tags;
                }
                if let Some(attachments) = attachments {
                    fields.insert("attachments".to_string(), serde_json::to_value(&attachments)?);
                    post.attachments = attachments;
                }
                if let Some(published) = patch.published {
                    fields.insert("published".to_string(), published.into());
                    post.published = published;
                }
                post.updated_at = Utc::now();
                fields.insert(
                    "updatedAt".to_string(),
                    crate::domain::models::timestamp::format(&post.updated_at).into(),
                );

                tx.update(post_path, fields, Vec::new());
                tx.commit().await?;
                Ok::<_, ServiceError>(post)
            }
        })
        .await;

        match &result {
            Ok(post) => info!(post_id = %post.id, actor = %actor.user_id, "Post updated"),
            Err(err) => record_error("update_post", err.code()),
        }
        result
    }

    /// Delete a post together with its comments and vote markers.
    pub async fn delete_post(&self, actor: &Actor, post_id: &str) -> Result<()> {
        require_id("Post ID", post_id)?;
        let post_path = paths::post(post_id)?;
        let post_votes = Query::new(post_path.collection(paths::USER_VOTES)?);
        let comments = Query::new(paths::comments(post_id)?);

        let result = run_transaction(&self.retry, || {
            let store = self.store.clone();
            let post_path = post_path.clone();
            let post_votes = post_votes.clone();
            let comments = comments.clone();
            async move {
                let mut tx = Transaction::begin(store.as_ref());
                let post: Post = tx
                    .get_as(&post_path)
                    .await?
                    .ok_or_else(|| ServiceError::not_found("Post", post_path.id()))?;
                ensure_can_modify(actor, &post.author_id, "post")?;

                // New comments and post votes bump the post's version and new
                // comment votes bump their comment's, so anything created
                // after these reads fails the commit.
                let mut doomed: Vec<_> = store
                    .query(&post_votes)
                    .await?
                    .into_iter()
                    .map(|doc| doc.path)
                    .collect();
                for comment in store.query(&comments).await? {
                    tx.get(&comment.path).await?;
                    let comment_votes = Query::new(comment.path.collection(paths::USER_VOTES)?);
                    doomed.extend(store.query(&comment_votes).await?.into_iter().map(|doc| doc.path));
                    doomed.push(comment.path);
                }

                for path in doomed {
                    tx.delete(path);
                }
                tx.delete(post_path);
                tx.commit().await?;
                Ok::<_, ServiceError>(())
            }
        })
        .await;

        match &result {
            Ok(()) => info!(post_id, actor = %actor.user_id, "Post deleted"),
            Err(err) => record_error("delete_post", err.code()),
        }
        result
    }

    /// Best-effort view counter. Failures are logged and swallowed.
    pub async fn record_view(&self, post_id: &str) {
        let path = match paths::post(post_id) {
            Ok(path) => path,
            Err(e) => {
                warn!(post_id, error = %e, "Skipping view count for invalid post id");
                return;
            }
        };
        let write = Write::Update {
            path,
            fields: Fields::new(),
            transforms: vec![FieldTransform::Increment {
                field: "viewCount".to_string(),
                by: 1,
            }],
        };
        if let Err(e) = self.store.commit(&[], &[write]).await {
            warn!(post_id, error = %e, "Failed to record post view");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clean_tags_normalizes_and_dedupes() {
        let tags = clean_tags(vec![" Rust ".into(), "rust".into(), "".into(), "async".into()]);
        assert_eq!(tags, vec!["rust".to_string(), "async".to_string()]);
    }

    #[test]
    fn test_list_query_ordering() {
        let query = PostService::list_query(PostOrder::VoteScore, true, Some(10)).unwrap();
        assert_eq!(query.order_by[0].field, "voteScore");
        assert_eq!(query.filters.len(), 1);
        assert_eq!(query.limit, Some(10));
    }
}
