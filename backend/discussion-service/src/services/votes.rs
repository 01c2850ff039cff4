//! Vote toggle protocol.
//!
//! A vote request reads the subject and the caller's vote marker, plans the
//! transition and writes the subject counters plus the marker in one
//! transaction. Contention re-runs the whole body, so every committed state
//! keeps counters equal to the number of markers per direction.

use chrono::Utc;
use doc_store::{
    encode, run_transaction, DocPath, FieldTransform, Fields, RetryPolicy,
    SharedStore, Transaction,
};
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, info};

use crate::domain::{paths, VoteDirection, VoteOutcome, VoteRecord, VoteState, VoteTransition};
use crate::error::{Result, ServiceError};
use crate::metrics::{record_error, VOTES_TOTAL};
use crate::middleware::Actor;
use crate::services::require_id;

/// What is being voted on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VoteSubject {
    Post { post_id: String },
    Comment { post_id: String, comment_id: String },
}

impl VoteSubject {
    pub fn post(post_id: impl Into<String>) -> Self {
        Self::Post {
            post_id: post_id.into(),
        }
    }

    pub fn comment(post_id: impl Into<String>, comment_id: impl Into<String>) -> Self {
        Self::Comment {
            post_id: post_id.into(),
            comment_id: comment_id.into(),
        }
    }

    fn kind(&self) -> &'static str {
        match self {
            Self::Post { .. } => "post",
            Self::Comment { .. } => "comment",
        }
    }

    fn resource(&self) -> &'static str {
        match self {
            Self::Post { .. } => "Post",
            Self::Comment { .. } => "Comment",
        }
    }

    fn validate(&self) -> Result<()> {
        match self {
            Self::Post { post_id } => require_id("Post ID", post_id),
            Self::Comment {
                post_id,
                comment_id,
            } => {
                require_id("Post ID", post_id)?;
                require_id("Comment ID", comment_id)
            }
        }
    }

    fn subject_path(&self) -> Result<DocPath> {
        Ok(match self {
            Self::Post { post_id } => paths::post(post_id)?,
            Self::Comment {
                post_id,
                comment_id,
            } => paths::comment(post_id, comment_id)?,
        })
    }

    fn vote_path(&self, user_id: &str) -> Result<DocPath> {
        Ok(match self {
            Self::Post { post_id } => paths::post_vote(post_id, user_id)?,
            Self::Comment {
                post_id,
                comment_id,
            } => paths::comment_vote(post_id, comment_id, user_id)?,
        })
    }

    fn record(&self, user_id: String, direction: VoteDirection, existing: Option<&VoteRecord>) -> VoteRecord {
        let now = Utc::now();
        let (post_id, comment_id) = match self {
            Self::Post { post_id } => (post_id.clone(), None),
            Self::Comment {
                post_id,
                comment_id,
            } => (post_id.clone(), Some(comment_id.clone())),
        };
        VoteRecord {
            user_id,
            post_id,
            comment_id,
            direction,
            created_at: existing.map(|r| r.created_at).unwrap_or(now),
            updated_at: now,
        }
    }
}

/// Counter fields shared by posts and comments.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct VoteCounters {
    #[serde(default)]
    upvote_count: i64,
    #[serde(default)]
    downvote_count: i64,
}

#[derive(Clone)]
pub struct VoteService {
    store: SharedStore,
    retry: RetryPolicy,
}

impl VoteService {
    pub fn new(store: SharedStore, retry: RetryPolicy) -> Self {
        Self { store, retry }
    }

    pub async fn vote_on_post(&self, actor: &Actor, post_id: &str, direction: &str) -> Result<VoteOutcome> {
        self.vote(actor, VoteSubject::post(post_id), direction).await
    }

    pub async fn vote_on_comment(
        &self,
        actor: &Actor,
        post_id: &str,
        comment_id: &str,
        direction: &str,
    ) -> Result<VoteOutcome> {
        self.vote(actor, VoteSubject::comment(post_id, comment_id), direction)
            .await
    }

    /// Toggle the caller's vote on a subject.
    ///
    /// The direction is parsed before any store access; any failure leaves
    /// counters and markers untouched.
    pub async fn vote(&self, actor: &Actor, subject: VoteSubject, direction: &str) -> Result<VoteOutcome> {
        let result = self.apply_vote(actor, &subject, direction).await;
        if let Err(err) = &result {
            record_error("vote", err.code());
        }
        result
    }

    async fn apply_vote(&self, actor: &Actor, subject: &VoteSubject, direction: &str) -> Result<VoteOutcome> {
        subject.validate()?;
        let requested: VoteDirection = direction.parse()?;
        let user_id = actor.id();
        let subject_path = subject.subject_path()?;
        let vote_path = subject.vote_path(&user_id)?;

        let (existing, outcome) = run_transaction(&self.retry, || {
            let store = self.store.clone();
            let subject_path = subject_path.clone();
            let vote_path = vote_path.clone();
            let user_id = user_id.clone();
            async move {
                let mut tx = Transaction::begin(store.as_ref());

                let subject_doc = tx
                    .get(&subject_path)
                    .await?
                    .ok_or_else(|| ServiceError::not_found(subject.resource(), subject_path.id()))?;
                let counters: VoteCounters = subject_doc.decode()?;
                let existing_record: Option<VoteRecord> = tx.get_as(&vote_path).await?;

                let existing = VoteState::from(existing_record.as_ref().map(|r| r.direction));
                let plan = VoteTransition::plan(existing, requested);

                let upvote_count = counters.upvote_count + plan.up_delta;
                let downvote_count = counters.downvote_count + plan.down_delta;
                let vote_score = upvote_count - downvote_count;

                let mut fields = Fields::new();
                fields.insert("upvoteCount".to_string(), Value::from(upvote_count));
                fields.insert("downvoteCount".to_string(), Value::from(downvote_count));
                fields.insert("voteScore".to_string(), Value::from(vote_score));
                tx.update(
                    subject_path.clone(),
                    fields,
                    vec![FieldTransform::ServerTimestamp {
                        field: "updatedAt".to_string(),
                    }],
                );

                match plan.next.direction() {
                    Some(direction) => {
                        let record = subject.record(user_id, direction, existing_record.as_ref());
                        tx.set(vote_path.clone(), encode(&record)?);
                    }
                    None => {
                        tx.delete(vote_path.clone());
                    }
                }

                tx.commit().await?;

                Ok::<_, ServiceError>((
                    existing,
                    VoteOutcome {
                        upvote_count,
                        downvote_count,
                        vote_score,
                        direction: plan.next,
                    },
                ))
            }
        })
        .await?;

        VOTES_TOTAL
            .with_label_values(&[subject.kind(), VoteTransition::label(existing, outcome.direction)])
            .inc();
        info!(
            subject = %subject_path,
            user_id = %user_id,
            from = ?existing,
            to = ?outcome.direction,
            vote_score = outcome.vote_score,
            "Vote applied"
        );

        Ok(outcome)
    }

    /// The caller's current vote on a subject.
    pub async fn current_vote(&self, actor: &Actor, subject: &VoteSubject) -> Result<VoteState> {
        subject.validate()?;
        let vote_path = subject.vote_path(&actor.id())?;
        let state = match self.store.get(&vote_path).await? {
            Some(doc) => VoteState::from(Some(doc.decode::<VoteRecord>()?.direction)),
            None => VoteState::None,
        };
        debug!(vote = %vote_path, state = ?state, "Read vote state");
        Ok(state)
    }
}
