use actix_web::{web, HttpResponse};
use serde::Deserialize;
use validator::Validate;

use crate::error::Result;
use crate::handlers::{load_actor, validate};
use crate::middleware::Identity;
use crate::AppState;

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct AddCommentRequest {
    #[validate(length(min = 1, max = 10000))]
    pub content: String,
    /// Comment being replied to
    pub parent_id: Option<String>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct UpdateCommentRequest {
    #[validate(length(min = 1, max = 10000))]
    pub content: String,
}

/// GET /api/v1/posts/{post_id}/comments
pub async fn list_comments(state: web::Data<AppState>, path: web::Path<String>) -> Result<HttpResponse> {
    let comments = state.comments.list_comments(&path.into_inner()).await?;
    Ok(HttpResponse::Ok().json(comments))
}

/// POST /api/v1/posts/{post_id}/comments
pub async fn add_comment(
    state: web::Data<AppState>,
    identity: Identity,
    path: web::Path<String>,
    body: web::Json<AddCommentRequest>,
) -> Result<HttpResponse> {
    validate(&*body)?;
    let actor = load_actor(&state, &identity).await?;
    let comment = state
        .comments
        .add_comment(&actor, &path.into_inner(), &body.content, body.parent_id.as_deref())
        .await?;
    Ok(HttpResponse::Created().json(comment))
}

/// PATCH /api/v1/posts/{post_id}/comments/{comment_id}
pub async fn update_comment(
    state: web::Data<AppState>,
    identity: Identity,
    path: web::Path<(String, String)>,
    body: web::Json<UpdateCommentRequest>,
) -> Result<HttpResponse> {
    validate(&*body)?;
    let (post_id, comment_id) = path.into_inner();
    let actor = load_actor(&state, &identity).await?;
    let comment = state
        .comments
        .update_comment(&actor, &post_id, &comment_id, &body.content)
        .await?;
    Ok(HttpResponse::Ok().json(comment))
}

/// DELETE /api/v1/posts/{post_id}/comments/{comment_id}
pub async fn delete_comment(
    state: web::Data<AppState>,
    identity: Identity,
    path: web::Path<(String, String)>,
) -> Result<HttpResponse> {
    let (post_id, comment_id) = path.into_inner();
    let actor = load_actor(&state, &identity).await?;
    state
        .comments
        .delete_comment(&actor, &post_id, &comment_id)
        .await?;
    Ok(HttpResponse::NoContent().finish())
}
