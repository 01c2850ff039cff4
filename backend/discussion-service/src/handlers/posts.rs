use actix_web::{web, HttpResponse};
use serde::Deserialize;
use validator::Validate;

use crate::error::Result;
use crate::handlers::{load_actor, validate};
use crate::middleware::Identity;
use crate::services::{NewPost, PostOrder, PostPatch};
use crate::AppState;

const MAX_LIST_LIMIT: usize = 100;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListPostsQuery {
    #[serde(default)]
    pub order: PostOrder,
    #[serde(default)]
    pub published_only: bool,
    pub limit: Option<usize>,
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreatePostRequest {
    #[validate(length(min = 1, max = 300))]
    pub title: String,
    #[validate(length(min = 1, max = 50000))]
    pub content: String,
    #[serde(default)]
    #[validate(length(max = 20))]
    pub tags: Vec<String>,
    #[serde(default)]
    #[validate(length(max = 10))]
    pub attachments: Vec<String>,
    pub published: Option<bool>,
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct UpdatePostRequest {
    #[validate(length(min = 1, max = 300))]
    pub title: Option<String>,
    #[validate(length(min = 1, max = 50000))]
    pub content: Option<String>,
    #[validate(length(max = 20))]
    pub tags: Option<Vec<String>>,
    #[validate(length(max = 10))]
    pub attachments: Option<Vec<String>>,
    pub published: Option<bool>,
}

/// GET /api/v1/posts
pub async fn list_posts(
    state: web::Data<AppState>,
    query: web::Query<ListPostsQuery>,
) -> Result<HttpResponse> {
    let limit = query.limit.map(|l| l.min(MAX_LIST_LIMIT));
    let posts = state
        .posts
        .list_posts(query.order, query.published_only, limit)
        .await?;
    Ok(HttpResponse::Ok().json(posts))
}

/// POST /api/v1/posts
pub async fn create_post(
    state: web::Data<AppState>,
    identity: Identity,
    body: web::Json<CreatePostRequest>,
) -> Result<HttpResponse> {
    validate(&*body)?;
    let actor = load_actor(&state, &identity).await?;
    let body = body.into_inner();

    let post = state
        .posts
        .create_post(
            &actor,
            NewPost {
                title: body.title,
                content: body.content,
                tags: body.tags,
                attachments: body.attachments,
                published: body.published,
            },
        )
        .await?;
    Ok(HttpResponse::Created().json(post))
}

/// GET /api/v1/posts/{post_id}
///
/// Counts a view after a successful read.
pub async fn get_post(state: web::Data<AppState>, path: web::Path<String>) -> Result<HttpResponse> {
    let post_id = path.into_inner();
    let post = state.posts.get_post(&post_id).await?;
    state.posts.record_view(&post_id).await;
    Ok(HttpResponse::Ok().json(post))
}

/// PATCH /api/v1/posts/{post_id}
pub async fn update_post(
    state: web::Data<AppState>,
    identity: Identity,
    path: web::Path<String>,
    body: web::Json<UpdatePostRequest>,
) -> Result<HttpResponse> {
    validate(&*body)?;
    let actor = load_actor(&state, &identity).await?;
    let body = body.into_inner();

    let post = state
        .posts
        .update_post(
            &actor,
            &path.into_inner(),
            PostPatch {
                title: body.title,
                content: body.content,
                tags: body.tags,
                attachments: body.attachments,
                published: body.published,
            },
        )
        .await?;
    Ok(HttpResponse::Ok().json(post))
}

/// DELETE /api/v1/posts/{post_id}
pub async fn delete_post(
    state: web::Data<AppState>,
    identity: Identity,
    path: web::Path<String>,
) -> Result<HttpResponse> {
    let actor = load_actor(&state, &identity).await?;
    state.posts.delete_post(&actor, &path.into_inner()).await?;
    Ok(HttpResponse::NoContent().finish())
}
