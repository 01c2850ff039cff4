use actix_web::{web, HttpResponse};
use serde::{Deserialize, Serialize};

use crate::domain::VoteState;
use crate::error::Result;
use crate::handlers::load_actor;
use crate::middleware::Identity;
use crate::services::VoteSubject;
use crate::AppState;

/// Direction stays a raw string so the protocol owns its validation.
#[derive(Debug, Deserialize)]
pub struct VoteRequest {
    pub direction: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct VoteStateResponse {
    pub direction: VoteState,
}

/// POST /api/v1/posts/{post_id}/vote
pub async fn vote_on_post(
    state: web::Data<AppState>,
    identity: Identity,
    path: web::Path<String>,
    body: web::Json<VoteRequest>,
) -> Result<HttpResponse> {
    let actor = load_actor(&state, &identity).await?;
    let outcome = state
        .votes
        .vote_on_post(&actor, &path.into_inner(), &body.direction)
        .await?;
    Ok(HttpResponse::Ok().json(outcome))
}

/// POST /api/v1/posts/{post_id}/comments/{comment_id}/vote
pub async fn vote_on_comment(
    state: web::Data<AppState>,
    identity: Identity,
    path: web::Path<(String, String)>,
    body: web::Json<VoteRequest>,
) -> Result<HttpResponse> {
    let (post_id, comment_id) = path.into_inner();
    let actor = load_actor(&state, &identity).await?;
    let outcome = state
        .votes
        .vote_on_comment(&actor, &post_id, &comment_id, &body.direction)
        .await?;
    Ok(HttpResponse::Ok().json(outcome))
}

/// GET /api/v1/posts/{post_id}/vote
pub async fn get_post_vote(
    state: web::Data<AppState>,
    identity: Identity,
    path: web::Path<String>,
) -> Result<HttpResponse> {
    let actor = load_actor(&state, &identity).await?;
    let direction = state
        .votes
        .current_vote(&actor, &VoteSubject::post(path.into_inner()))
        .await?;
    Ok(HttpResponse::Ok().json(VoteStateResponse { direction }))
}

/// GET /api/v1/posts/{post_id}/comments/{comment_id}/vote
pub async fn get_comment_vote(
    state: web::Data<AppState>,
    identity: Identity,
    path: web::Path<(String, String)>,
) -> Result<HttpResponse> {
    let (post_id, comment_id) = path.into_inner();
    let actor = load_actor(&state, &identity).await?;
    let direction = state
        .votes
        .current_vote(&actor, &VoteSubject::comment(post_id, comment_id))
        .await?;
    Ok(HttpResponse::Ok().json(VoteStateResponse { direction }))
}
