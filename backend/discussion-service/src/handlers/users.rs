use actix_web::{web, HttpResponse};
use serde::Deserialize;
use validator::Validate;

use crate::error::Result;
use crate::handlers::{load_actor, validate};
use crate::middleware::Identity;
use crate::services::ProfilePatch;
use crate::AppState;

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct UpdateProfileRequest {
    #[validate(length(min = 1, max = 100))]
    pub display_name: Option<String>,
    #[validate(url)]
    pub photo_url: Option<String>,
    #[validate(url)]
    pub banner_url: Option<String>,
}

/// GET /api/v1/users/me
///
/// Creates the caller's profile on first use.
pub async fn get_me(state: web::Data<AppState>, identity: Identity) -> Result<HttpResponse> {
    let profile = state.users.ensure_profile(&identity).await?;
    Ok(HttpResponse::Ok().json(profile))
}

/// GET /api/v1/users/{uid}
pub async fn get_user(state: web::Data<AppState>, path: web::Path<String>) -> Result<HttpResponse> {
    let profile = state.users.get_user(&path.into_inner()).await?;
    Ok(HttpResponse::Ok().json(profile))
}

/// PATCH /api/v1/users/{uid}
pub async fn update_user(
    state: web::Data<AppState>,
    identity: Identity,
    path: web::Path<String>,
    body: web::Json<UpdateProfileRequest>,
) -> Result<HttpResponse> {
    validate(&*body)?;
    let actor = load_actor(&state, &identity).await?;
    let body = body.into_inner();
    let profile = state
        .users
        .update_profile(
            &actor,
            &path.into_inner(),
            ProfilePatch {
                display_name: body.display_name,
                photo_url: body.photo_url,
                banner_url: body.banner_url,
            },
        )
        .await?;
    Ok(HttpResponse::Ok().json(profile))
}
