use actix_web::{web, HttpResponse};
use serde::Deserialize;
use serde_json::json;
use validator::Validate;

use crate::domain::Role;
use crate::error::Result;
use crate::handlers::{load_actor, validate};
use crate::middleware::Identity;
use crate::AppState;

#[derive(Debug, Deserialize, Validate)]
pub struct GrantAdminRequest {
    #[validate(email)]
    pub email: String,
}

#[derive(Debug, Deserialize)]
pub struct SetRoleRequest {
    pub role: Role,
}

#[derive(Debug, Deserialize)]
pub struct ListUsersQuery {
    pub role: Option<Role>,
}

/// GET /api/v1/admin/users
pub async fn list_users(
    state: web::Data<AppState>,
    identity: Identity,
    query: web::Query<ListUsersQuery>,
) -> Result<HttpResponse> {
    let actor = load_actor(&state, &identity).await?;
    let users = state.users.list_users(&actor, query.role).await?;
    Ok(HttpResponse::Ok().json(users))
}

/// POST /api/v1/admin/grant-admin
pub async fn grant_admin(
    state: web::Data<AppState>,
    identity: Identity,
    body: web::Json<GrantAdminRequest>,
) -> Result<HttpResponse> {
    let actor = load_actor(&state, &identity).await?;
    // Non-admins get permission-denied before their input is looked at.
    if actor.is_admin() {
        validate(&*body)?;
    }
    let message = state.users.grant_admin(&actor, &body.email).await?;
    Ok(HttpResponse::Ok().json(json!({ "message": message })))
}

/// DELETE /api/v1/admin/users/{uid}
pub async fn delete_user(
    state: web::Data<AppState>,
    identity: Identity,
    path: web::Path<String>,
) -> Result<HttpResponse> {
    let actor = load_actor(&state, &identity).await?;
    state.users.delete_user(&actor, &path.into_inner()).await?;
    Ok(HttpResponse::NoContent().finish())
}

/// PUT /api/v1/admin/users/{uid}/role
pub async fn set_role(
    state: web::Data<AppState>,
    identity: Identity,
    path: web::Path<String>,
    body: web::Json<SetRoleRequest>,
) -> Result<HttpResponse> {
    let actor = load_actor(&state, &identity).await?;
    let profile = state
        .users
        .set_role(&actor, &path.into_inner(), body.role)
        .await?;
    Ok(HttpResponse::Ok().json(profile))
}
