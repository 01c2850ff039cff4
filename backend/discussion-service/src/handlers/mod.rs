/// HTTP handlers for discussion-service
///
/// Routes are registered through [`configure`] so the binary and the
/// integration tests serve the exact same surface.
pub mod admin;
pub mod comments;
pub mod events;
pub mod posts;
pub mod streams;
pub mod users;
pub mod votes;

use std::sync::Arc;

use actix_web::{web, HttpResponse};
use serde_json::json;
use validator::Validate;

use crate::error::{Result, ServiceError};
use crate::metrics::serve_metrics;
use crate::middleware::{Actor, Identity, JwtAuthMiddleware, JwtVerifier, MetricsMiddleware};
use crate::AppState;

/// Register every route. Everything under `/api/v1` requires a bearer token.
pub fn configure(cfg: &mut web::ServiceConfig, verifier: Arc<JwtVerifier>) {
    cfg.app_data(web::JsonConfig::default().error_handler(|err, _| {
        ServiceError::validation("validation/invalid-body", err.to_string()).into()
    }))
    .app_data(web::QueryConfig::default().error_handler(|err, _| {
        ServiceError::validation("validation/invalid-query", err.to_string()).into()
    }))
    .route("/health", web::get().to(health))
    .route("/ready", web::get().to(ready))
    .route("/metrics", web::get().to(serve_metrics))
    .service(
        web::scope("/api/v1")
            .wrap(JwtAuthMiddleware::new(verifier))
            .wrap(MetricsMiddleware)
            .service(
                web::scope("/posts")
                    .service(
                        web::resource("")
                            .route(web::get().to(posts::list_posts))
                            .route(web::post().to(posts::create_post)),
                    )
                    .route("/stream", web::get().to(streams::stream_posts))
                    .service(
                        web::resource("/{post_id}")
                            .route(web::get().to(posts::get_post))
                            .route(web::patch().to(posts::update_post))
                            .route(web::delete().to(posts::delete_post)),
                    )
                    .service(
                        web::resource("/{post_id}/vote")
                            .route(web::get().to(votes::get_post_vote))
                            .route(web::post().to(votes::vote_on_post)),
                    )
                    .service(
                        web::resource("/{post_id}/comments")
                            .route(web::get().to(comments::list_comments))
                            .route(web::post().to(comments::add_comment)),
                    )
                    .route(
                        "/{post_id}/comments/stream",
                        web::get().to(streams::stream_comments),
                    )
                    .service(
                        web::resource("/{post_id}/comments/{comment_id}")
                            .route(web::patch().to(comments::update_comment))
                            .route(web::delete().to(comments::delete_comment)),
                    )
                    .service(
                        web::resource("/{post_id}/comments/{comment_id}/vote")
                            .route(web::get().to(votes::get_comment_vote))
                            .route(web::post().to(votes::vote_on_comment)),
                    ),
            )
            .service(
                web::scope("/users")
                    .route("/me", web::get().to(users::get_me))
                    .service(
                        web::resource("/{uid}")
                            .route(web::get().to(users::get_user))
                            .route(web::patch().to(users::update_user)),
                    ),
            )
            .service(
                web::scope("/events")
                    .service(
                        web::resource("")
                            .route(web::get().to(events::list_events))
                            .route(web::post().to(events::add_event)),
                    )
                    .route("/upcoming", web::get().to(events::upcoming_events))
                    .route("/featured", web::get().to(events::featured_events))
                    .service(
                        web::resource("/{event_id}")
                            .route(web::get().to(events::get_event))
                            .route(web::patch().to(events::update_event))
                            .route(web::delete().to(events::delete_event)),
                    ),
            )
            .service(
                web::scope("/admin")
                    .route("/users", web::get().to(admin::list_users))
                    .route("/grant-admin", web::post().to(admin::grant_admin))
                    .route("/users/{uid}", web::delete().to(admin::delete_user))
                    .route("/users/{uid}/role", web::put().to(admin::set_role)),
            ),
    );
}

async fn health(state: web::Data<AppState>) -> HttpResponse {
    HttpResponse::Ok().json(json!({
        "status": "ok",
        "service": "discussion-service",
        "store": state.store.backend_name(),
        "version": env!("CARGO_PKG_VERSION")
    }))
}

async fn ready(state: web::Data<AppState>) -> HttpResponse {
    match state.store.ping().await {
        Ok(()) => HttpResponse::Ok().json(json!({ "status": "ready" })),
        Err(e) => {
            tracing::warn!(error = %e, "Readiness check failed");
            HttpResponse::ServiceUnavailable().json(json!({
                "status": "unavailable",
                "error": "document store unreachable"
            }))
        }
    }
}

/// Resolve the caller's stored role.
pub(crate) async fn load_actor(state: &AppState, identity: &Identity) -> Result<Actor> {
    state.users.actor(identity).await
}

/// Run `validator` rules on a request body.
pub(crate) fn validate<T: Validate>(body: &T) -> Result<()> {
    body.validate().map_err(ServiceError::from)
}
