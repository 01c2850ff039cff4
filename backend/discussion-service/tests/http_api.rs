mod common;

use std::sync::Arc;

use actix_web::body::MessageBody;
use actix_web::dev::{Service, ServiceResponse};
use actix_web::http::StatusCode;
use actix_web::{test, web, App};
use common::{memory_state, seed_profile, token, SECRET};
use discussion_service::domain::Role;
use discussion_service::handlers;
use discussion_service::middleware::JwtVerifier;
use serde_json::{json, Value};
use uuid::Uuid;

/// Call the app and render middleware errors the way the server would.
async fn send<S, R, B>(app: &S, req: R) -> (StatusCode, Value)
where
    S: Service<R, Response = ServiceResponse<B>, Error = actix_web::Error>,
    B: MessageBody,
{
    let (status, bytes) = match app.call(req).await {
        Ok(res) => {
            let status = res.status();
            (status, test::read_body(res).await)
        }
        Err(err) => {
            let res = err.as_response_error().error_response();
            let status = res.status();
            let bytes = actix_web::body::to_bytes(res.into_body())
                .await
                .unwrap_or_default();
            (status, bytes)
        }
    };
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or(Value::Null)
    };
    (status, body)
}

macro_rules! app {
    ($state:expr) => {{
        let verifier = Arc::new(JwtVerifier::new(SECRET).unwrap());
        test::init_service(
            App::new()
                .app_data(web::Data::new($state))
                .configure(move |cfg| handlers::configure(cfg, verifier)),
        )
        .await
    }};
}

fn bearer(user_id: Uuid, name: &str, email: &str) -> (&'static str, String) {
    ("Authorization", format!("Bearer {}", token(user_id, Some(name), Some(email))))
}

#[actix_web::test]
async fn test_health_is_public() {
    let (_store, state) = memory_state();
    let app = app!(state);

    let (status, body) = send(&app, test::TestRequest::get().uri("/health").to_request()).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
    assert_eq!(body["store"], "memory");
}

#[actix_web::test]
async fn test_api_requires_token() {
    let (_store, state) = memory_state();
    let app = app!(state);

    let (status, body) = send(&app, test::TestRequest::get().uri("/api/v1/posts").to_request()).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["code"], "auth/not-authenticated");

    let req = test::TestRequest::get()
        .uri("/api/v1/posts")
        .insert_header(("Authorization", "Bearer not-a-jwt"))
        .to_request();
    let (status, body) = send(&app, req).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["code"], "auth/not-authenticated");
}

#[actix_web::test]
async fn test_first_request_creates_basic_profile() {
    let (_store, state) = memory_state();
    let app = app!(state);
    let user_id = Uuid::new_v4();

    let req = test::TestRequest::get()
        .uri("/api/v1/users/me")
        .insert_header(bearer(user_id, "Grace", "grace@example.com"))
        .to_request();
    let (status, body) = send(&app, req).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["uid"], user_id.to_string());
    assert_eq!(body["displayName"], "Grace");
    assert_eq!(body["role"], "basic");
}

#[actix_web::test]
async fn test_post_vote_and_comment_flow() {
    let (store, state) = memory_state();
    let app = app!(state);
    let author_id = Uuid::new_v4();
    let reader_id = Uuid::new_v4();
    seed_profile(&store, author_id, "author@example.com", Role::Author).await;

    let req = test::TestRequest::post()
        .uri("/api/v1/posts")
        .insert_header(bearer(author_id, "Author", "author@example.com"))
        .set_json(json!({ "title": "Hello", "content": "World", "tags": ["Rust", "rust"] }))
        .to_request();
    let (status, post) = send(&app, req).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(post["tags"], json!(["rust"]));
    assert_eq!(post["voteScore"], 0);
    let post_id = post["id"].as_str().unwrap().to_string();

    let req = test::TestRequest::post()
        .uri(&format!("/api/v1/posts/{}/vote", post_id))
        .insert_header(bearer(reader_id, "Reader", "reader@example.com"))
        .set_json(json!({ "direction": "down" }))
        .to_request();
    let (status, outcome) = send(&app, req).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(outcome["downvoteCount"], 1);
    assert_eq!(outcome["voteScore"], -1);
    assert_eq!(outcome["direction"], "down");

    let req = test::TestRequest::get()
        .uri(&format!("/api/v1/posts/{}/vote", post_id))
        .insert_header(bearer(reader_id, "Reader", "reader@example.com"))
        .to_request();
    let (_, current) = send(&app, req).await;
    assert_eq!(current["direction"], "down");

    let req = test::TestRequest::post()
        .uri(&format!("/api/v1/posts/{}/comments", post_id))
        .insert_header(bearer(reader_id, "Reader", "reader@example.com"))
        .set_json(json!({ "content": "Why the downvote? Because." }))
        .to_request();
    let (status, comment) = send(&app, req).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(comment["authorName"], "Reader");
    let comment_id = comment["id"].as_str().unwrap().to_string();

    let req = test::TestRequest::get()
        .uri(&format!("/api/v1/posts/{}", post_id))
        .insert_header(bearer(reader_id, "Reader", "reader@example.com"))
        .to_request();
    let (status, fetched) = send(&app, req).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(fetched["commentCount"], 1);
    assert_eq!(fetched["downvoteCount"], 1);

    let req = test::TestRequest::delete()
        .uri(&format!("/api/v1/posts/{}/comments/{}", post_id, comment_id))
        .insert_header(bearer(author_id, "Author", "author@example.com"))
        .to_request();
    let (status, body) = send(&app, req).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["code"], "permission-denied");

    let req = test::TestRequest::delete()
        .uri(&format!("/api/v1/posts/{}/comments/{}", post_id, comment_id))
        .insert_header(bearer(reader_id, "Reader", "reader@example.com"))
        .to_request();
    let (status, _) = send(&app, req).await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let req = test::TestRequest::get()
        .uri(&format!("/api/v1/posts/{}/comments", post_id))
        .insert_header(bearer(reader_id, "Reader", "reader@example.com"))
        .to_request();
    let (status, comments) = send(&app, req).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(comments, json!([]));
}

#[actix_web::test]
async fn test_error_bodies_carry_codes() {
    let (store, state) = memory_state();
    let app = app!(state);
    let author_id = Uuid::new_v4();
    seed_profile(&store, author_id, "author@example.com", Role::Author).await;
    let auth = bearer(author_id, "Author", "author@example.com");

    let req = test::TestRequest::post()
        .uri("/api/v1/posts/nope/vote")
        .insert_header(auth.clone())
        .set_json(json!({ "direction": "sideways" }))
        .to_request();
    let (status, body) = send(&app, req).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "validation/invalid-direction");

    let req = test::TestRequest::post()
        .uri("/api/v1/posts/nope/vote")
        .insert_header(auth.clone())
        .set_json(json!({ "direction": "up" }))
        .to_request();
    let (status, body) = send(&app, req).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["code"], "not-found");

    let req = test::TestRequest::post()
        .uri("/api/v1/posts")
        .insert_header(auth.clone())
        .set_json(json!({ "title": "", "content": "Body" }))
        .to_request();
    let (status, body) = send(&app, req).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "validation/invalid-fields");
    assert!(body["details"]["title"].is_array());

    let req = test::TestRequest::post()
        .uri("/api/v1/posts")
        .insert_header(auth.clone())
        .insert_header(("Content-Type", "application/json"))
        .set_payload("{ not json")
        .to_request();
    let (status, body) = send(&app, req).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "validation/invalid-body");
}

#[actix_web::test]
async fn test_grant_admin_requires_admin() {
    let (store, state) = memory_state();
    let app = app!(state);
    let admin_id = Uuid::new_v4();
    let user_id = Uuid::new_v4();
    seed_profile(&store, admin_id, "admin@example.com", Role::Admin).await;
    seed_profile(&store, user_id, "user@example.com", Role::Basic).await;

    let req = test::TestRequest::post()
        .uri("/api/v1/admin/grant-admin")
        .insert_header(bearer(user_id, "User", "user@example.com"))
        .set_json(json!({ "email": "user@example.com" }))
        .to_request();
    let (status, body) = send(&app, req).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["message"], "Only admins can add other admins.");

    let req = test::TestRequest::post()
        .uri("/api/v1/admin/grant-admin")
        .insert_header(bearer(admin_id, "Admin", "admin@example.com"))
        .set_json(json!({ "email": "nobody@example.com" }))
        .to_request();
    let (status, _) = send(&app, req).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let req = test::TestRequest::post()
        .uri("/api/v1/admin/grant-admin")
        .insert_header(bearer(admin_id, "Admin", "admin@example.com"))
        .set_json(json!({ "email": "user@example.com" }))
        .to_request();
    let (status, body) = send(&app, req).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], "Success! user@example.com has been made an admin.");

    let req = test::TestRequest::get()
        .uri("/api/v1/admin/users?role=admin")
        .insert_header(bearer(user_id, "User", "user@example.com"))
        .to_request();
    let (status, users) = send(&app, req).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(users.as_array().map(Vec::len), Some(2));
}

#[actix_web::test]
async fn test_profile_edits_are_self_or_admin() {
    let (store, state) = memory_state();
    let app = app!(state);
    let owner_id = Uuid::new_v4();
    let other_id = Uuid::new_v4();
    seed_profile(&store, owner_id, "owner@example.com", Role::Basic).await;

    let req = test::TestRequest::patch()
        .uri(&format!("/api/v1/users/{}", owner_id))
        .insert_header(bearer(other_id, "Other", "other@example.com"))
        .set_json(json!({ "displayName": "Mallory" }))
        .to_request();
    let (status, _) = send(&app, req).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let req = test::TestRequest::patch()
        .uri(&format!("/api/v1/users/{}", owner_id))
        .insert_header(bearer(owner_id, "Owner", "owner@example.com"))
        .set_json(json!({ "displayName": "Owner Renamed", "photoUrl": "https://cdn.example.com/a.png" }))
        .to_request();
    let (status, profile) = send(&app, req).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(profile["displayName"], "Owner Renamed");
    assert_eq!(profile["photoUrl"], "https://cdn.example.com/a.png");
    assert_eq!(profile["role"], "basic");
}

#[actix_web::test]
async fn test_emails_match_case_insensitively() {
    let (store, state) = memory_state();
    let app = app!(state);
    let admin_id = Uuid::new_v4();
    let user_id = Uuid::new_v4();
    seed_profile(&store, admin_id, "admin@example.com", Role::Admin).await;

    let req = test::TestRequest::get()
        .uri("/api/v1/users/me")
        .insert_header(bearer(user_id, "Mixed", "Mixed.Case@Example.COM"))
        .to_request();
    let (status, profile) = send(&app, req).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(profile["email"], "mixed.case@example.com");

    let req = test::TestRequest::post()
        .uri("/api/v1/admin/grant-admin")
        .insert_header(bearer(admin_id, "Admin", "admin@example.com"))
        .set_json(json!({ "email": "MIXED.case@Example.com" }))
        .to_request();
    let (status, body) = send(&app, req).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], "Success! mixed.case@example.com has been made an admin.");

    let req = test::TestRequest::get()
        .uri(&format!("/api/v1/users/{}", user_id))
        .insert_header(bearer(user_id, "Mixed", "Mixed.Case@Example.COM"))
        .to_request();
    let (_, profile) = send(&app, req).await;
    assert_eq!(profile["role"], "admin");
}

#[actix_web::test]
async fn test_admin_deletes_user_profile() {
    let (store, state) = memory_state();
    let app = app!(state);
    let admin_id = Uuid::new_v4();
    let user_id = Uuid::new_v4();
    seed_profile(&store, admin_id, "admin@example.com", Role::Admin).await;
    seed_profile(&store, user_id, "user@example.com", Role::Author).await;

    let req = test::TestRequest::delete()
        .uri(&format!("/api/v1/admin/users/{}", admin_id))
        .insert_header(bearer(user_id, "User", "user@example.com"))
        .to_request();
    let (status, body) = send(&app, req).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["code"], "permission-denied");

    let req = test::TestRequest::delete()
        .uri(&format!("/api/v1/admin/users/{}", user_id))
        .insert_header(bearer(admin_id, "Admin", "admin@example.com"))
        .to_request();
    let (status, _) = send(&app, req).await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let req = test::TestRequest::get()
        .uri(&format!("/api/v1/users/{}", user_id))
        .insert_header(bearer(admin_id, "Admin", "admin@example.com"))
        .to_request();
    let (status, body) = send(&app, req).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["code"], "not-found");

    let req = test::TestRequest::delete()
        .uri(&format!("/api/v1/admin/users/{}", user_id))
        .insert_header(bearer(admin_id, "Admin", "admin@example.com"))
        .to_request();
    let (status, _) = send(&app, req).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}
