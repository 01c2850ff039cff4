mod common;

use std::future::poll_fn;
use std::sync::Arc;
use std::time::Duration;

use actix_web::body::MessageBody;
use actix_web::dev::Service;
use actix_web::http::StatusCode;
use actix_web::{test, web, App};
use common::{actor, memory_state, new_post, seed_profile, token, SECRET};
use discussion_service::domain::{Comment, Post, Role};
use discussion_service::handlers;
use discussion_service::middleware::JwtVerifier;
use discussion_service::services::{CommentService, PostOrder, PostService};
use doc_store::watch;
use futures::StreamExt;
use serde_json::Value;
use tokio::time::timeout;
use uuid::Uuid;

const WAIT: Duration = Duration::from_secs(2);

#[tokio::test]
async fn test_comment_stream_follows_writes() {
    let (store, state) = memory_state();
    let author = actor(Role::Author, "Author");
    let post = state.posts.create_post(&author, new_post("Live")).await.unwrap();

    let mut stream = watch(store.clone(), CommentService::list_query(&post.id).unwrap());
    let initial = timeout(WAIT, stream.next()).await.unwrap().unwrap().unwrap();
    assert!(initial.documents.is_empty());

    let first = state
        .comments
        .add_comment(&author, &post.id, "one", None)
        .await
        .unwrap();
    let snapshot = timeout(WAIT, stream.next()).await.unwrap().unwrap().unwrap();
    let comments: Vec<Comment> = snapshot.documents.iter().map(|d| d.decode().unwrap()).collect();
    assert_eq!(comments.len(), 1);
    assert_eq!(comments[0].id, first.id);

    state
        .comments
        .delete_comment(&author, &post.id, &first.id)
        .await
        .unwrap();
    let snapshot = timeout(WAIT, stream.next()).await.unwrap().unwrap().unwrap();
    assert!(snapshot.documents.is_empty());
}

#[tokio::test]
async fn test_post_stream_reorders_on_votes() {
    let (store, state) = memory_state();
    let author = actor(Role::Author, "Author");
    let voter = actor(Role::Basic, "Voter");
    let older = state.posts.create_post(&author, new_post("Older")).await.unwrap();
    let newer = state.posts.create_post(&author, new_post("Newer")).await.unwrap();

    let query = PostService::list_query(PostOrder::VoteScore, false, None).unwrap();
    let mut stream = watch(store.clone(), query);
    let initial = timeout(WAIT, stream.next()).await.unwrap().unwrap().unwrap();
    let ids: Vec<String> = initial.documents.iter().map(|d| d.id().to_string()).collect();
    assert_eq!(ids, vec![newer.id.clone(), older.id.clone()]);

    state.votes.vote_on_post(&voter, &older.id, "up").await.unwrap();
    let snapshot = timeout(WAIT, stream.next()).await.unwrap().unwrap().unwrap();
    let posts: Vec<Post> = snapshot.documents.iter().map(|d| d.decode().unwrap()).collect();
    assert_eq!(posts[0].id, older.id);
    assert_eq!(posts[0].vote_score, 1);
}

#[actix_web::test]
async fn test_sse_endpoint_sends_initial_snapshot() {
    let (store, state) = memory_state();
    let author_id = Uuid::new_v4();
    seed_profile(&store, author_id, "author@example.com", Role::Author).await;
    let author = discussion_service::middleware::Actor::new(author_id, Role::Author, "Author");
    let post = state.posts.create_post(&author, new_post("Streamed")).await.unwrap();
    state
        .comments
        .add_comment(&author, &post.id, "hello", None)
        .await
        .unwrap();

    let verifier = Arc::new(JwtVerifier::new(SECRET).unwrap());
    let app = test::init_service(
        App::new()
            .app_data(web::Data::new(state))
            .configure(move |cfg| handlers::configure(cfg, verifier)),
    )
    .await;

    let auth = format!("Bearer {}", token(author_id, Some("Author"), None));
    let req = test::TestRequest::get()
        .uri(&format!("/api/v1/posts/{}/comments/stream", post.id))
        .insert_header(("Authorization", auth.clone()))
        .to_request();
    let res = app.call(req).await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(
        res.headers().get("content-type").unwrap().to_str().unwrap(),
        "text/event-stream"
    );

    let mut body = Box::pin(res.into_body());
    let chunk = timeout(WAIT, poll_fn(|cx| body.as_mut().poll_next(cx)))
        .await
        .unwrap()
        .unwrap()
        .unwrap();
    let text = std::str::from_utf8(&chunk).unwrap();
    let payload = text
        .strip_prefix("data: ")
        .and_then(|rest| rest.strip_suffix("\n\n"))
        .unwrap();
    let comments: Value = serde_json::from_str(payload).unwrap();
    assert_eq!(comments[0]["content"], "hello");

    let req = test::TestRequest::get()
        .uri("/api/v1/posts/missing/comments/stream")
        .insert_header(("Authorization", auth))
        .to_request();
    let res = app.call(req).await.unwrap();
    assert_eq!(res.status(), StatusCode::NOT_FOUND);
}
