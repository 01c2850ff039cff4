#![allow(dead_code)]

use std::time::Duration;

use chrono::Utc;
use discussion_service::domain::{paths, Role, UserProfile};
use discussion_service::middleware::{Actor, Claims};
use discussion_service::services::NewPost;
use discussion_service::AppState;
use doc_store::{encode, MemoryStore, RetryPolicy, SharedStore, Write};
use jsonwebtoken::{encode as encode_jwt, Algorithm, EncodingKey, Header};
use uuid::Uuid;

pub const SECRET: &str = "integration-test-secret-at-least-32-bytes";

/// Retry policy generous enough for tests that race many writers.
pub fn retry_policy(max_attempts: u32) -> RetryPolicy {
    RetryPolicy {
        max_attempts,
        initial_backoff: Duration::from_millis(1),
        max_backoff: Duration::from_millis(20),
        jitter: true,
    }
}

pub fn memory_state() -> (SharedStore, AppState) {
    let store = MemoryStore::shared(64);
    let state = AppState::new(store.clone(), retry_policy(50));
    (store, state)
}

pub fn actor(role: Role, name: &str) -> Actor {
    Actor::new(Uuid::new_v4(), role, name)
}

pub fn token(user_id: Uuid, name: Option<&str>, email: Option<&str>) -> String {
    let now = Utc::now().timestamp();
    let claims = Claims {
        sub: user_id.to_string(),
        exp: now + 3600,
        iat: now,
        email: email.map(str::to_string),
        name: name.map(str::to_string),
    };
    encode_jwt(
        &Header::new(Algorithm::HS256),
        &claims,
        &EncodingKey::from_secret(SECRET.as_bytes()),
    )
    .expect("token encodes")
}

/// Store a profile directly, bypassing the role checks.
pub async fn seed_profile(store: &SharedStore, user_id: Uuid, email: &str, role: Role) {
    let now = Utc::now();
    let profile = UserProfile {
        uid: user_id.to_string(),
        display_name: email.split('@').next().unwrap_or("user").to_string(),
        email: email.to_string(),
        photo_url: None,
        banner_url: None,
        role,
        created_at: now,
        updated_at: now,
    };
    let path = paths::user(&profile.uid).expect("valid user path");
    store
        .commit(
            &[],
            &[Write::Set {
                path,
                data: encode(&profile).expect("profile encodes"),
            }],
        )
        .await
        .expect("profile seeded");
}

pub fn new_post(title: &str) -> NewPost {
    NewPost {
        title: title.to_string(),
        content: format!("Body of {}", title),
        tags: vec![],
        attachments: vec![],
        published: None,
    }
}
