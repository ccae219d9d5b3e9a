//! End-to-end API tests: a real server on an ephemeral port, a scratch
//! database per test, and plain HTTP against the REST surface.

use serde_json::{json, Value};
use tempfile::TempDir;

use civicsense::config::Config;
use civicsense::state::AppState;
use civicsense::{db, routes};

/// Spawn the app against a scratch database. Upstream endpoints point at
/// an unroutable address so no test ever leaves the machine.
async fn spawn_app() -> (String, TempDir) {
    let tmp = TempDir::new().unwrap();
    let pool = db::create_pool(&tmp.path().join("test.db")).unwrap();
    db::run_migrations(&pool).unwrap();

    let mut config = Config::default();
    config.upstream.image_upload_url = "http://127.0.0.1:1/upload".into();
    config.upstream.triage_url = "http://127.0.0.1:1/triage".into();
    config.upstream.timeout_secs = 1;

    let state = AppState::new(pool, config);
    let app = routes::app(state);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    (format!("http://{}", addr), tmp)
}

async fn register(base: &str, name: &str, email: &str, password: &str) -> (String, Value) {
    let response = reqwest::Client::new()
        .post(format!("{}/auth/register", base))
        .json(&json!({ "name": name, "email": email, "password": password }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);
    let body: Value = response.json().await.unwrap();
    let token = body["token"].as_str().unwrap().to_string();
    (token, body["user"].clone())
}

async fn create_post(base: &str, token: &str, body: Value) -> reqwest::Response {
    reqwest::Client::new()
        .post(format!("{}/posts", base))
        .bearer_auth(token)
        .json(&body)
        .send()
        .await
        .unwrap()
}

#[tokio::test]
async fn register_returns_token_and_sanitized_user() {
    let (base, _tmp) = spawn_app().await;
    let (token, user) = register(&base, "Alice", "a@x.com", "secret1").await;

    assert_eq!(token.len(), 64);
    assert_eq!(user["email"], "a@x.com");
    assert_eq!(user["role"], "user");
    // The user view never carries a password hash field
    assert!(user.get("password").is_none());
    assert!(user.get("passwordHash").is_none());
    assert!(user.get("password_hash").is_none());
}

#[tokio::test]
async fn register_rejects_missing_fields_and_bad_email() {
    let (base, _tmp) = spawn_app().await;
    let client = reqwest::Client::new();

    let response = client
        .post(format!("{}/auth/register", base))
        .json(&json!({ "email": "a@x.com", "password": "secret1" }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 400);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["success"], false);

    let response = client
        .post(format!("{}/auth/register", base))
        .json(&json!({ "name": "A", "email": "not-an-email", "password": "secret1" }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 400);
}

#[tokio::test]
async fn duplicate_email_conflicts_regardless_of_other_fields() {
    let (base, _tmp) = spawn_app().await;
    register(&base, "Alice", "a@x.com", "secret1").await;

    let response = reqwest::Client::new()
        .post(format!("{}/auth/register", base))
        .json(&json!({ "name": "Imposter", "email": "a@x.com", "password": "other" }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 409);

    // Case-insensitive uniqueness
    let response = reqwest::Client::new()
        .post(format!("{}/auth/register", base))
        .json(&json!({ "name": "Shouty", "email": "A@X.COM", "password": "other" }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 409);
}

#[tokio::test]
async fn login_scenario_wrong_then_right_password() {
    let (base, _tmp) = spawn_app().await;
    register(&base, "Alice", "a@x.com", "secret1").await;
    let client = reqwest::Client::new();

    let response = client
        .post(format!("{}/auth/login", base))
        .json(&json!({ "email": "a@x.com", "password": "wrong" }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 401);
    let body: Value = response.json().await.unwrap();
    assert!(body.get("token").is_none());

    let response = client
        .post(format!("{}/auth/login", base))
        .json(&json!({ "email": "a@x.com", "password": "secret1" }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["user"]["email"], "a@x.com");
    assert!(body["token"].as_str().unwrap().len() == 64);
}

#[tokio::test]
async fn unknown_email_and_bad_password_share_one_error_shape() {
    let (base, _tmp) = spawn_app().await;
    register(&base, "Alice", "a@x.com", "secret1").await;
    let client = reqwest::Client::new();

    let unknown: Value = client
        .post(format!("{}/auth/login", base))
        .json(&json!({ "email": "ghost@x.com", "password": "whatever" }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let mismatch: Value = client
        .post(format!("{}/auth/login", base))
        .json(&json!({ "email": "a@x.com", "password": "wrong" }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(unknown, mismatch);
}

#[tokio::test]
async fn me_roundtrip_and_rejection() {
    let (base, _tmp) = spawn_app().await;
    let (token, _user) = register(&base, "Alice", "a@x.com", "secret1").await;
    let client = reqwest::Client::new();

    let response = client
        .get(format!("{}/auth/me", base))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["user"]["email"], "a@x.com");

    let response = client
        .get(format!("{}/auth/me", base))
        .bearer_auth("bogus-token")
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 401);

    let response = client.get(format!("{}/auth/me", base)).send().await.unwrap();
    assert_eq!(response.status(), 401);
}

#[tokio::test]
async fn logout_invalidates_the_session() {
    let (base, _tmp) = spawn_app().await;
    let (token, _user) = register(&base, "Alice", "a@x.com", "secret1").await;
    let client = reqwest::Client::new();

    let response = client
        .get(format!("{}/auth/logout", base))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);

    let response = client
        .get(format!("{}/auth/me", base))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 401);
}

#[tokio::test]
async fn description_only_post_has_stable_empty_defaults() {
    let (base, _tmp) = spawn_app().await;
    let (token, _user) = register(&base, "Alice", "a@x.com", "secret1").await;

    let response = create_post(&base, &token, json!({ "description": "pothole" })).await;
    assert_eq!(response.status(), 201);
    let body: Value = response.json().await.unwrap();
    let post = &body["data"];
    assert_eq!(post["image"], "");
    assert_eq!(post["category"], "");
    assert_eq!(post["location"], "");
    assert_eq!(post["tags"], json!([]));
    assert_eq!(post["upvotedBy"], json!([]));
    assert_eq!(post["comments"], json!([]));
    assert!(post["latitude"].is_null());
    // Owner is resolved and sanitized
    assert_eq!(post["user"]["name"], "Alice");
    assert!(post["user"].get("passwordHash").is_none());
}

#[tokio::test]
async fn tags_string_is_split_and_trimmed_in_order() {
    let (base, _tmp) = spawn_app().await;
    let (token, _user) = register(&base, "Alice", "a@x.com", "secret1").await;

    let response = create_post(
        &base,
        &token,
        json!({ "description": "flooding", "tags": "safety, urgent" }),
    )
    .await;
    assert_eq!(response.status(), 201);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["data"]["tags"], json!(["safety", "urgent"]));
}

#[tokio::test]
async fn create_requires_auth_and_description() {
    let (base, _tmp) = spawn_app().await;
    let (token, _user) = register(&base, "Alice", "a@x.com", "secret1").await;

    let response = reqwest::Client::new()
        .post(format!("{}/posts", base))
        .json(&json!({ "description": "no token" }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 401);

    let response = create_post(&base, &token, json!({ "description": "   " })).await;
    assert_eq!(response.status(), 400);
}

#[tokio::test]
async fn list_is_newest_first_with_count() {
    let (base, _tmp) = spawn_app().await;
    let (token, _user) = register(&base, "Alice", "a@x.com", "secret1").await;

    for description in ["P1", "P2", "P3"] {
        let response = create_post(&base, &token, json!({ "description": description })).await;
        assert_eq!(response.status(), 201);
    }

    let body: Value = reqwest::Client::new()
        .get(format!("{}/posts", base))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["count"], 3);
    let descriptions: Vec<&str> = body["data"]
        .as_array()
        .unwrap()
        .iter()
        .map(|p| p["description"].as_str().unwrap())
        .collect();
    assert_eq!(descriptions, vec!["P3", "P2", "P1"]);
}

#[tokio::test]
async fn get_single_post_and_not_found() {
    let (base, _tmp) = spawn_app().await;
    let (token, _user) = register(&base, "Alice", "a@x.com", "secret1").await;

    let response = create_post(&base, &token, json!({ "description": "pothole" })).await;
    let created: Value = response.json().await.unwrap();
    let id = created["data"]["id"].as_str().unwrap();

    let response = reqwest::Client::new()
        .get(format!("{}/posts/{}", base, id))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);

    let response = reqwest::Client::new()
        .get(format!("{}/posts/no-such-id", base))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 404);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["error"], "Post not found");
}

#[tokio::test]
async fn upvote_toggle_round_trips() {
    let (base, _tmp) = spawn_app().await;
    let (token, user) = register(&base, "Alice", "a@x.com", "secret1").await;
    let user_id = user["id"].as_str().unwrap();

    let response = create_post(&base, &token, json!({ "description": "noise" })).await;
    let created: Value = response.json().await.unwrap();
    let id = created["data"]["id"].as_str().unwrap().to_string();
    let client = reqwest::Client::new();

    let body: Value = client
        .put(format!("{}/posts/{}/upvote", base, id))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["data"]["upvotedBy"], json!([user_id]));

    let body: Value = client
        .put(format!("{}/posts/{}/upvote", base, id))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["data"]["upvotedBy"], json!([]));
}

#[tokio::test]
async fn comments_append_and_resolve_author_names() {
    let (base, _tmp) = spawn_app().await;
    let (token, _user) = register(&base, "Alice", "a@x.com", "secret1").await;
    let (bob_token, _bob) = register(&base, "Bob", "b@x.com", "secret2").await;

    let response = create_post(&base, &token, json!({ "description": "garbage" })).await;
    let created: Value = response.json().await.unwrap();
    let id = created["data"]["id"].as_str().unwrap().to_string();
    let client = reqwest::Client::new();

    let response = client
        .post(format!("{}/posts/{}/comments", base, id))
        .bearer_auth(&bob_token)
        .json(&json!({ "content": "same on my street" }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 201);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["data"]["userName"], "Bob");

    // Empty content rejected
    let response = client
        .post(format!("{}/posts/{}/comments", base, id))
        .bearer_auth(&bob_token)
        .json(&json!({ "content": "  " }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 400);

    // Comment shows up on the post, author resolved at read time
    let body: Value = client
        .get(format!("{}/posts/{}", base, id))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["data"]["comments"][0]["userName"], "Bob");
}

#[tokio::test]
async fn image_url_is_stored_verbatim() {
    let (base, _tmp) = spawn_app().await;
    let (token, _user) = register(&base, "Alice", "a@x.com", "secret1").await;

    let response = create_post(
        &base,
        &token,
        json!({ "description": "with photo", "image": "https://cdn.example.com/p.jpg" }),
    )
    .await;
    assert_eq!(response.status(), 201);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["data"]["image"], "https://cdn.example.com/p.jpg");
}

#[tokio::test]
async fn oversized_image_is_413_and_nothing_persists() {
    let (base, _tmp) = spawn_app().await;
    let (token, _user) = register(&base, "Alice", "a@x.com", "secret1").await;

    // ~6MB pre-decode payload
    let payload = "A".repeat(6 * 1024 * 1024 / 3 * 4);
    let response = create_post(
        &base,
        &token,
        json!({ "description": "huge", "image": format!("data:image/jpeg;base64,{}", payload) }),
    )
    .await;
    assert_eq!(response.status(), 413);

    let body: Value = reqwest::Client::new()
        .get(format!("{}/posts", base))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["count"], 0);
}

#[tokio::test]
async fn failed_upload_is_502_and_nothing_persists() {
    let (base, _tmp) = spawn_app().await;
    let (token, _user) = register(&base, "Alice", "a@x.com", "secret1").await;

    // Small valid data URI; the configured image host is unreachable
    let response = create_post(
        &base,
        &token,
        json!({ "description": "doomed", "image": "data:image/png;base64,aGVsbG8=" }),
    )
    .await;
    assert_eq!(response.status(), 502);

    let body: Value = reqwest::Client::new()
        .get(format!("{}/posts", base))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["count"], 0);
}

#[tokio::test]
async fn complaint_proxy_requires_auth_and_surfaces_upstream_failure() {
    let (base, _tmp) = spawn_app().await;
    let (token, _user) = register(&base, "Alice", "a@x.com", "secret1").await;
    let complaint = json!({
        "description": "open manhole",
        "latitude": 12.97,
        "longitude": 77.59,
        "citizen_email": "a@x.com"
    });
    let client = reqwest::Client::new();

    let response = client
        .post(format!("{}/external/submit-complaint", base))
        .json(&complaint)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 401);

    let response = client
        .post(format!("{}/external/submit-complaint", base))
        .bearer_auth(&token)
        .json(&complaint)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 502);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["success"], false);
}

#[tokio::test]
async fn session_cookie_works_as_fallback_credential() {
    let (base, _tmp) = spawn_app().await;
    let (token, _user) = register(&base, "Alice", "a@x.com", "secret1").await;

    let response = reqwest::Client::new()
        .get(format!("{}/auth/me", base))
        .header("Cookie", format!("civicsense_session={}", token))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);
}
