//! The client stores driven over real HTTP against a live server instance,
//! so the optimistic paths reconcile with actual server answers.

use std::sync::Arc;

use tempfile::TempDir;

use civicsense::client::{Api, AuthStore, HttpApi, PostDraft, PostStore};
use civicsense::config::Config;
use civicsense::state::AppState;
use civicsense::{db, routes};

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

#[tokio::test]
async fn signup_then_bootstrap_resumes_the_session() {
    let (base, tmp) = spawn_app().await;
    let api: Arc<dyn Api> = Arc::new(HttpApi::new(&base));

    let mut auth = AuthStore::new(api.clone(), tmp.path());
    auth.signup("Alice", "a@x.com", "secret1").await.unwrap();
    assert!(auth.is_authenticated());

    // A fresh store over the same data dir picks the session back up
    let mut resumed = AuthStore::new(api, tmp.path());
    resumed.bootstrap().await;
    assert!(resumed.is_authenticated());
    assert_eq!(resumed.user().unwrap().email, "a@x.com");
}

#[tokio::test]
async fn logout_then_bootstrap_is_anonymous() {
    let (base, tmp) = spawn_app().await;
    let api: Arc<dyn Api> = Arc::new(HttpApi::new(&base));

    let mut auth = AuthStore::new(api.clone(), tmp.path());
    auth.signup("Alice", "a@x.com", "secret1").await.unwrap();
    auth.logout().await;

    let mut resumed = AuthStore::new(api, tmp.path());
    resumed.bootstrap().await;
    assert!(!resumed.is_authenticated());
}

#[tokio::test]
async fn create_and_list_through_the_store() {
    let (base, tmp) = spawn_app().await;
    let api: Arc<dyn Api> = Arc::new(HttpApi::new(&base));

    let mut auth = AuthStore::new(api.clone(), tmp.path());
    auth.signup("Alice", "a@x.com", "secret1").await.unwrap();
    let token = auth.token().unwrap().to_string();

    let mut posts = PostStore::new(api.clone());
    posts.refresh().await.unwrap();
    assert!(posts.posts().is_empty());

    let draft = PostDraft {
        description: "Pothole on Main St".into(),
        tags: vec!["roads".into(), "urgent".into()],
        latitude: Some(12.97),
        longitude: Some(77.59),
        ..PostDraft::default()
    };
    let created = posts.add_post(&token, &draft).await.unwrap();
    assert_eq!(created.tags, vec!["roads", "urgent"]);
    assert_eq!(created.user.name, "Alice");

    // A second client sees the same canonical post after a refresh
    let mut other = PostStore::new(api);
    other.refresh().await.unwrap();
    assert_eq!(other.posts().len(), 1);
    assert_eq!(other.get(&created.id).unwrap().description, "Pothole on Main St");
}

#[tokio::test]
async fn upvote_reconciles_with_the_server_set() {
    let (base, tmp) = spawn_app().await;
    let api: Arc<dyn Api> = Arc::new(HttpApi::new(&base));

    let mut auth = AuthStore::new(api.clone(), tmp.path());
    let user = auth.signup("Alice", "a@x.com", "secret1").await.unwrap();
    let token = auth.token().unwrap().to_string();

    let mut posts = PostStore::new(api.clone());
    let created = posts
        .add_post(&token, &PostDraft { description: "noise".into(), ..PostDraft::default() })
        .await
        .unwrap();

    posts.toggle_upvote(&token, &created.id, &user.id).await.unwrap();
    assert_eq!(posts.get(&created.id).unwrap().upvoted_by, vec![user.id.clone()]);

    posts.toggle_upvote(&token, &created.id, &user.id).await.unwrap();
    assert!(posts.get(&created.id).unwrap().upvoted_by.is_empty());
}

#[tokio::test]
async fn rejected_comment_rolls_back_against_a_real_server() {
    let (base, tmp) = spawn_app().await;
    let api: Arc<dyn Api> = Arc::new(HttpApi::new(&base));

    let mut auth = AuthStore::new(api.clone(), tmp.path());
    let user = auth.signup("Alice", "a@x.com", "secret1").await.unwrap();
    let token = auth.token().unwrap().to_string();

    let mut posts = PostStore::new(api);
    let created = posts
        .add_post(&token, &PostDraft { description: "garbage".into(), ..PostDraft::default() })
        .await
        .unwrap();

    // Blank content is rejected server-side; the optimistic copy must go
    let result = posts.add_comment(&token, &created.id, &user, "   ").await;
    assert!(result.is_err());
    assert!(posts.get(&created.id).unwrap().comments.is_empty());

    let canonical = posts
        .add_comment(&token, &created.id, &user, "same here")
        .await
        .unwrap();
    let comments = &posts.get(&created.id).unwrap().comments;
    assert_eq!(comments.len(), 1);
    assert_eq!(comments[0].id, canonical.id);
    assert_eq!(comments[0].user_name, "Alice");
}
