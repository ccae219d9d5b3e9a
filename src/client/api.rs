use std::time::Duration;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{json, Value};

use crate::db::models::{CommentView, PostView, PublicUser};

/// Errors crossing the store boundary. Stores never panic; every mutation
/// resolves to a value or one of these.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// The server answered with `{success: false, error}`.
    #[error("{0}")]
    Api(String),

    /// The server could not be reached or answered garbage.
    #[error("Network error: {0}")]
    Network(String),
}

/// Outgoing post draft. Tags are already normalized; `image` may be a URL
/// or a base64 data URI (the server sorts that out).
#[derive(Debug, Clone, Default, Serialize)]
pub struct PostDraft {
    pub description: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub category: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub location: String,
    pub tags: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latitude: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub longitude: Option<f64>,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub image: String,
}

#[derive(Debug, Clone)]
pub struct AuthSession {
    pub token: String,
    pub user: PublicUser,
}

/// The seam between the stores and the wire. Tests substitute a scripted
/// double; production uses [`HttpApi`].
#[async_trait]
pub trait Api: Send + Sync {
    async fn register(
        &self,
        name: &str,
        email: &str,
        password: &str,
    ) -> Result<AuthSession, ClientError>;
    async fn login(&self, email: &str, password: &str) -> Result<AuthSession, ClientError>;
    async fn logout(&self, token: &str) -> Result<(), ClientError>;
    async fn me(&self, token: &str) -> Result<PublicUser, ClientError>;
    async fn list_posts(&self) -> Result<Vec<PostView>, ClientError>;
    async fn create_post(&self, token: &str, draft: &PostDraft)
        -> Result<PostView, ClientError>;
    async fn toggle_upvote(&self, token: &str, post_id: &str)
        -> Result<Vec<String>, ClientError>;
    async fn add_comment(
        &self,
        token: &str,
        post_id: &str,
        content: &str,
    ) -> Result<CommentView, ClientError>;
}

/// HTTP implementation against the CivicSense REST surface. Idempotent
/// reads get one bounded retry; mutations are sent exactly once so a slow
/// `create` can never fork into duplicates.
pub struct HttpApi {
    client: reqwest::Client,
    base_url: String,
}

impl HttpApi {
    pub fn new(base_url: impl Into<String>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .expect("failed to build HTTP client");
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn get_retrying(
        &self,
        path: &str,
        token: Option<&str>,
    ) -> Result<reqwest::Response, ClientError> {
        let mut last_err = String::new();
        for _attempt in 0..2 {
            let mut request = self.client.get(self.url(path));
            if let Some(token) = token {
                request = request.bearer_auth(token);
            }
            match request.send().await {
                Ok(response) => return Ok(response),
                Err(e) => last_err = e.to_string(),
            }
        }
        Err(ClientError::Network(last_err))
    }

    async fn send_json(
        &self,
        method: reqwest::Method,
        path: &str,
        token: Option<&str>,
        body: Option<&Value>,
    ) -> Result<reqwest::Response, ClientError> {
        let mut request = self.client.request(method, self.url(path));
        if let Some(token) = token {
            request = request.bearer_auth(token);
        }
        if let Some(body) = body {
            request = request.json(body);
        }
        request
            .send()
            .await
            .map_err(|e| ClientError::Network(e.to_string()))
    }
}

/// Unwrap the `{success, error?, ...}` envelope and pull `field` out of it.
async fn unwrap_envelope<T: DeserializeOwned>(
    response: reqwest::Response,
    field: &str,
) -> Result<T, ClientError> {
    let status = response.status();
    let body: Value = response
        .json()
        .await
        .map_err(|e| ClientError::Network(format!("invalid response body: {}", e)))?;

    let success = body.get("success").and_then(Value::as_bool).unwrap_or(false);
    if !status.is_success() || !success {
        let message = body
            .get("error")
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| format!("request failed with status {}", status));
        return Err(ClientError::Api(message));
    }

    let value = body
        .get(field)
        .cloned()
        .ok_or_else(|| ClientError::Network(format!("response missing '{}'", field)))?;
    serde_json::from_value(value)
        .map_err(|e| ClientError::Network(format!("malformed '{}': {}", field, e)))
}

#[async_trait]
impl Api for HttpApi {
    async fn register(
        &self,
        name: &str,
        email: &str,
        password: &str,
    ) -> Result<AuthSession, ClientError> {
        let body = json!({ "name": name, "email": email, "password": password });
        let response = self
            .send_json(reqwest::Method::POST, "/auth/register", None, Some(&body))
            .await?;
        parse_auth_session(response).await
    }

    async fn login(&self, email: &str, password: &str) -> Result<AuthSession, ClientError> {
        let body = json!({ "email": email, "password": password });
        let response = self
            .send_json(reqwest::Method::POST, "/auth/login", None, Some(&body))
            .await?;
        parse_auth_session(response).await
    }

    async fn logout(&self, token: &str) -> Result<(), ClientError> {
        let response = self.get_retrying("/auth/logout", Some(token)).await?;
        unwrap_envelope::<Value>(response, "data").await.map(|_| ())
    }

    async fn me(&self, token: &str) -> Result<PublicUser, ClientError> {
        let response = self.get_retrying("/auth/me", Some(token)).await?;
        unwrap_envelope(response, "user").await
    }

    async fn list_posts(&self) -> Result<Vec<PostView>, ClientError> {
        let response = self.get_retrying("/posts", None).await?;
        unwrap_envelope(response, "data").await
    }

    async fn create_post(
        &self,
        token: &str,
        draft: &PostDraft,
    ) -> Result<PostView, ClientError> {
        let body = serde_json::to_value(draft)
            .map_err(|e| ClientError::Network(e.to_string()))?;
        let response = self
            .send_json(reqwest::Method::POST, "/posts", Some(token), Some(&body))
            .await?;
        unwrap_envelope(response, "data").await
    }

    async fn toggle_upvote(
        &self,
        token: &str,
        post_id: &str,
    ) -> Result<Vec<String>, ClientError> {
        let path = format!("/posts/{}/upvote", post_id);
        let response = self
            .send_json(reqwest::Method::PUT, &path, Some(token), None)
            .await?;
        #[derive(serde::Deserialize)]
        #[serde(rename_all = "camelCase")]
        struct UpvoteData {
            upvoted_by: Vec<String>,
        }
        let data: UpvoteData = unwrap_envelope(response, "data").await?;
        Ok(data.upvoted_by)
    }

    async fn add_comment(
        &self,
        token: &str,
        post_id: &str,
        content: &str,
    ) -> Result<CommentView, ClientError> {
        let path = format!("/posts/{}/comments", post_id);
        let body = json!({ "content": content });
        let response = self
            .send_json(reqwest::Method::POST, &path, Some(token), Some(&body))
            .await?;
        unwrap_envelope(response, "data").await
    }
}

async fn parse_auth_session(response: reqwest::Response) -> Result<AuthSession, ClientError> {
    let status = response.status();
    let body: Value = response
        .json()
        .await
        .map_err(|e| ClientError::Network(format!("invalid response body: {}", e)))?;

    let success = body.get("success").and_then(Value::as_bool).unwrap_or(false);
    if !status.is_success() || !success {
        let message = body
            .get("error")
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| format!("request failed with status {}", status));
        return Err(ClientError::Api(message));
    }

    let token = body
        .get("token")
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| ClientError::Network("response missing 'token'".into()))?;
    let user: PublicUser = body
        .get("user")
        .cloned()
        .ok_or_else(|| ClientError::Network("response missing 'user'".into()))
        .and_then(|v| {
            serde_json::from_value(v)
                .map_err(|e| ClientError::Network(format!("malformed 'user': {}", e)))
        })?;

    Ok(AuthSession { token, user })
}
