use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::db::models::PublicUser;

use super::api::{Api, ClientError};

/// Client auth lifecycle: `Unknown` until bootstrap resolves, then either
/// `Authenticated` or `Anonymous`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthPhase {
    Unknown,
    Anonymous,
    Authenticated,
}

/// In-memory session derived from a token persisted on disk (the page
/// session analog of browser storage).
pub struct AuthStore {
    api: Arc<dyn Api>,
    token_path: PathBuf,
    token: Option<String>,
    user: Option<PublicUser>,
    phase: AuthPhase,
}

impl AuthStore {
    pub fn new(api: Arc<dyn Api>, data_dir: &Path) -> Self {
        Self {
            api,
            token_path: data_dir.join("session_token"),
            token: None,
            user: None,
            phase: AuthPhase::Unknown,
        }
    }

    pub fn phase(&self) -> AuthPhase {
        self.phase
    }

    pub fn is_authenticated(&self) -> bool {
        self.phase == AuthPhase::Authenticated
    }

    /// True while the initial "who am I" check has not resolved.
    pub fn is_loading(&self) -> bool {
        self.phase == AuthPhase::Unknown
    }

    pub fn user(&self) -> Option<&PublicUser> {
        self.user.as_ref()
    }

    pub fn token(&self) -> Option<&str> {
        self.token.as_deref()
    }

    /// Startup check. A persisted token is validated against the server;
    /// any failure clears it and lands in `Anonymous`. Never errors.
    pub async fn bootstrap(&mut self) {
        let token = match self.load_persisted_token() {
            Some(token) => token,
            None => {
                self.phase = AuthPhase::Anonymous;
                return;
            }
        };

        match self.api.me(&token).await {
            Ok(user) => {
                self.token = Some(token);
                self.user = Some(user);
                self.phase = AuthPhase::Authenticated;
            }
            Err(e) => {
                tracing::debug!("bootstrap rejected stored token: {}", e);
                self.clear_persisted_token();
                self.token = None;
                self.user = None;
                self.phase = AuthPhase::Anonymous;
            }
        }
    }

    pub async fn login(
        &mut self,
        email: &str,
        password: &str,
    ) -> Result<PublicUser, ClientError> {
        match self.api.login(email, password).await {
            Ok(session) => {
                self.persist_token(&session.token);
                self.token = Some(session.token);
                self.user = Some(session.user.clone());
                self.phase = AuthPhase::Authenticated;
                Ok(session.user)
            }
            Err(e) => {
                self.reset_to_anonymous();
                Err(e)
            }
        }
    }

    pub async fn signup(
        &mut self,
        name: &str,
        email: &str,
        password: &str,
    ) -> Result<PublicUser, ClientError> {
        match self.api.register(name, email, password).await {
            Ok(session) => {
                self.persist_token(&session.token);
                self.token = Some(session.token);
                self.user = Some(session.user.clone());
                self.phase = AuthPhase::Authenticated;
                Ok(session.user)
            }
            Err(e) => {
                self.reset_to_anonymous();
                Err(e)
            }
        }
    }

    /// Best-effort server notification, then unconditional local clear.
    pub async fn logout(&mut self) {
        if let Some(token) = self.token.take() {
            if let Err(e) = self.api.logout(&token).await {
                tracing::debug!("logout notification failed: {}", e);
            }
        }
        self.reset_to_anonymous();
    }

    fn reset_to_anonymous(&mut self) {
        self.clear_persisted_token();
        self.token = None;
        self.user = None;
        self.phase = AuthPhase::Anonymous;
    }

    fn load_persisted_token(&self) -> Option<String> {
        let token = std::fs::read_to_string(&self.token_path).ok()?;
        let token = token.trim().to_string();
        if token.is_empty() {
            None
        } else {
            Some(token)
        }
    }

    fn persist_token(&self, token: &str) {
        if let Some(parent) = self.token_path.parent() {
            let _ = std::fs::create_dir_all(parent);
        }
        if let Err(e) = std::fs::write(&self.token_path, token) {
            tracing::warn!("failed to persist session token: {}", e);
        }
    }

    fn clear_persisted_token(&self) {
        let _ = std::fs::remove_file(&self.token_path);
    }
}
