use axum::extract::FromRequestParts;
use axum::http::header;
use axum::http::request::Parts;
use axum::http::HeaderMap;
use rusqlite::params;

use crate::error::AppError;
use crate::state::AppState;

/// Represents the currently authenticated user.
#[derive(Debug, Clone)]
pub struct CurrentUser {
    pub id: String,
    pub name: String,
    pub role: String,
}

/// Extractor that requires authentication. The bearer header is the
/// primary credential; the session cookie is the server-rendered fallback.
/// Returns 401 if neither resolves to a live session.
impl FromRequestParts<AppState> for CurrentUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let token = request_token(&parts.headers, &state.config.auth.cookie_name)
            .ok_or(AppError::Unauthorized)?;

        let conn = state.db.get()?;
        conn.query_row(
            "SELECT u.id, u.name, u.role FROM sessions s \
             JOIN users u ON u.id = s.user_id \
             WHERE s.token = ?1 AND s.expires_at > datetime('now')",
            params![token],
            |row| {
                Ok(CurrentUser {
                    id: row.get(0)?,
                    name: row.get(1)?,
                    role: row.get(2)?,
                })
            },
        )
        .map_err(|_| AppError::Unauthorized)
    }
}

/// Pull the session token from `Authorization: Bearer <token>` or, failing
/// that, from the named cookie.
pub fn request_token(headers: &HeaderMap, cookie_name: &str) -> Option<String> {
    if let Some(auth) = headers.get(header::AUTHORIZATION) {
        if let Ok(auth_str) = auth.to_str() {
            if let Some(token) = auth_str.strip_prefix("Bearer ") {
                let token = token.trim();
                if !token.is_empty() {
                    return Some(token.to_string());
                }
            }
        }
    }

    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|s| s.split(';'))
        .map(|s| s.trim())
        .find_map(|cookie| {
            let mut split = cookie.splitn(2, '=');
            let key = split.next()?.trim();
            let val = split.next()?.trim();
            if key == cookie_name && !val.is_empty() {
                Some(val.to_string())
            } else {
                None
            }
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn bearer_header_wins_over_cookie() {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::AUTHORIZATION,
            HeaderValue::from_static("Bearer abc123"),
        );
        headers.insert(
            header::COOKIE,
            HeaderValue::from_static("civicsense_session=fromcookie"),
        );
        assert_eq!(
            request_token(&headers, "civicsense_session"),
            Some("abc123".to_string())
        );
    }

    #[test]
    fn falls_back_to_cookie() {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::COOKIE,
            HeaderValue::from_static("other=1; civicsense_session=tok; theme=dark"),
        );
        assert_eq!(
            request_token(&headers, "civicsense_session"),
            Some("tok".to_string())
        );
    }

    #[test]
    fn missing_credentials_yield_none() {
        let headers = HeaderMap::new();
        assert_eq!(request_token(&headers, "civicsense_session"), None);
    }

    #[test]
    fn empty_bearer_value_is_ignored() {
        let mut headers = HeaderMap::new();
        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Bearer "));
        assert_eq!(request_token(&headers, "civicsense_session"), None);
    }
}
