use axum::extract::State;
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use rusqlite::params;
use serde::Deserialize;
use serde_json::json;

use crate::auth::{is_valid_email, session};
use crate::db::models::PublicUser;
use crate::error::{AppError, AppResult};
use crate::extractors::{request_token, CurrentUser};
use crate::state::AppState;

// Verified against when login hits an unknown email, so both failure paths
// do comparable work and return the same generic message.
const DUMMY_HASH: &str = "$2b$12$uBuKCLElmUJ2WWJzRRfOyeCqyUBwL.1r1rOEE2pOBzAk2aPbDjCGa";

// -- Request types --

#[derive(Deserialize)]
pub struct RegisterRequest {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
    pub role: Option<String>,
}

#[derive(Deserialize)]
pub struct LoginRequest {
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
}

// -- Cookie helpers --

fn session_cookie(name: &str, token: &str, max_age_hours: u64) -> String {
    let max_age_secs = max_age_hours * 3600;
    format!(
        "{}={}; HttpOnly; SameSite=Lax; Path=/; Max-Age={}",
        name, token, max_age_secs
    )
}

fn clear_session_cookie(name: &str) -> String {
    format!("{}=; HttpOnly; SameSite=Lax; Path=/; Max-Age=0", name)
}

/// `200 {success, token, user}` plus the httpOnly mirror cookie.
fn token_response(state: &AppState, token: String, user: PublicUser) -> Response {
    let cookie = session_cookie(
        &state.config.auth.cookie_name,
        &token,
        state.config.auth.session_hours,
    );
    (
        StatusCode::OK,
        [(header::SET_COOKIE, cookie)],
        Json(json!({ "success": true, "token": token, "user": user })),
    )
        .into_response()
}

// -- Handlers --

/// POST /auth/register
pub async fn register(
    State(state): State<AppState>,
    Json(req): Json<RegisterRequest>,
) -> AppResult<Response> {
    let name = req.name.trim().to_string();
    let email = req.email.trim().to_string();

    if name.is_empty() || email.is_empty() || req.password.is_empty() {
        return Err(AppError::BadRequest(
            "Please provide name, email, and password".into(),
        ));
    }
    if !is_valid_email(&email) {
        return Err(AppError::BadRequest("Please provide a valid email".into()));
    }

    let role = match req.role.as_deref() {
        None | Some("") | Some("user") => "user",
        Some("admin") => "admin",
        Some(_) => return Err(AppError::BadRequest("Invalid role".into())),
    };

    let password_hash = bcrypt::hash(&req.password, bcrypt::DEFAULT_COST)?;
    let user_id = uuid::Uuid::now_v7().to_string();
    let now = chrono::Utc::now().to_rfc3339();

    {
        let conn = state.db.get()?;

        let exists: bool = conn.query_row(
            "SELECT COUNT(*) > 0 FROM users WHERE email = ?1",
            params![email],
            |row| row.get(0),
        )?;
        if exists {
            return Err(AppError::Conflict("User already exists".into()));
        }

        // UNIQUE index is the backstop for a concurrent duplicate insert
        conn.execute(
            "INSERT INTO users (id, name, email, password_hash, role, created_at, updated_at) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?6)",
            params![user_id, name, email, password_hash, role, now],
        )
        .map_err(|e| match e {
            rusqlite::Error::SqliteFailure(err, _)
                if err.code == rusqlite::ErrorCode::ConstraintViolation =>
            {
                AppError::Conflict("User already exists".into())
            }
            other => AppError::Database(other),
        })?;
    }

    tracing::info!(user_id = %user_id, "registered new user");

    let token = session::create_session(&state.db, &user_id, state.config.auth.session_hours)?;
    let user = PublicUser {
        id: user_id,
        name,
        email,
        role: role.to_string(),
    };

    Ok(token_response(&state, token, user))
}

/// POST /auth/login
pub async fn login(
    State(state): State<AppState>,
    Json(req): Json<LoginRequest>,
) -> AppResult<Response> {
    let email = req.email.trim();
    if email.is_empty() || req.password.is_empty() {
        return Err(AppError::BadRequest(
            "Please provide an email and password".into(),
        ));
    }

    let found = {
        let conn = state.db.get()?;
        conn.query_row(
            "SELECT id, name, email, role, password_hash FROM users WHERE email = ?1",
            params![email],
            |row| {
                Ok((
                    PublicUser {
                        id: row.get(0)?,
                        name: row.get(1)?,
                        email: row.get(2)?,
                        role: row.get(3)?,
                    },
                    row.get::<_, String>(4)?,
                ))
            },
        )
        .ok()
    };

    let (user, password_hash) = match found {
        Some(pair) => pair,
        None => {
            // Same generic answer as a password mismatch; do not reveal
            // which field was wrong.
            let _ = bcrypt::verify(&req.password, DUMMY_HASH);
            return Err(AppError::Unauthorized);
        }
    };

    if !bcrypt::verify(&req.password, &password_hash).unwrap_or(false) {
        return Err(AppError::Unauthorized);
    }

    let token = session::create_session(&state.db, &user.id, state.config.auth.session_hours)?;
    Ok(token_response(&state, token, user))
}

/// GET /auth/logout
///
/// Stateless from the client's perspective: whatever happens server-side,
/// the response tells the client to discard its token. The session row is
/// removed best-effort when a token was presented.
pub async fn logout(State(state): State<AppState>, headers: HeaderMap) -> AppResult<Response> {
    if let Some(token) = request_token(&headers, &state.config.auth.cookie_name) {
        let _ = session::delete_session(&state.db, &token);
    }

    Ok((
        StatusCode::OK,
        [(
            header::SET_COOKIE,
            clear_session_cookie(&state.config.auth.cookie_name),
        )],
        Json(json!({ "success": true, "data": {} })),
    )
        .into_response())
}

/// GET /auth/me
pub async fn me(State(state): State<AppState>, user: CurrentUser) -> AppResult<Response> {
    let conn = state.db.get()?;
    let user: PublicUser = conn
        .query_row(
            "SELECT id, name, email, role FROM users WHERE id = ?1",
            params![user.id],
            |row| {
                Ok(PublicUser {
                    id: row.get(0)?,
                    name: row.get(1)?,
                    email: row.get(2)?,
                    role: row.get(3)?,
                })
            },
        )
        .map_err(|_| AppError::Unauthorized)?;

    Ok(Json(json!({ "success": true, "user": user })).into_response())
}
