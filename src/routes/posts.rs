use axum::extract::{FromRequest, Multipart, Path, Request, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post, put};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::json;

use crate::error::{AppError, AppResult};
use crate::extractors::CurrentUser;
use crate::posts::{self, NewPost, TagsInput};
use crate::state::AppState;
use crate::upload::ImageInput;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/posts", get(list).post(create))
        .route("/posts/{id}", get(get_one))
        .route("/posts/{id}/upvote", put(upvote))
        .route("/posts/{id}/comments", post(comment))
}

#[derive(Deserialize)]
pub struct CreatePostRequest {
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub location: String,
    #[serde(default)]
    pub tags: TagsInput,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    #[serde(default)]
    pub image: String,
}

#[derive(Deserialize)]
pub struct CommentRequest {
    #[serde(default)]
    pub content: String,
}

/// POST /posts — accepts JSON or multipart/form-data (file upload).
/// The image is resolved to a permanent URL before anything is persisted,
/// so an upload failure leaves no dangling post behind.
pub async fn create(
    State(state): State<AppState>,
    user: CurrentUser,
    req: Request,
) -> AppResult<Response> {
    let content_type = req
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("")
        .to_string();

    let (mut draft, image) = if content_type.starts_with("multipart/form-data") {
        let multipart = Multipart::from_request(req, &state)
            .await
            .map_err(|_| AppError::BadRequest("Invalid multipart body".into()))?;
        read_multipart(multipart).await?
    } else {
        let Json(body) = Json::<CreatePostRequest>::from_request(req, &state)
            .await
            .map_err(|_| AppError::BadRequest("Invalid request body".into()))?;
        let image = ImageInput::from_field(&body.image);
        (
            NewPost {
                description: body.description,
                category: body.category,
                location: body.location,
                tags: body.tags.normalize(),
                latitude: body.latitude,
                longitude: body.longitude,
                image: String::new(),
            },
            image,
        )
    };

    if draft.description.trim().is_empty() {
        return Err(AppError::BadRequest("Description is required".into()));
    }

    draft.image = state.image_host.resolve(image).await?;

    let post = posts::insert_post(&state.db, &user.id, draft)?;
    tracing::info!(post_id = %post.id, user_id = %user.id, "created post");

    Ok((
        StatusCode::CREATED,
        Json(json!({ "success": true, "data": post })),
    )
        .into_response())
}

/// GET /posts — public, newest first.
pub async fn list(State(state): State<AppState>) -> AppResult<Response> {
    let posts = posts::list_posts(&state.db)?;
    Ok(Json(json!({ "success": true, "count": posts.len(), "data": posts })).into_response())
}

/// GET /posts/{id} — public.
pub async fn get_one(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> AppResult<Response> {
    let post = posts::get_post(&state.db, &id)?;
    Ok(Json(json!({ "success": true, "data": post })).into_response())
}

/// PUT /posts/{id}/upvote — toggles the caller's membership in the
/// upvote set and returns the new set.
pub async fn upvote(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(id): Path<String>,
) -> AppResult<Response> {
    let upvoted_by = posts::toggle_upvote(&state.db, &id, &user.id)?;
    Ok(Json(json!({ "success": true, "data": { "upvotedBy": upvoted_by } })).into_response())
}

/// POST /posts/{id}/comments — append-only.
pub async fn comment(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(id): Path<String>,
    Json(req): Json<CommentRequest>,
) -> AppResult<Response> {
    let comment = posts::add_comment(&state.db, &id, &user.id, &req.content)?;
    Ok((
        StatusCode::CREATED,
        Json(json!({ "success": true, "data": comment })),
    )
        .into_response())
}

async fn read_multipart(mut multipart: Multipart) -> AppResult<(NewPost, ImageInput)> {
    let mut draft = NewPost::default();
    let mut image = ImageInput::None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|_| AppError::BadRequest("Invalid multipart body".into()))?
    {
        let name = field.name().unwrap_or("").to_string();
        match name.as_str() {
            "description" => draft.description = field_text(field).await?,
            "category" => draft.category = field_text(field).await?,
            "location" => draft.location = field_text(field).await?,
            "tags" => {
                draft.tags = TagsInput::Text(field_text(field).await?).normalize();
            }
            "latitude" => draft.latitude = Some(field_f64(field, "latitude").await?),
            "longitude" => draft.longitude = Some(field_f64(field, "longitude").await?),
            "image" => {
                if field.file_name().is_some() {
                    let content_type = field.content_type().unwrap_or("").to_string();
                    let data = field
                        .bytes()
                        .await
                        .map_err(|_| AppError::PayloadTooLarge)?
                        .to_vec();
                    image = ImageInput::Bytes { data, content_type };
                } else {
                    image = ImageInput::from_field(&field_text(field).await?);
                }
            }
            _ => {}
        }
    }

    Ok((draft, image))
}

async fn field_text(field: axum::extract::multipart::Field<'_>) -> AppResult<String> {
    field
        .text()
        .await
        .map_err(|_| AppError::BadRequest("Invalid multipart field".into()))
}

async fn field_f64(field: axum::extract::multipart::Field<'_>, name: &str) -> AppResult<f64> {
    let text = field_text(field).await?;
    text.trim()
        .parse::<f64>()
        .map_err(|_| AppError::BadRequest(format!("Invalid {}", name)))
}
