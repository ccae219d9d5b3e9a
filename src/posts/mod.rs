use std::collections::HashMap;

use rusqlite::params;
use serde::Deserialize;

use crate::db::models::{CommentView, PostView, PublicUser};
use crate::error::{AppError, AppResult};
use crate::state::DbPool;

/// Tags arrive either as a comma-separated string or as a list; both
/// normalize to a trimmed, empty-filtered, order-preserving Vec.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum TagsInput {
    Text(String),
    List(Vec<String>),
}

impl Default for TagsInput {
    fn default() -> Self {
        TagsInput::Text(String::new())
    }
}

impl TagsInput {
    pub fn normalize(self) -> Vec<String> {
        let raw = match self {
            TagsInput::Text(s) => s.split(',').map(str::to_string).collect::<Vec<_>>(),
            TagsInput::List(list) => list,
        };
        raw.into_iter()
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty())
            .collect()
    }
}

/// A validated draft ready for persistence. `image` is already a resolved
/// URL (or empty); upload happens before this struct exists.
#[derive(Debug, Clone, Default)]
pub struct NewPost {
    pub description: String,
    pub category: String,
    pub location: String,
    pub tags: Vec<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub image: String,
}

/// Persist a post owned by `user_id` and return it with the owner resolved.
pub fn insert_post(pool: &DbPool, user_id: &str, new: NewPost) -> AppResult<PostView> {
    let description = new.description.trim().to_string();
    if description.is_empty() {
        return Err(AppError::BadRequest("Description is required".into()));
    }

    let id = uuid::Uuid::now_v7().to_string();
    let now = chrono::Utc::now().to_rfc3339();
    let tags_json = serde_json::to_string(&new.tags)?;

    {
        let conn = pool.get()?;
        conn.execute(
            "INSERT INTO posts (id, user_id, description, category, location, latitude, longitude, tags, image, created_at, updated_at) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?10)",
            params![
                id,
                user_id,
                description,
                new.category,
                new.location,
                new.latitude,
                new.longitude,
                tags_json,
                new.image,
                now
            ],
        )?;
    }

    get_post(pool, &id)
}

/// All posts, newest first, owners resolved, upvote sets and comments
/// embedded. No pagination.
pub fn list_posts(pool: &DbPool) -> AppResult<Vec<PostView>> {
    let conn = pool.get()?;

    let mut stmt = conn.prepare(
        "SELECT p.id, p.description, p.category, p.location, p.latitude, p.longitude, \
                p.tags, p.image, p.created_at, p.updated_at, \
                u.id, u.name, u.email, u.role \
         FROM posts p JOIN users u ON u.id = p.user_id \
         ORDER BY p.created_at DESC, p.id DESC",
    )?;
    let mut posts: Vec<PostView> = stmt
        .query_map([], map_post_row)?
        .collect::<Result<Vec<_>, _>>()?;

    let mut upvotes: HashMap<String, Vec<String>> = HashMap::new();
    let mut stmt = conn.prepare(
        "SELECT post_id, user_id FROM upvotes ORDER BY created_at, rowid",
    )?;
    let rows = stmt.query_map([], |row| {
        Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
    })?;
    for row in rows {
        let (post_id, user_id) = row?;
        upvotes.entry(post_id).or_default().push(user_id);
    }

    let mut comments: HashMap<String, Vec<CommentView>> = HashMap::new();
    let mut stmt = conn.prepare(
        "SELECT c.post_id, c.id, c.user_id, u.name, c.content, c.created_at \
         FROM comments c JOIN users u ON u.id = c.user_id \
         ORDER BY c.created_at, c.id",
    )?;
    let rows = stmt.query_map([], |row| {
        Ok((
            row.get::<_, String>(0)?,
            CommentView {
                id: row.get(1)?,
                user_id: row.get(2)?,
                user_name: row.get(3)?,
                content: row.get(4)?,
                created_at: row.get(5)?,
            },
        ))
    })?;
    for row in rows {
        let (post_id, comment) = row?;
        comments.entry(post_id).or_default().push(comment);
    }

    for post in &mut posts {
        if let Some(set) = upvotes.remove(&post.id) {
            post.upvoted_by = set;
        }
        if let Some(list) = comments.remove(&post.id) {
            post.comments = list;
        }
    }

    Ok(posts)
}

/// Single post by id, owner resolved. `NotFound` if it does not exist.
pub fn get_post(pool: &DbPool, post_id: &str) -> AppResult<PostView> {
    let conn = pool.get()?;

    let mut post = conn
        .query_row(
            "SELECT p.id, p.description, p.category, p.location, p.latitude, p.longitude, \
                    p.tags, p.image, p.created_at, p.updated_at, \
                    u.id, u.name, u.email, u.role \
             FROM posts p JOIN users u ON u.id = p.user_id \
             WHERE p.id = ?1",
            params![post_id],
            map_post_row,
        )
        .map_err(|e| match e {
            rusqlite::Error::QueryReturnedNoRows => AppError::NotFound("Post not found".into()),
            other => AppError::Database(other),
        })?;

    post.upvoted_by = upvoted_by(&conn, post_id)?;

    let mut stmt = conn.prepare(
        "SELECT c.id, c.user_id, u.name, c.content, c.created_at \
         FROM comments c JOIN users u ON u.id = c.user_id \
         WHERE c.post_id = ?1 ORDER BY c.created_at, c.id",
    )?;
    post.comments = stmt
        .query_map(params![post_id], |row| {
            Ok(CommentView {
                id: row.get(0)?,
                user_id: row.get(1)?,
                user_name: row.get(2)?,
                content: row.get(3)?,
                created_at: row.get(4)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(post)
}

/// Toggle `user_id`'s membership in the post's upvote set. Returns the new
/// set. Membership is the source of truth; there is no stored counter.
pub fn toggle_upvote(pool: &DbPool, post_id: &str, user_id: &str) -> AppResult<Vec<String>> {
    let conn = pool.get()?;

    let exists: bool = conn.query_row(
        "SELECT COUNT(*) > 0 FROM posts WHERE id = ?1",
        params![post_id],
        |row| row.get(0),
    )?;
    if !exists {
        return Err(AppError::NotFound("Post not found".into()));
    }

    let removed = conn.execute(
        "DELETE FROM upvotes WHERE post_id = ?1 AND user_id = ?2",
        params![post_id, user_id],
    )?;
    if removed == 0 {
        conn.execute(
            "INSERT INTO upvotes (post_id, user_id, created_at) VALUES (?1, ?2, ?3)",
            params![post_id, user_id, chrono::Utc::now().to_rfc3339()],
        )?;
    }

    upvoted_by(&conn, post_id)
}

/// Append a comment and return it with the author's display name resolved
/// at read time.
pub fn add_comment(
    pool: &DbPool,
    post_id: &str,
    user_id: &str,
    content: &str,
) -> AppResult<CommentView> {
    let content = content.trim();
    if content.is_empty() {
        return Err(AppError::BadRequest("Comment content is required".into()));
    }

    let conn = pool.get()?;

    let exists: bool = conn.query_row(
        "SELECT COUNT(*) > 0 FROM posts WHERE id = ?1",
        params![post_id],
        |row| row.get(0),
    )?;
    if !exists {
        return Err(AppError::NotFound("Post not found".into()));
    }

    let id = uuid::Uuid::now_v7().to_string();
    let now = chrono::Utc::now().to_rfc3339();
    conn.execute(
        "INSERT INTO comments (id, post_id, user_id, content, created_at) VALUES (?1, ?2, ?3, ?4, ?5)",
        params![id, post_id, user_id, content, now],
    )?;

    let user_name: String = conn.query_row(
        "SELECT name FROM users WHERE id = ?1",
        params![user_id],
        |row| row.get(0),
    )?;

    Ok(CommentView {
        id,
        user_id: user_id.to_string(),
        user_name,
        content: content.to_string(),
        created_at: now,
    })
}

fn upvoted_by(
    conn: &rusqlite::Connection,
    post_id: &str,
) -> AppResult<Vec<String>> {
    let mut stmt = conn.prepare(
        "SELECT user_id FROM upvotes WHERE post_id = ?1 ORDER BY created_at, rowid",
    )?;
    let ids = stmt
        .query_map(params![post_id], |row| row.get(0))?
        .collect::<Result<Vec<String>, _>>()?;
    Ok(ids)
}

fn map_post_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<PostView> {
    let tags_json: String = row.get(6)?;
    Ok(PostView {
        id: row.get(0)?,
        description: row.get(1)?,
        category: row.get(2)?,
        location: row.get(3)?,
        latitude: row.get(4)?,
        longitude: row.get(5)?,
        tags: serde_json::from_str(&tags_json).unwrap_or_default(),
        image: row.get(7)?,
        created_at: row.get(8)?,
        updated_at: row.get(9)?,
        user: PublicUser {
            id: row.get(10)?,
            name: row.get(11)?,
            email: row.get(12)?,
            role: row.get(13)?,
        },
        upvoted_by: Vec::new(),
        comments: Vec::new(),
    })
}
