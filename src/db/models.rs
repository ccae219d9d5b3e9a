use serde::{Deserialize, Serialize};

/// Full user row. `password_hash` stays inside the server; clients only
/// ever see [`PublicUser`].
#[derive(Debug, Clone)]
pub struct User {
    pub id: String,
    pub name: String,
    pub email: String,
    pub password_hash: String,
    pub role: String,
    pub created_at: String,
    pub updated_at: String,
}

impl User {
    pub fn public(&self) -> PublicUser {
        PublicUser {
            id: self.id.clone(),
            name: self.name.clone(),
            email: self.email.clone(),
            role: self.role.clone(),
        }
    }
}

/// Sanitized user view. Deliberately has no field for the password hash,
/// so it cannot leak through serialization.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PublicUser {
    pub id: String,
    pub name: String,
    pub email: String,
    pub role: String,
}

#[derive(Debug, Clone)]
pub struct Session {
    pub id: String,
    pub user_id: String,
    pub token: String,
    pub expires_at: String,
    pub created_at: String,
}

/// A post as served to clients: owner resolved, upvotes as a set of user
/// ids, comments embedded. Optional geo fields serialize as null; every
/// other field always has a concrete (possibly empty) value.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PostView {
    pub id: String,
    pub user: PublicUser,
    pub description: String,
    pub category: String,
    pub location: String,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub tags: Vec<String>,
    pub image: String,
    pub upvoted_by: Vec<String>,
    pub comments: Vec<CommentView>,
    pub created_at: String,
    pub updated_at: String,
}

impl PostView {
    /// Upvote count is always derived from the set, never stored.
    pub fn upvotes(&self) -> usize {
        self.upvoted_by.len()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct CommentView {
    pub id: String,
    pub user_id: String,
    pub user_name: String,
    pub content: String,
    pub created_at: String,
}
