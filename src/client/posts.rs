use std::sync::Arc;

use crate::db::models::{CommentView, PostView, PublicUser};

use super::api::{Api, ClientError, PostDraft};

/// In-memory post collection for a page session. Filled once from the feed
/// endpoint; mutations apply optimistically and roll back when the server
/// confirms a rejection. Every read recomputes the display order:
/// highest-voted first, independent of creation order.
pub struct PostStore {
    api: Arc<dyn Api>,
    posts: Vec<PostView>,
}

impl PostStore {
    pub fn new(api: Arc<dyn Api>) -> Self {
        Self {
            api,
            posts: Vec::new(),
        }
    }

    /// Initial (and only) full fetch.
    pub async fn refresh(&mut self) -> Result<(), ClientError> {
        self.posts = self.api.list_posts().await?;
        Ok(())
    }

    /// Full collection in display order.
    pub fn posts(&self) -> Vec<PostView> {
        let mut posts = self.posts.clone();
        sort_by_score(&mut posts);
        posts
    }

    /// Case-insensitive substring match on description or any tag. An
    /// empty or whitespace query returns the full collection.
    pub fn filtered(&self, query: &str) -> Vec<PostView> {
        let query = query.trim().to_lowercase();
        if query.is_empty() {
            return self.posts();
        }
        let mut posts: Vec<PostView> = self
            .posts
            .iter()
            .filter(|post| {
                post.description.to_lowercase().contains(&query)
                    || post.tags.iter().any(|tag| tag.to_lowercase().contains(&query))
            })
            .cloned()
            .collect();
        sort_by_score(&mut posts);
        posts
    }

    /// Posts owned by one user, display order.
    pub fn user_posts(&self, user_id: &str) -> Vec<PostView> {
        let mut posts: Vec<PostView> = self
            .posts
            .iter()
            .filter(|post| post.user.id == user_id)
            .cloned()
            .collect();
        sort_by_score(&mut posts);
        posts
    }

    pub fn get(&self, post_id: &str) -> Option<&PostView> {
        self.posts.iter().find(|p| p.id == post_id)
    }

    /// Create through the server; only the canonical returned post (with
    /// its server-assigned id) ever enters the collection.
    pub async fn add_post(
        &mut self,
        token: &str,
        draft: &PostDraft,
    ) -> Result<PostView, ClientError> {
        let post = self.api.create_post(token, draft).await?;
        self.posts.insert(0, post.clone());
        Ok(post)
    }

    /// Optimistic set-toggle, reconciled against the server's answer. On
    /// failure the local set is restored to its pre-toggle state.
    pub async fn toggle_upvote(
        &mut self,
        token: &str,
        post_id: &str,
        user_id: &str,
    ) -> Result<(), ClientError> {
        let index = self
            .posts
            .iter()
            .position(|p| p.id == post_id)
            .ok_or_else(|| ClientError::Api("Post not found".into()))?;

        let before = self.posts[index].upvoted_by.clone();
        toggle_membership(&mut self.posts[index].upvoted_by, user_id);

        match self.api.toggle_upvote(token, post_id).await {
            Ok(server_set) => {
                self.posts[index].upvoted_by = server_set;
                Ok(())
            }
            Err(e) => {
                self.posts[index].upvoted_by = before;
                Err(e)
            }
        }
    }

    /// Optimistic append with a client-generated temporary id; the
    /// canonical comment replaces it on acknowledgement, or it is removed
    /// on failure.
    pub async fn add_comment(
        &mut self,
        token: &str,
        post_id: &str,
        author: &PublicUser,
        content: &str,
    ) -> Result<CommentView, ClientError> {
        let index = self
            .posts
            .iter()
            .position(|p| p.id == post_id)
            .ok_or_else(|| ClientError::Api("Post not found".into()))?;

        let temp_id = format!("local-{}", uuid::Uuid::now_v7());
        let temp = CommentView {
            id: temp_id.clone(),
            user_id: author.id.clone(),
            user_name: author.name.clone(),
            content: content.to_string(),
            created_at: chrono::Utc::now().to_rfc3339(),
        };
        self.posts[index].comments.push(temp);

        match self.api.add_comment(token, post_id, content).await {
            Ok(canonical) => {
                let comments = &mut self.posts[index].comments;
                if let Some(pos) = comments.iter().position(|c| c.id == temp_id) {
                    comments[pos] = canonical.clone();
                }
                Ok(canonical)
            }
            Err(e) => {
                self.posts[index].comments.retain(|c| c.id != temp_id);
                Err(e)
            }
        }
    }
}

/// Stable sort, so equal scores keep their collection order.
fn sort_by_score(posts: &mut [PostView]) {
    posts.sort_by(|a, b| b.upvoted_by.len().cmp(&a.upvoted_by.len()));
}

fn toggle_membership(set: &mut Vec<String>, user_id: &str) {
    if let Some(pos) = set.iter().position(|u| u == user_id) {
        set.remove(pos);
    } else {
        set.push(user_id.to_string());
    }
}
