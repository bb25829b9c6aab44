//! Backend seam used by the cache layer

use async_trait::async_trait;

use crate::error::Result;
use crate::model::{Comment, LikeEntry, LikeResponse, NewPost, Paginated, Post, PostUpdate, UserProfile};

/// Blog backend operations the query cache reads through and mutates.
///
/// [`crate::ApiClient`] is the HTTP implementation. Anything else
/// implementing this trait (an in-memory fake, a recording proxy) can stand
/// in for it.
#[async_trait]
pub trait BlogApi: Send + Sync {
    /// Whether a bearer credential is currently available
    fn is_authenticated(&self) -> bool;

    /// Recommended feed page
    async fn recommended_posts(&self, page: u64, limit: u64) -> Result<Paginated<Post>>;

    /// Most liked posts page
    async fn most_liked_posts(&self, page: u64, limit: u64) -> Result<Paginated<Post>>;

    /// Full-text search page
    async fn search_posts(&self, query: &str, page: u64, limit: u64) -> Result<Paginated<Post>>;

    /// Single post
    async fn post(&self, post_id: u64) -> Result<Post>;

    /// Posts written by the signed-in user
    async fn my_posts(&self, page: u64, limit: u64) -> Result<Paginated<Post>>;

    /// Public profile with the user's posts
    async fn user_profile(&self, username: &str) -> Result<UserProfile>;

    /// Comments on a post
    async fn post_comments(&self, post_id: u64) -> Result<Vec<Comment>>;

    /// Likes on a post
    async fn post_likes(&self, post_id: u64) -> Result<Vec<LikeEntry>>;

    /// Flip the signed-in user's like on a post
    async fn toggle_like(&self, post_id: u64) -> Result<LikeResponse>;

    /// Comment on a post
    async fn create_comment(&self, post_id: u64, content: &str) -> Result<Comment>;

    /// Publish a post
    async fn create_post(&self, post: &NewPost) -> Result<Post>;

    /// Edit a post
    async fn update_post(&self, post_id: u64, update: &PostUpdate) -> Result<Post>;

    /// Delete a post
    async fn delete_post(&self, post_id: u64) -> Result<()>;
}
