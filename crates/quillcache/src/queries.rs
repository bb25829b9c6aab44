//! Cached blog reads and invalidating writes

use std::sync::Arc;

use quillapi::{
    BlogApi, Comment, Error, LikeEntry, NewPost, Paginated, Post, PostStatistic, PostUpdate,
    Result, UserProfile,
};
use tracing::debug;

use crate::cache::QueryCache;
use crate::key::keys;
use crate::optimistic::{LikeToggler, ToggleOutcome};

/// Longest accepted comment, in characters, after trimming
pub const MAX_COMMENT_CHARS: usize = 2000;

/// Page size used for the signed-in user's post list
pub const PROFILE_PAGE_LIMIT: u64 = 50;

/// Blog reads through a [`QueryCache`] plus the writes that keep it honest
pub struct BlogQueries<A: ?Sized> {
    cache: QueryCache,
    api: Arc<A>,
    likes: LikeToggler<A>,
}

impl<A: BlogApi + ?Sized> BlogQueries<A> {
    /// Create a façade over `api`, caching into `cache`
    pub fn new(cache: QueryCache, api: Arc<A>) -> Self {
        let likes = LikeToggler::new(cache.clone(), Arc::clone(&api));
        Self { cache, api, likes }
    }

    /// Underlying cache
    pub fn cache(&self) -> &QueryCache {
        &self.cache
    }

    /// Underlying backend
    pub fn api(&self) -> &Arc<A> {
        &self.api
    }

    /// Like toggler sharing this cache
    pub fn likes(&self) -> &LikeToggler<A> {
        &self.likes
    }

    /// Recommended feed page
    pub async fn recommended(&self, page: u64, limit: u64) -> Result<Paginated<Post>> {
        self.cache
            .fetch_query(&keys::recommended(page, limit), move || {
                self.api.recommended_posts(page, limit)
            })
            .await
    }

    /// Search results page
    pub async fn search(&self, query: &str, page: u64, limit: u64) -> Result<Paginated<Post>> {
        let query = query.trim();
        if query.is_empty() {
            return Err(Error::InvalidInput("search query is empty".into()));
        }
        self.cache
            .fetch_query(&keys::search(query, page, limit), move || {
                self.api.search_posts(query, page, limit)
            })
            .await
    }

    /// Most liked posts page
    pub async fn most_liked(&self, page: u64, limit: u64) -> Result<Paginated<Post>> {
        self.cache
            .fetch_query(&keys::most_liked(page, limit), move || {
                self.api.most_liked_posts(page, limit)
            })
            .await
    }

    /// Post detail
    pub async fn post(&self, post_id: u64) -> Result<Post> {
        self.cache
            .fetch_query(&keys::detail(post_id), move || self.api.post(post_id))
            .await
    }

    /// Like and comment counters of a post, derived from its detail
    pub async fn statistic(&self, post_id: u64) -> Result<PostStatistic> {
        self.cache
            .fetch_query(&keys::statistic(post_id), move || async move {
                self.api.post(post_id).await.map(|post| PostStatistic::from(&post))
            })
            .await
    }

    /// Comments of a post
    pub async fn comments(&self, post_id: u64) -> Result<Vec<Comment>> {
        self.cache
            .fetch_query(&keys::comments(post_id), move || self.api.post_comments(post_id))
            .await
    }

    /// Likes of a post
    pub async fn likes_of(&self, post_id: u64) -> Result<Vec<LikeEntry>> {
        self.cache
            .fetch_query(&keys::likes(post_id), move || self.api.post_likes(post_id))
            .await
    }

    /// Posts of the signed-in user; the list projection like toggles patch
    pub async fn profile_posts(&self) -> Result<Paginated<Post>> {
        self.cache
            .fetch_query(&keys::profile(), move || {
                self.api.my_posts(1, PROFILE_PAGE_LIMIT)
            })
            .await
    }

    /// Public profile of a user
    pub async fn user_profile(&self, username: &str) -> Result<UserProfile> {
        self.cache
            .fetch_query(&keys::user_profile(username), move || {
                self.api.user_profile(username)
            })
            .await
    }

    /// Toggle the signed-in user's like on a post, optimistically
    pub async fn toggle_like(&self, post_id: u64) -> Result<ToggleOutcome> {
        self.likes.toggle_like(post_id).await
    }

    /// Comment on a post, then refresh its comments and counters
    pub async fn create_comment(&self, post_id: u64, text: &str) -> Result<Comment> {
        let text = validate_comment(text)?;
        let comment = self.api.create_comment(post_id, text).await?;

        self.cache.invalidate_queries(&keys::comments(post_id));
        self.cache.invalidate_queries(&keys::statistic(post_id));
        self.cache.invalidate_queries(&keys::detail(post_id));
        debug!(post = post_id, comment = comment.id, "comment created");
        Ok(comment)
    }

    /// Publish a post
    pub async fn create_post(&self, post: &NewPost) -> Result<Post> {
        if post.title.trim().is_empty() {
            return Err(Error::InvalidInput("post title is empty".into()));
        }
        let created = self.api.create_post(post).await?;
        self.cache.invalidate_queries(&keys::posts());
        Ok(created)
    }

    /// Edit a post
    pub async fn update_post(&self, post_id: u64, update: &PostUpdate) -> Result<Post> {
        let updated = self.api.update_post(post_id, update).await?;
        self.cache.invalidate_queries(&keys::posts());
        Ok(updated)
    }

    /// Delete a post and forget its per-post projections
    pub async fn delete_post(&self, post_id: u64) -> Result<()> {
        self.api.delete_post(post_id).await?;

        for key in [
            keys::detail(post_id),
            keys::statistic(post_id),
            keys::comments(post_id),
            keys::likes(post_id),
        ] {
            self.cache.remove_queries(&key);
        }
        self.cache.invalidate_queries(&keys::posts());
        Ok(())
    }
}

/// Trim a comment and check its length
pub fn validate_comment(text: &str) -> Result<&str> {
    let text = text.trim();
    if text.is_empty() {
        return Err(Error::InvalidInput("comment is empty".into()));
    }
    if text.chars().count() > MAX_COMMENT_CHARS {
        return Err(Error::InvalidInput(format!(
            "comment exceeds {} characters",
            MAX_COMMENT_CHARS
        )));
    }
    Ok(text)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{post, FakeBlog};

    fn queries() -> (BlogQueries<FakeBlog>, Arc<FakeBlog>) {
        let mut five = post(5, 10, false);
        five.comments = 2;
        let api = Arc::new(FakeBlog::with_posts([post(4, 3, true), five]));
        (BlogQueries::new(QueryCache::with_capacity(64), Arc::clone(&api)), api)
    }

    #[tokio::test]
    async fn test_reads_are_cached() {
        let (queries, api) = queries();

        let first = queries.recommended(1, 10).await.unwrap();
        let second = queries.recommended(1, 10).await.unwrap();

        assert_eq!(first, second);
        assert_eq!(api.reads(), 1);
        assert_eq!(queries.cache().stats().hits(), 1);

        queries.recommended(2, 10).await.unwrap();
        assert_eq!(api.reads(), 2);
    }

    #[tokio::test]
    async fn test_statistic_derived_from_detail() {
        let (queries, _api) = queries();

        let stat = queries.statistic(5).await.unwrap();

        assert_eq!(stat, PostStatistic { likes: 10, comments: 2, liked_by_me: false });
        assert!(queries.cache().get_raw(&keys::statistic(5)).is_some());
    }

    #[tokio::test]
    async fn test_like_then_refetch_shows_server_truth() {
        let (queries, api) = queries();
        queries.profile_posts().await.unwrap();
        queries.statistic(5).await.unwrap();

        queries.toggle_like(5).await.unwrap();
        // Server flips on its own; the refetch must pick that up
        api.posts.lock().get_mut(&5).unwrap().likes = 40;

        let stat = queries.statistic(5).await.unwrap();
        let page = queries.profile_posts().await.unwrap();

        assert_eq!(stat, PostStatistic { likes: 40, comments: 2, liked_by_me: true });
        assert_eq!(page.find(5).map(|p| (p.likes, p.liked_by_me)), Some((40, true)));
    }

    #[tokio::test]
    async fn test_comment_invalidates_counters() {
        let (queries, _api) = queries();
        assert!(queries.comments(5).await.unwrap().is_empty());
        queries.statistic(5).await.unwrap();

        let comment = queries.create_comment(5, "  nice post \n").await.unwrap();

        assert_eq!(comment.content, "nice post");
        assert!(queries.cache().is_invalidated(&keys::comments(5)));
        assert_eq!(queries.comments(5).await.unwrap().len(), 1);
        assert_eq!(queries.statistic(5).await.unwrap().comments, 3);
    }

    #[tokio::test]
    async fn test_comment_validation() {
        let (queries, api) = queries();

        let empty = queries.create_comment(5, "   ").await;
        assert!(matches!(empty, Err(Error::InvalidInput(_))));

        let long = "x".repeat(MAX_COMMENT_CHARS + 1);
        assert!(matches!(queries.create_comment(5, &long).await, Err(Error::InvalidInput(_))));

        let exact = "é".repeat(MAX_COMMENT_CHARS);
        assert!(validate_comment(&exact).is_ok());
        assert!(api.comments.lock().is_empty());
    }

    #[tokio::test]
    async fn test_post_writes_invalidate_lists() {
        let (queries, _api) = queries();
        queries.recommended(1, 10).await.unwrap();
        queries.post(4).await.unwrap();

        let created = queries
            .create_post(&NewPost { title: "Fresh".into(), content: "<p>hi</p>".into(), ..NewPost::default() })
            .await
            .unwrap();

        assert!(queries.cache().is_invalidated(&keys::recommended(1, 10)));
        let page = queries.recommended(1, 10).await.unwrap();
        assert!(page.find(created.id).is_some());

        let update = PostUpdate { title: Some("Renamed".into()), ..PostUpdate::default() };
        queries.update_post(4, &update).await.unwrap();
        assert_eq!(queries.post(4).await.unwrap().title, "Renamed");
    }

    #[tokio::test]
    async fn test_delete_forgets_post() {
        let (queries, _api) = queries();
        queries.post(5).await.unwrap();
        queries.statistic(5).await.unwrap();
        queries.recommended(1, 10).await.unwrap();

        queries.delete_post(5).await.unwrap();

        assert!(queries.cache().get_raw(&keys::detail(5)).is_none());
        assert!(queries.cache().get_raw(&keys::statistic(5)).is_none());
        assert!(queries.cache().is_invalidated(&keys::recommended(1, 10)));
        assert!(matches!(queries.post(5).await, Err(Error::Server { status: 404, .. })));
    }

    #[tokio::test]
    async fn test_empty_search_rejected() {
        let (queries, api) = queries();

        assert!(matches!(queries.search("  ", 1, 10).await, Err(Error::InvalidInput(_))));
        assert_eq!(api.reads(), 0);

        let found = queries.search("Post 4", 1, 10).await.unwrap();
        assert_eq!(found.data.len(), 1);
    }
}
