//! In-memory blog backend for cache tests

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use quillapi::{
    Author, BlogApi, Comment, Error, LikeEntry, LikeResponse, NewPost, Paginated, Post, PostUpdate,
    Result, UserProfile,
};
use tokio::sync::Notify;

pub fn post(id: u64, likes: u64, liked_by_me: bool) -> Post {
    Post {
        id,
        title: format!("Post {}", id),
        content: format!("<p>body {}</p>", id),
        tags: vec!["rust".into()],
        image_url: None,
        created_at: "2024-01-01T00:00:00Z".into(),
        likes,
        comments: 0,
        liked_by_me,
        author: Author { id: 1, name: "Ana".into(), ..Author::default() },
        extra: Default::default(),
    }
}

fn page(data: Vec<Post>) -> Paginated<Post> {
    Paginated {
        total: data.len() as u64,
        data,
        page: 1,
        last_page: 1,
        extra: Default::default(),
    }
}

/// Server truth plus knobs for failure injection
#[derive(Default)]
pub struct FakeBlog {
    pub posts: Mutex<BTreeMap<u64, Post>>,
    pub comments: Mutex<BTreeMap<u64, Vec<Comment>>>,
    pub signed_out: AtomicBool,
    pub fail_likes: AtomicBool,
    /// Like requests succeed server-side but the reply cannot be decoded
    pub malformed_likes: AtomicBool,
    /// When set, like requests wait for one notification before answering
    pub like_gate: Option<Arc<Notify>>,
    pub like_calls: AtomicUsize,
    pub reads: AtomicUsize,
}

impl FakeBlog {
    pub fn with_posts(posts: impl IntoIterator<Item = Post>) -> Self {
        let blog = Self::default();
        blog.posts.lock().extend(posts.into_iter().map(|p| (p.id, p)));
        blog
    }

    pub fn gated(mut self, gate: Arc<Notify>) -> Self {
        self.like_gate = Some(gate);
        self
    }

    pub fn server_post(&self, id: u64) -> Option<Post> {
        self.posts.lock().get(&id).cloned()
    }

    pub fn like_calls(&self) -> usize {
        self.like_calls.load(Ordering::SeqCst)
    }

    pub fn reads(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }

    fn all(&self) -> Vec<Post> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        self.posts.lock().values().cloned().collect()
    }
}

#[async_trait]
impl BlogApi for FakeBlog {
    fn is_authenticated(&self) -> bool {
        !self.signed_out.load(Ordering::SeqCst)
    }

    async fn recommended_posts(&self, _page: u64, _limit: u64) -> Result<Paginated<Post>> {
        Ok(page(self.all()))
    }

    async fn most_liked_posts(&self, _page: u64, _limit: u64) -> Result<Paginated<Post>> {
        let mut posts = self.all();
        posts.sort_by(|a, b| b.likes.cmp(&a.likes));
        Ok(page(posts))
    }

    async fn search_posts(&self, query: &str, _page: u64, _limit: u64) -> Result<Paginated<Post>> {
        let posts = self.all().into_iter().filter(|p| p.title.contains(query)).collect();
        Ok(page(posts))
    }

    async fn post(&self, post_id: u64) -> Result<Post> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        self.server_post(post_id).ok_or(Error::Server {
            status: 404,
            message: "Post not found".into(),
        })
    }

    async fn my_posts(&self, _page: u64, _limit: u64) -> Result<Paginated<Post>> {
        Ok(page(self.all()))
    }

    async fn user_profile(&self, _username: &str) -> Result<UserProfile> {
        Ok(UserProfile { user: None, posts: page(self.all()) })
    }

    async fn post_comments(&self, post_id: u64) -> Result<Vec<Comment>> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        Ok(self.comments.lock().get(&post_id).cloned().unwrap_or_default())
    }

    async fn post_likes(&self, _post_id: u64) -> Result<Vec<LikeEntry>> {
        Ok(Vec::new())
    }

    async fn toggle_like(&self, post_id: u64) -> Result<LikeResponse> {
        self.like_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(gate) = &self.like_gate {
            gate.notified().await;
        }
        if self.fail_likes.load(Ordering::SeqCst) {
            return Err(Error::Server { status: 500, message: "boom".into() });
        }
        if self.malformed_likes.load(Ordering::SeqCst) {
            return Err(Error::MalformedResponse("expected value at line 1 column 1".into()));
        }

        let mut posts = self.posts.lock();
        let post = posts.get_mut(&post_id).ok_or(Error::Server {
            status: 404,
            message: "Post not found".into(),
        })?;
        post.toggle_like();
        Ok(LikeResponse { liked: post.liked_by_me })
    }

    async fn create_comment(&self, post_id: u64, content: &str) -> Result<Comment> {
        let comment = Comment {
            id: 100,
            content: content.to_string(),
            created_at: "2024-01-02T00:00:00Z".into(),
            author: Author { id: 1, name: "Ana".into(), ..Author::default() },
        };
        self.comments.lock().entry(post_id).or_default().push(comment.clone());
        if let Some(post) = self.posts.lock().get_mut(&post_id) {
            post.comments += 1;
        }
        Ok(comment)
    }

    async fn create_post(&self, new: &NewPost) -> Result<Post> {
        let mut posts = self.posts.lock();
        let id = posts.keys().next_back().map(|id| id + 1).unwrap_or(1);
        let mut created = post(id, 0, false);
        created.title = new.title.clone();
        created.content = new.content.clone();
        created.tags = new.tags.clone();
        posts.insert(id, created.clone());
        Ok(created)
    }

    async fn update_post(&self, post_id: u64, update: &PostUpdate) -> Result<Post> {
        let mut posts = self.posts.lock();
        let post = posts.get_mut(&post_id).ok_or(Error::Server {
            status: 404,
            message: "Post not found".into(),
        })?;
        if let Some(title) = &update.title {
            post.title = title.clone();
        }
        if let Some(content) = &update.content {
            post.content = content.clone();
        }
        Ok(post.clone())
    }

    async fn delete_post(&self, post_id: u64) -> Result<()> {
        self.posts.lock().remove(&post_id);
        Ok(())
    }
}
