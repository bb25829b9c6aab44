//! HTTP client for the Quill REST backend

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Method, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::api::BlogApi;
use crate::error::{Error, Result};
use crate::model::{
    Comment, LikeEntry, LikeResponse, LoginRequest, LoginResponse, NewPost, Paginated,
    PasswordChange, Post, PostUpdate, ProfileUpdate, RegisterRequest, RegisteredUser, User,
    UserProfile,
};
use crate::storage::{ClientStorage, ACCESS_TOKEN_KEY, USER_KEY};

/// Default per-request timeout
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Typed client for the blog backend.
///
/// The bearer credential lives in [`ClientStorage`] under
/// [`ACCESS_TOKEN_KEY`]; `login` writes it and `logout` removes it.
/// Endpoints that need it fail with [`Error::Unauthorized`] before any
/// network I/O when it is missing.
pub struct ApiClient {
    http: reqwest::Client,
    base_url: String,
    storage: Arc<ClientStorage>,
}

#[derive(Clone, Copy, PartialEq)]
enum Auth {
    None,
    Optional,
    Required,
}

impl ApiClient {
    /// Create a client with the default timeout
    pub fn new(base_url: impl Into<String>, storage: Arc<ClientStorage>) -> Result<Self> {
        Self::with_timeout(base_url, storage, DEFAULT_TIMEOUT)
    }

    /// Create a client with a custom request timeout
    pub fn with_timeout(
        base_url: impl Into<String>,
        storage: Arc<ClientStorage>,
        timeout: Duration,
    ) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("quill/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self::with_http_client(http, base_url, storage))
    }

    /// Create a client around a preconfigured `reqwest::Client`
    pub fn with_http_client(
        http: reqwest::Client,
        base_url: impl Into<String>,
        storage: Arc<ClientStorage>,
    ) -> Self {
        Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            storage,
        }
    }

    /// Backend base URL without trailing slash
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Storage holding the credential
    pub fn storage(&self) -> &Arc<ClientStorage> {
        &self.storage
    }

    /// Current bearer token, if any
    pub fn credential(&self) -> Option<String> {
        self.storage.get(ACCESS_TOKEN_KEY).filter(|t| !t.is_empty())
    }

    /// User document saved at login
    pub fn current_user(&self) -> Option<User> {
        let raw = self.storage.get(USER_KEY)?;
        match serde_json::from_str(&raw) {
            Ok(user) => Some(user),
            Err(e) => {
                warn!("Ignoring unreadable stored user: {}", e);
                None
            }
        }
    }

    /// Create an account
    pub async fn register(&self, request: &RegisterRequest) -> Result<RegisteredUser> {
        let registered: RegisteredUser = self
            .call(Method::POST, "/auth/register", Auth::None, Some(request), &[])
            .await?;
        info!("Registered user {} ({})", registered.username, registered.id);
        Ok(registered)
    }

    /// Sign in and persist the returned credential
    pub async fn login(&self, email: &str, password: &str) -> Result<LoginResponse> {
        let request = LoginRequest {
            email: email.to_string(),
            password: password.to_string(),
        };
        let response: LoginResponse = self
            .call(Method::POST, "/auth/login", Auth::None, Some(&request), &[])
            .await?;

        let token = response
            .credential()
            .ok_or_else(|| Error::MalformedResponse("login reply carried no token".to_string()))?;
        self.storage.set(ACCESS_TOKEN_KEY, token)?;

        if let Some(user) = &response.user {
            let doc = serde_json::to_string(user).map_err(|e| Error::Storage(e.to_string()))?;
            self.storage.set(USER_KEY, &doc)?;
        }

        info!("Logged in as {}", email);
        Ok(response)
    }

    /// Forget the credential and the stored user
    pub fn logout(&self) -> Result<()> {
        self.storage.remove(ACCESS_TOKEN_KEY)?;
        self.storage.remove(USER_KEY)?;
        info!("Logged out");
        Ok(())
    }

    /// Edit the signed-in user's profile
    pub async fn update_profile(&self, update: &ProfileUpdate) -> Result<User> {
        let user: User = self
            .call(Method::PATCH, "/users/profile", Auth::Required, Some(update), &[])
            .await?;
        let doc = serde_json::to_string(&user).map_err(|e| Error::Storage(e.to_string()))?;
        self.storage.set(USER_KEY, &doc)?;
        Ok(user)
    }

    /// Change the signed-in user's password
    pub async fn change_password(&self, change: &PasswordChange) -> Result<()> {
        if change.new_password.is_empty() {
            return Err(Error::InvalidInput("new password is empty".to_string()));
        }
        self.call_empty(Method::PATCH, "/users/password", Auth::Required, Some(change))
            .await
    }

    fn request(&self, method: Method, path: &str, auth: Auth) -> Result<RequestBuilder> {
        let url = format!("{}{}", self.base_url, path);
        let token = match auth {
            Auth::None => None,
            Auth::Optional => self.credential(),
            Auth::Required => Some(self.credential().ok_or(Error::Unauthorized)?),
        };

        debug!("{} {} (authed: {})", method, url, token.is_some());
        let builder = self
            .http
            .request(method, url)
            .header(reqwest::header::CONTENT_TYPE, "application/json");
        Ok(match token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        })
    }

    async fn call<B, R>(
        &self,
        method: Method,
        path: &str,
        auth: Auth,
        body: Option<&B>,
        query: &[(&str, String)],
    ) -> Result<R>
    where
        B: Serialize + ?Sized + Sync,
        R: DeserializeOwned,
    {
        let mut builder = self.request(method, path, auth)?;
        if !query.is_empty() {
            builder = builder.query(query);
        }
        if let Some(body) = body {
            builder = builder.json(body);
        }

        let resp = check(builder.send().await?).await?;
        let bytes = resp.bytes().await?;
        serde_json::from_slice(&bytes).map_err(|e| Error::MalformedResponse(format!("{}: {}", path, e)))
    }

    async fn call_empty<B>(&self, method: Method, path: &str, auth: Auth, body: Option<&B>) -> Result<()>
    where
        B: Serialize + ?Sized + Sync,
    {
        let mut builder = self.request(method, path, auth)?;
        if let Some(body) = body {
            builder = builder.json(body);
        }
        check(builder.send().await?).await?;
        Ok(())
    }

    async fn page(&self, path: &str, auth: Auth, mut query: Vec<(&str, String)>, page: u64, limit: u64) -> Result<Paginated<Post>> {
        if page == 0 || limit == 0 {
            return Err(Error::InvalidInput("page and limit start at 1".to_string()));
        }
        query.push(("limit", limit.to_string()));
        query.push(("page", page.to_string()));
        self.call::<(), _>(Method::GET, path, auth, None, &query).await
    }
}

/// Map a non-success response to an error
async fn check(resp: Response) -> Result<Response> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    if status == StatusCode::UNAUTHORIZED {
        warn!("Backend rejected credential ({})", resp.url().path());
        return Err(Error::Unauthorized);
    }

    let body = resp.text().await.unwrap_or_default();
    let message = serde_json::from_str::<Value>(&body)
        .ok()
        .and_then(|doc| doc.get("message").and_then(message_text))
        .unwrap_or_else(|| {
            format!(
                "API Error: {} {}",
                status.as_u16(),
                status.canonical_reason().unwrap_or("")
            )
            .trim_end()
            .to_string()
        });

    warn!(status = status.as_u16(), "API error: {}", message);
    Err(Error::Server {
        status: status.as_u16(),
        message,
    })
}

/// Backends send `message` either as a string or as a list of strings
fn message_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Array(items) => {
            let parts: Vec<&str> = items.iter().filter_map(Value::as_str).collect();
            (!parts.is_empty()).then(|| parts.join("; "))
        }
        _ => None,
    }
}

#[async_trait]
impl BlogApi for ApiClient {
    fn is_authenticated(&self) -> bool {
        self.credential().is_some()
    }

    async fn recommended_posts(&self, page: u64, limit: u64) -> Result<Paginated<Post>> {
        self.page("/posts/recommended", Auth::Optional, Vec::new(), page, limit).await
    }

    async fn most_liked_posts(&self, page: u64, limit: u64) -> Result<Paginated<Post>> {
        self.page("/posts/most-liked", Auth::Optional, Vec::new(), page, limit).await
    }

    async fn search_posts(&self, query: &str, page: u64, limit: u64) -> Result<Paginated<Post>> {
        let query = query.trim();
        if query.is_empty() {
            return Err(Error::InvalidInput("search query is empty".to_string()));
        }
        self.page("/posts/search", Auth::Optional, vec![("query", query.to_string())], page, limit)
            .await
    }

    async fn post(&self, post_id: u64) -> Result<Post> {
        self.call::<(), _>(Method::GET, &format!("/posts/{}", post_id), Auth::Optional, None, &[])
            .await
    }

    async fn my_posts(&self, page: u64, limit: u64) -> Result<Paginated<Post>> {
        self.page("/posts/my-posts", Auth::Required, Vec::new(), page, limit).await
    }

    async fn user_profile(&self, username: &str) -> Result<UserProfile> {
        if username.is_empty() || username.contains('/') {
            return Err(Error::InvalidInput(format!("invalid username '{}'", username)));
        }
        self.call::<(), _>(Method::GET, &format!("/users/{}", username), Auth::Optional, None, &[])
            .await
    }

    async fn post_comments(&self, post_id: u64) -> Result<Vec<Comment>> {
        self.call::<(), _>(Method::GET, &format!("/posts/{}/comments", post_id), Auth::None, None, &[])
            .await
    }

    async fn post_likes(&self, post_id: u64) -> Result<Vec<LikeEntry>> {
        self.call::<(), _>(Method::GET, &format!("/posts/{}/likes", post_id), Auth::None, None, &[])
            .await
    }

    async fn toggle_like(&self, post_id: u64) -> Result<LikeResponse> {
        self.call::<(), _>(Method::POST, &format!("/posts/{}/like", post_id), Auth::Required, None, &[])
            .await
    }

    async fn create_comment(&self, post_id: u64, content: &str) -> Result<Comment> {
        let body = serde_json::json!({ "content": content });
        self.call(Method::POST, &format!("/posts/{}/comments", post_id), Auth::Required, Some(&body), &[])
            .await
    }

    async fn create_post(&self, post: &NewPost) -> Result<Post> {
        self.call(Method::POST, "/posts", Auth::Required, Some(post), &[]).await
    }

    async fn update_post(&self, post_id: u64, update: &PostUpdate) -> Result<Post> {
        if update.is_empty() {
            return Err(Error::InvalidInput("nothing to update".to_string()));
        }
        self.call(Method::PATCH, &format!("/posts/{}", post_id), Auth::Required, Some(update), &[])
            .await
    }

    async fn delete_post(&self, post_id: u64) -> Result<()> {
        self.call_empty::<()>(Method::DELETE, &format!("/posts/{}", post_id), Auth::Required, None)
            .await
    }
}
