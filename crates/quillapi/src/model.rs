//! Wire models for the Quill REST backend
//!
//! Field names follow the backend's camelCase JSON. Posts and pages keep any
//! fields this crate does not know about in `extra`.
//!
//! Like toggles are applied to cached documents as raw JSON edits
//! ([`toggle_like_doc`], [`toggle_like_in_page_doc`]) so that nothing besides
//! `likes` and `likedByMe` is rewritten.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Post author as embedded in post and comment documents
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Author {
    /// User id
    pub id: u64,
    /// Display name
    #[serde(default)]
    pub name: String,
    /// Handle, when the endpoint includes it
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    /// Email, when the endpoint includes it
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
}

/// Post summary as it appears in lists and detail views
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Post {
    /// Post id
    pub id: u64,
    /// Title
    #[serde(default)]
    pub title: String,
    /// HTML body
    #[serde(default)]
    pub content: String,
    /// Tags in display order
    #[serde(default)]
    pub tags: Vec<String>,
    /// Cover image
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
    /// Creation timestamp as sent by the backend
    #[serde(default)]
    pub created_at: String,
    /// Like count
    #[serde(default)]
    pub likes: u64,
    /// Comment count
    #[serde(default)]
    pub comments: u64,
    /// Whether the signed-in user likes this post
    #[serde(default)]
    pub liked_by_me: bool,
    /// Author summary
    #[serde(default)]
    pub author: Author,
    /// Fields not modelled here, preserved verbatim
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Post {
    /// Flip `liked_by_me` and move `likes` one step in the same direction
    pub fn toggle_like(&mut self) {
        self.likes = step_likes(self.likes, self.liked_by_me);
        self.liked_by_me = !self.liked_by_me;
    }

    /// Body with HTML tags stripped, for previews
    pub fn plain_text(&self) -> String {
        let mut out = String::with_capacity(self.content.len());
        let mut in_tag = false;
        for ch in self.content.chars() {
            match ch {
                '<' => in_tag = true,
                '>' if in_tag => in_tag = false,
                _ if !in_tag => out.push(ch),
                _ => {}
            }
        }
        out
    }
}

/// One page of a paginated listing
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Paginated<T> {
    /// Items on this page
    pub data: Vec<T>,
    /// Total items across all pages
    #[serde(default)]
    pub total: u64,
    /// 1-based page number
    #[serde(default = "first_page")]
    pub page: u64,
    /// Last available page
    #[serde(default = "first_page")]
    pub last_page: u64,
    /// Fields not modelled here, such as `limit`
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

fn first_page() -> u64 {
    1
}

impl<T> Paginated<T> {
    /// True when no page follows this one
    pub fn is_last(&self) -> bool {
        self.page >= self.last_page
    }
}

impl Paginated<Post> {
    /// Find a post on this page
    pub fn find(&self, post_id: u64) -> Option<&Post> {
        self.data.iter().find(|p| p.id == post_id)
    }
}

/// Per-post engagement counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PostStatistic {
    /// Like count
    pub likes: u64,
    /// Comment count
    pub comments: u64,
    /// Whether the signed-in user likes this post
    #[serde(default)]
    pub liked_by_me: bool,
}

impl From<&Post> for PostStatistic {
    fn from(post: &Post) -> Self {
        Self {
            likes: post.likes,
            comments: post.comments,
            liked_by_me: post.liked_by_me,
        }
    }
}

fn step_likes(likes: u64, currently_liked: bool) -> u64 {
    if currently_liked {
        likes.saturating_sub(1)
    } else {
        likes + 1
    }
}

/// Flip the like state of a raw post or statistic document in place.
///
/// Only `likes` and `likedByMe` are written. A missing `likes` counts as 0
/// and a missing `likedByMe` as false.
///
/// # Errors
/// * a description of the mismatch when `doc` is not an object or either
///   field has the wrong type
pub fn toggle_like_doc(doc: &mut Value) -> std::result::Result<(), String> {
    let fields = doc.as_object_mut().ok_or("expected an object")?;
    let liked = match fields.get("likedByMe") {
        None | Some(Value::Null) => false,
        Some(Value::Bool(liked)) => *liked,
        Some(other) => return Err(format!("likedByMe is not a boolean: {}", other)),
    };
    let likes = match fields.get("likes") {
        None | Some(Value::Null) => 0,
        Some(v) => v.as_u64().ok_or_else(|| format!("likes is not a count: {}", v))?,
    };

    fields.insert("likes".to_string(), Value::from(step_likes(likes, liked)));
    fields.insert("likedByMe".to_string(), Value::Bool(!liked));
    Ok(())
}

/// Flip the like state of every entry of a raw post page whose `id` is `post_id`
///
/// # Errors
/// * a description of the mismatch when the page has no `data` array, or a
///   matching entry fails [`toggle_like_doc`]
pub fn toggle_like_in_page_doc(page: &mut Value, post_id: u64) -> std::result::Result<(), String> {
    let data = page
        .get_mut("data")
        .and_then(Value::as_array_mut)
        .ok_or("expected a page with a data array")?;
    for entry in data
        .iter_mut()
        .filter(|entry| entry.get("id").and_then(Value::as_u64) == Some(post_id))
    {
        toggle_like_doc(entry)?;
    }
    Ok(())
}

/// Reply to `POST /posts/{id}/like`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LikeResponse {
    /// Like state after the toggle
    pub liked: bool,
}

/// A comment on a post
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Comment {
    /// Comment id
    pub id: u64,
    /// Comment text
    #[serde(default)]
    pub content: String,
    /// Creation timestamp
    #[serde(default)]
    pub created_at: String,
    /// Comment author
    #[serde(default)]
    pub author: Author,
}

/// One entry of a post's like list
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LikeEntry {
    /// Like id
    pub id: u64,
    /// User who liked the post
    #[serde(default)]
    pub user: Author,
    /// When the like was given
    #[serde(default)]
    pub created_at: String,
}

/// Account details of a user
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    /// User id
    pub id: u64,
    /// Display name
    #[serde(default)]
    pub name: String,
    /// Email
    #[serde(default)]
    pub email: String,
    /// Short bio line
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub headline: Option<String>,
    /// Handle
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    /// Avatar image
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avatar_url: Option<String>,
}

/// Reply of `GET /users/{username}`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserProfile {
    /// Account details, when the backend includes them
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<User>,
    /// The user's posts
    pub posts: Paginated<Post>,
}

/// Body of `POST /auth/register`
#[derive(Debug, Clone, Serialize)]
pub struct RegisterRequest {
    /// Display name
    pub name: String,
    /// Handle
    pub username: String,
    /// Email
    pub email: String,
    /// Plain password
    pub password: String,
}

/// Reply of `POST /auth/register`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegisteredUser {
    /// New user id
    pub id: u64,
    /// Email
    pub email: String,
    /// Handle
    pub username: String,
}

/// Body of `POST /auth/login`
#[derive(Debug, Clone, Serialize)]
pub struct LoginRequest {
    /// Email
    pub email: String,
    /// Plain password
    pub password: String,
}

/// Reply of `POST /auth/login`
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginResponse {
    /// Preferred credential field
    #[serde(default)]
    pub access_token: Option<String>,
    /// Legacy credential field
    #[serde(default)]
    pub token: Option<String>,
    /// Signed-in user
    #[serde(default)]
    pub user: Option<User>,
}

impl LoginResponse {
    /// Bearer token from whichever field the backend filled in
    pub fn credential(&self) -> Option<&str> {
        self.access_token
            .as_deref()
            .or(self.token.as_deref())
            .filter(|t| !t.is_empty())
    }
}

/// Body of `POST /posts`
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NewPost {
    /// Title
    pub title: String,
    /// HTML body
    pub content: String,
    /// Tags
    pub tags: Vec<String>,
    /// Cover image
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
}

/// Body of `PATCH /posts/{id}`; unset fields are left unchanged
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PostUpdate {
    /// New title
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    /// New body
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    /// Replacement tag list
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tags: Option<Vec<String>>,
    /// New cover image
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
}

impl PostUpdate {
    /// True when nothing would be sent
    pub fn is_empty(&self) -> bool {
        self.title.is_none() && self.content.is_none() && self.tags.is_none() && self.image_url.is_none()
    }
}

/// Body of `PATCH /users/profile`
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ProfileUpdate {
    /// New display name
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// New headline
    #[serde(skip_serializing_if = "Option::is_none")]
    pub headline: Option<String>,
}

/// Body of `PATCH /users/password`
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PasswordChange {
    /// Current password
    pub current_password: String,
    /// Replacement password
    pub new_password: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn post_doc(id: u64, likes: u64, liked: bool) -> Value {
        json!({
            "id": id,
            "title": "Hello",
            "content": "<p>Hi <b>there</b></p>",
            "tags": ["rust"],
            "imageUrl": "https://img/1.png",
            "createdAt": "2024-05-01T10:00:00Z",
            "likes": likes,
            "comments": 2,
            "likedByMe": liked,
            "author": { "id": 9, "name": "Ana", "username": "ana" },
            "slug": "hello"
        })
    }

    #[test]
    fn test_post_decodes_camel_case() {
        let post: Post = serde_json::from_value(post_doc(5, 10, false)).unwrap();
        assert_eq!(post.id, 5);
        assert_eq!(post.image_url.as_deref(), Some("https://img/1.png"));
        assert_eq!(post.author.username.as_deref(), Some("ana"));
        assert!(!post.liked_by_me);
    }

    #[test]
    fn test_post_keeps_unknown_fields() {
        let doc = post_doc(5, 10, false);
        let post: Post = serde_json::from_value(doc.clone()).unwrap();
        assert_eq!(post.extra.get("slug"), Some(&json!("hello")));
        assert_eq!(serde_json::to_value(&post).unwrap(), doc);
    }

    #[test]
    fn test_post_toggle_like() {
        let mut post: Post = serde_json::from_value(post_doc(5, 10, false)).unwrap();
        post.toggle_like();
        assert_eq!((post.likes, post.liked_by_me), (11, true));
        post.toggle_like();
        assert_eq!((post.likes, post.liked_by_me), (10, false));
    }

    #[test]
    fn test_unlike_never_goes_negative() {
        let mut stat = json!({ "likes": 0, "comments": 1, "likedByMe": true });
        toggle_like_doc(&mut stat).unwrap();
        assert_eq!(stat, json!({ "likes": 0, "comments": 1, "likedByMe": false }));
    }

    #[test]
    fn test_page_toggle_only_touches_matching_ids() {
        let page = json!({
            "data": [post_doc(5, 10, false), post_doc(6, 3, true)],
            "total": 2, "page": 1, "lastPage": 1
        });
        let mut patched = page.clone();
        toggle_like_in_page_doc(&mut patched, 5).unwrap();

        let typed: Paginated<Post> = serde_json::from_value(patched.clone()).unwrap();
        assert_eq!(typed.find(5).map(|p| (p.likes, p.liked_by_me)), Some((11, true)));
        assert_eq!(typed.find(6).map(|p| (p.likes, p.liked_by_me)), Some((3, true)));
        assert!(typed.is_last());

        let mut expected = page;
        expected["data"][0]["likes"] = json!(11);
        expected["data"][0]["likedByMe"] = json!(true);
        assert_eq!(patched, expected);
    }

    #[test]
    fn test_page_toggle_leaves_other_fields_verbatim() {
        let page = json!({
            "data": [
                { "id": 4, "likes": 1, "likedByMe": false, "imageUrl": null },
                { "id": 5, "likes": 7, "imageUrl": null, "pinned": true }
            ],
            "total": 2, "page": 1, "lastPage": 1, "limit": 50
        });
        let mut patched = page.clone();
        toggle_like_in_page_doc(&mut patched, 5).unwrap();

        let mut expected = page;
        expected["data"][1]["likes"] = json!(8);
        expected["data"][1]["likedByMe"] = json!(true);
        assert_eq!(patched, expected);
    }

    #[test]
    fn test_toggle_doc_rejects_wrong_shapes() {
        assert!(toggle_like_doc(&mut json!([1, 2])).is_err());
        assert!(toggle_like_doc(&mut json!({ "likes": "many" })).is_err());
        assert!(toggle_like_doc(&mut json!({ "likes": 1, "likedByMe": "yes" })).is_err());
        assert!(toggle_like_in_page_doc(&mut json!({ "items": [] }), 5).is_err());
    }

    #[test]
    fn test_page_keeps_unknown_fields() {
        let doc = json!({ "data": [], "total": 0, "page": 1, "lastPage": 1, "limit": 50 });
        let page: Paginated<Post> = serde_json::from_value(doc.clone()).unwrap();
        assert_eq!(page.extra.get("limit"), Some(&json!(50)));
        assert_eq!(serde_json::to_value(&page).unwrap(), doc);
    }

    #[test]
    fn test_statistic_from_post() {
        let post: Post = serde_json::from_value(post_doc(5, 10, true)).unwrap();
        let stat = PostStatistic::from(&post);
        assert_eq!(stat, PostStatistic { likes: 10, comments: 2, liked_by_me: true });
    }

    #[test]
    fn test_login_credential_fallback() {
        let resp: LoginResponse = serde_json::from_value(json!({ "token": "abc" })).unwrap();
        assert_eq!(resp.credential(), Some("abc"));

        let resp: LoginResponse =
            serde_json::from_value(json!({ "accessToken": "xyz", "token": "abc" })).unwrap();
        assert_eq!(resp.credential(), Some("xyz"));

        let resp: LoginResponse = serde_json::from_value(json!({ "accessToken": "" })).unwrap();
        assert_eq!(resp.credential(), None);
    }

    #[test]
    fn test_plain_text_strips_tags() {
        let post: Post = serde_json::from_value(post_doc(1, 0, false)).unwrap();
        assert_eq!(post.plain_text(), "Hi there");
    }

    #[test]
    fn test_post_update_skips_unset_fields() {
        let update = PostUpdate { title: Some("New".into()), ..Default::default() };
        assert_eq!(serde_json::to_value(&update).unwrap(), json!({ "title": "New" }));
        assert!(PostUpdate::default().is_empty());
    }
}
