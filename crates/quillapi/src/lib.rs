//! # quillapi
//!
//! Client-side data layer for the Quill blogging backend.
//!
//! ## Contents
//! - **Models**: camelCase wire documents (posts, pages, statistics, comments)
//! - **ApiClient**: typed REST client with bearer credentials
//! - **ClientStorage**: file-backed key/value store holding the credential
//! - **BlogApi**: the trait the cache layer reads through

#![warn(missing_docs)]

mod api;
mod client;
mod error;
pub mod model;
mod storage;

pub use api::BlogApi;
pub use client::{ApiClient, DEFAULT_TIMEOUT};
pub use error::{Error, Result};
pub use model::{
    toggle_like_doc, toggle_like_in_page_doc, Author, Comment, LikeEntry, LikeResponse,
    LoginResponse, NewPost, Paginated, PasswordChange, Post, PostStatistic, PostUpdate,
    ProfileUpdate, RegisterRequest, RegisteredUser, User, UserProfile,
};
pub use storage::{ClientStorage, ACCESS_TOKEN_KEY, USER_KEY};
