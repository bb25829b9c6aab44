//! Query keys
//!
//! A key is an ordered list of segments such as `posts/statistic/5`.
//! Invalidation, cancellation and removal match keys by prefix, so
//! `posts` covers every post projection.

use std::fmt;

/// Identifies one cached projection
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct QueryKey(Vec<String>);

impl QueryKey {
    /// Build a key from segments
    pub fn new<I, S>(segments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self(segments.into_iter().map(Into::into).collect())
    }

    /// Append one segment
    pub fn push(mut self, segment: impl ToString) -> Self {
        self.0.push(segment.to_string());
        self
    }

    /// Key segments
    pub fn segments(&self) -> &[String] {
        &self.0
    }

    /// True if `prefix` matches this key's leading segments
    pub fn starts_with(&self, prefix: &QueryKey) -> bool {
        self.0.starts_with(&prefix.0)
    }

    /// Parse the `a/b/c` display form
    pub fn parse(s: &str) -> Self {
        Self::new(s.split('/').filter(|seg| !seg.is_empty()))
    }
}

impl fmt::Display for QueryKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0.join("/"))
    }
}

impl<S: Into<String>, const N: usize> From<[S; N]> for QueryKey {
    fn from(segments: [S; N]) -> Self {
        Self::new(segments)
    }
}

/// Key factory for blog projections
pub mod keys {
    use super::QueryKey;

    /// Every post projection
    pub fn posts() -> QueryKey {
        QueryKey::from(["posts"])
    }

    /// The signed-in user's post list
    pub fn profile() -> QueryKey {
        posts().push("profile")
    }

    /// Prefix of all per-post statistics
    pub fn statistics() -> QueryKey {
        posts().push("statistic")
    }

    /// Statistic of one post
    pub fn statistic(post_id: u64) -> QueryKey {
        statistics().push(post_id)
    }

    /// Prefix of all post details
    pub fn details() -> QueryKey {
        posts().push("detail")
    }

    /// Post detail
    pub fn detail(post_id: u64) -> QueryKey {
        details().push(post_id)
    }

    /// Comments of one post
    pub fn comments(post_id: u64) -> QueryKey {
        posts().push("comments").push(post_id)
    }

    /// Likes of one post
    pub fn likes(post_id: u64) -> QueryKey {
        posts().push("likes").push(post_id)
    }

    /// Recommended feed page
    pub fn recommended(page: u64, limit: u64) -> QueryKey {
        posts().push("recommended").push(page).push(limit)
    }

    /// Most liked page
    pub fn most_liked(page: u64, limit: u64) -> QueryKey {
        posts().push("most-liked").push(page).push(limit)
    }

    /// Search results page
    pub fn search(query: &str, page: u64, limit: u64) -> QueryKey {
        posts().push("search").push(query).push(page).push(limit)
    }

    /// Public profile of a user
    pub fn user_profile(username: &str) -> QueryKey {
        QueryKey::from(["users", "profile"]).push(username)
    }

    /// Prefixes of every listing that embeds post summaries
    pub fn listings() -> [QueryKey; 5] {
        [
            profile(),
            posts().push("recommended"),
            posts().push("most-liked"),
            posts().push("search"),
            QueryKey::from(["users", "profile"]),
        ]
    }
}
