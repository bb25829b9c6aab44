//! # quillcache
//!
//! Query cache for Quill clients.
//!
//! ## Architecture
//! - **QueryCache**: keyed JSON projections in an LRU map (AHash index)
//! - **Fetching**: stale-time freshness, retry, cancellable in-flight reads
//! - **LikeToggler**: optimistic like toggles with snapshot rollback
//! - **BlogQueries**: cached reads and invalidating writes over a `BlogApi`

#![warn(missing_docs)]

mod cache;
mod key;
mod lru;
mod optimistic;
mod queries;
mod stats;

#[cfg(test)]
mod testing;

pub use cache::{Batch, CacheConfig, QueryCache, Snapshot};
pub use key::{keys, QueryKey};
pub use optimistic::{LikeKeys, LikeToggler, ToggleOutcome};
pub use queries::{validate_comment, BlogQueries, MAX_COMMENT_CHARS, PROFILE_PAGE_LIMIT};
pub use stats::CacheStats;
