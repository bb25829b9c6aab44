//! Optimistic like toggling
//!
//! A like toggle touches two projections of the same post: its entry in the
//! list projection and its statistic projection. Both are patched together
//! before the request is sent, as in-place edits of the cached JSON that
//! change only `likes` and `likedByMe`. Once the request settles they are
//! either restored from snapshots (failure or drop) or invalidated along with
//! the post's detail and every other listing (success).

use std::collections::HashSet;
use std::sync::Arc;

use parking_lot::Mutex;
use quillapi::{toggle_like_doc, toggle_like_in_page_doc, BlogApi, Error, Result};
use tracing::{debug, info, warn};

use crate::cache::{QueryCache, Snapshot};
use crate::key::{keys, QueryKey};

/// Projections touched by a like toggle
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LikeKeys {
    /// List projection holding `Paginated<Post>`; patched
    pub list: QueryKey,
    /// Prefix of per-post `PostStatistic` projections; patched, the post id is appended
    pub statistic_prefix: QueryKey,
    /// Prefix of per-post detail projections; invalidated, the post id is appended
    pub detail_prefix: QueryKey,
    /// Prefixes of other listings embedding the post; invalidated
    pub listings: Vec<QueryKey>,
}

impl LikeKeys {
    /// Statistic key of one post
    pub fn statistic(&self, post_id: u64) -> QueryKey {
        self.statistic_prefix.clone().push(post_id)
    }

    /// Detail key of one post
    pub fn detail(&self, post_id: u64) -> QueryKey {
        self.detail_prefix.clone().push(post_id)
    }
}

impl Default for LikeKeys {
    fn default() -> Self {
        Self {
            list: keys::profile(),
            statistic_prefix: keys::statistics(),
            detail_prefix: keys::details(),
            listings: keys::listings().to_vec(),
        }
    }
}

/// Result of [`LikeToggler::toggle_like`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToggleOutcome {
    /// The backend accepted the toggle
    Applied {
        /// Like state reported by the backend
        liked: bool,
    },
    /// A toggle of the same post was already pending; nothing was done
    Coalesced,
}

/// Applies like toggles optimistically against a [`QueryCache`]
pub struct LikeToggler<A: ?Sized> {
    cache: QueryCache,
    api: Arc<A>,
    keys: LikeKeys,
    pending: Arc<Mutex<HashSet<u64>>>,
}

impl<A: ?Sized> Clone for LikeToggler<A> {
    fn clone(&self) -> Self {
        Self {
            cache: self.cache.clone(),
            api: Arc::clone(&self.api),
            keys: self.keys.clone(),
            pending: Arc::clone(&self.pending),
        }
    }
}

impl<A: BlogApi + ?Sized> LikeToggler<A> {
    /// Toggler over the default list and statistic keys
    pub fn new(cache: QueryCache, api: Arc<A>) -> Self {
        Self::with_keys(cache, api, LikeKeys::default())
    }

    /// Toggler over custom projection keys
    pub fn with_keys(cache: QueryCache, api: Arc<A>, keys: LikeKeys) -> Self {
        Self {
            cache,
            api,
            keys,
            pending: Arc::new(Mutex::new(HashSet::new())),
        }
    }

    /// Projection keys in use
    pub fn keys(&self) -> &LikeKeys {
        &self.keys
    }

    /// True while a toggle of `post_id` has not settled
    pub fn is_pending(&self, post_id: u64) -> bool {
        self.pending.lock().contains(&post_id)
    }

    /// Toggle the signed-in user's like on a post.
    ///
    /// The list entry and the statistic of `post_id` flip immediately and
    /// together. On success both are invalidated, as are the post's detail and
    /// the configured listings, so the next read of any of them fetches
    /// backend truth. On failure both are restored exactly and the error is
    /// returned. A call for a post whose toggle is still pending returns
    /// [`ToggleOutcome::Coalesced`] without side effects.
    ///
    /// # Errors
    /// * [`Error::Unauthorized`] - no credential; the cache is untouched
    /// * any error of the like request, after rollback
    pub async fn toggle_like(&self, post_id: u64) -> Result<ToggleOutcome> {
        if !self.api.is_authenticated() {
            warn!(post = post_id, "like refused: not signed in");
            return Err(Error::Unauthorized);
        }

        let Some(_slot) = PendingSlot::acquire(&self.pending, post_id) else {
            debug!(post = post_id, "like already pending, coalesced");
            return Ok(ToggleOutcome::Coalesced);
        };

        let list_key = &self.keys.list;
        let stat_key = self.keys.statistic(post_id);

        self.cache.cancel_queries(list_key);
        self.cache.cancel_queries(&stat_key);

        let snapshots = self.cache.batch(|batch| {
            let snapshots = [batch.snapshot(list_key), batch.snapshot(&stat_key)];
            batch.patch(list_key, |page| toggle_like_in_page_doc(page, post_id))?;
            batch.patch(&stat_key, toggle_like_doc)?;
            Ok(snapshots)
        })?;
        let rollback = Rollback::new(&self.cache, snapshots);

        match self.api.toggle_like(post_id).await {
            Ok(response) => {
                rollback.disarm();
                self.cache.invalidate_queries(list_key);
                self.cache.invalidate_queries(&stat_key);
                self.cache.invalidate_queries(&self.keys.detail(post_id));
                for listing in &self.keys.listings {
                    self.cache.invalidate_queries(listing);
                }
                info!(post = post_id, liked = response.liked, "like toggled");
                Ok(ToggleOutcome::Applied { liked: response.liked })
            }
            Err(e) => {
                rollback.restore();
                warn!(post = post_id, "like failed, rolled back: {}", e);
                Err(e)
            }
        }
    }
}

/// Marks a post as having a toggle in flight until dropped
struct PendingSlot {
    pending: Arc<Mutex<HashSet<u64>>>,
    post_id: u64,
}

impl PendingSlot {
    fn acquire(pending: &Arc<Mutex<HashSet<u64>>>, post_id: u64) -> Option<Self> {
        pending.lock().insert(post_id).then(|| Self {
            pending: Arc::clone(pending),
            post_id,
        })
    }
}

impl Drop for PendingSlot {
    fn drop(&mut self) {
        self.pending.lock().remove(&self.post_id);
    }
}

/// Restores snapshots unless disarmed; also fires when the toggle future is dropped
struct Rollback<'a> {
    cache: &'a QueryCache,
    snapshots: Option<[Snapshot; 2]>,
}

impl<'a> Rollback<'a> {
    fn new(cache: &'a QueryCache, snapshots: [Snapshot; 2]) -> Self {
        Self {
            cache,
            snapshots: Some(snapshots),
        }
    }

    fn disarm(mut self) {
        self.snapshots = None;
    }

    fn restore(mut self) {
        self.restore_now();
    }

    fn restore_now(&mut self) {
        if let Some(snapshots) = self.snapshots.take() {
            self.cache.restore(&snapshots);
        }
    }
}

impl Drop for Rollback<'_> {
    fn drop(&mut self) {
        if self.snapshots.is_some() {
            debug!("like abandoned before settling, rolling back");
            self.restore_now();
        }
    }
}
