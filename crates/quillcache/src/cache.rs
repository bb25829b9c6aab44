//! QueryCache: keyed projections of backend state
//!
//! Each entry holds one JSON document plus freshness bookkeeping and, while
//! a read is running, the cancellation handle of that read. All state sits
//! behind one lock that is never held across an `.await`.

use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::RwLock;
use quillapi::{Error, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

use crate::key::QueryKey;
use crate::lru::Lru;
use crate::stats::CacheStats;

/// Tuning knobs for [`QueryCache`]
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Maximum number of cached projections
    pub capacity: usize,
    /// Age after which a projection is refetched on read
    pub stale_time: Duration,
    /// Extra attempts after a failed fetch
    pub retry: u32,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            capacity: 256,
            stale_time: Duration::from_secs(30),
            retry: 1,
        }
    }
}

struct InFlight {
    id: u64,
    token: CancellationToken,
}

#[derive(Default)]
struct Entry {
    data: Option<Value>,
    updated_at: Option<Instant>,
    invalidated: bool,
    fetch: Option<InFlight>,
}

impl Entry {
    fn state(&self) -> EntryState {
        EntryState {
            data: self.data.clone(),
            updated_at: self.updated_at,
            invalidated: self.invalidated,
        }
    }
}

/// Restorable part of an entry; in-flight reads are not part of it
#[derive(Debug, Clone, PartialEq)]
struct EntryState {
    data: Option<Value>,
    updated_at: Option<Instant>,
    invalidated: bool,
}

/// Captured state of one projection, used for rollback
#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot {
    key: QueryKey,
    state: Option<EntryState>,
}

impl Snapshot {
    /// Key this snapshot was taken from
    pub fn key(&self) -> &QueryKey {
        &self.key
    }

    /// Captured document, if the projection held one
    pub fn data(&self) -> Option<&Value> {
        self.state.as_ref().and_then(|s| s.data.as_ref())
    }

    /// Put the projection back exactly as captured.
    ///
    /// Restoring the same snapshot again leaves the cache unchanged.
    pub fn restore(&self, cache: &QueryCache) {
        cache.restore(std::slice::from_ref(self));
    }
}

/// Shared, cheaply clonable cache handle
#[derive(Clone)]
pub struct QueryCache {
    /// Projections by key
    entries: Arc<RwLock<Lru<QueryKey, Entry>>>,

    /// Cache statistics
    stats: Arc<CacheStats>,

    /// Next in-flight read id
    next_fetch: Arc<AtomicU64>,

    config: CacheConfig,
}

impl QueryCache {
    /// Create a cache with the given configuration
    pub fn new(config: CacheConfig) -> Self {
        Self {
            entries: Arc::new(RwLock::new(Lru::new(config.capacity))),
            stats: Arc::new(CacheStats::new()),
            next_fetch: Arc::new(AtomicU64::new(1)),
            config,
        }
    }

    /// Create a cache with default settings and the given capacity
    pub fn with_capacity(capacity: usize) -> Self {
        Self::new(CacheConfig {
            capacity,
            ..CacheConfig::default()
        })
    }

    /// Read a projection, fetching it when absent or stale
    ///
    /// A fetch that is cancelled through [`QueryCache::cancel_queries`]
    /// fails with [`Error::Cancelled`] and writes nothing. A fetch
    /// superseded by a newer read of the same key returns its result but
    /// leaves storing to the newer read.
    ///
    /// # Arguments
    /// * `key` - Projection key
    /// * `fetcher` - Produces the authoritative value; called again on retry
    pub async fn fetch_query<T, F, Fut>(&self, key: &QueryKey, mut fetcher: F) -> Result<T>
    where
        T: Serialize + DeserializeOwned,
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        if let Some(data) = self.fresh_data(key) {
            self.stats.record_hit();
            trace!(%key, "cache hit");
            return decode(key, data);
        }

        self.stats.record_miss();
        let (id, token) = self.begin_fetch(key);
        debug!(%key, fetch = id, "fetching");

        let mut attempt = 0;
        let value = loop {
            self.stats.record_fetch();
            let outcome = tokio::select! {
                biased;
                _ = token.cancelled() => Err(Error::Cancelled),
                result = fetcher() => result,
            };

            match outcome {
                Ok(value) => break value,
                Err(Error::Cancelled) => {
                    self.end_fetch(key, id);
                    debug!(%key, fetch = id, "fetch cancelled");
                    return Err(Error::Cancelled);
                }
                Err(e) if e.is_network_or_server() && attempt < self.config.retry => {
                    self.stats.record_fetch_failure();
                    attempt += 1;
                    warn!(%key, attempt, "fetch failed, retrying: {}", e);
                }
                Err(e) => {
                    self.stats.record_fetch_failure();
                    self.end_fetch(key, id);
                    return Err(e);
                }
            }
        };

        let doc = encode(key, &value)?;
        if !self.complete_fetch(key, id, &token, doc) {
            if token.is_cancelled() {
                return Err(Error::Cancelled);
            }
            debug!(%key, fetch = id, "superseded fetch result dropped");
        }
        Ok(value)
    }

    /// Typed read without fetching; `None` when no document is cached
    pub fn get_query_data<T: DeserializeOwned>(&self, key: &QueryKey) -> Result<Option<T>> {
        match self.get_raw(key) {
            Some(data) => decode(key, data).map(Some),
            None => Ok(None),
        }
    }

    /// Raw document without fetching
    pub fn get_raw(&self, key: &QueryKey) -> Option<Value> {
        self.entries.read().peek(key).and_then(|e| e.data.clone())
    }

    /// Store authoritative data, marking the projection fresh
    pub fn set_query_data<T: Serialize>(&self, key: &QueryKey, value: &T) -> Result<()> {
        let doc = encode(key, value)?;
        let mut entries = self.entries.write();
        write_fresh(&mut entries, &self.stats, key, doc);
        Ok(())
    }

    /// Apply `f` to the cached document of `key`, if there is one
    ///
    /// # Returns
    /// * `Result<bool>` - Whether a document was present and rewritten
    pub fn update_query_data<T, F>(&self, key: &QueryKey, f: F) -> Result<bool>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce(T) -> T,
    {
        self.batch(|batch| batch.update(key, f))
    }

    /// Edit the raw cached document of `key` in place, if there is one.
    ///
    /// Fields `f` does not touch are kept verbatim. An `Err` from `f` leaves
    /// the projection unchanged and is reported as [`Error::Projection`].
    pub fn patch_query_data<F>(&self, key: &QueryKey, f: F) -> Result<bool>
    where
        F: FnOnce(&mut Value) -> std::result::Result<(), String>,
    {
        self.batch(|batch| batch.patch(key, f))
    }

    /// Run several reads and writes under one write lock.
    ///
    /// If `f` fails, every write it made is undone before the error is
    /// returned.
    pub fn batch<R, F>(&self, f: F) -> Result<R>
    where
        F: FnOnce(&mut Batch<'_>) -> Result<R>,
    {
        let mut entries = self.entries.write();
        let mut batch = Batch {
            entries: &mut *entries,
            stats: &self.stats,
            undo: Vec::new(),
        };

        match f(&mut batch) {
            Ok(result) => Ok(result),
            Err(e) => {
                batch.revert();
                Err(e)
            }
        }
    }

    /// Capture the current state of a projection
    pub fn snapshot(&self, key: &QueryKey) -> Snapshot {
        let entries = self.entries.read();
        take_snapshot(&entries, key)
    }

    /// Restore several snapshots under one write lock
    pub fn restore(&self, snapshots: &[Snapshot]) {
        let mut entries = self.entries.write();
        for snapshot in snapshots {
            apply_state(&mut entries, &self.stats, &snapshot.key, snapshot.state.clone());
            self.stats.record_rollback();
        }
    }

    /// Mark matching projections stale; data stays readable
    ///
    /// # Returns
    /// * `usize` - Number of projections invalidated
    pub fn invalidate_queries(&self, prefix: &QueryKey) -> usize {
        let mut count = 0;
        self.entries.write().for_each_mut(|key, entry| {
            if key.starts_with(prefix) && entry.data.is_some() {
                entry.invalidated = true;
                self.stats.record_invalidation();
                count += 1;
            }
        });
        debug!(%prefix, count, "invalidated");
        count
    }

    /// Cancel running reads of matching projections; data is kept
    ///
    /// # Returns
    /// * `usize` - Number of reads cancelled
    pub fn cancel_queries(&self, prefix: &QueryKey) -> usize {
        let mut count = 0;
        self.entries.write().for_each_mut(|key, entry| {
            if key.starts_with(prefix) {
                if let Some(fetch) = entry.fetch.take() {
                    fetch.token.cancel();
                    self.stats.record_cancellation();
                    count += 1;
                }
            }
        });
        if count > 0 {
            debug!(%prefix, count, "cancelled in-flight reads");
        }
        count
    }

    /// Drop matching projections, cancelling their reads
    ///
    /// # Returns
    /// * `usize` - Number of projections removed
    pub fn remove_queries(&self, prefix: &QueryKey) -> usize {
        self.entries.write().retain(|key, entry| {
            if !key.starts_with(prefix) {
                return true;
            }
            if let Some(fetch) = entry.fetch.take() {
                fetch.token.cancel();
            }
            false
        })
    }

    /// True when a read of `key` would fetch
    pub fn is_stale(&self, key: &QueryKey) -> bool {
        self.entries
            .read()
            .peek(key)
            .map(|entry| !self.is_fresh(entry))
            .unwrap_or(true)
    }

    /// True when `key` was explicitly invalidated
    pub fn is_invalidated(&self, key: &QueryKey) -> bool {
        self.entries.read().peek(key).map(|e| e.invalidated).unwrap_or(false)
    }

    /// True while a read of `key` is running
    pub fn is_fetching(&self, key: &QueryKey) -> bool {
        self.entries.read().peek(key).map(|e| e.fetch.is_some()).unwrap_or(false)
    }

    /// Cached keys, most recently used first
    pub fn keys(&self) -> Vec<QueryKey> {
        self.entries.read().keys()
    }

    /// Get cache statistics
    pub fn stats(&self) -> &CacheStats {
        &self.stats
    }

    /// Get current number of projections
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    /// Check if the cache is empty
    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    /// Get cache capacity
    pub fn capacity(&self) -> usize {
        self.config.capacity
    }

    /// Active configuration
    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    /// Drop every projection and reset statistics
    pub fn clear(&self) {
        let mut entries = self.entries.write();
        entries.for_each_mut(|_, entry| {
            if let Some(fetch) = entry.fetch.take() {
                fetch.token.cancel();
            }
        });
        entries.clear();
        self.stats.reset();
    }

    fn is_fresh(&self, entry: &Entry) -> bool {
        entry.data.is_some()
            && !entry.invalidated
            && entry
                .updated_at
                .map(|at| at.elapsed() < self.config.stale_time)
                .unwrap_or(false)
    }

    fn fresh_data(&self, key: &QueryKey) -> Option<Value> {
        let mut entries = self.entries.write();
        let entry = entries.get(key)?;
        if self.is_fresh(entry) {
            entry.data.clone()
        } else {
            None
        }
    }

    fn begin_fetch(&self, key: &QueryKey) -> (u64, CancellationToken) {
        let id = self.next_fetch.fetch_add(1, Ordering::Relaxed);
        let token = CancellationToken::new();
        let mut entries = self.entries.write();

        match entries.get_mut(key) {
            // A running read of the same key keeps going but loses the right to store
            Some(entry) => {
                entry.fetch = Some(InFlight { id, token: token.clone() });
            }
            None => {
                let entry = Entry {
                    fetch: Some(InFlight { id, token: token.clone() }),
                    ..Entry::default()
                };
                insert(&mut entries, &self.stats, key.clone(), entry);
            }
        }
        (id, token)
    }

    fn end_fetch(&self, key: &QueryKey, id: u64) {
        let mut entries = self.entries.write();
        if let Some(entry) = entries.peek_mut(key) {
            if entry.fetch.as_ref().map(|f| f.id) == Some(id) {
                entry.fetch = None;
            }
        }
    }

    /// Store a fetch result if the read is still the current one
    fn complete_fetch(&self, key: &QueryKey, id: u64, token: &CancellationToken, doc: Value) -> bool {
        let mut entries = self.entries.write();
        let Some(entry) = entries.peek_mut(key) else {
            return false;
        };
        if token.is_cancelled() || entry.fetch.as_ref().map(|f| f.id) != Some(id) {
            return false;
        }

        entry.fetch = None;
        entry.data = Some(doc);
        entry.updated_at = Some(Instant::now());
        entry.invalidated = false;
        true
    }
}

/// Writes made inside [`QueryCache::batch`]
pub struct Batch<'a> {
    entries: &'a mut Lru<QueryKey, Entry>,
    stats: &'a CacheStats,
    undo: Vec<(QueryKey, Option<EntryState>)>,
}

impl Batch<'_> {
    /// Capture the current state of a projection
    pub fn snapshot(&self, key: &QueryKey) -> Snapshot {
        take_snapshot(&*self.entries, key)
    }

    /// Raw document of a projection
    pub fn get_raw(&self, key: &QueryKey) -> Option<&Value> {
        self.entries.peek(key).and_then(|e| e.data.as_ref())
    }

    /// Typed document of a projection
    pub fn get<T: DeserializeOwned>(&self, key: &QueryKey) -> Result<Option<T>> {
        match self.get_raw(key) {
            Some(data) => decode(key, data.clone()).map(Some),
            None => Ok(None),
        }
    }

    /// Rewrite the cached document of `key` through `f`, if there is one.
    ///
    /// Freshness bookkeeping is left untouched: the new document is a
    /// prediction, not backend state.
    pub fn update<T, F>(&mut self, key: &QueryKey, f: F) -> Result<bool>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce(T) -> T,
    {
        let Some(current) = self.get::<T>(key)? else {
            return Ok(false);
        };
        let doc = encode(key, &f(current))?;
        self.write_predicted(key, doc);
        Ok(true)
    }

    /// Edit the raw cached document of `key` in place, if there is one.
    ///
    /// Like [`Batch::update`], but without a typed round trip: fields `f`
    /// does not touch are kept verbatim.
    pub fn patch<F>(&mut self, key: &QueryKey, f: F) -> Result<bool>
    where
        F: FnOnce(&mut Value) -> std::result::Result<(), String>,
    {
        let Some(mut doc) = self.get_raw(key).cloned() else {
            return Ok(false);
        };
        f(&mut doc).map_err(|reason| Error::Projection {
            key: key.to_string(),
            reason,
        })?;
        self.write_predicted(key, doc);
        Ok(true)
    }

    /// Store authoritative data, marking the projection fresh
    pub fn set<T: Serialize>(&mut self, key: &QueryKey, value: &T) -> Result<()> {
        let doc = encode(key, value)?;
        self.remember(key);
        write_fresh(self.entries, self.stats, key, doc);
        Ok(())
    }

    fn write_predicted(&mut self, key: &QueryKey, doc: Value) {
        self.remember(key);
        if let Some(entry) = self.entries.peek_mut(key) {
            entry.data = Some(doc);
        }
        self.stats.record_optimistic_write();
        trace!(%key, "optimistic write");
    }

    fn remember(&mut self, key: &QueryKey) {
        if !self.undo.iter().any(|(k, _)| k == key) {
            let state = self.entries.peek(key).map(Entry::state);
            self.undo.push((key.clone(), state));
        }
    }

    fn revert(&mut self) {
        for (key, state) in self.undo.drain(..).rev() {
            apply_state(self.entries, self.stats, &key, state);
        }
    }
}

fn take_snapshot(entries: &Lru<QueryKey, Entry>, key: &QueryKey) -> Snapshot {
    Snapshot {
        key: key.clone(),
        state: entries.peek(key).map(Entry::state),
    }
}

fn apply_state(entries: &mut Lru<QueryKey, Entry>, stats: &CacheStats, key: &QueryKey, state: Option<EntryState>) {
    match state {
        Some(state) => match entries.peek_mut(key) {
            Some(entry) => {
                entry.data = state.data;
                entry.updated_at = state.updated_at;
                entry.invalidated = state.invalidated;
            }
            None => {
                let entry = Entry {
                    data: state.data,
                    updated_at: state.updated_at,
                    invalidated: state.invalidated,
                    fetch: None,
                };
                insert(entries, stats, key.clone(), entry);
            }
        },
        None => {
            if let Some(entry) = entries.remove(key) {
                if let Some(fetch) = entry.fetch {
                    fetch.token.cancel();
                }
            }
        }
    }
}

fn write_fresh(entries: &mut Lru<QueryKey, Entry>, stats: &CacheStats, key: &QueryKey, doc: Value) {
    match entries.get_mut(key) {
        Some(entry) => {
            entry.data = Some(doc);
            entry.updated_at = Some(Instant::now());
            entry.invalidated = false;
        }
        None => {
            let entry = Entry {
                data: Some(doc),
                updated_at: Some(Instant::now()),
                ..Entry::default()
            };
            insert(entries, stats, key.clone(), entry);
        }
    }
}

fn insert(entries: &mut Lru<QueryKey, Entry>, stats: &CacheStats, key: QueryKey, entry: Entry) {
    if let Some((evicted, old)) = entries.insert(key, entry) {
        if let Some(fetch) = old.fetch {
            fetch.token.cancel();
        }
        stats.record_eviction();
        debug!(key = %evicted, "evicted");
    }
}

fn encode<T: Serialize>(key: &QueryKey, value: &T) -> Result<Value> {
    serde_json::to_value(value).map_err(|e| Error::Projection {
        key: key.to_string(),
        reason: e.to_string(),
    })
}

fn decode<T: DeserializeOwned>(key: &QueryKey, data: Value) -> Result<T> {
    serde_json::from_value(data).map_err(|e| Error::Projection {
        key: key.to_string(),
        reason: e.to_string(),
    })
}
