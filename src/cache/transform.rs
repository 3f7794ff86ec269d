//! Single-flight transform cache.
//!
//! # Entry lifecycle
//!
//! ```text
//!   request ──► (absent) ──spawn──► Pending ──ok──► Ready (LRU)
//!                                      │
//!                                      └──err──► Failed ──► evicted
//! ```
//!
//! Lookup and Pending insertion happen under one synchronous lock with no
//! suspension point, so two requests for the same key can never both start a
//! computation. The computation runs as a detached task: dropping a handle
//! stops that caller from waiting but never aborts work another caller may
//! still need.
//!
//! Failed entries are removed at settle time. Every waiter attached to the
//! failed computation receives the same error, and the next request for the
//! key starts a fresh computation.

use std::collections::HashMap;
use std::future::{Future, IntoFuture};
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde::Serialize;
use tokio::sync::watch;
use tracing::{debug, warn};

use super::key::CacheKey;
use super::store::ReadyStore;
use crate::error::CacheError;
use crate::pixelate::{Pixelator, TransformedImage};
use crate::source::ImageSource;

/// Default maximum number of cached results.
pub const DEFAULT_CACHE_ENTRIES: usize = 4096;

/// Default cache capacity: 64MB of encoded images.
pub const DEFAULT_CACHE_CAPACITY: usize = 64 * 1024 * 1024;

/// Outcome shared by every waiter of one computation.
pub type TransformResult = Result<Arc<TransformedImage>, CacheError>;

// =============================================================================
// Lookup / Stats
// =============================================================================

/// How a request met the cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Lookup {
    /// Served from a Ready entry
    Hit,
    /// Attached to an in-flight computation
    Joined,
    /// Started a new computation
    Miss,
}

impl Lookup {
    pub fn as_str(&self) -> &'static str {
        match self {
            Lookup::Hit => "hit",
            Lookup::Joined => "joined",
            Lookup::Miss => "miss",
        }
    }
}

/// Snapshot of cache occupancy and counters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    /// Ready entries currently cached
    pub entries: usize,
    /// Computations in flight
    pub pending: usize,
    /// Total encoded bytes of Ready entries
    pub size_bytes: usize,
    pub capacity_bytes: usize,
    pub max_entries: usize,
    pub hits: u64,
    pub misses: u64,
    pub joins: u64,
    pub failures: u64,
    pub evictions: u64,
}

#[derive(Default)]
struct Counters {
    hits: AtomicU64,
    misses: AtomicU64,
    joins: AtomicU64,
    failures: AtomicU64,
    evictions: AtomicU64,
}

// =============================================================================
// Transform Cache
// =============================================================================

/// Keyed, bounded, single-flight cache for pixelated images.
///
/// # Type Parameters
///
/// * `S` - The image source used to fetch raw images
/// * `P` - The pixelation algorithm
///
/// # Example
///
/// ```ignore
/// use pixel_cache::cache::TransformCache;
/// use pixel_cache::pixelate::BlockPixelator;
/// use pixel_cache::source::FsImageSource;
///
/// let cache = TransformCache::new(FsImageSource::new("./avatars"), BlockPixelator::new());
///
/// // Both handles share one fetch + transform
/// let first = cache.request("avatar-1.png", 4, 48, 48)?;
/// let second = cache.request("avatar-1.png", 4, 48, 48)?;
///
/// let a = first.await?;
/// let b = second.await?;
/// assert!(std::sync::Arc::ptr_eq(&a, &b));
/// ```
pub struct TransformCache<S, P> {
    inner: Arc<Inner<S, P>>,
}

impl<S, P> Clone for TransformCache<S, P> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

struct Inner<S, P> {
    source: S,
    pixelator: P,
    state: Mutex<CacheState>,
    next_generation: AtomicU64,
    counters: Counters,
}

struct CacheState {
    ready: ReadyStore,
    pending: HashMap<CacheKey, PendingEntry>,
}

struct PendingEntry {
    /// Distinguishes this computation from a later one for the same key
    /// after an invalidation
    generation: u64,
    settled: watch::Receiver<Option<TransformResult>>,
}

impl<S: ImageSource, P: Pixelator> TransformCache<S, P> {
    /// Create a cache with default bounds.
    pub fn new(source: S, pixelator: P) -> Self {
        Self::with_capacity(source, pixelator, DEFAULT_CACHE_ENTRIES, DEFAULT_CACHE_CAPACITY)
    }

    /// Create a cache with custom bounds.
    ///
    /// # Arguments
    ///
    /// * `max_entries` - Maximum number of Ready entries
    /// * `max_size` - Maximum total encoded size of Ready entries in bytes
    pub fn with_capacity(source: S, pixelator: P, max_entries: usize, max_size: usize) -> Self {
        Self {
            inner: Arc::new(Inner {
                source,
                pixelator,
                state: Mutex::new(CacheState {
                    ready: ReadyStore::new(max_entries, max_size),
                    pending: HashMap::new(),
                }),
                next_generation: AtomicU64::new(0),
                counters: Counters::default(),
            }),
        }
    }

    /// Request a pixelated image.
    ///
    /// Invalid parameters are rejected synchronously with
    /// [`CacheError::InvalidRequest`] before any entry is created. Otherwise
    /// the returned handle resolves to the shared result.
    ///
    /// Must be called from within a Tokio runtime: a miss spawns the
    /// computation onto it.
    pub fn request(
        &self,
        source_id: &str,
        pixel_size: u32,
        width: u32,
        height: u32,
    ) -> Result<TransformHandle, CacheError> {
        self.request_key(CacheKey::new(source_id, pixel_size, width, height))
    }

    /// Request a pixelated image by key.
    pub fn request_key(&self, key: CacheKey) -> Result<TransformHandle, CacheError> {
        key.validate()?;

        let counters = &self.inner.counters;
        let mut state = self.inner.lock_state();

        if let Some(image) = state.ready.get(&key) {
            counters.hits.fetch_add(1, Ordering::Relaxed);
            debug!(key = %key, "transform cache hit");
            return Ok(TransformHandle::ready(key, image));
        }

        if let Some(pending) = state.pending.get(&key) {
            counters.joins.fetch_add(1, Ordering::Relaxed);
            debug!(key = %key, "joined in-flight transform");
            return Ok(TransformHandle::waiting(
                key,
                Lookup::Joined,
                pending.settled.clone(),
            ));
        }

        let generation = self.inner.next_generation.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = watch::channel(None);
        state.pending.insert(
            key.clone(),
            PendingEntry {
                generation,
                settled: rx.clone(),
            },
        );
        drop(state);

        counters.misses.fetch_add(1, Ordering::Relaxed);
        debug!(key = %key, generation, "transform cache miss, starting computation");

        let producer = Producer {
            inner: Arc::clone(&self.inner),
            key: key.clone(),
            generation,
            tx: Some(tx),
        };
        tokio::spawn(producer.run());

        Ok(TransformHandle::waiting(key, Lookup::Miss, rx))
    }

    /// Get a Ready result without starting a computation or touching LRU
    /// order.
    pub fn peek(&self, key: &CacheKey) -> Option<Arc<TransformedImage>> {
        self.inner.lock_state().ready.peek(key)
    }

    /// Whether a computation for `key` is in flight.
    pub fn is_pending(&self, key: &CacheKey) -> bool {
        self.inner.lock_state().pending.contains_key(key)
    }

    /// Remove an entry regardless of its state.
    ///
    /// Waiters already attached to a removed Pending entry still receive the
    /// original result; the result is just not stored. Returns whether
    /// anything was removed.
    pub fn invalidate(&self, key: &CacheKey) -> bool {
        let mut state = self.inner.lock_state();
        let removed_ready = state.ready.remove(key).is_some();
        let removed_pending = state.pending.remove(key).is_some();
        if removed_ready || removed_pending {
            debug!(key = %key, removed_ready, removed_pending, "invalidated cache entry");
        }
        removed_ready || removed_pending
    }

    /// Remove every entry derived from `source_id`. Returns the number of
    /// entries removed.
    pub fn invalidate_source(&self, source_id: &str) -> usize {
        let mut state = self.inner.lock_state();
        let ready = state.ready.remove_source(source_id);
        let before = state.pending.len();
        state
            .pending
            .retain(|key, _| &*key.source_id != source_id);
        let removed = ready + (before - state.pending.len());
        debug!(source_id, removed, "invalidated source");
        removed
    }

    /// Remove all entries. Returns the number of entries removed.
    pub fn clear(&self) -> usize {
        let mut state = self.inner.lock_state();
        let pending = state.pending.len();
        state.pending.clear();
        state.ready.clear() + pending
    }

    /// Snapshot of occupancy and counters.
    pub fn stats(&self) -> CacheStats {
        let (entries, pending, size_bytes, capacity_bytes, max_entries) = {
            let state = self.inner.lock_state();
            (
                state.ready.len(),
                state.pending.len(),
                state.ready.size(),
                state.ready.capacity(),
                state.ready.max_entries(),
            )
        };
        let counters = &self.inner.counters;

        CacheStats {
            entries,
            pending,
            size_bytes,
            capacity_bytes,
            max_entries,
            hits: counters.hits.load(Ordering::Relaxed),
            misses: counters.misses.load(Ordering::Relaxed),
            joins: counters.joins.load(Ordering::Relaxed),
            failures: counters.failures.load(Ordering::Relaxed),
            evictions: counters.evictions.load(Ordering::Relaxed),
        }
    }

    /// Get the image source.
    pub fn source(&self) -> &S {
        &self.inner.source
    }

    /// Get the pixelator.
    pub fn pixelator(&self) -> &P {
        &self.inner.pixelator
    }
}

impl<S, P> Inner<S, P> {
    /// Lock the cache state.
    ///
    /// Critical sections never leave the state half-updated, so a poisoned
    /// lock is still consistent and is recovered.
    fn lock_state(&self) -> MutexGuard<'_, CacheState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<S: ImageSource, P: Pixelator> Inner<S, P> {
    /// Fetch the source and run the pixelator on the blocking pool.
    async fn produce(self: &Arc<Self>, key: &CacheKey) -> TransformResult {
        let raw = self.source.fetch(&key.source_id).await?;

        let inner = Arc::clone(self);
        let params = key.params();
        let image = tokio::task::spawn_blocking(move || inner.pixelator.transform(&raw, &params))
            .await
            .map_err(|e| {
                warn!(key = %key, error = %e, "transform task did not complete");
                CacheError::Cancelled {
                    source_id: key.source_id.to_string(),
                }
            })??;

        Ok(Arc::new(image))
    }

    /// Publish the outcome of a computation to its waiters.
    ///
    /// The entry is only updated if it still belongs to this computation; an
    /// invalidated (or superseded) computation just notifies its own waiters.
    fn settle(
        &self,
        key: &CacheKey,
        generation: u64,
        result: TransformResult,
        tx: &watch::Sender<Option<TransformResult>>,
    ) {
        let mut state = self.lock_state();

        let current = state
            .pending
            .get(key)
            .is_some_and(|entry| entry.generation == generation);

        if current {
            state.pending.remove(key);
            match result {
                Ok(ref image) => {
                    let evicted = state.ready.put(key.clone(), Arc::clone(image));
                    self.counters
                        .evictions
                        .fetch_add(evicted as u64, Ordering::Relaxed);
                    debug!(key = %key, bytes = image.len(), evicted, "transform ready");
                }
                Err(ref e) => {
                    self.counters.failures.fetch_add(1, Ordering::Relaxed);
                    warn!(key = %key, error = %e, "transform failed, entry evicted");
                }
            }
        } else if let Err(ref e) = result {
            debug!(key = %key, generation, error = %e, "invalidated transform failed");
        } else {
            debug!(key = %key, generation, "entry invalidated while pending, result not stored");
        }

        tx.send_replace(Some(result));
    }
}

// =============================================================================
// Producer
// =============================================================================

/// Owns the sending side of one computation.
///
/// If the task is torn down before settling (panic, runtime shutdown), the
/// drop path settles the entry with [`CacheError::Cancelled`] so no waiter
/// hangs and the key does not stay Pending forever.
struct Producer<S: ImageSource, P: Pixelator> {
    inner: Arc<Inner<S, P>>,
    key: CacheKey,
    generation: u64,
    tx: Option<watch::Sender<Option<TransformResult>>>,
}

impl<S: ImageSource, P: Pixelator> Producer<S, P> {
    async fn run(mut self) {
        let result = self.inner.produce(&self.key).await;
        self.finish(result);
    }

    fn finish(&mut self, result: TransformResult) {
        if let Some(tx) = self.tx.take() {
            self.inner.settle(&self.key, self.generation, result, &tx);
        }
    }
}

impl<S: ImageSource, P: Pixelator> Drop for Producer<S, P> {
    fn drop(&mut self) {
        if self.tx.is_some() {
            let cancelled = CacheError::Cancelled {
                source_id: self.key.source_id.to_string(),
            };
            self.finish(Err(cancelled));
        }
    }
}

// =============================================================================
// Transform Handle
// =============================================================================

/// Handle to a (possibly pending) transform result.
///
/// Await it (or call [`TransformHandle::wait`]) for the result. Dropping the
/// handle only stops this caller from waiting.
pub struct TransformHandle {
    key: CacheKey,
    lookup: Lookup,
    state: HandleState,
}

enum HandleState {
    Ready(Arc<TransformedImage>),
    Waiting(watch::Receiver<Option<TransformResult>>),
}

impl TransformHandle {
    fn ready(key: CacheKey, image: Arc<TransformedImage>) -> Self {
        Self {
            key,
            lookup: Lookup::Hit,
            state: HandleState::Ready(image),
        }
    }

    fn waiting(key: CacheKey, lookup: Lookup, rx: watch::Receiver<Option<TransformResult>>) -> Self {
        Self {
            key,
            lookup,
            state: HandleState::Waiting(rx),
        }
    }

    /// The key this handle is waiting on.
    pub fn key(&self) -> &CacheKey {
        &self.key
    }

    /// How the request met the cache.
    pub fn lookup(&self) -> Lookup {
        self.lookup
    }

    /// The settled outcome, if the computation has finished.
    pub fn try_get(&self) -> Option<TransformResult> {
        match &self.state {
            HandleState::Ready(image) => Some(Ok(Arc::clone(image))),
            HandleState::Waiting(rx) => rx.borrow().clone(),
        }
    }

    /// Whether the computation has settled.
    pub fn is_settled(&self) -> bool {
        match &self.state {
            HandleState::Ready(_) => true,
            HandleState::Waiting(rx) => rx.borrow().is_some(),
        }
    }

    /// Wait for the computation to settle.
    pub async fn wait(self) -> TransformResult {
        match self.state {
            HandleState::Ready(image) => Ok(image),
            HandleState::Waiting(mut rx) => {
                // A closed channel still carries the last published value
                let _ = rx.wait_for(Option::is_some).await;
                let settled = rx.borrow().clone();
                settled.unwrap_or_else(|| {
                    Err(CacheError::Cancelled {
                        source_id: self.key.source_id.to_string(),
                    })
                })
            }
        }
    }
}

impl IntoFuture for TransformHandle {
    type Output = TransformResult;
    type IntoFuture = Pin<Box<dyn Future<Output = TransformResult> + Send>>;

    fn into_future(self) -> Self::IntoFuture {
        Box::pin(self.wait())
    }
}

impl std::fmt::Debug for TransformHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransformHandle")
            .field("key", &self.key)
            .field("lookup", &self.lookup)
            .field("settled", &self.is_settled())
            .finish()
    }
}

// =============================================================================
// Tests
// =============================================================================
