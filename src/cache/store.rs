//! LRU storage for settled transform results.
//!
//! The store tracks the total encoded size of cached images and evicts
//! least-recently-used entries when either the byte capacity or the entry
//! limit is exceeded. It is not synchronized on its own; the transform cache
//! keeps it behind the same lock as its pending-entry table.

use std::num::NonZeroUsize;
use std::sync::Arc;

use lru::LruCache;

use super::key::CacheKey;
use crate::pixelate::TransformedImage;

pub(crate) struct ReadyStore {
    entries: LruCache<CacheKey, Arc<TransformedImage>>,

    /// Maximum total size in bytes
    max_size: usize,

    /// Current total size in bytes
    current_size: usize,
}

impl ReadyStore {
    pub(crate) fn new(max_entries: usize, max_size: usize) -> Self {
        Self {
            entries: LruCache::new(NonZeroUsize::new(max_entries).unwrap_or(NonZeroUsize::MIN)),
            max_size,
            current_size: 0,
        }
    }

    /// Look up an entry, marking it as recently used.
    pub(crate) fn get(&mut self, key: &CacheKey) -> Option<Arc<TransformedImage>> {
        self.entries.get(key).cloned()
    }

    /// Look up an entry without touching LRU order.
    pub(crate) fn peek(&self, key: &CacheKey) -> Option<Arc<TransformedImage>> {
        self.entries.peek(key).cloned()
    }

    #[cfg(test)]
    pub(crate) fn contains(&self, key: &CacheKey) -> bool {
        self.entries.contains(key)
    }

    /// Insert an entry and evict until within capacity.
    ///
    /// Returns the number of other entries evicted.
    pub(crate) fn put(&mut self, key: CacheKey, image: Arc<TransformedImage>) -> usize {
        let mut evicted = 0;
        self.current_size += image.len();

        // push returns the replaced value for an existing key, or the LRU
        // entry when the entry limit was hit
        if let Some((old_key, old_image)) = self.entries.push(key.clone(), image) {
            self.current_size = self.current_size.saturating_sub(old_image.len());
            if old_key != key {
                evicted += 1;
            }
        }

        while self.current_size > self.max_size {
            match self.entries.pop_lru() {
                Some((evicted_key, evicted_image)) => {
                    self.current_size = self.current_size.saturating_sub(evicted_image.len());
                    if evicted_key != key {
                        evicted += 1;
                    }
                }
                None => break,
            }
        }

        evicted
    }

    pub(crate) fn remove(&mut self, key: &CacheKey) -> Option<Arc<TransformedImage>> {
        let image = self.entries.pop(key)?;
        self.current_size = self.current_size.saturating_sub(image.len());
        Some(image)
    }

    /// Remove every entry derived from `source_id`.
    pub(crate) fn remove_source(&mut self, source_id: &str) -> usize {
        let keys: Vec<CacheKey> = self
            .entries
            .iter()
            .filter(|(key, _)| &*key.source_id == source_id)
            .map(|(key, _)| key.clone())
            .collect();

        keys.iter().filter(|key| self.remove(key).is_some()).count()
    }

    pub(crate) fn clear(&mut self) -> usize {
        let removed = self.entries.len();
        self.entries.clear();
        self.current_size = 0;
        removed
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }

    pub(crate) fn size(&self) -> usize {
        self.current_size
    }

    pub(crate) fn capacity(&self) -> usize {
        self.max_size
    }

    pub(crate) fn max_entries(&self) -> usize {
        self.entries.cap().get()
    }
}
