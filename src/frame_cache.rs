//! Bounded in-memory frame cache (C3, §4.3).
//!
//! Built on the `lru` crate the way the corpus's video-pipeline example
//! (`FrameCache` over `lru::LruCache`) does it, specialized to the
//! `(source id, source-frame index)` key named in the spec. Single-producer:
//! the only reader/writer is a `NodeRenderer`, so no internal locking is
//! needed (contrast with `FrameStore`/`AssetStore`, which are shared across
//! async tasks).

use lru::LruCache;
use std::num::NonZeroUsize;

use crate::decoded_image::DecodedImage;

pub type SourceId = String;

/// Default bound for a primary-input (layer) cache, §4.3.
pub const DEFAULT_LAYER_CACHE_SIZE: usize = 50;
/// Default bound for a merge per-input cache, §4.3.
pub const DEFAULT_MERGE_INPUT_CACHE_SIZE: usize = 30;

/// A bounded `(source id, source-frame index) -> decoded image` cache.
/// Eviction releases the underlying pixel buffer before the entry is
/// dropped (the `Arc<[u8]>` backing simply loses its last strong reference,
/// matching "evicted images have their underlying resource released before
/// removal").
pub struct FrameCache {
    cache: LruCache<(SourceId, u64), DecodedImage>,
    last_evicted: Option<(SourceId, u64)>,
}

impl FrameCache {
    pub fn new(capacity: usize) -> Self {
        FrameCache {
            cache: LruCache::new(NonZeroUsize::new(capacity.max(1)).unwrap()),
            last_evicted: None,
        }
    }

    pub fn layer_default() -> Self {
        Self::new(DEFAULT_LAYER_CACHE_SIZE)
    }

    pub fn merge_input_default() -> Self {
        Self::new(DEFAULT_MERGE_INPUT_CACHE_SIZE)
    }

    pub fn get(&mut self, source_id: &str, index: u64) -> Option<DecodedImage> {
        self.cache.get(&(source_id.to_string(), index)).cloned()
    }

    /// Insert, evicting at most one entry (LRU eviction when over bound).
    pub fn insert(&mut self, source_id: &str, index: u64, image: DecodedImage) {
        self.last_evicted = None;
        if let Some(((evicted_id, evicted_idx), _)) =
            self.cache.push((source_id.to_string(), index), image)
        {
            if evicted_id != source_id || evicted_idx != index {
                self.last_evicted = Some((evicted_id, evicted_idx));
            }
        }
    }

    /// The key evicted by the most recent `insert`, if any — lets a caller
    /// (e.g. `NodeRenderer`) close a previous cached frame specifically when
    /// it was the one LRU-evicted.
    pub fn last_evicted(&self) -> Option<&(SourceId, u64)> {
        self.last_evicted.as_ref()
    }

    pub fn len(&self) -> usize {
        self.cache.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cache.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.cache.cap().get()
    }

    pub fn clear(&mut self) {
        self.cache.clear();
        self.last_evicted = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn img() -> DecodedImage {
        DecodedImage::solid(4, 4, [1, 2, 3, 4])
    }

    #[test]
    fn lookup_is_present_after_insert() {
        let mut cache = FrameCache::new(2);
        cache.insert("a", 0, img());
        assert!(cache.get("a", 0).is_some());
        assert!(cache.get("a", 1).is_none());
    }

    #[test]
    fn eviction_happens_at_most_one_per_insert() {
        let mut cache = FrameCache::new(2);
        cache.insert("a", 0, img());
        cache.insert("a", 1, img());
        assert_eq!(cache.len(), 2);
        cache.insert("a", 2, img());
        assert_eq!(cache.len(), 2);
        assert!(cache.get("a", 0).is_none(), "oldest entry should be LRU-evicted");
        assert!(cache.get("a", 1).is_some());
        assert!(cache.get("a", 2).is_some());
    }

    #[test]
    fn default_bounds_match_spec() {
        assert_eq!(FrameCache::layer_default().capacity(), 50);
        assert_eq!(FrameCache::merge_input_default().capacity(), 30);
    }
}
