//! Texture pool (C5, §4.5).
//!
//! Buckets idle textures by `(width, height, format)` so a later `acquire`
//! with the same shape can reuse one instead of allocating; idle textures are
//! tracked in per-bucket LRU order and evicted (disposed on the GPU) once the
//! pool's soft memory or count cap is exceeded. Grounded in the corpus
//! video-editor example's `PooledTex`/`TextureHandle` refcount-and-LRU
//! scheme, adapted to this crate's non-refcounted `Texture` handle (disposal
//! here is pool-driven, not drop-driven).

use std::collections::{HashMap, HashSet};

use crate::error::CoreResult;
use crate::gpu::{GpuContext, Texture, TextureFormat};

type BucketKey = (u32, u32, TextureFormat);

struct Entry {
    texture: Texture,
    /// Monotonically increasing; larger is more-recently-released.
    last_used: u64,
}

/// Soft caps, per §4.5: the pool may briefly exceed them for a single
/// `acquire` that can't be satisfied from idle stock, but evicts back under
/// both bounds before the next `acquire`/`release` returns.
#[derive(Debug, Clone, Copy)]
pub struct TexturePoolLimits {
    pub max_bytes: u64,
    pub max_count: usize,
}

impl Default for TexturePoolLimits {
    fn default() -> Self {
        TexturePoolLimits {
            max_bytes: 256 * 1024 * 1024,
            max_count: 64,
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct TexturePoolStats {
    pub idle_count: usize,
    pub idle_bytes: u64,
    pub live_count: usize,
}

/// A GPU texture pool scoped to a single [`GpuContext`]. Not `Send`/`Sync`
/// across contexts: one pool per node renderer, matching one `GpuContext`
/// per node renderer (§5).
pub struct TexturePool {
    limits: TexturePoolLimits,
    idle: HashMap<BucketKey, Vec<Entry>>,
    live_count: usize,
    idle_bytes: u64,
    clock: u64,
    /// Ids of textures this pool has issued (via `acquire`) and not yet
    /// disposed. `release`/`dispose` consult this so a texture from another
    /// pool or an already-released handle is rejected rather than pooled or
    /// double-counted (§4.5: "releasing a texture not owned by the pool is a
    /// no-op").
    issued: HashSet<u64>,
}

impl TexturePool {
    pub fn new(limits: TexturePoolLimits) -> Self {
        TexturePool {
            limits,
            idle: HashMap::new(),
            live_count: 0,
            idle_bytes: 0,
            clock: 0,
            issued: HashSet::new(),
        }
    }

    /// Returns an idle texture matching `(width, height, format)` if one is
    /// pooled, otherwise allocates a fresh one via `gpu`. Either way the
    /// returned texture counts against `live_count` until `release`d.
    pub fn acquire<G: GpuContext>(
        &mut self,
        gpu: &G,
        width: u32,
        height: u32,
        format: TextureFormat,
    ) -> CoreResult<Texture> {
        let key = (width, height, format);
        let texture = if let Some(bucket) = self.idle.get_mut(&key) {
            // Most-recently-released first: keeps hot shapes warm.
            bucket.pop().map(|e| {
                self.idle_bytes -= e.texture.memory_bytes();
                e.texture
            })
        } else {
            None
        };

        let texture = match texture {
            Some(t) => t,
            None => gpu.create_texture(width, height, format)?,
        };
        self.issued.insert(texture.id());
        self.live_count += 1;
        Ok(texture)
    }

    /// Returns a texture to the idle pool rather than disposing it, then
    /// evicts idle entries until both soft caps are satisfied again. A
    /// texture this pool never issued (or already released) is left
    /// untouched — releasing it is a no-op (§4.5).
    pub fn release<G: GpuContext>(&mut self, gpu: &G, texture: Texture) {
        if !self.issued.contains(&texture.id()) {
            return;
        }
        if texture.is_disposed() {
            self.issued.remove(&texture.id());
            self.live_count = self.live_count.saturating_sub(1);
            return;
        }
        self.live_count = self.live_count.saturating_sub(1);
        self.clock += 1;
        let key = texture.bucket_key();
        self.idle_bytes += texture.memory_bytes();
        self.idle.entry(key).or_default().push(Entry {
            texture,
            last_used: self.clock,
        });
        self.evict_if_needed(gpu);
    }

    /// Disposes a texture immediately without pooling it — used when a
    /// texture's content must not be reused (e.g. a caller knows the shape
    /// won't recur). A texture this pool never issued is left untouched.
    pub fn dispose<G: GpuContext>(&mut self, gpu: &G, texture: Texture) {
        if !self.issued.remove(&texture.id()) {
            return;
        }
        self.live_count = self.live_count.saturating_sub(1);
        gpu.dispose_texture(&texture);
    }

    /// Disposes every idle (pooled, not checked out) texture. Live
    /// (acquired-but-not-released) textures are untouched.
    pub fn clear_pooled<G: GpuContext>(&mut self, gpu: &G) {
        for (_, bucket) in self.idle.drain() {
            for entry in bucket {
                self.issued.remove(&entry.texture.id());
                gpu.dispose_texture(&entry.texture);
            }
        }
        self.idle_bytes = 0;
    }

    /// Disposes every texture the pool knows about, idle or not. Intended
    /// for full teardown; callers must not use textures handed out by this
    /// pool afterward.
    pub fn clear_all<G: GpuContext>(&mut self, gpu: &G) {
        self.clear_pooled(gpu);
        self.live_count = 0;
        self.issued.clear();
    }

    pub fn stats(&self) -> TexturePoolStats {
        TexturePoolStats {
            idle_count: self.idle.values().map(|b| b.len()).sum(),
            idle_bytes: self.idle_bytes,
            live_count: self.live_count,
        }
    }

    fn evict_if_needed<G: GpuContext>(&mut self, gpu: &G) {
        loop {
            let idle_count: usize = self.idle.values().map(|b| b.len()).sum();
            let over_bytes = self.idle_bytes > self.limits.max_bytes;
            let over_count = self.live_count + idle_count > self.limits.max_count;
            if !over_bytes && !over_count {
                break;
            }
            let Some(victim_key) = self.oldest_bucket() else {
                break;
            };
            let bucket = self.idle.get_mut(&victim_key).expect("key just selected");
            let entry = bucket.remove(0);
            self.idle_bytes -= entry.texture.memory_bytes();
            if bucket.is_empty() {
                self.idle.remove(&victim_key);
            }
            self.issued.remove(&entry.texture.id());
            gpu.dispose_texture(&entry.texture);
        }
    }

    /// The bucket whose oldest entry is globally least-recently-used.
    fn oldest_bucket(&self) -> Option<BucketKey> {
        self.idle
            .iter()
            .filter_map(|(k, bucket)| bucket.first().map(|e| (*k, e.last_used)))
            .min_by_key(|(_, last_used)| *last_used)
            .map(|(k, _)| k)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gpu::{HeadlessGpu, GpuInitOptions};

    fn gpu() -> Option<HeadlessGpu> {
        HeadlessGpu::new(GpuInitOptions::default(), 32, 32).ok()
    }

    #[test]
    fn release_then_acquire_reuses_texture() {
        let Some(gpu) = gpu() else { return };
        let mut pool = TexturePool::new(TexturePoolLimits::default());
        let t1 = pool.acquire(&gpu.context, 16, 16, TextureFormat::Rgba8).unwrap();
        let id1 = t1.id();
        pool.release(&gpu.context, t1);
        assert_eq!(pool.stats().idle_count, 1);

        let t2 = pool.acquire(&gpu.context, 16, 16, TextureFormat::Rgba8).unwrap();
        assert_eq!(t2.id(), id1, "should reuse the pooled texture rather than allocate");
        assert_eq!(pool.stats().idle_count, 0);
    }

    #[test]
    fn count_cap_evicts_oldest_idle_entry() {
        let Some(gpu) = gpu() else { return };
        let mut pool = TexturePool::new(TexturePoolLimits {
            max_bytes: u64::MAX,
            max_count: 2,
        });
        let a = pool.acquire(&gpu.context, 8, 8, TextureFormat::Rgba8).unwrap();
        let b = pool.acquire(&gpu.context, 8, 8, TextureFormat::Rgba8).unwrap();
        let c = pool.acquire(&gpu.context, 8, 8, TextureFormat::Rgba8).unwrap();
        pool.release(&gpu.context, a.clone());
        pool.release(&gpu.context, b.clone());
        // live_count (1 for `c`) + idle_count (2) exceeds max_count(2); oldest idle evicted.
        pool.release(&gpu.context, c);
        assert!(a.is_disposed() || pool.stats().idle_count <= 2);
    }

    #[test]
    fn releasing_a_foreign_texture_is_a_no_op() {
        let Some(gpu) = gpu() else { return };
        let mut own_pool = TexturePool::new(TexturePoolLimits::default());
        let mut other_pool = TexturePool::new(TexturePoolLimits::default());

        let foreign = other_pool.acquire(&gpu.context, 8, 8, TextureFormat::Rgba8).unwrap();
        own_pool.release(&gpu.context, foreign);

        assert_eq!(own_pool.stats().idle_count, 0);
        assert_eq!(own_pool.stats().live_count, 0);
    }
}
