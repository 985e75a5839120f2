//! Transient Texture Pool
//!
//! Recycles textures flagged [`TextureFlags::TEMP`](super::TextureFlags::TEMP).
//!
//! # Design
//!
//! ```text
//! ┌──────────────────────────────────────────────────┐
//! │                 TransientPool                    │
//! │                                                  │
//! │  free: HashMap<TextureDesc, Vec<PooledTexture>>  │
//! │                                                  │
//! │  acquire(desc) → Option<TextureId>               │
//! │  release(desc, id)                               │
//! │  trim(max_idle) → ids to destroy                 │
//! └──────────────────────────────────────────────────┘
//! ```
//!
//! The pool never talks to the backend. It only tracks ids; the allocator
//! destroys whatever [`TransientPool::trim`] hands back.

use rustc_hash::FxHashMap;

use super::TextureId;
use super::texture::TextureDesc;

struct PooledTexture {
    id: TextureId,
    /// Frames spent in the free list without being reused.
    idle_frames: u32,
}

/// Free list of released transient textures, keyed by descriptor.
#[derive(Default)]
pub struct TransientPool {
    free: FxHashMap<TextureDesc, Vec<PooledTexture>>,
}

impl TransientPool {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Takes a free texture with exactly this descriptor, if any.
    pub fn acquire(&mut self, desc: &TextureDesc) -> Option<TextureId> {
        self.free.get_mut(desc)?.pop().map(|t| t.id)
    }

    pub fn release(&mut self, desc: TextureDesc, id: TextureId) {
        self.free
            .entry(desc)
            .or_default()
            .push(PooledTexture { id, idle_frames: 0 });
    }

    /// Ages every free texture by one frame and removes those idle for more
    /// than `max_idle_frames`. The removed ids are returned for destruction.
    pub fn trim(&mut self, max_idle_frames: u32) -> Vec<TextureId> {
        let mut expired = Vec::new();
        self.free.retain(|_, bucket| {
            bucket.retain_mut(|t| {
                t.idle_frames += 1;
                if t.idle_frames > max_idle_frames {
                    expired.push(t.id);
                    false
                } else {
                    true
                }
            });
            !bucket.is_empty()
        });
        expired
    }

    /// Empties the pool, returning every id.
    pub fn drain(&mut self) -> Vec<TextureId> {
        self.free
            .drain()
            .flat_map(|(_, bucket)| bucket.into_iter().map(|t| t.id))
            .collect()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.free.values().map(Vec::len).sum()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.free.values().all(Vec::is_empty)
    }
}
