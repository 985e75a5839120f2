//! Resource Allocator
//!
//! Sole owner of a viewport's textures and framebuffers.
//!
//! # Design
//!
//! ```text
//!   TexSlot ──bindings──► TextureId ──textures──► TextureRecord { desc, imported }
//!                              │
//!                              └── physical texture lives in the backend
//!
//!   FbSlot  ──framebuffers──► [ Attachment { point, slot, mip } ]
//! ```
//!
//! - `ensure_*` creates on first need and re-creates on a descriptor or
//!   topology mismatch, reporting [`EnsureResult::was_recreated`].
//! - Framebuffers attach *slots*, not ids, so exchanging two slot bindings
//!   ([`ResourceAllocator::swap_textures`]) is the only identity change a
//!   frame ever needs.
//! - A texture is attached to at most one framebuffer at a time. Attaching
//!   it elsewhere detaches it first.
//! - `TEMP` textures go back to the [`TransientPool`] on release; imported
//!   textures are forgotten but never destroyed.

use rustc_hash::FxHashMap;
use slotmap::SlotMap;
use smallvec::SmallVec;

use super::TextureId;
use super::slots::{AttachPoint, FbSlot, TexSlot};
use super::texture::{TextureDesc, TextureFlags};
use super::transient_pool::TransientPool;
use crate::errors::{PostFxError, Result};
use crate::renderer::backend::GpuBackend;

/// Result of an ensure operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EnsureResult<T> {
    pub id: T,
    /// The resource was just created or rebuilt.
    pub was_recreated: bool,
}

impl<T> EnsureResult<T> {
    #[inline]
    #[must_use]
    pub fn existing(id: T) -> Self {
        Self {
            id,
            was_recreated: false,
        }
    }

    #[inline]
    #[must_use]
    pub fn created(id: T) -> Self {
        Self {
            id,
            was_recreated: true,
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct TextureRecord {
    desc: TextureDesc,
    imported: bool,
}

/// A texture mip bound to a framebuffer attachment point.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Attachment {
    pub point: AttachPoint,
    pub slot: TexSlot,
    pub mip: u32,
}

/// Attachment state of one framebuffer.
#[derive(Debug, Clone, Default)]
pub struct Framebuffer {
    /// Attachments the framebuffer was created with.
    layout: SmallVec<[(AttachPoint, TexSlot); 4]>,
    /// Attachments currently in place.
    attachments: SmallVec<[Attachment; 4]>,
}

impl Framebuffer {
    #[must_use]
    pub fn attachments(&self) -> &[Attachment] {
        &self.attachments
    }
}

pub struct ResourceAllocator {
    textures: SlotMap<TextureId, TextureRecord>,
    bindings: FxHashMap<TexSlot, TextureId>,
    framebuffers: FxHashMap<FbSlot, Framebuffer>,
    pool: TransientPool,
}

impl Default for ResourceAllocator {
    fn default() -> Self {
        Self::new()
    }
}

impl ResourceAllocator {
    #[must_use]
    pub fn new() -> Self {
        Self {
            textures: SlotMap::with_key(),
            bindings: FxHashMap::default(),
            framebuffers: FxHashMap::default(),
            pool: TransientPool::new(),
        }
    }

    // ========================================================================
    // Textures
    // ========================================================================

    /// Makes `slot` hold a texture matching `desc`.
    pub fn ensure_texture(
        &mut self,
        backend: &mut dyn GpuBackend,
        slot: TexSlot,
        desc: TextureDesc,
    ) -> Result<EnsureResult<TextureId>> {
        if let Some(&id) = self.bindings.get(&slot)
            && self.textures.get(id).is_some_and(|r| r.desc == desc)
        {
            return Ok(EnsureResult::existing(id));
        }

        self.release_texture(backend, slot);

        let id = if desc.flags.contains(TextureFlags::TEMP)
            && let Some(id) = self.pool.acquire(&desc)
        {
            id
        } else {
            let id = self.textures.insert(TextureRecord {
                desc,
                imported: false,
            });
            if let Err(e) = backend.create_texture(id, &desc) {
                self.textures.remove(id);
                return Err(e);
            }
            log::debug!(
                "Allocated {slot} ({}x{} {:?})",
                desc.width,
                desc.height,
                desc.format
            );
            id
        };

        self.bindings.insert(slot, id);
        Ok(EnsureResult::created(id))
    }

    /// Binds a host-owned texture to `slot`. The allocator never destroys it.
    pub fn import_texture(
        &mut self,
        backend: &mut dyn GpuBackend,
        slot: TexSlot,
        desc: TextureDesc,
    ) -> Result<TextureId> {
        self.release_texture(backend, slot);
        let id = self.textures.insert(TextureRecord {
            desc,
            imported: true,
        });
        backend.import_texture(id, &desc)?;
        self.bindings.insert(slot, id);
        Ok(id)
    }

    /// Unbinds `slot`, detaching it from every framebuffer. Returns whether
    /// anything was bound.
    pub fn release_texture(&mut self, backend: &mut dyn GpuBackend, slot: TexSlot) -> bool {
        let Some(id) = self.bindings.remove(&slot) else {
            return false;
        };
        self.detach(slot);

        let Some(record) = self.textures.get(id).copied() else {
            return true;
        };
        if record.imported {
            backend.destroy_texture(id);
            self.textures.remove(id);
        } else if record.desc.flags.contains(TextureFlags::TEMP) {
            self.pool.release(record.desc, id);
        } else {
            backend.destroy_texture(id);
            self.textures.remove(id);
            log::debug!("Released {slot}");
        }
        true
    }

    /// Exchanges the textures behind two slots.
    ///
    /// Framebuffers reference slots, so every framebuffer attaching `a` now
    /// renders into what used to be `b` and vice versa.
    pub fn swap_textures(&mut self, a: TexSlot, b: TexSlot) {
        let ta = self.bindings.remove(&a);
        let tb = self.bindings.remove(&b);
        if let Some(id) = tb {
            self.bindings.insert(a, id);
        }
        if let Some(id) = ta {
            self.bindings.insert(b, id);
        }
    }

    #[inline]
    #[must_use]
    pub fn texture(&self, slot: TexSlot) -> Option<TextureId> {
        self.bindings.get(&slot).copied()
    }

    pub fn require_texture(&self, slot: TexSlot) -> Result<TextureId> {
        self.texture(slot)
            .ok_or_else(|| PostFxError::UnboundTexture(slot.to_string()))
    }

    #[must_use]
    pub fn desc(&self, slot: TexSlot) -> Option<&TextureDesc> {
        let id = self.bindings.get(&slot)?;
        self.textures.get(*id).map(|r| &r.desc)
    }

    #[inline]
    #[must_use]
    pub fn is_bound(&self, slot: TexSlot) -> bool {
        self.bindings.contains_key(&slot)
    }

    /// `slot` holds a host-owned texture.
    #[must_use]
    pub fn is_imported(&self, slot: TexSlot) -> bool {
        self.bindings
            .get(&slot)
            .and_then(|id| self.textures.get(*id))
            .is_some_and(|r| r.imported)
    }

    // ========================================================================
    // Framebuffers
    // ========================================================================

    /// Makes `fb` exist with exactly `layout` attached at mip 0.
    ///
    /// A framebuffer whose layout differs is rebuilt. Current attachments are
    /// always reset to the layout, which undoes any attach/detach left over
    /// from the previous frame.
    pub fn ensure_framebuffer(
        &mut self,
        fb: FbSlot,
        layout: &[(AttachPoint, TexSlot)],
    ) -> EnsureResult<FbSlot> {
        let was_recreated = match self.framebuffers.get(&fb) {
            Some(existing) => existing.layout.as_slice() != layout,
            None => true,
        };
        if was_recreated {
            log::debug!("Building framebuffer {fb}");
        }
        self.framebuffers.insert(
            fb,
            Framebuffer {
                layout: layout.iter().copied().collect(),
                attachments: SmallVec::new(),
            },
        );
        for &(point, slot) in layout {
            self.attach(fb, point, slot, 0);
        }
        EnsureResult {
            id: fb,
            was_recreated,
        }
    }

    pub fn release_framebuffer(&mut self, fb: FbSlot) -> bool {
        self.framebuffers.remove(&fb).is_some()
    }

    /// Attaches `slot` at `mip` to `fb`, detaching it from wherever it was.
    pub fn attach(&mut self, fb: FbSlot, point: AttachPoint, slot: TexSlot, mip: u32) {
        self.detach(slot);
        let Some(target) = self.framebuffers.get_mut(&fb) else {
            log::warn!("Attach of {slot} to missing framebuffer {fb}");
            return;
        };
        target.attachments.retain(|a| a.point != point);
        target.attachments.push(Attachment { point, slot, mip });
    }

    /// Removes `slot` from whichever framebuffer holds it.
    pub fn detach(&mut self, slot: TexSlot) {
        for fb in self.framebuffers.values_mut() {
            fb.attachments.retain(|a| a.slot != slot);
        }
    }

    /// Empties `fb` without touching its layout.
    pub fn detach_all(&mut self, fb: FbSlot) {
        if let Some(target) = self.framebuffers.get_mut(&fb) {
            target.attachments.clear();
        }
    }

    #[must_use]
    pub fn framebuffer(&self, fb: FbSlot) -> Option<&Framebuffer> {
        self.framebuffers.get(&fb)
    }

    #[inline]
    #[must_use]
    pub fn has_framebuffer(&self, fb: FbSlot) -> bool {
        self.framebuffers.contains_key(&fb)
    }

    /// Render size of `fb`: the extent of its first attachment at its mip.
    #[must_use]
    pub fn framebuffer_size(&self, fb: FbSlot) -> Option<(u32, u32)> {
        let first = self.framebuffers.get(&fb)?.attachments.first()?;
        self.desc(first.slot).map(|d| d.mip_extent(first.mip))
    }

    // ========================================================================
    // Lifetime
    // ========================================================================

    /// Ages the transient pool and destroys textures idle for too long.
    pub fn end_frame(&mut self, backend: &mut dyn GpuBackend, max_idle_frames: u32) {
        for id in self.pool.trim(max_idle_frames) {
            backend.destroy_texture(id);
            self.textures.remove(id);
        }
    }

    /// Releases every owned texture and framebuffer. Imports survive.
    pub fn release_all(&mut self, backend: &mut dyn GpuBackend) {
        let owned: Vec<TexSlot> = self
            .bindings
            .iter()
            .filter(|(_, id)| self.textures.get(**id).is_some_and(|r| !r.imported))
            .map(|(slot, _)| *slot)
            .collect();
        for slot in owned {
            self.release_texture(backend, slot);
        }
        for id in self.pool.drain() {
            backend.destroy_texture(id);
            self.textures.remove(id);
        }
        self.framebuffers.clear();
    }

    /// Releases everything, imports included.
    pub fn teardown(&mut self, backend: &mut dyn GpuBackend) {
        self.release_all(backend);
        let imported: Vec<TexSlot> = self.bindings.keys().copied().collect();
        for slot in imported {
            self.release_texture(backend, slot);
        }
        self.textures.clear();
    }

    /// Bound slots, imports excluded.
    #[must_use]
    pub fn owned_slot_count(&self) -> usize {
        self.bindings
            .values()
            .filter(|id| self.textures.get(**id).is_some_and(|r| !r.imported))
            .count()
    }

    #[must_use]
    pub fn framebuffer_count(&self) -> usize {
        self.framebuffers.len()
    }
}
