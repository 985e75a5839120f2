//! Viewport resources: descriptors, slots, allocation and recycling.

pub mod allocator;
pub mod slots;
pub mod texture;
pub mod transient_pool;

pub use allocator::{Attachment, EnsureResult, Framebuffer, ResourceAllocator};
pub use slots::{AttachPoint, ExternalBlock, ExternalTexture, FbSlot, TexSlot};
pub use texture::{TexFormat, TextureDesc, TextureFlags, full_mip_chain, mip_extent};
pub use transient_pool::TransientPool;

slotmap::new_key_type! {
    /// Allocator-assigned identity of a physical texture.
    pub struct TextureId;
}
