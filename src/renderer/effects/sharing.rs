//! Cross-effect buffer sharing.
//!
//! Depth of field downsamples its near field into a half-resolution RGB11
//! buffer. Bloom's first downsample level has exactly that descriptor, and
//! bloom only writes it after depth of field has resolved, so when both
//! effects run the near field borrows it instead of allocating its own.
//!
//! The choice is made once per frame. A change of choice releases the
//! downsample framebuffer so it is rebuilt with the new attachment.

use super::EffectFlags;
use crate::renderer::resources::TexSlot;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum DofNearSource {
    /// `DofDownNear`, owned by depth of field.
    #[default]
    Dedicated,
    /// Bloom's first downsample level.
    BloomDownsample0,
}

impl DofNearSource {
    /// Picks the near-field buffer for this frame.
    ///
    /// Sharing requires bloom to be enabled and its first downsample level to
    /// match the depth of field buffer size.
    #[must_use]
    pub fn select(
        enabled: EffectFlags,
        bloom_down0: Option<(u32, u32)>,
        dof_size: (u32, u32),
    ) -> Self {
        let both = enabled.contains(EffectFlags::BLOOM | EffectFlags::DOF);
        if both && bloom_down0 == Some(dof_size) {
            Self::BloomDownsample0
        } else {
            Self::Dedicated
        }
    }

    #[inline]
    #[must_use]
    pub fn slot(self) -> TexSlot {
        match self {
            Self::Dedicated => TexSlot::DofDownNear,
            Self::BloomDownsample0 => TexSlot::BloomDownsample(0),
        }
    }
}
