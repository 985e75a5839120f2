//! Per-frame effect configuration.
//!
//! ```text
//!   EffectSettings + FrameInput
//!          │
//!          ▼  resolver::resolve()
//!   EffectsState { enabled, params... }
//!          │
//!          ▼  lifetime::sync_resources()      sharing::DofNearSource
//!   ResourceAllocator (ensure / release) ◄─── decided once per frame
//! ```
//!
//! The enabled bitmask is derived fresh every frame. Bits that were set last
//! frame and are clear now release their resources in the same frame; bits
//! set for the first time allocate before any pass of the effect runs.

pub mod lifetime;
pub mod resolver;
pub mod sharing;
pub mod state;

use bitflags::bitflags;

pub use lifetime::{FrameChanges, sync_resources};
pub use resolver::{bloom_iterations, resolve, soft_knee_curve, view_vecs};
pub use sharing::DofNearSource;
pub use state::{
    AoParams, BloomParams, DofParams, EffectsState, MotionBlurParams, SceneCounters, SsrParams,
    VolumetricParams,
};

bitflags! {
    /// Effects enabled for the current frame.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct EffectFlags: u32 {
        const MOTION_BLUR   = 1 << 0;
        const BLOOM         = 1 << 1;
        const DOF           = 1 << 2;
        const VOLUMETRIC    = 1 << 3;
        const SSR           = 1 << 4;
        /// Keep last frame's color as history. Requested by SSR.
        const DOUBLE_BUFFER = 1 << 5;
    }
}

impl EffectFlags {
    /// Effects that render through the ping-pong color buffer.
    pub const POST: Self = Self::MOTION_BLUR.union(Self::BLOOM).union(Self::DOF);
}
