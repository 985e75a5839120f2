//! Pass graph and frame recording.
//!
//! - [`pass`]: pass declarations with late-bound texture and uniform inputs
//! - [`builder`]: compiles passes per effect and decides when to rebuild
//! - [`passes`]: the effects themselves
//! - [`recorder`]: turns attach/bind/draw sequences into a [`CommandList`]
//! - [`scheduler`]: the post chain and its color ping-pong
//! - [`downsample`]: in-place mip chain generation

pub mod builder;
pub mod commands;
pub mod downsample;
pub mod pass;
pub mod passes;
pub mod recorder;
pub mod scheduler;

pub use builder::{GroupDesc, PassGraph, ProgramSource};
pub use commands::{
    BoundTarget, Command, CommandList, DrawCall, DrawKind, TargetView, TextureBinding,
    UniformValue,
};
pub use downsample::recursive_downsample;
pub use pass::{
    Pass, PassState, Primitive, SSR_SENTINEL_HIT, ShadingGroup, TexRef, TextureInput, UniformRef,
};
pub use recorder::Recorder;
pub use scheduler::{BufferSwapper, ChainOutcome, PostChain, SwapState, debug_slot, draw_effects};
